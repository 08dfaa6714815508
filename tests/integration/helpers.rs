use crate::*;
use bytes::Bytes;
use coffer_core::config::TransferSettings;
use coffer_core::{ErrorKind, TransferError};
use coffer_services::{spawn_download, spawn_upload, CancelToken, FileSource};

// ══════════════════════════════════════════════════════════════════════════════
//  Guards, whole-object helpers, background tasks
// ══════════════════════════════════════════════════════════════════════════════

/// Dropping an unfinished upload guard aborts it: nothing is listed and the
/// backend handle is gone.
#[test]
fn test_dropped_write_guard_releases_backend_handle() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();

    let result = (|| -> Result<()> {
        let mut upload = alice.begin_upload(&store, b"", b"", 100)?;
        upload.write(&pattern(40))?;
        assert_eq!(world.backend.open_handles(), 1);
        anyhow::bail!("caller gave up half way");
    })();

    assert!(result.is_err());
    assert_eq!(world.backend.open_handles(), 0);
    assert_eq!(alice.open_handles(), 0);
    assert!(listed(&alice, &store).unwrap().is_empty());
}

#[test]
fn test_guards_round_trip() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();
    let data = pattern(777);

    let mut upload = alice.begin_upload(&store, b"", b"", data.len() as i64).unwrap();
    upload.write_all(&data, 100).unwrap();
    let id = upload.finish().unwrap();

    let mut download = alice.begin_download(&id).unwrap();
    let head = download.read(7).unwrap();
    assert_eq!(&head[..], &data[..7]);
    download.close().unwrap();

    let all = alice.begin_download(&id).unwrap().read_to_end(128).unwrap();
    assert_eq!(all, data);
    assert_eq!(world.backend.open_handles(), 0);
}

#[test]
fn test_failed_finish_still_releases() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();

    let mut upload = alice.begin_upload(&store, b"", b"", 10).unwrap();
    upload.write(b"short").unwrap();
    let err = upload.finish().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendRejected);
    assert_eq!(world.backend.open_handles(), 0);
}

#[test]
fn test_upload_path_and_download() -> Result<()> {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[])?;

    let dir = std::env::temp_dir().join(format!("coffer-it-{}", coffer_core::crypto::random_id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("notes.txt");
    let contents = pattern(10_000);
    std::fs::write(&path, &contents)?;

    let id = alice.upload_path(&store, &path, 4096)?;
    let back = alice.download_to_buffer(&id, 3000)?;
    assert_eq!(back, contents);

    let page = alice.connection().list_objects(
        &store,
        &PagingQuery::default().with_query_json(r#"{"name":"notes.txt"}"#),
    )?;
    assert_eq!(page.total_count, 1);

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// Checksum verification can be turned off; with it on, downloads of a
/// clean object pass.
#[test]
fn test_checksum_verification_setting() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();
    let id = alice.upload_buffer(&store, b"", b"", b"checked", 3).unwrap();

    assert_eq!(&alice.download_to_buffer(&id, 3).unwrap()[..], b"checked");

    let unchecked = TransferClient::with_settings(
        alice.connection().clone(),
        TransferSettings {
            verify_checksums: false,
            ..Default::default()
        },
    );
    assert_eq!(&unchecked.download_to_buffer(&id, 3).unwrap()[..], b"checked");

    let info = alice
        .connection()
        .backend()
        .object_info(alice.connection().user_id(), &id)
        .unwrap();
    assert_eq!(info.checksum, coffer_core::crypto::hash(b"checked"));
}

#[tokio::test]
async fn test_background_upload_and_download() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();
    let data = Bytes::from(pattern(50_000));

    let up = spawn_upload(
        &alice,
        store.clone(),
        FileSource::new(data.clone()).with_public_meta(&b"{}"[..]),
        4096,
        CancelToken::new(),
    )
    .unwrap();
    let id = up.join().await.unwrap();

    let down = spawn_download(&alice, id.clone(), 8192, CancelToken::new()).unwrap();
    assert_eq!(down.join().await.unwrap(), data);
    assert_eq!(listed(&alice, &store).unwrap(), vec![id]);
    assert_eq!(world.backend.open_handles(), 0);
}

/// A cancelled task resolves to `Cancelled` and leaves no handle behind.
#[tokio::test]
async fn test_cancelled_task_releases_handle() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let task = spawn_upload(
        &alice,
        store.clone(),
        FileSource::new(pattern(10_000)),
        100,
        cancel,
    )
    .unwrap();
    assert_eq!(task.join().await.unwrap_err(), TransferError::Cancelled);
    assert_eq!(world.backend.open_handles(), 0);
    assert!(listed(&alice, &store).unwrap().is_empty());
}

/// Cancelling mid-flight either stops the upload or loses the race to
/// completion; the handle is released either way.
#[tokio::test]
async fn test_cancel_mid_flight() {
    let world = World::with_settings(coffer_core::config::BackendSettings { max_chunk_size: 16 });
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();

    let task = spawn_upload(&alice, store.clone(), FileSource::new(pattern(200_000)), 16, CancelToken::new())
        .unwrap();
    task.cancel();
    match task.join().await {
        Ok(id) => assert_eq!(listed(&alice, &store).unwrap(), vec![id]),
        Err(e) => {
            assert_eq!(e, TransferError::Cancelled);
            assert!(listed(&alice, &store).unwrap().is_empty());
        }
    }
    assert_eq!(world.backend.open_handles(), 0);
}

/// Spawning needs a runtime; from plain sync code it is an error, and the
/// transfer never starts.
#[test]
fn test_spawn_without_runtime_fails_cleanly() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();

    let result = spawn_upload(&alice, store.clone(), FileSource::new(pattern(10)), 4, CancelToken::new());
    assert_eq!(result.err().unwrap().kind(), ErrorKind::InvalidArgument);
    assert_eq!(world.backend.open_handles(), 0);
    assert!(listed(&alice, &store).unwrap().is_empty());
}
