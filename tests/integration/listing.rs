use crate::*;
use coffer_core::ErrorKind;

// ══════════════════════════════════════════════════════════════════════════════
//  Listing & paging
// ══════════════════════════════════════════════════════════════════════════════

/// An object shows up only after its handle is closed, and exactly once.
#[test]
fn test_visible_only_after_close() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();

    let h = alice.open_for_write(&store, b"", b"", 6).unwrap();
    alice.write_chunk(&h, b"abc").unwrap();
    assert!(listed(&alice, &store).unwrap().is_empty());
    alice.write_chunk(&h, b"def").unwrap();
    assert!(listed(&alice, &store).unwrap().is_empty());

    let id = alice.close_for_write(&h).unwrap();
    assert_eq!(listed(&alice, &store).unwrap(), vec![id.clone()]);

    // Reading does not change the listing.
    download(&alice, &id, 2).unwrap();
    assert_eq!(listed(&alice, &store).unwrap(), vec![id]);
}

#[test]
fn test_failed_and_aborted_uploads_never_listed() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();

    let short = alice.open_for_write(&store, b"", b"", 10).unwrap();
    alice.write_chunk(&short, b"abc").unwrap();
    assert!(alice.close_for_write(&short).is_err());

    let aborted = alice.open_for_write(&store, b"", b"", 3).unwrap();
    alice.write_chunk(&aborted, b"abc").unwrap();
    alice.abort_write(&aborted).unwrap();

    assert!(listed(&alice, &store).unwrap().is_empty());
}

/// Members see each other's objects.
#[test]
fn test_member_sees_shared_uploads() {
    let world = World::new();
    let alice = world.client(ALICE);
    let bob = world.client(BOB);
    let store = world.store(&alice, &[&bob]).unwrap();

    let id = upload(&bob, &store, b"from bob", 3).unwrap();
    assert_eq!(listed(&alice, &store).unwrap(), vec![id.clone()]);
    assert_eq!(download(&alice, &id, 64).unwrap(), b"from bob");

    let info = alice
        .connection()
        .backend()
        .object_info(alice.connection().user_id(), &id)
        .unwrap();
    assert_eq!(info.author.as_str(), BOB);
}

fn store_with(world: &World, client: &TransferClient, sizes: &[usize]) -> (ContainerId, Vec<ObjectId>) {
    let store = world.store(client, &[]).unwrap();
    let ids = sizes
        .iter()
        .map(|&n| upload(client, &store, &pattern(n), 64).unwrap())
        .collect();
    (store, ids)
}

#[test]
fn test_default_query_is_newest_first() {
    let world = World::new();
    let alice = world.client(ALICE);
    let (store, ids) = store_with(&world, &alice, &[1, 2, 3]);

    let page = alice
        .connection()
        .list_objects(&store, &PagingQuery::default())
        .unwrap();
    let got: Vec<_> = page.items.into_iter().map(|o| o.object_id).collect();
    assert_eq!(got, ids.into_iter().rev().collect::<Vec<_>>());
}

#[test]
fn test_skip_and_limit() {
    let world = World::new();
    let alice = world.client(ALICE);
    let (store, ids) = store_with(&world, &alice, &[1, 2, 3, 4, 5]);

    let page = alice
        .connection()
        .list_objects(&store, &PagingQuery::new(1, 2, SortOrder::Asc))
        .unwrap();
    assert_eq!(page.total_count, 5);
    let got: Vec<_> = page.items.into_iter().map(|o| o.object_id).collect();
    assert_eq!(got, ids[1..3].to_vec());

    let past_end = alice
        .connection()
        .list_objects(&store, &PagingQuery::new(10, 2, SortOrder::Asc))
        .unwrap();
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total_count, 5);
}

/// Walking with `lastId` visits every object once.
#[test]
fn test_last_id_cursor_walks_everything() {
    let world = World::new();
    let alice = world.client(ALICE);
    let (store, ids) = store_with(&world, &alice, &[5, 4, 3, 2, 1, 0, 7]);

    let mut seen = Vec::new();
    let mut query = PagingQuery::new(0, 3, SortOrder::Asc);
    loop {
        let page = alice.connection().list_objects(&store, &query).unwrap();
        let Some(last) = page.items.last().map(|o| o.object_id.clone()) else {
            break;
        };
        seen.extend(page.items.into_iter().map(|o| o.object_id));
        query = PagingQuery::new(0, 3, SortOrder::Asc).with_last_id(last.as_str());
    }
    assert_eq!(seen, ids);
}

#[test]
fn test_unknown_last_id_is_invalid() {
    let world = World::new();
    let alice = world.client(ALICE);
    let (store, _) = store_with(&world, &alice, &[1]);

    let err = alice
        .connection()
        .list_objects(&store, &PagingQuery::default().with_last_id("nope"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_sort_by_size() {
    let world = World::new();
    let alice = world.client(ALICE);
    let (store, ids) = store_with(&world, &alice, &[30, 10, 20]);

    let page = alice
        .connection()
        .list_objects(
            &store,
            &PagingQuery::new(0, 10, SortOrder::Asc).with_sort_by("size"),
        )
        .unwrap();
    let sizes: Vec<u64> = page.items.iter().map(|o| o.size).collect();
    assert_eq!(sizes, vec![10, 20, 30]);
    assert_eq!(page.items[0].object_id, ids[1]);

    let err = alice
        .connection()
        .list_objects(&store, &PagingQuery::default().with_sort_by("colour"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_query_as_json_filters_public_meta() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();

    let report = alice
        .upload_buffer(&store, br#"{"type":"report","year":2024}"#, b"", b"r", 16)
        .unwrap();
    alice
        .upload_buffer(&store, br#"{"type":"photo"}"#, b"", b"p", 16)
        .unwrap();
    alice.upload_buffer(&store, b"not json", b"", b"x", 16).unwrap();

    let page = alice
        .connection()
        .list_objects(
            &store,
            &PagingQuery::default().with_query_json(r#"{"type":"report"}"#),
        )
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].object_id, report);

    let err = alice
        .connection()
        .list_objects(&store, &PagingQuery::default().with_query_json("[1,2]"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

/// Older callers send the sort order as a raw string and omit the newer fields.
#[test]
fn test_legacy_query_payload() {
    let world = World::new();
    let alice = world.client(ALICE);
    let (store, ids) = store_with(&world, &alice, &[1, 2]);

    let query: PagingQuery =
        serde_json::from_str(r#"{"skip":0,"limit":1,"sortOrder":"asc"}"#).unwrap();
    let page = alice.connection().list_objects(&store, &query).unwrap();
    assert_eq!(page.items[0].object_id, ids[0]);
    assert_eq!(page.total_count, 2);
}

#[test]
fn test_zero_limit_is_invalid() {
    let world = World::new();
    let alice = world.client(ALICE);
    let (store, _) = store_with(&world, &alice, &[1]);
    let err = alice
        .connection()
        .list_objects(&store, &PagingQuery::new(0, 0, SortOrder::Desc))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
