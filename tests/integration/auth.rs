use crate::*;
use coffer_core::crypto::Keypair;
use coffer_core::{ContainerPolicy, ErrorKind, ObjectId};

// ══════════════════════════════════════════════════════════════════════════════
//  Authorization & failure classification
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_outsider_cannot_see_container() {
    let world = World::new();
    let alice = world.client(ALICE);
    let mallory = world.client(MALLORY);
    let store = world.store(&alice, &[]).unwrap();
    let id = upload(&alice, &store, b"private", 7).unwrap();

    let conn = mallory.connection();
    assert_eq!(
        conn.list_objects(&store, &PagingQuery::default()).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        conn.backend().object_info(conn.user_id(), &id).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(mallory.open_for_read(&id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        mallory.open_for_write(&store, b"", b"", 1).unwrap_err().kind(),
        ErrorKind::BackendRejected
    );
    assert_eq!(world.backend.open_handles(), 0);
}

/// Context members who are not container members are outsiders too.
#[test]
fn test_context_member_outside_container() {
    let world = World::new();
    let alice = world.client(ALICE);
    let bob = world.client(BOB);
    let store = world.store(&alice, &[]).unwrap();

    assert_eq!(
        bob.connection()
            .list_objects(&store, &PagingQuery::default())
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_container_creation_rules() {
    let world = World::new();
    let alice = world.client(ALICE);
    let mallory = world.client(MALLORY);

    // Unknown context.
    assert_eq!(
        alice.connection().create_store("no-such-context").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    // Caller outside the context.
    assert_eq!(
        mallory.connection().create_store(CONTEXT).unwrap_err().kind(),
        ErrorKind::BackendRejected
    );
    // Listed user outside the context.
    assert_eq!(
        world.store(&alice, &[&mallory]).unwrap_err().downcast::<coffer_core::TransferError>()
            .unwrap()
            .kind(),
        ErrorKind::BackendRejected
    );
}

#[test]
fn test_policy_caps_object_size() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = ContainerApi::stores(alice.connection().clone())
        .create(
            CONTEXT,
            vec![alice.connection().user().clone()],
            vec![],
            b"",
            b"",
            Some(ContainerPolicy {
                max_object_size: Some(8),
            }),
        )
        .unwrap();

    assert!(upload(&alice, &store, b"12345678", 4).is_ok());
    assert_eq!(
        alice.open_for_write(&store, b"", b"", 9).unwrap_err().kind(),
        ErrorKind::BackendRejected
    );
}

#[test]
fn test_missing_object_and_container() {
    let world = World::new();
    let alice = world.client(ALICE);

    assert_eq!(
        alice.open_for_read(&ObjectId::new("missing")).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    // Writing needs a container the backend knows; an unknown one is a
    // rejection, not a lookup miss.
    assert_eq!(
        alice
            .open_for_write(&"missing".into(), b"", b"", 1)
            .unwrap_err()
            .kind(),
        ErrorKind::BackendRejected
    );
    assert_eq!(world.backend.open_handles(), 0);
}

#[test]
fn test_negative_size_is_invalid() {
    let world = World::new();
    let alice = world.client(ALICE);
    let store = world.store(&alice, &[]).unwrap();
    assert_eq!(
        alice.open_for_write(&store, b"", b"", -5).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(world.backend.open_handles(), 0);
}

#[test]
fn test_connect_with_private_key() {
    let world = World::new();
    let kp = Keypair::generate();
    let hex_key = hex::encode(*kp.private_bytes());

    let conn = Connection::connect(Arc::new(world.backend.clone()), ALICE, &hex_key).unwrap();
    assert_eq!(conn.user().pub_key, kp.public_hex());

    let err = Connection::connect(Arc::new(world.backend.clone()), ALICE, "abc").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(format!("{conn:?}").contains(ALICE));
}
