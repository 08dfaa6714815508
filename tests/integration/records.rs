use crate::*;
use coffer_core::ErrorKind;

// ══════════════════════════════════════════════════════════════════════════════
//  Thread messages & kvdb entries
// ══════════════════════════════════════════════════════════════════════════════

fn shared(api: fn(Connection) -> ContainerApi, owner: &TransferClient, member: &TransferClient) -> ContainerId {
    let conn = owner.connection();
    api(conn.clone())
        .create(
            CONTEXT,
            vec![conn.user().clone(), member.connection().user().clone()],
            vec![conn.user().clone()],
            b"",
            b"",
            None,
        )
        .unwrap()
}

/// Alice and bob talk in one thread; mallory cannot even open it.
#[test]
fn test_thread_conversation() {
    let world = World::new();
    let alice = world.client(ALICE);
    let bob = world.client(BOB);
    let id = shared(ContainerApi::threads, &alice, &bob);

    alice.thread(&id).unwrap().send_message(b"", b"", b"hi bob").unwrap();
    // Long enough to need several chunks.
    let long = pattern(5000);
    bob.thread(&id).unwrap().send_message(b"", b"", &long).unwrap();

    let page = alice
        .thread(&id)
        .unwrap()
        .list_messages(&PagingQuery::new(0, 10, SortOrder::Asc))
        .unwrap();
    assert_eq!(page.total_count, 2);
    assert_eq!(page.items[0].info.author.as_str(), ALICE);
    assert_eq!(&page.items[0].data[..], b"hi bob");
    assert_eq!(page.items[1].info.author.as_str(), BOB);
    assert_eq!(page.items[1].data, long);

    let mallory = world.client(MALLORY);
    assert_eq!(mallory.thread(&id).err().unwrap().kind(), ErrorKind::NotFound);
    assert_eq!(world.backend.open_handles(), 0);
}

/// Two writers start from the same version; the second one loses and has
/// to re-read before it can write.
#[test]
fn test_kvdb_concurrent_update_conflict() {
    let world = World::new();
    let alice = world.client(ALICE);
    let bob = world.client(BOB);
    let id = shared(ContainerApi::kvdbs, &alice, &bob);

    let a = alice.kvdb(&id).unwrap();
    let b = bob.kvdb(&id).unwrap();
    a.set_entry("example", b"", b"", b"Hello World", 0).unwrap();

    let seen = b.entry("example").unwrap().version;
    assert_eq!(a.set_entry("example", b"", b"", b"from alice", seen).unwrap(), 2);
    assert_eq!(
        b.set_entry("example", b"", b"", b"from bob", seen).unwrap_err().kind(),
        ErrorKind::BackendRejected
    );

    let current = b.entry("example").unwrap();
    assert_eq!(&current.data[..], b"from alice");
    assert_eq!(current.info.author.as_str(), ALICE);
    assert_eq!(b.set_entry("example", b"", b"", b"from bob", current.version).unwrap(), 3);

    // Old versions remain as objects; the entry listing shows one live key.
    assert_eq!(listed(&alice, &id).unwrap().len(), 3);
    assert_eq!(a.list_entries(&PagingQuery::default()).unwrap().total_count, 1);
}

#[test]
fn test_kvdb_listing_query_is_validated() {
    let world = World::new();
    let alice = world.client(ALICE);
    let id = alice.connection().create_kvdb(CONTEXT).unwrap();
    let kvdb = alice.kvdb(&id).unwrap();
    kvdb.set_entry("k", b"", b"", b"v", 0).unwrap();

    let zero = PagingQuery::new(0, 0, SortOrder::Desc);
    assert_eq!(kvdb.list_entries(&zero).unwrap_err().kind(), ErrorKind::InvalidArgument);
    let unknown_cursor = PagingQuery::default().with_last_id("nope");
    assert_eq!(
        kvdb.list_entries(&unknown_cursor).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}
