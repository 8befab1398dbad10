//! End-to-end scenarios against a file-backed engine.

use invdb_core::predicate::{and, eq, gt, matches, or, FieldRef};
use invdb_core::{
    labels, Action, Event, EventHandler, ListOptions, Record, RelationNavigator, StoreError,
    Tree, WatchOptions, MAX_DETAIL,
};
use invdb_testkit::prelude::*;
use invdb_testkit::scenarios::{seed_datacenter, seed_family, seed_items};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn insert_get_update_conflict() {
    let store = TestStore::new();

    let mut item = Item::new(1, "alpha");
    store.insert(&mut item).unwrap();
    assert_eq!(item, Item { id: 1, name: "alpha".into(), rev: 1 });

    let stale = item.clone();
    item.name = "beta".into();
    store.update(&mut item).unwrap();
    assert_eq!(store.get_pk::<Item>(1).unwrap(), Item { id: 1, name: "beta".into(), rev: 2 });

    let mut stale = stale;
    stale.name = "gamma".into();
    let err = store.update(&mut stale).unwrap_err();
    assert!(err.is_conflict(), "{err}");

    let mut fetched = Item::new(1, "");
    store.get(&mut fetched).unwrap();
    assert_eq!(fetched, Item { id: 1, name: "beta".into(), rev: 2 });
}

#[test]
fn update_of_missing_row_is_not_found() {
    let store = TestStore::new();
    let err = store.update(&mut Item::new(9, "ghost")).unwrap_err();
    assert!(err.is_not_found());
    assert!(store.get_pk::<Item>(9).unwrap_err().is_not_found());
}

#[test]
fn cascade_delete_removes_descendants() {
    let store = TestStore::new();
    seed_family(&store, 1, 2, 2);

    let (child_handler, children) = RecordingHandler::<Child>::new();
    let (parent_handler, parents) = RecordingHandler::<Parent>::new();
    let (leaf_handler, leaves) = RecordingHandler::<Leaf>::new();
    store.watch::<Child, _>(child_handler, WatchOptions::new()).unwrap();
    store.watch::<Parent, _>(parent_handler, WatchOptions::new()).unwrap();
    store.watch::<Leaf, _>(leaf_handler, WatchOptions::new()).unwrap();

    assert_eq!(store.labels(&Child::new(101, 1)).unwrap().len(), 1);

    let mut tx = store.begin(&["purge"]).unwrap();
    tx.delete(&Parent::new(1)).unwrap();
    assert_eq!(tx.staged(), 1 + 2 + 4);
    tx.commit().unwrap();

    assert!(store.get_pk::<Parent>(1).unwrap_err().is_not_found());
    for child in [101, 102] {
        assert!(store.get_pk::<Child>(child).unwrap_err().is_not_found());
        assert!(store.labels(&Child::new(child, 1)).unwrap().is_empty());
    }
    assert_eq!(store.count::<Leaf>(None).unwrap(), 0);

    assert!(children.wait_events(2, WAIT));
    assert!(parents.wait_events(1, WAIT));
    assert!(leaves.wait_events(4, WAIT));
    let deleted = children.events_of(Action::Deleted);
    let mut ids: Vec<i64> = deleted.iter().map(|e| e.current.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![101, 102]);
    assert!(deleted.iter().all(|e| e.has_label("purge")));
    assert_eq!(parents.events_of(Action::Deleted)[0].current, Parent::new(1));
}

/// Watch options that log the kind of every event queued for the watch.
fn queue_log(kind: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> WatchOptions {
    let log = Arc::clone(log);
    WatchOptions::new().filter(move |_| {
        log.lock().push(kind);
        true
    })
}

#[test]
fn cascade_events_reach_watches_leaves_first() {
    let store = TestStore::new();
    seed_family(&store, 1, 2, 1);

    let log = Arc::new(Mutex::new(Vec::new()));
    let (parent_handler, parents) = RecordingHandler::<Parent>::new();
    let (child_handler, children) = RecordingHandler::<Child>::new();
    let (leaf_handler, leaves) = RecordingHandler::<Leaf>::new();
    store.watch::<Parent, _>(parent_handler, queue_log("Parent", &log)).unwrap();
    store.watch::<Child, _>(child_handler, queue_log("Child", &log)).unwrap();
    store.watch::<Leaf, _>(leaf_handler, queue_log("Leaf", &log)).unwrap();

    store.delete(&Parent::new(1)).unwrap();

    assert_eq!(*log.lock(), vec!["Leaf", "Leaf", "Child", "Child", "Parent"]);
    assert!(leaves.wait_events(2, WAIT));
    assert!(children.wait_events(2, WAIT));
    assert!(parents.wait_events(1, WAIT));
    assert!(children.events().iter().all(|e| e.action == Action::Deleted));
    let mut child_ids: Vec<i64> = children.events().iter().map(|e| e.current.id).collect();
    child_ids.sort_unstable();
    assert_eq!(child_ids, vec![101, 102]);
    assert_eq!(parents.events()[0].action, Action::Deleted);
    assert_eq!(parents.events()[0].current, Parent::new(1));
}

#[test]
fn delete_of_missing_row_succeeds() {
    let store = TestStore::new();
    store.delete(&Parent::new(42)).unwrap();
}

#[test]
fn child_without_parent_is_fk_missing() {
    let store = TestStore::new();
    let err = store.insert(&mut Child::new(1, 77)).unwrap_err();
    assert!(matches!(err, StoreError::FkMissing { .. }), "{err}");
    assert_eq!(store.count::<Child>(None).unwrap(), 0);
}

#[test]
fn duplicate_key_is_reported() {
    let store = TestStore::new();
    store.insert(&mut Host::new("h1", "c1", 4)).unwrap();
    let mut twin = Host::new("h2", "c1", 4);
    twin.name = "h1.example.com".into();
    let err = store.insert(&mut twin).unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }), "{err}");
}

#[test]
fn watch_snapshot_then_live() {
    let store = TestStore::new();
    seed_items(&store, 3);

    let (handler, recorder) = RecordingHandler::<Item>::new();
    store
        .watch::<Item, _>(handler, WatchOptions::new().snapshot(true))
        .unwrap();
    assert!(recorder.wait_parity(WAIT));

    let entries = recorder.entries();
    assert!(matches!(entries[0], Recorded::Started(_)));
    assert_eq!(recorder.parity_index(), Some(4));
    let snapshot = recorder.events();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.iter().all(|e| e.action == Action::Created && e.is_snapshot()));

    store.insert(&mut Item::new(4, "item-4")).unwrap();
    assert!(recorder.wait_events(4, WAIT));
    let live = &recorder.events()[3];
    assert_eq!(live.action, Action::Created);
    assert!(!live.is_snapshot());

    let mut second = store.get_pk::<Item>(2).unwrap();
    let before = second.clone();
    second.name = "renamed".into();
    store.update(&mut second).unwrap();
    assert!(recorder.wait_events(5, WAIT));
    let updated = &recorder.events()[4];
    assert_eq!(updated.action, Action::Updated);
    assert_eq!(updated.previous.as_ref(), Some(&before));
    assert_eq!(updated.current, second);
}

#[test]
fn label_match_predicates() {
    let store = TestStore::new();
    store
        .with(&[], |tx| {
            tx.insert(&mut Tagged::new(1, "a", labels(&[("role", "web")])))?;
            tx.insert(&mut Tagged::new(2, "b", labels(&[("role", "db")])))?;
            tx.insert(&mut Tagged::new(3, "c", labels(&[("role", "web"), ("env", "prod")])))?;
            Ok::<_, StoreError>(())
        })
        .unwrap();

    let list = |l: &[(&str, &str)]| {
        store
            .list::<Tagged>(&ListOptions::new().predicate(matches(labels(l))))
            .unwrap()
    };
    assert_eq!(list(&[("role", "web")]).len(), 2);
    assert_eq!(list(&[("role", "web"), ("env", "prod")]).len(), 1);
    assert_eq!(list(&[("role", "cache")]).len(), 0);

    let web_or_b = or([matches(labels(&[("role", "web")])), eq("name", "b")]);
    assert_eq!(store.count::<Tagged>(Some(&web_or_b)).unwrap(), 3);
}

/// Writes back every update it sees under the `echo` label.
struct EchoHandler {
    engine: invdb_core::Engine,
    calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl EventHandler<Item> for EchoHandler {
    fn updated(&mut self, event: Event<Item>) {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut item = event.current;
        item.name = format!("{}-echoed", item.name);
        self.engine
            .with(&["echo"], |tx| tx.update(&mut item))
            .unwrap();
    }
}

#[test]
fn echo_skip() {
    let store = TestStore::new();
    let mut item = Item::new(1, "alpha");
    store.insert(&mut item).unwrap();

    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let handler = EchoHandler {
        engine: store.engine.clone(),
        calls: Arc::clone(&calls),
    };
    store
        .watch::<Item, _>(handler, WatchOptions::new().skip_label("echo"))
        .unwrap();

    item.name = "beta".into();
    store.update(&mut item).unwrap();

    let mut stored = store.get_pk::<Item>(1).unwrap();
    for _ in 0..250 {
        if stored.rev == 3 {
            break;
        }
        thread::sleep(Duration::from_millis(20));
        stored = store.get_pk::<Item>(1).unwrap();
    }
    assert_eq!(stored.name, "beta-echoed");
    assert_eq!(stored.rev, 3);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn transaction_isolation() {
    let store = TestStore::new();
    let (handler, recorder) = RecordingHandler::<Item>::new();
    store.watch::<Item, _>(handler, WatchOptions::new()).unwrap();

    let mut tx = store.begin(&["batch"]).unwrap();
    tx.insert(&mut Item::new(1, "A")).unwrap();
    tx.insert(&mut Item::new(2, "B")).unwrap();
    assert_eq!(tx.count::<Item>(None).unwrap(), 2);

    let engine = store.engine.clone();
    let seen = thread::spawn(move || engine.list::<Item>(&ListOptions::new()).unwrap().len())
        .join()
        .unwrap();
    assert_eq!(seen, 0);
    assert!(recorder.events().is_empty());

    tx.commit().unwrap();
    assert_eq!(store.list::<Item>(&ListOptions::new()).unwrap().len(), 2);
    assert!(recorder.wait_events(2, WAIT));
    let names: Vec<String> = recorder.events().into_iter().map(|e| e.current.name).collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[test]
fn rolled_back_transaction_emits_nothing() {
    let store = TestStore::new();
    let (handler, recorder) = RecordingHandler::<Item>::new();
    store.watch::<Item, _>(handler, WatchOptions::new()).unwrap();
    {
        let mut tx = store.begin(&[]).unwrap();
        tx.insert(&mut Item::new(1, "dropped")).unwrap();
    }
    store.insert(&mut Item::new(2, "kept")).unwrap();
    assert!(recorder.wait_events(1, WAIT));
    thread::sleep(Duration::from_millis(50));
    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].current.id, 2);
    assert!(store.get_pk::<Item>(1).unwrap_err().is_not_found());
}

#[test]
fn detail_projection_and_paging() {
    let store = TestStore::new();
    seed_datacenter(&store, 3, 2);

    let shallow = store.list::<Host>(&ListOptions::new()).unwrap();
    assert_eq!(shallow.len(), 3);
    assert!(shallow.iter().all(|h| h.cpus == 0 && !h.name.is_empty() && h.rev == 1));
    assert_eq!(shallow, store.list::<Host>(&ListOptions::new().detail(0)).unwrap());

    let full = store
        .list::<Host>(&ListOptions::new().detail(MAX_DETAIL))
        .unwrap();
    assert!(full.iter().all(|h| h.cpus == 8));
    assert_eq!(store.get_pk::<Host>("host-0").unwrap().cpus, 8);

    let unbounded = store
        .list::<Vm>(&ListOptions::new().page(0, usize::MAX))
        .unwrap();
    assert_eq!(unbounded.len(), 6);

    let vms = store
        .list::<Vm>(&ListOptions::new().detail(1).sort([2]).page(1, 2))
        .unwrap();
    assert_eq!(vms.len(), 2);
    assert!(vms.iter().all(|vm| vm.spec == VmSpec::default()));

    let vm = store.get_pk::<Vm>("host-0vm-1").unwrap();
    assert_eq!(vm.spec.disks, vec!["disk-1".to_string()]);
    assert!(vm.row_id > 0);
}

#[test]
fn field_to_field_and_conditional_update() {
    let store = TestStore::new();
    seed_datacenter(&store, 1, 3);

    let by_rowid = and([gt("row_id", 1), eq("host", "host-0")]);
    assert_eq!(store.count::<Vm>(Some(&by_rowid)).unwrap(), 2);
    let same = eq("row_id", FieldRef::new("row_id"));
    assert_eq!(store.count::<Vm>(Some(&same)).unwrap(), 3);

    let mut host = store.get_pk::<Host>("host-0").unwrap();
    host.maintenance = true;
    let err = store
        .update_where(&mut host, &eq("cluster", "c2"))
        .unwrap_err();
    assert!(err.is_not_found());
    store.update_where(&mut host, &eq("cluster", "c1")).unwrap();
    assert!(store.get_pk::<Host>("host-0").unwrap().maintenance);
}

#[test]
fn host_delete_cascades_to_vms_and_tree_follows_links() {
    let store = TestStore::new();
    seed_datacenter(&store, 2, 3);

    let root = Record::of(&store, &store.get_pk::<Host>("host-1").unwrap()).unwrap();
    let nav = RelationNavigator::new(store.engine.clone());
    let tree = Tree::default().build(&nav, root).unwrap();
    assert_eq!(tree.size(), 4);

    store.delete(&Host::new("host-1", "c1", 0)).unwrap();
    assert_eq!(store.count::<Vm>(None).unwrap(), 3);
    assert_eq!(store.count::<Host>(None).unwrap(), 1);
}

#[test]
fn insert_of_existing_row_upserts() {
    let store = TestStore::new();
    store.insert(&mut Item::new(1, "first")).unwrap();
    let mut again = Item::new(1, "second");
    store.insert(&mut again).unwrap();
    assert_eq!(again.rev, 2);
    assert_eq!(store.get_pk::<Item>(1).unwrap().name, "second");
}

#[test]
fn closed_engine_rejects_work() {
    let store = TestStore::new();
    let (handler, recorder) = RecordingHandler::<Item>::new();
    let watch = store.watch::<Item, _>(handler, WatchOptions::new()).unwrap();
    store.close(false).unwrap();
    assert!(recorder.wait_end(WAIT));
    assert!(!watch.alive());
    assert!(matches!(
        store.insert(&mut Item::new(1, "late")),
        Err(StoreError::EngineClosed)
    ));
    assert!(matches!(store.begin(&[]), Err(StoreError::EngineClosed)));
}
