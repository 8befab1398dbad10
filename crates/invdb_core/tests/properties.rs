//! Property tests over a file-backed engine.

use invdb_core::predicate::{gt, matches, neq, or};
use invdb_core::{ListOptions, Predicate, StoreError};
use invdb_testkit::prelude::*;
use invdb_testkit::scenarios::seed_family;
use proptest::prelude::*;

fn config() -> ProptestConfig {
    ProptestConfig::with_cases(24)
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn inserted_rows_read_back_equal(items in distinct_items_strategy(30)) {
        let store = TestStore::new();
        store.with(&[], |tx| {
            for item in &items {
                tx.insert(&mut item.clone())?;
            }
            Ok::<_, StoreError>(())
        }).unwrap();

        for item in &items {
            let stored = store.get_pk::<Item>(item.id).unwrap();
            prop_assert_eq!(&stored.name, &item.name);
            prop_assert_eq!(stored.rev, 1);
        }
    }

    #[test]
    fn revision_counts_updates(renames in renames_strategy(12)) {
        let store = TestStore::new();
        let mut item = Item::new(1, "start");
        store.insert(&mut item).unwrap();
        let initial = item.rev;
        for name in &renames {
            item.name = name.clone();
            store.update(&mut item).unwrap();
        }
        prop_assert_eq!(item.rev, initial + renames.len() as i64);
        prop_assert_eq!(store.get_pk::<Item>(1).unwrap(), item);
    }

    #[test]
    fn stale_update_leaves_row_unchanged(first in name_strategy(), second in name_strategy()) {
        let store = TestStore::new();
        let mut item = Item::new(1, "origin");
        store.insert(&mut item).unwrap();
        let mut stale = item.clone();

        item.name = first;
        store.update(&mut item).unwrap();
        stale.name = second;
        prop_assert!(store.update(&mut stale).unwrap_err().is_conflict());
        prop_assert_eq!(store.get_pk::<Item>(1).unwrap(), item);
    }

    #[test]
    fn cascade_leaves_no_descendants(children in 0i64..4, leaves in 0i64..4) {
        let store = TestStore::new();
        seed_family(&store, 1, children, leaves);
        seed_family(&store, 2, 1, 1);
        store.delete(&Parent::new(1)).unwrap();

        for c in 1..=children {
            let child = 100 + c;
            prop_assert!(store.get_pk::<Child>(child).unwrap_err().is_not_found());
            prop_assert!(store.labels(&Child::new(child, 1)).unwrap().is_empty());
            for l in 1..=leaves {
                prop_assert!(store.get_pk::<Leaf>(child * 100 + l).unwrap_err().is_not_found());
            }
        }
        prop_assert_eq!(store.count::<Child>(None).unwrap(), 1);
        prop_assert_eq!(store.count::<Leaf>(None).unwrap(), 1);
    }

    #[test]
    fn labels_round_trip(sets in prop::collection::vec(labels_strategy(), 1..12)) {
        let store = TestStore::new();
        store.with(&[], |tx| {
            for (i, labels) in sets.iter().enumerate() {
                tx.insert(&mut Tagged::new(i as i64 + 1, "t", labels.clone()))?;
            }
            Ok::<_, StoreError>(())
        }).unwrap();

        for (i, labels) in sets.iter().enumerate() {
            let id = i as i64 + 1;
            let found = store
                .list::<Tagged>(&ListOptions::new().predicate(matches(labels.clone())))
                .unwrap();
            prop_assert!(found.iter().any(|t| t.id == id));

            let mut wider = labels.clone();
            wider.insert("extra".into(), "x".into());
            let found = store
                .list::<Tagged>(&ListOptions::new().predicate(matches(wider)))
                .unwrap();
            prop_assert!(found.is_empty());
        }
    }

    #[test]
    fn list_len_matches_count(items in distinct_items_strategy(30), pivot in 0i64..10_000) {
        let store = TestStore::new();
        store.with(&[], |tx| {
            for item in &items {
                tx.insert(&mut item.clone())?;
            }
            Ok::<_, StoreError>(())
        }).unwrap();

        let predicates: Vec<Option<Predicate>> = vec![
            None,
            Some(gt("id", pivot)),
            Some(or([gt("id", pivot), neq("name", "")])),
        ];
        for predicate in predicates {
            let mut options = ListOptions::new();
            if let Some(p) = &predicate {
                options = options.predicate(p.clone());
            }
            let listed = store.list::<Item>(&options).unwrap().len();
            prop_assert_eq!(listed, store.count::<Item>(predicate.as_ref()).unwrap());
        }
    }
}
