//! Property-based test generators using proptest.

use crate::models::Item;
use invdb_core::Labels;
use proptest::prelude::*;

/// Strategy for item names, including empty and non-ASCII ones.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-z][a-z0-9-]{0,15}",
        "\\PC{1,12}",
    ]
}

/// Strategy for unsaved items with ids in `1..=max_id`.
pub fn item_strategy(max_id: i64) -> impl Strategy<Value = Item> {
    (1..=max_id, name_strategy()).prop_map(|(id, name)| Item::new(id, &name))
}

/// Strategy for a set of items with distinct ids.
pub fn distinct_items_strategy(max_len: usize) -> impl Strategy<Value = Vec<Item>> {
    prop::collection::btree_map(1..10_000i64, name_strategy(), 0..max_len)
        .prop_map(|m| m.into_iter().map(|(id, name)| Item::new(id, &name)).collect())
}

/// Strategy for label sets drawn from a small vocabulary so matches are common.
pub fn labels_strategy() -> impl Strategy<Value = Labels> {
    prop::collection::btree_map(
        prop::sample::select(vec!["role", "env", "zone", "tier"]).prop_map(str::to_string),
        prop::sample::select(vec!["web", "db", "prod", "dev", "a", "b"]).prop_map(str::to_string),
        0..4,
    )
}

/// Strategy for a sequence of renames applied as successive updates.
pub fn renames_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(name_strategy(), 1..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn distinct_items_have_distinct_ids() {
        let mut runner = TestRunner::default();
        let items = distinct_items_strategy(20)
            .new_tree(&mut runner)
            .unwrap()
            .current();
        let mut ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), items.len());
    }

    proptest! {
        #[test]
        fn labels_use_the_vocabulary(labels in labels_strategy()) {
            prop_assert!(labels.len() < 4);
            for name in labels.keys() {
                prop_assert!(["role", "env", "zone", "tier"].contains(&name.as_str()));
            }
        }
    }
}
