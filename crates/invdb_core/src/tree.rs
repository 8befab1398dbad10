//! Tree navigation over foreign key links.
//!
//! Callers decide the shape: a [`Navigator`] names the children of a
//! record and builds the node for it. [`RelationNavigator`] follows every
//! link pointing at a record.

use crate::engine::Engine;
use crate::error::StoreResult;
use crate::model::{Definition, Model};
use crate::row::Row;
use crate::value::Value;
use std::collections::HashSet;

/// A row tagged with its kind and primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Kind of the row.
    pub kind: String,
    /// Primary key.
    pub pk: Value,
    /// Row contents.
    pub row: Row,
}

impl Record {
    /// Tags `row` as a row of `def`.
    pub fn new(def: &Definition, row: Row) -> StoreResult<Self> {
        Ok(Self {
            kind: def.kind().to_string(),
            pk: def.pk_value(&row)?,
            row,
        })
    }

    /// Record of a typed row, resolved against the engine's data model.
    pub fn of<M: Model>(engine: &Engine, model: &M) -> StoreResult<Self> {
        let def = engine.model().require(M::KIND)?;
        let mut row = Row::new();
        model.encode(&mut row)?;
        Self::new(def, row)
    }

    /// Decodes the row as `M`.
    pub fn decode<M: Model>(&self) -> StoreResult<M> {
        M::decode(&self.row)
    }
}

/// One node of a built tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Kind of the row.
    pub kind: String,
    /// The row, as shaped by the navigator.
    pub row: Row,
    /// Distance from the root.
    pub depth: usize,
    /// Child nodes.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree, itself included.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}

/// Walks a tree one level at a time.
pub trait Navigator {
    /// Children of `parent`.
    fn next(&self, parent: &Record) -> StoreResult<Vec<Record>>;

    /// Builds the node for `record` below `parent`.
    fn node(&self, parent: Option<&TreeNode>, record: Record) -> TreeNode {
        TreeNode {
            kind: record.kind,
            row: record.row,
            depth: parent.map_or(0, |p| p.depth + 1),
            children: Vec::new(),
        }
    }
}

/// Tree builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tree {
    /// Maximum depth below the root; `None` walks to the leaves.
    pub depth: Option<usize>,
}

impl Tree {
    /// A tree limited to `depth` levels below the root.
    #[must_use]
    pub fn with_depth(depth: usize) -> Self {
        Self { depth: Some(depth) }
    }

    /// Builds the tree rooted at `root`.
    ///
    /// A record already on the path from the root is not expanded again.
    pub fn build(&self, navigator: &dyn Navigator, root: Record) -> StoreResult<TreeNode> {
        let mut ancestors = HashSet::new();
        self.expand(navigator, None, root, &mut ancestors)
    }

    fn expand(
        &self,
        navigator: &dyn Navigator,
        parent: Option<&TreeNode>,
        record: Record,
        ancestors: &mut HashSet<(String, String)>,
    ) -> StoreResult<TreeNode> {
        let key = (record.kind.clone(), record.pk.key_string());
        let depth = parent.map_or(0, |p| p.depth + 1);
        let children = if self.depth.is_some_and(|limit| depth >= limit) || ancestors.contains(&key)
        {
            Vec::new()
        } else {
            navigator.next(&record)?
        };

        let mut node = navigator.node(parent, record);
        if children.is_empty() {
            return Ok(node);
        }
        ancestors.insert(key.clone());
        for child in children {
            let built = self.expand(navigator, Some(&node), child, ancestors)?;
            node.children.push(built);
        }
        ancestors.remove(&key);
        Ok(node)
    }
}

/// Follows every foreign key pointing at a record.
#[derive(Debug, Clone)]
pub struct RelationNavigator {
    engine: Engine,
    cascade_only: bool,
}

impl RelationNavigator {
    /// Navigator over all links.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            cascade_only: false,
        }
    }

    /// Only follow `+cascade` links: the tree becomes what a delete would remove.
    #[must_use]
    pub fn cascade_only(mut self, cascade_only: bool) -> Self {
        self.cascade_only = cascade_only;
        self
    }
}

impl Navigator for RelationNavigator {
    fn next(&self, parent: &Record) -> StoreResult<Vec<Record>> {
        let def = self.engine.model().require(&parent.kind)?;
        let mut out = Vec::new();
        for rel in self.engine.graph().referencing(def) {
            if self.cascade_only && !rel.cascade {
                continue;
            }
            for row in self.engine.children(rel, &parent.pk)? {
                out.push(Record::new(&rel.child, row)?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::{DataModel, FieldType, Schema};
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct Folder {
        id: i64,
        name: String,
        parent: i64,
    }

    impl Model for Folder {
        const KIND: &'static str = "Folder";

        fn schema() -> Schema {
            Schema::new(Self::KIND)
                .field("id", FieldType::Integer, "pk")
                .field("name", FieldType::String, "")
                .field("parent", FieldType::Integer, "fk(Folder +cascade)")
        }

        fn encode(&self, row: &mut Row) -> StoreResult<()> {
            row.set("id", self.id)
                .set("name", &self.name)
                .set("parent", self.parent);
            Ok(())
        }

        fn decode(row: &Row) -> StoreResult<Self> {
            Ok(Self {
                id: row.get("id")?,
                name: row.get("name")?,
                parent: row.get("parent")?,
            })
        }
    }

    #[derive(Debug, Default)]
    struct Note {
        id: i64,
        folder: i64,
    }

    impl Model for Note {
        const KIND: &'static str = "Note";

        fn schema() -> Schema {
            Schema::new(Self::KIND)
                .field("id", FieldType::Integer, "pk")
                .field("folder", FieldType::Integer, "fk(Folder)")
        }

        fn encode(&self, row: &mut Row) -> StoreResult<()> {
            row.set("id", self.id).set("folder", self.folder);
            Ok(())
        }

        fn decode(row: &Row) -> StoreResult<Self> {
            Ok(Self {
                id: row.get("id")?,
                folder: row.get("folder")?,
            })
        }
    }

    fn folder(id: i64, name: &str, parent: i64) -> Folder {
        Folder {
            id,
            name: name.into(),
            parent,
        }
    }

    /// root(1) -> a(2) -> b(3); root -> note(100); a -> note(101)
    fn setup() -> (TempDir, Engine) {
        let dir = TempDir::new().unwrap();
        let model = DataModel::builder()
            .with::<Folder>()
            .with::<Note>()
            .build()
            .unwrap();
        let engine = Engine::open(Config::new().path(dir.path().join("inv.db")), model).unwrap();
        engine
            .with(&[], |tx| {
                tx.insert(&mut folder(1, "root", 0))?;
                tx.insert(&mut folder(2, "a", 1))?;
                tx.insert(&mut folder(3, "b", 2))?;
                tx.insert(&mut Note { id: 100, folder: 1 })?;
                tx.insert(&mut Note { id: 101, folder: 2 })
            })
            .unwrap();
        (dir, engine)
    }

    fn root(engine: &Engine) -> Record {
        Record::of(engine, &folder(1, "root", 0)).unwrap()
    }

    #[test]
    fn full_tree() {
        let (_dir, engine) = setup();
        let nav = RelationNavigator::new(engine.clone());
        let tree = Tree::default().build(&nav, root(&engine)).unwrap();
        assert_eq!(tree.size(), 5);
        assert_eq!(tree.depth, 0);
        let a = tree
            .children
            .iter()
            .find(|n| n.kind == "Folder")
            .unwrap();
        assert_eq!(a.depth, 1);
        assert_eq!(a.children.len(), 2);
    }

    #[test]
    fn cascade_only_skips_plain_links() {
        let (_dir, engine) = setup();
        let nav = RelationNavigator::new(engine.clone()).cascade_only(true);
        let tree = Tree::default().build(&nav, root(&engine)).unwrap();
        assert_eq!(tree.size(), 3);
    }

    #[test]
    fn depth_limit() {
        let (_dir, engine) = setup();
        let nav = RelationNavigator::new(engine.clone());
        let tree = Tree::with_depth(1).build(&nav, root(&engine)).unwrap();
        assert_eq!(tree.size(), 3);
        assert!(tree.children.iter().all(|n| n.children.is_empty()));
    }

    struct Custom;

    impl Navigator for Custom {
        fn next(&self, parent: &Record) -> StoreResult<Vec<Record>> {
            if parent.pk == Value::Integer(0) {
                Ok(vec![Record {
                    kind: "Leaf".into(),
                    pk: Value::Integer(1),
                    row: Row::new().with("label", "leaf"),
                }])
            } else {
                Ok(Vec::new())
            }
        }

        fn node(&self, parent: Option<&TreeNode>, record: Record) -> TreeNode {
            TreeNode {
                kind: record.kind.to_uppercase(),
                row: record.row,
                depth: parent.map_or(0, |p| p.depth + 1),
                children: Vec::new(),
            }
        }
    }

    #[test]
    fn custom_navigator_shapes_nodes() {
        let root = Record {
            kind: "Root".into(),
            pk: Value::Integer(0),
            row: Row::new(),
        };
        let tree = Tree::default().build(&Custom, root).unwrap();
        assert_eq!(tree.kind, "ROOT");
        assert_eq!(tree.children[0].kind, "LEAF");
        assert_eq!(tree.children[0].depth, 1);
    }
}
