//! Sample models.
//!
//! `Item` is the plain revisioned kind. `Parent`, `Child` and `Leaf` form a
//! three-level cascade. `Tagged` carries labels. `Host` and `Vm` use keys,
//! detail levels, a generated primary key, an encoded field and a virtual
//! field.

use invdb_core::{labels, DataModel, FieldType, Labels, Model, Row, Schema, StoreResult};
use serde::{Deserialize, Serialize};

/// Plain kind with an optimistic revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    /// Primary key.
    pub id: i64,
    /// Name.
    pub name: String,
    /// Revision.
    pub rev: i64,
}

impl Item {
    /// A fresh (unsaved) item.
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            rev: 0,
        }
    }
}

impl Model for Item {
    const KIND: &'static str = "Item";

    fn schema() -> Schema {
        Schema::new(Self::KIND)
            .field("id", FieldType::Integer, "pk")
            .field("name", FieldType::String, "")
            .field("rev", FieldType::Integer, "incremented")
    }

    fn encode(&self, row: &mut Row) -> StoreResult<()> {
        row.set("id", self.id)
            .set("name", &self.name)
            .set("rev", self.rev);
        Ok(())
    }

    fn decode(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            rev: row.get("rev")?,
        })
    }
}

/// Root of the cascade chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parent {
    /// Primary key.
    pub id: i64,
    /// Name.
    pub name: String,
}

impl Parent {
    /// A parent named after its id.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: format!("parent-{id}"),
        }
    }
}

impl Model for Parent {
    const KIND: &'static str = "Parent";

    fn schema() -> Schema {
        Schema::new(Self::KIND)
            .field("id", FieldType::Integer, "pk")
            .field("name", FieldType::String, "")
    }

    fn encode(&self, row: &mut Row) -> StoreResult<()> {
        row.set("id", self.id).set("name", &self.name);
        Ok(())
    }

    fn decode(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

/// Owned by a `Parent`; deleted with it. Labeled with its owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Child {
    /// Primary key.
    pub id: i64,
    /// Owning parent.
    pub parent: i64,
}

impl Child {
    /// A child of `parent`.
    pub fn new(id: i64, parent: i64) -> Self {
        Self { id, parent }
    }
}

impl Model for Child {
    const KIND: &'static str = "Child";

    fn schema() -> Schema {
        Schema::new(Self::KIND)
            .field("id", FieldType::Integer, "pk")
            .field("parent", FieldType::Integer, "fk(Parent +must +cascade)")
    }

    fn encode(&self, row: &mut Row) -> StoreResult<()> {
        row.set("id", self.id).set("parent", self.parent);
        Ok(())
    }

    fn decode(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            parent: row.get("parent")?,
        })
    }

    fn labels(&self) -> Labels {
        let owner = format!("parent-{}", self.parent);
        labels(&[("owner", owner.as_str())])
    }
}

/// Owned by a `Child` through an unenforced cascading link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leaf {
    /// Primary key.
    pub id: i64,
    /// Owning child.
    pub child: i64,
}

impl Leaf {
    /// A leaf of `child`.
    pub fn new(id: i64, child: i64) -> Self {
        Self { id, child }
    }
}

impl Model for Leaf {
    const KIND: &'static str = "Leaf";

    fn schema() -> Schema {
        Schema::new(Self::KIND)
            .field("id", FieldType::Integer, "pk")
            .field("child", FieldType::Integer, "fk(Child +cascade)")
    }

    fn encode(&self, row: &mut Row) -> StoreResult<()> {
        row.set("id", self.id).set("child", self.child);
        Ok(())
    }

    fn decode(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            child: row.get("child")?,
        })
    }
}

/// Kind whose labels come from the struct.
///
/// Labels live in the side table, so `decode` leaves them empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tagged {
    /// Primary key.
    pub id: i64,
    /// Name.
    pub name: String,
    /// Labels written with the row.
    pub labels: Labels,
}

impl Tagged {
    /// A tagged row.
    pub fn new(id: i64, name: &str, labels: Labels) -> Self {
        Self {
            id,
            name: name.to_string(),
            labels,
        }
    }
}

impl Model for Tagged {
    const KIND: &'static str = "Tagged";

    fn schema() -> Schema {
        Schema::new(Self::KIND)
            .field("id", FieldType::Integer, "pk")
            .field("name", FieldType::String, "")
    }

    fn encode(&self, row: &mut Row) -> StoreResult<()> {
        row.set("id", self.id).set("name", &self.name);
        Ok(())
    }

    fn decode(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            labels: Labels::new(),
        })
    }

    fn labels(&self) -> Labels {
        self.labels.clone()
    }
}

/// Hypervisor host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Host {
    /// Primary key.
    pub id: String,
    /// Unique display name.
    pub name: String,
    /// Cluster name; indexed.
    pub cluster: String,
    /// CPU count, projected from detail 1.
    pub cpus: i64,
    /// In maintenance mode.
    pub maintenance: bool,
    /// Revision.
    pub rev: i64,
}

impl Host {
    /// A host in `cluster`.
    pub fn new(id: &str, cluster: &str, cpus: i64) -> Self {
        Self {
            id: id.to_string(),
            name: format!("{id}.example.com"),
            cluster: cluster.to_string(),
            cpus,
            maintenance: false,
            rev: 0,
        }
    }
}

impl Model for Host {
    const KIND: &'static str = "Host";

    fn schema() -> Schema {
        Schema::new(Self::KIND)
            .field("id", FieldType::String, "pk")
            .field("name", FieldType::String, "key")
            .field("cluster", FieldType::String, "index(cluster)")
            .field("cpus", FieldType::Integer, "d1")
            .field("maintenance", FieldType::Bool, "d1")
            .field("rev", FieldType::Integer, "incremented")
    }

    fn encode(&self, row: &mut Row) -> StoreResult<()> {
        row.set("id", &self.id)
            .set("name", &self.name)
            .set("cluster", &self.cluster)
            .set("cpus", self.cpus)
            .set("maintenance", self.maintenance)
            .set("rev", self.rev);
        Ok(())
    }

    fn decode(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            cluster: row.get("cluster")?,
            cpus: row.get("cpus")?,
            maintenance: row.get("maintenance")?,
            rev: row.get("rev")?,
        })
    }
}

/// Hardware description stored as an encoded field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpec {
    /// Virtual CPUs.
    pub cpus: u32,
    /// Memory in MiB.
    pub memory_mb: u64,
    /// Disk names.
    pub disks: Vec<String>,
}

/// Virtual machine; its key is generated from host and name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vm {
    /// Generated primary key (`host` + `name`).
    pub id: String,
    /// Owning host.
    pub host: String,
    /// Name, unique per host.
    pub name: String,
    /// Hardware, projected from detail 2.
    pub spec: VmSpec,
    /// Engine row id.
    pub row_id: i64,
}

impl Vm {
    /// A VM on `host`.
    pub fn new(host: &str, name: &str, spec: VmSpec) -> Self {
        Self {
            id: String::new(),
            host: host.to_string(),
            name: name.to_string(),
            spec,
            row_id: 0,
        }
    }
}

impl Model for Vm {
    const KIND: &'static str = "Vm";

    fn schema() -> Schema {
        Schema::new(Self::KIND)
            .field("id", FieldType::String, "pk(host;name)")
            .field("host", FieldType::String, "fk(Host +must +cascade),unique(placement)")
            .field("name", FieldType::String, "unique(placement)")
            .field("spec", FieldType::Encoded, "d2")
            .field("row_id", FieldType::Integer, "virtual")
    }

    fn encode(&self, row: &mut Row) -> StoreResult<()> {
        row.set("id", &self.id)
            .set("host", &self.host)
            .set("name", &self.name)
            .set_encoded("spec", &self.spec)?;
        Ok(())
    }

    fn decode(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            host: row.get("host")?,
            name: row.get("name")?,
            spec: row.get_encoded("spec")?,
            row_id: row.get("row_id")?,
        })
    }
}

/// Data model holding every sample kind.
pub fn sample_model() -> DataModel {
    DataModel::builder()
        .with::<Item>()
        .with::<Parent>()
        .with::<Child>()
        .with::<Leaf>()
        .with::<Tagged>()
        .with::<Host>()
        .with::<Vm>()
        .build()
        .expect("sample model must be valid")
}
