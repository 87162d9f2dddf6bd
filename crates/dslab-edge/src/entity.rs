//! Simulated entities and references between them.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Type tag of a simulated entity.
///
/// Type names not known to the simulator are preserved as [`EntityKind::Other`], so that datasets describing
/// additional infrastructure elements can still be loaded and exported.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    EdgeServer,
    User,
    Service,
    NetworkSwitch,
    BaseStation,
    Other(String),
}

impl EntityKind {
    /// Returns the type name used in datasets and log file names.
    pub fn name(&self) -> &str {
        match self {
            EntityKind::EdgeServer => "EdgeServer",
            EntityKind::User => "User",
            EntityKind::Service => "Service",
            EntityKind::NetworkSwitch => "NetworkSwitch",
            EntityKind::BaseStation => "BaseStation",
            EntityKind::Other(name) => name,
        }
    }

    /// Whether entities of this kind have a resource profile and can host services.
    pub fn is_host(&self) -> bool {
        *self == EntityKind::EdgeServer
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "EdgeServer" => EntityKind::EdgeServer,
            "User" => EntityKind::User,
            "Service" => EntityKind::Service,
            "NetworkSwitch" => EntityKind::NetworkSwitch,
            "BaseStation" => EntityKind::BaseStation,
            other => EntityKind::Other(other.to_string()),
        })
    }
}

impl From<&str> for EntityKind {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl Serialize for EntityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(EntityKind::from(name.as_str()))
    }
}

/// Weak reference to an entity, resolved through the registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "class")]
    pub kind: EntityKind,
    pub id: u32,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: u32) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.id)
    }
}

/// Target of a named relationship: a single entity or a list of entities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Relationship {
    One(EntityRef),
    Many(Vec<EntityRef>),
}

impl Relationship {
    /// Returns all referenced entities.
    pub fn targets(&self) -> Vec<&EntityRef> {
        match self {
            Relationship::One(target) => vec![target],
            Relationship::Many(targets) => targets.iter().collect(),
        }
    }
}

/// Any simulated object: server, user, service, switch, base station.
///
/// Resource capacity of servers and resource demand of services are not stored here, they are owned by
/// [`ResourcePoolState`](crate::resource_pool::ResourcePoolState) together with the placement of services.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub kind: EntityKind,
    pub attributes: IndexMap<String, Value>,
    pub relationships: IndexMap<String, Option<Relationship>>,
}

impl Entity {
    pub fn new(kind: EntityKind, id: u32) -> Self {
        Self {
            id,
            kind,
            attributes: IndexMap::new(),
            relationships: IndexMap::new(),
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind.clone(), self.id)
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute<V: Into<Value>>(&mut self, name: &str, value: V) -> &mut Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name).and_then(|r| r.as_ref())
    }

    pub fn set_relationship(&mut self, name: &str, relationship: Option<Relationship>) -> &mut Self {
        self.relationships.insert(name.to_string(), relationship);
        self
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.id)
    }
}
