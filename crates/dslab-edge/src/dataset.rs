//! Dataset documents describing the simulated infrastructure.
//!
//! A dataset maps entity type names to lists of records. Each record holds plain `attributes` (including the
//! required `id`) and `relationships` referring to other entities by type and id:
//!
//! ```json
//! {
//!   "EdgeServer": [
//!     {"attributes": {"id": 1, "cpu": 10, "memory": 16, "disk": 100},
//!      "relationships": {"services": [{"class": "Service", "id": 1}]}}
//!   ],
//!   "Service": [
//!     {"attributes": {"id": 1, "cpu_demand": 4, "memory_demand": 2, "disk_demand": 0},
//!      "relationships": {"server": {"class": "EdgeServer", "id": 1}}}
//!   ]
//! }
//! ```
//!
//! Resource capacity of servers (`cpu`, `memory`, `disk`), resource demand of services (`cpu_demand`,
//! `memory_demand`, `disk_demand`) and placement relationships (`server` of a service, `services` of a server) are
//! moved to the resource pool on loading and written back on export.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{Entity, EntityKind, EntityRef, Relationship};
use crate::error::{Result, SimError};
use crate::model::Model;
use crate::resource_pool::Resources;

const ID_ATTRIBUTE: &str = "id";
const CAPACITY_ATTRIBUTES: [&str; 3] = ["cpu", "memory", "disk"];
const DEMAND_ATTRIBUTES: [&str; 3] = ["cpu_demand", "memory_demand", "disk_demand"];
const SERVICE_HOST_RELATIONSHIP: &str = "server";
const HOSTED_SERVICES_RELATIONSHIP: &str = "services";

/// Description of a single entity in a dataset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
    #[serde(default)]
    pub relationships: IndexMap<String, Option<Relationship>>,
}

impl EntityRecord {
    fn id(&self, kind: &EntityKind, index: usize) -> Result<u32> {
        self.attributes
            .get(ID_ATTRIBUTE)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| SimError::MissingAttribute {
                entity: format!("{} record #{}", kind, index),
                attribute: ID_ATTRIBUTE.to_string(),
            })
    }
}

/// Dataset document: entity records grouped by type name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    entities: IndexMap<EntityKind, Vec<EntityRecord>>,
}

impl Dataset {
    /// Creates empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses dataset from in-memory JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads dataset from JSON file, or from YAML file if the file has `.yaml` or `.yml` extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        if is_yaml(path) {
            Ok(serde_yaml::from_reader(file)?)
        } else {
            Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
        }
    }

    /// Downloads JSON dataset.
    #[cfg(feature = "remote")]
    pub fn from_url(url: &str) -> Result<Self> {
        let body = reqwest::blocking::get(url)?.error_for_status()?.text()?;
        Self::from_json_str(&body)
    }

    /// Loads dataset from URL (`http://` or `https://`) or local file path.
    pub fn load(source: &str) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            #[cfg(feature = "remote")]
            return Self::from_url(source);
            #[cfg(not(feature = "remote"))]
            return Err(SimError::InvalidDataset(format!(
                "can't fetch {}: built without `remote` feature",
                source
            )));
        }
        Self::from_file(source)
    }

    /// Writes dataset to JSON file, or to YAML file if the file has `.yaml` or `.yml` extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        if is_yaml(path) {
            serde_yaml::to_writer(writer, self)?;
        } else {
            serde_json::to_writer_pretty(writer, self)?;
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Appends a record of the specified type.
    pub fn add_record(&mut self, kind: EntityKind, record: EntityRecord) {
        self.entities.entry(kind).or_default().push(record);
    }

    pub fn records(&self, kind: &EntityKind) -> &[EntityRecord] {
        self.entities.get(kind).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
        self.entities.keys()
    }

    /// Returns the total number of records.
    pub fn len(&self) -> usize {
        self.entities.values().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exports all entities of the model, including resources and placement of services.
    pub fn from_model(model: &Model) -> Self {
        let mut dataset = Dataset::new();
        let pool = model.pool();
        for kind in model.registry().kinds() {
            for entity in model.registry().all(kind) {
                let mut record = EntityRecord::default();
                record.attributes.insert(ID_ATTRIBUTE.to_string(), entity.id.into());
                for (name, value) in &entity.attributes {
                    record.attributes.insert(name.clone(), value.clone());
                }
                record.relationships = entity.relationships.clone();
                match kind {
                    EntityKind::EdgeServer => {
                        if let Some(host) = pool.host(entity.id) {
                            insert_resources(&mut record.attributes, &CAPACITY_ATTRIBUTES, &host.capacity);
                            let services = host
                                .services
                                .iter()
                                .map(|id| EntityRef::new(EntityKind::Service, *id))
                                .collect();
                            record.relationships.insert(
                                HOSTED_SERVICES_RELATIONSHIP.to_string(),
                                Some(Relationship::Many(services)),
                            );
                        }
                    }
                    EntityKind::Service => {
                        if let Some(service) = pool.service(entity.id) {
                            insert_resources(&mut record.attributes, &DEMAND_ATTRIBUTES, &service.demand);
                            let server = service
                                .host
                                .map(|id| Relationship::One(EntityRef::new(EntityKind::EdgeServer, id)));
                            record
                                .relationships
                                .insert(SERVICE_HOST_RELATIONSHIP.to_string(), server);
                        }
                    }
                    _ => {}
                }
                dataset.add_record(kind.clone(), record);
            }
        }
        dataset
    }

    /// Creates entities described by the dataset in the model.
    ///
    /// All entities are created first, then relationships are resolved, so references to entities of types listed
    /// later in the document are allowed. On error the model may be partially populated.
    pub(crate) fn populate(&self, model: &mut Model) -> Result<()> {
        // create entities and register resources
        for (kind, records) in &self.entities {
            for (index, record) in records.iter().enumerate() {
                let id = record.id(kind, index)?;
                let mut entity = Entity::new(kind.clone(), id);
                let mut attributes = record.attributes.clone();
                attributes.shift_remove(ID_ATTRIBUTE);
                let entity_ref = entity.entity_ref();
                let resources = match kind {
                    EntityKind::EdgeServer => Some(take_resources(&mut attributes, &CAPACITY_ATTRIBUTES, &entity_ref)?),
                    EntityKind::Service => Some(take_resources(&mut attributes, &DEMAND_ATTRIBUTES, &entity_ref)?),
                    _ => None,
                };
                entity.attributes = attributes;
                entity.relationships = record
                    .relationships
                    .iter()
                    .filter(|(name, _)| !is_placement_relationship(kind, name))
                    .map(|(name, r)| (name.clone(), r.clone()))
                    .collect();
                model.registry_mut().insert(entity)?;
                match (kind, resources) {
                    (EntityKind::EdgeServer, Some(capacity)) => model.pool_mut().add_host(id, capacity)?,
                    (EntityKind::Service, Some(demand)) => model.pool_mut().add_service(id, demand)?,
                    _ => {}
                }
            }
        }

        // resolve relationships
        for (kind, records) in &self.entities {
            for (index, record) in records.iter().enumerate() {
                let from = EntityRef::new(kind.clone(), record.id(kind, index)?);
                for (name, relationship) in &record.relationships {
                    let targets = match relationship {
                        Some(relationship) => relationship.targets(),
                        None => continue,
                    };
                    for target in targets {
                        if !model.registry().contains(target) {
                            return Err(SimError::UnresolvedRelationship {
                                from: from.clone(),
                                name: name.clone(),
                                target: target.clone(),
                            });
                        }
                    }
                }
            }
        }

        // place services, then check that servers agree with their services
        for (index, record) in self.records(&EntityKind::Service).iter().enumerate() {
            let service_id = record.id(&EntityKind::Service, index)?;
            match record.relationships.get(SERVICE_HOST_RELATIONSHIP) {
                Some(Some(Relationship::One(server))) if server.kind == EntityKind::EdgeServer => {
                    model.provision(service_id, server.id)?;
                }
                Some(Some(_)) => {
                    return Err(SimError::InvalidDataset(format!(
                        "relationship `{}` of Service_{} must refer to a single EdgeServer",
                        SERVICE_HOST_RELATIONSHIP, service_id
                    )))
                }
                _ => {}
            }
        }
        for (index, record) in self.records(&EntityKind::EdgeServer).iter().enumerate() {
            let server_id = record.id(&EntityKind::EdgeServer, index)?;
            let services = match record.relationships.get(HOSTED_SERVICES_RELATIONSHIP) {
                Some(Some(relationship)) => relationship.targets(),
                _ => continue,
            };
            for service in services {
                if service.kind != EntityKind::Service || model.pool().host_of(service.id) != Some(server_id) {
                    return Err(SimError::InvalidDataset(format!(
                        "EdgeServer_{} lists {} which is not placed on it",
                        server_id, service
                    )));
                }
            }
        }
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn is_placement_relationship(kind: &EntityKind, name: &str) -> bool {
    match kind {
        EntityKind::EdgeServer => name == HOSTED_SERVICES_RELATIONSHIP,
        EntityKind::Service => name == SERVICE_HOST_RELATIONSHIP,
        _ => false,
    }
}

fn take_resource(attributes: &mut IndexMap<String, Value>, name: &str, entity: &EntityRef) -> Result<u64> {
    match attributes.shift_remove(name) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| SimError::MissingAttribute {
            entity: entity.to_string(),
            attribute: name.to_string(),
        }),
    }
}

fn take_resources(
    attributes: &mut IndexMap<String, Value>,
    names: &[&str; 3],
    entity: &EntityRef,
) -> Result<Resources> {
    let cpu = take_resource(attributes, names[0], entity)?;
    let cpu = u32::try_from(cpu).map_err(|_| SimError::MissingAttribute {
        entity: entity.to_string(),
        attribute: names[0].to_string(),
    })?;
    let memory = take_resource(attributes, names[1], entity)?;
    let disk = take_resource(attributes, names[2], entity)?;
    Ok(Resources::new(cpu, memory, disk))
}

fn insert_resources(attributes: &mut IndexMap<String, Value>, names: &[&str; 3], resources: &Resources) {
    attributes.insert(names[0].to_string(), resources.cpu.into());
    attributes.insert(names[1].to_string(), resources.memory.into());
    attributes.insert(names[2].to_string(), resources.disk.into());
}
