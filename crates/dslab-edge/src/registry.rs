//! Per-type collections of simulated entities.

use indexmap::IndexMap;
use serde_json::Value;

use crate::entity::{Entity, EntityKind, EntityRef};
use crate::error::{Result, SimError};

#[derive(Default, Clone)]
struct Collection {
    entities: IndexMap<u32, Entity>,
    max_id: u32,
}

/// Stores all entities of the simulation grouped by type.
///
/// Collections are append-only and keep creation order, which is also the iteration order of [`all`](Self::all).
/// Identifiers are assigned per type as the previous maximum plus one and are never reused.
#[derive(Default, Clone)]
pub struct EntityRegistry {
    collections: IndexMap<EntityKind, Collection>,
}

impl EntityRegistry {
    /// Creates empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier the next created entity of the specified type will get.
    pub fn next_id(&self, kind: &EntityKind) -> Result<u32> {
        let max_id = self.collections.get(kind).map_or(0, |collection| collection.max_id);
        max_id.checked_add(1).ok_or_else(|| SimError::IdsExhausted(kind.clone()))
    }

    /// Creates a new entity of the specified type with the next free identifier.
    pub fn create(&mut self, kind: EntityKind) -> Result<&mut Entity> {
        let id = self.next_id(&kind)?;
        let collection = self.collections.entry(kind.clone()).or_default();
        collection.max_id = id;
        Ok(collection.entities.entry(id).or_insert_with(|| Entity::new(kind, id)))
    }

    /// Adds an entity with a predetermined identifier.
    pub fn insert(&mut self, entity: Entity) -> Result<&mut Entity> {
        let collection = self.collections.entry(entity.kind.clone()).or_default();
        if collection.entities.contains_key(&entity.id) {
            return Err(SimError::DuplicateEntity(entity.entity_ref()));
        }
        let id = entity.id;
        collection.max_id = collection.max_id.max(id);
        Ok(collection.entities.entry(id).or_insert(entity))
    }

    /// Returns entities of the specified type in creation order.
    pub fn all<'a>(&'a self, kind: &EntityKind) -> impl Iterator<Item = &'a Entity> + 'a {
        self.collections
            .get(kind)
            .into_iter()
            .flat_map(|collection| collection.entities.values())
    }

    /// Returns identifiers of entities of the specified type in creation order.
    pub fn ids(&self, kind: &EntityKind) -> Vec<u32> {
        self.all(kind).map(|e| e.id).collect()
    }

    pub fn find_by_id(&self, kind: &EntityKind, id: u32) -> Result<&Entity> {
        self.collections
            .get(kind)
            .and_then(|collection| collection.entities.get(&id))
            .ok_or_else(|| SimError::EntityNotFound(EntityRef::new(kind.clone(), id)))
    }

    pub fn find_by_id_mut(&mut self, kind: &EntityKind, id: u32) -> Result<&mut Entity> {
        self.collections
            .get_mut(kind)
            .and_then(|collection| collection.entities.get_mut(&id))
            .ok_or_else(|| SimError::EntityNotFound(EntityRef::new(kind.clone(), id)))
    }

    /// Resolves a reference to the entity.
    pub fn resolve(&self, target: &EntityRef) -> Result<&Entity> {
        self.find_by_id(&target.kind, target.id)
    }

    /// Returns the first entity (in creation order) whose attribute equals the value.
    pub fn find_by(&self, kind: &EntityKind, attribute: &str, value: &Value) -> Result<&Entity> {
        self.all(kind)
            .find(|e| e.attribute(attribute) == Some(value))
            .ok_or_else(|| SimError::EntityNotFoundBy {
                kind: kind.clone(),
                attribute: attribute.to_string(),
                value: value.clone(),
            })
    }

    pub fn contains(&self, target: &EntityRef) -> bool {
        self.find_by_id(&target.kind, target.id).is_ok()
    }

    /// Returns the number of entities of the specified type.
    pub fn count(&self, kind: &EntityKind) -> usize {
        self.collections.get(kind).map_or(0, |collection| collection.entities.len())
    }

    /// Returns types in order of the first created entity.
    pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
        self.collections.keys()
    }

    /// Removes all entities of all types.
    pub fn reset(&mut self) {
        self.collections.clear();
    }
}
