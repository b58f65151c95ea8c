//! Datastore: the tenant every scoped route lives under. Read-only here.

use crate::store::{Entity, StoreEntity};

pub struct Datastore {
    entity: Entity,
}

impl StoreEntity for Datastore {
    const ENTITY_NAME: &'static str = "datastore";
    const ENTITY_TITLE: &'static str = "datastore";

    fn from_entity(entity: Entity) -> Self {
        Self { entity }
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}
