//! Annexe: a standalone published file, replaceable in place.

use crate::store::interfaces::ReUploadFileInterface;
use crate::store::{Entity, StoreEntity};

pub struct Annexe {
    entity: Entity,
}

impl StoreEntity for Annexe {
    const ENTITY_NAME: &'static str = "annexe";
    const ENTITY_TITLE: &'static str = "annexe";

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

impl ReUploadFileInterface for Annexe {}
