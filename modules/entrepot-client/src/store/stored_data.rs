//! Stored data (donnée stockée): a processed dataset such as a vector
//! database, a pyramid or an index.

use crate::store::interfaces::{CommentInterface, SharingInterface, TagInterface};
use crate::store::{Entity, StoreEntity};

pub struct StoredData {
    entity: Entity,
}

impl StoreEntity for StoredData {
    const ENTITY_NAME: &'static str = "stored_data";
    const ENTITY_TITLE: &'static str = "donnée stockée";

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

impl TagInterface for StoredData {}
impl CommentInterface for StoredData {}
impl SharingInterface for StoredData {}

impl StoredData {
    pub const STATUS_CREATED: &'static str = "CREATED";
    pub const STATUS_GENERATING: &'static str = "GENERATING";
    pub const STATUS_MODIFYING: &'static str = "MODIFYING";
    pub const STATUS_GENERATED: &'static str = "GENERATED";
    pub const STATUS_UNSTABLE: &'static str = "UNSTABLE";

    pub fn status(&self) -> &str {
        self.entity.status()
    }
}
