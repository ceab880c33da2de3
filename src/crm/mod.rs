//! Team-owned CRM records and the scoped repository over them.

mod entity;
mod repository;

pub use entity::EntityKind;
pub use repository::{ContactAttempt, CrmError, CrmRepository, EntityRecord, ListParams};
