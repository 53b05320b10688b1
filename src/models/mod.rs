//! Domain models for inlay.
//!
//! # Core Concepts
//!
//! ## Persisted Entities
//!
//! - [`Container`]: Top-level entity owning one or more fields of embedded records.
//! - [`EmbeddedRecord`]: Plain sub-entity stored inline in a container field.
//! - [`EffectDescriptor`]: Attribute changes plus the lifecycle duration of a record.
//! - [`Group`]: Named, collapsible bucket of records within one container.
//!
//! ## Permissions
//!
//! - [`Ownership`], [`OwnershipLevel`]: Who may see or change a container.
//! - [`Viewer`]: The user a permission question is asked for.

mod container;
mod effect;
mod group;
mod permission;
mod record;

pub use container::*;
pub use effect::*;
pub use group::*;
pub use permission::*;
pub use record::*;
