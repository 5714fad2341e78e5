//! Work item type resolution and widget mutations for GitLab.
//!
//! [`catalog::TypeCatalog`] maps type names to instance ids,
//! [`builder::MutationBuilder`] turns typed widget operations into one
//! mutation input, and [`engine::WorkItemEngine`] ties both to a
//! [`gitlab::Transport`].

pub mod builder;
pub mod capability;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod gitlab;
pub mod model;

pub use catalog::{CatalogHealth, DiscoveryOptions, TypeCatalog};
pub use engine::{CreateRequest, ListFilter, MutationOutcome, WorkItemEngine};
pub use error::EngineError;
