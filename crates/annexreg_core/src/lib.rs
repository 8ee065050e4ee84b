//! annexreg_core — pure domain logic for the Annex IV compliance registry.
//!
//! Everything in this crate is database-free: entity types, closed enums,
//! the typed error model, canonical JSON hashing, completeness scoring,
//! the version lifecycle state machine, evidence metadata validation,
//! deterministic export packaging, and the decision-event schema.
//!
//! Adapters (`annexreg_postgres`, `annexreg_server`) depend on this crate,
//! never the other way round. External collaborators (object storage, the
//! LLM provider) are reached through the traits in [`ports`].

pub mod canonical;
pub mod decision_event;
pub mod diff;
pub mod docx;
pub mod draft;
pub mod error;
pub mod evidence_meta;
pub mod lifecycle;
pub mod manifest;
pub mod package;
pub mod ports;
pub mod principal;
pub mod ratelimit;
pub mod scoring;
pub mod sections;
pub mod types;

pub use error::RegistryError;
pub use principal::CurrentUser;

pub type Result<T> = std::result::Result<T, RegistryError>;
