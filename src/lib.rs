//! Dependency-ordered seeding of the karmafarm document store.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod lookup;
pub mod models;
pub mod store;
pub mod views;

pub use bootstrap::{Bootstrap, BootstrapOutcome, BootstrapSummary, Stage};
pub use error::{BootstrapError, LoadError, StoreError};
pub use loader::Catalog;
