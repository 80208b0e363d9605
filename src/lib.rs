//! Filter-and-aggregation engine for NYC motor vehicle collision data.
//!
//! A [`Dataset`] holds the crash and person tables behind one query surface
//! ([`Table`]) regardless of whether they live in memory, are scanned
//! lazily, or were sampled down. A [`Dashboard`] owns the dataset and turns
//! a [`FilterModel`] into a [`Report`] of eleven views.

pub mod aggregate;
pub mod cli;
pub mod compress;
pub mod config;
pub mod dashboard;
pub mod filter;
pub mod schema;
pub mod search;
pub mod source;
pub mod table;

pub use aggregate::{Report, View, ViewLimits};
pub use cli::Args;
pub use config::{AppConfig, ConfigManager};
pub use dashboard::{Dashboard, FilterOptions};
pub use filter::{FilterModel, Predicates, RawFilters, Selection};
pub use schema::SchemaCatalog;
pub use search::{ParsedQuery, QueryParser};
pub use source::{Dataset, OpenOptions};
pub use table::{Backend, Table};

/// Application name used for the config directory and environment prefix
pub const APP_NAME: &str = "collision-dash";
