//! # ormkit-core
//!
//! Error types, settings, and logging setup shared by every ormkit crate.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and result alias
//! - [`settings`] - Logging and database connection settings
//! - [`settings_loader`] - TOML/JSON settings files with environment overrides
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

pub use error::{OrmError, OrmResult};
pub use settings::{DatabaseSettings, Settings};
