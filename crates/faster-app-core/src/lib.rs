//! # faster-app-core
//!
//! Core types for the faster-app toolkit: the error taxonomy, settings and
//! their loaders, logging setup, and the application lifecycle registry.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Settings and the global settings slot
//! - [`settings_loader`] - TOML / JSON / environment loading
//! - [`apps`] - Application lifecycle registry
//! - [`logging`] - Tracing-based logging integration

pub mod apps;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use apps::{AppLifecycle, AppRegistry, AppState};
pub use error::{AppError, AppResult, ErrorContext, ValidationError};
pub use settings::{RouteValidationMode, Settings, SETTINGS};
