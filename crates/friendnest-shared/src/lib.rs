//! # friendnest-shared
//!
//! Domain vocabulary shared by the store and the HTTP server: enums that are
//! persisted as text, user settings, validation helpers and constants.

pub mod constants;
pub mod error;
pub mod settings;
pub mod types;
pub mod validation;

pub use error::{ParseEnumError, ValidationError};
pub use settings::UserSettings;
pub use types::*;
