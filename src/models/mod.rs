//! Data Models
//!
//! Settings and REST API data structures.

pub mod api;
pub mod settings;

pub use api::*;
pub use settings::*;
