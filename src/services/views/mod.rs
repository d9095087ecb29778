//! UI Projections
//!
//! Hub consumers that turn session updates into what a UI surface shows.

pub mod status_bar;

pub use status_bar::{StatusBarItem, StatusBarView, StatusIcon};
