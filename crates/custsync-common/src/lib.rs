//! Custsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, error handling and logging for the custsync workspace.
//!
//! - **Types**: [`types::CustomerRecord`] and [`types::CustomerFields`], the
//!   customer shapes both sync directions agree on
//! - **Error Handling**: [`CustsyncError`] and the [`Result`] alias
//! - **Logging**: [`logging::init_logging`] and its configuration

pub mod error;
pub mod logging;
pub mod types;

pub use error::{CustsyncError, Result};
