pub mod cleanup;
pub mod config;
pub mod error;
pub mod format;
pub mod hooks;
pub mod io;
pub mod paths;
pub mod projects;
pub mod snapshot;
pub mod transcript;

pub use error::{CcxError, Result};
