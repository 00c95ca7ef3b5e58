//! Type definitions for airtrack

mod aggregate;
mod alert;
mod error;
mod reading;
mod status;

pub use aggregate::*;
pub use alert::*;
pub use error::*;
pub use reading::*;
pub use status::*;

/// Cache loading warning types
#[derive(Debug, Clone, PartialEq)]
pub enum CacheWarning {
    /// Failed to open or read cache file
    LoadFailed(String),
    /// Cache file was corrupted (invalid JSON)
    Corrupted(String),
}
