//! Utility modules for mailfind.
//!
//! - [`paths`]: Path expansion and default store location

pub mod paths;
