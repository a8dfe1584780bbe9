//! Foundation module - Core utilities and types
//!
//! - Math types and the scene transform
//! - Logging setup

pub mod logging;
pub mod math;
