//! Mock infrastructure for testing external services
//!
//! This module provides test helpers for external dependencies:
//! - Redis (real server when available, namespaced keys, cleanup)


pub use self::redis::*;
