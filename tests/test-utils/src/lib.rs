//! Test utilities and fixtures for the riskgate workspace
//!
//! This module provides:
//! - Journal and trades file builders
//! - rstest fixtures for healthy journals and config documents
//! - Assertions for hashes and violation lists

pub mod assertions;
pub mod factories;
pub mod fixtures;
pub mod helpers;

pub use assertions::*;
pub use factories::*;
pub use fixtures::*;
pub use helpers::*;
