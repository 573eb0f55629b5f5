//! Common types shared by the risk engine, the journal codec and the
//! verification tooling

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod events;
pub mod modes;
pub mod types;

pub use events::EventType;
pub use modes::{FeatureMode, RiskMode};
pub use types::*;
