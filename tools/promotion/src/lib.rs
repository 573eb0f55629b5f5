//! Promotion gate for engine configurations
//!
//! A candidate configuration is promoted over a baseline only when:
//! - all three engine runs (baseline, candidate twice) exit cleanly
//! - both journals pass strict verification
//! - the two candidate runs are identical after normalisation
//! - data QA, risk, trade, PnL, drawdown, sentiment and penalty checks hold
//!
//! The decision is a [`PromotionResult`] (`PROMOTION_RESULT_V1`).

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod analysis;
pub mod checks;
pub mod error;
pub mod gate;
pub mod result;
pub mod runner;

pub use analysis::{DataQaFacts, RunAnalysis, RunFacts, analyze_run, max_drawdown};
pub use checks::{PenaltyParity, RiskParity, SentimentParity};
pub use error::{PromotionError, Result};
pub use gate::{DETERMINISM_DIFF_FILE, DeterminismGate, GateOptions};
pub use result::{Decision, PromotionResult, RESULT_TYPE};
pub use runner::{EngineRunner, ProcessEngineRunner, RunLabel, RunOutcome, RunRequest};
