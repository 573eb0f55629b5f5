//! Journal verification tooling
//!
//! - [`lenient`]: envelope and per-row sanity checks with an issue cap
//! - [`strict`]: ordering, required fields, numeric format and trade cross-checks
//! - [`deep`]: both passes plus journal statistics
//! - [`diff`]: composite-key set difference between two journals
//! - [`parity`]: canonical whole-file hashes for determinism checks
//!
//! Fatal problems (missing files, broken envelope, unsplittable rows) come
//! back as [`VerifyError`]; everything else is reported in the run's report.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod deep;
pub mod diff;
pub mod error;
pub mod lenient;
pub mod parity;
pub mod payload;
pub mod strict;

pub use deep::{DeepOptions, DeepReport, DeepStats, verify_deep};
pub use diff::{DiffOutcome, diff_journals, infer_default_keys};
pub use error::{EXIT_FATAL, EXIT_OK, EXIT_VIOLATIONS, Result, VerifyError};
pub use lenient::{JournalIssue, LenientOptions, LenientReport, verify_journal};
pub use parity::{ParityDiff, ParityReport, ParitySection, parity_snapshot};
pub use strict::{StrictOptions, StrictReport, StrictViolation, ViolationKind, verify_strict};
