//! Journal codec: append-only event journals, trades files and the canonical
//! byte forms used for hashing and determinism checks

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod canonical;
pub mod dataversion;
pub mod error;
pub mod journal;
pub mod meta;
pub mod rows;
pub mod tracker;
pub mod trades;

pub use canonical::{canonical_json, canonicalize_csv, canonicalize_json_text, sha256_hex};
pub use dataversion::{DataVersion, FileRows};
pub use error::{CodecError, Result};
pub use journal::{EVENTS_HEADER, EventColumns, JournalFile, JournalWriter, RecordedEvent};
pub use meta::JournalMeta;
pub use tracker::{BarKeyTracker, TrackerSnapshot};
pub use trades::{Direction, TRADES_HEADER, TradeRow, TradeStamp, TradesFile, TradesWriter};
