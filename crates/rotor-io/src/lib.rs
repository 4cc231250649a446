//! # rotor-io: Import and export for the rotation planner
//!
//! Readers for the seven comma-separated input files (locations, travel
//! matrix, chargers, vehicles, trips, maintenances, config) and writers for
//! the schedule and statistics outputs.
//!
//! Input conventions, shared by all files:
//! - optional UTF-8 BOM and an optional `sep=,` preamble line,
//! - a header row detected by a token match and skipped,
//! - lines starting with `#` skipped,
//! - `\r` stripped,
//! - datetimes as `YYYY-MM-DD HH:MM:SS` in UTC.
//!
//! Readers resolve external ids into dense indices eagerly; an unknown id is
//! a [`rotor_core::RotorError::Data`] and aborts the run.

pub mod read;
pub mod write;

pub use read::read_dataset;
pub use write::write_outputs;
