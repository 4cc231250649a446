//! # rotor-core: Electric-Vehicle Rotation Modeling Core
//!
//! Provides the fundamental data structures for electric-vehicle rotation
//! planning: the static input model (locations with a travel matrix,
//! chargers, vehicles, timetabled trips, maintenance slots, configuration)
//! and the persistent **schedule graph** that records every committed
//! activity of every vehicle across planning horizons.
//!
//! ## Design Philosophy
//!
//! The committed history is a **directed multigraph** where:
//! - **Nodes**: activity instances (trips, maintenances, charging phases,
//!   deadlegs, ...) with a uniform time/place/distance surface
//! - **Edges**: ordered arcs carrying only an index and a wait duration
//!
//! Cross-references between entities are dense indices into the owned
//! collections; the graph never holds owning pointers into the input data,
//! so cloning a vertex is cheap and cycles cannot form.
//!
//! ## Modules
//!
//! - [`config`] - Typed run configuration with CSV-overridable keys
//! - [`error`] - Unified error type for the rotor ecosystem
//! - [`model`] - Input entities and their id-indexed collections
//! - [`schedule`] - The committed schedule graph and vehicle-state replay
//! - [`stats`] - Statistics buffers flushed to CSV at the end of a run

use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod model;
pub mod schedule;
pub mod stats;

pub use config::{AlgorithmKind, Config, PricingKind};
pub use error::{RotorError, RotorResult};
pub use model::{
    Charger, DataSet, Location, LocationKind, Maintenance, Trip, TravelMeasure, Vehicle,
};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use schedule::{
    ActivityKind, ScheduleArc, ScheduleGraph, ScheduleNode, Solution, VehicleAssignment,
    VehicleState,
};

/// Unix timestamp in whole seconds, UTC.
pub type Timestamp = i64;

/// State of charge / battery capacity in integer-quantised kWh.
pub type BatteryKwh = i32;

/// Sentinel for "no timestamp" / unbounded future. Never used in arithmetic.
pub const MAX_TIMESTAMP: Timestamp = Timestamp::MAX;

// Newtype wrappers for external ids for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(u32);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargerId(u32);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(u32);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(u32);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaintenanceId(u32);

impl LocationId {
    #[inline]
    pub fn new(value: u32) -> Self {
        LocationId(value)
    }
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl ChargerId {
    #[inline]
    pub fn new(value: u32) -> Self {
        ChargerId(value)
    }
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl VehicleId {
    #[inline]
    pub fn new(value: u32) -> Self {
        VehicleId(value)
    }
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TripId {
    #[inline]
    pub fn new(value: u32) -> Self {
        TripId(value)
    }
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl MaintenanceId {
    #[inline]
    pub fn new(value: u32) -> Self {
        MaintenanceId(value)
    }
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Floating-point comparisons with a fixed tolerance, used everywhere the
/// optimiser compares objective values, duals or LP solution values.
pub mod num {
    pub const EPS: f64 = 1e-6;

    #[inline]
    pub fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= EPS
    }

    #[inline]
    pub fn lt(a: f64, b: f64) -> bool {
        a < b - EPS
    }

    #[inline]
    pub fn le(a: f64, b: f64) -> bool {
        a <= b + EPS
    }

    #[inline]
    pub fn is_integral(v: f64) -> bool {
        approx_eq(v, v.round())
    }
}

/// Datetime parsing and formatting helpers (`YYYY-MM-DD HH:MM:SS`, UTC).
pub mod time {
    use super::Timestamp;
    use crate::error::{RotorError, RotorResult};
    use chrono::NaiveDateTime;

    pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse_datetime(s: &str) -> RotorResult<Timestamp> {
        NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT)
            .map(|dt| dt.and_utc().timestamp())
            .map_err(|e| RotorError::Data(format!("invalid datetime '{s}': {e}")))
    }

    pub fn format_datetime(t: Timestamp) -> String {
        match chrono::DateTime::from_timestamp(t, 0) {
            Some(dt) => dt.format(DATETIME_FORMAT).to_string(),
            None => String::from("-"),
        }
    }

    /// Rounds down to the start of the containing minute.
    pub fn round_to_minute(t: Timestamp) -> Timestamp {
        t - t.rem_euclid(60)
    }

    /// Integer division rounding up, for lattice index arithmetic.
    pub fn div_ceil(x: i64, y: i64) -> i64 {
        (x + y - 1) / y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_round_trip() {
        let t = time::parse_datetime("2023-05-17 06:30:00").unwrap();
        assert_eq!(time::format_datetime(t), "2023-05-17 06:30:00");
    }

    #[test]
    fn test_round_to_minute() {
        let t = time::parse_datetime("2023-05-17 06:30:59").unwrap();
        assert_eq!(time::format_datetime(time::round_to_minute(t)), "2023-05-17 06:30:00");
    }

    #[test]
    fn test_float_compare() {
        assert!(num::approx_eq(1.0, 1.0 + 1e-9));
        assert!(num::lt(1.0, 1.1));
        assert!(!num::lt(1.0, 1.0 + 1e-9));
        assert!(num::is_integral(2.0000000001));
        assert!(!num::is_integral(1.5));
    }

    #[test]
    fn test_id_newtypes() {
        let id = VehicleId::new(17);
        assert_eq!(id.value(), 17);
        assert_ne!(VehicleId::new(1), VehicleId::new(2));
    }
}
