//! Statistics buffers.
//!
//! Plain records accumulated during a run and flushed to CSV once at the
//! end. All numeric fields, no derived state; the writers format them
//! verbatim.

use crate::{BatteryKwh, Timestamp};

/// Per-vehicle cost and utilisation breakdown over the whole run.
#[derive(Debug, Clone, Default)]
pub struct VehicleStats {
    pub vehicle_id: u32,
    pub in_rotation: bool,
    pub cost_deadlegs: f64,
    pub cost_maintenance: f64,
    pub cost_vehicle: f64,
    pub km_deadlegs: f64,
    pub km_avg_distance_maintenance: Option<f64>,
    pub km_std_distance_maintenance: Option<f64>,
    pub lb_soc: BatteryKwh,
    pub ub_soc: BatteryKwh,
    pub seconds_productive: i64,
    pub seconds_idle: i64,
    pub seconds_charging: i64,
    pub seconds_maintenance: i64,
}

/// One sample of a charger's occupancy time series.
#[derive(Debug, Clone, Default)]
pub struct ChargerStats {
    pub charger_id: u32,
    pub charger_capacity: u32,
    pub timestamp: Timestamp,
    pub vehicles_at_charger: u32,
}

/// Whole-schedule cost summary.
#[derive(Debug, Clone, Default)]
pub struct ScheduleStats {
    pub cost_deadlegs: f64,
    pub cost_maintenance: f64,
    pub cost_vehicles: f64,
    pub cost_unassigned_trips: f64,
    pub cost_total: f64,
}

/// Outcome of one planning horizon.
#[derive(Debug, Clone)]
pub struct PlanningHorizonStats {
    pub index_planning_horizon: usize,
    pub start_planning_horizon: Timestamp,
    pub end_planning_horizon: Timestamp,
    pub end_overlap_planning_horizon: Timestamp,
    pub algorithm: String,
    pub lb_integer: f64,
    pub ub_integer: f64,
    pub unassigned_trips: u32,
    pub vehicles_selected: u32,
    pub branching_tree_size: u32,
    pub branching_tree_depth: u32,
    pub pp_nr_segments: u32,
    pub time_total_ms: i64,
    pub time_mp_solver_ms: i64,
    pub time_pp_solver_ms: i64,
    pub time_mp_filter_vars_ms: i64,
    pub time_pp_filter_nodes_ms: i64,
    pub pp_network_construction_ms: i64,
}

impl Default for PlanningHorizonStats {
    fn default() -> Self {
        Self {
            index_planning_horizon: 0,
            start_planning_horizon: 0,
            end_planning_horizon: 0,
            end_overlap_planning_horizon: 0,
            algorithm: String::new(),
            lb_integer: f64::NEG_INFINITY,
            ub_integer: f64::INFINITY,
            unassigned_trips: 0,
            vehicles_selected: 0,
            branching_tree_size: 1,
            branching_tree_depth: 0,
            pp_nr_segments: 0,
            time_total_ms: 0,
            time_mp_solver_ms: 0,
            time_pp_solver_ms: 0,
            time_mp_filter_vars_ms: 0,
            time_pp_filter_nodes_ms: 0,
            pp_network_construction_ms: 0,
        }
    }
}

impl PlanningHorizonStats {
    /// Relative integer optimality gap of this horizon.
    pub fn gap_integer(&self) -> f64 {
        if !self.ub_integer.is_finite() || !self.lb_integer.is_finite() {
            return f64::INFINITY;
        }
        (self.ub_integer - self.lb_integer).abs() / self.ub_integer.abs().max(1e-10)
    }
}

/// One line per column-generation iteration / branching event.
#[derive(Debug, Clone)]
pub struct PerformanceDetail {
    pub index_planning_horizon: usize,
    pub index_branching_node: usize,
    pub index_parent_branching_node: Option<usize>,
    pub iteration: u32,
    pub branch_kind: String,
    pub branch_value: Option<f64>,
    pub fractional_value: Option<f64>,
    pub lb_relaxed: f64,
    pub ub_relaxed: f64,
    pub lb_integer: f64,
    pub ub_integer: f64,
    pub integer_found: bool,
    pub columns_added: u32,
    pub lazy_constraint_added: Option<String>,
    pub mp_size_variables: u32,
    pub mp_size_constraints: u32,
    pub pp_network_size_nodes: u32,
    pub pp_network_size_arcs: u32,
    pub time_mp_solver_ms: i64,
    pub time_pp_solver_ms: i64,
    pub time_mp_filter_vars_ms: i64,
    pub time_pp_filter_nodes_ms: i64,
    pub time_strong_branch_ms: i64,
    pub time_aux_cg_ms: i64,
    pub pp_network_construction_ms: i64,
}

impl Default for PerformanceDetail {
    fn default() -> Self {
        Self {
            index_planning_horizon: 0,
            index_branching_node: 0,
            index_parent_branching_node: None,
            iteration: 0,
            branch_kind: String::new(),
            branch_value: None,
            fractional_value: None,
            lb_relaxed: f64::NEG_INFINITY,
            ub_relaxed: f64::INFINITY,
            lb_integer: f64::NEG_INFINITY,
            ub_integer: f64::INFINITY,
            integer_found: false,
            columns_added: 0,
            lazy_constraint_added: None,
            mp_size_variables: 0,
            mp_size_constraints: 0,
            pp_network_size_nodes: 0,
            pp_network_size_arcs: 0,
            time_mp_solver_ms: 0,
            time_pp_solver_ms: 0,
            time_mp_filter_vars_ms: 0,
            time_pp_filter_nodes_ms: 0,
            time_strong_branch_ms: 0,
            time_aux_cg_ms: 0,
            pp_network_construction_ms: 0,
        }
    }
}

impl PerformanceDetail {
    pub fn gap_relaxed(&self) -> f64 {
        if !self.ub_relaxed.is_finite() || !self.lb_relaxed.is_finite() {
            return f64::INFINITY;
        }
        (self.ub_relaxed - self.lb_relaxed).abs() / self.ub_relaxed.abs().max(1e-10)
    }

    pub fn gap_integer(&self) -> f64 {
        if !self.ub_integer.is_finite() || !self.lb_integer.is_finite() {
            return f64::INFINITY;
        }
        (self.ub_integer - self.lb_integer).abs() / self.ub_integer.abs().max(1e-10)
    }
}

/// All statistics buffers of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub vehicles: Vec<VehicleStats>,
    pub chargers: Vec<ChargerStats>,
    pub schedule: Vec<ScheduleStats>,
    pub planning_horizons: Vec<PlanningHorizonStats>,
    pub performance: Vec<PerformanceDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_with_infinite_bounds() {
        let stats = PlanningHorizonStats::default();
        assert!(stats.gap_integer().is_infinite());
    }

    #[test]
    fn test_gap_closed() {
        let stats = PlanningHorizonStats {
            lb_integer: 100.0,
            ub_integer: 100.0,
            ..PlanningHorizonStats::default()
        };
        assert!(stats.gap_integer() < 1e-12);
    }
}
