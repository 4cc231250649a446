//! The restricted master problem.
//!
//! A set-partitioning-style LP over vehicle schedules:
//!
//! - `select[v] ∈ [0,1]` per vehicle (activation),
//! - `unassigned[t] ∈ [0,1]` per trip (penalty slack),
//! - `schedule[v,k] ≥ 0` per generated column,
//! - four auxiliary slacks on the two counting rows, active only during the
//!   phase-1 feasibility restoration.
//!
//! Rows: total-vehicle and total-unassigned counting rows (retargeted by
//! branching), one-schedule-per-vehicle equalities, trip cover equalities,
//! at-most-one rows per maintenance, and **lazy** charger-capacity rows that
//! are materialised only once a concrete violation is measured.
//!
//! The LP handle is owned here and never touched by pricing; duals are
//! mirrored into [`Duals`] right after each solve.

use std::collections::btree_map::BTreeMap;
use std::collections::VecDeque;
use std::time::Instant;

use crate::branch::{Branch, BranchKind, BranchNode};
use crate::column::ColumnSchedule;
use crate::duals::Duals;
use crate::horizon::HorizonView;
use crate::lp::{LpModel, LpSolution, LpStatus};
use petgraph::graph::NodeIndex;
use rotor_core::schedule::{Solution, VehicleAssignment};
use rotor_core::{num, RotorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterStatus {
    Fractional,
    Integer,
    Infeasible,
    Undefined,
}

/// Outcome of one column-insertion round.
#[derive(Debug, Clone, Copy)]
pub struct ColumnsAdded {
    /// Lagrangian bound candidate: master objective plus the per-vehicle
    /// minimum reduced costs of this round.
    pub lb: f64,
    pub count: u32,
}

#[derive(Debug, Clone)]
struct MasterVar {
    col: usize,
    schedule: ColumnSchedule,
}

/// A stored-but-not-yet-added charger-capacity row template.
#[derive(Debug, Clone, Copy)]
struct CapacityRow {
    row: Option<usize>,
    ub: f64,
}

pub struct MasterProblem<'a> {
    view: &'a HorizonView<'a>,
    lp: LpModel,
    solution: Option<LpSolution>,
    status: MasterStatus,
    duals: Duals,

    slack_total_vehicles: (usize, usize),
    slack_total_unassigned: (usize, usize),
    var_select: Vec<usize>,
    var_unassigned: Vec<usize>,
    schedule_vars: Vec<Vec<MasterVar>>,
    pool: VecDeque<ColumnSchedule>,

    row_total_vehicles: usize,
    row_total_unassigned: usize,
    row_one_schedule: Vec<usize>,
    row_trip_cover: Vec<usize>,
    row_maintenance: Vec<usize>,
    capacity_rows: Vec<Vec<CapacityRow>>,

    /// Number of structural (non-schedule) columns.
    first_schedule_col: usize,

    pub ms_solver: i64,
    pub ms_filter_vars: i64,
}

impl<'a> MasterProblem<'a> {
    pub fn new(view: &'a HorizonView<'a>) -> Self {
        let mut mp = Self {
            view,
            lp: LpModel::new(),
            solution: None,
            status: MasterStatus::Undefined,
            duals: Duals::new(view),
            slack_total_vehicles: (0, 0),
            slack_total_unassigned: (0, 0),
            var_select: Vec::new(),
            var_unassigned: Vec::new(),
            schedule_vars: vec![Vec::new(); view.data.vehicles.len()],
            pool: VecDeque::new(),
            row_total_vehicles: 0,
            row_total_unassigned: 0,
            row_one_schedule: Vec::new(),
            row_trip_cover: Vec::new(),
            row_maintenance: Vec::new(),
            capacity_rows: Vec::new(),
            first_schedule_col: 0,
            ms_solver: 0,
            ms_filter_vars: 0,
        };
        mp.add_rows();
        mp.add_structural_vars();
        mp
    }

    fn add_rows(&mut self) {
        let view = self.view;
        self.row_total_vehicles = self
            .lp
            .add_row(f64::NEG_INFINITY, view.data.vehicles.len() as f64);
        self.row_total_unassigned =
            self.lp.add_row(f64::NEG_INFINITY, view.trips.len() as f64);

        self.row_one_schedule = (0..view.data.vehicles.len())
            .map(|_| self.lp.add_row(0.0, 0.0))
            .collect();
        self.row_trip_cover = (0..view.trips.len()).map(|_| self.lp.add_row(1.0, 1.0)).collect();
        self.row_maintenance = (0..view.maintenances.len())
            .map(|_| self.lp.add_row(f64::NEG_INFINITY, 1.0))
            .collect();

        // Capacity row templates. The bound already discounts vehicles whose
        // committed history keeps them on the charger during the interval,
        // found by scanning the lattice from the back: a committed session
        // occupies every interval from its put-on up to and including its
        // take-off, so walking downwards a session becomes present at its
        // take-off slot and stays present through its put-on slot.
        self.capacity_rows = view
            .data
            .chargers
            .iter()
            .map(|charger| {
                let slots = &view.put_ons[charger.index];
                let mut rows = vec![CapacityRow { row: None, ub: 0.0 }; slots.len()];
                let mut at_charger = 0i64;
                for index in (0..slots.len()).rev() {
                    at_charger +=
                        view.graph.out_degree(view.take_offs[charger.index][index].node) as i64;
                    rows[index].ub = charger.capacity as f64 - at_charger as f64;
                    at_charger -= view.graph.out_degree(slots[index].node) as i64;
                }
                rows
            })
            .collect();
    }

    fn add_structural_vars(&mut self) {
        let view = self.view;

        // Counting-row slacks, closed outside the auxiliary phase.
        self.slack_total_vehicles = (
            self.lp.add_col(0.0, 0.0, 0.0, vec![(self.row_total_vehicles, 1.0)]),
            self.lp.add_col(0.0, 0.0, 0.0, vec![(self.row_total_vehicles, -1.0)]),
        );
        self.slack_total_unassigned = (
            self.lp.add_col(0.0, 0.0, 0.0, vec![(self.row_total_unassigned, 1.0)]),
            self.lp.add_col(0.0, 0.0, 0.0, vec![(self.row_total_unassigned, -1.0)]),
        );

        self.var_select = view
            .data
            .vehicles
            .iter()
            .map(|vehicle| {
                let cost = if view.data.config.minimise_number_vehicles {
                    vehicle.activation_cost
                } else {
                    0.0
                };
                self.lp.add_col(
                    cost,
                    0.0,
                    1.0,
                    vec![
                        (self.row_total_vehicles, 1.0),
                        (self.row_one_schedule[vehicle.index], -1.0),
                    ],
                )
            })
            .collect();

        self.var_unassigned = view
            .trips
            .iter()
            .map(|trip| {
                self.lp.add_col(
                    view.data.config.cost_uncovered_trip,
                    0.0,
                    1.0,
                    vec![
                        (self.row_total_unassigned, 1.0),
                        (self.row_trip_cover[trip.index], 1.0),
                    ],
                )
            })
            .collect();

        self.first_schedule_col = self.lp.num_cols();
    }

    // ------------------------------------------------------------------
    // Solving

    /// Solves the LP; on success refreshes the solution status and the dual
    /// mirror. Returns `false` on infeasibility (callers run phase-1).
    pub fn solve(&mut self) -> RotorResult<bool> {
        let clock = Instant::now();
        let mut sol = self.lp.solve()?;
        if sol.status != LpStatus::Optimal && sol.status != LpStatus::Infeasible {
            // The solver may give up on a stale model; one clean retry.
            sol = self.lp.solve()?;
        }
        self.ms_solver += clock.elapsed().as_millis() as i64;

        if sol.status != LpStatus::Optimal {
            self.solution = None;
            self.status = MasterStatus::Infeasible;
            return Ok(false);
        }

        let dual_valid = sol.dual_valid;
        self.solution = Some(sol);
        self.update_status();
        if dual_valid {
            self.refresh_duals();
        }
        Ok(true)
    }

    /// The tail of price-and-branch: re-declare every schedule column
    /// integral, run the MIP under the horizon deadline, revert.
    pub fn solve_as_mip(&mut self) -> RotorResult<()> {
        let clock = Instant::now();
        for vars in &self.schedule_vars {
            for var in vars {
                self.lp.change_col_integrality(var.col, true);
            }
        }

        let sol = self
            .lp
            .solve_mip(self.view.data.config.branch_and_price_timelimit as f64)?;
        if sol.status == LpStatus::Optimal {
            self.solution = Some(sol);
            self.update_status();
        }

        self.lp.clear_integrality();
        self.ms_solver += clock.elapsed().as_millis() as i64;
        Ok(())
    }

    fn update_status(&mut self) {
        let Some(sol) = &self.solution else {
            self.status = MasterStatus::Undefined;
            return;
        };
        let fractional = self
            .schedule_vars
            .iter()
            .flatten()
            .any(|var| !num::is_integral(sol.col_value[var.col]));
        self.status = if fractional { MasterStatus::Fractional } else { MasterStatus::Integer };
    }

    fn refresh_duals(&mut self) {
        let sol = self.solution.as_ref().expect("solved model");

        for (vehicle, &row) in self.row_one_schedule.iter().enumerate() {
            self.duals.one_schedule_per_vehicle[vehicle] = sol.row_dual[row];
        }
        for (trip, &row) in self.row_trip_cover.iter().enumerate() {
            self.duals.trip_coverage[trip] = sol.row_dual[row];
        }
        for (maintenance, &row) in self.row_maintenance.iter().enumerate() {
            self.duals.one_vehicle_per_maintenance[maintenance] = sol.row_dual[row];
        }

        for (charger, rows) in self.capacity_rows.iter().enumerate() {
            let interval_duals: Vec<f64> = rows
                .iter()
                .map(|r| r.row.map(|row| sol.row_dual[row]).unwrap_or(0.0))
                .collect();
            self.duals.rebuild_cumsum(charger, &interval_duals);
        }
    }

    // ------------------------------------------------------------------
    // Accessors

    #[inline]
    pub fn status(&self) -> MasterStatus {
        self.status
    }

    #[inline]
    pub fn duals(&self) -> &Duals {
        &self.duals
    }

    pub fn objective(&self) -> f64 {
        self.solution.as_ref().map(|s| s.objective).unwrap_or(f64::INFINITY)
    }

    #[inline]
    pub fn num_rows(&self) -> u32 {
        self.lp.num_rows() as u32
    }

    #[inline]
    pub fn num_cols(&self) -> u32 {
        self.lp.num_cols() as u32
    }

    fn value(&self, col: usize) -> f64 {
        self.solution.as_ref().map(|s| s.col_value[col]).unwrap_or(0.0)
    }

    /// The integer solution currently held by the LP (empty unless the
    /// status is `Integer`).
    pub fn current_solution(&self) -> Solution {
        let mut out = Solution {
            horizon_start: self.view.horizon.start,
            horizon_end: self.view.horizon.end,
            ..Solution::default()
        };
        if self.status != MasterStatus::Integer {
            return out;
        }

        out.objective = self.objective();
        out.unassigned_trips = self
            .var_unassigned
            .iter()
            .map(|&col| self.value(col).round() as u32)
            .sum();

        for vars in &self.schedule_vars {
            for var in vars {
                if num::approx_eq(self.value(var.col), 1.0) {
                    out.vehicles_selected += 1;
                    out.schedules.push(VehicleAssignment {
                        vehicle: var.schedule.vehicle,
                        start_location: var.schedule.start_location,
                        end_location: var.schedule.end_location,
                        nodes: var.schedule.nodes.clone(),
                    });
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Column management

    /// Adds freshly priced columns, per-vehicle batches. An intra-batch
    /// dominance filter drops candidates that do a subset of another
    /// candidate's work at no better reduced cost, and cleanup keeps the
    /// column count under `max_number_cols_mp`.
    pub fn add_schedule_columns(
        &mut self,
        batches: Vec<Vec<ColumnSchedule>>,
        include_cost: bool,
    ) -> ColumnsAdded {
        let mut result = ColumnsAdded { lb: self.objective(), count: 0 };
        let mut surviving: Vec<ColumnSchedule> = Vec::new();

        for batch in batches {
            if let Some(min_rc) = batch
                .iter()
                .map(|s| s.reduced_cost)
                .min_by(f64::total_cmp)
            {
                result.lb += min_rc;
            }

            for candidate in batch {
                let mut dominated = false;
                if self.view.data.config.use_model_cleanup {
                    let mut keep = Vec::with_capacity(surviving.len());
                    for existing in surviving.drain(..) {
                        if existing.vehicle == candidate.vehicle
                            && existing.is_subset_of(&candidate)
                            && num::le(candidate.reduced_cost, existing.reduced_cost)
                        {
                            // The candidate covers the existing one.
                            continue;
                        }
                        if existing.vehicle == candidate.vehicle
                            && candidate.is_subset_of(&existing)
                            && num::le(existing.reduced_cost, candidate.reduced_cost)
                        {
                            dominated = true;
                        }
                        keep.push(existing);
                    }
                    surviving = keep;
                }
                if !dominated {
                    surviving.push(candidate);
                }
            }
        }

        if self.view.data.config.use_model_cleanup {
            let excess = (self.lp.num_cols() - self.first_schedule_col) as i64
                + surviving.len() as i64
                - self.view.data.config.max_number_cols_mp as i64;
            if excess > 0 {
                self.clean_up(excess as usize);
            }
        }

        result.count = surviving.len() as u32;
        for schedule in surviving {
            self.insert_column(schedule, include_cost);
        }
        result
    }

    fn insert_column(&mut self, schedule: ColumnSchedule, include_cost: bool) {
        let mut entries = vec![(self.row_one_schedule[schedule.vehicle], 1.0)];
        for &trip in &schedule.trips {
            entries.push((self.row_trip_cover[trip], 1.0));
        }
        for &maintenance in &schedule.maintenances {
            entries.push((self.row_maintenance[maintenance], 1.0));
        }
        for leg in &schedule.charging {
            for interval in leg.put_on..=leg.take_off {
                if let Some(row) = self.capacity_rows[leg.charger][interval].row {
                    entries.push((row, 1.0));
                }
            }
        }

        let cost = if include_cost { schedule.cost } else { 0.0 };
        let col = self.lp.add_col(cost, 0.0, f64::INFINITY, entries);
        self.schedule_vars[schedule.vehicle].push(MasterVar { col, schedule });
    }

    /// Re-admits pooled columns whose reduced cost is negative under the
    /// current duals and which satisfy every branch of `node`, capped per
    /// vehicle like a pricing round.
    pub fn add_pool_columns(&mut self, node: &BranchNode, include_cost: bool) -> ColumnsAdded {
        let per_vehicle_cap =
            (self.view.data.config.nr_cols_per_vehicle_iter.max(1) - 1) as usize;
        let mut batches: Vec<Vec<ColumnSchedule>> =
            vec![Vec::new(); self.view.data.vehicles.len()];

        let mut remaining = VecDeque::with_capacity(self.pool.len());
        while let Some(schedule) = self.pool.pop_front() {
            if num::lt(schedule.current_reduced_cost(&self.duals), 0.0)
                && schedule.is_feasible_in(node)
                && batches[schedule.vehicle].len() < per_vehicle_cap
            {
                batches[schedule.vehicle].push(schedule);
            } else {
                remaining.push_back(schedule);
            }
        }
        self.pool = remaining;

        self.add_schedule_columns(batches, include_cost)
    }

    fn store_in_pool(&mut self, schedule: ColumnSchedule) {
        if self.pool.len() >= self.view.data.config.max_number_cols_mp_pool as usize {
            self.pool.pop_front();
        }
        self.pool.push_back(schedule);
    }

    /// Evicts `count` columns carrying no LP weight, least-improving reduced
    /// cost first, into the FIFO pool; remaps the surviving column handles.
    fn clean_up(&mut self, count: usize) {
        let Some(sol) = self.solution.as_ref() else {
            return;
        };

        // Columns with LP weight stay; among the rest the largest reduced
        // costs go first.
        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for (vehicle, vars) in self.schedule_vars.iter().enumerate() {
            for (slot, var) in vars.iter().enumerate() {
                if sol.col_value[var.col] <= num::EPS {
                    candidates.push((vehicle, slot, sol.col_dual[var.col]));
                }
            }
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
        candidates.truncate(count);

        let mut delete = vec![false; self.lp.num_cols()];
        let mut evicted = Vec::with_capacity(candidates.len());
        for &(vehicle, slot, _) in &candidates {
            delete[self.schedule_vars[vehicle][slot].col] = true;
            evicted.push(self.schedule_vars[vehicle][slot].schedule.clone());
        }

        let remap = self.lp.delete_cols(&delete);
        for vars in &mut self.schedule_vars {
            vars.retain_mut(|var| match remap[var.col] {
                Some(new_col) => {
                    var.col = new_col;
                    true
                }
                None => false,
            });
        }
        // Evicted schedules stay reachable through the pool.
        for schedule in evicted {
            self.store_in_pool(schedule);
        }

        // The LP solution no longer matches the model.
        self.solution = None;
        self.status = MasterStatus::Undefined;
        tracing::debug!(count, "master cleanup evicted columns");
    }

    // ------------------------------------------------------------------
    // Charger capacity

    /// Tallies the LP weight on every `(charger, interval)` pair and
    /// returns the last interval of each violated run.
    fn capacity_violations(&self) -> (bool, Vec<(usize, usize)>) {
        let Some(sol) = self.solution.as_ref() else {
            return (true, Vec::new());
        };

        let mut occupancy: Vec<Vec<f64>> = self
            .capacity_rows
            .iter()
            .map(|rows| vec![0.0; rows.len()])
            .collect();

        for vars in &self.schedule_vars {
            for var in vars {
                let weight = sol.col_value[var.col];
                if !num::lt(0.0, weight) {
                    continue;
                }
                for leg in &var.schedule.charging {
                    for interval in leg.put_on..=leg.take_off {
                        occupancy[leg.charger][interval] += weight;
                    }
                }
            }
        }

        let mut feasible = true;
        let mut violated: Vec<(usize, usize)> = Vec::new();
        for (charger, rows) in self.capacity_rows.iter().enumerate() {
            let mut interval = 0;
            while interval < rows.len() {
                if num::lt(rows[interval].ub, occupancy[charger][interval]) {
                    feasible = false;
                    // Walk to the end of the violated run; one cut there
                    // covers the whole run through the cumulative columns.
                    let mut last = interval;
                    while interval < rows.len()
                        && num::lt(rows[interval].ub, occupancy[charger][interval])
                    {
                        last = interval;
                        interval += 1;
                    }
                    violated.push((charger, last));
                } else {
                    interval += 1;
                }
            }
        }
        (feasible, violated)
    }

    /// Whether the current LP point respects every charger capacity.
    pub fn capacity_satisfied(&self) -> bool {
        self.capacity_violations().0
    }

    /// Checks the capacities; when violated and `add_rows` is set,
    /// materialises one lazy row per violated run with coefficients on
    /// every existing column through its interval, and invalidates the
    /// solution status so the caller re-solves.
    pub fn check_and_update_charger_capacity(&mut self, add_rows: bool) -> bool {
        let (feasible, violated) = self.capacity_violations();

        if add_rows && !feasible {
            for &(charger, interval) in &violated {
                let ub = self.capacity_rows[charger][interval].ub;
                let row = self.lp.add_row(f64::NEG_INFINITY, ub);
                self.capacity_rows[charger][interval].row = Some(row);
            }

            for vars in &self.schedule_vars {
                for var in vars {
                    for leg in &var.schedule.charging {
                        for interval in leg.put_on..=leg.take_off {
                            if let Some(row) = self.capacity_rows[leg.charger][interval].row {
                                self.lp.change_coeff(row, var.col, 1.0);
                            }
                        }
                    }
                }
            }
            self.status = MasterStatus::Undefined;
        }

        feasible
    }

    // ------------------------------------------------------------------
    // Branch projection

    /// Resets every bound to its natural range, then clamps variables and
    /// the two counting rows according to the accumulated branch decisions.
    pub fn filter_vars(&mut self, node: &BranchNode) {
        let clock = Instant::now();
        let view = self.view;

        self.lp.change_row_bounds(
            self.row_total_vehicles,
            f64::NEG_INFINITY,
            view.data.vehicles.len() as f64,
        );
        self.lp.change_row_bounds(
            self.row_total_unassigned,
            f64::NEG_INFINITY,
            view.trips.len() as f64,
        );
        for &col in &self.var_select {
            self.lp.change_col_bounds(col, 0.0, 1.0);
        }
        for &col in &self.var_unassigned {
            self.lp.change_col_bounds(col, 0.0, 1.0);
        }
        for vars in &self.schedule_vars {
            for var in vars {
                self.lp.change_col_bounds(var.col, 0.0, f64::INFINITY);
            }
        }

        for branch in &node.branches {
            let fixed = branch.value_bool();
            match branch.kind {
                BranchKind::TotalVehicles => {
                    let (lb, ub) = self.lp.row_bounds(self.row_total_vehicles);
                    if num::lt(branch.value - branch.fractional, 0.0) {
                        self.lp.change_row_bounds(self.row_total_vehicles, lb, branch.value);
                    } else {
                        self.lp.change_row_bounds(self.row_total_vehicles, branch.value, ub);
                    }
                }
                BranchKind::TotalUnassignedTrips => {
                    let (lb, ub) = self.lp.row_bounds(self.row_total_unassigned);
                    if num::lt(branch.value - branch.fractional, 0.0) {
                        self.lp.change_row_bounds(self.row_total_unassigned, lb, branch.value);
                    } else {
                        self.lp.change_row_bounds(self.row_total_unassigned, branch.value, ub);
                    }
                }
                BranchKind::VehicleRotation { vehicle } => {
                    self.lp
                        .change_col_bounds(self.var_select[vehicle], branch.value, branch.value);
                }
                BranchKind::TripUnassigned { trip, .. } => {
                    if fixed {
                        // A trip fixed unassigned forbids every schedule
                        // covering it.
                        for vars in &self.schedule_vars {
                            for var in vars {
                                if var.schedule.has_trip(trip) {
                                    self.lp.change_col_bounds(var.col, 0.0, 0.0);
                                }
                            }
                        }
                    }
                    self.lp.change_col_bounds(
                        self.var_unassigned[trip],
                        branch.value,
                        branch.value,
                    );
                }
                BranchKind::VehicleTrip { vehicle, trip, .. } => {
                    self.clamp_vehicle_columns(
                        vehicle,
                        fixed,
                        |schedule| schedule.has_trip(trip),
                    );
                }
                BranchKind::VehicleMaintenance { vehicle, maintenance, .. } => {
                    self.clamp_vehicle_columns(vehicle, fixed, |schedule| {
                        schedule.has_maintenance(maintenance)
                    });
                }
                BranchKind::VehicleChargingAfter { vehicle, charger, from_node } => {
                    self.clamp_vehicle_charging(vehicle, fixed, from_node, |schedule| {
                        schedule.has_charging_after(charger, from_node)
                    });
                }
                BranchKind::VehicleChargingBefore { vehicle, charger, to_node } => {
                    self.clamp_vehicle_charging(vehicle, fixed, to_node, |schedule| {
                        schedule.has_charging_before(charger, to_node)
                    });
                }
            }
        }

        self.ms_filter_vars += clock.elapsed().as_millis() as i64;
    }

    /// Shared projection for activity-on-vehicle decisions: on the branch
    /// vehicle, columns disagreeing with the decision are closed; on every
    /// other vehicle a fixed activity closes the columns that also carry it.
    fn clamp_vehicle_columns<F>(&mut self, vehicle: usize, fixed: bool, has_activity: F)
    where
        F: Fn(&ColumnSchedule) -> bool,
    {
        for vars in &self.schedule_vars {
            for var in vars {
                if var.schedule.vehicle == vehicle {
                    if fixed != has_activity(&var.schedule) {
                        self.lp.change_col_bounds(var.col, 0.0, 0.0);
                    }
                } else if fixed && has_activity(&var.schedule) {
                    self.lp.change_col_bounds(var.col, 0.0, 0.0);
                }
            }
        }
        if fixed {
            self.lp.change_col_bounds(self.var_select[vehicle], 1.0, 1.0);
        }
    }

    fn clamp_vehicle_charging<F>(
        &mut self,
        vehicle: usize,
        fixed: bool,
        anchor: NodeIndex,
        has_session: F,
    ) where
        F: Fn(&ColumnSchedule) -> bool,
    {
        for vars in &self.schedule_vars {
            for var in vars {
                if var.schedule.vehicle == vehicle {
                    if fixed != has_session(&var.schedule) {
                        self.lp.change_col_bounds(var.col, 0.0, 0.0);
                    }
                } else if fixed && var.schedule.has_node(anchor) {
                    // The anchor vertex is now owned by the branch vehicle.
                    self.lp.change_col_bounds(var.col, 0.0, 0.0);
                }
            }
        }
        if fixed {
            self.lp.change_col_bounds(self.var_select[vehicle], 1.0, 1.0);
        }
    }

    // ------------------------------------------------------------------
    // Branch-option enumeration

    /// All fractional decisions of the current LP solution, every family.
    pub fn branch_options(&self) -> Vec<Branch> {
        if self.solution.is_none() {
            return Vec::new();
        }
        let mut options = Vec::new();
        options.extend(self.options_total_vehicles());
        options.extend(self.options_total_unassigned());
        options.extend(self.options_vehicle_rotation());
        options.extend(self.options_vehicle_trip());
        options.extend(self.options_vehicle_maintenance());
        options.extend(self.options_vehicle_charging(true));
        options.extend(self.options_vehicle_charging(false));
        options.extend(self.options_trip_unassigned());
        options
    }

    fn rounded(fractional: f64) -> f64 {
        fractional.floor() + if num::lt(0.5, fractional - fractional.floor()) { 1.0 } else { 0.0 }
    }

    fn bool_branch_value(fractional: f64) -> f64 {
        if num::le(0.5, fractional - fractional.floor()) {
            1.0
        } else {
            0.0
        }
    }

    fn options_total_vehicles(&self) -> Vec<Branch> {
        let sum: f64 = self.var_select.iter().map(|&col| self.value(col)).sum();
        if num::is_integral(sum) {
            return Vec::new();
        }
        vec![Branch::new(BranchKind::TotalVehicles, Self::rounded(sum), sum)]
    }

    fn options_total_unassigned(&self) -> Vec<Branch> {
        let sum: f64 = self.var_unassigned.iter().map(|&col| self.value(col)).sum();
        if num::is_integral(sum) {
            return Vec::new();
        }
        vec![Branch::new(BranchKind::TotalUnassignedTrips, Self::rounded(sum), sum)]
    }

    fn options_trip_unassigned(&self) -> Vec<Branch> {
        self.view
            .trips
            .iter()
            .filter_map(|trip| {
                let value = self.value(self.var_unassigned[trip.index]);
                (!num::is_integral(value)).then(|| {
                    Branch::new(
                        BranchKind::TripUnassigned { trip: trip.index, node: trip.node },
                        Self::bool_branch_value(value),
                        value,
                    )
                })
            })
            .collect()
    }

    fn options_vehicle_rotation(&self) -> Vec<Branch> {
        self.var_select
            .iter()
            .enumerate()
            .filter_map(|(vehicle, &col)| {
                let value = self.value(col);
                (!num::is_integral(value)).then(|| {
                    Branch::new(
                        BranchKind::VehicleRotation { vehicle },
                        Self::bool_branch_value(value),
                        value,
                    )
                })
            })
            .collect()
    }

    fn options_vehicle_trip(&self) -> Vec<Branch> {
        let mut acc =
            vec![vec![0.0f64; self.view.data.vehicles.len()]; self.view.trips.len()];
        for vars in &self.schedule_vars {
            for var in vars {
                let weight = self.value(var.col);
                for &trip in &var.schedule.trips {
                    acc[trip][var.schedule.vehicle] += weight;
                }
            }
        }

        let mut options = Vec::new();
        for (trip, row) in acc.iter().enumerate() {
            for (vehicle, &value) in row.iter().enumerate() {
                if !num::is_integral(value) {
                    options.push(Branch::new(
                        BranchKind::VehicleTrip {
                            vehicle,
                            trip,
                            node: self.view.trips[trip].node,
                        },
                        Self::bool_branch_value(value),
                        value,
                    ));
                }
            }
        }
        options
    }

    fn options_vehicle_maintenance(&self) -> Vec<Branch> {
        let mut acc =
            vec![vec![0.0f64; self.view.data.vehicles.len()]; self.view.maintenances.len()];
        for vars in &self.schedule_vars {
            for var in vars {
                let weight = self.value(var.col);
                for &maintenance in &var.schedule.maintenances {
                    acc[maintenance][var.schedule.vehicle] += weight;
                }
            }
        }

        let mut options = Vec::new();
        for (maintenance, row) in acc.iter().enumerate() {
            for (vehicle, &value) in row.iter().enumerate() {
                if !num::is_integral(value) {
                    options.push(Branch::new(
                        BranchKind::VehicleMaintenance {
                            vehicle,
                            maintenance,
                            node: self.view.maintenances[maintenance].node,
                        },
                        Self::bool_branch_value(value),
                        value,
                    ));
                }
            }
        }
        options
    }

    /// Charging decisions: LP weight per `(vehicle, charger, anchor node)`,
    /// where the anchor is the vertex right after (`after = true`) or right
    /// before the session.
    fn options_vehicle_charging(&self, after: bool) -> Vec<Branch> {
        let mut acc: Vec<Vec<BTreeMap<NodeIndex, f64>>> =
            vec![
                vec![BTreeMap::new(); self.view.data.chargers.len()];
                self.view.data.vehicles.len()
            ];

        for vars in &self.schedule_vars {
            for var in vars {
                let weight = self.value(var.col);
                if !num::lt(0.0, weight) {
                    continue;
                }
                for leg in &var.schedule.charging {
                    let anchor = if after { leg.from_node } else { leg.to_node };
                    if let Some(anchor) = anchor {
                        *acc[var.schedule.vehicle][leg.charger].entry(anchor).or_insert(0.0) +=
                            weight;
                    }
                }
            }
        }

        let mut options = Vec::new();
        for (vehicle, chargers) in acc.iter().enumerate() {
            for (charger, anchors) in chargers.iter().enumerate() {
                for (&anchor, &value) in anchors {
                    if num::is_integral(value) {
                        continue;
                    }
                    let kind = if after {
                        BranchKind::VehicleChargingAfter { vehicle, charger, from_node: anchor }
                    } else {
                        BranchKind::VehicleChargingBefore { vehicle, charger, to_node: anchor }
                    };
                    options.push(Branch::new(kind, Self::bool_branch_value(value), value));
                }
            }
        }
        options
    }

    // ------------------------------------------------------------------
    // Phase-1 auxiliary problem

    /// Snapshot of all column bounds, restored after phase-1.
    pub fn bounds_snapshot(&self) -> Vec<(f64, f64)> {
        (0..self.lp.num_cols()).map(|col| self.lp.col_bounds(col)).collect()
    }

    /// Replaces the objective by the violation count of the branch-fixed
    /// structural variables; schedule columns become free of cost.
    pub fn set_auxiliary_objective(&mut self) {
        for col in 0..self.lp.num_cols() {
            self.lp.change_col_cost(col, 0.0);
        }
        for &col in self.var_select.iter().chain(&self.var_unassigned) {
            let (lb, ub) = self.lp.col_bounds(col);
            if num::approx_eq(lb, 1.0) {
                self.lp.change_col_cost(col, -1.0);
            } else if num::approx_eq(ub, 0.0) {
                self.lp.change_col_cost(col, 1.0);
            }
        }
        for &col in [
            self.slack_total_vehicles.0,
            self.slack_total_vehicles.1,
            self.slack_total_unassigned.0,
            self.slack_total_unassigned.1,
        ]
        .iter()
        {
            self.lp.change_col_cost(col, 1.0);
        }
    }

    /// Relaxes the fixed structural variables and opens the counting
    /// slacks.
    pub fn set_aux_variable_bounds(&mut self) {
        for &col in self.var_select.iter().chain(&self.var_unassigned) {
            self.lp.change_col_bounds(col, 0.0, 1.0);
        }
        let vehicles = self.view.data.vehicles.len() as f64;
        let trips = self.view.trips.len() as f64;
        self.lp.change_col_bounds(self.slack_total_vehicles.0, 0.0, vehicles);
        self.lp.change_col_bounds(self.slack_total_vehicles.1, 0.0, vehicles);
        self.lp.change_col_bounds(self.slack_total_unassigned.0, 0.0, trips);
        self.lp.change_col_bounds(self.slack_total_unassigned.1, 0.0, trips);
    }

    /// After phase-1: have all fixed variables returned inside their saved
    /// bounds, with the slacks back at zero?
    pub fn check_aux_variables_feasible(&self, saved_bounds: &[(f64, f64)]) -> bool {
        for &col in self.var_select.iter().chain(&self.var_unassigned) {
            let value = self.value(col);
            let (lb, ub) = saved_bounds[col];
            if num::lt(value, lb) || num::lt(ub, value) {
                return false;
            }
        }
        for &col in [
            self.slack_total_vehicles.0,
            self.slack_total_vehicles.1,
            self.slack_total_unassigned.0,
            self.slack_total_unassigned.1,
        ]
        .iter()
        {
            if !num::approx_eq(self.value(col), 0.0) {
                return false;
            }
        }
        true
    }

    pub fn reset_objective(&mut self) {
        for (vehicle, &col) in self.var_select.iter().enumerate() {
            let cost = if self.view.data.config.minimise_number_vehicles {
                self.view.data.vehicle(vehicle).activation_cost
            } else {
                0.0
            };
            self.lp.change_col_cost(col, cost);
        }
        for &col in &self.var_unassigned {
            self.lp.change_col_cost(col, self.view.data.config.cost_uncovered_trip);
        }
        for vars in &self.schedule_vars {
            for var in vars {
                self.lp.change_col_cost(var.col, var.schedule.cost);
            }
        }
        for &col in [
            self.slack_total_vehicles.0,
            self.slack_total_vehicles.1,
            self.slack_total_unassigned.0,
            self.slack_total_unassigned.1,
        ]
        .iter()
        {
            self.lp.change_col_cost(col, 0.0);
        }
    }

    /// Restores the structural bounds saved before phase-1; schedule
    /// columns are left to the next `filter_vars`.
    pub fn restore_variable_bounds(&mut self, saved_bounds: &[(f64, f64)]) {
        for &col in self.var_select.iter().chain(&self.var_unassigned) {
            let (lb, ub) = saved_bounds[col];
            self.lp.change_col_bounds(col, lb, ub);
        }
        for &col in [
            self.slack_total_vehicles.0,
            self.slack_total_vehicles.1,
            self.slack_total_unassigned.0,
            self.slack_total_unassigned.1,
        ]
        .iter()
        {
            let (lb, ub) = saved_bounds[col];
            self.lp.change_col_bounds(col, lb, ub);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ChargingLeg;
    use crate::horizon::HorizonClock;
    use crate::test_support::scenario_two_trips;
    use rotor_core::ScheduleGraph;

    fn column(vehicle: usize, trip: usize, cost: f64, reduced_cost: f64) -> ColumnSchedule {
        ColumnSchedule {
            vehicle,
            start_location: 0,
            end_location: 0,
            nodes: Vec::new(),
            trips: vec![trip],
            maintenances: Vec::new(),
            charging: Vec::new(),
            cost,
            reduced_cost,
        }
    }

    #[test]
    fn test_initial_master_assigns_penalties() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let mut mp = MasterProblem::new(&view);
        let root = BranchNode::root(1, &view);
        mp.filter_vars(&root);

        assert!(mp.solve().unwrap());
        // No columns yet: both trips fall onto their penalty slacks.
        assert!((mp.objective() - 2.0 * data.config.cost_uncovered_trip).abs() < 1e-6);
        assert_eq!(mp.status(), MasterStatus::Integer);
        // The cover rows price at the uncovered-trip penalty.
        assert!((mp.duals().trip_coverage[0] - data.config.cost_uncovered_trip).abs() < 1e-4);
    }

    #[test]
    fn test_columns_displace_penalties() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let mut mp = MasterProblem::new(&view);
        let root = BranchNode::root(1, &view);
        mp.filter_vars(&root);
        assert!(mp.solve().unwrap());

        let added = mp.add_schedule_columns(
            vec![vec![column(0, 0, 30.0, -100.0)], vec![column(1, 1, 30.0, -100.0)]],
            true,
        );
        assert_eq!(added.count, 2);
        assert!(mp.solve().unwrap());
        // Two activations plus two column costs beat the penalties.
        assert!((mp.objective() - (2.0 * 100.0 + 2.0 * 30.0)).abs() < 1e-6);
        let solution = mp.current_solution();
        assert_eq!(solution.unassigned_trips, 0);
        assert_eq!(solution.vehicles_selected, 2);
    }

    #[test]
    fn test_intra_batch_subset_dominance() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let mut mp = MasterProblem::new(&view);

        // Same vehicle, same work, one candidate strictly worse: the filter
        // keeps a single column.
        let before = mp.num_cols();
        let added = mp.add_schedule_columns(
            vec![vec![column(0, 0, 20.0, -5.0), column(0, 0, 25.0, -4.0)]],
            true,
        );
        assert_eq!(added.count, 1);
        assert_eq!(mp.num_cols(), before + 1);
    }

    #[test]
    fn test_lazy_capacity_row_prices_out_overlap() {
        let mut data = scenario_two_trips();
        data.chargers.iter_mut().next().unwrap().capacity = 1;
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let mut mp = MasterProblem::new(&view);
        let root = BranchNode::root(1, &view);
        mp.filter_vars(&root);

        // Both vehicles insist on the same charging window.
        let leg = ChargingLeg { from_node: None, to_node: None, charger: 0, put_on: 10, take_off: 20 };
        let mut first = column(0, 0, 10.0, -100.0);
        first.charging.push(leg);
        let mut second = column(1, 1, 10.0, -100.0);
        second.charging.push(leg);
        mp.add_schedule_columns(vec![vec![first], vec![second]], true);

        assert!(mp.solve().unwrap());
        // The initial LP ignores the capacity and schedules both.
        assert!(!mp.capacity_satisfied());

        assert!(!mp.check_and_update_charger_capacity(true));
        assert!(mp.solve().unwrap());
        // With the lazy row in place only one session fits; the other trip
        // falls back onto its penalty.
        assert!(mp.capacity_satisfied());
        assert!(mp.objective() > data.config.cost_uncovered_trip);
    }

    /// A session committed in an earlier horizon occupies every lattice
    /// slot from its put-on through its take-off, the take-off slot
    /// included, in the capacity templates of the next horizon.
    #[test]
    fn test_capacity_template_counts_committed_session_inclusively() {
        let mut data = scenario_two_trips();
        data.chargers.iter_mut().next().unwrap().capacity = 1;
        let mut graph = ScheduleGraph::initialise(&data).unwrap();

        let (put_on, take_off) = {
            let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
            (view.put_ons[0][30].node, view.take_offs[0][33].node)
        };
        let start = graph.start_node(0);
        graph.add_deadleg(start, put_on, &data, 0).unwrap();
        graph.add_charging(put_on, take_off, &data, 0).unwrap();
        // The commit flow always closes a schedule with a deadleg off the
        // last vertex.
        graph.add_deadleg_to_location(take_off, 0, &data, 0).unwrap();
        graph.update_vehicle_positions(&data).unwrap();

        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let mp = MasterProblem::new(&view);

        let from = view.put_ons[0].iter().position(|s| s.node == put_on).unwrap();
        let to = view.take_offs[0].iter().position(|s| s.node == take_off).unwrap();
        assert!(from < to);

        // Occupied across the whole session, the take-off slot included.
        for slot in from..=to {
            assert_eq!(mp.capacity_rows[0][slot].ub, 0.0, "slot {slot}");
        }
        // Free immediately before and after.
        assert_eq!(mp.capacity_rows[0][from - 1].ub, 1.0);
        assert_eq!(mp.capacity_rows[0][to + 1].ub, 1.0);
    }
}
