//! Branch decisions and the branch tree node.
//!
//! A [`Branch`] is a tagged decision with a value (the bound it imposes) and
//! the fractional LP value it was derived from. A [`BranchNode`] accumulates
//! the decisions from the root, deduces per-vehicle sorted lists of fixed
//! schedule vertices and, from those, the two lookup maps the pricing label
//! extension uses to honour fixings without extra hard constraints: for each
//! fixed vertex the start time of the *next* fixed vertex ("max rc start
//! time") and the end time of the *previous* one.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use crate::horizon::HorizonView;
use rotor_core::{num, Timestamp, MAX_TIMESTAMP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    TotalVehicles,
    TotalUnassignedTrips,
    VehicleRotation { vehicle: usize },
    TripUnassigned { trip: usize, node: NodeIndex },
    VehicleTrip { vehicle: usize, trip: usize, node: NodeIndex },
    VehicleMaintenance { vehicle: usize, maintenance: usize, node: NodeIndex },
    VehicleChargingAfter { vehicle: usize, charger: usize, from_node: NodeIndex },
    VehicleChargingBefore { vehicle: usize, charger: usize, to_node: NodeIndex },
}

impl BranchKind {
    /// Priority rank, 1 first. Rotation decisions restructure the whole
    /// problem and are branched before per-activity decisions; the weak
    /// counting bounds come last.
    pub fn priority_rank(&self) -> u8 {
        match self {
            BranchKind::VehicleRotation { .. } => 1,
            BranchKind::VehicleTrip { .. } => 2,
            BranchKind::VehicleMaintenance { .. } => 3,
            BranchKind::VehicleChargingBefore { .. } => 4,
            BranchKind::VehicleChargingAfter { .. } => 5,
            BranchKind::TotalVehicles => 6,
            BranchKind::TotalUnassignedTrips => 7,
            BranchKind::TripUnassigned { .. } => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BranchKind::TotalVehicles => "TOTAL_VEHICLES",
            BranchKind::TotalUnassignedTrips => "TOTAL_TRIPS_UNASSIGNED",
            BranchKind::VehicleRotation { .. } => "VEHICLE_ROTATION",
            BranchKind::TripUnassigned { .. } => "TRIP_UNASSIGNED",
            BranchKind::VehicleTrip { .. } => "VEHICLE_TRIP",
            BranchKind::VehicleMaintenance { .. } => "VEHICLE_MAINTENANCE",
            BranchKind::VehicleChargingAfter { .. } => "VEHICLE_CHARGING_AFTER",
            BranchKind::VehicleChargingBefore { .. } => "VEHICLE_CHARGING_BEFORE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub kind: BranchKind,
    /// The bound this decision imposes (floor or ceiling of `fractional`).
    pub value: f64,
    /// The fractional LP value the decision was derived from.
    pub fractional: f64,
    /// Strong-branching score, set during candidate evaluation.
    pub score: f64,
}

impl Branch {
    pub fn new(kind: BranchKind, value: f64, fractional: f64) -> Self {
        Self { kind, value, fractional, score: 0.0 }
    }

    /// Interprets the branch value as the boolean side of the decision.
    #[inline]
    pub fn value_bool(&self) -> bool {
        num::lt(0.0, self.value)
    }

    #[inline]
    pub fn fractional_part(&self) -> f64 {
        self.fractional - self.fractional.floor()
    }

    #[inline]
    fn half_distance(&self) -> f64 {
        (0.5 - self.fractional_part()).abs()
    }

    /// Ascending sort so that the *last* element is the next branch: highest
    /// priority, closest to one half.
    pub fn cmp_most_fractional(l: &Branch, r: &Branch) -> std::cmp::Ordering {
        r.kind
            .priority_rank()
            .cmp(&l.kind.priority_rank())
            .then(r.half_distance().total_cmp(&l.half_distance()))
    }

    /// Ascending sort so that the *last* element is the least fractional.
    pub fn cmp_least_fractional(l: &Branch, r: &Branch) -> std::cmp::Ordering {
        r.kind
            .priority_rank()
            .cmp(&l.kind.priority_rank())
            .then(l.half_distance().total_cmp(&r.half_distance()))
    }

    /// Ascending sort by fractional part; the last element is the closest
    /// to its ceiling.
    pub fn cmp_ascending(l: &Branch, r: &Branch) -> std::cmp::Ordering {
        r.kind
            .priority_rank()
            .cmp(&l.kind.priority_rank())
            .then(l.fractional_part().total_cmp(&r.fractional_part()))
    }
}

/// One vertex of the branch-and-price tree.
#[derive(Debug, Clone)]
pub struct BranchNode {
    pub index: usize,
    /// Accumulated decisions from the root.
    pub branches: Vec<Branch>,
    /// Child-preferred branch options, sorted by strategy; next = last.
    pub options: Vec<Branch>,
    pub lower_bound: f64,
    /// Per-vehicle fixed schedule vertices, time-sorted, de-duplicated.
    fixings: Vec<Vec<NodeIndex>>,
    next_fixed_start: Vec<HashMap<NodeIndex, Timestamp>>,
    prev_fixed_end: Vec<HashMap<NodeIndex, Timestamp>>,
}

impl BranchNode {
    /// Root node. Every maintenance pre-assigned in the input is injected
    /// as a non-negotiable `VehicleMaintenance = 1` decision.
    pub fn root(index: usize, view: &HorizonView<'_>) -> Self {
        let mut node = Self {
            index,
            branches: Vec::new(),
            options: Vec::new(),
            lower_bound: f64::NEG_INFINITY,
            fixings: vec![Vec::new(); view.data.vehicles.len()],
            next_fixed_start: Vec::new(),
            prev_fixed_end: Vec::new(),
        };

        for sub in &view.maintenances {
            let rotor_core::ActivityKind::Maintenance { maintenance } = view.node(sub.node).kind
            else {
                continue;
            };
            if let Some(vehicle) = view.data.maintenance(maintenance).vehicle {
                node.branches.push(Branch::new(
                    BranchKind::VehicleMaintenance {
                        vehicle,
                        maintenance: sub.index,
                        node: sub.node,
                    },
                    1.0,
                    1.0,
                ));
                node.fixings[vehicle].push(sub.node);
            }
        }

        node.prepare_fixings(view);
        node
    }

    /// Child node extending `parent` by one decision.
    pub fn child(index: usize, parent: &BranchNode, branch: Branch, view: &HorizonView<'_>) -> Self {
        let mut node = Self {
            index,
            branches: parent.branches.clone(),
            options: Vec::new(),
            lower_bound: parent.lower_bound,
            fixings: parent.fixings.clone(),
            next_fixed_start: Vec::new(),
            prev_fixed_end: Vec::new(),
        };
        node.apply_fixing(&branch);
        node.branches.push(branch);
        node.prepare_fixings(view);
        node
    }

    fn apply_fixing(&mut self, branch: &Branch) {
        if !branch.value_bool() {
            return;
        }
        match branch.kind {
            BranchKind::VehicleChargingAfter { vehicle, from_node, .. } => {
                self.fixings[vehicle].push(from_node)
            }
            BranchKind::VehicleChargingBefore { vehicle, to_node, .. } => {
                self.fixings[vehicle].push(to_node)
            }
            BranchKind::VehicleMaintenance { vehicle, node, .. } => {
                self.fixings[vehicle].push(node)
            }
            BranchKind::VehicleTrip { vehicle, node, .. } => self.fixings[vehicle].push(node),
            _ => {}
        }
    }

    /// Sorts and de-duplicates the per-vehicle fixing lists and rebuilds the
    /// two per-node time lookups.
    fn prepare_fixings(&mut self, view: &HorizonView<'_>) {
        self.next_fixed_start = vec![HashMap::new(); self.fixings.len()];
        self.prev_fixed_end = vec![HashMap::new(); self.fixings.len()];

        for vehicle in 0..self.fixings.len() {
            let list = &mut self.fixings[vehicle];
            list.sort_by_key(|&n| view.node(n).start_time);
            list.dedup();

            let mut max_end = MAX_TIMESTAMP;
            for &node in list.iter().rev() {
                self.next_fixed_start[vehicle].insert(node, max_end);
                max_end = view.node(node).start_time;
            }

            let mut min_start = 0;
            for &node in list.iter() {
                self.prev_fixed_end[vehicle].insert(node, min_start);
                min_start = view.node(node).end_time;
            }
        }
    }

    /// For a fixed vertex: the start time of the vehicle's next fixed vertex
    /// (unbounded for the last one).
    pub fn next_fixed_max_end_time(&self, vehicle: usize, node: NodeIndex) -> Timestamp {
        self.next_fixed_start[vehicle]
            .get(&node)
            .copied()
            .unwrap_or(MAX_TIMESTAMP)
    }

    /// For a fixed vertex: the end time of the vehicle's previous fixed
    /// vertex (zero for the first one).
    pub fn prev_fixed_min_start_time(&self, vehicle: usize, node: NodeIndex) -> Timestamp {
        self.prev_fixed_end[vehicle].get(&node).copied().unwrap_or(0)
    }

    #[inline]
    pub fn vehicle_fixings(&self, vehicle: usize) -> &[NodeIndex] {
        &self.fixings[vehicle]
    }

    pub fn next_branch(&self) -> Option<Branch> {
        self.options.last().cloned()
    }

    pub fn pop_option(&mut self) {
        self.options.pop();
    }

    pub fn pop_branch(&mut self) -> Option<Branch> {
        self.branches.pop()
    }

    /// Rebuilds the fixing lists and lookups from the current branch list.
    /// Needed after a rollback popped decisions off the node.
    pub fn recompute_fixings(&mut self, view: &HorizonView<'_>) {
        self.fixings = vec![Vec::new(); view.data.vehicles.len()];
        for branch in self.branches.clone() {
            self.apply_fixing(&branch);
        }
        self.prepare_fixings(view);
    }

    /// For the diving heuristic: keep only vehicle-activity options sorted
    /// ascending by fractional part; fall back to the remaining options when
    /// none exist.
    pub fn store_options_for_diving(&mut self, options: Vec<Branch>) {
        let (mut activity, mut backup): (Vec<Branch>, Vec<Branch>) =
            options.into_iter().partition(|b| {
                matches!(
                    b.kind,
                    BranchKind::VehicleChargingAfter { .. }
                        | BranchKind::VehicleChargingBefore { .. }
                        | BranchKind::VehicleTrip { .. }
                        | BranchKind::VehicleMaintenance { .. }
                )
            });

        if activity.is_empty() {
            backup.sort_by(Branch::cmp_least_fractional);
            self.options = backup;
        } else {
            activity.sort_by(Branch::cmp_ascending);
            self.options = activity;
        }
    }

    /// For branch-and-price: all options, most fractional last. Strong
    /// branching will re-rank them anyway.
    pub fn store_options_for_branching(&mut self, mut options: Vec<Branch>) {
        options.sort_by(Branch::cmp_most_fractional);
        self.options = options;
    }
}

/// Exponential history of strong-branching closures per branch identity,
/// reset per planning horizon.
#[derive(Debug, Default)]
pub struct BranchHistory {
    scores: HashMap<BranchKind, (f64, u32)>,
}

impl BranchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, branch: &Branch) {
        let entry = self.scores.entry(branch.kind).or_insert((0.0, 0));
        entry.1 += 1;
        entry.0 = ((entry.1 - 1) as f64 * entry.0 + branch.score) / entry.1 as f64;
    }

    pub fn mean_score(&self, branch: &Branch) -> f64 {
        self.scores.get(&branch.kind).map(|&(mean, _)| mean).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(kind: BranchKind, fractional: f64) -> Branch {
        Branch::new(kind, 0.0, fractional)
    }

    #[test]
    fn test_next_branch_prefers_rotation() {
        let mut options = vec![
            branch(BranchKind::TotalVehicles, 2.5),
            branch(BranchKind::VehicleTrip { vehicle: 0, trip: 0, node: NodeIndex::new(0) }, 0.5),
            branch(BranchKind::VehicleRotation { vehicle: 1 }, 0.4),
        ];
        options.sort_by(Branch::cmp_most_fractional);
        assert!(matches!(
            options.last().unwrap().kind,
            BranchKind::VehicleRotation { vehicle: 1 }
        ));
    }

    #[test]
    fn test_most_fractional_within_priority() {
        let mut options = vec![
            branch(BranchKind::VehicleRotation { vehicle: 0 }, 0.9),
            branch(BranchKind::VehicleRotation { vehicle: 1 }, 0.55),
            branch(BranchKind::VehicleRotation { vehicle: 2 }, 0.1),
        ];
        options.sort_by(Branch::cmp_most_fractional);
        assert!(matches!(
            options.last().unwrap().kind,
            BranchKind::VehicleRotation { vehicle: 1 }
        ));
    }

    #[test]
    fn test_history_moving_average() {
        let mut history = BranchHistory::new();
        let mut b = branch(BranchKind::TotalVehicles, 2.5);
        b.score = 4.0;
        history.update(&b);
        b.score = 2.0;
        history.update(&b);
        assert!((history.mean_score(&b) - 3.0).abs() < 1e-12);
        // Identity is the payload, not the value.
        let other = branch(BranchKind::TotalUnassignedTrips, 1.5);
        assert_eq!(history.mean_score(&other), 0.0);
    }
}
