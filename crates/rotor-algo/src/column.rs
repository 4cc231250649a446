//! Schedule columns: the payload behind every `schedule[v,k]` LP variable.
//!
//! A column is one feasible rotation proposal for one vehicle: the trips and
//! maintenances it covers, its charging sessions, and the ordered
//! schedule-graph vertices it traverses. Columns are created by pricing,
//! live in the master (active set or FIFO pool) and die only in cleanup.

use petgraph::graph::NodeIndex;

use crate::branch::{BranchKind, BranchNode};
use crate::duals::Duals;
use rotor_core::num;

/// One charging session of a column: charger, lattice slot pair, and the
/// schedule vertices immediately around it (absent at the very start or end
/// of a rotation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargingLeg {
    pub from_node: Option<NodeIndex>,
    pub to_node: Option<NodeIndex>,
    pub charger: usize,
    pub put_on: usize,
    pub take_off: usize,
}

#[derive(Debug, Clone)]
pub struct ColumnSchedule {
    pub vehicle: usize,
    pub start_location: usize,
    pub end_location: usize,
    /// Ordered schedule-graph vertices the rotation traverses.
    pub nodes: Vec<NodeIndex>,
    /// Dense per-horizon trip indices covered.
    pub trips: Vec<usize>,
    /// Dense per-horizon maintenance indices performed.
    pub maintenances: Vec<usize>,
    pub charging: Vec<ChargingLeg>,
    pub cost: f64,
    /// Reduced cost at creation time; recompute against fresh duals before
    /// reuse.
    pub reduced_cost: f64,
}

impl ColumnSchedule {
    #[inline]
    pub fn has_trip(&self, trip: usize) -> bool {
        self.trips.contains(&trip)
    }

    #[inline]
    pub fn has_maintenance(&self, maintenance: usize) -> bool {
        self.maintenances.contains(&maintenance)
    }

    #[inline]
    pub fn has_node(&self, node: NodeIndex) -> bool {
        self.nodes.contains(&node)
    }

    pub fn has_charging_after(&self, charger: usize, from_node: NodeIndex) -> bool {
        self.charging
            .iter()
            .any(|leg| leg.charger == charger && leg.from_node == Some(from_node))
    }

    pub fn has_charging_before(&self, charger: usize, to_node: NodeIndex) -> bool {
        self.charging
            .iter()
            .any(|leg| leg.charger == charger && leg.to_node == Some(to_node))
    }

    /// Subset test for the intra-batch dominance filter: `self` does at
    /// most what `other` does (trips and maintenances contained) while
    /// keeping every charging stay of `other` covered by one of its own.
    pub fn is_subset_of(&self, other: &ColumnSchedule) -> bool {
        if self.trips.len() > other.trips.len()
            || self.maintenances.len() > other.maintenances.len()
            || self.charging.len() < other.charging.len()
        {
            return false;
        }
        if !self.trips.iter().all(|&t| other.has_trip(t)) {
            return false;
        }
        if !self.maintenances.iter().all(|&m| other.has_maintenance(m)) {
            return false;
        }
        // Every session of `other` must fit inside one of ours at the same
        // charger.
        other.charging.iter().all(|reference| {
            self.charging.iter().any(|own| {
                reference.charger == own.charger
                    && reference.put_on >= own.put_on
                    && reference.take_off <= own.take_off
            })
        })
    }

    /// Whether this column may carry LP weight under every accumulated
    /// branch decision of `node`.
    pub fn is_feasible_in(&self, node: &BranchNode) -> bool {
        for branch in &node.branches {
            let fixed = branch.value_bool();
            match branch.kind {
                BranchKind::VehicleRotation { vehicle } => {
                    if vehicle == self.vehicle && !fixed {
                        return false;
                    }
                }
                BranchKind::TripUnassigned { trip, .. } => {
                    if fixed && self.has_trip(trip) {
                        return false;
                    }
                }
                BranchKind::VehicleTrip { vehicle, trip, .. } => {
                    if vehicle == self.vehicle {
                        if fixed != self.has_trip(trip) {
                            return false;
                        }
                    } else if fixed && self.has_trip(trip) {
                        return false;
                    }
                }
                BranchKind::VehicleMaintenance { vehicle, maintenance, .. } => {
                    if vehicle == self.vehicle {
                        if fixed != self.has_maintenance(maintenance) {
                            return false;
                        }
                    } else if fixed && self.has_maintenance(maintenance) {
                        return false;
                    }
                }
                BranchKind::VehicleChargingAfter { vehicle, charger, from_node } => {
                    if vehicle == self.vehicle {
                        if fixed != self.has_charging_after(charger, from_node) {
                            return false;
                        }
                    } else if fixed && self.has_node(from_node) {
                        return false;
                    }
                }
                BranchKind::VehicleChargingBefore { vehicle, charger, to_node } => {
                    if vehicle == self.vehicle {
                        if fixed != self.has_charging_before(charger, to_node) {
                            return false;
                        }
                    } else if fixed && self.has_node(to_node) {
                        return false;
                    }
                }
                BranchKind::TotalVehicles | BranchKind::TotalUnassignedTrips => {}
            }
        }
        true
    }

    /// Reduced cost against the current dual mirror: column cost minus the
    /// duals of every row it covers.
    pub fn current_reduced_cost(&self, duals: &Duals) -> f64 {
        let mut dual_sum = duals.one_schedule_per_vehicle[self.vehicle];
        for &trip in &self.trips {
            dual_sum += duals.trip_coverage[trip];
        }
        for &maintenance in &self.maintenances {
            dual_sum += duals.one_vehicle_per_maintenance[maintenance];
        }
        for leg in &self.charging {
            dual_sum += duals.charging_interval(leg.charger, leg.put_on, leg.take_off);
        }
        self.cost - dual_sum
    }

    /// Strict improvement test used when comparing candidates.
    #[inline]
    pub fn improves(&self, other: &ColumnSchedule) -> bool {
        num::lt(self.reduced_cost, other.reduced_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(trips: Vec<usize>, charging: Vec<ChargingLeg>) -> ColumnSchedule {
        ColumnSchedule {
            vehicle: 0,
            start_location: 0,
            end_location: 0,
            nodes: Vec::new(),
            trips,
            maintenances: Vec::new(),
            charging,
            cost: 10.0,
            reduced_cost: -1.0,
        }
    }

    fn leg(charger: usize, put_on: usize, take_off: usize) -> ChargingLeg {
        ChargingLeg { from_node: None, to_node: None, charger, put_on, take_off }
    }

    #[test]
    fn test_subset_on_trips() {
        let small = column(vec![1], vec![]);
        let large = column(vec![1, 2], vec![]);
        assert!(small.is_subset_of(&large));
        assert!(!large.is_subset_of(&small));
    }

    #[test]
    fn test_subset_needs_covering_sessions() {
        // The subset column must cover the other's charging stays.
        let wide = column(vec![1], vec![leg(0, 2, 8)]);
        let narrow = column(vec![1], vec![leg(0, 4, 6)]);
        assert!(wide.is_subset_of(&narrow));
        assert!(!narrow.is_subset_of(&wide));

        let other_charger = column(vec![1], vec![leg(1, 2, 8)]);
        assert!(!other_charger.is_subset_of(&narrow));
    }

    #[test]
    fn test_reduced_cost_replay() {
        let mut duals = crate::duals::Duals {
            one_schedule_per_vehicle: vec![3.0],
            trip_coverage: vec![2.0, 5.0],
            one_vehicle_per_maintenance: vec![],
            charger_capacity_cumsum: vec![vec![vec![0.0; 4]; 4]],
        };
        duals.rebuild_cumsum(0, &[0.5, 0.5, 0.0, 0.0]);
        let col = column(vec![0, 1], vec![leg(0, 0, 1)]);
        // 10 - (3 + 2 + 5 + 1.0)
        assert!((col.current_reduced_cost(&duals) - -1.0).abs() < 1e-9);
    }
}
