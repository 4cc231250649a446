//! The rolling planning window and its dense per-horizon view.
//!
//! [`HorizonClock`] advances the window over the planning interval;
//! [`HorizonView`] re-indexes the schedule-graph vertices that fall inside
//! the current window into dense zero-based registers per kind, with O(1)
//! index arithmetic on the charger time lattices.

use petgraph::graph::NodeIndex;
use rotor_core::model::DataSet;
use rotor_core::schedule::{ActivityKind, ScheduleNode, VehicleState};
use rotor_core::{time, Config, ScheduleGraph, Timestamp};

/// The current planning window.
#[derive(Debug, Clone, Copy)]
pub struct HorizonClock {
    pub index: usize,
    pub start: Timestamp,
    pub end: Timestamp,
    pub end_overlap: Timestamp,
}

impl HorizonClock {
    pub fn first(config: &Config) -> Self {
        let start = config.date_start;
        let end = (start + config.planning_horizon_length as Timestamp).min(config.date_end);
        let end_overlap =
            (end + config.planning_horizon_overlap as Timestamp).min(config.date_end);
        Self { index: 0, start, end, end_overlap }
    }

    /// Moves to the next window; returns `false` once the planning interval
    /// is exhausted.
    pub fn advance(&mut self, config: &Config) -> bool {
        if self.end == config.date_end {
            return false;
        }
        self.start = self.end;
        self.end = (self.end + config.planning_horizon_length as Timestamp).min(config.date_end);
        self.end_overlap =
            (self.end_overlap + config.planning_horizon_length as Timestamp).min(config.date_end);
        self.index += 1;
        true
    }
}

/// A schedule-graph vertex re-indexed into a dense per-horizon register.
#[derive(Debug, Clone, Copy)]
pub struct SubNode {
    /// Dense zero-based index within its register.
    pub index: usize,
    /// The underlying schedule-graph vertex.
    pub node: NodeIndex,
}

/// Everything pricing and the master problem see of one planning horizon.
pub struct HorizonView<'a> {
    pub data: &'a DataSet,
    pub graph: &'a ScheduleGraph,
    pub horizon: HorizonClock,

    pub trips: Vec<SubNode>,
    pub maintenances: Vec<SubNode>,
    /// Put-on lattice slots per charger, aligned with `take_offs`.
    pub put_ons: Vec<Vec<SubNode>>,
    pub take_offs: Vec<Vec<SubNode>>,

    pub earliest_vehicle_time: Timestamp,
    /// Set when at least one maintenance in the window still has no
    /// pre-assigned vehicle; switches the convex maintenance penalty on.
    pub has_unassigned_maintenance: bool,
}

impl<'a> HorizonView<'a> {
    pub fn new(data: &'a DataSet, graph: &'a ScheduleGraph, horizon: HorizonClock) -> Self {
        let mut earliest_vehicle_time = horizon.start;
        for vehicle in data.vehicles.iter() {
            let last = graph.node(graph.vehicle_position(vehicle.index).last_node);
            earliest_vehicle_time = earliest_vehicle_time.min(last.end_time);
        }

        let trips = graph
            .trips_in_interval(horizon.start, horizon.end_overlap)
            .into_iter()
            .enumerate()
            .map(|(index, node)| SubNode { index, node })
            .collect();

        let mut has_unassigned_maintenance = false;
        let maintenances = graph
            .maintenances_in_interval(horizon.start, horizon.end_overlap)
            .into_iter()
            .enumerate()
            .map(|(index, node)| {
                if let ActivityKind::Maintenance { maintenance } = graph.node(node).kind {
                    if data.maintenance(maintenance).vehicle.is_none() {
                        has_unassigned_maintenance = true;
                    }
                }
                SubNode { index, node }
            })
            .collect();

        let mut put_ons = vec![Vec::new(); data.chargers.len()];
        for node in graph.put_ons_in_interval(earliest_vehicle_time, horizon.end_overlap) {
            if let ActivityKind::PutOnCharge { charger } = graph.node(node).kind {
                let index = put_ons[charger].len();
                put_ons[charger].push(SubNode { index, node });
            }
        }
        let mut take_offs = vec![Vec::new(); data.chargers.len()];
        for node in graph.take_offs_in_interval(earliest_vehicle_time, horizon.end_overlap) {
            if let ActivityKind::TakeOffCharge { charger } = graph.node(node).kind {
                let index = take_offs[charger].len();
                take_offs[charger].push(SubNode { index, node });
            }
        }

        Self {
            data,
            graph,
            horizon,
            trips,
            maintenances,
            put_ons,
            take_offs,
            earliest_vehicle_time,
            has_unassigned_maintenance,
        }
    }

    #[inline]
    pub fn node(&self, node: NodeIndex) -> &ScheduleNode {
        self.graph.node(node)
    }

    #[inline]
    pub fn trip_node(&self, index: usize) -> &ScheduleNode {
        self.graph.node(self.trips[index].node)
    }

    #[inline]
    pub fn maintenance_node(&self, index: usize) -> &ScheduleNode {
        self.graph.node(self.maintenances[index].node)
    }

    #[inline]
    pub fn put_on_node(&self, charger: usize, index: usize) -> &ScheduleNode {
        self.graph.node(self.put_ons[charger][index].node)
    }

    #[inline]
    pub fn take_off_node(&self, charger: usize, index: usize) -> &ScheduleNode {
        self.graph.node(self.take_offs[charger][index].node)
    }

    #[inline]
    pub fn vehicle_position(&self, vehicle: usize) -> &VehicleState {
        self.graph.vehicle_position(vehicle)
    }

    #[inline]
    fn lattice_step(&self) -> i64 {
        self.data.config.charger_capacity_check as i64
    }

    /// Earliest put-on slot whose start is at or after `t`. If `t` lies
    /// before the first slot the vehicle simply waits for it.
    pub fn next_put_on_after(&self, charger: usize, t: Timestamp) -> Option<usize> {
        let slots = &self.put_ons[charger];
        let first = slots.first()?;
        let diff = (t - self.graph.node(first.node).start_time).max(0);
        let index = time::div_ceil(diff, self.lattice_step()) as usize;
        (index < slots.len()).then_some(index)
    }

    pub fn next_take_off_after(&self, charger: usize, t: Timestamp) -> Option<usize> {
        let slots = &self.take_offs[charger];
        let first = slots.first()?;
        let diff = (t - self.graph.node(first.node).start_time).max(0);
        let index = time::div_ceil(diff, self.lattice_step()) as usize;
        (index < slots.len()).then_some(index)
    }

    /// Latest put-on slot that is fully over by `t` (slot end ≤ `t`).
    pub fn last_put_on_before(&self, charger: usize, t: Timestamp) -> Option<usize> {
        let slots = &self.put_ons[charger];
        let first = slots.first()?;
        let diff = t - self.graph.node(first.node).end_time;
        if diff < 0 {
            return None;
        }
        Some(((diff / self.lattice_step()) as usize).min(slots.len() - 1))
    }

    pub fn last_take_off_before(&self, charger: usize, t: Timestamp) -> Option<usize> {
        let slots = &self.take_offs[charger];
        let first = slots.first()?;
        let diff = t - self.graph.node(first.node).end_time;
        if diff < 0 {
            return None;
        }
        Some(((diff / self.lattice_step()) as usize).min(slots.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut cfg = Config::default();
        cfg.date_start = 0;
        cfg.date_end = 100_000;
        cfg.planning_horizon_length = 40_000;
        cfg.planning_horizon_overlap = 5_000;
        cfg
    }

    #[test]
    fn test_clock_rolls_to_date_end() {
        let cfg = config();
        let mut clock = HorizonClock::first(&cfg);
        assert_eq!((clock.start, clock.end, clock.end_overlap), (0, 40_000, 45_000));

        assert!(clock.advance(&cfg));
        assert_eq!((clock.start, clock.end, clock.end_overlap), (40_000, 80_000, 85_000));

        assert!(clock.advance(&cfg));
        assert_eq!((clock.start, clock.end), (80_000, 100_000));
        assert_eq!(clock.end_overlap, 100_000);

        assert!(!clock.advance(&cfg));
    }

    #[test]
    fn test_zero_overlap_clock() {
        let mut cfg = config();
        cfg.planning_horizon_overlap = 0;
        let clock = HorizonClock::first(&cfg);
        assert_eq!(clock.end, clock.end_overlap);
    }
}
