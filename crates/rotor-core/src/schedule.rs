//! The committed schedule graph.
//!
//! A directed multigraph over activity instances. Every vertex exposes the
//! same surface (start/end time, start/end location, distance, duration);
//! arcs carry an insertion index and a wait duration only; cost is derived
//! from nodes during replay. Each vehicle owns an ordered path of arcs
//! representing its committed history, and the graph maintains time-sorted
//! registers for trip, maintenance, put-on and take-off vertices so the
//! planning-horizon view can slice them quickly.
//!
//! Two invariants are enforced on every commit and replay:
//! - time-space continuity of every vehicle path (target of an arc is the
//!   source of the next one, and activities never overlap in time);
//! - the state of charge stays within `[battery_min, battery_max]`.
//!
//! Violations are [`RotorError::Logic`]: a schedule that breaks them was
//! produced by a buggy optimiser, not by bad input.

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::Direction;

use crate::error::{RotorError, RotorResult};
use crate::model::{DataSet, Vehicle};
use crate::{time, BatteryKwh, Timestamp};

/// Discriminates the nine activity kinds; payloads are dense indices into
/// the owning [`DataSet`] collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Trip { trip: usize },
    Maintenance { maintenance: usize },
    StartSchedule { vehicle: usize },
    PutOnCharge { charger: usize },
    TakeOffCharge { charger: usize },
    Deadleg,
    Charging { charger: usize },
    OutOfRotation,
    Undefined,
}

/// One activity instance. The uniform fields are fixed at construction so
/// that replay and window queries never have to consult the input data.
#[derive(Debug, Clone)]
pub struct ScheduleNode {
    pub kind: ActivityKind,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub start_location: usize,
    pub end_location: usize,
    pub distance_km: u32,
}

impl ScheduleNode {
    #[inline]
    pub fn duration_s(&self) -> u32 {
        (self.end_time - self.start_time) as u32
    }

    pub fn trip(data: &DataSet, trip: usize) -> RotorResult<Self> {
        let t = data.trip(trip);
        let distance = data
            .location(t.start_location)
            .distance_to(t.end_location)
            .ok_or_else(|| {
                RotorError::Data(format!(
                    "trip {} has no travel-matrix entry between its endpoints",
                    t.id.value()
                ))
            })?;
        Ok(Self {
            kind: ActivityKind::Trip { trip },
            start_time: t.start_time,
            end_time: t.end_time,
            start_location: t.start_location,
            end_location: t.end_location,
            distance_km: distance,
        })
    }

    pub fn maintenance(data: &DataSet, maintenance: usize) -> Self {
        let m = data.maintenance(maintenance);
        Self {
            kind: ActivityKind::Maintenance { maintenance },
            start_time: m.start_time,
            end_time: m.end_time,
            start_location: m.location,
            end_location: m.location,
            distance_km: 0,
        }
    }

    pub fn start_schedule(data: &DataSet, vehicle: &Vehicle) -> Self {
        let location = data.charger(vehicle.initial_charger).location;
        Self {
            kind: ActivityKind::StartSchedule { vehicle: vehicle.index },
            start_time: vehicle.initial_start_time,
            end_time: vehicle.initial_start_time,
            start_location: location,
            end_location: location,
            distance_km: 0,
        }
    }

    pub fn put_on_charge(data: &DataSet, charger: usize, start: Timestamp, end: Timestamp) -> Self {
        let location = data.charger(charger).location;
        Self {
            kind: ActivityKind::PutOnCharge { charger },
            start_time: start,
            end_time: end,
            start_location: location,
            end_location: location,
            distance_km: 0,
        }
    }

    pub fn take_off_charge(
        data: &DataSet,
        charger: usize,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        let location = data.charger(charger).location;
        Self {
            kind: ActivityKind::TakeOffCharge { charger },
            start_time: start,
            end_time: end,
            start_location: location,
            end_location: location,
            distance_km: 0,
        }
    }

    pub fn charging(data: &DataSet, charger: usize, start: Timestamp, end: Timestamp) -> Self {
        let location = data.charger(charger).location;
        Self {
            kind: ActivityKind::Charging { charger },
            start_time: start,
            end_time: end,
            start_location: location,
            end_location: location,
            distance_km: 0,
        }
    }

    pub fn deadleg(
        data: &DataSet,
        from_location: usize,
        to_location: usize,
        start: Timestamp,
    ) -> RotorResult<Self> {
        let from = data.location(from_location);
        let (distance, duration) = from
            .distance_to(to_location)
            .zip(from.duration_to(to_location))
            .ok_or_else(|| {
                RotorError::Logic(format!(
                    "deadleg between unconnected locations {} -> {}",
                    from.id.value(),
                    data.location(to_location).id.value()
                ))
            })?;
        Ok(Self {
            kind: ActivityKind::Deadleg,
            start_time: start,
            end_time: start + duration as Timestamp,
            start_location: from_location,
            end_location: to_location,
            distance_km: distance,
        })
    }

    pub fn out_of_rotation(location: usize, time: Timestamp) -> Self {
        Self {
            kind: ActivityKind::OutOfRotation,
            start_time: time,
            end_time: time,
            start_location: location,
            end_location: location,
            distance_km: 0,
        }
    }

    /// kWh gained by a full stay on this `Charging` node, capped at the
    /// vehicle's maximum battery.
    pub fn charge_gain(&self, data: &DataSet, soc: BatteryKwh, vehicle: &Vehicle) -> BatteryKwh {
        match self.kind {
            ActivityKind::Charging { charger } => {
                let rate = vehicle.charging_rate_kw_s(data.charger(charger));
                (vehicle.battery_max_kwh - soc)
                    .min((rate * self.duration_s() as f64) as BatteryKwh)
            }
            _ => 0,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ActivityKind::Trip { .. } => "TRIP",
            ActivityKind::Maintenance { .. } => "MAINTENANCE",
            ActivityKind::StartSchedule { .. } => "START_SCHEDULE",
            ActivityKind::PutOnCharge { .. } => "PUT_ON_CHARGE",
            ActivityKind::TakeOffCharge { .. } => "TAKE_OFF_CHARGE",
            ActivityKind::Deadleg => "DEADLEG",
            ActivityKind::Charging { .. } => "CHARGING",
            ActivityKind::OutOfRotation => "OUT_OF_ROTATION",
            ActivityKind::Undefined => "UNDEFINED",
        }
    }
}

/// Arcs only sequence activities; the wait is the idle gap before the target
/// starts.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleArc {
    pub wait_s: u32,
}

/// Authoritative per-vehicle state, recomputed by replaying the committed
/// path after every commit.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub cost_deadlegs: f64,
    pub cost_maintenance: f64,
    pub cost_vehicle: f64,
    pub dist_deadlegs_km: u32,
    pub odometer_km: u32,
    pub odometer_last_maintenance_km: u32,
    pub maintenance_distances_km: Vec<u32>,
    pub soc: BatteryKwh,
    pub lb_soc: BatteryKwh,
    pub ub_soc: BatteryKwh,
    pub seconds_charging: i64,
    pub seconds_idle: i64,
    pub seconds_maintenance: i64,
    pub seconds_productive: i64,
    pub last_node: NodeIndex,
}

impl VehicleState {
    pub fn new(
        odometer_km: u32,
        odometer_last_maintenance_km: u32,
        soc: BatteryKwh,
        last_node: NodeIndex,
    ) -> Self {
        Self {
            cost_deadlegs: 0.0,
            cost_maintenance: 0.0,
            cost_vehicle: 0.0,
            dist_deadlegs_km: 0,
            odometer_km,
            odometer_last_maintenance_km,
            maintenance_distances_km: Vec::new(),
            soc,
            lb_soc: BatteryKwh::MAX,
            ub_soc: BatteryKwh::MIN,
            seconds_charging: 0,
            seconds_idle: 0,
            seconds_maintenance: 0,
            seconds_productive: 0,
            last_node,
        }
    }

    #[inline]
    pub fn distance_last_maintenance_km(&self) -> u32 {
        self.odometer_km - self.odometer_last_maintenance_km
    }

    #[inline]
    pub fn cost_total(&self) -> f64 {
        self.cost_deadlegs + self.cost_vehicle + self.cost_maintenance
    }

    pub fn avg_distance_maintenance(&self) -> Option<f64> {
        if self.maintenance_distances_km.is_empty() {
            return None;
        }
        let sum: f64 = self.maintenance_distances_km.iter().map(|&d| d as f64).sum();
        Some(sum / self.maintenance_distances_km.len() as f64)
    }

    pub fn std_distance_maintenance(&self) -> Option<f64> {
        let mean = self.avg_distance_maintenance()?;
        let var: f64 = self
            .maintenance_distances_km
            .iter()
            .map(|&d| (d as f64 - mean).powi(2))
            .sum::<f64>()
            / self.maintenance_distances_km.len() as f64;
        Some(var.sqrt())
    }
}

/// One vehicle's chosen activities for a planning horizon, expressed as the
/// ordered schedule-graph nodes it traverses.
#[derive(Debug, Clone)]
pub struct VehicleAssignment {
    pub vehicle: usize,
    pub start_location: usize,
    pub end_location: usize,
    pub nodes: Vec<NodeIndex>,
}

/// An integer per-horizon solution handed from the optimiser to the commit
/// routine.
#[derive(Debug, Clone)]
pub struct Solution {
    pub objective: f64,
    pub unassigned_trips: u32,
    pub vehicles_selected: u32,
    pub schedules: Vec<VehicleAssignment>,
    pub horizon_start: Timestamp,
    pub horizon_end: Timestamp,
}

impl Default for Solution {
    fn default() -> Self {
        Self {
            objective: f64::INFINITY,
            unassigned_trips: 0,
            vehicles_selected: 0,
            schedules: Vec::new(),
            horizon_start: 0,
            horizon_end: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScheduleGraph {
    graph: DiGraph<ScheduleNode, ScheduleArc>,
    sorted_trips: Vec<NodeIndex>,
    sorted_maintenances: Vec<NodeIndex>,
    sorted_put_ons: Vec<NodeIndex>,
    sorted_take_offs: Vec<NodeIndex>,
    start_nodes: Vec<NodeIndex>,
    paths: Vec<Vec<EdgeIndex>>,
    positions: Vec<VehicleState>,
    earliest_vehicle_start: Timestamp,
}

impl ScheduleGraph {
    /// Builds the graph from the input: one start vertex per vehicle, one
    /// vertex per trip and per maintenance, and the put-on/take-off lattices
    /// of every charger, then replays the (empty) paths to seed the vehicle
    /// positions.
    pub fn initialise(data: &DataSet) -> RotorResult<Self> {
        let mut graph = Self {
            earliest_vehicle_start: data.config.date_start,
            paths: vec![Vec::new(); data.vehicles.len()],
            positions: Vec::new(),
            ..Self::default()
        };

        graph.add_start_nodes(data);
        graph.add_trip_nodes(data)?;
        graph.add_maintenance_nodes(data);
        graph.add_charger_lattices(data);

        graph.positions = data
            .vehicles
            .iter()
            .map(|v| {
                VehicleState::new(
                    v.odometer_km,
                    v.odometer_last_maintenance_km,
                    v.initial_soc,
                    graph.start_nodes[v.index],
                )
            })
            .collect();
        graph.update_vehicle_positions(data)?;
        Ok(graph)
    }

    fn add_start_nodes(&mut self, data: &DataSet) {
        self.start_nodes = data
            .vehicles
            .iter()
            .map(|vehicle| {
                self.earliest_vehicle_start =
                    self.earliest_vehicle_start.min(vehicle.initial_start_time);
                self.graph.add_node(ScheduleNode::start_schedule(data, vehicle))
            })
            .collect();
    }

    fn add_trip_nodes(&mut self, data: &DataSet) -> RotorResult<()> {
        for trip in data.trips.iter() {
            let node = self.graph.add_node(ScheduleNode::trip(data, trip.index)?);
            Self::store_sorted(&self.graph, &mut self.sorted_trips, node);
        }
        Ok(())
    }

    fn add_maintenance_nodes(&mut self, data: &DataSet) {
        for maintenance in data.maintenances.iter() {
            let node = self
                .graph
                .add_node(ScheduleNode::maintenance(data, maintenance.index));
            Self::store_sorted(&self.graph, &mut self.sorted_maintenances, node);
        }
    }

    /// The lattices discretise the time at which a vehicle can be put on or
    /// taken off charge, one slot pair every `charger_capacity_check`
    /// seconds. Slots start six hours before the earliest vehicle so an
    /// initial recharge is always expressible.
    fn add_charger_lattices(&mut self, data: &DataSet) {
        let cfg = &data.config;
        let lattice_end = data.config.date_end + cfg.planning_horizon_overlap as Timestamp;
        for charger in data.chargers.iter() {
            let mut start = self.earliest_vehicle_start - 6 * 60 * 60;
            while start < lattice_end {
                let put_on = self.graph.add_node(ScheduleNode::put_on_charge(
                    data,
                    charger.index,
                    start,
                    start + cfg.put_vehicle_on_charge as Timestamp,
                ));
                Self::store_sorted(&self.graph, &mut self.sorted_put_ons, put_on);

                let take_off = self.graph.add_node(ScheduleNode::take_off_charge(
                    data,
                    charger.index,
                    start,
                    start + cfg.take_vehicle_off_charge as Timestamp,
                ));
                Self::store_sorted(&self.graph, &mut self.sorted_take_offs, take_off);

                start += cfg.charger_capacity_check as Timestamp;
            }
        }
    }

    fn store_sorted(
        graph: &DiGraph<ScheduleNode, ScheduleArc>,
        sorted: &mut Vec<NodeIndex>,
        node: NodeIndex,
    ) {
        let t = graph[node].start_time;
        let pos = sorted.partition_point(|&n| graph[n].start_time < t);
        sorted.insert(pos, node);
    }

    // ------------------------------------------------------------------
    // Accessors

    #[inline]
    pub fn node(&self, node: NodeIndex) -> &ScheduleNode {
        &self.graph[node]
    }

    #[inline]
    pub fn arc(&self, arc: EdgeIndex) -> &ScheduleArc {
        &self.graph[arc]
    }

    #[inline]
    pub fn arc_source(&self, arc: EdgeIndex) -> NodeIndex {
        self.graph.edge_endpoints(arc).expect("arc in graph").0
    }

    #[inline]
    pub fn arc_target(&self, arc: EdgeIndex) -> NodeIndex {
        self.graph.edge_endpoints(arc).expect("arc in graph").1
    }

    #[inline]
    pub fn out_degree(&self, node: NodeIndex) -> usize {
        self.graph.edges_directed(node, Direction::Outgoing).count()
    }

    #[inline]
    pub fn vehicle_path(&self, vehicle: usize) -> &[EdgeIndex] {
        &self.paths[vehicle]
    }

    #[inline]
    pub fn vehicle_position(&self, vehicle: usize) -> &VehicleState {
        &self.positions[vehicle]
    }

    #[inline]
    pub fn start_node(&self, vehicle: usize) -> NodeIndex {
        self.start_nodes[vehicle]
    }

    #[inline]
    pub fn sorted_put_ons(&self) -> &[NodeIndex] {
        &self.sorted_put_ons
    }

    #[inline]
    pub fn sorted_take_offs(&self) -> &[NodeIndex] {
        &self.sorted_take_offs
    }

    #[inline]
    pub fn sorted_trips(&self) -> &[NodeIndex] {
        &self.sorted_trips
    }

    #[inline]
    pub fn sorted_maintenances(&self) -> &[NodeIndex] {
        &self.sorted_maintenances
    }

    // ------------------------------------------------------------------
    // Window queries

    fn in_interval(&self, sorted: &[NodeIndex], lb: Timestamp, ub: Timestamp) -> Vec<NodeIndex> {
        let from = sorted.partition_point(|&n| self.graph[n].start_time < lb);
        let to = sorted.partition_point(|&n| self.graph[n].start_time < ub);
        sorted[from..to]
            .iter()
            .copied()
            .filter(|&n| !self.is_covered(n))
            .collect()
    }

    /// A trip/maintenance vertex with an outgoing arc is already committed
    /// to a vehicle and no longer available for planning.
    fn is_covered(&self, node: NodeIndex) -> bool {
        match self.graph[node].kind {
            ActivityKind::Deadleg
            | ActivityKind::Trip { .. }
            | ActivityKind::Maintenance { .. }
            | ActivityKind::StartSchedule { .. } => self.out_degree(node) > 0,
            _ => false,
        }
    }

    pub fn trips_in_interval(&self, lb: Timestamp, ub: Timestamp) -> Vec<NodeIndex> {
        self.in_interval(&self.sorted_trips, lb, ub)
    }

    pub fn maintenances_in_interval(&self, lb: Timestamp, ub: Timestamp) -> Vec<NodeIndex> {
        self.in_interval(&self.sorted_maintenances, lb, ub)
    }

    pub fn put_ons_in_interval(&self, lb: Timestamp, ub: Timestamp) -> Vec<NodeIndex> {
        self.in_interval(&self.sorted_put_ons, lb, ub)
    }

    pub fn take_offs_in_interval(&self, lb: Timestamp, ub: Timestamp) -> Vec<NodeIndex> {
        self.in_interval(&self.sorted_take_offs, lb, ub)
    }

    pub fn unassigned_trip_nodes(&self) -> Vec<NodeIndex> {
        self.sorted_trips
            .iter()
            .copied()
            .filter(|&n| self.out_degree(n) == 0)
            .collect()
    }

    pub fn unassigned_maintenance_nodes(&self) -> Vec<NodeIndex> {
        self.sorted_maintenances
            .iter()
            .copied()
            .filter(|&n| self.out_degree(n) == 0)
            .collect()
    }

    /// Every committed charging session as `(charger, put-on vertex,
    /// take-off vertex)`, recovered by following the committed
    /// `put-on -> charging -> take-off` arcs.
    pub fn committed_charging_sessions(&self) -> Vec<(usize, NodeIndex, NodeIndex)> {
        let mut sessions = Vec::new();
        for &put_on in &self.sorted_put_ons {
            let ActivityKind::PutOnCharge { charger } = self.graph[put_on].kind else {
                continue;
            };
            for charging in self.graph.neighbors_directed(put_on, Direction::Outgoing) {
                if !matches!(self.graph[charging].kind, ActivityKind::Charging { .. }) {
                    continue;
                }
                for take_off in self.graph.neighbors_directed(charging, Direction::Outgoing) {
                    if matches!(self.graph[take_off].kind, ActivityKind::TakeOffCharge { .. }) {
                        sessions.push((charger, put_on, take_off));
                    }
                }
            }
        }
        sessions
    }

    // ------------------------------------------------------------------
    // Commit helpers

    /// Appends a deadleg between two existing vertices. A deadleg between a
    /// put-on and a take-off vertex is never valid (that gap is a charging
    /// session).
    pub fn add_deadleg(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        data: &DataSet,
        vehicle: usize,
    ) -> RotorResult<()> {
        if matches!(self.graph[from].kind, ActivityKind::PutOnCharge { .. })
            && matches!(self.graph[to].kind, ActivityKind::TakeOffCharge { .. })
        {
            return Err(RotorError::Logic(
                "deadleg between a put-on and a take-off vertex".into(),
            ));
        }

        let deadleg = if matches!(self.graph[from].kind, ActivityKind::Deadleg) {
            from
        } else {
            let node = ScheduleNode::deadleg(
                data,
                self.graph[from].end_location,
                self.graph[to].start_location,
                self.graph[from].end_time,
            )?;
            let deadleg = self.graph.add_node(node);
            let arc = self.graph.add_edge(from, deadleg, ScheduleArc { wait_s: 0 });
            self.paths[vehicle].push(arc);
            deadleg
        };

        let wait = (self.graph[to].start_time - self.graph[deadleg].end_time) as u32;
        let arc = self.graph.add_edge(deadleg, to, ScheduleArc { wait_s: wait });
        self.paths[vehicle].push(arc);

        self.check_continuity()
    }

    /// Appends the closing deadleg of a horizon: from the last committed
    /// vertex to a bare location, with no successor.
    pub fn add_deadleg_to_location(
        &mut self,
        from: NodeIndex,
        to_location: usize,
        data: &DataSet,
        vehicle: usize,
    ) -> RotorResult<()> {
        if matches!(self.graph[from].kind, ActivityKind::PutOnCharge { .. }) {
            return Err(RotorError::Logic(
                "closing deadleg directly after a put-on vertex".into(),
            ));
        }

        let node = ScheduleNode::deadleg(
            data,
            self.graph[from].end_location,
            to_location,
            self.graph[from].end_time,
        )?;
        let deadleg = self.graph.add_node(node);
        let arc = self.graph.add_edge(from, deadleg, ScheduleArc { wait_s: 0 });
        self.paths[vehicle].push(arc);

        self.check_continuity()
    }

    /// Appends `put-on -> charging -> take-off` between an existing put-on
    /// and take-off vertex pair.
    pub fn add_charging(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        data: &DataSet,
        vehicle: usize,
    ) -> RotorResult<()> {
        let charger = match (self.graph[from].kind, self.graph[to].kind) {
            (ActivityKind::PutOnCharge { charger }, ActivityKind::TakeOffCharge { .. }) => charger,
            _ => {
                return Err(RotorError::Logic(
                    "charging arc must connect a put-on to a take-off vertex".into(),
                ))
            }
        };

        let charging = self.graph.add_node(ScheduleNode::charging(
            data,
            charger,
            self.graph[from].end_time,
            self.graph[to].start_time,
        ));

        let arc = self.graph.add_edge(from, charging, ScheduleArc { wait_s: 0 });
        self.paths[vehicle].push(arc);
        let wait = (self.graph[to].start_time - self.graph[charging].end_time) as u32;
        let arc = self.graph.add_edge(charging, to, ScheduleArc { wait_s: wait });
        self.paths[vehicle].push(arc);

        self.check_continuity()
    }

    /// Parks a vehicle for the rest of the horizon. The vertex is timed as
    /// late as possible before the next horizon's deadlines: enough slack to
    /// fully recharge plus the longest outgoing deadleg. The vehicle must be
    /// resting at a charger.
    pub fn add_out_of_rotation(
        &mut self,
        from: NodeIndex,
        data: &DataSet,
        vehicle: usize,
        end_horizon: Timestamp,
    ) -> RotorResult<()> {
        let last = self.graph[from].clone();
        let charger = data.charger_at_location(last.end_location).ok_or_else(|| {
            RotorError::Logic("vehicle is not out-of-rotation at a charger".into())
        })?;

        let v = data.vehicle(vehicle);
        let rate = v.charging_rate_kw_s(data.charger(charger));
        let max_charge = (v.battery_max_kwh - self.positions[vehicle].soc).max(0);
        let max_charging_duration = if rate > 0.0 {
            (max_charge as f64 / rate) as Timestamp
                + data.config.put_vehicle_on_charge as Timestamp
                + data.config.take_vehicle_off_charge as Timestamp
        } else {
            0
        };

        let max_deadleg_duration = data
            .locations
            .iter()
            .filter_map(|to| data.location(last.end_location).duration_to(to.index))
            .max()
            .unwrap_or(0) as Timestamp;

        let rest_time = last.end_time.max(time::round_to_minute(
            end_horizon - max_charging_duration - max_deadleg_duration - 60,
        ));

        let parked = self
            .graph
            .add_node(ScheduleNode::out_of_rotation(last.end_location, rest_time));
        let arc = self.graph.add_edge(from, parked, ScheduleArc { wait_s: 0 });
        self.paths[vehicle].push(arc);

        self.check_continuity()
    }

    fn check_continuity(&self) -> RotorResult<()> {
        for (vehicle, path) in self.paths.iter().enumerate() {
            let mut prev: Option<NodeIndex> = None;
            for &arc in path {
                let (source, target) = self.graph.edge_endpoints(arc).expect("arc in graph");
                if let Some(prev) = prev {
                    if prev != source {
                        return Err(RotorError::Logic(format!(
                            "schedule path of vehicle {vehicle} is not space-continuous at arc {}",
                            arc.index()
                        )));
                    }
                }
                if self.graph[source].end_time > self.graph[target].start_time {
                    return Err(RotorError::Logic(format!(
                        "schedule path of vehicle {vehicle} is not time-continuous: {} ends at {} after {} starts at {}",
                        self.graph[source].kind_name(),
                        time::format_datetime(self.graph[source].end_time),
                        self.graph[target].kind_name(),
                        time::format_datetime(self.graph[target].start_time),
                    )));
                }
                prev = Some(target);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Replay

    /// Replays one arc onto `state`. Fails if the state of charge ever
    /// leaves the vehicle's battery bounds.
    pub fn process_arc(
        &self,
        data: &DataSet,
        vehicle: &Vehicle,
        state: &mut VehicleState,
        arc: EdgeIndex,
    ) -> RotorResult<()> {
        let target_node = self.arc_target(arc);
        let target = &self.graph[target_node];

        let old_distance_last_maintenance = state.distance_last_maintenance_km();
        let old_odometer_last_maintenance = state.odometer_last_maintenance_km;

        // Processing any arc means the vehicle is active.
        state.cost_vehicle = vehicle.activation_cost;

        state.last_node = target_node;
        state.odometer_km += target.distance_km;
        state.cost_maintenance += 0.5
            * data.config.cost_coefficient_penalty_maintenance
            * ((state.distance_last_maintenance_km() as f64).powi(2)
                - (old_distance_last_maintenance as f64).powi(2));

        if matches!(target.kind, ActivityKind::Deadleg) {
            state.cost_deadlegs += data.config.cost_deadleg_fix
                + data.config.cost_deadleg_per_km * target.distance_km as f64;
            state.dist_deadlegs_km += target.distance_km;
        }

        state.seconds_idle += self.graph[arc].wait_s as i64;
        match target.kind {
            ActivityKind::Deadleg | ActivityKind::OutOfRotation => {
                state.seconds_idle += target.duration_s() as i64
            }
            ActivityKind::Maintenance { .. } => {
                state.seconds_maintenance += target.duration_s() as i64
            }
            ActivityKind::Charging { .. }
            | ActivityKind::PutOnCharge { .. }
            | ActivityKind::TakeOffCharge { .. } => {
                state.seconds_charging += target.duration_s() as i64
            }
            ActivityKind::Trip { .. } => state.seconds_productive += target.duration_s() as i64,
            _ => {}
        }

        if matches!(target.kind, ActivityKind::Maintenance { .. }) {
            state.odometer_last_maintenance_km = state.odometer_km;
            state
                .maintenance_distances_km
                .push(state.odometer_km - old_odometer_last_maintenance);
        }

        state.soc -= vehicle.battery_discharge(target.distance_km);
        state.lb_soc = state.lb_soc.min(state.soc);

        if state.soc < vehicle.battery_min_kwh || state.soc > vehicle.battery_max_kwh {
            return Err(RotorError::Logic(format!(
                "soc {} of vehicle {} left the battery bounds [{}, {}] during replay",
                state.soc,
                vehicle.id.value(),
                vehicle.battery_min_kwh,
                vehicle.battery_max_kwh,
            )));
        }

        state.soc += target.charge_gain(data, state.soc, vehicle);
        state.ub_soc = state.ub_soc.max(state.soc);
        Ok(())
    }

    /// Recomputes every vehicle's authoritative state by replaying its full
    /// committed path.
    pub fn update_vehicle_positions(&mut self, data: &DataSet) -> RotorResult<()> {
        for vehicle in data.vehicles.iter() {
            let mut state = VehicleState::new(
                vehicle.odometer_km,
                vehicle.odometer_last_maintenance_km,
                vehicle.initial_soc,
                self.start_nodes[vehicle.index],
            );
            for &arc in &self.paths[vehicle.index] {
                self.process_arc(data, vehicle, &mut state, arc)?;
            }
            self.positions[vehicle.index] = state;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit

    /// Appends an integer solution to the committed paths: charging pairs
    /// become `put-on -> charging -> take-off` composites, everything else
    /// is connected with deadlegs, each schedule is closed with a deadleg to
    /// its declared end location, and idle vehicles are parked.
    pub fn store_solution(&mut self, data: &DataSet, solution: &Solution) -> RotorResult<()> {
        let mut in_rotation = vec![false; data.vehicles.len()];

        for assignment in &solution.schedules {
            let mut from = self.positions[assignment.vehicle].last_node;

            for &to in &assignment.nodes {
                let is_charging_pair =
                    matches!(self.graph[from].kind, ActivityKind::PutOnCharge { .. })
                        && matches!(self.graph[to].kind, ActivityKind::TakeOffCharge { .. });
                if is_charging_pair {
                    self.add_charging(from, to, data, assignment.vehicle)?;
                } else {
                    self.add_deadleg(from, to, data, assignment.vehicle)?;
                }
                from = to;
            }

            if !assignment.nodes.is_empty() {
                in_rotation[assignment.vehicle] = true;
                self.add_deadleg_to_location(
                    from,
                    assignment.end_location,
                    data,
                    assignment.vehicle,
                )?;
            }
        }

        for vehicle in data.vehicles.iter() {
            if !in_rotation[vehicle.index] {
                self.add_out_of_rotation(
                    self.positions[vehicle.index].last_node,
                    data,
                    vehicle.index,
                    solution.horizon_end,
                )?;
            }
        }

        self.update_vehicle_positions(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::{ChargerId, LocationId, TripId, VehicleId};

    /// One charger location and one stop, 10 km / 600 s apart, one vehicle,
    /// one trip from the stop back to the stop.
    fn small_data() -> DataSet {
        let mut data = DataSet::default();
        data.config.date_start = 0;
        data.config.date_end = 86_400;

        let measures = |d, t| TravelMeasure { distance_km: d, duration_s: t };
        data.locations
            .push(Location {
                index: 0,
                id: LocationId::new(1),
                kind: LocationKind::Charger,
                name: "depot".into(),
                travel: vec![measures(0, 0), measures(10, 600)],
            })
            .unwrap();
        data.locations
            .push(Location {
                index: 1,
                id: LocationId::new(2),
                kind: LocationKind::Stop,
                name: "stop".into(),
                travel: vec![measures(10, 600), measures(0, 0)],
            })
            .unwrap();
        data.chargers
            .push(Charger {
                index: 0,
                id: ChargerId::new(1),
                location: 0,
                capacity: 2,
                volts: 400,
                amps: 125,
            })
            .unwrap();
        data.vehicles
            .push(Vehicle {
                index: 0,
                id: VehicleId::new(1),
                battery_min_kwh: 10,
                battery_max_kwh: 300,
                initial_charger: 0,
                initial_start_time: 3600,
                initial_soc: 200,
                volts: 400,
                amps: 125,
                number_plate: "EV-1".into(),
                odometer_km: 0,
                odometer_last_maintenance_km: 0,
                in_rotation: true,
                activation_cost: 100.0,
                kwh_per_1000km: 1000,
            })
            .unwrap();
        data.trips
            .push(Trip {
                index: 0,
                id: TripId::new(1),
                start_time: 10_000,
                end_time: 12_000,
                start_location: 1,
                end_location: 1,
                line_id: 7,
            })
            .unwrap();
        data
    }

    #[test]
    fn test_initialise_builds_lattices() {
        let data = small_data();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        // Lattice spans from 6 h before the vehicle start to date_end.
        assert!(!graph.sorted_put_ons().is_empty());
        assert_eq!(graph.sorted_put_ons().len(), graph.sorted_take_offs().len());
        let first = graph.node(graph.sorted_put_ons()[0]);
        assert_eq!(first.start_time, 3600 - 6 * 3600);
        // Slots of one charger are aligned put-on/take-off pairs.
        let first_off = graph.node(graph.sorted_take_offs()[0]);
        assert_eq!(first.start_time, first_off.start_time);
    }

    #[test]
    fn test_commit_trip_and_replay() {
        let data = small_data();
        let mut graph = ScheduleGraph::initialise(&data).unwrap();
        let trip_node = graph.sorted_trips()[0];

        let solution = Solution {
            objective: 0.0,
            unassigned_trips: 0,
            vehicles_selected: 1,
            schedules: vec![VehicleAssignment {
                vehicle: 0,
                start_location: 0,
                end_location: 0,
                nodes: vec![trip_node],
            }],
            horizon_start: 0,
            horizon_end: 86_400,
        };
        graph.store_solution(&data, &solution).unwrap();

        let state = graph.vehicle_position(0);
        // depot -> stop (10 km), trip (0 km), stop -> depot (10 km)
        assert_eq!(state.odometer_km, 20);
        assert_eq!(state.soc, 200 - 20);
        assert_eq!(state.dist_deadlegs_km, 20);
        assert!(state.seconds_productive > 0);

        // Trip is now covered and must no longer be offered for planning.
        assert!(graph.trips_in_interval(0, 86_400).is_empty());
    }

    #[test]
    fn test_out_of_rotation_requires_charger() {
        let data = small_data();
        let mut graph = ScheduleGraph::initialise(&data).unwrap();
        let solution = Solution {
            horizon_end: 86_400,
            ..Solution::default()
        };
        // Vehicle rests at its initial charger, so parking succeeds.
        graph.store_solution(&data, &solution).unwrap();
        let state = graph.vehicle_position(0);
        assert!(matches!(
            graph.node(state.last_node).kind,
            ActivityKind::OutOfRotation
        ));
    }

    #[test]
    fn test_committed_sessions_recovered() {
        let data = small_data();
        let mut graph = ScheduleGraph::initialise(&data).unwrap();
        assert!(graph.committed_charging_sessions().is_empty());

        let put_on = graph.sorted_put_ons()[80];
        let take_off = graph.sorted_take_offs()[83];
        let start = graph.start_node(0);
        graph.add_deadleg(start, put_on, &data, 0).unwrap();
        graph.add_charging(put_on, take_off, &data, 0).unwrap();
        graph.add_deadleg_to_location(take_off, 0, &data, 0).unwrap();

        let sessions = graph.committed_charging_sessions();
        assert_eq!(sessions, vec![(0, put_on, take_off)]);
    }

    #[test]
    fn test_soc_violation_is_fatal() {
        let mut data = small_data();
        // A battery too small for the round trip.
        data.vehicles.iter_mut().next().unwrap().initial_soc = 15;
        let mut graph = ScheduleGraph::initialise(&data).unwrap();
        let trip_node = graph.sorted_trips()[0];
        let solution = Solution {
            schedules: vec![VehicleAssignment {
                vehicle: 0,
                start_location: 0,
                end_location: 0,
                nodes: vec![trip_node],
            }],
            horizon_end: 86_400,
            ..Solution::default()
        };
        let err = graph.store_solution(&data, &solution).unwrap_err();
        assert!(matches!(err, RotorError::Logic(_)));
    }
}
