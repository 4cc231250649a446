//! Segments: minimal work blocks from charger to charger.
//!
//! A segment starts at a charger, runs through a sequence of
//! location-equivalent activity classes (possibly with empty legs between
//! them) and returns to a charger, with total distance bounded by the
//! longest-ranged vehicle. Segments are enumerated once per horizon by a
//! depth-first recursion over the activity classes.
//!
//! Each segment owns a small layered sub-graph whose non-dominated
//! source-to-sink paths, the *schedule pieces*, are the candidate
//! realisations of the work block. Pieces are re-priced against fresh duals
//! every pricing round; the resource vector is dual-aware (accumulated
//! duals, best/worst-case inbound charging duals, start/end time, the
//! vehicle-access set and the branch-fixing window).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::branch::{BranchKind, BranchNode};
use crate::duals::Duals;
use crate::horizon::HorizonView;
use crate::labelling::label_setting;
use rotor_core::{num, Timestamp, MAX_TIMESTAMP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentActivityKind {
    Trip,
    Maintenance,
}

/// A class of activities sharing start/end location, kind and distance; the
/// members are dense per-horizon indices.
#[derive(Debug, Clone)]
pub struct SegmentActivity {
    pub start_location: usize,
    pub end_location: usize,
    pub distance_km: u32,
    pub kind: SegmentActivityKind,
    pub members: Vec<usize>,
}

impl SegmentActivity {
    fn same_class(&self, other: &SegmentActivity) -> bool {
        self.start_location == other.start_location
            && self.end_location == other.end_location
            && self.kind == other.kind
            && self.distance_km == other.distance_km
    }
}

/// `a` covers at least the vehicles of `b`.
pub fn access_superset(a: &[bool], b: &[bool]) -> bool {
    a.iter().zip(b).all(|(&av, &bv)| av || !bv)
}

/// One non-dominated realisation of a segment.
#[derive(Debug, Clone)]
pub struct SchedulePiece {
    pub acc_duals: f64,
    pub min_charging_duals: f64,
    pub max_charging_duals: f64,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub access: Vec<bool>,
    pub trips: Vec<usize>,
    pub maintenances: Vec<usize>,
    pub schedule_nodes: Vec<NodeIndex>,
    pub fixed_vehicle: Option<usize>,
}

// ---------------------------------------------------------------------
// The per-segment layered sub-graph

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SgKind {
    Trip { sub: usize },
    Maintenance { sub: usize },
    /// Carries the inbound charging-window indices of its aligned layer-1
    /// activity.
    StartSegment { charger: usize, earliest_start: usize, latest_start: usize, latest_end: usize },
    EndSegment,
    CollectiveStart,
    CollectiveEnd,
}

#[derive(Debug, Clone)]
struct SgNode {
    kind: SgKind,
    start_time: Timestamp,
    end_time: Timestamp,
    start_location: Option<usize>,
    end_location: Option<usize>,
    access: Vec<bool>,
    fixed_vehicle: Option<usize>,
    fixed_path_end_time: Timestamp,
    fixed_path_start_time: Timestamp,
    acc_dual: f64,
    min_charging_dual: f64,
    max_charging_dual: f64,
}

impl SgNode {
    fn is_feasible(&self) -> bool {
        self.access.iter().any(|&a| a)
    }

    fn fix_infeasible(&mut self) {
        self.access.iter_mut().for_each(|a| *a = false);
        self.fixed_vehicle = None;
    }

    fn fix_vehicle(&mut self, vehicle: usize) {
        self.access.iter_mut().for_each(|a| *a = false);
        self.access[vehicle] = true;
        self.fixed_vehicle = Some(vehicle);
    }

    fn reset(&mut self, default_access: &[bool]) {
        self.access.clear();
        self.access.extend_from_slice(default_access);
        self.fixed_vehicle = None;
        self.fixed_path_end_time = MAX_TIMESTAMP;
        self.fixed_path_start_time = MAX_TIMESTAMP;
    }
}

#[derive(Clone, Debug)]
struct SgLabel {
    acc_duals: f64,
    min_charging_duals: f64,
    max_charging_duals: f64,
    start_time: Timestamp,
    end_time: Timestamp,
    access: Vec<bool>,
    fixed_vehicle: Option<usize>,
    fixed_allowed_end_time: Timestamp,
}

#[derive(Debug)]
struct SegmentSubGraph {
    graph: DiGraph<SgNode, ()>,
    layers: Vec<Vec<NodeIndex>>,
    schedule_lookup: HashMap<NodeIndex, Vec<NodeIndex>>,
    layer_lookup: HashMap<NodeIndex, usize>,
    source: NodeIndex,
    sink: NodeIndex,
    default_access: Vec<bool>,
}

// ---------------------------------------------------------------------
// Segment

#[derive(Debug)]
pub struct Segment {
    pub index: usize,
    pub start_charger: usize,
    pub end_charger: usize,
    pub deadleg_fix_cost: f64,
    pub maintenance_fix_cost: f64,
    pub maintenance_var_coeff: f64,
    pub distance_before_maintenance_km: u32,
    pub distance_after_maintenance_km: u32,
    pub has_maintenance: bool,
    pub min_recharge_duration_s: u32,
    pub max_recharge_duration_s: u32,
    pub min_full_presence_s: u32,
    pub max_full_presence_s: u32,
    pub feasible_vehicles: Vec<bool>,
    pub pieces: Vec<SchedulePiece>,
    subgraph: SegmentSubGraph,
}

impl Segment {
    #[inline]
    pub fn total_distance_km(&self) -> u32 {
        self.distance_before_maintenance_km + self.distance_after_maintenance_km
    }

    /// Cost of driving this segment after `prev_distance` metres since the
    /// last maintenance: deadleg fixes plus the convex maintenance penalty.
    #[inline]
    pub fn cost(&self, prev_distance_km: u32) -> f64 {
        self.deadleg_fix_cost
            + self.maintenance_fix_cost
            + self.maintenance_var_coeff * prev_distance_km as f64
    }

    /// Distance since maintenance after this segment.
    #[inline]
    pub fn updated_distance(&self, prev_distance_km: u32) -> u32 {
        if self.has_maintenance {
            self.distance_after_maintenance_km
        } else {
            prev_distance_km + self.distance_before_maintenance_km
        }
    }

    fn new(
        view: &HorizonView<'_>,
        index: usize,
        start_charger: usize,
        end_charger: usize,
        activities: &[SegmentActivity],
    ) -> Self {
        let mut segment = Self {
            index,
            start_charger,
            end_charger,
            deadleg_fix_cost: 0.0,
            maintenance_fix_cost: 0.0,
            maintenance_var_coeff: 0.0,
            distance_before_maintenance_km: 0,
            distance_after_maintenance_km: 0,
            has_maintenance: false,
            min_recharge_duration_s: u32::MAX,
            max_recharge_duration_s: 0,
            min_full_presence_s: u32::MAX,
            max_full_presence_s: 0,
            feasible_vehicles: Vec::new(),
            pieces: Vec::new(),
            subgraph: SegmentSubGraph {
                graph: DiGraph::new(),
                layers: Vec::new(),
                schedule_lookup: HashMap::new(),
                layer_lookup: HashMap::new(),
                source: NodeIndex::end(),
                sink: NodeIndex::end(),
                default_access: Vec::new(),
            },
        };
        segment.init_metrics(view, activities);
        segment.init_feasible_vehicles(view);
        segment.init_charging_bounds(view);
        segment.init_subgraph(view, activities);
        segment
    }

    fn init_metrics(&mut self, view: &HorizonView<'_>, activities: &[SegmentActivity]) {
        let config = &view.data.config;
        let distance = |from: usize, to: usize| -> u32 {
            view.data.location(from).distance_to(to).unwrap_or(0)
        };

        let mut prev = view.data.charger(self.start_charger).location;
        for activity in activities {
            let leg = distance(prev, activity.start_location);
            self.deadleg_fix_cost +=
                config.cost_deadleg_fix + config.cost_deadleg_per_km * leg as f64;
            let covered = leg + activity.distance_km;
            if self.has_maintenance {
                self.distance_after_maintenance_km += covered;
            } else {
                self.distance_before_maintenance_km += covered;
            }
            if activity.kind == SegmentActivityKind::Maintenance {
                self.has_maintenance = true;
            }
            prev = activity.end_location;
        }

        let closing = distance(prev, view.data.charger(self.end_charger).location);
        if self.has_maintenance {
            self.distance_after_maintenance_km += closing;
        } else {
            self.distance_before_maintenance_km += closing;
        }
        self.deadleg_fix_cost +=
            config.cost_deadleg_fix + config.cost_deadleg_per_km * closing as f64;

        if view.has_unassigned_maintenance {
            self.maintenance_fix_cost = 0.5
                * config.cost_coefficient_penalty_maintenance
                * ((self.distance_before_maintenance_km as f64).powi(2)
                    + (self.distance_after_maintenance_km as f64).powi(2));
            self.maintenance_var_coeff = config.cost_coefficient_penalty_maintenance
                * self.distance_before_maintenance_km as f64;
        }
    }

    fn init_feasible_vehicles(&mut self, view: &HorizonView<'_>) {
        let start_charger = view.data.charger(self.start_charger);
        self.feasible_vehicles = view
            .data
            .vehicles
            .iter()
            .map(|vehicle| {
                vehicle.distance_range_km() >= self.total_distance_km()
                    && !num::approx_eq(vehicle.charging_rate_kw_s(start_charger), 0.0)
            })
            .collect();
    }

    fn init_charging_bounds(&mut self, view: &HorizonView<'_>) {
        let config = &view.data.config;
        let start_charger = view.data.charger(self.start_charger);
        for vehicle in view.data.vehicles.iter() {
            if !self.feasible_vehicles[vehicle.index] {
                continue;
            }
            let rate = vehicle.charging_rate_kw_s(start_charger);
            let duration =
                (vehicle.battery_discharge(self.total_distance_km()) as f64 / rate).ceil() as u32;
            self.min_recharge_duration_s = self.min_recharge_duration_s.min(duration);
            self.max_recharge_duration_s = self.max_recharge_duration_s.max(duration);
        }
        if self.min_recharge_duration_s == u32::MAX {
            // No feasible vehicle; the sub-graph stays empty-handed anyway.
            self.min_recharge_duration_s = 0;
        }

        let check = config.charger_capacity_check;
        let technical = config.put_vehicle_on_charge + config.take_vehicle_off_charge;
        self.min_full_presence_s = self.min_recharge_duration_s
            + (check - self.min_recharge_duration_s % check)
            + technical;
        self.max_full_presence_s = self.max_recharge_duration_s
            + (check - self.max_recharge_duration_s % check)
            + technical;
    }

    fn init_subgraph(&mut self, view: &HorizonView<'_>, activities: &[SegmentActivity]) {
        let sg = &mut self.subgraph;
        sg.default_access = self.feasible_vehicles.clone();
        sg.layers = vec![Vec::new(); activities.len() + 2];

        let default_access = sg.default_access.clone();
        let blank = move |kind: SgKind| SgNode {
            kind,
            start_time: MAX_TIMESTAMP,
            end_time: MAX_TIMESTAMP,
            start_location: None,
            end_location: None,
            access: default_access.clone(),
            fixed_vehicle: None,
            fixed_path_end_time: MAX_TIMESTAMP,
            fixed_path_start_time: MAX_TIMESTAMP,
            acc_dual: 0.0,
            min_charging_dual: 0.0,
            max_charging_dual: 0.0,
        };

        // Mid layers: one node per activity instance.
        for (layer, activity) in activities.iter().enumerate() {
            for &member in &activity.members {
                let (kind, schedule_node) = match activity.kind {
                    SegmentActivityKind::Trip => {
                        (SgKind::Trip { sub: member }, view.trips[member].node)
                    }
                    SegmentActivityKind::Maintenance => {
                        (SgKind::Maintenance { sub: member }, view.maintenances[member].node)
                    }
                };
                let data = view.node(schedule_node);
                let node = sg.graph.add_node(SgNode {
                    start_time: data.start_time,
                    end_time: data.end_time,
                    start_location: Some(data.start_location),
                    end_location: Some(data.end_location),
                    ..blank(kind)
                });
                sg.layers[layer + 1].push(node);
                sg.schedule_lookup.entry(schedule_node).or_default().push(node);
                sg.layer_lookup.insert(node, layer + 1);
            }
        }

        let start_charger = view.data.charger(self.start_charger);
        let end_charger = view.data.charger(self.end_charger);
        let start_location = start_charger.location;
        let end_location = end_charger.location;

        // One start node per first-layer activity, carrying the inbound
        // charging-window indices of its aligned entry.
        let first_layer = sg.layers[1].clone();
        for &entry in &first_layer {
            let travel = view
                .data
                .location(start_location)
                .duration_to(sg.graph[entry].start_location.expect("activity location"))
                .unwrap_or(u32::MAX);
            let arrival = sg.graph[entry].start_time - travel as Timestamp;

            let mut kind = SgKind::StartSegment {
                charger: self.start_charger,
                earliest_start: 0,
                latest_start: 0,
                latest_end: 0,
            };
            let mut segment_start = 0;
            match view.last_take_off_before(self.start_charger, arrival) {
                None => {
                    // The activity starts before any vehicle could leave the
                    // charger; no realisation through this entry exists.
                    sg.graph[entry].fix_infeasible();
                }
                Some(latest_end) => {
                    segment_start = view.take_off_node(self.start_charger, latest_end).end_time;
                    let latest_end_time =
                        view.take_off_node(self.start_charger, latest_end).start_time;
                    let earliest_start = view
                        .last_put_on_before(
                            self.start_charger,
                            latest_end_time - self.max_recharge_duration_s as Timestamp,
                        )
                        .unwrap_or(0);
                    let latest_start = view
                        .last_put_on_before(
                            self.start_charger,
                            latest_end_time - self.min_recharge_duration_s as Timestamp,
                        )
                        .unwrap_or(0);
                    kind = SgKind::StartSegment {
                        charger: self.start_charger,
                        earliest_start,
                        latest_start,
                        latest_end,
                    };
                }
            }

            let node = sg.graph.add_node(SgNode {
                start_time: segment_start,
                end_time: segment_start,
                start_location: Some(start_location),
                end_location: Some(start_location),
                ..blank(kind)
            });
            sg.layers[0].push(node);
        }

        // One end node per last-activity-layer node.
        let last_activity_layer = sg.layers[sg.layers.len() - 2].clone();
        for &exit in &last_activity_layer {
            let travel = view
                .data
                .location(sg.graph[exit].end_location.expect("activity location"))
                .duration_to(end_location)
                .unwrap_or(u32::MAX);
            let mut segment_end = sg.graph[exit].end_time + travel as Timestamp;
            if let Some(earliest) = view.next_put_on_after(self.end_charger, segment_end) {
                segment_end = view.put_on_node(self.end_charger, earliest).start_time;
            }
            let node = sg.graph.add_node(SgNode {
                start_time: segment_end,
                end_time: segment_end,
                start_location: Some(end_location),
                end_location: Some(end_location),
                ..blank(SgKind::EndSegment)
            });
            let last = sg.layers.len() - 1;
            sg.layers[last].push(node);
        }

        sg.source = sg.graph.add_node(blank(SgKind::CollectiveStart));
        sg.sink = sg.graph.add_node(blank(SgKind::CollectiveEnd));

        // Connections: start nodes pair 1-1 with the first activity layer,
        // end nodes 1-1 with the last; mid layers connect where travel fits
        // between the activities.
        for (slot, &start) in sg.layers[0].iter().enumerate() {
            let entry = sg.layers[1][slot];
            if sg.graph[entry].is_feasible() {
                sg.graph.add_edge(sg.source, start, ());
                sg.graph.add_edge(start, entry, ());
            }
        }
        for layer in 1..sg.layers.len().saturating_sub(2) {
            for &from in &sg.layers[layer] {
                for &to in &sg.layers[layer + 1] {
                    let gap = sg.graph[to].start_time - sg.graph[from].end_time;
                    let travel = sg.graph[from]
                        .end_location
                        .zip(sg.graph[to].start_location)
                        .and_then(|(f, t)| view.data.location(f).duration_to(t));
                    match travel {
                        Some(travel) if gap >= travel as Timestamp => {
                            sg.graph.add_edge(from, to, ());
                        }
                        _ => {}
                    }
                }
            }
        }
        let last = sg.layers.len() - 1;
        for (slot, &end) in sg.layers[last].iter().enumerate() {
            let exit = sg.layers[last - 1][slot];
            sg.graph.add_edge(exit, end, ());
            sg.graph.add_edge(end, sg.sink, ());
        }
    }

    /// Re-prices the sub-graph against fresh duals and recomputes the
    /// non-dominated schedule pieces.
    pub fn update_pieces(&mut self, view: &HorizonView<'_>, duals: &Duals) {
        self.pieces.clear();
        self.refresh_duals(duals);

        let graph = &self.subgraph.graph;
        let initial = SgLabel {
            acc_duals: 0.0,
            min_charging_duals: 0.0,
            max_charging_duals: 0.0,
            start_time: MAX_TIMESTAMP,
            end_time: MAX_TIMESTAMP,
            access: self.subgraph.default_access.clone(),
            fixed_vehicle: None,
            fixed_allowed_end_time: MAX_TIMESTAMP,
        };

        let extend = |label: &SgLabel, _arc, target: NodeIndex| -> Option<SgLabel> {
            let node = &graph[target];
            let mut new = label.clone();

            // The label's access set is the running intersection.
            let mut any = false;
            for (slot, allowed) in node.access.iter().enumerate() {
                if !allowed {
                    new.access[slot] = false;
                }
                any |= new.access[slot];
            }
            if !any {
                return None;
            }

            if matches!(node.kind, SgKind::CollectiveEnd) {
                // A realisation must not overshoot the window its fixed
                // vertex opened.
                return (new.end_time <= label.fixed_allowed_end_time).then_some(new);
            }
            if node.start_time > label.fixed_allowed_end_time {
                return None;
            }
            if let Some(vehicle) = node.fixed_vehicle {
                new.fixed_vehicle = Some(vehicle);
                new.fixed_allowed_end_time = node.fixed_path_end_time;
                // The first fixed vertex on the path must not have skipped
                // an earlier fixing.
                if label.fixed_vehicle.is_none() && label.start_time < node.fixed_path_start_time
                {
                    return None;
                }
            }
            if node.end_time > new.fixed_allowed_end_time {
                return None;
            }

            match node.kind {
                SgKind::StartSegment { .. } => {
                    new.start_time = node.start_time;
                    new.min_charging_duals = node.min_charging_dual;
                    new.max_charging_duals = node.max_charging_dual;
                }
                SgKind::EndSegment => new.end_time = node.end_time,
                SgKind::Trip { .. } | SgKind::Maintenance { .. } => {
                    new.acc_duals += node.acc_dual
                }
                _ => {}
            }
            Some(new)
        };

        let dominates = |a: &SgLabel, b: &SgLabel| -> bool {
            if !access_superset(&a.access, &b.access) {
                return false;
            }
            if a.start_time == b.start_time {
                num::le(b.acc_duals, a.acc_duals) && a.end_time <= b.end_time
            } else {
                num::le(b.acc_duals + b.max_charging_duals, a.acc_duals + a.min_charging_duals)
                    && a.end_time <= b.end_time
                    && a.start_time >= b.start_time
            }
        };

        // The sub-graphs are tiny; run to exhaustion with a wide deadline.
        let (paths, _) = label_setting(
            graph,
            self.subgraph.source,
            self.subgraph.sink,
            initial,
            extend,
            dominates,
            usize::MAX,
            true,
            Instant::now() + Duration::from_secs(3600),
        );

        for labelled in paths {
            let mut trips = Vec::new();
            let mut maintenances = Vec::new();
            let mut schedule_nodes = Vec::new();
            for &arc in &labelled.path {
                let (_, target) = graph.edge_endpoints(arc).expect("arc");
                match graph[target].kind {
                    SgKind::Trip { sub } => {
                        trips.push(sub);
                        schedule_nodes.push(view.trips[sub].node);
                    }
                    SgKind::Maintenance { sub } => {
                        maintenances.push(sub);
                        schedule_nodes.push(view.maintenances[sub].node);
                    }
                    _ => {}
                }
            }
            self.pieces.push(SchedulePiece {
                acc_duals: labelled.label.acc_duals,
                min_charging_duals: labelled.label.min_charging_duals,
                max_charging_duals: labelled.label.max_charging_duals,
                start_time: labelled.label.start_time,
                end_time: labelled.label.end_time,
                access: labelled.label.access,
                trips,
                maintenances,
                schedule_nodes,
                fixed_vehicle: labelled.label.fixed_vehicle,
            });
        }
    }

    fn refresh_duals(&mut self, duals: &Duals) {
        let sg = &mut self.subgraph;
        for node in sg.graph.node_weights_mut() {
            match node.kind {
                SgKind::Trip { sub } => node.acc_dual = duals.trip_coverage[sub],
                SgKind::Maintenance { sub } => {
                    node.acc_dual = duals.one_vehicle_per_maintenance[sub]
                }
                SgKind::StartSegment { charger, earliest_start, latest_start, latest_end } => {
                    if node.is_feasible() {
                        node.min_charging_dual =
                            duals.charging_interval(charger, earliest_start, latest_end);
                        node.max_charging_dual =
                            duals.charging_interval(charger, latest_start, latest_end);
                    }
                }
                _ => {
                    node.acc_dual = 0.0;
                    node.min_charging_dual = 0.0;
                    node.max_charging_dual = 0.0;
                }
            }
        }
    }

    /// Re-applies branch fixings to the sub-graph vertices.
    pub fn update_fixings(&mut self, brn: &BranchNode) {
        let default_access = self.subgraph.default_access.clone();
        let last_activity_layer = self.subgraph.layers.len() - 2;
        for layer in 1..self.subgraph.layers.len() - 1 {
            for &node in &self.subgraph.layers[layer].clone() {
                self.subgraph.graph[node].reset(&default_access);
            }
        }

        for branch in &brn.branches {
            let fixed = branch.value_bool();
            match branch.kind {
                BranchKind::TripUnassigned { node: schedule_node, .. } => {
                    if fixed {
                        for node in self.lookup(schedule_node) {
                            self.subgraph.graph[node].fix_infeasible();
                        }
                    }
                }
                BranchKind::VehicleTrip { vehicle, node: schedule_node, .. }
                | BranchKind::VehicleMaintenance { vehicle, node: schedule_node, .. } => {
                    for node in self.lookup(schedule_node) {
                        self.apply_activity_fixing(brn, node, schedule_node, vehicle, fixed);
                    }
                }
                BranchKind::VehicleChargingAfter { vehicle, charger, from_node } => {
                    for node in self.lookup(from_node) {
                        let at_exit = self.subgraph.layer_lookup.get(&node)
                            == Some(&last_activity_layer)
                            && self.end_charger == charger;
                        if fixed {
                            if at_exit && self.subgraph.graph[node].access[vehicle] {
                                self.fix_with_window(brn, node, from_node, vehicle);
                            } else {
                                self.subgraph.graph[node].fix_infeasible();
                            }
                        } else if at_exit {
                            self.subgraph.graph[node].access[vehicle] = false;
                        }
                    }
                }
                BranchKind::VehicleChargingBefore { vehicle, charger, to_node } => {
                    for node in self.lookup(to_node) {
                        let at_entry = self.subgraph.layer_lookup.get(&node) == Some(&1)
                            && self.start_charger == charger;
                        if fixed {
                            if at_entry && self.subgraph.graph[node].access[vehicle] {
                                self.fix_with_window(brn, node, to_node, vehicle);
                            } else {
                                self.subgraph.graph[node].fix_infeasible();
                            }
                        } else if at_entry {
                            self.subgraph.graph[node].access[vehicle] = false;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn lookup(&self, schedule_node: NodeIndex) -> Vec<NodeIndex> {
        self.subgraph
            .schedule_lookup
            .get(&schedule_node)
            .cloned()
            .unwrap_or_default()
    }

    fn apply_activity_fixing(
        &mut self,
        brn: &BranchNode,
        node: NodeIndex,
        schedule_node: NodeIndex,
        vehicle: usize,
        fixed: bool,
    ) {
        if fixed {
            // A vertex already revoked by another fixing can no longer host
            // the activity in this segment.
            if self.subgraph.graph[node].access[vehicle] {
                self.fix_with_window(brn, node, schedule_node, vehicle);
            } else {
                self.subgraph.graph[node].fix_infeasible();
            }
        } else {
            self.subgraph.graph[node].access[vehicle] = false;
        }
    }

    fn fix_with_window(
        &mut self,
        brn: &BranchNode,
        node: NodeIndex,
        schedule_node: NodeIndex,
        vehicle: usize,
    ) {
        let sg_node = &mut self.subgraph.graph[node];
        sg_node.fix_vehicle(vehicle);
        sg_node.fixed_path_end_time = brn.next_fixed_max_end_time(vehicle, schedule_node);
        sg_node.fixed_path_start_time = brn.prev_fixed_min_start_time(vehicle, schedule_node);
    }
}

// ---------------------------------------------------------------------
// Enumeration

#[derive(Debug, Default)]
pub struct Segments {
    pub vec: Vec<Segment>,
}

impl Segments {
    pub fn enumerate(view: &HorizonView<'_>) -> Self {
        let mut classes: Vec<SegmentActivity> = Vec::new();
        let mut classify = |candidate: SegmentActivity| {
            match classes.iter_mut().find(|c| c.same_class(&candidate)) {
                Some(class) => class.members.extend_from_slice(&candidate.members),
                None => classes.push(candidate),
            }
        };

        for sub in &view.maintenances {
            let node = view.node(sub.node);
            classify(SegmentActivity {
                start_location: node.start_location,
                end_location: node.end_location,
                distance_km: node.distance_km,
                kind: SegmentActivityKind::Maintenance,
                members: vec![sub.index],
            });
        }
        for sub in &view.trips {
            let node = view.node(sub.node);
            classify(SegmentActivity {
                start_location: node.start_location,
                end_location: node.end_location,
                distance_km: node.distance_km,
                kind: SegmentActivityKind::Trip,
                members: vec![sub.index],
            });
        }

        let range = view
            .data
            .vehicles
            .iter()
            .map(|v| v.distance_range_km())
            .max()
            .unwrap_or(0);

        let mut segments = Segments::default();
        for start_charger in 0..view.data.chargers.len() {
            for end_charger in 0..view.data.chargers.len() {
                let start_location = view.data.charger(start_charger).location;
                segments.recurse(
                    view,
                    &classes,
                    start_charger,
                    end_charger,
                    range,
                    start_location,
                    0,
                    &mut Vec::new(),
                );
            }
        }
        tracing::debug!(segments = segments.vec.len(), "segments enumerated");
        segments
    }

    #[allow(clippy::too_many_arguments)]
    fn recurse(
        &mut self,
        view: &HorizonView<'_>,
        classes: &[SegmentActivity],
        start_charger: usize,
        end_charger: usize,
        range_km: u32,
        current_location: usize,
        distance_km: u32,
        chain: &mut Vec<usize>,
    ) {
        let config = &view.data.config;
        for (class_index, class) in classes.iter().enumerate() {
            // At most one maintenance stop per work block.
            if class.kind == SegmentActivityKind::Maintenance
                && chain
                    .iter()
                    .any(|&c| classes[c].kind == SegmentActivityKind::Maintenance)
            {
                continue;
            }

            let Some(leg) = view.data.location(current_location).distance_to(class.start_location)
            else {
                continue;
            };
            if leg > 0 && !config.allow_deadlegs {
                continue;
            }
            let extended = distance_km + leg + class.distance_km;
            if extended > range_km {
                continue;
            }

            chain.push(class_index);

            let closing = view
                .data
                .location(class.end_location)
                .distance_to(view.data.charger(end_charger).location);
            if let Some(closing) = closing {
                if (closing == 0 || config.allow_deadlegs) && extended + closing <= range_km {
                    let activities: Vec<SegmentActivity> =
                        chain.iter().map(|&c| classes[c].clone()).collect();
                    let segment = Segment::new(
                        view,
                        self.vec.len(),
                        start_charger,
                        end_charger,
                        &activities,
                    );
                    self.vec.push(segment);
                }
            }

            self.recurse(
                view,
                classes,
                start_charger,
                end_charger,
                range_km,
                class.end_location,
                extended,
                chain,
            );
            chain.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizon::{HorizonClock, HorizonView};
    use crate::test_support::scenario_two_trips;
    use rotor_core::ScheduleGraph;

    #[test]
    fn test_enumeration_builds_round_trips() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let segments = Segments::enumerate(&view);

        // With one trip class and one charger there is the single-visit and
        // the double-visit chain.
        assert!(!segments.vec.is_empty());
        for segment in &segments.vec {
            assert!(segment.total_distance_km() > 0);
            assert!(segment.feasible_vehicles.iter().any(|&f| f));
            assert!(segment.min_full_presence_s >= segment.min_recharge_duration_s);
        }
    }

    #[test]
    fn test_pieces_collect_duals() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let mut segments = Segments::enumerate(&view);

        let mut duals = Duals::new(&view);
        duals.trip_coverage.iter_mut().for_each(|d| *d = 100.0);

        for segment in &mut segments.vec {
            segment.update_pieces(&view, &duals);
        }
        let best = segments
            .vec
            .iter()
            .flat_map(|s| s.pieces.iter())
            .max_by(|a, b| a.acc_duals.total_cmp(&b.acc_duals))
            .expect("pieces exist");
        // The best piece picks up both trips.
        assert_eq!(best.trips.len(), 2);
        assert!((best.acc_duals - 200.0).abs() < 1e-9);
        assert!(best.start_time < best.end_time);
    }
}
