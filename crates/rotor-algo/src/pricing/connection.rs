//! The connection-based segment network (variant B).
//!
//! Vertices: one per non-dominated schedule piece, one start per vehicle,
//! one sink. Arcs connect pieces whose end charger matches the next start
//! charger when the inter-piece charging is feasible for at least one
//! vehicle; each arc precomputes the target's duals, best-case cost and the
//! maximum charging duration at the intermediate charger, and an arc-level
//! dominance prunes the explosion during construction. Charging uses the
//! [`FixAtEnd`] oracle (the owed recharge equals the target segment's
//! distance), so labels carry no free state-of-charge dimension.

use std::collections::HashMap;
use std::time::Instant;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use rayon::prelude::*;

use crate::branch::{BranchKind, BranchNode};
use crate::charging::{ChargingStrategy, FixAtEnd};
use crate::column::{ChargingLeg, ColumnSchedule};
use crate::duals::Duals;
use crate::horizon::HorizonView;
use crate::labelling::label_setting;
use crate::pricing::segments::{access_superset, Segments};
use rotor_core::{num, BatteryKwh, RotorError, RotorResult, Timestamp, MAX_TIMESTAMP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConKind {
    Piece { segment: usize, piece: usize },
    Start { vehicle: usize },
    Sink,
}

#[derive(Debug, Clone)]
pub(crate) struct ConNode {
    pub kind: ConKind,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub start_charger: Option<usize>,
    pub end_charger: Option<usize>,
    access: Vec<bool>,
    fixed_vehicle: Option<usize>,
    max_rc_start_time: Timestamp,
    allow_sink: bool,
}

impl ConNode {
    #[inline]
    fn has_access(&self, vehicle: usize) -> bool {
        self.access[vehicle]
    }

    fn fix_vehicle(&mut self, vehicle: usize, max_rc_start_time: Timestamp) {
        self.access.iter_mut().for_each(|a| *a = false);
        self.access[vehicle] = true;
        self.fixed_vehicle = Some(vehicle);
        self.max_rc_start_time = max_rc_start_time;
    }
}

pub(crate) struct ConArc {
    access: Vec<bool>,
}

/// Transient arc candidate carrying the dominance attributes.
struct CandidateArc {
    from: NodeIndex,
    to: NodeIndex,
    access: Vec<bool>,
    fixed_vehicle: Option<usize>,
    acc_duals: f64,
    min_charging_duals: f64,
    max_charging_duals: f64,
    best_case_cost: f64,
    sink_end_time: Timestamp,
    charging_duration_s: i64,
}

impl CandidateArc {
    /// Same head, covering access, same fixed vehicle, plus at least as much
    /// charging slack, an earlier target end, and worst-case duals beating
    /// the other's best case.
    fn dominates(&self, other: &CandidateArc) -> bool {
        access_superset(&self.access, &other.access)
            && self.fixed_vehicle == other.fixed_vehicle
            && self.charging_duration_s >= other.charging_duration_s
            && self.sink_end_time <= other.sink_end_time
            && num::le(
                other.acc_duals + other.max_charging_duals,
                self.acc_duals + self.min_charging_duals,
            )
    }
}

#[derive(Clone, Debug)]
struct ConLabel {
    cost: f64,
    reduced_cost: f64,
    soc: BatteryKwh,
    distance_last_maintenance: u32,
    max_rc_start_time: Timestamp,
    at_sink: bool,
}

pub struct ConnectionNetwork<'a> {
    view: &'a HorizonView<'a>,
    pub segments: Segments,
    graph: DiGraph<ConNode, ConArc>,
    start_nodes: Vec<NodeIndex>,
    includes_trip: Vec<Vec<NodeIndex>>,
    includes_maintenance: Vec<Vec<NodeIndex>>,
    includes_schedule_node: HashMap<NodeIndex, Vec<NodeIndex>>,
    /// Per `(start charger, end charger)`: one end-time-sorted piece-vertex
    /// list per segment.
    route_nodes: Vec<Vec<Vec<Vec<NodeIndex>>>>,
    sink: NodeIndex,
}

impl<'a> ConnectionNetwork<'a> {
    pub fn new(view: &'a HorizonView<'a>) -> Self {
        Self {
            view,
            segments: Segments::enumerate(view),
            graph: DiGraph::new(),
            start_nodes: Vec::new(),
            includes_trip: Vec::new(),
            includes_maintenance: Vec::new(),
            includes_schedule_node: HashMap::new(),
            route_nodes: Vec::new(),
            sink: NodeIndex::end(),
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> u32 {
        self.graph.node_count() as u32
    }

    #[inline]
    pub fn num_arcs(&self) -> u32 {
        self.graph.edge_count() as u32
    }

    #[inline]
    pub fn num_segments(&self) -> u32 {
        self.segments.vec.len() as u32
    }

    fn n_vehicles(&self) -> usize {
        self.view.data.vehicles.len()
    }

    /// Rebuilds the whole connection graph against fresh duals and the
    /// current branch node. Order matters: nodes, then fixings, then arcs, because
    /// arc access is derived from the fixed vertex access.
    pub fn rebuild(&mut self, duals: &Duals, brn: &BranchNode) -> RotorResult<()> {
        self.graph.clear();
        self.start_nodes.clear();
        self.includes_trip = vec![Vec::new(); self.view.trips.len()];
        self.includes_maintenance = vec![Vec::new(); self.view.maintenances.len()];
        self.includes_schedule_node.clear();
        self.route_nodes = vec![
            vec![Vec::new(); self.view.data.chargers.len()];
            self.view.data.chargers.len()
        ];

        let view = self.view;
        self.segments
            .vec
            .par_iter_mut()
            .for_each(|segment| segment.update_pieces(view, duals));

        self.add_nodes()?;
        self.apply_branches(brn)?;
        self.add_arcs();
        Ok(())
    }

    fn add_nodes(&mut self) -> RotorResult<()> {
        let view = self.view;
        let n = self.n_vehicles();

        self.sink = self.graph.add_node(ConNode {
            kind: ConKind::Sink,
            start_time: MAX_TIMESTAMP,
            end_time: MAX_TIMESTAMP,
            start_charger: None,
            end_charger: None,
            access: vec![true; n],
            fixed_vehicle: None,
            max_rc_start_time: 0,
            allow_sink: false,
        });

        for vehicle in view.data.vehicles.iter() {
            let last = view.node(view.vehicle_position(vehicle.index).last_node);
            let charger = view.data.charger_at_location(last.end_location).ok_or_else(|| {
                RotorError::Logic(format!(
                    "vehicle {} is not resting at a charger",
                    vehicle.id.value()
                ))
            })?;
            let mut node = ConNode {
                kind: ConKind::Start { vehicle: vehicle.index },
                start_time: last.end_time,
                end_time: last.end_time,
                start_charger: Some(charger),
                end_charger: Some(charger),
                access: vec![false; n],
                fixed_vehicle: None,
                max_rc_start_time: 0,
                allow_sink: false,
            };
            node.access[vehicle.index] = true;
            // Start vertices are implicitly fixed; the chain of branch
            // fixings rewrites the window below.
            node.fixed_vehicle = Some(vehicle.index);
            node.max_rc_start_time = MAX_TIMESTAMP;
            self.start_nodes.push(self.graph.add_node(node));
        }

        for segment_index in 0..self.segments.vec.len() {
            let (start_charger, end_charger, piece_count) = {
                let s = &self.segments.vec[segment_index];
                (s.start_charger, s.end_charger, s.pieces.len())
            };
            let mut sorted: Vec<NodeIndex> = Vec::with_capacity(piece_count);
            for piece_index in 0..piece_count {
                let piece = &self.segments.vec[segment_index].pieces[piece_index];
                let node = self.graph.add_node(ConNode {
                    kind: ConKind::Piece { segment: segment_index, piece: piece_index },
                    start_time: piece.start_time,
                    end_time: piece.end_time,
                    start_charger: Some(start_charger),
                    end_charger: Some(end_charger),
                    access: piece.access.clone(),
                    fixed_vehicle: None,
                    max_rc_start_time: 0,
                    allow_sink: true,
                });

                let position = sorted
                    .partition_point(|&other| self.graph[other].end_time < piece.end_time);
                sorted.insert(position, node);

                for &trip in &piece.trips {
                    self.includes_trip[trip].push(node);
                }
                for &maintenance in &piece.maintenances {
                    self.includes_maintenance[maintenance].push(node);
                }
                for &schedule_node in &piece.schedule_nodes {
                    self.includes_schedule_node
                        .entry(schedule_node)
                        .or_default()
                        .push(node);
                }
            }
            self.route_nodes[start_charger][end_charger].push(sorted);
        }
        Ok(())
    }

    /// Chains branch fixings through the piece vertices: every fixed vertex
    /// opens the window to the next fixing, closing the sink in between.
    fn apply_branches(&mut self, brn: &BranchNode) -> RotorResult<()> {
        #[derive(Clone)]
        struct Fixing {
            start_time: Timestamp,
            nodes: Vec<NodeIndex>,
        }
        let mut fixings: Vec<Vec<Fixing>> = vec![Vec::new(); self.n_vehicles()];

        for branch in &brn.branches {
            if !branch.value_bool() {
                // Revoked access is already handled in the segment
                // sub-graphs.
                continue;
            }
            match branch.kind {
                BranchKind::VehicleTrip { vehicle, trip, node } => {
                    fixings[vehicle].push(Fixing {
                        start_time: self.view.node(node).start_time,
                        nodes: self.includes_trip[trip].clone(),
                    });
                }
                BranchKind::VehicleMaintenance { vehicle, maintenance, node } => {
                    fixings[vehicle].push(Fixing {
                        start_time: self.view.node(node).start_time,
                        nodes: self.includes_maintenance[maintenance].clone(),
                    });
                }
                BranchKind::VehicleChargingAfter { vehicle, charger, from_node } => {
                    let mut nodes = Vec::new();
                    for &node in self
                        .includes_schedule_node
                        .get(&from_node)
                        .map(|v| v.as_slice())
                        .unwrap_or(&[])
                    {
                        let ConKind::Piece { segment, piece } = self.graph[node].kind else {
                            continue;
                        };
                        let tail = self.segments.vec[segment].pieces[piece]
                            .schedule_nodes
                            .last()
                            .copied();
                        if self.graph[node].end_charger == Some(charger)
                            && tail == Some(from_node)
                        {
                            // Charging must follow: this piece cannot close
                            // a schedule.
                            self.graph[node].allow_sink = false;
                            nodes.push(node);
                        } else {
                            return Err(RotorError::Logic(
                                "piece carries a charging-after fixing but does not end at the fixed charger".into(),
                            ));
                        }
                    }
                    fixings[vehicle].push(Fixing {
                        start_time: self.view.node(from_node).start_time,
                        nodes,
                    });
                }
                BranchKind::VehicleChargingBefore { vehicle, charger, to_node } => {
                    let mut nodes = Vec::new();
                    for &node in self
                        .includes_schedule_node
                        .get(&to_node)
                        .map(|v| v.as_slice())
                        .unwrap_or(&[])
                    {
                        let ConKind::Piece { segment, piece } = self.graph[node].kind else {
                            continue;
                        };
                        let head = self.segments.vec[segment].pieces[piece]
                            .schedule_nodes
                            .first()
                            .copied();
                        if self.graph[node].start_charger == Some(charger) && head == Some(to_node)
                        {
                            nodes.push(node);
                        } else {
                            return Err(RotorError::Logic(
                                "piece carries a charging-before fixing but does not start at the fixed charger".into(),
                            ));
                        }
                    }
                    fixings[vehicle].push(Fixing {
                        start_time: self.view.node(to_node).start_time,
                        nodes,
                    });
                }
                _ => {}
            }
        }

        for vehicle in 0..fixings.len() {
            fixings[vehicle].sort_by_key(|f| f.start_time);
            let mut prev_nodes = vec![self.start_nodes[vehicle]];
            for index in 0..fixings[vehicle].len() {
                let start_time = fixings[vehicle][index].start_time;
                for &prev in &prev_nodes {
                    self.graph[prev].fix_vehicle(vehicle, start_time);
                }
                for &current in &fixings[vehicle][index].nodes {
                    self.graph[current].fix_vehicle(vehicle, MAX_TIMESTAMP);
                }
                prev_nodes = fixings[vehicle][index].nodes.clone();
            }
        }
        Ok(())
    }

    /// Space/time feasibility of a piece-to-piece connection: the window
    /// must admit a charging session for at least one commonly allowed
    /// vehicle.
    fn connection_feasible(&self, from: NodeIndex, to: NodeIndex) -> bool {
        let f = &self.graph[from];
        let t = &self.graph[to];
        if t.start_time - f.end_time < 0 {
            return false;
        }
        let ConKind::Piece { segment, .. } = t.kind else {
            return true;
        };
        let distance = self.segments.vec[segment].total_distance_km();
        let charger = t.start_charger.expect("piece start charger");

        self.view.data.vehicles.iter().any(|vehicle| {
            f.has_access(vehicle.index)
                && t.has_access(vehicle.index)
                && FixAtEnd
                    .session(
                        self.view,
                        f.end_time,
                        t.start_time,
                        vehicle.index,
                        charger,
                        vehicle.battery_min_kwh,
                        vehicle.battery_discharge(distance),
                    )
                    .is_feasible
        })
    }

    fn candidate_arc(&self, from: NodeIndex, to: NodeIndex) -> CandidateArc {
        let f = &self.graph[from];
        let t = &self.graph[to];

        let mut access: Vec<bool> = (0..self.n_vehicles())
            .map(|v| f.has_access(v) && t.has_access(v))
            .collect();
        let mut fixed_vehicle = None;
        if access.iter().any(|&a| a) {
            if let Some(vehicle) = t.fixed_vehicle {
                access.iter_mut().for_each(|a| *a = false);
                access[vehicle] = true;
                fixed_vehicle = Some(vehicle);
            }
        }

        let mut arc = CandidateArc {
            from,
            to,
            access,
            fixed_vehicle,
            acc_duals: 0.0,
            min_charging_duals: 0.0,
            max_charging_duals: 0.0,
            best_case_cost: 0.0,
            sink_end_time: MAX_TIMESTAMP,
            charging_duration_s: 0,
        };

        if let ConKind::Piece { segment, piece } = t.kind {
            let s = &self.segments.vec[segment];
            let p = &s.pieces[piece];
            arc.acc_duals = p.acc_duals;
            arc.min_charging_duals = p.min_charging_duals;
            arc.max_charging_duals = p.max_charging_duals;
            arc.best_case_cost = s.cost(self.from_distance(from));
            arc.sink_end_time = t.end_time;
            // A vehicle never sits at the charger longer than the longest
            // full recharge, whatever the gap between the pieces.
            arc.charging_duration_s =
                (t.start_time - f.end_time).min(s.max_full_presence_s as i64);
        }
        arc
    }

    fn from_distance(&self, from: NodeIndex) -> u32 {
        match self.graph[from].kind {
            ConKind::Piece { segment, .. } => self.segments.vec[segment].updated_distance(0),
            _ => 0,
        }
    }

    fn add_arcs(&mut self) {
        let eligible: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| matches!(self.graph[n].kind, ConKind::Piece { .. } | ConKind::Start { .. }))
            .collect();

        // Outgoing arcs per tail, pruned by arc dominance per target
        // segment; heads within one segment are tried in end-time order.
        let network = &*self;
        let mut outgoing: Vec<Vec<CandidateArc>> = eligible
            .par_iter()
            .map(|&from| {
                let mut arcs: Vec<CandidateArc> = Vec::new();
                let from_charger =
                    network.graph[from].end_charger.expect("tail ends at a charger");
                for route in &network.route_nodes[from_charger] {
                    for segment_nodes in route {
                        let mut survivors: Vec<CandidateArc> = Vec::new();
                        for &to in segment_nodes {
                            if !network.connection_feasible(from, to) {
                                continue;
                            }
                            let candidate = network.candidate_arc(from, to);
                            if !candidate.access.iter().any(|&a| a) {
                                continue;
                            }
                            if survivors.iter().any(|s| s.dominates(&candidate)) {
                                continue;
                            }
                            survivors.retain(|s| !candidate.dominates(s));
                            survivors.push(candidate);
                        }
                        arcs.extend(survivors);
                    }
                }

                // Most promising first: optimistic reduced-cost estimate.
                arcs.sort_by(|l, r| {
                    (l.best_case_cost - (l.acc_duals + l.max_charging_duals))
                        .total_cmp(&(r.best_case_cost - (r.acc_duals + r.max_charging_duals)))
                });

                if network.graph[from].allow_sink {
                    arcs.push(network.candidate_arc(from, network.sink));
                }
                arcs
            })
            .collect();

        for arcs in outgoing.drain(..) {
            for arc in arcs {
                self.graph.add_edge(arc.from, arc.to, ConArc { access: arc.access });
            }
        }
    }

    /// Prices one vehicle over the current reduced graph.
    pub fn price_vehicle(
        &self,
        duals: &Duals,
        vehicle: usize,
        include_cost: bool,
        solve_optimal: bool,
        deadline: Instant,
    ) -> (Vec<ColumnSchedule>, bool) {
        let view = self.view;
        let v = view.data.vehicle(vehicle);
        let position = view.vehicle_position(vehicle);
        let include_distance = view.has_unassigned_maintenance;

        let initial = ConLabel {
            cost: 0.0,
            reduced_cost: -duals.one_schedule_per_vehicle[vehicle],
            soc: position.soc,
            distance_last_maintenance: position.distance_last_maintenance_km(),
            max_rc_start_time: self.graph[self.start_nodes[vehicle]].max_rc_start_time,
            at_sink: false,
        };

        let extend = |label: &ConLabel, arc: EdgeIndex, target: NodeIndex| -> Option<ConLabel> {
            let (source, _) = self.graph.edge_endpoints(arc).expect("arc");
            let f = &self.graph[source];
            let t = &self.graph[target];
            let a = &self.graph[arc];
            let mut new = label.clone();
            new.at_sink = matches!(t.kind, ConKind::Sink);

            if new.at_sink {
                return (label.max_rc_start_time == MAX_TIMESTAMP
                    && num::lt(new.reduced_cost, 0.0))
                .then_some(new);
            }
            if !a.access[vehicle] || !t.has_access(vehicle) {
                return None;
            }
            if t.start_time > label.max_rc_start_time {
                return None;
            }
            if t.fixed_vehicle == Some(vehicle) {
                new.max_rc_start_time = t.max_rc_start_time;
            }
            if t.end_time > new.max_rc_start_time {
                return None;
            }

            let ConKind::Piece { segment, .. } = t.kind else {
                return Some(new);
            };
            let s = &self.segments.vec[segment];

            let session = FixAtEnd.session(
                view,
                f.end_time,
                t.start_time,
                vehicle,
                t.start_charger.expect("piece start charger"),
                label.soc,
                v.battery_discharge(s.total_distance_km()),
            );
            if !session.is_feasible {
                return None;
            }
            if session.is_charging {
                new.reduced_cost -= duals.charging_interval(
                    t.start_charger.expect("piece start charger"),
                    session.put_on,
                    session.take_off,
                );
            }

            let cost = s.cost(label.distance_last_maintenance);
            new.distance_last_maintenance = s.updated_distance(label.distance_last_maintenance);
            new.cost += cost;
            if include_cost {
                new.reduced_cost += cost - self.piece_duals(t);
            } else {
                new.reduced_cost -= self.piece_duals(t);
            }
            Some(new)
        };

        let dominates = |a: &ConLabel, b: &ConLabel| -> bool {
            if b.at_sink {
                return solve_optimal && num::lt(a.reduced_cost, b.reduced_cost);
            }
            let base = num::le(a.reduced_cost, b.reduced_cost);
            if include_distance {
                base && a.distance_last_maintenance <= b.distance_last_maintenance
            } else {
                base
            }
        };

        let (paths, status) = label_setting(
            &self.graph,
            self.start_nodes[vehicle],
            self.sink,
            initial,
            extend,
            dominates,
            view.data.config.nr_cols_per_vehicle_iter as usize,
            solve_optimal,
            deadline,
        );
        let solved_optimal = !(status.hit_label_cap || status.hit_deadline);

        let columns = paths
            .into_iter()
            .filter(|p| num::lt(p.label.reduced_cost, 0.0))
            .map(|p| self.extract_column(vehicle, p.label.cost, p.label.reduced_cost, &p.path))
            .collect();
        (columns, solved_optimal)
    }

    fn piece_duals(&self, node: &ConNode) -> f64 {
        match node.kind {
            ConKind::Piece { segment, piece } => {
                self.segments.vec[segment].pieces[piece].acc_duals
            }
            _ => 0.0,
        }
    }

    fn extract_column(
        &self,
        vehicle: usize,
        cost: f64,
        reduced_cost: f64,
        path: &[EdgeIndex],
    ) -> ColumnSchedule {
        let view = self.view;
        let v = view.data.vehicle(vehicle);

        let first_source = self.graph.edge_endpoints(path[0]).expect("arc").0;
        let last_source = self
            .graph
            .edge_endpoints(*path.last().expect("nonempty path"))
            .expect("arc")
            .0;
        let start_charger = self.graph[first_source].start_charger.expect("start charger");
        let end_charger = self.graph[last_source].end_charger.expect("end charger");

        let mut column = ColumnSchedule {
            vehicle,
            start_location: view.data.charger(start_charger).location,
            end_location: view.data.charger(end_charger).location,
            nodes: Vec::new(),
            trips: Vec::new(),
            maintenances: Vec::new(),
            charging: Vec::new(),
            cost,
            reduced_cost,
        };

        let mut soc = view.vehicle_position(vehicle).soc;
        let mut prev_schedule_node: Option<NodeIndex> = None;

        for &arc in path {
            let (source, target) = self.graph.edge_endpoints(arc).expect("arc");
            let f = &self.graph[source];
            let t = &self.graph[target];
            let ConKind::Piece { segment, piece } = t.kind else {
                continue;
            };
            let s = &self.segments.vec[segment];
            let p = &s.pieces[piece];
            let charger = t.start_charger.expect("piece start charger");

            let session = FixAtEnd.session(
                view,
                f.end_time,
                t.start_time,
                vehicle,
                charger,
                soc,
                v.battery_discharge(s.total_distance_km()),
            );
            if session.is_charging {
                soc = v.battery_max_kwh.min(soc + session.charge_gain(view, charger));
                column.charging.push(ChargingLeg {
                    from_node: prev_schedule_node,
                    to_node: p.schedule_nodes.first().copied(),
                    charger,
                    put_on: session.put_on,
                    take_off: session.take_off,
                });
                column.nodes.push(view.put_ons[charger][session.put_on].node);
                column.nodes.push(view.take_offs[charger][session.take_off].node);
            }
            soc -= v.battery_discharge(s.total_distance_km());

            column.trips.extend_from_slice(&p.trips);
            column.maintenances.extend_from_slice(&p.maintenances);
            column.nodes.extend_from_slice(&p.schedule_nodes);
            prev_schedule_node = p.schedule_nodes.last().copied().or(prev_schedule_node);
        }
        column
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::BranchNode;
    use crate::horizon::{HorizonClock, HorizonView};
    use crate::test_support::scenario_two_trips;
    use rotor_core::ScheduleGraph;
    use std::time::Duration;

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_rebuild_and_price() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let mut network = ConnectionNetwork::new(&view);
        let root = BranchNode::root(1, &view);

        let mut duals = Duals::new(&view);
        duals.trip_coverage.iter_mut().for_each(|d| *d = 10_000.0);
        network.rebuild(&duals, &root).unwrap();
        assert!(network.num_nodes() > 0);

        let (columns, optimal) =
            network.price_vehicle(&duals, 0, true, true, far_deadline());
        assert!(optimal);
        let best = columns
            .iter()
            .min_by(|a, b| a.reduced_cost.total_cmp(&b.reduced_cost))
            .expect("column found");
        assert_eq!(best.trips.len(), 2);
        assert!((best.current_reduced_cost(&duals) - best.reduced_cost).abs() < 1e-6);
    }

    #[test]
    fn test_no_negative_columns_without_duals() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let mut network = ConnectionNetwork::new(&view);
        let root = BranchNode::root(1, &view);

        let duals = Duals::new(&view);
        network.rebuild(&duals, &root).unwrap();
        let (columns, _) = network.price_vehicle(&duals, 0, true, true, far_deadline());
        assert!(columns.is_empty());
    }
}
