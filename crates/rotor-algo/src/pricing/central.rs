//! The centralised segment network (variant C).
//!
//! Same segments as the connection variant, but instead of materialising one
//! arc per feasible piece pair, every charger gets a *central* charging
//! vertex: a piece connects to the central vertex of its end charger at zero
//! cost, and the central vertex fans out to every piece starting at that
//! charger. Labels therefore carry a `timestamp` (the end of their last
//! piece), and the charging oracle is evaluated lazily from that timestamp
//! on entry into the next piece. Far fewer arcs, one extra dominance
//! dimension (`timestamp`, plus the fixing window).

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
use crate::pricing::segments::Segments;
use rotor_core::{num, BatteryKwh, RotorError, RotorResult, Timestamp, MAX_TIMESTAMP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CenKind {
    Piece { segment: usize, piece: usize },
    Start { vehicle: usize },
    Central { charger: usize },
    Sink,
}

#[derive(Debug, Clone)]
struct CenNode {
    kind: CenKind,
    start_time: Timestamp,
    end_time: Timestamp,
    start_charger: Option<usize>,
    end_charger: Option<usize>,
    access: Vec<bool>,
    fixed_vehicle: Option<usize>,
    max_rc_start_time: Timestamp,
    allow_sink: bool,
}

impl CenNode {
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

#[derive(Clone, Debug)]
struct CenLabel {
    cost: f64,
    reduced_cost: f64,
    /// End of the last traversed piece; the next charging session starts
    /// here.
    timestamp: Timestamp,
    soc: BatteryKwh,
    distance_last_maintenance: u32,
    max_rc_start_time: Timestamp,
    at_sink: bool,
}

pub struct CentralNetwork<'a> {
    view: &'a HorizonView<'a>,
    pub segments: Segments,
    graph: DiGraph<CenNode, ()>,
    start_nodes: Vec<NodeIndex>,
    central_nodes: Vec<NodeIndex>,
    includes_trip: Vec<Vec<NodeIndex>>,
    includes_maintenance: Vec<Vec<NodeIndex>>,
    includes_schedule_node: HashMap<NodeIndex, Vec<NodeIndex>>,
    sink: NodeIndex,
}

impl<'a> CentralNetwork<'a> {
    pub fn new(view: &'a HorizonView<'a>) -> Self {
        Self {
            view,
            segments: Segments::enumerate(view),
            graph: DiGraph::new(),
            start_nodes: Vec::new(),
            central_nodes: Vec::new(),
            includes_trip: Vec::new(),
            includes_maintenance: Vec::new(),
            includes_schedule_node: HashMap::new(),
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

    pub fn rebuild(&mut self, duals: &Duals, brn: &BranchNode) -> RotorResult<()> {
        self.graph.clear();
        self.start_nodes.clear();
        self.central_nodes.clear();
        self.includes_trip = vec![Vec::new(); self.view.trips.len()];
        self.includes_maintenance = vec![Vec::new(); self.view.maintenances.len()];
        self.includes_schedule_node.clear();

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

        self.sink = self.graph.add_node(CenNode {
            kind: CenKind::Sink,
            start_time: MAX_TIMESTAMP,
            end_time: MAX_TIMESTAMP,
            start_charger: None,
            end_charger: None,
            access: vec![true; n],
            fixed_vehicle: None,
            max_rc_start_time: 0,
            allow_sink: false,
        });

        self.central_nodes = view
            .data
            .chargers
            .iter()
            .map(|charger| {
                self.graph.add_node(CenNode {
                    kind: CenKind::Central { charger: charger.index },
                    start_time: 0,
                    end_time: 0,
                    start_charger: Some(charger.index),
                    end_charger: Some(charger.index),
                    access: vec![true; n],
                    fixed_vehicle: None,
                    max_rc_start_time: 0,
                    allow_sink: false,
                })
            })
            .collect();

        for vehicle in view.data.vehicles.iter() {
            let last = view.node(view.vehicle_position(vehicle.index).last_node);
            let charger = view.data.charger_at_location(last.end_location).ok_or_else(|| {
                RotorError::Logic(format!(
                    "vehicle {} is not resting at a charger",
                    vehicle.id.value()
                ))
            })?;
            let mut node = CenNode {
                kind: CenKind::Start { vehicle: vehicle.index },
                start_time: last.end_time,
                end_time: last.end_time,
                start_charger: Some(charger),
                end_charger: Some(charger),
                access: vec![false; n],
                fixed_vehicle: Some(vehicle.index),
                max_rc_start_time: MAX_TIMESTAMP,
                allow_sink: false,
            };
            node.access[vehicle.index] = true;
            self.start_nodes.push(self.graph.add_node(node));
        }

        for segment_index in 0..self.segments.vec.len() {
            let (start_charger, end_charger, piece_count) = {
                let s = &self.segments.vec[segment_index];
                (s.start_charger, s.end_charger, s.pieces.len())
            };
            for piece_index in 0..piece_count {
                let piece = &self.segments.vec[segment_index].pieces[piece_index];
                let node = self.graph.add_node(CenNode {
                    kind: CenKind::Piece { segment: segment_index, piece: piece_index },
                    start_time: piece.start_time,
                    end_time: piece.end_time,
                    start_charger: Some(start_charger),
                    end_charger: Some(end_charger),
                    access: piece.access.clone(),
                    fixed_vehicle: None,
                    max_rc_start_time: 0,
                    allow_sink: true,
                });
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
        }
        Ok(())
    }

    /// Same fixing chains as the connection variant, re-anchored on the
    /// piece vertices of this graph.
    fn apply_branches(&mut self, brn: &BranchNode) -> RotorResult<()> {
        #[derive(Clone)]
        struct Fixing {
            start_time: Timestamp,
            nodes: Vec<NodeIndex>,
        }
        let mut fixings: Vec<Vec<Fixing>> = vec![Vec::new(); self.n_vehicles()];

        for branch in &brn.branches {
            if !branch.value_bool() {
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
                        let CenKind::Piece { segment, piece } = self.graph[node].kind else {
                            continue;
                        };
                        let tail = self.segments.vec[segment].pieces[piece]
                            .schedule_nodes
                            .last()
                            .copied();
                        if self.graph[node].end_charger == Some(charger)
                            && tail == Some(from_node)
                        {
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
                        let CenKind::Piece { segment, piece } = self.graph[node].kind else {
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

    fn add_arcs(&mut self) {
        // start -> central of the vehicle's resting charger
        for &start in &self.start_nodes.clone() {
            let charger = self.graph[start].end_charger.expect("start at charger");
            self.graph.add_edge(start, self.central_nodes[charger], ());
        }

        // piece <-> central, piece -> sink
        let pieces: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| matches!(self.graph[n].kind, CenKind::Piece { .. }))
            .collect();
        for &piece in &pieces {
            let start_charger = self.graph[piece].start_charger.expect("piece start charger");
            let end_charger = self.graph[piece].end_charger.expect("piece end charger");
            self.graph.add_edge(self.central_nodes[start_charger], piece, ());
            self.graph.add_edge(piece, self.central_nodes[end_charger], ());
            if self.graph[piece].allow_sink {
                self.graph.add_edge(piece, self.sink, ());
            }
        }
    }

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

        let initial = CenLabel {
            cost: 0.0,
            reduced_cost: -duals.one_schedule_per_vehicle[vehicle],
            timestamp: self.graph[self.start_nodes[vehicle]].end_time,
            soc: position.soc,
            distance_last_maintenance: position.distance_last_maintenance_km(),
            max_rc_start_time: self.graph[self.start_nodes[vehicle]].max_rc_start_time,
            at_sink: false,
        };

        let extend = |label: &CenLabel, _arc: EdgeIndex, target: NodeIndex| -> Option<CenLabel> {
            let t = &self.graph[target];
            let mut new = label.clone();
            new.at_sink = matches!(t.kind, CenKind::Sink);

            if !t.has_access(vehicle) {
                return None;
            }
            if new.at_sink {
                return (label.max_rc_start_time == MAX_TIMESTAMP
                    && num::lt(new.reduced_cost, 0.0))
                .then_some(new);
            }
            if matches!(t.kind, CenKind::Central { .. }) {
                return Some(new);
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

            let CenKind::Piece { segment, .. } = t.kind else {
                return None;
            };
            let s = &self.segments.vec[segment];
            let charger = t.start_charger.expect("piece start charger");

            // The stay at the charger spans from the end of the previous
            // piece to the start of this one.
            let session = FixAtEnd.session(
                view,
                label.timestamp,
                t.start_time,
                vehicle,
                charger,
                label.soc,
                v.battery_discharge(s.total_distance_km()),
            );
            if !session.is_feasible {
                return None;
            }
            if session.is_charging {
                new.reduced_cost -=
                    duals.charging_interval(charger, session.put_on, session.take_off);
            }

            let cost = s.cost(label.distance_last_maintenance);
            new.timestamp = t.end_time;
            new.distance_last_maintenance = s.updated_distance(label.distance_last_maintenance);
            new.cost += cost;
            if include_cost {
                new.reduced_cost += cost - self.piece_duals(t);
            } else {
                new.reduced_cost -= self.piece_duals(t);
            }
            Some(new)
        };

        let dominates = |a: &CenLabel, b: &CenLabel| -> bool {
            if b.at_sink {
                return solve_optimal && num::lt(a.reduced_cost, b.reduced_cost);
            }
            let base = a.timestamp <= b.timestamp
                && a.max_rc_start_time >= b.max_rc_start_time
                && num::le(a.reduced_cost, b.reduced_cost);
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

    fn piece_duals(&self, node: &CenNode) -> f64 {
        match node.kind {
            CenKind::Piece { segment, piece } => {
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
        let start_charger = self.graph[first_source].start_charger.expect("start charger");

        let mut column = ColumnSchedule {
            vehicle,
            start_location: view.data.charger(start_charger).location,
            end_location: view.data.charger(start_charger).location,
            nodes: Vec::new(),
            trips: Vec::new(),
            maintenances: Vec::new(),
            charging: Vec::new(),
            cost,
            reduced_cost,
        };

        let mut soc = view.vehicle_position(vehicle).soc;
        let mut timestamp = self.graph[first_source].end_time;
        let mut prev_schedule_node: Option<NodeIndex> = None;

        for &arc in path {
            let (_, target) = self.graph.edge_endpoints(arc).expect("arc");
            let t = &self.graph[target];
            let CenKind::Piece { segment, piece } = t.kind else {
                continue;
            };
            let s = &self.segments.vec[segment];
            let p = &s.pieces[piece];
            let charger = t.start_charger.expect("piece start charger");

            let session = FixAtEnd.session(
                view,
                timestamp,
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
            timestamp = t.end_time;
            column.end_location =
                view.data.charger(t.end_charger.expect("piece end charger")).location;
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
    fn test_central_prices_like_connection() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let root = BranchNode::root(1, &view);

        let mut duals = Duals::new(&view);
        duals.trip_coverage.iter_mut().for_each(|d| *d = 10_000.0);

        let mut central = CentralNetwork::new(&view);
        central.rebuild(&duals, &root).unwrap();
        let (central_cols, optimal) =
            central.price_vehicle(&duals, 0, true, true, far_deadline());
        assert!(optimal);
        let central_best = central_cols
            .iter()
            .map(|c| c.reduced_cost)
            .min_by(f64::total_cmp)
            .expect("column found");

        let mut connection = crate::pricing::connection::ConnectionNetwork::new(&view);
        connection.rebuild(&duals, &root).unwrap();
        let (con_cols, _) = connection.price_vehicle(&duals, 0, true, true, far_deadline());
        let con_best = con_cols
            .iter()
            .map(|c| c.reduced_cost)
            .min_by(f64::total_cmp)
            .expect("column found");

        // Both formulations find the same best rotation.
        assert!((central_best - con_best).abs() < 1e-6);
    }

    #[test]
    fn test_central_has_fewer_arcs() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let root = BranchNode::root(1, &view);
        let duals = Duals::new(&view);

        let mut central = CentralNetwork::new(&view);
        central.rebuild(&duals, &root).unwrap();
        let mut connection = crate::pricing::connection::ConnectionNetwork::new(&view);
        connection.rebuild(&duals, &root).unwrap();

        // The central vertices collapse the pairwise piece connections.
        assert!(central.num_nodes() > 0);
        assert!(central.num_arcs() <= connection.num_arcs() + central.num_nodes());
    }
}
