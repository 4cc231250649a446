//! The pricing problem: three interchangeable network formulations behind
//! one driver.
//!
//! Per call the driver shuffles the candidate vehicles (those not branched
//! out of rotation), dispatches batches of `nr_threads` of them onto the
//! rayon pool and stops as soon as one batch produced a negative-reduced-
//! cost column, unless the caller asked for all vehicles. The returned
//! `is_optimal` flag is only true when *every* vehicle was priced to proven
//! exhaustion (no label cap, no deadline hit); it gates the Lagrangian
//! bound update in the column-generation loop.

pub mod central;
pub mod connection;
pub mod segments;
pub mod time_space;

use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::branch::{BranchKind, BranchNode};
use crate::column::ColumnSchedule;
use crate::duals::Duals;
use crate::horizon::HorizonView;
use central::CentralNetwork;
use connection::ConnectionNetwork;
use rotor_core::{num, PricingKind, RotorResult};
use time_space::TimeSpaceNetwork;

pub struct PricingResult {
    /// True only when every vehicle was priced to proven exhaustion.
    pub is_optimal: bool,
    /// Candidate columns per vehicle.
    pub schedules: Vec<Vec<ColumnSchedule>>,
}

enum Network<'a> {
    TimeSpace(TimeSpaceNetwork<'a>),
    Connection(ConnectionNetwork<'a>),
    Central(CentralNetwork<'a>),
}

pub struct PricingProblem<'a> {
    view: &'a HorizonView<'a>,
    network: Network<'a>,
    rng: StdRng,
    pub ms_solver: i64,
    pub ms_filter_access: i64,
    pub ms_network_construction: i64,
}

impl<'a> PricingProblem<'a> {
    pub fn new(view: &'a HorizonView<'a>) -> Self {
        Self::with_seed(view, rand::thread_rng().gen())
    }

    /// The shuffle seed is the only source of randomness in the engine;
    /// fixing it makes a run reproducible.
    pub fn with_seed(view: &'a HorizonView<'a>, seed: u64) -> Self {
        let clock = Instant::now();
        let network = match view.data.config.pricing {
            PricingKind::TimeSpace => Network::TimeSpace(TimeSpaceNetwork::new(view)),
            PricingKind::SegmentConnection => Network::Connection(ConnectionNetwork::new(view)),
            PricingKind::SegmentCentralised => Network::Central(CentralNetwork::new(view)),
        };
        Self {
            view,
            network,
            rng: StdRng::seed_from_u64(seed),
            ms_solver: 0,
            ms_filter_access: 0,
            ms_network_construction: clock.elapsed().as_millis() as i64,
        }
    }

    pub fn network_nodes(&self) -> u32 {
        match &self.network {
            Network::TimeSpace(n) => n.num_nodes(),
            Network::Connection(n) => n.num_nodes(),
            Network::Central(n) => n.num_nodes(),
        }
    }

    pub fn network_arcs(&self) -> u32 {
        match &self.network {
            Network::TimeSpace(n) => n.num_arcs(),
            Network::Connection(n) => n.num_arcs(),
            Network::Central(n) => n.num_arcs(),
        }
    }

    pub fn num_segments(&self) -> u32 {
        match &self.network {
            Network::TimeSpace(_) => 0,
            Network::Connection(n) => n.num_segments(),
            Network::Central(n) => n.num_segments(),
        }
    }

    /// Propagates the branch decisions of `node` into vertex/arc access.
    pub fn update_node_access(&mut self, node: &BranchNode) {
        let clock = Instant::now();
        match &mut self.network {
            Network::TimeSpace(n) => n.update_access(node),
            Network::Connection(n) => {
                n.segments.vec.par_iter_mut().for_each(|s| s.update_fixings(node))
            }
            Network::Central(n) => {
                n.segments.vec.par_iter_mut().for_each(|s| s.update_fixings(node))
            }
        }
        self.ms_filter_access += clock.elapsed().as_millis() as i64;
    }

    fn price_one(
        &self,
        duals: &Duals,
        vehicle: usize,
        include_cost: bool,
        solve_optimal: bool,
        deadline: Instant,
    ) -> (Vec<ColumnSchedule>, bool) {
        match &self.network {
            Network::TimeSpace(n) => {
                n.price_vehicle(duals, vehicle, include_cost, solve_optimal, deadline)
            }
            Network::Connection(n) => {
                n.price_vehicle(duals, vehicle, include_cost, solve_optimal, deadline)
            }
            Network::Central(n) => {
                n.price_vehicle(duals, vehicle, include_cost, solve_optimal, deadline)
            }
        }
    }

    /// One pricing round; see the module docs for the batching scheme.
    pub fn find_negative_columns(
        &mut self,
        duals: &Duals,
        node: &BranchNode,
        include_cost: bool,
        solve_optimal: bool,
        solve_all_vehicles: bool,
        deadline: Instant,
    ) -> RotorResult<PricingResult> {
        let clock = Instant::now();

        // The segment networks are rebuilt against the fresh duals.
        let construction = Instant::now();
        match &mut self.network {
            Network::TimeSpace(_) => {}
            Network::Connection(n) => n.rebuild(duals, node)?,
            Network::Central(n) => n.rebuild(duals, node)?,
        }
        self.ms_network_construction += construction.elapsed().as_millis() as i64;

        let mut in_rotation = vec![true; self.view.data.vehicles.len()];
        for branch in &node.branches {
            if let BranchKind::VehicleRotation { vehicle } = branch.kind {
                in_rotation[vehicle] = branch.value_bool();
            }
        }
        let mut candidates: Vec<usize> = in_rotation
            .iter()
            .enumerate()
            .filter_map(|(vehicle, &rotating)| rotating.then_some(vehicle))
            .collect();
        candidates.shuffle(&mut self.rng);

        let mut result = PricingResult {
            is_optimal: true,
            schedules: vec![Vec::new(); self.view.data.vehicles.len()],
        };

        let batch_size = if solve_all_vehicles {
            candidates.len().max(1)
        } else {
            (self.view.data.config.nr_threads as usize).clamp(1, candidates.len().max(1))
        };

        let mut remaining = candidates.as_slice();
        let mut all_solved_optimal = true;
        loop {
            if remaining.is_empty() {
                break;
            }
            let (batch, rest) = remaining.split_at(batch_size.min(remaining.len()));
            remaining = rest;

            let network = &*self;
            let outputs: Vec<(usize, Vec<ColumnSchedule>, bool)> = batch
                .par_iter()
                .map(|&vehicle| {
                    let (columns, optimal) =
                        network.price_one(duals, vehicle, include_cost, solve_optimal, deadline);
                    (vehicle, columns, optimal)
                })
                .collect();

            let mut found_negative = false;
            for (vehicle, columns, optimal) in outputs {
                all_solved_optimal &= optimal;
                found_negative |=
                    columns.iter().any(|c| num::lt(c.reduced_cost, 0.0));
                result.schedules[vehicle] = columns;
            }

            // A batch with an improving column suffices for this iteration.
            if found_negative {
                break;
            }
        }

        result.is_optimal = all_solved_optimal && remaining.is_empty();
        self.ms_solver += clock.elapsed().as_millis() as i64;
        Ok(result)
    }
}
