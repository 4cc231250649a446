//! End-to-end regression scenarios over the full per-horizon solver.

use rotor_algo::bnp::{solve_planning_horizon, trim_solution};
use rotor_algo::horizon::{HorizonClock, HorizonView};
use rotor_algo::test_support::{scenario_two_trips, scenario_with_maintenance};
use rotor_core::stats::{PlanningHorizonStats, RunStats};
use rotor_core::{ActivityKind, AlgorithmKind, PricingKind, ScheduleGraph, Solution};

fn solve(data: &rotor_core::DataSet) -> (Solution, PlanningHorizonStats, ScheduleGraph) {
    let graph = ScheduleGraph::initialise(data).unwrap();
    let mut solution = Solution::default();
    let mut ph_stats = PlanningHorizonStats::default();
    let mut stats = RunStats::default();
    {
        let view = HorizonView::new(data, &graph, HorizonClock::first(&data.config));
        solve_planning_horizon(&view, &mut solution, &mut ph_stats, &mut stats, Some(7))
            .unwrap();
        trim_solution(&view, &mut solution);
    }
    (solution, ph_stats, graph)
}

/// Two trips, ample batteries: one vehicle covers both; the cost is one
/// activation plus the three connecting deadlegs.
#[test]
fn single_vehicle_covers_both_trips_time_space() {
    let mut data = scenario_two_trips();
    data.config.pricing = PricingKind::TimeSpace;
    data.config.algorithm = AlgorithmKind::BranchAndPriceBest;

    let (solution, _, _) = solve(&data);
    assert_eq!(solution.unassigned_trips, 0);
    assert_eq!(solution.vehicles_selected, 1);
    // activation 100 + two connecting deadlegs (5 + 2*10 each); the closing
    // move onto the charger end carries no column cost in this formulation.
    assert!((solution.objective - 150.0).abs() < 1e-3, "objective {}", solution.objective);

    let covered: usize = solution.schedules.iter().map(|s| s.nodes.len()).sum();
    assert!(covered >= 2);
}

#[test]
fn single_vehicle_covers_both_trips_segment_connection() {
    let mut data = scenario_two_trips();
    data.config.pricing = PricingKind::SegmentConnection;
    data.config.algorithm = AlgorithmKind::DivingHeuristic;

    let (solution, _, _) = solve(&data);
    assert_eq!(solution.unassigned_trips, 0);
    assert_eq!(solution.vehicles_selected, 1);
    // Segment costs include the closing deadleg back onto the charger.
    assert!((solution.objective - 155.0).abs() < 1e-3, "objective {}", solution.objective);
}

#[test]
fn single_vehicle_covers_both_trips_segment_centralised() {
    let mut data = scenario_two_trips();
    data.config.pricing = PricingKind::SegmentCentralised;
    data.config.algorithm = AlgorithmKind::DivingThenBestFirst;

    let (solution, _, _) = solve(&data);
    assert_eq!(solution.unassigned_trips, 0);
    assert_eq!(solution.vehicles_selected, 1);
    assert!((solution.objective - 155.0).abs() < 1e-3, "objective {}", solution.objective);
}

/// The committed solution replays cleanly into the schedule graph and the
/// covered trips disappear from the next horizon's view.
#[test]
fn commit_keeps_graph_invariants() {
    let mut data = scenario_two_trips();
    data.config.pricing = PricingKind::TimeSpace;
    data.config.algorithm = AlgorithmKind::BranchAndPriceBest;

    let (solution, _, mut graph) = solve(&data);
    graph.store_solution(&data, &solution).unwrap();

    assert!(graph.trips_in_interval(0, 86_400).is_empty());
    for vehicle in data.vehicles.iter() {
        let state = graph.vehicle_position(vehicle.index);
        assert!(state.soc >= vehicle.battery_min_kwh);
        assert!(state.soc <= vehicle.battery_max_kwh);
    }
    // Exactly one vehicle drove; the other was parked at its charger.
    let parked = data
        .vehicles
        .iter()
        .filter(|v| {
            matches!(
                graph.node(graph.vehicle_position(v.index).last_node).kind,
                ActivityKind::OutOfRotation
            )
        })
        .count();
    assert_eq!(parked, 1);
}

/// A pre-assigned maintenance becomes a root branch and must land on its
/// vehicle.
#[test]
fn preassigned_maintenance_sticks_to_its_vehicle() {
    let mut data = scenario_with_maintenance();
    data.config.pricing = PricingKind::TimeSpace;
    data.config.algorithm = AlgorithmKind::BranchAndPriceBest;

    let (solution, _, _) = solve(&data);
    assert_eq!(solution.unassigned_trips, 0);

    // Vehicle index 1 owns the maintenance.
    let maintenance_schedules: Vec<_> = solution
        .schedules
        .iter()
        .filter(|s| !s.nodes.is_empty())
        .collect();
    assert!(!maintenance_schedules.is_empty());
    let graph = ScheduleGraph::initialise(&data).unwrap();
    let maintenance_node = graph.sorted_maintenances()[0];
    let owner = solution
        .schedules
        .iter()
        .find(|s| s.nodes.contains(&maintenance_node))
        .expect("maintenance covered");
    assert_eq!(owner.vehicle, 1);
}

/// A zero column-generation time limit exits after one master solve without
/// crashing; every trip stays unassigned.
#[test]
fn zero_timelimit_is_safe() {
    let mut data = scenario_two_trips();
    data.config.pricing = PricingKind::TimeSpace;
    data.config.algorithm = AlgorithmKind::BranchAndPriceBest;
    data.config.column_generation_timelimit = 0;

    let (solution, _, mut graph) = solve(&data);
    assert_eq!(solution.unassigned_trips, 2);
    assert!((solution.objective - 4000.0).abs() < 1e-3);
    assert!(solution.schedules.iter().all(|s| s.nodes.is_empty()));

    // The empty solution still commits: everyone parks.
    graph.store_solution(&data, &solution).unwrap();
}
