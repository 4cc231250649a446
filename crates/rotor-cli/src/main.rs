use std::collections::HashMap;
use std::time::Instant;

use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rotor_algo::bnp::{solve_planning_horizon, trim_solution};
use rotor_algo::horizon::{HorizonClock, HorizonView};
use rotor_core::model::DataSet;
use rotor_core::schedule::ActivityKind;
use rotor_core::stats::{
    ChargerStats, PlanningHorizonStats, RunStats, ScheduleStats, VehicleStats,
};
use rotor_core::{RotorResult, ScheduleGraph, Solution};

mod cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.data_dir.join("config.csv"));
    let mut data = rotor_io::read_dataset(&args.data_dir, &config_path)?;
    if let Some(threads) = args.threads {
        data.config.nr_threads = threads;
    }

    // nr_threads 0 means "use every core".
    let threads = if data.config.nr_threads == 0 {
        num_cpus::get()
    } else {
        data.config.nr_threads as usize
    };
    let _ = ThreadPoolBuilder::new().num_threads(threads).build_global();

    run(&data, &args)?;
    Ok(())
}

fn run(data: &DataSet, args: &cli::Cli) -> RotorResult<()> {
    let mut graph = ScheduleGraph::initialise(data)?;
    let mut stats = RunStats::default();
    let mut clock = HorizonClock::first(&data.config);

    loop {
        let started = Instant::now();
        info!(
            horizon = clock.index,
            start = %rotor_core::time::format_datetime(clock.start),
            end = %rotor_core::time::format_datetime(clock.end),
            overlap_s = clock.end_overlap - clock.end,
            "planning horizon"
        );

        let mut ph_stats = PlanningHorizonStats {
            index_planning_horizon: clock.index,
            start_planning_horizon: clock.start,
            end_planning_horizon: clock.end,
            end_overlap_planning_horizon: clock.end_overlap,
            ..PlanningHorizonStats::default()
        };

        let mut solution = Solution::default();
        {
            let view = HorizonView::new(data, &graph, clock);
            solve_planning_horizon(&view, &mut solution, &mut ph_stats, &mut stats, args.seed)?;
            trim_solution(&view, &mut solution);
        }

        graph.store_solution(data, &solution)?;

        ph_stats.time_total_ms = started.elapsed().as_millis() as i64;
        info!(
            lb = ph_stats.lb_integer,
            ub = ph_stats.ub_integer,
            unassigned = ph_stats.unassigned_trips,
            total_s = ph_stats.time_total_ms / 1000,
            "horizon finished"
        );
        stats.planning_horizons.push(ph_stats);

        if !clock.advance(&data.config) {
            break;
        }
    }

    collect_final_stats(data, &graph, &mut stats);
    rotor_io::write_outputs(&args.output, data, &graph, &stats)?;
    info!(output = %args.output.display(), "outputs written");
    Ok(())
}

fn collect_final_stats(data: &DataSet, graph: &ScheduleGraph, stats: &mut RunStats) {
    let mut totals = ScheduleStats::default();

    for vehicle in data.vehicles.iter() {
        let state = graph.vehicle_position(vehicle.index);
        stats.vehicles.push(VehicleStats {
            vehicle_id: vehicle.id.value(),
            in_rotation: !graph.vehicle_path(vehicle.index).is_empty(),
            cost_deadlegs: state.cost_deadlegs,
            cost_maintenance: state.cost_maintenance,
            cost_vehicle: state.cost_vehicle,
            km_deadlegs: state.dist_deadlegs_km as f64,
            km_avg_distance_maintenance: state.avg_distance_maintenance(),
            km_std_distance_maintenance: state.std_distance_maintenance(),
            lb_soc: state.lb_soc,
            ub_soc: state.ub_soc,
            seconds_productive: state.seconds_productive,
            seconds_idle: state.seconds_idle,
            seconds_charging: state.seconds_charging,
            seconds_maintenance: state.seconds_maintenance,
        });

        totals.cost_deadlegs += state.cost_deadlegs;
        totals.cost_maintenance += state.cost_maintenance;
        totals.cost_vehicles += state.cost_vehicle;
        totals.cost_total += state.cost_total();
    }

    totals.cost_unassigned_trips =
        graph.unassigned_trip_nodes().len() as f64 * data.config.cost_uncovered_trip;
    totals.cost_total += totals.cost_unassigned_trips;
    stats.schedule.push(totals);

    // Per-charger occupancy: count every committed session over the lattice
    // slots it spans, the take-off slot included.
    let mut slots: Vec<Vec<rotor_core::NodeIndex>> = vec![Vec::new(); data.chargers.len()];
    let mut put_on_slot = HashMap::new();
    for &node in graph.sorted_put_ons() {
        if let ActivityKind::PutOnCharge { charger } = graph.node(node).kind {
            put_on_slot.insert(node, (charger, slots[charger].len()));
            slots[charger].push(node);
        }
    }
    let mut take_off_slot = HashMap::new();
    let mut seen = vec![0usize; data.chargers.len()];
    for &node in graph.sorted_take_offs() {
        if let ActivityKind::TakeOffCharge { charger } = graph.node(node).kind {
            take_off_slot.insert(node, seen[charger]);
            seen[charger] += 1;
        }
    }

    let mut occupancy: Vec<Vec<u32>> = slots.iter().map(|s| vec![0; s.len()]).collect();
    for (charger, put_on, take_off) in graph.committed_charging_sessions() {
        let (Some(&(_, from)), Some(&to)) =
            (put_on_slot.get(&put_on), take_off_slot.get(&take_off))
        else {
            continue;
        };
        for slot in from..=to {
            occupancy[charger][slot] += 1;
        }
    }

    for (charger, charger_slots) in slots.iter().enumerate() {
        for (slot, &node) in charger_slots.iter().enumerate() {
            stats.chargers.push(ChargerStats {
                charger_id: data.charger(charger).id.value(),
                charger_capacity: data.charger(charger).capacity,
                timestamp: graph.node(node).end_time,
                vehicles_at_charger: occupancy[charger][slot],
            });
        }
    }
}
