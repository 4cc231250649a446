//! CSV output writers.
//!
//! One file per output: the committed vehicle schedule (one row per
//! activity arc), the unassigned trips and maintenances, and the four
//! statistics tables. All fields are numeric or textual; no binary framing.

use std::path::Path;

use rotor_core::model::DataSet;
use rotor_core::schedule::ActivityKind;
use rotor_core::stats::RunStats;
use rotor_core::{time, RotorError, RotorResult, ScheduleGraph};

fn writer(path: &Path) -> RotorResult<csv::Writer<std::fs::File>> {
    csv::Writer::from_path(path)
        .map_err(|e| RotorError::File(format!("cannot create '{}': {e}", path.display())))
}

fn finish<W: std::io::Write>(mut w: csv::Writer<W>, path: &Path) -> RotorResult<()> {
    w.flush()
        .map_err(|e| RotorError::File(format!("cannot write '{}': {e}", path.display())))
}

fn write_row<W: std::io::Write>(
    w: &mut csv::Writer<W>,
    path: &Path,
    row: &[String],
) -> RotorResult<()> {
    w.write_record(row)
        .map_err(|e| RotorError::File(format!("cannot write '{}': {e}", path.display())))
}

fn opt_f64(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.3}")).unwrap_or_default()
}

pub fn write_vehicle_schedule(
    path: &Path,
    data: &DataSet,
    graph: &ScheduleGraph,
) -> RotorResult<()> {
    let mut w = writer(path)?;
    write_row(
        &mut w,
        path,
        &[
            "VehicleId".into(),
            "Activity".into(),
            "StartTime".into(),
            "EndTime".into(),
            "StartLocationId".into(),
            "EndLocationId".into(),
            "DistanceKm".into(),
            "DurationSeconds".into(),
            "IdleSecondsBefore".into(),
        ],
    )?;

    for vehicle in data.vehicles.iter() {
        for &arc in graph.vehicle_path(vehicle.index) {
            let node = graph.node(graph.arc_target(arc));
            write_row(
                &mut w,
                path,
                &[
                    vehicle.id.value().to_string(),
                    node.kind_name().to_string(),
                    time::format_datetime(node.start_time),
                    time::format_datetime(node.end_time),
                    data.location(node.start_location).id.value().to_string(),
                    data.location(node.end_location).id.value().to_string(),
                    node.distance_km.to_string(),
                    node.duration_s().to_string(),
                    graph.arc(arc).wait_s.to_string(),
                ],
            )?;
        }
    }
    finish(w, path)
}

pub fn write_unassigned_trips(
    path: &Path,
    data: &DataSet,
    graph: &ScheduleGraph,
) -> RotorResult<()> {
    let mut w = writer(path)?;
    write_row(
        &mut w,
        path,
        &[
            "TripId".into(),
            "StartTime".into(),
            "EndTime".into(),
            "StartLocationId".into(),
            "EndLocationId".into(),
            "LineId".into(),
        ],
    )?;
    for node in graph.unassigned_trip_nodes() {
        if let ActivityKind::Trip { trip } = graph.node(node).kind {
            let t = data.trip(trip);
            write_row(
                &mut w,
                path,
                &[
                    t.id.value().to_string(),
                    time::format_datetime(t.start_time),
                    time::format_datetime(t.end_time),
                    data.location(t.start_location).id.value().to_string(),
                    data.location(t.end_location).id.value().to_string(),
                    t.line_id.to_string(),
                ],
            )?;
        }
    }
    finish(w, path)
}

pub fn write_unassigned_maintenances(
    path: &Path,
    data: &DataSet,
    graph: &ScheduleGraph,
) -> RotorResult<()> {
    let mut w = writer(path)?;
    write_row(
        &mut w,
        path,
        &["MaintenanceId".into(), "StartTime".into(), "EndTime".into(), "LocationId".into()],
    )?;
    for node in graph.unassigned_maintenance_nodes() {
        if let ActivityKind::Maintenance { maintenance } = graph.node(node).kind {
            let m = data.maintenance(maintenance);
            write_row(
                &mut w,
                path,
                &[
                    m.id.value().to_string(),
                    time::format_datetime(m.start_time),
                    time::format_datetime(m.end_time),
                    data.location(m.location).id.value().to_string(),
                ],
            )?;
        }
    }
    finish(w, path)
}

pub fn write_vehicle_stats(path: &Path, stats: &RunStats) -> RotorResult<()> {
    let mut w = writer(path)?;
    write_row(
        &mut w,
        path,
        &[
            "VehicleId".into(),
            "InRotation".into(),
            "CostDeadlegs".into(),
            "CostMaintenance".into(),
            "CostVehicle".into(),
            "KmDeadlegs".into(),
            "KmAvgDistanceMaintenance".into(),
            "KmStdDistanceMaintenance".into(),
            "LbSoc".into(),
            "UbSoc".into(),
            "SecondsProductive".into(),
            "SecondsIdle".into(),
            "SecondsCharging".into(),
            "SecondsMaintenance".into(),
        ],
    )?;
    for s in &stats.vehicles {
        write_row(
            &mut w,
            path,
            &[
                s.vehicle_id.to_string(),
                s.in_rotation.to_string(),
                format!("{:.3}", s.cost_deadlegs),
                format!("{:.3}", s.cost_maintenance),
                format!("{:.3}", s.cost_vehicle),
                format!("{:.3}", s.km_deadlegs),
                opt_f64(s.km_avg_distance_maintenance),
                opt_f64(s.km_std_distance_maintenance),
                s.lb_soc.to_string(),
                s.ub_soc.to_string(),
                s.seconds_productive.to_string(),
                s.seconds_idle.to_string(),
                s.seconds_charging.to_string(),
                s.seconds_maintenance.to_string(),
            ],
        )?;
    }
    finish(w, path)
}

pub fn write_charger_stats(path: &Path, stats: &RunStats) -> RotorResult<()> {
    let mut w = writer(path)?;
    write_row(
        &mut w,
        path,
        &["ChargerId".into(), "Capacity".into(), "Timestamp".into(), "VehiclesAtCharger".into()],
    )?;
    for s in &stats.chargers {
        write_row(
            &mut w,
            path,
            &[
                s.charger_id.to_string(),
                s.charger_capacity.to_string(),
                time::format_datetime(s.timestamp),
                s.vehicles_at_charger.to_string(),
            ],
        )?;
    }
    finish(w, path)
}

pub fn write_planning_horizon_stats(path: &Path, stats: &RunStats) -> RotorResult<()> {
    let mut w = writer(path)?;
    write_row(
        &mut w,
        path,
        &[
            "PlanningHorizon".into(),
            "Start".into(),
            "End".into(),
            "EndOverlap".into(),
            "Algorithm".into(),
            "LbInteger".into(),
            "UbInteger".into(),
            "UnassignedTrips".into(),
            "VehiclesSelected".into(),
            "TreeSize".into(),
            "TreeDepth".into(),
            "Segments".into(),
            "TimeTotalMs".into(),
            "TimeMpSolverMs".into(),
            "TimePpSolverMs".into(),
        ],
    )?;
    for s in &stats.planning_horizons {
        write_row(
            &mut w,
            path,
            &[
                s.index_planning_horizon.to_string(),
                time::format_datetime(s.start_planning_horizon),
                time::format_datetime(s.end_planning_horizon),
                time::format_datetime(s.end_overlap_planning_horizon),
                s.algorithm.clone(),
                format!("{:.3}", s.lb_integer),
                format!("{:.3}", s.ub_integer),
                s.unassigned_trips.to_string(),
                s.vehicles_selected.to_string(),
                s.branching_tree_size.to_string(),
                s.branching_tree_depth.to_string(),
                s.pp_nr_segments.to_string(),
                s.time_total_ms.to_string(),
                s.time_mp_solver_ms.to_string(),
                s.time_pp_solver_ms.to_string(),
            ],
        )?;
    }
    finish(w, path)
}

pub fn write_performance_detail(path: &Path, stats: &RunStats) -> RotorResult<()> {
    let mut w = writer(path)?;
    write_row(
        &mut w,
        path,
        &[
            "PlanningHorizon".into(),
            "BranchingNode".into(),
            "ParentBranchingNode".into(),
            "Iteration".into(),
            "BranchKind".into(),
            "BranchValue".into(),
            "FractionalValue".into(),
            "LbRelaxed".into(),
            "UbRelaxed".into(),
            "LbInteger".into(),
            "UbInteger".into(),
            "IntegerFound".into(),
            "ColumnsAdded".into(),
            "LazyConstraintAdded".into(),
            "MpVariables".into(),
            "MpConstraints".into(),
            "PpNodes".into(),
            "PpArcs".into(),
            "TimeMpSolverMs".into(),
            "TimePpSolverMs".into(),
            "PpConstructionMs".into(),
        ],
    )?;
    for s in &stats.performance {
        write_row(
            &mut w,
            path,
            &[
                s.index_planning_horizon.to_string(),
                s.index_branching_node.to_string(),
                s.index_parent_branching_node
                    .map(|i| i.to_string())
                    .unwrap_or_default(),
                s.iteration.to_string(),
                s.branch_kind.clone(),
                opt_f64(s.branch_value),
                opt_f64(s.fractional_value),
                format!("{:.3}", s.lb_relaxed),
                format!("{:.3}", s.ub_relaxed),
                format!("{:.3}", s.lb_integer),
                format!("{:.3}", s.ub_integer),
                s.integer_found.to_string(),
                s.columns_added.to_string(),
                s.lazy_constraint_added.clone().unwrap_or_default(),
                s.mp_size_variables.to_string(),
                s.mp_size_constraints.to_string(),
                s.pp_network_size_nodes.to_string(),
                s.pp_network_size_arcs.to_string(),
                s.time_mp_solver_ms.to_string(),
                s.time_pp_solver_ms.to_string(),
                s.pp_network_construction_ms.to_string(),
            ],
        )?;
    }
    finish(w, path)
}

pub fn write_schedule_stats(path: &Path, stats: &RunStats) -> RotorResult<()> {
    let mut w = writer(path)?;
    write_row(
        &mut w,
        path,
        &[
            "CostDeadlegs".into(),
            "CostMaintenance".into(),
            "CostVehicles".into(),
            "CostUnassignedTrips".into(),
            "CostTotal".into(),
        ],
    )?;
    for s in &stats.schedule {
        write_row(
            &mut w,
            path,
            &[
                format!("{:.3}", s.cost_deadlegs),
                format!("{:.3}", s.cost_maintenance),
                format!("{:.3}", s.cost_vehicles),
                format!("{:.3}", s.cost_unassigned_trips),
                format!("{:.3}", s.cost_total),
            ],
        )?;
    }
    finish(w, path)
}

/// Writes the complete output set into `out_dir`.
pub fn write_outputs(
    out_dir: &Path,
    data: &DataSet,
    graph: &ScheduleGraph,
    stats: &RunStats,
) -> RotorResult<()> {
    std::fs::create_dir_all(out_dir)?;
    write_vehicle_schedule(&out_dir.join("vehicle_schedule.csv"), data, graph)?;
    write_unassigned_trips(&out_dir.join("unassigned_trips.csv"), data, graph)?;
    write_unassigned_maintenances(&out_dir.join("unassigned_maintenances.csv"), data, graph)?;
    write_vehicle_stats(&out_dir.join("stats_vehicles.csv"), stats)?;
    write_charger_stats(&out_dir.join("stats_chargers.csv"), stats)?;
    write_schedule_stats(&out_dir.join("stats_schedule.csv"), stats)?;
    write_planning_horizon_stats(&out_dir.join("stats_planning_horizons.csv"), stats)?;
    write_performance_detail(&out_dir.join("stats_performance_detail.csv"), stats)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotor_core::stats::{PlanningHorizonStats, RunStats};

    #[test]
    fn test_write_planning_horizon_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ph.csv");
        let stats = RunStats {
            planning_horizons: vec![PlanningHorizonStats {
                index_planning_horizon: 0,
                algorithm: "Trunc. CG".into(),
                lb_integer: 10.0,
                ub_integer: 10.0,
                ..PlanningHorizonStats::default()
            }],
            ..RunStats::default()
        };
        write_planning_horizon_stats(&path, &stats).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("PlanningHorizon"));
        assert!(content.contains("Trunc. CG"));
    }
}
