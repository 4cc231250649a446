//! Smoke test: a full run over a two-trip instance produces the output set.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn seed_inputs(dir: &Path) {
    write(dir, "locations.csv", "Id,Type,Name\n1,Charger,Depot\n2,Stop,Central\n");
    write(
        dir,
        "travel.csv",
        "FromLocationId,ToLocationId,DurationSeconds,DistanceMetres\n1,2,900,10000\n2,1,900,10000\n",
    );
    write(dir, "chargers.csv", "Id,LocationId,Capacity,Volts,Amps\n1,1,4,400,200\n");
    write(
        dir,
        "vehicles.csv",
        "Id,BatteryMinKwh,BatteryMaxKwh,InitialChargerId,InitialStartTime,InitialSoc,Volts,Amps,NumberPlate,Odometer,OdometerLastMaintenance,InRotation,Cost,KwhPerKm\n\
         1,10,500,1,2023-05-01 01:00:00,400,400,200,EV-1,0,0,true,100.0,1.0\n\
         2,10,500,1,2023-05-01 01:00:00,400,400,200,EV-2,0,0,true,100.0,1.0\n",
    );
    write(
        dir,
        "trips.csv",
        "Id,StartTime,EndTime,StartLocationId,EndLocationId,LineId\n\
         1,2023-05-01 07:00:00,2023-05-01 08:00:00,2,1,1\n\
         2,2023-05-01 09:00:00,2023-05-01 10:00:00,2,1,1\n",
    );
    write(dir, "maintenances.csv", "Id,StartTime,EndTime,MaintenanceLocationId,VehicleId\n");
    write(
        dir,
        "config.csv",
        "Parameter Key,Datatype,Value\n\
         date_start,datetime,2023-05-01 00:00:00\n\
         date_end,datetime,2023-05-02 00:00:00\n\
         const_planning_horizon_length,uint,86400\n\
         const_code_pricing_problem_type,uint,0\n\
         const_code_algorithm_type,uint,1\n\
         const_nr_threads,uint,2\n",
    );
}

#[test]
fn full_run_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let out = dir.path().join("outputs");

    Command::cargo_bin("rotor")
        .unwrap()
        .arg(dir.path())
        .arg("--output")
        .arg(&out)
        .arg("--seed")
        .arg("7")
        .assert()
        .success();

    for file in [
        "vehicle_schedule.csv",
        "unassigned_trips.csv",
        "unassigned_maintenances.csv",
        "stats_vehicles.csv",
        "stats_chargers.csv",
        "stats_schedule.csv",
        "stats_planning_horizons.csv",
        "stats_performance_detail.csv",
    ] {
        assert!(out.join(file).exists(), "missing output {file}");
    }

    // Both trips are covered, so none are reported unassigned.
    let unassigned = fs::read_to_string(out.join("unassigned_trips.csv")).unwrap();
    assert_eq!(unassigned.lines().count(), 1, "only the header expected");

    let schedule = fs::read_to_string(out.join("vehicle_schedule.csv")).unwrap();
    assert!(predicate::str::contains("TRIP").eval(&schedule));
    assert!(predicate::str::contains("OUT_OF_ROTATION").eval(&schedule));
}

#[test]
fn missing_inputs_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "config.csv",
        "Parameter Key,Datatype,Value\ndate_start,datetime,2023-05-01 00:00:00\ndate_end,datetime,2023-05-02 00:00:00\nconst_planning_horizon_length,uint,86400\n",
    );
    Command::cargo_bin("rotor")
        .unwrap()
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("locations.csv"));
}
