//! Shared fixtures for unit and integration tests: small hand-built inputs
//! with known optimal rotations.

use rotor_core::model::*;
use rotor_core::{ChargerId, Config, LocationId, MaintenanceId, TripId, VehicleId};

fn measures(distance_km: u32, duration_s: u32) -> TravelMeasure {
    TravelMeasure { distance_km, duration_s }
}

fn base_config() -> Config {
    let mut config = Config::default();
    config.date_start = 0;
    config.date_end = 86_400;
    config.planning_horizon_length = 86_400;
    config.planning_horizon_overlap = 0;
    config.charger_capacity_check = 300;
    config.put_vehicle_on_charge = 300;
    config.take_vehicle_off_charge = 300;
    config.nr_threads = 2;
    config.cost_deadleg_fix = 5.0;
    config.cost_deadleg_per_km = 2.0;
    config.cost_uncovered_trip = 2000.0;
    config
}

fn vehicle(index: usize, id: u32, initial_soc: i32) -> Vehicle {
    Vehicle {
        index,
        id: VehicleId::new(id),
        battery_min_kwh: 10,
        battery_max_kwh: 500,
        initial_charger: 0,
        initial_start_time: 3_600, // 01:00
        initial_soc,
        volts: 400,
        amps: 200,
        number_plate: format!("EV-{id}"),
        odometer_km: 0,
        odometer_last_maintenance_km: 0,
        in_rotation: true,
        activation_cost: 100.0,
        kwh_per_1000km: 1_000,
    }
}

/// One depot charger, one stop 10 km away, two vehicles with ample
/// batteries, two same-day trips at the stop. The cheapest cover uses one
/// vehicle for both trips.
pub fn scenario_two_trips() -> DataSet {
    let mut data = DataSet { config: base_config(), ..DataSet::default() };

    data.locations
        .push(Location {
            index: 0,
            id: LocationId::new(1),
            kind: LocationKind::Charger,
            name: "depot".into(),
            travel: vec![measures(0, 0), measures(10, 900)],
        })
        .unwrap();
    data.locations
        .push(Location {
            index: 1,
            id: LocationId::new(2),
            kind: LocationKind::Stop,
            name: "stop".into(),
            travel: vec![measures(10, 900), measures(0, 0)],
        })
        .unwrap();
    data.chargers
        .push(Charger {
            index: 0,
            id: ChargerId::new(1),
            location: 0,
            capacity: 4,
            volts: 400,
            amps: 200,
        })
        .unwrap();

    data.vehicles.push(vehicle(0, 1, 400)).unwrap();
    data.vehicles.push(vehicle(1, 2, 400)).unwrap();

    // 07:00-08:00 and 09:00-10:00, both from the stop back to the depot so
    // a rotation can close at the charger.
    data.trips
        .push(Trip {
            index: 0,
            id: TripId::new(1),
            start_time: 25_200,
            end_time: 28_800,
            start_location: 1,
            end_location: 0,
            line_id: 1,
        })
        .unwrap();
    data.trips
        .push(Trip {
            index: 1,
            id: TripId::new(2),
            start_time: 32_400,
            end_time: 36_000,
            start_location: 1,
            end_location: 0,
            line_id: 1,
        })
        .unwrap();
    data
}

/// Adds a maintenance slot at the depot, pre-assigned to the second
/// vehicle.
pub fn scenario_with_maintenance() -> DataSet {
    let mut data = scenario_two_trips();
    data.maintenances
        .push(Maintenance {
            index: 0,
            id: MaintenanceId::new(1),
            start_time: 39_600, // 11:00
            end_time: 46_800,   // 13:00
            location: 0,
            vehicle: Some(1),
        })
        .unwrap();
    data
}

/// One charger with capacity 1 and two vehicles that both need a recharge
/// in the same window to reach their trips, so the capacity bound binds.
pub fn scenario_capacity_bound() -> DataSet {
    let mut data = scenario_two_trips();
    // Single slot per window.
    let charger = data.chargers.iter_mut().next().unwrap();
    charger.capacity = 1;
    // Small batteries: both vehicles must top up before driving.
    for vehicle in data.vehicles.iter_mut() {
        vehicle.initial_soc = 35;
        vehicle.battery_max_kwh = 60;
    }
    data
}
