//! CSV input readers.

use std::path::{Path, PathBuf};

use csv::StringRecord;
use rotor_core::model::{
    Charger, DataSet, Location, LocationKind, Maintenance, TravelMeasure, Trip, Vehicle,
};
use rotor_core::{
    time, ChargerId, Config, LocationId, MaintenanceId, RotorError, RotorResult, TripId, VehicleId,
};

/// Reads all records of one file, applying the shared conventions (BOM,
/// `sep=` preamble, `#` comments, header token).
fn read_records(path: &Path, header_token: &str) -> RotorResult<Vec<StringRecord>> {
    if !path.exists() {
        return Err(RotorError::File(format!(
            "input file '{}' does not exist",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| RotorError::File(format!("cannot open '{}': {e}", path.display())))?;

    let mut records = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let mut record =
            result.map_err(|e| RotorError::Data(format!("{}: {e}", path.display())))?;
        if record.is_empty() {
            continue;
        }

        // Strip a UTF-8 BOM from the very first field.
        if line == 0 {
            if let Some(first) = record.get(0) {
                if let Some(stripped) = first.strip_prefix('\u{feff}') {
                    let mut cleaned = StringRecord::new();
                    cleaned.push_field(stripped);
                    for field in record.iter().skip(1) {
                        cleaned.push_field(field);
                    }
                    record = cleaned;
                }
            }
        }

        let first = record.get(0).unwrap_or("");
        if line == 0 && first.starts_with("sep") {
            continue;
        }
        if first.contains(header_token) {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

fn field<'r>(record: &'r StringRecord, index: usize, name: &str) -> RotorResult<&'r str> {
    match record.get(index) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(RotorError::Data(format!("missing field '{name}'"))),
    }
}

fn parse_u32(record: &StringRecord, index: usize, name: &str) -> RotorResult<u32> {
    field(record, index, name)?
        .parse::<u32>()
        .map_err(|e| RotorError::Data(format!("field '{name}': {e}")))
}

fn parse_i32(record: &StringRecord, index: usize, name: &str) -> RotorResult<i32> {
    // Battery fields may be written with decimals; they are quantised.
    let raw = field(record, index, name)?;
    raw.parse::<i32>().or_else(|_| {
        raw.parse::<f64>()
            .map(|v| v as i32)
            .map_err(|e| RotorError::Data(format!("field '{name}': {e}")))
    })
}

fn parse_f64(record: &StringRecord, index: usize, name: &str) -> RotorResult<f64> {
    field(record, index, name)?
        .parse::<f64>()
        .map_err(|e| RotorError::Data(format!("field '{name}': {e}")))
}

fn parse_time(record: &StringRecord, index: usize, name: &str) -> RotorResult<i64> {
    time::parse_datetime(field(record, index, name)?)
}

/// `locations.csv`: id, type in {Stop, Charger, Maintenance, Undefined}, name
fn read_locations(path: &Path, data: &mut DataSet) -> RotorResult<()> {
    for record in read_records(path, "Id")? {
        let index = data.locations.len();
        data.locations.push(Location {
            index,
            id: LocationId::new(parse_u32(&record, 0, "Id")?),
            kind: LocationKind::parse(field(&record, 1, "Type")?),
            name: field(&record, 2, "Name")?.to_string(),
            travel: Vec::new(),
        })?;
    }
    if data.locations.is_empty() {
        return Err(RotorError::Data(format!("'{}' holds no locations", path.display())));
    }
    Ok(())
}

/// `travel.csv`: from-location-id, to-location-id, duration-seconds,
/// distance-metres (converted to whole kilometres internally, matching
/// the km-based cost and consumption figures). Unlisted pairs stay
/// unreachable; symmetry is not assumed.
fn read_travel_matrix(path: &Path, data: &mut DataSet) -> RotorResult<()> {
    let n = data.locations.len();
    let mut rows = vec![vec![TravelMeasure::UNREACHABLE; n]; n];
    for (from, row) in rows.iter_mut().enumerate() {
        row[from] = TravelMeasure { distance_km: 0, duration_s: 0 };
    }

    for record in read_records(path, "Id")? {
        let from = data
            .locations
            .index_of(LocationId::new(parse_u32(&record, 0, "FromLocationId")?))?;
        let to = data
            .locations
            .index_of(LocationId::new(parse_u32(&record, 1, "ToLocationId")?))?;
        rows[from][to] = TravelMeasure {
            duration_s: parse_u32(&record, 2, "DurationSeconds")?,
            distance_km: (parse_u32(&record, 3, "DistanceMetres")? + 500) / 1000,
        };
    }

    for (location, row) in data.locations.iter_mut().zip(rows) {
        location.travel = row;
    }
    Ok(())
}

/// `chargers.csv`: id, location-id, capacity, volts, amps
fn read_chargers(path: &Path, data: &mut DataSet) -> RotorResult<()> {
    for record in read_records(path, "Id")? {
        let index = data.chargers.len();
        let capacity = parse_u32(&record, 2, "Capacity")?;
        if capacity == 0 {
            return Err(RotorError::Data("charger capacity must be positive".into()));
        }
        data.chargers.push(Charger {
            index,
            id: ChargerId::new(parse_u32(&record, 0, "Id")?),
            location: data
                .locations
                .index_of(LocationId::new(parse_u32(&record, 1, "LocationId")?))?,
            capacity,
            volts: parse_i32(&record, 3, "Volts")?,
            amps: parse_i32(&record, 4, "Amps")?,
        })?;
    }
    Ok(())
}

/// `vehicles.csv`: id, battery-min-kWh, battery-max-kWh, initial-charger-id,
/// initial-start-time, initial-soc, volts, amps, number-plate, odometer,
/// odometer-last-maintenance, in-rotation-bool, cost, kWh-per-km
fn read_vehicles(path: &Path, data: &mut DataSet) -> RotorResult<()> {
    for record in read_records(path, "Id")? {
        let index = data.vehicles.len();
        // Internal consumption is kWh per 1000 km, three decimals of the
        // per-km figure preserved.
        let kwh_per_km = parse_f64(&record, 13, "KwhPerKm")?;
        let kwh_per_1000km = (kwh_per_km * 1000.0).round() as i32;
        if kwh_per_1000km <= 0 {
            return Err(RotorError::Data("vehicle consumption must be positive".into()));
        }
        data.vehicles.push(Vehicle {
            index,
            id: VehicleId::new(parse_u32(&record, 0, "Id")?),
            battery_min_kwh: parse_i32(&record, 1, "BatteryMinKwh")?,
            battery_max_kwh: parse_i32(&record, 2, "BatteryMaxKwh")?,
            initial_charger: data
                .chargers
                .index_of(ChargerId::new(parse_u32(&record, 3, "InitialChargerId")?))?,
            initial_start_time: parse_time(&record, 4, "InitialStartTime")?,
            initial_soc: parse_i32(&record, 5, "InitialSoc")?,
            volts: parse_i32(&record, 6, "Volts")?,
            amps: parse_i32(&record, 7, "Amps")?,
            number_plate: field(&record, 8, "NumberPlate")?.to_string(),
            odometer_km: parse_u32(&record, 9, "Odometer")?,
            odometer_last_maintenance_km: parse_u32(&record, 10, "OdometerLastMaintenance")?,
            in_rotation: rotor_core::config::parse_bool(field(&record, 11, "InRotation")?),
            activation_cost: parse_f64(&record, 12, "Cost")?,
            kwh_per_1000km,
        })?;
    }
    Ok(())
}

/// `trips.csv`: id, start-time, end-time, start-location-id,
/// end-location-id, line-id
fn read_trips(path: &Path, data: &mut DataSet) -> RotorResult<()> {
    for record in read_records(path, "Id")? {
        let index = data.trips.len();
        data.trips.push(Trip {
            index,
            id: TripId::new(parse_u32(&record, 0, "Id")?),
            start_time: parse_time(&record, 1, "StartTime")?,
            end_time: parse_time(&record, 2, "EndTime")?,
            start_location: data
                .locations
                .index_of(LocationId::new(parse_u32(&record, 3, "StartLocationId")?))?,
            end_location: data
                .locations
                .index_of(LocationId::new(parse_u32(&record, 4, "EndLocationId")?))?,
            line_id: parse_u32(&record, 5, "LineId")?,
        })?;
    }
    Ok(())
}

/// `maintenances.csv`: id, start-time, end-time, maintenance-location-id,
/// optional vehicle-id
fn read_maintenances(path: &Path, data: &mut DataSet) -> RotorResult<()> {
    for record in read_records(path, "Id")? {
        let index = data.maintenances.len();
        let vehicle = match record.get(4) {
            Some(s) if !s.is_empty() => {
                Some(data.vehicles.index_of(VehicleId::new(s.parse::<u32>().map_err(
                    |e| RotorError::Data(format!("field 'VehicleId': {e}")),
                )?))?)
            }
            _ => None,
        };
        data.maintenances.push(Maintenance {
            index,
            id: MaintenanceId::new(parse_u32(&record, 0, "Id")?),
            start_time: parse_time(&record, 1, "StartTime")?,
            end_time: parse_time(&record, 2, "EndTime")?,
            location: data
                .locations
                .index_of(LocationId::new(parse_u32(&record, 3, "MaintenanceLocationId")?))?,
            vehicle,
        })?;
    }
    Ok(())
}

/// `config.csv`: parameter-key, datatype in {uint,double,datetime,string,bool},
/// value. Keys are lower-cased; unknown keys warn and are ignored.
pub fn read_config(path: &Path) -> RotorResult<Config> {
    let mut config = Config::default();
    for record in read_records(path, "Parameter")? {
        let key = field(&record, 0, "ParameterKey")?;
        let datatype = field(&record, 1, "Datatype")?;
        let value = field(&record, 2, "Value")?;
        config.apply(key, datatype, value)?;
    }
    config.validate()?;
    Ok(config)
}

/// Reads the whole input set from a directory with the canonical file names
/// plus a config file.
pub fn read_dataset(data_dir: &Path, config_path: &Path) -> RotorResult<DataSet> {
    let file = |name: &str| -> PathBuf { data_dir.join(name) };

    let mut data = DataSet {
        config: read_config(config_path)?,
        ..DataSet::default()
    };
    read_locations(&file("locations.csv"), &mut data)?;
    read_travel_matrix(&file("travel.csv"), &mut data)?;
    read_chargers(&file("chargers.csv"), &mut data)?;
    read_vehicles(&file("vehicles.csv"), &mut data)?;
    read_trips(&file("trips.csv"), &mut data)?;
    read_maintenances(&file("maintenances.csv"), &mut data)?;

    tracing::info!(
        locations = data.locations.len(),
        chargers = data.chargers.len(),
        vehicles = data.vehicles.len(),
        trips = data.trips.len(),
        maintenances = data.maintenances.len(),
        "input loaded"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn seed_inputs(dir: &Path) {
        write(
            dir,
            "locations.csv",
            "sep=,\nId,Type,Name\n1,Charger,Depot\n2,Stop,Central\n# comment line\n3,Maintenance,Works\n",
        );
        write(
            dir,
            "travel.csv",
            "FromLocationId,ToLocationId,DurationSeconds,DistanceMetres\n1,2,600,10000\n2,1,600,10000\n2,3,300,5000\n3,2,300,5000\n1,3,900,15000\n3,1,900,15000\n",
        );
        write(dir, "chargers.csv", "Id,LocationId,Capacity,Volts,Amps\n1,1,2,400,125\n");
        write(
            dir,
            "vehicles.csv",
            "Id,BatteryMinKwh,BatteryMaxKwh,InitialChargerId,InitialStartTime,InitialSoc,Volts,Amps,NumberPlate,Odometer,OdometerLastMaintenance,InRotation,Cost,KwhPerKm\n\
             1,20,220,1,2023-05-01 04:00:00,200,400,125,EV-1,1000,0,true,150.0,1.25\n",
        );
        write(
            dir,
            "trips.csv",
            "Id,StartTime,EndTime,StartLocationId,EndLocationId,LineId\n1,2023-05-01 06:00:00,2023-05-01 07:00:00,2,2,12\n",
        );
        write(
            dir,
            "maintenances.csv",
            "Id,StartTime,EndTime,MaintenanceLocationId,VehicleId\n1,2023-05-01 10:00:00,2023-05-01 12:00:00,3,1\n2,2023-05-01 14:00:00,2023-05-01 16:00:00,3,\n",
        );
        write(
            dir,
            "config.csv",
            "Parameter Key,Datatype,Value\ndate_start,datetime,2023-05-01 00:00:00\ndate_end,datetime,2023-05-02 00:00:00\nconst_planning_horizon_length,uint,86400\n",
        );
    }

    #[test]
    fn test_read_dataset() {
        let dir = tempfile::tempdir().unwrap();
        seed_inputs(dir.path());
        let data = read_dataset(dir.path(), &dir.path().join("config.csv")).unwrap();

        assert_eq!(data.locations.len(), 3);
        assert_eq!(data.chargers.len(), 1);
        assert_eq!(data.vehicles.len(), 1);
        assert_eq!(data.trips.len(), 1);
        assert_eq!(data.maintenances.len(), 2);

        let v = data.vehicle(0);
        assert_eq!(v.kwh_per_1000km, 1250);
        assert!(v.in_rotation);

        // travel matrix resolved by index
        assert_eq!(data.location(0).distance_to(1), Some(10));
        assert_eq!(data.location(1).duration_to(2), Some(300));

        // maintenance 1 is pre-assigned, maintenance 2 is free
        assert_eq!(data.maintenance(0).vehicle, Some(0));
        assert_eq!(data.maintenance(1).vehicle, None);
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_config(&dir.path().join("config.csv")).unwrap_err();
        assert!(matches!(err, RotorError::File(_)));
    }

    #[test]
    fn test_unknown_id_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        seed_inputs(dir.path());
        write(dir.path(), "chargers.csv", "Id,LocationId,Capacity,Volts,Amps\n1,99,2,400,125\n");
        let err = read_dataset(dir.path(), &dir.path().join("config.csv")).unwrap_err();
        assert!(matches!(err, RotorError::Data(_)));
    }
}
