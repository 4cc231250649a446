//! Input entities and their id-indexed collections.
//!
//! Every entity carries both its external id (from the CSV files) and a
//! dense `index` into its owning collection; all cross-references inside the
//! planner use the dense indices. The id universe is closed after load, so a
//! lookup by an unknown id is a data error at read time and a logic error
//! afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{RotorError, RotorResult};
use crate::{BatteryKwh, ChargerId, LocationId, MaintenanceId, Timestamp, TripId, VehicleId};

/// One cell of the dense travel matrix. `u32::MAX` marks an unknown pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TravelMeasure {
    pub distance_km: u32,
    pub duration_s: u32,
}

impl TravelMeasure {
    pub const UNREACHABLE: TravelMeasure = TravelMeasure {
        distance_km: u32::MAX,
        duration_s: u32::MAX,
    };

    #[inline]
    pub fn is_reachable(&self) -> bool {
        self.distance_km != u32::MAX
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationKind {
    Undefined,
    Stop,
    Charger,
    Maintenance,
}

impl LocationKind {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "Stop" => LocationKind::Stop,
            "Charger" => LocationKind::Charger,
            "Maintenance" => LocationKind::Maintenance,
            _ => LocationKind::Undefined,
        }
    }
}

/// A physical place with its row of the travel matrix. Immutable after load.
#[derive(Debug, Clone)]
pub struct Location {
    pub index: usize,
    pub id: LocationId,
    pub kind: LocationKind,
    pub name: String,
    /// Dense row of travel measures to every other location, by index.
    pub travel: Vec<TravelMeasure>,
}

impl Location {
    #[inline]
    pub fn distance_to(&self, other: usize) -> Option<u32> {
        let m = self.travel[other];
        m.is_reachable().then_some(m.distance_km)
    }

    #[inline]
    pub fn duration_to(&self, other: usize) -> Option<u32> {
        let m = self.travel[other];
        m.is_reachable().then_some(m.duration_s)
    }
}

#[derive(Debug, Clone)]
pub struct Charger {
    pub index: usize,
    pub id: ChargerId,
    /// Index into [`DataSet::locations`].
    pub location: usize,
    /// Simultaneous-occupancy capacity.
    pub capacity: u32,
    pub volts: i32,
    pub amps: i32,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub index: usize,
    pub id: VehicleId,
    pub battery_min_kwh: BatteryKwh,
    pub battery_max_kwh: BatteryKwh,
    /// Index into [`DataSet::chargers`].
    pub initial_charger: usize,
    pub initial_start_time: Timestamp,
    pub initial_soc: BatteryKwh,
    pub volts: i32,
    pub amps: i32,
    pub number_plate: String,
    pub odometer_km: u32,
    pub odometer_last_maintenance_km: u32,
    pub in_rotation: bool,
    pub activation_cost: f64,
    /// Consumption, kWh per 1000 km (input kWh/km times 1000, rounded).
    pub kwh_per_1000km: i32,
}

impl Vehicle {
    /// Metres the vehicle can travel on a full usable battery.
    #[inline]
    pub fn distance_range_km(&self) -> u32 {
        (((self.battery_max_kwh - self.battery_min_kwh) as i64 * 1000) / self.kwh_per_1000km as i64)
            as u32
    }

    /// kWh drawn by driving `distance_km` kilometres.
    #[inline]
    pub fn battery_discharge(&self, distance_km: u32) -> BatteryKwh {
        ((distance_km as i64 * self.kwh_per_1000km as i64) / 1000) as BatteryKwh
    }

    /// Per-second charging rate at `charger`, in kW·s. A charger with lower
    /// voltage than the vehicle refuses the vehicle (rate zero).
    #[inline]
    pub fn charging_rate_kw_s(&self, charger: &Charger) -> f64 {
        if self.volts <= charger.volts {
            (self.volts as f64 * self.amps.min(charger.amps) as f64) / 3_600_000.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub index: usize,
    pub id: TripId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub start_location: usize,
    pub end_location: usize,
    pub line_id: u32,
}

#[derive(Debug, Clone)]
pub struct Maintenance {
    pub index: usize,
    pub id: MaintenanceId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub location: usize,
    /// Pre-assigned vehicle, if any (dense index).
    pub vehicle: Option<usize>,
}

impl Maintenance {
    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.vehicle.is_some()
    }
}

macro_rules! id_collection {
    ($coll:ident, $item:ident, $id:ident) => {
        /// Owned, append-only collection with an id→index map.
        #[derive(Debug, Clone, Default)]
        pub struct $coll {
            vec: Vec<$item>,
            by_id: HashMap<$id, usize>,
        }

        impl $coll {
            pub fn push(&mut self, item: $item) -> RotorResult<()> {
                if self.by_id.insert(item.id, item.index).is_some() {
                    return Err(RotorError::Data(format!(
                        concat!("duplicate ", stringify!($item), " id {}"),
                        item.id.value()
                    )));
                }
                self.vec.push(item);
                Ok(())
            }

            #[inline]
            pub fn get(&self, index: usize) -> &$item {
                &self.vec[index]
            }

            pub fn index_of(&self, id: $id) -> RotorResult<usize> {
                self.by_id.get(&id).copied().ok_or_else(|| {
                    RotorError::Data(format!(
                        concat!("unknown ", stringify!($item), " id {}"),
                        id.value()
                    ))
                })
            }

            #[inline]
            pub fn iter(&self) -> std::slice::Iter<'_, $item> {
                self.vec.iter()
            }

            #[inline]
            pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, $item> {
                self.vec.iter_mut()
            }

            #[inline]
            pub fn len(&self) -> usize {
                self.vec.len()
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.vec.is_empty()
            }
        }
    };
}

id_collection!(Locations, Location, LocationId);
id_collection!(Chargers, Charger, ChargerId);
id_collection!(Vehicles, Vehicle, VehicleId);
id_collection!(Trips, Trip, TripId);
id_collection!(Maintenances, Maintenance, MaintenanceId);

/// The complete immutable input of one run.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    pub locations: Locations,
    pub chargers: Chargers,
    pub vehicles: Vehicles,
    pub trips: Trips,
    pub maintenances: Maintenances,
    pub config: Config,
}

impl DataSet {
    #[inline]
    pub fn location(&self, index: usize) -> &Location {
        self.locations.get(index)
    }

    #[inline]
    pub fn charger(&self, index: usize) -> &Charger {
        self.chargers.get(index)
    }

    #[inline]
    pub fn vehicle(&self, index: usize) -> &Vehicle {
        self.vehicles.get(index)
    }

    #[inline]
    pub fn trip(&self, index: usize) -> &Trip {
        self.trips.get(index)
    }

    #[inline]
    pub fn maintenance(&self, index: usize) -> &Maintenance {
        self.maintenances.get(index)
    }

    /// Finds the charger stationed at `location`, if any.
    pub fn charger_at_location(&self, location: usize) -> Option<usize> {
        self.chargers.iter().find(|c| c.location == location).map(|c| c.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(index: usize, id: u32) -> Location {
        Location {
            index,
            id: LocationId::new(id),
            kind: LocationKind::Stop,
            name: format!("L{id}"),
            travel: Vec::new(),
        }
    }

    #[test]
    fn test_collection_id_lookup() {
        let mut locations = Locations::default();
        locations.push(location(0, 10)).unwrap();
        locations.push(location(1, 20)).unwrap();
        assert_eq!(locations.index_of(LocationId::new(20)).unwrap(), 1);
        assert!(locations.index_of(LocationId::new(99)).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut locations = Locations::default();
        locations.push(location(0, 10)).unwrap();
        assert!(locations.push(location(1, 10)).is_err());
    }

    #[test]
    fn test_vehicle_derived_quantities() {
        let v = Vehicle {
            index: 0,
            id: VehicleId::new(1),
            battery_min_kwh: 20,
            battery_max_kwh: 220,
            initial_charger: 0,
            initial_start_time: 0,
            initial_soc: 120,
            volts: 400,
            amps: 150,
            number_plate: "EV-1".into(),
            odometer_km: 0,
            odometer_last_maintenance_km: 0,
            in_rotation: true,
            activation_cost: 100.0,
            kwh_per_1000km: 1_250, // 1.25 kWh per km
        };
        // (220-20)*1000/1250 = 160 km
        assert_eq!(v.distance_range_km(), 160);
        assert_eq!(v.battery_discharge(10), 12);

        let charger = Charger {
            index: 0,
            id: ChargerId::new(1),
            location: 0,
            capacity: 2,
            volts: 400,
            amps: 120,
        };
        // 400 V * min(150, 120) A / 3.6e6
        assert!((v.charging_rate_kw_s(&charger) - 400.0 * 120.0 / 3_600_000.0).abs() < 1e-12);

        let weak = Charger { volts: 230, ..charger.clone() };
        assert_eq!(v.charging_rate_kw_s(&weak), 0.0);
    }
}
