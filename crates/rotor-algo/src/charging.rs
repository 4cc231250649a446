//! Charging-strategy oracles.
//!
//! Given a free interval `[lb, ub]` at a charger, a vehicle and its arriving
//! state of charge, an oracle picks the put-on/take-off slot pair of the
//! session. Two policies exist:
//!
//! - [`FixAtEnd`]: the downstream discharge is known exactly (it equals the
//!   distance of the next work block), so the session is the latest one that
//!   recovers exactly that charge. Used by both segment-based networks;
//!   charging is deterministic and labels need no state-of-charge dimension.
//! - [`VariableAtEnd`]: charge as much as fits, leaving the departing state
//!   of charge free. Used by the time-space network, whose labels dominate
//!   on state of charge.
//!
//! An interval shorter than the put-on + take-off technical times yields
//! "feasible but not charging" (only allowed when no discharge is owed),
//! never a session.

use crate::horizon::HorizonView;
use rotor_core::{num, BatteryKwh, Timestamp};

#[derive(Debug, Clone, Copy, Default)]
pub struct ChargingSession {
    pub put_on: usize,
    pub take_off: usize,
    pub rate_kw_s: f64,
    pub is_charging: bool,
    pub is_feasible: bool,
}

impl ChargingSession {
    /// kWh recovered over the full window between the put-on end and the
    /// take-off start. Callers cap at the vehicle's maximum battery.
    pub fn charge_gain(&self, view: &HorizonView<'_>, charger: usize) -> BatteryKwh {
        let window = view.take_off_node(charger, self.take_off).start_time
            - view.put_on_node(charger, self.put_on).end_time;
        (window as f64 * self.rate_kw_s) as BatteryKwh
    }
}

pub trait ChargingStrategy {
    /// Returns the chosen session for a stay in `[lb, ub]` at `charger`.
    /// `fixed_discharge` is the kWh the vehicle must have recovered when it
    /// leaves (zero when the strategy may charge freely).
    #[allow(clippy::too_many_arguments)]
    fn session(
        &self,
        view: &HorizonView<'_>,
        lb: Timestamp,
        ub: Timestamp,
        vehicle: usize,
        charger: usize,
        prev_soc: BatteryKwh,
        fixed_discharge: BatteryKwh,
    ) -> ChargingSession;
}

fn technical_time(view: &HorizonView<'_>) -> Timestamp {
    (view.data.config.put_vehicle_on_charge + view.data.config.take_vehicle_off_charge) as Timestamp
}

/// See the module docs.
pub struct FixAtEnd;

impl ChargingStrategy for FixAtEnd {
    fn session(
        &self,
        view: &HorizonView<'_>,
        lb: Timestamp,
        ub: Timestamp,
        vehicle: usize,
        charger: usize,
        _prev_soc: BatteryKwh,
        fixed_discharge: BatteryKwh,
    ) -> ChargingSession {
        let mut session = ChargingSession::default();

        if ub - lb >= technical_time(view) {
            session.rate_kw_s = view
                .data
                .vehicle(vehicle)
                .charging_rate_kw_s(view.data.charger(charger));
            if num::approx_eq(session.rate_kw_s, 0.0) {
                return session;
            }

            let Some(take_off) = view.last_take_off_before(charger, ub) else {
                return session;
            };
            let idx_latest_entry = view.next_put_on_after(charger, lb);
            let required_s = (fixed_discharge as f64 / session.rate_kw_s).ceil() as Timestamp;
            let idx_exact_charge = view.last_put_on_before(
                charger,
                view.take_off_node(charger, take_off).start_time - required_s,
            );

            // The latest put-on that still recovers the owed charge; it must
            // not lie before the first slot the vehicle can reach.
            if let (Some(latest_entry), Some(exact)) = (idx_latest_entry, idx_exact_charge) {
                if exact >= latest_entry {
                    session.put_on = exact;
                    session.take_off = take_off;
                    session.is_feasible = true;
                    session.is_charging = take_off > exact;
                }
            }
        } else {
            // Too short to even plug in: only a through-connection with no
            // owed recharge is allowed.
            session.is_charging = false;
            session.is_feasible = fixed_discharge == 0 && lb <= ub;
        }
        session
    }
}

/// See the module docs.
pub struct VariableAtEnd;

impl ChargingStrategy for VariableAtEnd {
    fn session(
        &self,
        view: &HorizonView<'_>,
        lb: Timestamp,
        ub: Timestamp,
        vehicle: usize,
        charger: usize,
        prev_soc: BatteryKwh,
        _fixed_discharge: BatteryKwh,
    ) -> ChargingSession {
        let mut session = ChargingSession::default();

        if ub - lb >= technical_time(view) {
            let v = view.data.vehicle(vehicle);
            session.rate_kw_s = v.charging_rate_kw_s(view.data.charger(charger));
            if num::approx_eq(session.rate_kw_s, 0.0) {
                return session;
            }

            let Some(take_off) = view.last_take_off_before(charger, ub) else {
                return session;
            };
            let idx_latest_entry = view.next_put_on_after(charger, lb);
            let full_charge_s =
                ((v.battery_max_kwh - prev_soc) as f64 / session.rate_kw_s).ceil() as Timestamp;
            let idx_full_charge = view.last_put_on_before(
                charger,
                view.take_off_node(charger, take_off).start_time - full_charge_s,
            );

            // The later of "first reachable slot" and "slot that exactly
            // tops up": anything earlier wastes charger occupancy.
            let put_on = match (idx_latest_entry, idx_full_charge) {
                (Some(entry), Some(full)) => Some(entry.max(full)),
                (Some(entry), None) => Some(entry),
                (None, _) => None,
            };

            if let Some(put_on) = put_on {
                session.put_on = put_on;
                session.take_off = take_off;
                session.is_feasible = true;
                session.is_charging = take_off > put_on;
            }
        } else {
            session.is_charging = false;
            session.is_feasible = lb <= ub;
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizon::{HorizonClock, HorizonView};
    use rotor_core::model::*;
    use rotor_core::{ChargerId, Config, LocationId, ScheduleGraph, VehicleId};

    fn dataset() -> DataSet {
        let mut cfg = Config::default();
        cfg.date_start = 0;
        cfg.date_end = 50_000;
        cfg.charger_capacity_check = 300;
        cfg.put_vehicle_on_charge = 300;
        cfg.take_vehicle_off_charge = 300;

        let mut data = DataSet { config: cfg, ..DataSet::default() };
        data.locations
            .push(Location {
                index: 0,
                id: LocationId::new(1),
                kind: LocationKind::Charger,
                name: "depot".into(),
                travel: vec![TravelMeasure { distance_km: 0, duration_s: 0 }],
            })
            .unwrap();
        data.chargers
            .push(Charger {
                index: 0,
                id: ChargerId::new(1),
                location: 0,
                capacity: 1,
                volts: 400,
                amps: 200,
            })
            .unwrap();
        data.vehicles
            .push(Vehicle {
                index: 0,
                id: VehicleId::new(1),
                battery_min_kwh: 10,
                battery_max_kwh: 100,
                initial_charger: 0,
                initial_start_time: 0,
                initial_soc: 50,
                volts: 400,
                amps: 200,
                number_plate: "EV-1".into(),
                odometer_km: 0,
                odometer_last_maintenance_km: 0,
                in_rotation: true,
                activation_cost: 1.0,
                kwh_per_1000km: 1000,
            })
            .unwrap();
        data
    }

    #[test]
    fn test_short_interval_is_through_connection() {
        let data = dataset();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));

        let s = FixAtEnd.session(&view, 1000, 1400, 0, 0, 50, 0);
        assert!(s.is_feasible);
        assert!(!s.is_charging);

        // With discharge owed, a too-short interval is infeasible.
        let s = FixAtEnd.session(&view, 1000, 1400, 0, 0, 50, 5);
        assert!(!s.is_feasible);

        // Variable strategy never owes a discharge.
        let s = VariableAtEnd.session(&view, 1000, 1400, 0, 0, 50, 0);
        assert!(s.is_feasible);
        assert!(!s.is_charging);
    }

    #[test]
    fn test_fix_at_end_charges_late() {
        let data = dataset();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));

        // A generous interval with a small owed discharge: the session hugs
        // the end of the interval.
        let s = FixAtEnd.session(&view, 0, 30_000, 0, 0, 50, 10);
        assert!(s.is_feasible);
        assert!(s.is_charging);
        assert!(s.take_off > s.put_on);
        // Recovered charge covers the owed discharge.
        assert!(s.charge_gain(&view, 0) >= 10);

        // The chosen take-off is the latest one ending before the interval
        // end; a later put-on would under-charge.
        let later = FixAtEnd.session(&view, 0, 30_000, 0, 0, 50, 40);
        assert!(later.is_charging);
        assert!(later.put_on < s.put_on);
    }

    #[test]
    fn test_variable_at_end_tops_up() {
        let data = dataset();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));

        let s = VariableAtEnd.session(&view, 0, 40_000, 0, 0, 90, 0);
        assert!(s.is_charging);
        // Arriving nearly full: the put-on moves late so the vehicle is not
        // parked on the charger longer than a top-up needs.
        assert!(s.put_on > 0);
        let gain = s.charge_gain(&view, 0).min(100 - 90);
        assert_eq!(gain, 10);
    }

    #[test]
    fn test_incompatible_voltage_refuses() {
        let mut data = dataset();
        data.vehicles.iter_mut().next().unwrap().volts = 800;
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));
        let s = VariableAtEnd.session(&view, 0, 40_000, 0, 0, 50, 0);
        assert!(!s.is_feasible);
    }
}
