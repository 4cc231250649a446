//! Run configuration.
//!
//! All parameters, bounds and cost coefficients of the optimiser live here
//! with their defaults. Keys can be overridden from the `config` CSV; key
//! matching is case-insensitive (everything is lower-cased on ingest), and
//! each row declares its datatype (`uint`, `double`, `datetime`, `string`,
//! `bool`). Three keys are mandatory: `date_start`, `date_end` and
//! `const_planning_horizon_length`.

use crate::error::{RotorError, RotorResult};
use crate::{time, Timestamp, MAX_TIMESTAMP};

/// Which outer algorithm the per-horizon solver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    PriceAndBranch,
    BranchAndPriceBest,
    BranchAndPriceDepth,
    DivingHeuristic,
    DivingThenBestFirst,
    DivingThenDepthFirst,
}

impl AlgorithmKind {
    pub fn from_code(code: u32) -> RotorResult<Self> {
        match code {
            0 => Ok(AlgorithmKind::PriceAndBranch),
            1 => Ok(AlgorithmKind::BranchAndPriceBest),
            2 => Ok(AlgorithmKind::BranchAndPriceDepth),
            3 => Ok(AlgorithmKind::DivingHeuristic),
            4 => Ok(AlgorithmKind::DivingThenBestFirst),
            5 => Ok(AlgorithmKind::DivingThenDepthFirst),
            other => Err(RotorError::Config(format!(
                "unknown algorithm code {other} (expected 0..=5)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmKind::PriceAndBranch => "Price-and-Branch",
            AlgorithmKind::BranchAndPriceBest => "Branch-and-Price (Best-First)",
            AlgorithmKind::BranchAndPriceDepth => "Branch-and-Price (Depth-First)",
            AlgorithmKind::DivingHeuristic => "Trunc. CG",
            AlgorithmKind::DivingThenBestFirst => "Trunc. CG -> Branch-and-Price (Best-First)",
            AlgorithmKind::DivingThenDepthFirst => "Trunc. CG -> Branch-and-Price (Depth-First)",
        }
    }
}

/// Which pricing-problem network formulation generates columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingKind {
    TimeSpace,
    SegmentConnection,
    SegmentCentralised,
}

impl PricingKind {
    pub fn from_code(code: u32) -> RotorResult<Self> {
        match code {
            0 => Ok(PricingKind::TimeSpace),
            1 => Ok(PricingKind::SegmentConnection),
            2 => Ok(PricingKind::SegmentCentralised),
            other => Err(RotorError::Config(format!(
                "unknown pricing problem code {other} (expected 0..=2)"
            ))),
        }
    }
}

/// Typed configuration with defaults; see the module docs for the override
/// mechanism.
#[derive(Debug, Clone)]
pub struct Config {
    // Planning interval (mandatory)
    pub date_start: Timestamp,
    pub date_end: Timestamp,

    // Termination gaps
    pub linear_optimality_gap: f64,
    pub integer_optimality_gap: f64,
    pub frac_threshold_trunc_cg: f64,

    // Technical times around a charging session, seconds
    pub put_vehicle_on_charge: u32,
    pub take_vehicle_off_charge: u32,

    // Rolling window, seconds
    pub planning_horizon_length: u32,
    pub planning_horizon_overlap: u32,
    /// Quantisation of charger time (seconds); one put-on/take-off slot pair
    /// per step.
    pub charger_capacity_check: u32,

    pub nr_threads: u32,
    pub column_generation_timelimit: u32,
    pub branch_and_price_timelimit: u32,
    /// Per-vehicle label cap / column cap per pricing iteration.
    pub nr_cols_per_vehicle_iter: u32,
    pub nth_iter_solve_all: u32,
    pub nth_branching_node_dive: u32,
    pub max_number_cols_mp: u32,
    pub max_number_cols_mp_pool: u32,
    pub max_number_first_tier_eval_strong_branching: u32,
    pub max_number_second_tier_eval_strong_branching: u32,

    pub algorithm: AlgorithmKind,
    pub pricing: PricingKind,

    pub minimise_number_vehicles: bool,
    pub use_model_cleanup: bool,
    pub interim_solve_all_vehicles: bool,
    pub allow_deadlegs: bool,
    pub terminate_after_root: bool,

    // Objective weights
    pub cost_deadleg_fix: f64,
    pub cost_deadleg_per_km: f64,
    pub cost_coefficient_penalty_maintenance: f64,
    pub cost_uncovered_trip: f64,
    pub cost_exceeding_charger_capacity: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            date_start: MAX_TIMESTAMP,
            date_end: MAX_TIMESTAMP,
            linear_optimality_gap: 0.0001,
            integer_optimality_gap: 0.001,
            frac_threshold_trunc_cg: 0.9,
            put_vehicle_on_charge: 5 * 60,
            take_vehicle_off_charge: 5 * 60,
            planning_horizon_length: 24 * 60 * 60,
            planning_horizon_overlap: 0,
            charger_capacity_check: 300,
            nr_threads: 4,
            column_generation_timelimit: 900,
            branch_and_price_timelimit: 5400,
            nr_cols_per_vehicle_iter: 40,
            nth_iter_solve_all: 10,
            nth_branching_node_dive: 10,
            max_number_cols_mp: 5000,
            max_number_cols_mp_pool: 10_000,
            max_number_first_tier_eval_strong_branching: 50,
            max_number_second_tier_eval_strong_branching: 25,
            algorithm: AlgorithmKind::DivingThenBestFirst,
            pricing: PricingKind::SegmentCentralised,
            minimise_number_vehicles: true,
            use_model_cleanup: true,
            interim_solve_all_vehicles: true,
            allow_deadlegs: true,
            terminate_after_root: false,
            cost_deadleg_fix: 5.0,
            cost_deadleg_per_km: 2.0,
            cost_coefficient_penalty_maintenance: 0.05,
            cost_uncovered_trip: 2000.0,
            cost_exceeding_charger_capacity: 20_000.0,
        }
    }
}

fn parse_uint(key: &str, value: &str) -> RotorResult<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|e| RotorError::Config(format!("key '{key}': invalid uint '{value}': {e}")))
}

fn parse_double(key: &str, value: &str) -> RotorResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| RotorError::Config(format!("key '{key}': invalid double '{value}': {e}")))
}

/// `true`/`1` in any case parse as true, everything else as false.
pub fn parse_bool(value: &str) -> bool {
    let v = value.trim();
    v.eq_ignore_ascii_case("true") || v == "1"
}

impl Config {
    /// Applies a single `(key, datatype, value)` row from the config file.
    /// Unknown keys are ignored with a warning so configs can carry keys for
    /// other tools.
    pub fn apply(&mut self, key: &str, datatype: &str, value: &str) -> RotorResult<()> {
        let key = key.trim().to_ascii_lowercase();
        match key.as_str() {
            "date_start" => self.date_start = time::parse_datetime(value)?,
            "date_end" => self.date_end = time::parse_datetime(value)?,
            "const_linear_optimality_gap" => self.linear_optimality_gap = parse_double(&key, value)?,
            "const_integer_optimality_gap" => {
                self.integer_optimality_gap = parse_double(&key, value)?
            }
            "const_frac_threshold_trunc_cg" => {
                self.frac_threshold_trunc_cg = parse_double(&key, value)?
            }
            "const_put_vehicle_on_charge" => self.put_vehicle_on_charge = parse_uint(&key, value)?,
            "const_take_vehicle_off_charge" => {
                self.take_vehicle_off_charge = parse_uint(&key, value)?
            }
            "const_planning_horizon_length" => {
                self.planning_horizon_length = parse_uint(&key, value)?
            }
            "const_planning_horizon_overlap" => {
                self.planning_horizon_overlap = parse_uint(&key, value)?
            }
            "const_charger_capacity_check" => self.charger_capacity_check = parse_uint(&key, value)?,
            "const_nr_threads" => self.nr_threads = parse_uint(&key, value)?,
            "const_column_generation_timelimit" => {
                self.column_generation_timelimit = parse_uint(&key, value)?
            }
            "const_branch_and_price_timelimit" => {
                self.branch_and_price_timelimit = parse_uint(&key, value)?
            }
            "const_nr_cols_per_vehicle_iter" => {
                self.nr_cols_per_vehicle_iter = parse_uint(&key, value)?
            }
            "const_nth_iter_solve_all" => self.nth_iter_solve_all = parse_uint(&key, value)?,
            "const_nth_branching_node_dive" => {
                self.nth_branching_node_dive = parse_uint(&key, value)?
            }
            "const_max_number_cols_mp" => self.max_number_cols_mp = parse_uint(&key, value)?,
            "const_max_number_cols_mp_pool" => {
                self.max_number_cols_mp_pool = parse_uint(&key, value)?
            }
            "const_max_number_first_tier_eval_strong_branching" => {
                self.max_number_first_tier_eval_strong_branching = parse_uint(&key, value)?
            }
            "const_max_number_second_tier_eval_strong_branching" => {
                self.max_number_second_tier_eval_strong_branching = parse_uint(&key, value)?
            }
            "const_code_algorithm_type" => {
                self.algorithm = AlgorithmKind::from_code(parse_uint(&key, value)?)?
            }
            "const_code_pricing_problem_type" => {
                self.pricing = PricingKind::from_code(parse_uint(&key, value)?)?
            }
            "flag_minimise_number_vehicles" => self.minimise_number_vehicles = parse_bool(value),
            "flag_use_model_cleanup" => self.use_model_cleanup = parse_bool(value),
            "flag_interim_solve_all_vehicles" => {
                self.interim_solve_all_vehicles = parse_bool(value)
            }
            "flag_allow_deadlegs" => self.allow_deadlegs = parse_bool(value),
            "flag_terminate_after_root" => self.terminate_after_root = parse_bool(value),
            "cost_deadleg_fix" => self.cost_deadleg_fix = parse_double(&key, value)?,
            "cost_deadleg_per_km" => self.cost_deadleg_per_km = parse_double(&key, value)?,
            "cost_coefficient_penalty_maintenance" => {
                self.cost_coefficient_penalty_maintenance = parse_double(&key, value)?
            }
            "cost_uncovered_trip" => self.cost_uncovered_trip = parse_double(&key, value)?,
            "cost_exceeding_charger_capacity" => {
                self.cost_exceeding_charger_capacity = parse_double(&key, value)?
            }
            _ => {
                tracing::warn!(key = %key, datatype = %datatype, "ignoring unknown config key");
            }
        }
        Ok(())
    }

    /// Checks that the mandatory keys were supplied.
    pub fn validate(&self) -> RotorResult<()> {
        if self.date_start == MAX_TIMESTAMP {
            return Err(RotorError::Config("missing mandatory key 'date_start'".into()));
        }
        if self.date_end == MAX_TIMESTAMP {
            return Err(RotorError::Config("missing mandatory key 'date_end'".into()));
        }
        if self.date_end < self.date_start {
            return Err(RotorError::Config("date_end lies before date_start".into()));
        }
        if self.planning_horizon_length == 0 {
            return Err(RotorError::Config(
                "const_planning_horizon_length must be positive".into(),
            ));
        }
        if self.charger_capacity_check == 0 {
            return Err(RotorError::Config(
                "const_charger_capacity_check must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_dates() {
        let cfg = Config::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_apply_and_validate() {
        let mut cfg = Config::default();
        cfg.apply("DATE_START", "datetime", "2023-05-01 00:00:00").unwrap();
        cfg.apply("date_end", "datetime", "2023-05-03 00:00:00").unwrap();
        cfg.apply("const_planning_horizon_length", "uint", "43200").unwrap();
        cfg.apply("flag_allow_deadlegs", "bool", "FALSE").unwrap();
        cfg.apply("cost_uncovered_trip", "double", "1234.5").unwrap();
        cfg.apply("const_code_pricing_problem_type", "uint", "0").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.planning_horizon_length, 43_200);
        assert!(!cfg.allow_deadlegs);
        assert_eq!(cfg.cost_uncovered_trip, 1234.5);
        assert_eq!(cfg.pricing, PricingKind::TimeSpace);
    }

    #[test]
    fn test_unknown_key_is_ignored() {
        let mut cfg = Config::default();
        cfg.apply("some_future_key", "string", "x").unwrap();
    }

    #[test]
    fn test_bool_parsing() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn test_bad_code_rejected() {
        let mut cfg = Config::default();
        assert!(cfg.apply("const_code_algorithm_type", "uint", "9").is_err());
    }
}
