//! # rotor-algo: Branch-and-Price for Electric-Vehicle Rotations
//!
//! The optimisation engine of the rotation planner. Per planning horizon it
//! runs a column-generation loop between a set-partitioning-style master LP
//! and a resource-constrained shortest-path pricing problem, wrapped in a
//! branch-and-price tree search.
//!
//! ## Architecture
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`horizon`] | Rolling window arithmetic and the dense per-horizon view |
//! | [`charging`] | The two charging-strategy oracles |
//! | [`lp`] | Thin HiGHS wrapper (the LP collaborator boundary) |
//! | [`duals`] | Dense dual mirror with the charger-capacity prefix sums |
//! | [`column`] | Candidate vehicle schedules (the LP column payload) |
//! | [`branch`] | Branch decisions, the branch tree node, branching history |
//! | [`labelling`] | Generic label-setting engine for constrained paths |
//! | [`master`] | The restricted master problem |
//! | [`pricing`] | The three interchangeable pricing networks |
//! | [`colgen`] | Column-generation loop and phase-1 feasibility restoration |
//! | [`bnp`] | Strong branching, tree searches, diving, per-horizon driver |
//!
//! The pricing problem is vehicle-parallel: each call snapshots the dual
//! mirror, shuffles the candidate vehicles and prices them on the rayon
//! pool; the master, the LP handle and the branch tree stay on the
//! coordinating thread.

pub mod branch;
pub mod bnp;
pub mod charging;
pub mod colgen;
pub mod column;
pub mod duals;
pub mod horizon;
pub mod labelling;
pub mod lp;
pub mod master;
pub mod pricing;
pub mod test_support;

pub use bnp::solve_planning_horizon;
pub use branch::{Branch, BranchHistory, BranchKind, BranchNode};
pub use charging::{ChargingSession, ChargingStrategy, FixAtEnd, VariableAtEnd};
pub use column::{ChargingLeg, ColumnSchedule};
pub use duals::Duals;
pub use horizon::{HorizonClock, HorizonView};
pub use master::{MasterProblem, MasterStatus};
pub use pricing::{PricingProblem, PricingResult};
