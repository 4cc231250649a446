//! The column-generation loop and the phase-1 feasibility restoration.
//!
//! Per branch node: solve the master, try the column pool, otherwise price,
//! insert, re-solve; keep the Lagrangian lower bound whenever pricing ran to
//! proven exhaustion. On convergence check the charger capacities; a
//! violation materialises lazy rows and resumes the loop. An infeasible
//! master triggers the auxiliary phase, which minimises the violation of
//! the branch-fixed structural variables under cost-free pricing; only if
//! the violation cannot be driven to zero is the branch node truly
//! infeasible.

use std::time::{Duration, Instant};

use crate::branch::BranchNode;
use crate::horizon::HorizonView;
use crate::master::{MasterProblem, MasterStatus};
use crate::pricing::PricingProblem;
use rotor_core::stats::{PerformanceDetail, RunStats};
use rotor_core::{num, RotorError, RotorResult, Solution};

#[derive(Debug, Clone, Copy)]
pub struct ColGenOutcome {
    pub lb: f64,
    /// False when phase-1 proved the branch node infeasible.
    pub feasible: bool,
}

fn cg_deadline(view: &HorizonView<'_>, horizon_deadline: Instant) -> Instant {
    (Instant::now() + Duration::from_secs(view.data.config.column_generation_timelimit as u64))
        .min(horizon_deadline)
}

/// Runs phase-1 on an infeasible master. Returns whether feasibility was
/// restored; the master is returned to its pre-phase state either way
/// (objective and structural bounds).
pub fn aux_column_generation(
    view: &HorizonView<'_>,
    node: &BranchNode,
    mp: &mut MasterProblem<'_>,
    pp: &mut PricingProblem<'_>,
    horizon_deadline: Instant,
    stats: &mut RunStats,
) -> RotorResult<bool> {
    let clock = Instant::now();
    let deadline = cg_deadline(view, horizon_deadline);

    let saved_bounds = mp.bounds_snapshot();
    mp.set_auxiliary_objective();
    mp.set_aux_variable_bounds();

    let mut columns_added = u32::MAX;
    let mut capacity_feasible = false;
    let mut iteration = 0u32;

    while columns_added > 0 || !capacity_feasible {
        iteration += 1;

        if !mp.solve()? {
            return Err(RotorError::Logic(
                "the auxiliary master must always be feasible".into(),
            ));
        }
        if Instant::now() >= deadline {
            break;
        }

        // Pool first; pricing only when the pool yields nothing. Phase-1
        // prices on duals alone, without cost coefficients.
        let mut added = mp.add_pool_columns(node, false);
        if added.count == 0 {
            let priced =
                pp.find_negative_columns(mp.duals(), node, false, false, true, deadline)?;
            added = mp.add_schedule_columns(priced.schedules, false);
        }
        columns_added = added.count;

        if columns_added == 0 {
            capacity_feasible = mp.check_and_update_charger_capacity(true);
            if !capacity_feasible && !mp.solve()? {
                return Err(RotorError::Logic(
                    "auxiliary master became infeasible after adding capacity rows".into(),
                ));
            }
        }
    }

    // Restore the master and judge the outcome.
    let _ = mp.check_and_update_charger_capacity(false);
    let restored = mp.check_aux_variables_feasible(&saved_bounds);
    mp.reset_objective();
    mp.restore_variable_bounds(&saved_bounds);

    stats.performance.push(PerformanceDetail {
        index_planning_horizon: view.horizon.index,
        index_branching_node: node.index,
        branch_kind: "AUX_COLUMN_GENERATION".into(),
        iteration,
        time_aux_cg_ms: clock.elapsed().as_millis() as i64,
        ..PerformanceDetail::default()
    });
    tracing::debug!(restored, iteration, "auxiliary column generation finished");
    Ok(restored)
}

/// One full column generation at `node`. Captures improving integer
/// incumbents into `incumbent` on the fly (only when charger-capacity
/// clean).
#[allow(clippy::too_many_arguments)]
pub fn column_generation(
    view: &HorizonView<'_>,
    node: &BranchNode,
    mp: &mut MasterProblem<'_>,
    pp: &mut PricingProblem<'_>,
    incumbent: &mut Solution,
    lb_integer: f64,
    is_root: bool,
    convergence_tolerance: f64,
    horizon_deadline: Instant,
    stats: &mut RunStats,
) -> RotorResult<ColGenOutcome> {
    let deadline = cg_deadline(view, horizon_deadline);
    let mut outcome = ColGenOutcome { lb: node.lower_bound, feasible: false };
    let mut current_lb = node.lower_bound;

    // Initial solve to seed the duals; infeasibility goes through phase-1.
    if !mp.solve()? {
        if aux_column_generation(view, node, mp, pp, deadline, stats)? {
            if !mp.solve()? {
                return Err(RotorError::Logic(
                    "master stayed infeasible after a successful phase-1".into(),
                ));
            }
        } else {
            return Ok(outcome);
        }
    }

    let mut detail = PerformanceDetail {
        index_planning_horizon: view.horizon.index,
        index_branching_node: node.index,
        lb_integer,
        lb_relaxed: node.lower_bound,
        ub_relaxed: mp.objective(),
        ub_integer: incumbent.objective,
        ..PerformanceDetail::default()
    };

    capture_integer(mp, incumbent, &mut detail);
    stats.performance.push(detail.clone());

    let mut keep_iterating;
    let mut capacity_feasible = false;
    loop {
        detail.iteration += 1;

        // Pricing everything periodically keeps the Lagrangian bound
        // honest; an incumbent cheaper than the master makes it mandatory
        // (only an exhaustive round can prune this node).
        let solve_all = (view.data.config.interim_solve_all_vehicles
            && detail.iteration % view.data.config.nth_iter_solve_all.max(1) == 0)
            || num::lt(incumbent.objective, mp.objective());

        let mut added = mp.add_pool_columns(node, true);
        if added.count == 0 {
            let priced =
                pp.find_negative_columns(mp.duals(), node, true, false, solve_all, deadline)?;
            added = mp.add_schedule_columns(priced.schedules, true);
            if priced.is_optimal {
                current_lb = added.lb;
            }
        }

        if !mp.solve()? {
            if aux_column_generation(view, node, mp, pp, deadline, stats)? {
                if !mp.solve()? {
                    return Err(RotorError::Logic(
                        "master stayed infeasible after a successful phase-1".into(),
                    ));
                }
            } else {
                return Ok(outcome);
            }
        }

        capture_integer(mp, incumbent, &mut detail);

        detail.columns_added = added.count;
        if is_root {
            detail.lb_integer = detail.lb_integer.max(current_lb);
        }
        detail.lb_relaxed = detail.lb_relaxed.max(current_lb);
        detail.ub_relaxed = mp.objective();
        outcome.lb = outcome.lb.max(current_lb);

        // The relaxed lower bound may exceed the master objective when the
        // node is heading for capacity cuts; the loop below settles it.
        keep_iterating = added.count > 0
            && num::lt(detail.lb_relaxed, detail.ub_relaxed)
            && num::lt(convergence_tolerance, detail.gap_relaxed())
            && num::lt(detail.lb_relaxed, incumbent.objective)
            && Instant::now() < deadline;

        if !keep_iterating {
            capacity_feasible = mp.check_and_update_charger_capacity(true);
            if !capacity_feasible {
                detail.lazy_constraint_added = Some("CSTRS_CHARGER_CAPACITY_ADDED".into());
                if !mp.solve()? {
                    if aux_column_generation(view, node, mp, pp, deadline, stats)? {
                        if !mp.solve()? {
                            return Err(RotorError::Logic(
                                "master stayed infeasible after a successful phase-1".into(),
                            ));
                        }
                    } else {
                        return Ok(outcome);
                    }
                }
            }
        }

        detail.ub_relaxed = mp.objective();
        detail.mp_size_variables = mp.num_cols();
        detail.mp_size_constraints = mp.num_rows();
        detail.pp_network_size_nodes = pp.network_nodes();
        detail.pp_network_size_arcs = pp.network_arcs();
        detail.time_mp_solver_ms = mp.ms_solver;
        detail.time_pp_solver_ms = pp.ms_solver;
        detail.pp_network_construction_ms = pp.ms_network_construction;
        stats.performance.push(detail.clone());
        detail.lazy_constraint_added = None;

        if !keep_iterating && capacity_feasible {
            break;
        }
    }

    outcome.feasible = true;
    Ok(outcome)
}

fn capture_integer(
    mp: &MasterProblem<'_>,
    incumbent: &mut Solution,
    detail: &mut PerformanceDetail,
) {
    if mp.status() == MasterStatus::Integer
        && num::lt(mp.objective(), incumbent.objective)
        && mp.capacity_satisfied()
    {
        *incumbent = mp.current_solution();
        detail.integer_found = true;
        detail.ub_integer = incumbent.objective;
        tracing::info!(
            lb = detail.lb_integer,
            ub = detail.ub_integer,
            "improving integer solution"
        );
        return;
    }
    detail.integer_found = false;
}
