//! The branch-and-price driver.
//!
//! Strong branching with a two-tier evaluation (LP-only screening, then
//! heuristic column generation on the shortlist), best-first and depth-first
//! tree searches, the truncated-column-generation diving heuristic, the
//! price-and-branch shortcut, the per-horizon driver and the schedule
//! trimmer. Pruning is by optimality (node lb reaching the incumbent), by
//! bounds and by phase-1-confirmed infeasibility.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::branch::{Branch, BranchHistory, BranchKind, BranchNode};
use crate::colgen::column_generation;
use crate::horizon::HorizonView;
use crate::master::{MasterProblem, MasterStatus};
use crate::pricing::PricingProblem;
use rotor_core::stats::{PerformanceDetail, PlanningHorizonStats, RunStats};
use rotor_core::{num, ActivityKind, AlgorithmKind, RotorResult, Solution};

// ---------------------------------------------------------------------
// Heap wrappers (f64 keys)

struct ScoredBranch(Branch);

impl PartialEq for ScoredBranch {
    fn eq(&self, other: &Self) -> bool {
        self.0.score == other.0.score
    }
}
impl Eq for ScoredBranch {}
impl PartialOrd for ScoredBranch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScoredBranch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.score.total_cmp(&other.0.score)
    }
}

/// Max-heap entry yielding the node with the *smallest* lower bound first.
struct OpenNode(BranchNode);

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.0.lower_bound == other.0.lower_bound
    }
}
impl Eq for OpenNode {}
impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.lower_bound.total_cmp(&self.0.lower_bound)
    }
}

fn branch_detail(view: &HorizonView<'_>, node: &BranchNode, branch: &Branch) -> PerformanceDetail {
    PerformanceDetail {
        index_planning_horizon: view.horizon.index,
        index_branching_node: node.index,
        branch_kind: branch.kind.name().into(),
        branch_value: Some(branch.value),
        fractional_value: Some(branch.fractional),
        ..PerformanceDetail::default()
    }
}

// ---------------------------------------------------------------------
// Strong branching

/// Two-tier strong branching. The first tier screens candidates with pure
/// LP re-solves (no pricing); the shortlist is re-evaluated with heuristic
/// column generation and the branch maximising `min(Δleft, Δright)` wins.
#[allow(clippy::too_many_arguments)]
fn strong_branch(
    view: &HorizonView<'_>,
    history: &mut BranchHistory,
    mp: &mut MasterProblem<'_>,
    pp: &mut PricingProblem<'_>,
    incumbent: &mut Solution,
    ph_stats: &mut PlanningHorizonStats,
    parent: &BranchNode,
    deadline: Instant,
    stats: &mut RunStats,
) -> RotorResult<Branch> {
    let clock = Instant::now();
    let config = &view.data.config;
    let mut candidates = parent.options.clone();

    if candidates.len() > config.max_number_first_tier_eval_strong_branching as usize {
        // Half the budget goes to historically strong branch identities,
        // the rest to the most fractional ones.
        candidates.sort_by(|l, r| history.mean_score(l).total_cmp(&history.mean_score(r)));
        let by_history = (config.max_number_first_tier_eval_strong_branching / 2) as usize;
        let mut shortlist = Vec::new();
        for _ in 0..by_history {
            match candidates.last() {
                Some(best) if num::lt(0.0, history.mean_score(best)) => {
                    shortlist.push(candidates.pop().expect("nonempty"));
                }
                _ => break,
            }
        }
        candidates.sort_by(Branch::cmp_most_fractional);
        let fill = config.max_number_first_tier_eval_strong_branching as usize - shortlist.len();
        let keep_from = candidates.len().saturating_sub(fill);
        shortlist.extend(candidates.drain(keep_from..));
        candidates = shortlist;
    }

    // First tier: LP-only closure estimate per candidate.
    let mut heap: BinaryHeap<ScoredBranch> = BinaryHeap::new();
    for mut candidate in candidates {
        let mut score = f64::INFINITY;
        for value in [candidate.fractional.floor(), candidate.fractional.ceil()] {
            let mut side = candidate.clone();
            side.value = value;
            let child = BranchNode::child(ph_stats.branching_tree_size as usize, parent, side, view);
            mp.filter_vars(&child);
            mp.solve()?;
            if matches!(mp.status(), MasterStatus::Fractional | MasterStatus::Integer) {
                score = score.min(mp.objective() - parent.lower_bound);
            }
        }
        candidate.score = score;
        heap.push(ScoredBranch(candidate));
    }

    let mut strongest = heap
        .peek()
        .map(|s| s.0.clone())
        .unwrap_or_else(|| parent.options.last().cloned().expect("options nonempty"));
    let mut strongest_score = 0.0;

    // Second tier: heuristic column generation on the shortlist, best
    // first; the sorted heap lets us stop at the first non-improver.
    let mut evaluations = 0;
    while evaluations < config.max_number_second_tier_eval_strong_branching {
        let Some(ScoredBranch(candidate)) = heap.pop() else {
            break;
        };
        if !num::lt(strongest_score, candidate.score) {
            break;
        }

        let mut score = f64::INFINITY;
        for value in [candidate.fractional.floor(), candidate.fractional.ceil()] {
            let mut side = candidate.clone();
            side.value = value;
            let child = BranchNode::child(ph_stats.branching_tree_size as usize, parent, side, view);
            mp.filter_vars(&child);
            pp.update_node_access(&child);

            let lb_integer = child.lower_bound;
            let outcome = column_generation(
                view,
                &child,
                mp,
                pp,
                incumbent,
                lb_integer,
                false,
                config.linear_optimality_gap,
                deadline,
                stats,
            )?;
            if outcome.feasible {
                score = score.min(mp.objective() - parent.lower_bound);
            }
        }

        if score.is_finite() {
            let mut scored = candidate.clone();
            scored.score = score;
            history.update(&scored);
        }
        if num::lt(strongest_score, score) {
            strongest_score = score;
            strongest = candidate;
        }
        evaluations += 1;
    }

    stats.performance.push(PerformanceDetail {
        index_planning_horizon: view.horizon.index,
        index_branching_node: parent.index,
        branch_kind: "STRONG_BRANCHING".into(),
        time_strong_branch_ms: clock.elapsed().as_millis() as i64,
        ..PerformanceDetail::default()
    });
    Ok(strongest)
}

// ---------------------------------------------------------------------
// Tree searches

#[allow(clippy::too_many_arguments)]
fn best_first(
    view: &HorizonView<'_>,
    history: &mut BranchHistory,
    deadline: Instant,
    mp: &mut MasterProblem<'_>,
    pp: &mut PricingProblem<'_>,
    root: BranchNode,
    incumbent: &mut Solution,
    ph_stats: &mut PlanningHorizonStats,
    stats: &mut RunStats,
) -> RotorResult<()> {
    let config = &view.data.config;
    let root_depth = root.branches.len();
    let mut queue: BinaryHeap<OpenNode> = BinaryHeap::new();
    queue.push(OpenNode(root));

    while let Some(OpenNode(parent)) = queue.pop() {
        if Instant::now() > deadline {
            break;
        }
        if !parent.options.is_empty() {
            let chosen =
                strong_branch(view, history, mp, pp, incumbent, ph_stats, &parent, deadline, stats)?;

            for value in [chosen.fractional.floor(), chosen.fractional.ceil()] {
                let mut side = chosen.clone();
                side.value = value;
                ph_stats.branching_tree_size += 1;
                let mut child =
                    BranchNode::child(ph_stats.branching_tree_size as usize, &parent, side.clone(), view);

                let mut detail = branch_detail(view, &child, &side);
                detail.index_parent_branching_node = Some(parent.index);
                stats.performance.push(detail);

                mp.filter_vars(&child);
                pp.update_node_access(&child);

                let lb_integer = child.lower_bound;
                let outcome = column_generation(
                    view, &child, mp, pp, incumbent, lb_integer, false, 0.0, deadline, stats,
                )?;

                if !outcome.feasible {
                    // Pruned by phase-1-confirmed infeasibility.
                    continue;
                }
                child.store_options_for_branching(mp.branch_options());
                child.lower_bound = outcome.lb;

                ph_stats.ub_integer = incumbent.objective;
                ph_stats.branching_tree_depth = ph_stats
                    .branching_tree_depth
                    .max(1 + (child.branches.len() - root_depth) as u32);

                if num::lt(child.lower_bound, incumbent.objective) {
                    // Periodic truncated dive for quick primal progress.
                    if config.nth_branching_node_dive > 0
                        && child.index % config.nth_branching_node_dive as usize == 0
                    {
                        let saved_size = ph_stats.branching_tree_size;
                        let saved_depth = ph_stats.branching_tree_depth;
                        truncated_column_generation(
                            view, deadline, mp, pp, &child, incumbent, ph_stats, stats,
                        )?;
                        ph_stats.branching_tree_size = saved_size;
                        ph_stats.branching_tree_depth = saved_depth;
                    }
                    queue.push(OpenNode(child));
                } else {
                    tracing::debug!(node = child.index, lb = child.lower_bound, "pruned by bounds");
                }

                if num::lt(ph_stats.gap_integer(), config.integer_optimality_gap) {
                    return Ok(());
                }
            }
        }

        // The open node with the smallest bound carries the global lower
        // bound; an empty queue means the tree is exhausted.
        ph_stats.lb_integer = match queue.peek() {
            Some(OpenNode(top)) => top.lower_bound,
            None => incumbent.objective,
        };
        if num::lt(ph_stats.gap_integer(), config.integer_optimality_gap) {
            return Ok(());
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn depth_first(
    view: &HorizonView<'_>,
    _history: &mut BranchHistory,
    deadline: Instant,
    mp: &mut MasterProblem<'_>,
    pp: &mut PricingProblem<'_>,
    parent: &mut BranchNode,
    incumbent: &mut Solution,
    ph_stats: &mut PlanningHorizonStats,
    stats: &mut RunStats,
) -> RotorResult<()> {
    if Instant::now() > deadline || parent.options.is_empty() {
        return Ok(());
    }

    let Some(chosen) = parent.next_branch() else {
        return Ok(());
    };
    // Left first: fewer vehicles / keep the trip assigned for the counting
    // and rotation decisions, force the activity for the rest.
    let values = match chosen.kind {
        BranchKind::TotalVehicles
        | BranchKind::TotalUnassignedTrips
        | BranchKind::TripUnassigned { .. }
        | BranchKind::VehicleRotation { .. } => {
            [chosen.fractional.floor(), chosen.fractional.ceil()]
        }
        _ => [chosen.fractional.ceil(), chosen.fractional.floor()],
    };

    let mut subtree_lb = f64::INFINITY;
    for value in values {
        if Instant::now() > deadline {
            break;
        }
        let mut side = chosen.clone();
        side.value = value;
        ph_stats.branching_tree_size += 1;
        let mut child =
            BranchNode::child(ph_stats.branching_tree_size as usize, parent, side.clone(), view);

        let mut detail = branch_detail(view, &child, &side);
        detail.index_parent_branching_node = Some(parent.index);
        stats.performance.push(detail);

        ph_stats.branching_tree_depth =
            ph_stats.branching_tree_depth.max(child.branches.len() as u32);

        mp.filter_vars(&child);
        pp.update_node_access(&child);

        let lb_integer = child.lower_bound;
        let outcome = column_generation(
            view, &child, mp, pp, incumbent, lb_integer, false, 0.0, deadline, stats,
        )?;
        if !outcome.feasible {
            continue;
        }

        child.store_options_for_branching(mp.branch_options());
        child.lower_bound = outcome.lb;
        ph_stats.ub_integer = incumbent.objective;

        let gap = (incumbent.objective - outcome.lb).abs() / incumbent.objective.abs().max(1e-10);
        if num::lt(outcome.lb, incumbent.objective)
            && num::le(view.data.config.integer_optimality_gap, gap)
            && !child.options.is_empty()
        {
            depth_first(view, _history, deadline, mp, pp, &mut child, incumbent, ph_stats, stats)?;
        }
        subtree_lb = subtree_lb.min(child.lower_bound);
    }

    if subtree_lb.is_finite() {
        parent.lower_bound = subtree_lb;
    }
    Ok(())
}

/// The diving heuristic: push every branch option whose fractional part is
/// above the threshold to its ceiling in one fat child; when none qualify,
/// take the next sorted option. On infeasibility roll back one decision at
/// a time, flipping ceilings to floors.
#[allow(clippy::too_many_arguments)]
fn truncated_column_generation(
    view: &HorizonView<'_>,
    deadline: Instant,
    mp: &mut MasterProblem<'_>,
    pp: &mut PricingProblem<'_>,
    parent: &BranchNode,
    incumbent: &mut Solution,
    ph_stats: &mut PlanningHorizonStats,
    stats: &mut RunStats,
) -> RotorResult<()> {
    let config = &view.data.config;
    if parent.options.is_empty() {
        return Ok(());
    }

    let mut node = parent.clone();
    loop {
        ph_stats.branching_tree_size += 1;
        ph_stats.branching_tree_depth += 1;

        let mut fixed: Vec<Branch> = node
            .options
            .iter()
            .filter(|option| {
                num::le(config.frac_threshold_trunc_cg, option.fractional_part())
            })
            .cloned()
            .collect();
        for branch in &mut fixed {
            branch.value = branch.fractional.ceil();
        }

        if fixed.is_empty() {
            let Some(mut next) = node.next_branch() else {
                break;
            };
            next.value = next.fractional.ceil();
            stats.performance.push(branch_detail(view, &node, &next));
            node = BranchNode::child(ph_stats.branching_tree_size as usize, &node, next, view);
        } else {
            for branch in fixed {
                stats.performance.push(branch_detail(view, &node, &branch));
                node =
                    BranchNode::child(ph_stats.branching_tree_size as usize, &node, branch, view);
            }
        }

        loop {
            mp.filter_vars(&node);
            pp.update_node_access(&node);

            let lb_integer = ph_stats.lb_integer;
            let outcome = column_generation(
                view,
                &node,
                mp,
                pp,
                incumbent,
                lb_integer,
                false,
                config.linear_optimality_gap,
                deadline,
                stats,
            )?;

            if outcome.feasible {
                node.store_options_for_diving(mp.branch_options());
                node.lower_bound = outcome.lb;
                ph_stats.ub_integer = incumbent.objective;

                if node.options.is_empty()
                    || mp.status() == MasterStatus::Integer
                    || num::le(incumbent.objective, mp.objective())
                    || num::lt(ph_stats.gap_integer(), config.integer_optimality_gap)
                {
                    return Ok(());
                }
                break;
            }

            // Rollback: drop floor decisions, flip the last ceiling.
            loop {
                let Some(last) = node.pop_branch() else {
                    return Ok(());
                };
                if num::lt(0.0, last.value - last.fractional) {
                    let mut flipped = last;
                    flipped.value = flipped.fractional.floor();
                    node.recompute_fixings(view);
                    stats.performance.push(branch_detail(view, &node, &flipped));
                    node = BranchNode::child(
                        ph_stats.branching_tree_size as usize,
                        &node,
                        flipped,
                        view,
                    );
                    break;
                }
            }
        }

        if Instant::now() > deadline {
            break;
        }
    }
    Ok(())
}

fn price_and_branch(
    mp: &mut MasterProblem<'_>,
    incumbent: &mut Solution,
    ph_stats: &mut PlanningHorizonStats,
) -> RotorResult<()> {
    mp.solve_as_mip()?;
    if mp.status() == MasterStatus::Integer && num::lt(mp.objective(), incumbent.objective) {
        *incumbent = mp.current_solution();
    }
    ph_stats.ub_integer = incumbent.objective;
    Ok(())
}

// ---------------------------------------------------------------------
// Per-horizon driver

/// Solves one planning horizon: root column generation, then the configured
/// algorithm. The best integer solution found lands in `solution`.
pub fn solve_planning_horizon(
    view: &HorizonView<'_>,
    solution: &mut Solution,
    ph_stats: &mut PlanningHorizonStats,
    stats: &mut RunStats,
    seed: Option<u64>,
) -> RotorResult<()> {
    let config = &view.data.config;
    ph_stats.lb_integer = f64::NEG_INFINITY;
    ph_stats.ub_integer = f64::INFINITY;
    ph_stats.branching_tree_size = 1;
    ph_stats.branching_tree_depth = 0;

    let mut mp = MasterProblem::new(view);
    let mut pp = match seed {
        Some(seed) => PricingProblem::with_seed(view, seed),
        None => PricingProblem::new(view),
    };
    let mut root = BranchNode::root(1, view);
    let mut history = BranchHistory::new();
    let deadline =
        Instant::now() + Duration::from_secs(config.branch_and_price_timelimit as u64);

    mp.filter_vars(&root);
    pp.update_node_access(&root);

    tracing::info!(
        horizon = view.horizon.index,
        algorithm = config.algorithm.name(),
        pricing = ?config.pricing,
        "solving root node"
    );

    let root_tolerance = if config.algorithm == AlgorithmKind::DivingHeuristic {
        config.linear_optimality_gap
    } else {
        0.0
    };
    let root_outcome = column_generation(
        view,
        &root,
        &mut mp,
        &mut pp,
        solution,
        ph_stats.lb_integer,
        true,
        root_tolerance,
        deadline,
        stats,
    )?;
    root.lower_bound = root_outcome.lb;
    let root_options = mp.branch_options();

    ph_stats.lb_integer = root.lower_bound;
    ph_stats.ub_integer = solution.objective;
    ph_stats.algorithm = "Root-Solved".into();
    ph_stats.pp_nr_segments = pp.num_segments();

    if config.terminate_after_root {
        return Ok(());
    }

    if root_outcome.feasible
        && Instant::now() <= deadline
        && !num::approx_eq(root.lower_bound, solution.objective)
    {
        ph_stats.algorithm = config.algorithm.name().into();
        match config.algorithm {
            AlgorithmKind::PriceAndBranch => {
                price_and_branch(&mut mp, solution, ph_stats)?;
            }
            AlgorithmKind::BranchAndPriceBest => {
                root.store_options_for_branching(root_options);
                best_first(
                    view, &mut history, deadline, &mut mp, &mut pp, root, solution, ph_stats,
                    stats,
                )?;
            }
            AlgorithmKind::BranchAndPriceDepth => {
                root.store_options_for_branching(root_options);
                depth_first(
                    view, &mut history, deadline, &mut mp, &mut pp, &mut root, solution,
                    ph_stats, stats,
                )?;
                ph_stats.lb_integer = root.lower_bound;
            }
            AlgorithmKind::DivingHeuristic => {
                root.store_options_for_diving(root_options);
                truncated_column_generation(
                    view, deadline, &mut mp, &mut pp, &root, solution, ph_stats, stats,
                )?;
            }
            AlgorithmKind::DivingThenBestFirst => {
                root.store_options_for_diving(root_options.clone());
                truncated_column_generation(
                    view, deadline, &mut mp, &mut pp, &root, solution, ph_stats, stats,
                )?;
                root.store_options_for_branching(root_options);
                ph_stats.branching_tree_depth = 1;
                ph_stats.branching_tree_size = 2;
                best_first(
                    view, &mut history, deadline, &mut mp, &mut pp, root, solution, ph_stats,
                    stats,
                )?;
            }
            AlgorithmKind::DivingThenDepthFirst => {
                root.store_options_for_diving(root_options.clone());
                truncated_column_generation(
                    view, deadline, &mut mp, &mut pp, &root, solution, ph_stats, stats,
                )?;
                root.store_options_for_branching(root_options);
                ph_stats.branching_tree_depth = 1;
                ph_stats.branching_tree_size = 2;
                depth_first(
                    view, &mut history, deadline, &mut mp, &mut pp, &mut root, solution,
                    ph_stats, stats,
                )?;
                ph_stats.lb_integer = root.lower_bound;
            }
        }
    }

    ph_stats.unassigned_trips = solution.unassigned_trips;
    ph_stats.vehicles_selected = solution.vehicles_selected;
    ph_stats.time_mp_solver_ms = mp.ms_solver;
    ph_stats.time_pp_solver_ms = pp.ms_solver;
    ph_stats.time_mp_filter_vars_ms = mp.ms_filter_vars;
    ph_stats.time_pp_filter_nodes_ms = pp.ms_filter_access;
    ph_stats.pp_network_construction_ms = pp.ms_network_construction;
    Ok(())
}

/// Cuts every schedule at the last put-on-charge still inside the horizon,
/// preserving coherent charging sessions; nodes past the cut stay visible
/// to the next horizon's planning window but are not committed.
pub fn trim_solution(view: &HorizonView<'_>, solution: &mut Solution) {
    for assignment in &mut solution.schedules {
        let mut cut_off: Option<usize> = None;
        for (position, &node) in assignment.nodes.iter().enumerate().rev() {
            let data = view.node(node);
            if matches!(data.kind, ActivityKind::PutOnCharge { .. }) {
                cut_off = Some(position);
            }
            let is_charging_bookend = matches!(
                data.kind,
                ActivityKind::PutOnCharge { .. } | ActivityKind::TakeOffCharge { .. }
            );
            if data.start_time < view.horizon.end && !is_charging_bookend {
                break;
            }
        }

        if let Some(cut_off) = cut_off {
            assignment.end_location = view.node(assignment.nodes[cut_off]).start_location;
            assignment.nodes.truncate(cut_off);
        }
    }
    solution.horizon_start = view.horizon.start;
    solution.horizon_end = view.horizon.end;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizon::{HorizonClock, HorizonView};
    use crate::test_support::scenario_two_trips;
    use rotor_core::ScheduleGraph;

    #[test]
    fn test_trimmer_cuts_at_last_put_on() {
        let mut data = scenario_two_trips();
        data.config.planning_horizon_length = 30_000; // horizon ends 08:20
        data.config.planning_horizon_overlap = 10_000;
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));

        // A schedule: trip 0 (inside), then a charging pair past the end.
        let trip = view.trips[0].node;
        let put_on = view.put_ons[0]
            .iter()
            .find(|s| view.node(s.node).start_time >= 31_000)
            .unwrap()
            .node;
        let take_off = view.take_offs[0]
            .iter()
            .find(|s| view.node(s.node).start_time >= 33_000)
            .unwrap()
            .node;

        let mut solution = Solution {
            schedules: vec![rotor_core::VehicleAssignment {
                vehicle: 0,
                start_location: 0,
                end_location: 0,
                nodes: vec![trip, put_on, take_off],
            }],
            ..Solution::default()
        };
        trim_solution(&view, &mut solution);

        let assignment = &solution.schedules[0];
        // The hanging charging session is discarded; the schedule ends at
        // the put-on's location.
        assert_eq!(assignment.nodes, vec![trip]);
        assert_eq!(assignment.end_location, 0);
    }

    #[test]
    fn test_trimmer_keeps_inside_nodes() {
        let data = scenario_two_trips();
        let graph = ScheduleGraph::initialise(&data).unwrap();
        let view = HorizonView::new(&data, &graph, HorizonClock::first(&data.config));

        let nodes = vec![view.trips[0].node, view.trips[1].node];
        let mut solution = Solution {
            schedules: vec![rotor_core::VehicleAssignment {
                vehicle: 0,
                start_location: 0,
                end_location: 0,
                nodes: nodes.clone(),
            }],
            ..Solution::default()
        };
        trim_solution(&view, &mut solution);
        assert_eq!(solution.schedules[0].nodes, nodes);
    }
}
