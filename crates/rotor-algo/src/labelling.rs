//! Generic label-setting for resource-constrained shortest paths.
//!
//! The three pricing networks and the segment sub-graph all run the same
//! algorithm and differ only in their label type, extension rule and
//! dominance relation, so the engine is factored out once:
//!
//! - `extend(label, arc, target)` produces the extended label or rejects the
//!   move (resource window violated, no access, ...);
//! - `dominates(a, b)` decides whether `a` makes `b` redundant. The relation
//!   must be reflexive-safe: a label never dominates itself out of the pool
//!   because equality keeps the incumbent.
//!
//! Labels are kept in an arena with predecessor links; pareto filtering
//! happens on insertion at each vertex. The run stops early when enough
//! labels reached the sink (`max_sink_labels`, unless `solve_optimal`) or
//! the deadline passed; both conditions are reported so callers can tell a
//! proven-complete search from a truncated one.

use std::time::Instant;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// One pareto-optimal source-to-sink path with its final label.
pub struct Labelled<L> {
    pub label: L,
    /// Arcs in source-to-sink order.
    pub path: Vec<EdgeIndex>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LabelRunStatus {
    /// The sink-label cap cut the search short.
    pub hit_label_cap: bool,
    /// The deadline cut the search short.
    pub hit_deadline: bool,
}

struct Entry<L> {
    label: L,
    node: NodeIndex,
    pred: Option<(usize, EdgeIndex)>,
    dominated: bool,
}

pub fn label_setting<N, E, L, X, D>(
    graph: &DiGraph<N, E>,
    source: NodeIndex,
    sink: NodeIndex,
    initial: L,
    mut extend: X,
    dominates: D,
    max_sink_labels: usize,
    solve_optimal: bool,
    deadline: Instant,
) -> (Vec<Labelled<L>>, LabelRunStatus)
where
    L: Clone,
    X: FnMut(&L, EdgeIndex, NodeIndex) -> Option<L>,
    D: Fn(&L, &L) -> bool,
{
    let mut entries: Vec<Entry<L>> = Vec::new();
    let mut alive: Vec<Vec<usize>> = vec![Vec::new(); graph.node_count()];
    let mut queue: Vec<usize> = Vec::new();
    let mut status = LabelRunStatus::default();
    let mut sink_labels = 0usize;

    entries.push(Entry { label: initial, node: source, pred: None, dominated: false });
    alive[source.index()].push(0);
    queue.push(0);

    while let Some(id) = queue.pop() {
        if !solve_optimal && sink_labels >= max_sink_labels {
            status.hit_label_cap = true;
            break;
        }
        if Instant::now() >= deadline {
            status.hit_deadline = true;
            break;
        }
        if entries[id].dominated {
            continue;
        }

        let node = entries[id].node;
        let mut edges = graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| e.id())
            .collect::<Vec<_>>();
        // Deterministic expansion order regardless of insertion history.
        edges.sort_by_key(|e| e.index());

        for arc in edges {
            let (_, target) = graph.edge_endpoints(arc).expect("arc in graph");
            let Some(new_label) = extend(&entries[id].label, arc, target) else {
                continue;
            };

            // Pareto filtering at the target vertex. The incumbent wins a
            // mutual domination (equal labels), so first decide whether the
            // newcomer survives, then thin the list.
            let is_dominated = alive[target.index()]
                .iter()
                .any(|&other| dominates(&entries[other].label, &new_label));
            if is_dominated {
                continue;
            }
            alive[target.index()].retain(|&other| {
                if dominates(&new_label, &entries[other].label) {
                    entries[other].dominated = true;
                    false
                } else {
                    true
                }
            });

            let new_id = entries.len();
            entries.push(Entry {
                label: new_label,
                node: target,
                pred: Some((id, arc)),
                dominated: false,
            });
            alive[target.index()].push(new_id);

            if target == sink {
                sink_labels += 1;
            } else {
                queue.push(new_id);
            }
        }
    }

    let results = alive[sink.index()]
        .iter()
        .filter(|&&id| !entries[id].dominated)
        .map(|&id| {
            let mut path = Vec::new();
            let mut cursor = id;
            while let Some((pred, arc)) = entries[cursor].pred {
                path.push(arc);
                cursor = pred;
            }
            path.reverse();
            Labelled { label: entries[id].label.clone(), path }
        })
        .collect();

    (results, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Shortest paths with a fuel resource on a diamond graph.
    #[derive(Clone, Debug)]
    struct Label {
        cost: f64,
        fuel: i32,
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_resource_infeasible_path_pruned() {
        // source -> a -> sink (cheap but thirsty), source -> b -> sink
        let mut g: DiGraph<(), (f64, i32)> = DiGraph::new();
        let s = g.add_node(());
        let a = g.add_node(());
        let b = g.add_node(());
        let t = g.add_node(());
        g.add_edge(s, a, (1.0, 9));
        g.add_edge(a, t, (1.0, 9));
        g.add_edge(s, b, (5.0, 1));
        g.add_edge(b, t, (5.0, 1));

        let (paths, status) = label_setting(
            &g,
            s,
            t,
            Label { cost: 0.0, fuel: 10 },
            |label, arc, _| {
                let (cost, fuel) = g[arc];
                let fuel = label.fuel - fuel;
                (fuel >= 0).then(|| Label { cost: label.cost + cost, fuel })
            },
            |a, b| a.cost <= b.cost && a.fuel >= b.fuel,
            100,
            true,
            far_deadline(),
        );

        assert!(!status.hit_label_cap && !status.hit_deadline);
        // The cheap path runs out of fuel; only the expensive one survives.
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path.len(), 2);
        assert!((paths[0].label.cost - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_dominance_prunes_parallel_labels() {
        let mut g: DiGraph<(), (f64, i32)> = DiGraph::new();
        let s = g.add_node(());
        let m = g.add_node(());
        let t = g.add_node(());
        // Two parallel arcs into m, one strictly better in cost and fuel.
        g.add_edge(s, m, (1.0, 1));
        g.add_edge(s, m, (2.0, 2));
        g.add_edge(m, t, (0.0, 0));

        let (paths, _) = label_setting(
            &g,
            s,
            t,
            Label { cost: 0.0, fuel: 10 },
            |label, arc, _| {
                let (cost, fuel) = g[arc];
                Some(Label { cost: label.cost + cost, fuel: label.fuel - fuel })
            },
            |a, b| a.cost <= b.cost && a.fuel >= b.fuel,
            100,
            true,
            far_deadline(),
        );

        // Sink labels are subject to dominance here, so only the better
        // label survives.
        assert_eq!(paths.len(), 1);
        assert!((paths[0].label.cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_label_cap_reports_truncation() {
        let mut g: DiGraph<(), (f64, i32)> = DiGraph::new();
        let s = g.add_node(());
        let t = g.add_node(());
        for i in 0..8 {
            g.add_edge(s, t, (i as f64, 0));
        }

        let (_, status) = label_setting(
            &g,
            s,
            t,
            Label { cost: 0.0, fuel: 0 },
            |label, arc, _| {
                let (cost, _) = g[arc];
                Some(Label { cost: label.cost + cost, fuel: 0 })
            },
            // Sink labels never dominated: keep them all.
            |_, _| false,
            2,
            false,
            far_deadline(),
        );
        // All eight labels land on the sink from a single pop, but the cap
        // is checked before the next pop, so the run reports truncation
        // only if labels were still queued. Force a second layer:
        let _ = status;

        let mut g: DiGraph<(), (f64, i32)> = DiGraph::new();
        let s = g.add_node(());
        let m1 = g.add_node(());
        let m2 = g.add_node(());
        let t = g.add_node(());
        g.add_edge(s, m1, (1.0, 0));
        g.add_edge(s, m2, (2.0, 0));
        g.add_edge(m1, t, (0.0, 0));
        g.add_edge(m2, t, (0.0, 0));

        let (paths, status) = label_setting(
            &g,
            s,
            t,
            Label { cost: 0.0, fuel: 0 },
            |label, arc, _| {
                let (cost, _) = g[arc];
                Some(Label { cost: label.cost + cost, fuel: 0 })
            },
            |_, _| false,
            1,
            false,
            far_deadline(),
        );
        assert!(status.hit_label_cap);
        assert!(!paths.is_empty());
    }

    #[test]
    fn test_expired_deadline_stops_immediately() {
        let mut g: DiGraph<(), (f64, i32)> = DiGraph::new();
        let s = g.add_node(());
        let t = g.add_node(());
        g.add_edge(s, t, (1.0, 0));

        let (paths, status) = label_setting(
            &g,
            s,
            t,
            Label { cost: 0.0, fuel: 0 },
            |label, arc, _| {
                let (cost, _) = g[arc];
                Some(Label { cost: label.cost + cost, fuel: 0 })
            },
            |_, _| false,
            100,
            true,
            Instant::now() - Duration::from_secs(1),
        );
        assert!(status.hit_deadline);
        assert!(paths.is_empty());
    }
}
