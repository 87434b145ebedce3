//! Dependency graph queries over the registered component set.
//!
//! Cycle detection runs Tarjan's strongly-connected-components algorithm
//! (iterative, explicit stack) over the name graph. SCCs with two or more
//! nodes are reported as cycles; a self-loop is reported separately at
//! registration time.

use rustc_hash::{FxHashMap, FxHashSet};

/// Adjacency over component names. Edges to unresolved names are kept; they
/// simply have no outgoing edges of their own.
pub(super) struct NameGraph<'a> {
    nodes: Vec<&'a str>,
    index: FxHashMap<&'a str, usize>,
    edges: Vec<Vec<usize>>,
}

impl<'a> NameGraph<'a> {
    pub(super) fn new(deps: impl Iterator<Item = (&'a str, &'a [String])> + Clone) -> Self {
        let mut nodes: Vec<&str> = Vec::new();
        let mut index = FxHashMap::default();

        for (name, _) in deps.clone() {
            if !index.contains_key(name) {
                index.insert(name, nodes.len());
                nodes.push(name);
            }
        }

        let mut edges = vec![Vec::new(); nodes.len()];
        for (name, targets) in deps {
            let from = index[name];
            for target in targets {
                // Unresolved targets have no node; they cannot be on a cycle.
                if let Some(&to) = index.get(target.as_str()) {
                    edges[from].push(to);
                }
            }
        }

        Self {
            nodes,
            index,
            edges,
        }
    }

    /// Strongly connected components with more than one node, as sorted
    /// name lists.
    pub(super) fn cycles(&self) -> Vec<Vec<String>> {
        let mut state = TarjanState::new(self.nodes.len());

        for v in 0..self.nodes.len() {
            if state.indices[v].is_none() {
                self.strong_connect(v, &mut state);
            }
        }

        let mut cycles: Vec<Vec<String>> = state
            .sccs
            .into_iter()
            .filter(|scc| scc.len() >= 2)
            .map(|scc| {
                let mut names: Vec<String> =
                    scc.iter().map(|&v| self.nodes[v].to_string()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Direct and transitive dependents of `name`.
    pub(super) fn dependents(&self, name: &str) -> FxHashSet<String> {
        let Some(&target) = self.index.get(name) else {
            return FxHashSet::default();
        };

        // Reverse edges once, then walk.
        let mut reverse = vec![Vec::new(); self.nodes.len()];
        for (from, outs) in self.edges.iter().enumerate() {
            for &to in outs {
                reverse[to].push(from);
            }
        }

        let mut seen = FxHashSet::default();
        let mut stack = vec![target];
        while let Some(v) = stack.pop() {
            for &dep in &reverse[v] {
                if dep != target && seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }

        seen.into_iter()
            .map(|v| self.nodes[v].to_string())
            .collect()
    }

    /// Iterative Tarjan: an explicit frame stack replaces recursion so deep
    /// graphs cannot overflow the thread stack.
    fn strong_connect(&self, root: usize, state: &mut TarjanState) {
        let mut frames = vec![Frame {
            node: root,
            edge: 0,
        }];

        state.visit(root);

        while let Some(frame) = frames.last_mut() {
            let v = frame.node;

            if frame.edge < self.edges[v].len() {
                let w = self.edges[v][frame.edge];
                frame.edge += 1;

                if state.indices[w].is_none() {
                    state.visit(w);
                    frames.push(Frame { node: w, edge: 0 });
                } else if state.on_stack[w] {
                    let low = state.indices[w].expect("visited node has an index");
                    state.lowlinks[v] = state.lowlinks[v].min(low);
                }
                continue;
            }

            // All edges of v explored.
            if state.lowlinks[v] == state.indices[v].expect("visited node has an index") {
                let mut scc = Vec::new();
                loop {
                    let w = state.stack.pop().expect("stack holds the SCC");
                    state.on_stack[w] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                state.sccs.push(scc);
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                let p = parent.node;
                state.lowlinks[p] = state.lowlinks[p].min(state.lowlinks[v]);
            }
        }
    }
}

struct Frame {
    node: usize,
    edge: usize,
}

struct TarjanState {
    indices: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    sccs: Vec<Vec<usize>>,
}

impl TarjanState {
    fn new(n: usize) -> Self {
        Self {
            indices: vec![None; n],
            lowlinks: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        }
    }

    fn visit(&mut self, v: usize) {
        self.indices[v] = Some(self.next_index);
        self.lowlinks[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&'static str, &'static [&'static str])]) -> Vec<(String, Vec<String>)> {
        edges
            .iter()
            .map(|(n, deps)| {
                (
                    n.to_string(),
                    deps.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
                )
            })
            .collect()
    }

    fn cycles_of(data: &[(String, Vec<String>)]) -> Vec<Vec<String>> {
        NameGraph::new(data.iter().map(|(n, d)| (n.as_str(), d.as_slice()))).cycles()
    }

    fn dependents_of(data: &[(String, Vec<String>)], name: &str) -> FxHashSet<String> {
        NameGraph::new(data.iter().map(|(n, d)| (n.as_str(), d.as_slice()))).dependents(name)
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        assert!(cycles_of(&g).is_empty());
    }

    #[test]
    fn test_three_cycle_detected_exactly_once() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"])]);
        let cycles = cycles_of(&g);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["A", "B", "C"]);
    }

    #[test]
    fn test_two_separate_cycles() {
        let g = graph(&[
            ("A", &["B"]),
            ("B", &["A"]),
            ("X", &["Y"]),
            ("Y", &["X"]),
            ("Z", &["A", "X"]),
        ]);
        let cycles = cycles_of(&g);

        assert_eq!(cycles.len(), 2);
        assert!(cycles.contains(&vec!["A".to_string(), "B".to_string()]));
        assert!(cycles.contains(&vec!["X".to_string(), "Y".to_string()]));
    }

    #[test]
    fn test_self_loop_is_not_reported_here() {
        // Self-loops are a registration-time diagnostic, not an SCC cycle.
        let g = graph(&[("A", &["A"])]);
        assert!(cycles_of(&g).is_empty());
    }

    #[test]
    fn test_unresolved_dependency_cannot_cycle() {
        let g = graph(&[("A", &["Ghost"])]);
        assert!(cycles_of(&g).is_empty());
    }

    #[test]
    fn test_every_cycle_node_has_an_edge_into_the_cycle() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"]), ("D", &["A"])]);
        let cycles = cycles_of(&g);
        assert_eq!(cycles.len(), 1);

        let cycle: FxHashSet<&str> = cycles[0].iter().map(String::as_str).collect();
        let lookup: FxHashMap<&str, &[String]> =
            g.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();

        for node in &cycle {
            let incoming = cycle
                .iter()
                .filter(|other| lookup[**other].iter().any(|d| d == node))
                .count();
            assert!(incoming >= 1, "{node} has no edge into the cycle");
        }
    }

    #[test]
    fn test_dependents_transitive() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &[]), ("D", &["C"])]);

        let deps = dependents_of(&g, "C");
        assert_eq!(deps.len(), 3);
        assert!(deps.contains("A"));
        assert!(deps.contains("B"));
        assert!(deps.contains("D"));

        assert!(dependents_of(&g, "A").is_empty());
    }

    #[test]
    fn test_dependents_of_unknown_name() {
        let g = graph(&[("A", &[])]);
        assert!(dependents_of(&g, "Nope").is_empty());
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        // 10k-node chain exercises the explicit stack.
        let mut data = Vec::new();
        for i in 0..10_000 {
            let deps = if i + 1 < 10_000 {
                vec![format!("C{}", i + 1)]
            } else {
                vec![]
            };
            data.push((format!("C{i}"), deps));
        }
        assert!(cycles_of(&data).is_empty());
    }
}
