//! Dependency graph over the packages of one scan.
//!
//! Edges point from a package to the packages it depends on. The graph is
//! rebuilt from scratch after every scan and may contain cycles, so every
//! traversal here is guarded by a visited set.

use super::Package;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

/// Direction of an impact traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImpactDirection {
    /// Packages the seeds depend on (transitively)
    Dependencies,
    /// Packages that depend on the seeds (transitively)
    Dependents,
    /// Follow edges either way: the connected neighbourhood of the seeds
    Both,
}

impl ImpactDirection {
    fn edge_directions(self) -> &'static [Direction] {
        match self {
            Self::Dependencies => &[Direction::Outgoing],
            Self::Dependents => &[Direction::Incoming],
            Self::Both => &[Direction::Outgoing, Direction::Incoming],
        }
    }
}

impl fmt::Display for ImpactDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependencies => write!(f, "dependencies"),
            Self::Dependents => write!(f, "dependents"),
            Self::Both => write!(f, "dependencies and dependents"),
        }
    }
}

/// A declared dependency that does not name a workspace package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedEdge {
    /// Package that declared the dependency
    pub package: String,
    /// The dependency name that could not be resolved
    pub dependency: String,
}

/// Directed "depends on" graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    names: Vec<String>,
    unresolved: Vec<UnresolvedEdge>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from scanned packages.
    ///
    /// Self-dependencies are dropped. Dependencies on names outside the
    /// package set are recorded as unresolved instead of becoming edges. If a
    /// name appears twice, the first package wins.
    pub fn build(packages: &[Package]) -> Self {
        let mut graph = DiGraph::with_capacity(packages.len(), packages.len() * 2);
        let mut index = HashMap::with_capacity(packages.len());
        let mut accepted = Vec::with_capacity(packages.len());

        for pkg in packages {
            if index.contains_key(&pkg.name) {
                tracing::debug!("Ignoring second package named {}", pkg.name);
                continue;
            }
            let node = graph.add_node(pkg.name.clone());
            index.insert(pkg.name.clone(), node);
            accepted.push((node, pkg));
        }

        let mut unresolved = Vec::new();
        for (from, pkg) in accepted {
            for dep in &pkg.dependencies {
                if dep == &pkg.name {
                    tracing::debug!("Dropping self-dependency of {}", pkg.name);
                    continue;
                }
                match index.get(dep) {
                    Some(&to) => {
                        graph.update_edge(from, to, ());
                    }
                    None => unresolved.push(UnresolvedEdge {
                        package: pkg.name.clone(),
                        dependency: dep.clone(),
                    }),
                }
            }
        }

        let mut names: Vec<String> = index.keys().cloned().collect();
        names.sort();

        Self {
            graph,
            index,
            names,
            unresolved,
        }
    }

    /// Check whether a package is part of the graph
    pub fn has_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All package names, sorted
    pub fn node_names(&self) -> &[String] {
        &self.names
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the graph has no packages
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of resolved dependency edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Dependencies that point outside the workspace
    pub fn unresolved(&self) -> &[UnresolvedEdge] {
        &self.unresolved
    }

    /// Direct dependencies of a package, sorted
    pub fn neighbors_out(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Direct dependents of a package, sorted
    pub fn neighbors_in(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(&node) = self.index.get(name) else {
            return Vec::new();
        };
        let mut result: Vec<String> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        result.sort();
        result
    }

    /// Breadth-first closure of `seeds` in `direction`, seeds included.
    ///
    /// Seeds that are not packages of this graph are ignored.
    pub fn impact_set<I, S>(&self, seeds: I, direction: ImpactDirection) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        for seed in seeds {
            if let Some(&node) = self.index.get(seed.as_ref()) {
                if visited.insert(node) {
                    queue.push_back(node);
                }
            }
        }

        while let Some(current) = queue.pop_front() {
            for &edge_direction in direction.edge_directions() {
                for next in self.graph.neighbors_directed(current, edge_direction) {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }

        visited
            .into_iter()
            .map(|node| self.graph[node].clone())
            .collect()
    }

    /// Groups of packages that depend on each other in a cycle
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|node| self.graph[node].clone())
                    .collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Order a subset of packages so dependencies come before dependents.
    ///
    /// Ties are broken by name. A cycle never fails the ordering: the
    /// alphabetically first member of a blocked cycle is emitted next.
    pub fn build_order<I, S>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subset: BTreeSet<&str> = names
            .into_iter()
            .filter_map(|n| self.index.get_key_value(n.as_ref()).map(|(k, _)| k.as_str()))
            .collect();

        let mut pending: BTreeMap<&str, usize> = subset
            .iter()
            .map(|&name| {
                let count = self
                    .graph
                    .neighbors_directed(self.index[name], Direction::Outgoing)
                    .filter(|dep| subset.contains(self.graph[*dep].as_str()))
                    .count();
                (name, count)
            })
            .collect();

        let mut order = Vec::with_capacity(subset.len());
        while !pending.is_empty() {
            let next = pending
                .iter()
                .find(|&(_, &count)| count == 0)
                .map(|(&name, _)| name)
                .or_else(|| pending.keys().next().copied());
            let Some(next) = next else { break };

            pending.remove(next);
            for dependent in self
                .graph
                .neighbors_directed(self.index[next], Direction::Incoming)
            {
                if let Some(count) = pending.get_mut(self.graph[dependent].as_str()) {
                    *count = count.saturating_sub(1);
                }
            }
            order.push(next.to_string());
        }
        order
    }
}
