//! Package selection model: which packages the operator picked, which are
//! visible under the current filter, and what that means for a build.

use super::{DependencyGraph, ImpactDirection};
use std::collections::BTreeSet;

/// One row of the package list as the presentation layer sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionEntry<'a> {
    pub name: &'a str,
    pub visible: bool,
    pub selected: bool,
}

/// Selection state over the packages of the current graph
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// All known package names, sorted
    nodes: Vec<String>,
    /// Currently selected names (always a subset of `nodes`)
    selected: BTreeSet<String>,
    /// Lowercased filter text; empty shows everything
    filter: String,
}

impl Selection {
    /// Create an empty selection over the given package names
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        nodes.sort();
        nodes.dedup();
        Self {
            nodes,
            selected: BTreeSet::new(),
            filter: String::new(),
        }
    }

    /// Replace the node set after a re-scan, keeping still-known selections.
    ///
    /// Returns the names that were dropped from the selection.
    pub fn rebase<I, S>(&mut self, nodes: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let previous = std::mem::take(&mut self.selected);
        let filter = std::mem::take(&mut self.filter);
        *self = Self::new(nodes);
        self.filter = filter;
        self.restore(previous)
    }

    /// Replace the selection with `names`, pruning names that are not known.
    ///
    /// Returns the pruned names.
    pub fn restore<I, S>(&mut self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected.clear();
        let mut pruned = Vec::new();
        for name in names {
            let name = name.into();
            if self.is_known(&name) {
                self.selected.insert(name);
            } else {
                pruned.push(name);
            }
        }
        pruned
    }

    /// Check whether a package name belongs to the current node set
    pub fn is_known(&self, name: &str) -> bool {
        self.nodes.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    /// Set the filter text (case-insensitive substring of the name).
    ///
    /// Only visibility changes; the selection is left untouched.
    pub fn set_filter(&mut self, text: &str) {
        self.filter = text.trim().to_lowercase();
    }

    /// Current (normalized) filter text
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Check whether a package passes the current filter
    pub fn is_visible(&self, name: &str) -> bool {
        self.filter.is_empty() || name.to_lowercase().contains(&self.filter)
    }

    /// Visible package names, sorted
    pub fn visible(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes
            .iter()
            .map(String::as_str)
            .filter(move |name| self.is_visible(name))
    }

    /// Rows for the package list
    pub fn entries(&self) -> Vec<SelectionEntry<'_>> {
        self.nodes
            .iter()
            .map(|name| SelectionEntry {
                name,
                visible: self.is_visible(name),
                selected: self.selected.contains(name),
            })
            .collect()
    }

    /// Select every visible package
    pub fn select_all(&mut self) {
        let visible: Vec<String> = self.visible().map(str::to_string).collect();
        self.selected.extend(visible);
    }

    /// Deselect every visible package
    pub fn select_none(&mut self) {
        let visible: Vec<String> = self.visible().map(str::to_string).collect();
        for name in visible {
            self.selected.remove(&name);
        }
    }

    /// Flip the selection of every visible package
    pub fn invert(&mut self) {
        let visible: Vec<String> = self.visible().map(str::to_string).collect();
        for name in visible {
            if !self.selected.remove(&name) {
                self.selected.insert(name);
            }
        }
    }

    /// Flip one package. Unknown names are ignored and return `false`.
    pub fn toggle(&mut self, name: &str) -> bool {
        if !self.is_known(name) {
            tracing::debug!("Ignoring toggle of unknown package {}", name);
            return false;
        }
        if !self.selected.remove(name) {
            self.selected.insert(name.to_string());
        }
        true
    }

    /// Select a package together with everything it depends on
    pub fn select_with_dependencies(&mut self, graph: &DependencyGraph, name: &str) -> usize {
        if !self.is_known(name) {
            return 0;
        }
        let closure: Vec<String> = graph
            .impact_set([name], ImpactDirection::Dependencies)
            .into_iter()
            .filter(|n| self.is_known(n))
            .collect();
        let before = self.selected.len();
        self.selected.extend(closure);
        self.selected.len() - before
    }

    /// Deselect a package together with everything that depends on it
    pub fn deselect_with_dependents(&mut self, graph: &DependencyGraph, name: &str) -> usize {
        if !self.is_known(name) {
            return 0;
        }
        let closure = graph.impact_set([name], ImpactDirection::Dependents);
        let before = self.selected.len();
        for dependent in &closure {
            self.selected.remove(dependent);
        }
        before - self.selected.len()
    }

    /// Check whether a package is selected
    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// The selected package names, sorted
    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    /// Number of selected packages
    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Number of known packages
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether there are no known packages
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Packages that a build of this selection should receive.
    ///
    /// Without `include_dependencies` this is exactly the selection; with it,
    /// the selection plus all of its transitive dependencies.
    pub fn effective_build_set(
        &self,
        graph: &DependencyGraph,
        include_dependencies: bool,
    ) -> BTreeSet<String> {
        if include_dependencies {
            graph.impact_set(&self.selected, ImpactDirection::Dependencies)
        } else {
            self.selected.clone()
        }
    }
}
