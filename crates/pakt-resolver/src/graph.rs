//! Diagnostic dependency graph construction and traversal.
//!
//! Built after resolution completes, this graph backs the `tree` and
//! `why` views. It never influences placement; the hoister works from the
//! reference graph directly.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use pakt_core::pattern::normalize_pattern;

use crate::resolver::PackageResolver;

/// A node in the resolved dependency graph.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PackageNode {
    pub name: String,
    pub version: String,
}

impl PackageNode {
    /// `name@version` identifier.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl fmt::Display for PackageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Edge label in the dependency graph.
#[derive(Debug, Clone)]
pub struct DepEdge {
    pub optional: bool,
}

/// A resolved dependency graph backed by petgraph.
pub struct DependencyGraph {
    graph: DiGraph<PackageNode, DepEdge>,
    /// Lookup from `name@version` to node index.
    index: HashMap<String, NodeIndex>,
    pub root: Option<NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            root: None,
        }
    }

    /// Build the graph for everything the resolver resolved, rooted at
    /// the project itself.
    pub fn build(
        resolver: &PackageResolver,
        project_name: &str,
        project_version: &str,
        seed_patterns: &[String],
    ) -> Self {
        let mut graph = Self::new();
        let root = graph.add_node(PackageNode {
            name: project_name.to_string(),
            version: project_version.to_string(),
        });
        graph.set_root(root);

        let mut visited = HashSet::new();
        for pattern in resolver.dedupe_patterns(seed_patterns) {
            graph.add_subtree(resolver, &pattern, root, false, &mut visited);
        }
        graph
    }

    fn add_subtree(
        &mut self,
        resolver: &PackageResolver,
        pattern: &str,
        parent: NodeIndex,
        optional: bool,
        visited: &mut HashSet<String>,
    ) {
        let Some(resolution) = resolver.get_resolved_pattern(pattern) else {
            // an optional dependency that silently failed to resolve
            return;
        };
        let manifest = &resolution.manifest;
        let node = self.add_node(PackageNode {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
        });
        self.add_edge(parent, node, DepEdge { optional });

        if !visited.insert(pattern.to_string()) {
            return;
        }
        for dep_pattern in resolution.reference.dependencies() {
            let dep_name = normalize_pattern(&dep_pattern).name;
            let dep_optional = manifest.optional_dependencies.contains_key(&dep_name);
            self.add_subtree(resolver, &dep_pattern, node, dep_optional, visited);
        }
    }

    /// Add or retrieve a node. If the key already exists, returns the
    /// existing index.
    pub fn add_node(&mut self, node: PackageNode) -> NodeIndex {
        let key = node.key();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(node);
        self.index.insert(key, idx);
        idx
    }

    /// Set the root node of the graph (the project itself).
    pub fn set_root(&mut self, idx: NodeIndex) {
        self.root = Some(idx);
    }

    /// Add a dependency edge from `from` to `to`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    /// Look up a node by `name@version`.
    pub fn find(&self, key: &str) -> Option<NodeIndex> {
        self.index.get(key).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &PackageNode {
        &self.graph[idx]
    }

    /// Direct dependencies of a node.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    /// Reverse dependencies (who depends on this node).
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    /// Print the dependency tree to a string, splitting required and
    /// optional top-level dependencies into sections.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let root = match self.root {
            Some(r) => r,
            None => return output,
        };

        let root_node = &self.graph[root];
        output.push_str(&format!("{root_node}\n"));

        let deps = self.dependencies_of(root);
        let mut required: Vec<(NodeIndex, &DepEdge)> = Vec::new();
        let mut optional: Vec<(NodeIndex, &DepEdge)> = Vec::new();
        for (idx, edge) in &deps {
            if edge.optional {
                optional.push((*idx, edge));
            } else {
                required.push((*idx, edge));
            }
        }

        let show_headers = !optional.is_empty();
        let mut visited = HashSet::new();
        visited.insert(root);

        for (label, deps_list, is_last_section) in [
            ("[dependencies]", &required, optional.is_empty()),
            ("[optionalDependencies]", &optional, true),
        ] {
            if deps_list.is_empty() {
                continue;
            }
            if show_headers {
                output.push_str(&format!("{label}\n"));
            }
            let count = deps_list.len();
            for (i, (idx, _edge)) in deps_list.iter().enumerate() {
                let is_last = i == count - 1 && is_last_section;
                self.print_subtree(&mut output, *idx, "", is_last, 1, max_depth, &mut visited);
            }
        }

        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        output.push_str(&format!("{prefix}{connector}{node}\n"));

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, _)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(
                output,
                *child,
                &child_prefix,
                is_last,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// Find the path from the root to a specific package.
    ///
    /// Accepts either `name@version` or just `name` (first match wins).
    pub fn find_path(&self, target_key: &str) -> Option<Vec<&PackageNode>> {
        let root = self.root?;
        let target = self.resolve_key(target_key)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(root, target, &mut path, &mut visited) {
            Some(path.iter().map(|&idx| &self.graph[idx]).collect())
        } else {
            None
        }
    }

    /// Resolve a user-provided key to a node index.
    ///
    /// Tries exact `name@version` first, then falls back to matching by
    /// package name alone.
    fn resolve_key(&self, key: &str) -> Option<NodeIndex> {
        if let Some(&idx) = self.index.get(key) {
            return Some(idx);
        }
        for (full_key, &idx) in &self.index {
            let name = normalize_pattern(full_key).name;
            if name == key {
                return Some(idx);
            }
        }
        None
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for edge in self.graph.edges(current) {
            if self.dfs_path(edge.target(), target, path, visited) {
                return true;
            }
        }
        path.pop();
        visited.remove(&current);
        false
    }

    /// Build an inverted tree (reverse edges) answering "why is this
    /// package installed".
    pub fn print_inverted_tree(&self, target_key: &str) -> String {
        let mut output = String::new();
        let Some(idx) = self.resolve_key(target_key) else {
            return output;
        };

        let node = &self.graph[idx];
        output.push_str(&format!("{node}\n"));

        let mut visited = HashSet::new();
        visited.insert(idx);

        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, _)) in dependents.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_inverted_subtree(&mut output, *dep_idx, "", is_last, &mut visited);
        }

        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        output.push_str(&format!("{prefix}{connector}{node}\n"));

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, _)) in dependents.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_inverted_subtree(output, *dep_idx, &child_prefix, is_last, visited);
        }

        visited.remove(&idx);
    }

    /// Number of nodes (excluding root).
    pub fn len(&self) -> usize {
        let total = self.graph.node_count();
        if self.root.is_some() {
            total.saturating_sub(1)
        } else {
            total
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node(name: &str, version: &str) -> PackageNode {
        PackageNode {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn add_and_find() {
        let mut g = DependencyGraph::new();
        let idx = g.add_node(make_node("left-pad", "1.3.0"));
        assert_eq!(g.find("left-pad@1.3.0"), Some(idx));
        assert_eq!(g.node(idx).version, "1.3.0");
    }

    #[test]
    fn duplicate_add_returns_same_index() {
        let mut g = DependencyGraph::new();
        let idx1 = g.add_node(make_node("left-pad", "1.3.0"));
        let idx2 = g.add_node(make_node("left-pad", "1.3.0"));
        assert_eq!(idx1, idx2);
    }

    #[test]
    fn tree_printing() {
        let mut g = DependencyGraph::new();
        let root = g.add_node(make_node("app", "1.0.0"));
        g.set_root(root);

        let a = g.add_node(make_node("a", "1.0.0"));
        let b = g.add_node(make_node("b", "2.0.0"));
        let c = g.add_node(make_node("c", "3.0.0"));

        g.add_edge(root, a, DepEdge { optional: false });
        g.add_edge(root, b, DepEdge { optional: false });
        g.add_edge(a, c, DepEdge { optional: false });

        let tree = g.print_tree(None);
        assert!(tree.contains("app@1.0.0"));
        assert!(tree.contains("a@1.0.0"));
        assert!(tree.contains("b@2.0.0"));
        assert!(tree.contains("c@3.0.0"));
        // no optional section means no headers
        assert!(!tree.contains("[dependencies]"));
    }

    #[test]
    fn tree_splits_optional_section() {
        let mut g = DependencyGraph::new();
        let root = g.add_node(make_node("app", "1.0.0"));
        g.set_root(root);

        let a = g.add_node(make_node("a", "1.0.0"));
        let fs = g.add_node(make_node("fsevents", "2.0.0"));
        g.add_edge(root, a, DepEdge { optional: false });
        g.add_edge(root, fs, DepEdge { optional: true });

        let tree = g.print_tree(None);
        assert!(tree.contains("[dependencies]"));
        assert!(tree.contains("[optionalDependencies]"));
        let required_pos = tree.find("[dependencies]").unwrap();
        let optional_pos = tree.find("[optionalDependencies]").unwrap();
        assert!(required_pos < optional_pos);
    }

    #[test]
    fn find_path_exists() {
        let mut g = DependencyGraph::new();
        let root = g.add_node(make_node("app", "1.0.0"));
        g.set_root(root);

        let a = g.add_node(make_node("a", "1.0.0"));
        let b = g.add_node(make_node("b", "1.0.0"));
        g.add_edge(root, a, DepEdge { optional: false });
        g.add_edge(a, b, DepEdge { optional: false });

        let path = g.find_path("b@1.0.0").unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].name, "app");
        assert_eq!(path[1].name, "a");
        assert_eq!(path[2].name, "b");
    }

    #[test]
    fn find_path_partial_key() {
        let mut g = DependencyGraph::new();
        let root = g.add_node(make_node("app", "1.0.0"));
        g.set_root(root);
        let a = g.add_node(make_node("my-lib", "1.0.0"));
        g.add_edge(root, a, DepEdge { optional: false });

        let path = g.find_path("my-lib").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[1].name, "my-lib");
    }

    #[test]
    fn find_path_not_found() {
        let mut g = DependencyGraph::new();
        let root = g.add_node(make_node("app", "1.0.0"));
        g.set_root(root);
        assert!(g.find_path("missing@1.0.0").is_none());
    }

    #[test]
    fn inverted_tree_walks_dependents() {
        let mut g = DependencyGraph::new();
        let root = g.add_node(make_node("app", "1.0.0"));
        g.set_root(root);
        let a = g.add_node(make_node("a", "1.0.0"));
        let b = g.add_node(make_node("b", "1.0.0"));
        g.add_edge(root, a, DepEdge { optional: false });
        g.add_edge(a, b, DepEdge { optional: false });

        let inverted = g.print_inverted_tree("b");
        assert!(inverted.contains("b@1.0.0"));
        assert!(inverted.contains("a@1.0.0"));
        assert!(inverted.contains("app@1.0.0"));
    }
}
