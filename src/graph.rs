//! Static view of task references
//!
//! Uses petgraph to model which tasks compose which. Nothing here runs
//! tasks; it backs `runnel check` and `runnel graph`.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::task::TaskKind;

/// How a composite task refers to a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Sequence,
    Parallel,
}

/// A node in the task graph
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub name: String,
    pub kind: &'static str,
    pub description: Option<String>,
    /// Members in declaration order
    pub members: Vec<String>,
    /// Paths and patterns a files task deletes or writes
    pub file_targets: Vec<String>,
}

/// A member name that no task defines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    pub from: String,
    pub to: String,
}

/// Two members of one parallel group touching overlapping paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub group: String,
    pub first: (String, String),
    pub second: (String, String),
}

/// The task reference graph
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskNode, EdgeKind>,
    name_to_index: HashMap<String, NodeIndex>,
    missing: Vec<MissingReference>,
}

impl TaskGraph {
    /// Build a task graph from configuration
    pub fn from_config(config: &Config) -> Self {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for name in config.sorted_task_names() {
            let Some(task) = config.get_task(name) else {
                continue;
            };
            let file_targets = match &task.kind {
                TaskKind::Files(ops) => ops.targets().map(String::from).collect(),
                _ => Vec::new(),
            };
            let idx = graph.add_node(TaskNode {
                name: name.to_string(),
                kind: task.kind.label(),
                description: task.description.clone(),
                members: task.kind.members().to_vec(),
                file_targets,
            });
            name_to_index.insert(name.to_string(), idx);
        }

        let mut missing = Vec::new();
        for name in config.sorted_task_names() {
            let Some(task) = config.get_task(name) else {
                continue;
            };
            let edge = match &task.kind {
                TaskKind::Sequence(_) => EdgeKind::Sequence,
                TaskKind::Parallel(_) => EdgeKind::Parallel,
                _ => continue,
            };
            let from = name_to_index[name];

            for member in task.kind.members() {
                match name_to_index.get(member) {
                    Some(&to) => {
                        graph.add_edge(from, to, edge);
                    }
                    None => missing.push(MissingReference {
                        from: name.to_string(),
                        to: member.clone(),
                    }),
                }
            }
        }

        Self {
            graph,
            name_to_index,
            missing,
        }
    }

    /// References to tasks that are not defined
    pub fn missing_references(&self) -> &[MissingReference] {
        &self.missing
    }

    /// A cycle, described as `a -> b -> a`, if one exists
    pub fn find_cycle(&self) -> Option<String> {
        if !is_cyclic_directed(&self.graph) {
            return None;
        }

        let mut starts: Vec<_> = self.name_to_index.iter().collect();
        starts.sort_by(|a, b| a.0.cmp(b.0));

        for (_, &start) in starts {
            let mut path = vec![start];
            let mut visited = HashSet::new();
            if self.dfs_find_cycle(start, start, &mut visited, &mut path) {
                let names: Vec<&str> = path.iter().map(|&i| self.graph[i].name.as_str()).collect();
                return Some(names.join(" -> "));
            }
        }

        Some("unknown cycle".to_string())
    }

    fn dfs_find_cycle(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> bool {
        for neighbor in self.graph.neighbors(current) {
            if neighbor == target {
                path.push(target);
                return true;
            }

            if visited.insert(neighbor) {
                path.push(neighbor);
                if self.dfs_find_cycle(neighbor, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }

        false
    }

    /// Get a task node by name
    pub fn get_task(&self, name: &str) -> Option<&TaskNode> {
        self.name_to_index.get(name).map(|&idx| &self.graph[idx])
    }

    /// All task names, sorted
    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.name_to_index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `name` and every task reachable from it, sorted by name
    pub fn reachable(&self, name: &str) -> Vec<&TaskNode> {
        let Some(&start) = self.name_to_index.get(name) else {
            return Vec::new();
        };

        let mut nodes = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(idx) = dfs.next(&self.graph) {
            nodes.push(&self.graph[idx]);
        }
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Edges out of a task, as `(member, kind)` in declaration order
    pub fn edges(&self, name: &str) -> Vec<(&str, EdgeKind)> {
        let Some(node) = self.get_task(name) else {
            return Vec::new();
        };
        let edge = match node.kind {
            "sequence" => EdgeKind::Sequence,
            "parallel" => EdgeKind::Parallel,
            _ => return Vec::new(),
        };
        node.members
            .iter()
            .filter(|m| self.name_to_index.contains_key(m.as_str()))
            .map(|m| (m.as_str(), edge))
            .collect()
    }

    /// Advisory lint: parallel groups whose members may touch the same files
    pub fn parallel_overlaps(&self) -> Vec<Overlap> {
        let mut overlaps = Vec::new();

        for name in self.task_names() {
            let Some(node) = self.get_task(name) else {
                continue;
            };
            if node.kind != "parallel" {
                continue;
            }

            let per_member: Vec<(&str, Vec<&str>)> = node
                .members
                .iter()
                .map(|m| (m.as_str(), self.file_targets_from(m)))
                .collect();

            for (i, (first, first_targets)) in per_member.iter().enumerate() {
                for (second, second_targets) in &per_member[i + 1..] {
                    if first == second {
                        continue;
                    }
                    for a in first_targets {
                        for b in second_targets {
                            if patterns_overlap(a, b) {
                                overlaps.push(Overlap {
                                    group: name.to_string(),
                                    first: (first.to_string(), a.to_string()),
                                    second: (second.to_string(), b.to_string()),
                                });
                            }
                        }
                    }
                }
            }
        }

        overlaps
    }

    /// File targets of every files task reachable from `name`
    fn file_targets_from(&self, name: &str) -> Vec<&str> {
        self.reachable(name)
            .into_iter()
            .flat_map(|node| node.file_targets.iter().map(String::as_str))
            .collect()
    }
}

/// Leading path components that contain no glob syntax
fn literal_prefix(pattern: &str) -> PathBuf {
    Path::new(pattern)
        .components()
        .take_while(|c| match c {
            Component::Normal(part) => !part.to_string_lossy().contains(['*', '?', '[', '{']),
            _ => true,
        })
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Whether two patterns could name the same path
fn patterns_overlap(a: &str, b: &str) -> bool {
    let a = literal_prefix(a);
    let b = literal_prefix(b);
    a.starts_with(&b) || b.starts_with(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(toml: &str) -> Config {
        Config::parse(toml, Path::new("runnel.toml")).unwrap()
    }

    #[test]
    fn test_missing_references() {
        let config = make_config(
            r#"
            [tasks.build]
            command = "cargo build"

            [tasks.deploy]
            sequence = ["build", "upload"]
        "#,
        );
        let graph = TaskGraph::from_config(&config);

        assert_eq!(
            graph.missing_references(),
            &[MissingReference {
                from: "deploy".into(),
                to: "upload".into()
            }]
        );
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_cycle_detection() {
        let config = make_config(
            r#"
            [tasks.a]
            sequence = ["b"]

            [tasks.b]
            parallel = ["c"]

            [tasks.c]
            sequence = ["a"]
        "#,
        );
        let graph = TaskGraph::from_config(&config);

        assert_eq!(graph.find_cycle().as_deref(), Some("a -> b -> c -> a"));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let config = make_config(
            r#"
            [tasks.again]
            sequence = ["again"]
        "#,
        );
        let graph = TaskGraph::from_config(&config);

        assert_eq!(graph.find_cycle().as_deref(), Some("again -> again"));
    }

    #[test]
    fn test_repeated_member_is_not_a_cycle() {
        let config = make_config(
            r#"
            [tasks.build]
            command = "echo build"

            [tasks.deploy]
            sequence = ["build", "build"]
        "#,
        );
        let graph = TaskGraph::from_config(&config);

        assert!(graph.find_cycle().is_none());
        assert_eq!(
            graph.edges("deploy"),
            vec![("build", EdgeKind::Sequence), ("build", EdgeKind::Sequence)]
        );
    }

    #[test]
    fn test_reachable() {
        let config = make_config(
            r#"
            [tasks.a]
            command = "true"

            [tasks.b]
            command = "true"

            [tasks.ab]
            parallel = ["a", "b"]

            [tasks.unrelated]
            command = "true"
        "#,
        );
        let graph = TaskGraph::from_config(&config);
        let names: Vec<_> = graph.reachable("ab").iter().map(|n| n.name.as_str()).collect();

        assert_eq!(names, vec!["a", "ab", "b"]);
    }

    #[test]
    fn test_parallel_overlap_lint() {
        let config = make_config(
            r#"
            [tasks.clean]
            files = { delete = ["dist/**"] }

            [tasks.bundle]
            sequence = ["copy-assets"]

            [tasks.copy-assets]
            files = { copy = { "assets" = "dist/assets" } }

            [tasks.docs]
            files = { delete = ["site/**"] }

            [tasks.race]
            parallel = ["clean", "bundle"]

            [tasks.fine]
            parallel = ["clean", "docs"]
        "#,
        );
        let graph = TaskGraph::from_config(&config);
        let overlaps = graph.parallel_overlaps();

        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].group, "race");
        assert_eq!(overlaps[0].first, ("clean".to_string(), "dist/**".to_string()));
        assert_eq!(
            overlaps[0].second,
            ("bundle".to_string(), "dist/assets".to_string())
        );
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("dist/**/*.js"), PathBuf::from("dist"));
        assert_eq!(literal_prefix("./build/out"), PathBuf::from("build/out"));
        assert_eq!(literal_prefix("**/*.log"), PathBuf::new());
        assert!(patterns_overlap("**/*.log", "anything"));
        assert!(!patterns_overlap("dist/*", "distribution/*"));
    }
}
