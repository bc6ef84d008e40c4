//! Task tree construction and deterministic execution ordering

use crate::error::{ArborError, Result};
use crate::types::TaskNode;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Dependency-ordered tree of task nodes
///
/// Built once upstream and handed to the executor read-only. The execution
/// order is computed eagerly at construction, so a cyclic or dangling
/// dependency graph is rejected before any work starts.
#[derive(Debug, Clone)]
pub struct TaskTree {
    tasks: HashMap<String, TaskNode>,
    roots: Vec<String>,
    execution_order: Vec<String>,
    /// Per-leaf dependencies with group targets expanded to leaf descendants
    leaf_deps: HashMap<String, Vec<String>>,
}

impl TaskTree {
    /// Build a tree from nodes, validating ids and computing execution order
    pub fn new(nodes: Vec<TaskNode>) -> Result<Self> {
        let mut tasks: HashMap<String, TaskNode> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id.clone();
            if tasks.insert(id.clone(), node).is_some() {
                return Err(ArborError::DuplicateTask(id));
            }
        }

        for node in tasks.values() {
            for dep in &node.depends_on {
                if !tasks.contains_key(dep) {
                    return Err(ArborError::TaskNotFound(format!(
                        "{} (depends_on of {})",
                        dep, node.id
                    )));
                }
            }
            for child in &node.children {
                if !tasks.contains_key(child) {
                    return Err(ArborError::TaskNotFound(format!(
                        "{} (child of {})",
                        child, node.id
                    )));
                }
            }
        }

        let mut roots: Vec<String> = tasks
            .values()
            .filter(|n| n.parent.is_none())
            .map(|n| n.id.clone())
            .collect();
        roots.sort();

        let leaf_deps = compute_leaf_dependencies(&tasks);
        let execution_order = compute_execution_order(&tasks, &leaf_deps)?;

        Ok(Self {
            tasks,
            roots,
            execution_order,
            leaf_deps,
        })
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.tasks.get(id)
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Leaf ids in deterministic execution order
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Leaf nodes (the scheduling units) in execution order
    pub fn leaves(&self) -> Vec<&TaskNode> {
        self.execution_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// A leaf's dependencies as leaf ids, with group targets expanded
    ///
    /// A task is ready only when every id returned here is complete.
    pub fn leaf_dependencies(&self, id: &str) -> &[String] {
        self.leaf_deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Expand every leaf's depends_on edges to leaf ids
///
/// A depends_on edge that targets a group node expands to all leaf
/// descendants of that group, since group completion is derived from its
/// children.
fn compute_leaf_dependencies(tasks: &HashMap<String, TaskNode>) -> HashMap<String, Vec<String>> {
    let leaf_set: HashSet<&str> = tasks
        .values()
        .filter(|n| n.is_leaf())
        .map(|n| n.id.as_str())
        .collect();

    tasks
        .values()
        .filter(|n| n.is_leaf())
        .map(|node| {
            let mut deps: BTreeSet<&str> = BTreeSet::new();
            for dep in &node.depends_on {
                expand_to_leaves(tasks, dep, &leaf_set, &mut deps);
            }
            deps.remove(node.id.as_str());
            (
                node.id.clone(),
                deps.into_iter().map(String::from).collect(),
            )
        })
        .collect()
}

/// Topological sort restricted to leaf nodes over the depends_on graph
///
/// Ties are broken by ascending task id so that identical input graphs
/// always produce identical orderings.
fn compute_execution_order(
    tasks: &HashMap<String, TaskNode>,
    leaf_deps: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>> {
    let mut leaf_ids: Vec<&str> = tasks
        .values()
        .filter(|n| n.is_leaf())
        .map(|n| n.id.as_str())
        .collect();
    leaf_ids.sort_unstable();

    // dep -> dependents, indegree per leaf
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indegree: HashMap<&str, usize> = leaf_ids.iter().map(|id| (*id, 0)).collect();

    for id in &leaf_ids {
        for dep in leaf_deps.get(*id).map(Vec::as_slice).unwrap_or(&[]) {
            dependents.entry(dep.as_str()).or_default().push(*id);
            if let Some(d) = indegree.get_mut(*id) {
                *d += 1;
            }
        }
    }

    // Kahn's algorithm with an ordered ready set for determinism
    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(leaf_ids.len());
    while let Some(id) = ready.iter().next().copied() {
        ready.remove(id);
        order.push(id.to_string());

        if let Some(next) = dependents.get(id) {
            for dependent in next {
                if let Some(d) = indegree.get_mut(*dependent) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
    }

    if order.len() != leaf_ids.len() {
        let mut stuck: Vec<&str> = indegree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| *id)
            .collect();
        stuck.sort_unstable();
        return Err(ArborError::Cycle(format!(
            "dependency cycle involving: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

/// Resolve a dependency target to leaf ids
///
/// A leaf target resolves to itself; a group target resolves to every leaf
/// descendant, since group completion is derived from its children.
fn expand_to_leaves<'a>(
    tasks: &'a HashMap<String, TaskNode>,
    id: &'a str,
    leaf_set: &HashSet<&str>,
    out: &mut BTreeSet<&'a str>,
) {
    if leaf_set.contains(id) {
        out.insert(id);
        return;
    }

    let mut stack = vec![id];
    let mut visited: HashSet<&str> = HashSet::new();
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        if let Some(node) = tasks.get(current) {
            if node.is_leaf() {
                out.insert(node.id.as_str());
            } else {
                for child in &node.children {
                    stack.push(child.as_str());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str, deps: &[&str]) -> TaskNode {
        TaskNode::new(id, id).with_depends_on(deps.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_execution_order_respects_dependencies() {
        let tree = TaskTree::new(vec![
            leaf("T003", &["T002"]),
            leaf("T001", &[]),
            leaf("T002", &["T001"]),
        ])
        .unwrap();

        assert_eq!(tree.execution_order(), &["T001", "T002", "T003"]);
    }

    #[test]
    fn test_execution_order_tie_break_is_ascending_id() {
        let tree = TaskTree::new(vec![leaf("T002", &[]), leaf("T001", &[]), leaf("T003", &[])])
            .unwrap();

        assert_eq!(tree.execution_order(), &["T001", "T002", "T003"]);
    }

    #[test]
    fn test_execution_order_is_deterministic() {
        let nodes = || {
            vec![
                leaf("T005", &["T001"]),
                leaf("T002", &[]),
                leaf("T004", &["T002"]),
                leaf("T001", &[]),
                leaf("T003", &["T001", "T002"]),
            ]
        };

        let first = TaskTree::new(nodes()).unwrap().execution_order().to_vec();
        for _ in 0..10 {
            let again = TaskTree::new(nodes()).unwrap().execution_order().to_vec();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_every_dependency_precedes_its_dependent() {
        let tree = TaskTree::new(vec![
            leaf("T001", &[]),
            leaf("T002", &["T001"]),
            leaf("T003", &["T001"]),
            leaf("T004", &["T002", "T003"]),
        ])
        .unwrap();

        let order = tree.execution_order();
        let index = |id: &str| order.iter().position(|t| t == id).unwrap();

        for node in tree.leaves() {
            for dep in &node.depends_on {
                assert!(index(dep) < index(&node.id), "{} before {}", dep, node.id);
            }
        }
    }

    #[test]
    fn test_cycle_is_rejected() {
        let result = TaskTree::new(vec![leaf("T001", &["T002"]), leaf("T002", &["T001"])]);
        assert!(matches!(result, Err(ArborError::Cycle(_))));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let result = TaskTree::new(vec![leaf("T001", &["T099"])]);
        assert!(matches!(result, Err(ArborError::TaskNotFound(_))));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let result = TaskTree::new(vec![leaf("T001", &[]), leaf("T001", &[])]);
        assert!(matches!(result, Err(ArborError::DuplicateTask(_))));
    }

    #[test]
    fn test_group_nodes_are_not_scheduled() {
        let mut group = TaskNode::new("G1", "Backend")
            .with_children(vec!["T001".to_string(), "T002".to_string()]);
        group.parent = None;

        let mut t1 = leaf("T001", &[]);
        t1.parent = Some("G1".to_string());
        let mut t2 = leaf("T002", &[]);
        t2.parent = Some("G1".to_string());

        let tree = TaskTree::new(vec![group, t1, t2]).unwrap();

        assert_eq!(tree.execution_order(), &["T001", "T002"]);
        assert_eq!(tree.roots(), &["G1"]);
    }

    #[test]
    fn test_group_dependency_expands_to_leaf_descendants() {
        let group = TaskNode::new("G1", "Storage")
            .with_children(vec!["T001".to_string(), "T002".to_string()]);

        let mut t1 = leaf("T001", &[]);
        t1.parent = Some("G1".to_string());
        let mut t2 = leaf("T002", &[]);
        t2.parent = Some("G1".to_string());

        // T003 depends on the group, so both its leaves must come first
        let t3 = leaf("T003", &["G1"]);

        let tree = TaskTree::new(vec![group, t1, t2, t3]).unwrap();
        let order = tree.execution_order();
        let index = |id: &str| order.iter().position(|t| t == id).unwrap();

        assert!(index("T001") < index("T003"));
        assert!(index("T002") < index("T003"));
        assert_eq!(tree.leaf_dependencies("T003"), &["T001", "T002"]);
        assert!(tree.leaf_dependencies("T001").is_empty());
    }
}
