//! Compiles a [`TaskModel`] tree into a flat, validated, thread-grouped
//! plan (spec.md §4.1). This module performs every *static* compilation
//! step; wiring functions/arguments and actually running threads is
//! `chk-runtime`'s job — this crate hands back a [`CompiledGraph`] that
//! names tasks and their prerequisites but knows nothing about execution.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use orion_error::{StructError, prelude::*};

use crate::error::{CoreError, CoreReason, CoreResult};
use crate::model::{TaskModel, is_valid_name};

/// One leaf task after flattening, prerequisite expansion, validation,
/// transitive reduction, and topological sort.
#[derive(Debug, Clone)]
pub struct ResolvedLeaf {
    pub name: String,
    /// Placeholder-resolved prompt text.
    pub description: String,
    pub only_auto: bool,
    /// Immediate prerequisites only (redundant transitive edges removed).
    pub prerequisites: BTreeSet<String>,
    /// 1-based display index; deterministic given the same `TaskModel`
    /// (topological order, earliest-document-order tie-break).
    pub index: usize,
}

/// A maximal chain of tasks sharing one thread (spec.md §3 TaskThread).
#[derive(Debug, Clone)]
pub struct ThreadPlan {
    /// PascalCase of the last task's name.
    pub name: String,
    /// Tasks to run serially, in execution order.
    pub task_names: Vec<String>,
    /// Indices into [`CompiledGraph::threads`] that must finish first.
    pub prerequisite_threads: Vec<usize>,
}

/// The static result of compiling a [`TaskModel`].
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    /// In topological (= display-index) order.
    pub leaves: Vec<ResolvedLeaf>,
    pub threads: Vec<ThreadPlan>,
}

impl CompiledGraph {
    pub fn leaf(&self, name: &str) -> Option<&ResolvedLeaf> {
        self.leaves.iter().find(|l| l.name == name)
    }

    pub fn task_names(&self) -> Vec<String> {
        self.leaves.iter().map(|l| l.name.clone()).collect()
    }
}

struct RawLeaf {
    name: String,
    description: String,
    only_auto: bool,
    /// Prerequisite names as authored directly on this node (pre-expansion).
    own_prerequisites: BTreeSet<String>,
    /// Prerequisites after ancestor-containment propagation, pre-expansion.
    propagated_prerequisites: BTreeSet<String>,
    doc_order: usize,
}

/// Compile a validated [`TaskModel`] into a [`CompiledGraph`].
///
/// `resolve` fills `%{key}%` placeholders in leaf descriptions (spec.md
/// §3); it is fallible so that Config can reject unknown placeholders.
pub fn compile(
    model: &TaskModel,
    resolve: &dyn Fn(&str) -> CoreResult<String>,
) -> CoreResult<CompiledGraph> {
    let mut all_names: HashSet<String> = HashSet::new();
    let mut duplicate_names: BTreeSet<String> = BTreeSet::new();
    let mut inner_descendants: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut raw_leaves: Vec<RawLeaf> = Vec::new();
    let mut doc_order = 0usize;

    collect(
        model,
        &BTreeSet::new(),
        &mut all_names,
        &mut duplicate_names,
        &mut inner_descendants,
        &mut raw_leaves,
        &mut doc_order,
    )?;

    if !duplicate_names.is_empty() {
        return Err(schema_err(format!(
            "Duplicate task names: {}.",
            duplicate_names.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    // Expand: replace dependencies on inner nodes with deps on every leaf
    // beneath them; reject unresolvable names; drop self-deps that arose
    // only through propagation/expansion (direct self-deps are already an
    // error, checked in `collect`).
    let leaf_names: HashSet<String> = raw_leaves.iter().map(|l| l.name.clone()).collect();
    let mut expanded: Vec<(String, BTreeSet<String>)> = Vec::with_capacity(raw_leaves.len());
    for leaf in &raw_leaves {
        let mut deps: BTreeSet<String> = BTreeSet::new();
        for dep in &leaf.propagated_prerequisites {
            if leaf_names.contains(dep) {
                deps.insert(dep.clone());
            } else if let Some(descendants) = inner_descendants.get(dep) {
                for d in descendants {
                    deps.insert(d.clone());
                }
            } else {
                return Err(schema_err(format!(
                    "The prerequisite '{dep}' could not be found."
                )));
            }
        }
        deps.remove(&leaf.name);
        expanded.push((leaf.name.clone(), deps));
    }

    let mut prereqs_of: BTreeMap<String, BTreeSet<String>> = expanded.into_iter().collect();
    detect_cycle(&prereqs_of)?;
    reduce_transitively(&mut prereqs_of);

    let order = topological_order(&raw_leaves, &prereqs_of)?;

    let mut resolved: Vec<ResolvedLeaf> = Vec::with_capacity(order.len());
    let raw_by_name: BTreeMap<&str, &RawLeaf> =
        raw_leaves.iter().map(|l| (l.name.as_str(), l)).collect();
    for (idx, name) in order.iter().enumerate() {
        let raw = raw_by_name[name.as_str()];
        let description = resolve(&raw.description)?;
        resolved.push(ResolvedLeaf {
            name: name.clone(),
            description,
            only_auto: raw.only_auto,
            prerequisites: prereqs_of.remove(name).unwrap_or_default(),
            index: idx + 1,
        });
    }

    let threads = group_into_threads(&resolved);

    Ok(CompiledGraph {
        leaves: resolved,
        threads,
    })
}

fn schema_err(msg: impl Into<String>) -> CoreError {
    StructError::from(CoreReason::Schema).with_detail(msg.into())
}

fn cycle_err(example: &[String]) -> CoreError {
    let joined = example.join(" -> ");
    StructError::from(CoreReason::Cycle).with_detail(format!(
        "The task graph contains at least one cycle. For example: {joined}."
    ))
}

#[allow(clippy::too_many_arguments)]
fn collect(
    node: &TaskModel,
    inherited: &BTreeSet<String>,
    all_names: &mut HashSet<String>,
    duplicates: &mut BTreeSet<String>,
    inner_descendants: &mut BTreeMap<String, Vec<String>>,
    raw_leaves: &mut Vec<RawLeaf>,
    doc_order: &mut usize,
) -> CoreResult<()> {
    if !is_valid_name(&node.name) {
        return Err(schema_err(format!(
            "Task name '{}' is not a valid identifier.",
            node.name
        )));
    }

    if !all_names.insert(node.name.clone()) {
        duplicates.insert(node.name.clone());
    }

    if node.is_leaf() {
        if node.prerequisites.contains(&node.name) {
            return Err(schema_err(format!(
                "Task '{}' lists itself as a prerequisite.",
                node.name
            )));
        }
        let description = node.description.clone().ok_or_else(|| {
            schema_err(format!("Leaf task '{}' is missing a description.", node.name))
        })?;
        let mut propagated = inherited.clone();
        for p in &node.prerequisites {
            propagated.insert(p.clone());
        }
        raw_leaves.push(RawLeaf {
            name: node.name.clone(),
            description,
            only_auto: node.only_auto,
            own_prerequisites: node.prerequisites.clone(),
            propagated_prerequisites: propagated,
            doc_order: *doc_order,
        });
        *doc_order += 1;
        return Ok(());
    }

    if node.description.is_some() {
        return Err(schema_err(format!(
            "Inner task '{}' must not have a description.",
            node.name
        )));
    }

    let mut combined = inherited.clone();
    for p in &node.prerequisites {
        combined.insert(p.clone());
    }

    let before = raw_leaves.len();
    for child in &node.subtasks {
        collect(
            child,
            &combined,
            all_names,
            duplicates,
            inner_descendants,
            raw_leaves,
            doc_order,
        )?;
    }
    let descendants: Vec<String> = raw_leaves[before..].iter().map(|l| l.name.clone()).collect();
    inner_descendants.insert(node.name.clone(), descendants);

    Ok(())
}

fn detect_cycle(prereqs_of: &BTreeMap<String, BTreeSet<String>>) -> CoreResult<()> {
    #[derive(PartialEq, Clone, Copy)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    let mut stack: Vec<String> = Vec::new();

    fn visit<'a>(
        name: &'a str,
        prereqs_of: &'a BTreeMap<String, BTreeSet<String>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<String>,
    ) -> CoreResult<()> {
        if let Some(Mark::Done) = marks.get(name) {
            return Ok(());
        }
        if let Some(Mark::Visiting) = marks.get(name) {
            let start = stack.iter().position(|n| n == name).unwrap_or(0);
            let mut example: Vec<String> = stack[start..].to_vec();
            example.push(name.to_string());
            return Err(cycle_err(&example));
        }
        marks.insert(name, Mark::Visiting);
        stack.push(name.to_string());
        if let Some(deps) = prereqs_of.get(name) {
            for dep in deps {
                visit(dep, prereqs_of, marks, stack)?;
            }
        }
        stack.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    for name in prereqs_of.keys() {
        visit(name, prereqs_of, &mut marks, &mut stack)?;
    }
    Ok(())
}

/// `reach(x)` = every node transitively reachable from `x` by following
/// prerequisite edges, excluding `x` itself.
fn reachable_sets(prereqs_of: &BTreeMap<String, BTreeSet<String>>) -> BTreeMap<String, BTreeSet<String>> {
    let mut memo: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    fn compute(
        name: &str,
        prereqs_of: &BTreeMap<String, BTreeSet<String>>,
        memo: &mut BTreeMap<String, BTreeSet<String>>,
    ) -> BTreeSet<String> {
        if let Some(cached) = memo.get(name) {
            return cached.clone();
        }
        let mut result = BTreeSet::new();
        if let Some(deps) = prereqs_of.get(name) {
            for dep in deps {
                result.insert(dep.clone());
                let sub = compute(dep, prereqs_of, memo);
                result.extend(sub);
            }
        }
        memo.insert(name.to_string(), result.clone());
        result
    }

    for name in prereqs_of.keys() {
        compute(name, prereqs_of, &mut memo);
    }
    memo
}

/// Keep only immediate prerequisites: drop `p` from a task's prerequisite
/// set if `p` is also reachable from another of that task's prerequisites.
fn reduce_transitively(prereqs_of: &mut BTreeMap<String, BTreeSet<String>>) {
    let reach = reachable_sets(prereqs_of);
    for (_, deps) in prereqs_of.iter_mut() {
        let snapshot: Vec<String> = deps.iter().cloned().collect();
        for p in &snapshot {
            let redundant = snapshot.iter().any(|q| {
                q != p
                    && reach
                        .get(q)
                        .map(|r| r.contains(p))
                        .unwrap_or(false)
            });
            if redundant {
                deps.remove(p);
            }
        }
    }
}

/// Stable topological sort: among ready tasks, prefer the earliest
/// document order.
fn topological_order(
    raw_leaves: &[RawLeaf],
    prereqs_of: &BTreeMap<String, BTreeSet<String>>,
) -> CoreResult<Vec<String>> {
    let doc_order: BTreeMap<&str, usize> = raw_leaves
        .iter()
        .map(|l| (l.name.as_str(), l.doc_order))
        .collect();

    let mut remaining: BTreeSet<String> = raw_leaves.iter().map(|l| l.name.clone()).collect();
    let mut done: BTreeSet<String> = BTreeSet::new();
    let mut order: Vec<String> = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut ready: Vec<&String> = remaining
            .iter()
            .filter(|name| {
                prereqs_of
                    .get(name.as_str())
                    .map(|deps| deps.iter().all(|d| done.contains(d)))
                    .unwrap_or(true)
            })
            .collect();
        ready.sort_by_key(|name| doc_order[name.as_str()]);
        let Some(next) = ready.into_iter().next() else {
            // Should be unreachable: detect_cycle already ran.
            return Err(cycle_err(&["?".to_string(), "?".to_string()]));
        };
        let next = next.clone();
        remaining.remove(&next);
        done.insert(next.clone());
        order.push(next);
    }

    Ok(order)
}

/// Group the topologically sorted leaves into maximal unique-chains
/// (spec.md §4.1 Step 6).
fn group_into_threads(leaves: &[ResolvedLeaf]) -> Vec<ThreadPlan> {
    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for leaf in leaves {
        for p in &leaf.prerequisites {
            successors.entry(p.as_str()).or_default().push(leaf.name.as_str());
        }
    }

    let mut thread_of: BTreeMap<&str, usize> = BTreeMap::new();
    let mut threads: Vec<Vec<&str>> = Vec::new();

    for leaf in leaves.iter().rev() {
        if thread_of.contains_key(leaf.name.as_str()) {
            continue;
        }
        let mut chain: Vec<&str> = vec![leaf.name.as_str()];
        let mut current = leaf;
        loop {
            if current.prerequisites.len() != 1 {
                break;
            }
            let pred_name = current.prerequisites.iter().next().unwrap().as_str();
            let pred_successors = successors.get(pred_name).map(|v| v.len()).unwrap_or(0);
            if pred_successors != 1 {
                break;
            }
            let Some(pred_leaf) = leaves.iter().find(|l| l.name == pred_name) else {
                break;
            };
            chain.insert(0, pred_name);
            current = pred_leaf;
        }
        let idx = threads.len();
        for name in &chain {
            thread_of.insert(name, idx);
        }
        threads.push(chain);
    }

    let mut plans: Vec<ThreadPlan> = Vec::with_capacity(threads.len());
    for chain in &threads {
        let first_name = chain[0];
        let first_leaf = leaves.iter().find(|l| l.name == first_name).unwrap();
        let mut prereq_threads: BTreeSet<usize> = BTreeSet::new();
        for p in &first_leaf.prerequisites {
            if let Some(&t) = thread_of.get(p.as_str()) {
                prereq_threads.insert(t);
            }
        }
        let last_name = chain[chain.len() - 1];
        plans.push(ThreadPlan {
            name: snake_to_pascal(last_name),
            task_names: chain.iter().map(|s| s.to_string()).collect(),
            prerequisite_threads: prereq_threads.into_iter().collect(),
        });
    }
    plans
}

fn snake_to_pascal(snake: &str) -> String {
    snake
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_placeholders(s: &str) -> CoreResult<String> {
        Ok(s.to_string())
    }

    #[test]
    fn linear_chain_groups_into_one_thread() {
        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::leaf("a", "a"),
                TaskModel::leaf("b", "b").with_prerequisites(["a"]),
                TaskModel::leaf("c", "c").with_prerequisites(["b"]),
            ],
        );
        let graph = compile(&model, &no_placeholders).unwrap();
        assert_eq!(graph.leaves.len(), 3);
        assert_eq!(graph.leaf("a").unwrap().index, 1);
        assert_eq!(graph.leaf("b").unwrap().index, 2);
        assert_eq!(graph.leaf("c").unwrap().index, 3);
        assert_eq!(graph.threads.len(), 1);
        assert_eq!(graph.threads[0].task_names, vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_creates_parallel_threads() {
        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::leaf("a", "a"),
                TaskModel::leaf("b", "b").with_prerequisites(["a"]),
                TaskModel::leaf("c", "c").with_prerequisites(["a"]),
                TaskModel::leaf("d", "d").with_prerequisites(["b", "c"]),
            ],
        );
        let graph = compile(&model, &no_placeholders).unwrap();
        assert_eq!(graph.leaf("a").unwrap().index, 1);
        assert_eq!(graph.leaf("b").unwrap().index, 2);
        assert_eq!(graph.leaf("c").unwrap().index, 3);
        assert_eq!(graph.leaf("d").unwrap().index, 4);
        // a, b, c, d: a has 2 successors -> its own thread; b and c each
        // have 1 successor (d) but d has 2 predecessors, so no merging.
        assert_eq!(graph.threads.len(), 4);
    }

    #[test]
    fn inner_prerequisite_expands_to_all_leaves() {
        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::inner(
                    "group",
                    vec![TaskModel::leaf("a", "a"), TaskModel::leaf("b", "b")],
                ),
                TaskModel::leaf("c", "c").with_prerequisites(["group"]),
            ],
        );
        let graph = compile(&model, &no_placeholders).unwrap();
        let c = graph.leaf("c").unwrap();
        assert!(c.prerequisites.contains("a"));
        assert!(c.prerequisites.contains("b"));
    }

    #[test]
    fn ancestor_containment_propagates_prerequisites() {
        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::leaf("a", "a"),
                TaskModel::inner(
                    "group",
                    vec![TaskModel::leaf("b", "b"), TaskModel::leaf("c", "c")],
                )
                .with_prerequisites(["a"]),
            ],
        );
        let graph = compile(&model, &no_placeholders).unwrap();
        assert!(graph.leaf("b").unwrap().prerequisites.contains("a"));
        assert!(graph.leaf("c").unwrap().prerequisites.contains("a"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let model = TaskModel::inner(
            "root",
            vec![TaskModel::leaf("a", "a"), TaskModel::leaf("a", "a2")],
        );
        assert!(compile(&model, &no_placeholders).is_err());
    }

    #[test]
    fn malformed_task_name_rejected() {
        let model = TaskModel::inner("root", vec![TaskModel::leaf("not a name", "a")]);
        assert!(compile(&model, &no_placeholders).is_err());
    }

    #[test]
    fn unresolved_prerequisite_rejected() {
        let model =
            TaskModel::inner("root", vec![TaskModel::leaf("a", "a").with_prerequisites(["ghost"])]);
        assert!(compile(&model, &no_placeholders).is_err());
    }

    #[test]
    fn cycle_rejected() {
        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::leaf("a", "a").with_prerequisites(["c"]),
                TaskModel::leaf("b", "b").with_prerequisites(["a"]),
                TaskModel::leaf("c", "c").with_prerequisites(["b"]),
            ],
        );
        assert!(compile(&model, &no_placeholders).is_err());
    }

    #[test]
    fn inner_node_with_description_rejected() {
        let mut model =
            TaskModel::inner("root", vec![TaskModel::leaf("a", "a")]);
        model.subtasks[0].subtasks.push(TaskModel::leaf("x", "x"));
        model.subtasks[0].description = Some("oops".to_string());
        assert!(compile(&model, &no_placeholders).is_err());
    }

    #[test]
    fn transitive_reduction_keeps_only_immediate_edge() {
        // a <- b <- c, and c also directly lists a (redundant, implied by b).
        let model = TaskModel::inner(
            "root",
            vec![
                TaskModel::leaf("a", "a"),
                TaskModel::leaf("b", "b").with_prerequisites(["a"]),
                TaskModel::leaf("c", "c").with_prerequisites(["a", "b"]),
            ],
        );
        let graph = compile(&model, &no_placeholders).unwrap();
        let c = graph.leaf("c").unwrap();
        assert_eq!(c.prerequisites.len(), 1);
        assert!(c.prerequisites.contains("b"));
    }
}
