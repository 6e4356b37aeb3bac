//! Topological ordering over a composite tool's `dependsOn` graph.
//!
//! Shares the DFS-with-recursion-stack shape used by
//! `config::validate::find_cycle` (itself grounded on the teacher's
//! `mcp/registry/validation.rs` dependency-cycle detector), but this copy
//! additionally produces the execution order the engine walks, not just a
//! yes/no acyclic check.

use std::collections::{HashMap, HashSet};

use crate::config::model::WorkflowStep;

use super::executor::WorkflowError;

/// Kahn's algorithm: repeatedly remove steps with no unsatisfied
/// dependency, breaking ties by original declaration order so the
/// resulting order is deterministic.
pub fn topological_order(steps: &[WorkflowStep]) -> Result<Vec<String>, WorkflowError> {
    let index_of: HashMap<&str, usize> = steps.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();

    let mut in_degree: HashMap<&str, usize> = steps.iter().map(|s| (s.id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        for dep in &step.depends_on {
            *in_degree.get_mut(step.id.as_str()).expect("step id present") += 1;
            dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut ready: Vec<&str> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
    ready.sort_by_key(|id| index_of[id]);

    let mut order = Vec::with_capacity(steps.len());
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some(id) = ready.first().copied() {
        ready.remove(0);
        visited.insert(id);
        order.push(id.to_string());

        let mut newly_ready = Vec::new();
        if let Some(deps) = dependents.get(id) {
            for &dependent in deps {
                let degree = in_degree.get_mut(dependent).expect("dependent present");
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(dependent);
                }
            }
        }
        newly_ready.sort_by_key(|id| index_of[id]);
        ready.extend(newly_ready);
        ready.sort_by_key(|id| index_of[id]);
    }

    if order.len() != steps.len() {
        return Err(WorkflowError::DependencyCycle);
    }

    Ok(order)
}
