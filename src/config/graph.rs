//! Dependency-graph topological sort for server startup order.

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// Returns server names in an order where every server appears after all of
/// its declared dependencies, using Kahn's algorithm. Ties (servers with no
/// remaining unmet dependency at the same point) are broken by the order in
/// which names were first seen, so the sort is deterministic given the same
/// input map iteration.
///
/// Errors if a dependency names a server that isn't in `names`, or if the
/// graph contains a cycle.
pub fn topological_order(
    names: &[String],
    dependencies: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>> {
    let known: HashSet<&str> = names.iter().map(String::as_str).collect();
    for (server, deps) in dependencies {
        for dep in deps {
            if !known.contains(dep.as_str()) {
                return Err(Error::Config(format!(
                    "server '{server}' depends on unknown server '{dep}'"
                )));
            }
        }
    }

    let mut in_degree: HashMap<&str, usize> = names.iter().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = names.iter().map(|n| (n.as_str(), Vec::new())).collect();

    for name in names {
        let deps = dependencies.get(name).map(Vec::as_slice).unwrap_or(&[]);
        *in_degree.get_mut(name.as_str()).unwrap() = deps.len();
        for dep in deps {
            dependents.get_mut(dep.as_str()).unwrap().push(name.as_str());
        }
    }

    let mut queue: VecDeque<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| in_degree[n] == 0)
        .collect();

    let mut order = Vec::with_capacity(names.len());
    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        for dependent in &dependents[name] {
            let degree = in_degree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != names.len() {
        let stuck: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| !order.contains(&n.to_string()))
            .collect();
        return Err(Error::Config(format!(
            "dependency cycle detected among servers: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}
