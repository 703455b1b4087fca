use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Topological order of node indices using Kahn's algorithm.
///
/// `deps[i]` lists the nodes `i` reads from. When several nodes are ready
/// the one declared first goes first. On a cycle, returns the nodes that
/// could never become ready, in declaration order.
pub(crate) fn topological_sort(deps: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); deps.len()];
    for (node, sources) in deps.iter().enumerate() {
        for &source in sources {
            dependents[source].push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(node, _)| Reverse(node))
        .collect();

    let mut sorted = Vec::with_capacity(deps.len());
    while let Some(Reverse(node)) = ready.pop() {
        sorted.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if sorted.len() != deps.len() {
        let stuck = (0..deps.len()).filter(|&n| in_degree[n] > 0).collect();
        return Err(stuck);
    }
    Ok(sorted)
}

/// Group `order` into dependency levels: a node's level is one more than the
/// deepest node it reads from. Nodes of one level never depend on each other.
pub(crate) fn levels(deps: &[Vec<usize>], order: &[usize]) -> Vec<Vec<usize>> {
    let mut depth = vec![0usize; deps.len()];
    let mut levels: Vec<Vec<usize>> = Vec::new();
    for &node in order {
        let level = deps[node].iter().map(|&s| depth[s] + 1).max().unwrap_or(0);
        depth[node] = level;
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(node);
    }
    for level in &mut levels {
        level.sort_unstable();
    }
    levels
}
