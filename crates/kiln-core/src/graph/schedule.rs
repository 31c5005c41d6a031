//! Depth-based topological ordering.
//!
//! Each node's depth is `1 + max(depth of its inputs)`, with sources at depth
//! 0. Nodes are then stable-sorted by depth, so ties keep insertion order and
//! the resulting order is deterministic. Every node lands after all of its
//! inputs because an input's depth is strictly smaller.
//!
//! Depths are computed with an explicit stack rather than recursion, so deep
//! chains cannot overflow the thread stack.

/// Result of ordering one domain's nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Schedule {
    /// Node indices in execution order.
    pub order: Vec<usize>,
    /// Depth per node, indexed like the input.
    pub depth: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Order nodes whose inputs are given as indices.
///
/// Returns `Err(node)` if computing depths revisits `node` while its own depth
/// is still being computed, i.e. the graph contains a cycle through `node`.
pub(crate) fn schedule(inputs: &[Vec<usize>]) -> Result<Schedule, usize> {
    let n = inputs.len();
    let mut depth = vec![0usize; n];
    let mut mark = vec![Mark::Unvisited; n];
    // (node, next input to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if mark[root] != Mark::Unvisited {
            continue;
        }
        mark[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if let Some(&input) = inputs[node].get(frame.1) {
                frame.1 += 1;
                match mark[input] {
                    Mark::Done => {}
                    Mark::InProgress => return Err(input),
                    Mark::Unvisited => {
                        mark[input] = Mark::InProgress;
                        stack.push((input, 0));
                    }
                }
            } else {
                depth[node] = inputs[node]
                    .iter()
                    .map(|&i| depth[i] + 1)
                    .max()
                    .unwrap_or(0);
                mark[node] = Mark::Done;
                stack.pop();
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| depth[i]);
    Ok(Schedule { order, depth })
}
