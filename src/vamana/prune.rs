//! Robust (alpha) pruning for neighbor selection.

use super::Adjacency;

/// Select at most `max_degree` diverse neighbors for `node`.
///
/// Candidates are taken in ascending distance order. A candidate `c` is dropped
/// if some already selected neighbor `s` dominates it:
/// `alpha * d(s, c) <= d(node, c)`. With `alpha = 1` this is the relative
/// neighborhood rule; larger `alpha` keeps more long-range edges.
///
/// Duplicates and `node` itself are ignored. `distance_between` is only called
/// between candidates.
pub fn robust_prune<F>(
    node: u32,
    candidates: &mut Vec<(u32, f32)>,
    alpha: f32,
    max_degree: usize,
    distance_between: F,
) -> Adjacency
where
    F: Fn(u32, u32) -> f32,
{
    candidates.retain(|&(id, _)| id != node);
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut selected = Adjacency::new();
    let mut taken = std::collections::HashSet::with_capacity(candidates.len());

    'outer: for &(cand, cand_dist) in candidates.iter() {
        if !taken.insert(cand) {
            continue;
        }
        for &sel in selected.iter() {
            if alpha * distance_between(sel, cand) <= cand_dist {
                continue 'outer;
            }
        }
        selected.push(cand);
        if selected.len() >= max_degree {
            break;
        }
    }

    selected
}
