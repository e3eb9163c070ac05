//! Iterative importance ranking over a [`SimilarityGraph`] and the final result ordering.

use crate::config::RankConfig;
use crate::graph::SimilarityGraph;
use crate::index::BookId;
use crate::query::{CandidateBook, SearchHit};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct Ranking {
    pub scores: BTreeMap<BookId, f64>,
    pub iterations: usize,
    /// The L1 change dropped below the tolerance before the iteration cap.
    pub converged: bool,
    /// Stopped early through the cancellation flag; `scores` holds the last full iteration.
    pub cancelled: bool,
}

pub fn rank(graph: &SimilarityGraph, config: &RankConfig) -> Ranking {
    rank_with_cancel(graph, config, &AtomicBool::new(false))
}

/// Damped random walk where a node passes its score to neighbours in proportion to edge
/// weight. Every node also receives `(1 - d) / N` teleport mass; isolated nodes get only that.
/// Updates are synchronous: each iteration reads the previous full score vector.
pub fn rank_with_cancel(graph: &SimilarityGraph, config: &RankConfig, cancel: &AtomicBool) -> Ranking {
    let n = graph.node_count();
    if n == 0 {
        return Ranking { converged: true, ..Ranking::default() };
    }
    let d = config.damping;
    let teleport = (1.0 - d) / n as f64;
    let strength: Vec<f64> = (0..n).map(|i| graph.strength(i)).collect();

    let mut scores = vec![1.0 / n as f64; n];
    let mut next = vec![0.0; n];
    let mut ranking = Ranking::default();

    while ranking.iterations < config.max_iterations {
        if cancel.load(Ordering::Relaxed) {
            ranking.cancelled = true;
            break;
        }
        for (i, slot) in next.iter_mut().enumerate() {
            let inflow: f64 = graph.adjacent(i).map(|(j, w)| scores[j] * w / strength[j]).sum();
            *slot = teleport + d * inflow;
        }
        let delta: f64 = scores.iter().zip(&next).map(|(old, new)| (old - new).abs()).sum();
        std::mem::swap(&mut scores, &mut next);
        ranking.iterations += 1;
        if delta < config.tolerance {
            ranking.converged = true;
            break;
        }
    }

    ranking.scores = graph.nodes().iter().copied().zip(scores).collect();
    ranking
}

/// Score descending, then aggregate count descending, then book id ascending.
pub fn order<'a, I>(candidates: I, scores: &BTreeMap<BookId, f64>) -> Vec<SearchHit>
where
    I: IntoIterator<Item = &'a CandidateBook>,
{
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|c| SearchHit {
            book_id: c.book_id,
            count: c.aggregate_count,
            score: scores.get(&c.book_id).copied().unwrap_or(0.0),
        })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.book_id.cmp(&b.book_id))
    });
    hits
}

/// Direct neighbours of the `top` books that are not themselves in `top`.
pub fn expand_neighbors(graph: &SimilarityGraph, top: &[BookId]) -> BTreeSet<BookId> {
    top.iter()
        .flat_map(|&book_id| graph.neighbors(book_id))
        .filter(|book_id| !top.contains(book_id))
        .collect()
}
