//! Weighted undirected book graph built from shared matched terms.

use crate::index::BookId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub a: BookId,
    pub b: BookId,
    pub weight: f64,
}

/// Nodes are kept in insertion order (ascending book id when built from a query) and
/// addressed internally by position.
#[derive(Debug, Clone, Default)]
pub struct SimilarityGraph {
    nodes: Vec<BookId>,
    positions: HashMap<BookId, usize>,
    adjacency: Vec<BTreeMap<usize, f64>>,
}

impl SimilarityGraph {
    pub fn with_nodes<I: IntoIterator<Item = BookId>>(nodes: I) -> Self {
        let mut graph = Self::default();
        for book_id in nodes {
            graph.add_node(book_id);
        }
        graph
    }

    /// Connects every pair of books whose matched-term sets intersect, weighted by the
    /// Jaccard coefficient of those sets. Books sharing nothing stay isolated nodes.
    pub fn build(matched: &BTreeMap<String, BTreeSet<BookId>>) -> Self {
        let mut term_counts: BTreeMap<BookId, usize> = BTreeMap::new();
        for books in matched.values() {
            for &book_id in books {
                *term_counts.entry(book_id).or_insert(0) += 1;
            }
        }
        let mut graph = Self::with_nodes(term_counts.keys().copied());

        // shared[(i, j)] with i < j counts the terms both books matched
        let mut shared: HashMap<(usize, usize), usize> = HashMap::new();
        for books in matched.values() {
            let members: Vec<usize> = books.iter().map(|b| graph.positions[b]).collect();
            for (k, &i) in members.iter().enumerate() {
                for &j in &members[k + 1..] {
                    *shared.entry((i.min(j), i.max(j))).or_insert(0) += 1;
                }
            }
        }
        for ((i, j), intersection) in shared {
            let union = term_counts[&graph.nodes[i]] + term_counts[&graph.nodes[j]] - intersection;
            graph.connect(i, j, intersection as f64 / union as f64);
        }
        graph
    }

    pub fn add_node(&mut self, book_id: BookId) -> usize {
        if let Some(&i) = self.positions.get(&book_id) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(book_id);
        self.positions.insert(book_id, i);
        self.adjacency.push(BTreeMap::new());
        i
    }

    /// Adds or overwrites an undirected edge. Self loops and non-positive weights are ignored.
    pub fn add_edge(&mut self, a: BookId, b: BookId, weight: f64) {
        if a == b || weight <= 0.0 {
            return;
        }
        let i = self.add_node(a);
        let j = self.add_node(b);
        self.connect(i, j, weight);
    }

    fn connect(&mut self, i: usize, j: usize, weight: f64) {
        self.adjacency[i].insert(j, weight);
        self.adjacency[j].insert(i, weight);
    }

    pub fn nodes(&self) -> &[BookId] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeMap::len).sum::<usize>() / 2
    }

    pub fn contains(&self, book_id: BookId) -> bool {
        self.positions.contains_key(&book_id)
    }

    pub fn weight(&self, a: BookId, b: BookId) -> Option<f64> {
        let i = *self.positions.get(&a)?;
        let j = *self.positions.get(&b)?;
        self.adjacency[i].get(&j).copied()
    }

    pub fn neighbors(&self, book_id: BookId) -> impl Iterator<Item = BookId> + '_ {
        self.positions
            .get(&book_id)
            .into_iter()
            .flat_map(move |&i| self.adjacency[i].keys().map(move |&j| self.nodes[j]))
    }

    /// Each undirected edge once, with `a < b`.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(self.edge_count());
        for (i, adjacent) in self.adjacency.iter().enumerate() {
            for (&j, &weight) in adjacent {
                let (a, b) = (self.nodes[i], self.nodes[j]);
                if a < b {
                    edges.push(Edge { a, b, weight });
                }
            }
        }
        edges
    }

    pub(crate) fn adjacent(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.adjacency[i].iter().map(|(&j, &w)| (j, w))
    }

    /// Total incident edge weight of the node at position `i`.
    pub(crate) fn strength(&self, i: usize) -> f64 {
        self.adjacency[i].values().sum()
    }
}

/// Intersection size over union size; `None` when the sets are disjoint.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> Option<f64> {
    let intersection = a.intersection(b).count();
    if intersection == 0 {
        return None;
    }
    Some(intersection as f64 / (a.len() + b.len() - intersection) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(entries: &[(&str, &[BookId])]) -> BTreeMap<String, BTreeSet<BookId>> {
        entries.iter().map(|(t, books)| (t.to_string(), books.iter().copied().collect())).collect()
    }

    #[test]
    fn shared_terms_become_jaccard_weighted_edges() {
        let graph = SimilarityGraph::build(&matched(&[("whale", &[1, 2, 3]), ("sea", &[1, 2])]));
        assert_eq!(graph.nodes(), &[1, 2, 3]);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.weight(1, 2), Some(1.0));
        assert_eq!(graph.weight(1, 3), Some(0.5));
        assert_eq!(graph.weight(2, 3), Some(0.5));
    }

    #[test]
    fn weights_are_symmetric_and_agree_with_set_jaccard() {
        let m = matched(&[("ahab", &[1, 2]), ("ishmael", &[2, 4]), ("pequod", &[1, 2, 4]), ("tashtego", &[4])]);
        let graph = SimilarityGraph::build(&m);
        let sets: BTreeMap<BookId, BTreeSet<&str>> = [
            (1, ["ahab", "pequod"].into_iter().collect()),
            (2, ["ahab", "ishmael", "pequod"].into_iter().collect()),
            (4, ["ishmael", "pequod", "tashtego"].into_iter().collect()),
        ]
        .into_iter()
        .collect();
        for (&a, sa) in &sets {
            for (&b, sb) in &sets {
                if a != b {
                    assert_eq!(graph.weight(a, b), graph.weight(b, a));
                    assert_eq!(graph.weight(a, b), jaccard(sa, sb));
                }
            }
        }
    }

    #[test]
    fn books_without_shared_terms_stay_isolated() {
        let graph = SimilarityGraph::build(&matched(&[("whale", &[1]), ("sea", &[2])]));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.neighbors(1).count(), 0);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn add_edge_ignores_self_loops() {
        let mut graph = SimilarityGraph::with_nodes([5]);
        graph.add_edge(5, 5, 1.0);
        graph.add_edge(5, 6, 0.25);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges(), vec![Edge { a: 5, b: 6, weight: 0.25 }]);
        assert_eq!(graph.neighbors(6).collect::<Vec<_>>(), vec![5]);
    }
}
