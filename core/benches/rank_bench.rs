use bookrank::config::RankConfig;
use bookrank::graph::SimilarityGraph;
use bookrank::rank::rank;
use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::{BTreeMap, BTreeSet};

fn matched_terms(books: u32, terms: u32) -> BTreeMap<String, BTreeSet<u32>> {
    (0..terms)
        .map(|t| (format!("term{t}"), (0..books).filter(|b| (b * 31 + t * 17) % 5 == 0).collect()))
        .collect()
}

fn bench_rank(c: &mut Criterion) {
    let matched = matched_terms(500, 40);
    c.bench_function("build_graph_500", |b| b.iter(|| SimilarityGraph::build(&matched)));
    let graph = SimilarityGraph::build(&matched);
    let config = RankConfig::default();
    c.bench_function("rank_500", |b| b.iter(|| rank(&graph, &config)));
}

criterion_group!(benches, bench_rank);
criterion_main!(benches);
