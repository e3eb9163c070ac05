use bookrank::tokenizer::{term_counts, tokenize};
use criterion::{criterion_group, criterion_main, Criterion};

const CHAPTER: &str = "Call me Ishmael. Some years ago, never mind how long precisely, having little or no \
money in my purse, and nothing particular to interest me on shore, I thought I would sail about a little \
and see the watery part of the world. It is a way I have of driving off the spleen and regulating the \
circulation. Whenever I find myself growing grim about the mouth; whenever it is a damp, drizzly November \
in my soul; then, I account it high time to get to sea as soon as I can.";

fn bench_tokenize(c: &mut Criterion) {
    let text = CHAPTER.repeat(200);
    c.bench_function("tokenize_chapter", |b| b.iter(|| tokenize(&text)));
    c.bench_function("term_counts_chapter", |b| b.iter(|| term_counts(&text)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
