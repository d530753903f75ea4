use bookrank_core::{Document, SimilarityGraph};
use criterion::{criterion_group, criterion_main, Criterion};

fn synthetic_corpus(n: u32) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let terms = (0..40u32).map(|k| (format!("w{}", (i * 7 + k * 13) % 500), k + 1));
            Document::new(i, format!("book {i}")).with_terms(terms)
        })
        .collect()
}

fn bench_recompute(c: &mut Criterion) {
    let docs = synthetic_corpus(500);
    let refs: Vec<&Document> = docs.iter().collect();
    c.bench_function("similarity_graph_500", |b| b.iter(|| SimilarityGraph::build(&refs).centrality()));
}

criterion_group!(benches, bench_recompute);
criterion_main!(benches);
