//! Benchmark for pattern matching
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graph_fusion::graph::{ComputeGraph, NodeTypeIndex, OpDesc};
use graph_fusion::pattern::{BranchKind, FusionPattern, PatternMatcher};

/// `blocks` independent conv -> relu -> pool chains
fn make_graph(blocks: usize) -> ComputeGraph {
    let mut graph = ComputeGraph::new("bench");
    for i in 0..blocks {
        let conv = graph.add_node(OpDesc::new(format!("conv_{i}"), "Conv")).unwrap();
        let relu = graph.add_node(OpDesc::new(format!("relu_{i}"), "Relu")).unwrap();
        let pool = graph.add_node(OpDesc::new(format!("pool_{i}"), "Pool")).unwrap();
        graph.link(conv, 0, relu, 0).unwrap();
        graph.link(relu, 0, pool, 0).unwrap();
    }
    graph
}

fn conv_relu_pattern() -> FusionPattern {
    let mut pattern = FusionPattern::new("ConvRelu")
        .add_descriptor("conv", &["Conv"], 1, 1)
        .add_descriptor("relu", &["Relu"], 1, 1)
        .set_outputs("conv", &["relu"], BranchKind::Serial)
        .set_head(&["conv"]);
    pattern.build().unwrap();
    pattern
}

fn match_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_all");
    let pattern = conv_relu_pattern();

    for blocks in [16, 256, 4096] {
        let graph = make_graph(blocks);
        let index = NodeTypeIndex::build(&graph);

        group.bench_with_input(BenchmarkId::new("scan", blocks), &blocks, |b, _| {
            b.iter(|| black_box(PatternMatcher::new(&graph, &pattern).match_all(None)))
        });
        group.bench_with_input(BenchmarkId::new("indexed", blocks), &blocks, |b, _| {
            b.iter(|| black_box(PatternMatcher::new(&graph, &pattern).match_all(Some(&index))))
        });
    }

    group.finish();
}

criterion_group!(benches, match_benchmark);
criterion_main!(benches);
