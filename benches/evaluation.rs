//! Benchmark suite for fixpoint evaluation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rddb::{Atom, Config, EvaluatorKind, Facts, KnowledgeBase, Literal, Rule, Term};

fn chain_facts(nodes: usize) -> Facts {
    let mut facts = Facts::new();
    for n in 0..nodes.saturating_sub(1) {
        let atom = Atom::new(
            "edge",
            vec![
                Term::constant(format!("n{}", n).as_str()),
                Term::constant(format!("n{}", n + 1).as_str()),
            ],
        );
        facts.add_fact(&atom).unwrap();
    }
    facts
}

fn transitive_closure_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            Atom::new("path", vec![Term::var("X"), Term::var("Y")]),
            vec![Literal::positive(Atom::new(
                "edge",
                vec![Term::var("X"), Term::var("Y")],
            ))],
        ),
        Rule::new(
            Atom::new("path", vec![Term::var("X"), Term::var("Y")]),
            vec![
                Literal::positive(Atom::new("path", vec![Term::var("X"), Term::var("Z")])),
                Literal::positive(Atom::new("edge", vec![Term::var("Z"), Term::var("Y")])),
            ],
        ),
    ]
}

fn bench_transitive_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_closure");

    for nodes in [10, 25, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &nodes, |b, &nodes| {
            b.iter(|| {
                let kb = KnowledgeBase::new(
                    chain_facts(nodes),
                    transitive_closure_rules(),
                    Config::default(),
                )
                .unwrap();
                black_box(kb.facts().tuple_count())
            });
        });
    }

    group.finish();
}

fn bench_naive_vs_seminaive(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy");

    for kind in [EvaluatorKind::SemiNaive, EvaluatorKind::Naive] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", kind)),
            &kind,
            |b, &kind| {
                b.iter(|| {
                    let mut config = Config::default();
                    config.evaluator = kind;
                    let kb =
                        KnowledgeBase::new(chain_facts(25), transitive_closure_rules(), config)
                            .unwrap();
                    black_box(kb.facts().tuple_count())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_transitive_closure, bench_naive_vs_seminaive);
criterion_main!(benches);
