use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgfluent::prelude::*;
use std::sync::Arc;

/// A table with `n` integer columns `c0..cn`, keyed by `c0`.
fn wide_table(n: usize) -> Arc<TableDef> {
    let mut builder = TableDef::builder("wide");
    for i in 0..n {
        builder = builder.column(format!("c{i}"), ValueKind::Int8);
    }
    builder.primary_key(&["c0"]).build().unwrap()
}

/// SELECT ... FROM wide WHERE c0 = $1 AND c1 = $2 ...
fn build_select(table: &Arc<TableDef>, n: usize) -> Select {
    let mut select = Select::from(table);
    let t = select.table();
    for i in 0..n {
        let column = t.col(&format!("c{i}"));
        select
            .where_(move |w| w.col(column).eq(i as i64))
            .unwrap();
    }
    select
}

fn bench_build_and_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose/build_and_compose");

    for n in [1, 5, 10, 50] {
        let table = wide_table(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let select = build_select(&table, n);
                black_box(select.compose().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_memoized_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose/memoized");

    for n in [1, 10, 50] {
        let table = wide_table(n);
        let select = build_select(&table, n);
        select.compose().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &select, |b, select| {
            b.iter(|| black_box(select.compose().unwrap()));
        });
    }

    group.finish();
}

fn bench_join_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose/join_chain");

    for depth in [1, 3, 6] {
        let table = wide_table(4);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| {
                let mut root = Select::from(&table);
                for _ in 0..depth {
                    root.inner_join(Select::from(&table))
                        .unwrap()
                        .on(|on, l, r| on.col(r.col("c1")).eq_col(l.col("c0")))
                        .unwrap();
                }
                black_box(root.compose().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_reproduce(c: &mut Criterion) {
    let table = wide_table(10);
    let select = build_select(&table, 10);
    let values: Vec<Value> = (0..10).map(|i| Value::Int8(i * 2)).collect();
    c.bench_function("compose/reproduce", |b| {
        b.iter(|| black_box(select.reproduce(values.clone()).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_build_and_compose,
    bench_memoized_compose,
    bench_join_chain,
    bench_reproduce
);
criterion_main!(benches);
