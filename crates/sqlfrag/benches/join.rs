use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sqlfrag::{Sql, Value, sql};

/// `n` conditions `"colI" = %s`, each with one parameter.
fn conditions(n: usize) -> Vec<Sql> {
    (0..n)
        .map(|i| {
            let col = Sql::identifier(&format!("col{i}")).expect("valid identifier");
            sql!("%s = %s", col, i as i64).expect("valid template")
        })
        .collect()
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/join");
    let sep = Sql::verbatim(" AND ");

    for n in [1, 5, 10, 50, 100] {
        let items = conditions(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &items, |b, items| {
            b.iter(|| black_box(sep.join(items.iter())));
        });
    }

    group.finish();
}

fn bench_join_parameterized_separator(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/join_parameterized_separator");
    let sep = sql!(" %s ", "OR").expect("valid template");

    for n in [5, 50, 500] {
        let items = conditions(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &items, |b, items| {
            b.iter(|| black_box(sep.join(items.iter())));
        });
    }

    group.finish();
}

fn bench_nested_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/nested_render");

    for n in [5, 50, 500] {
        let ids: Vec<i64> = (0..n).collect();
        let query = sql!(
            "SELECT id FROM %s WHERE %s AND id IN %s",
            Sql::identifier("res_partner").expect("valid identifier"),
            Sql::verbatim(" AND ").join(conditions(10)),
            Value::list(ids),
        )
        .expect("valid template");
        group.bench_with_input(BenchmarkId::from_parameter(n), &query, |b, query| {
            b.iter(|| black_box(query.to_sql()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_join,
    bench_join_parameterized_separator,
    bench_nested_render
);
criterion_main!(benches);
