use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use drift_compare::compare::compare;
use drift_compare::data::{FieldKind, Value};
use drift_compare::mapping::FieldMapping;
use drift_compare::normalize::NormalizationConfig;
use drift_compare::rows::{RawRow, RowSchema};

fn generate_rows(rows: usize, right: bool) -> Vec<RawRow> {
    let columns = if right {
        ["employee_id", "full_name", "base_pay", "hired_on"]
    } else {
        ["emp_id", "name", "salary", "hire_date"]
    };
    let schema = RowSchema::new(columns);
    // right side shifts by a tenth of the rows and drifts every seventh salary
    let offset = if right { rows / 10 } else { 0 };
    (offset..rows + offset)
        .map(|i| {
            let pay = if right && i % 7 == 0 { i + 1 } else { i };
            let name = if right {
                format!("Worker {i} ")
            } else {
                format!("Worker {i}")
            };
            RawRow::new(
                Arc::clone(&schema),
                vec![
                    Value::from(i.to_string()),
                    Value::from(name),
                    Value::from(format!("{pay}.00")),
                    Value::from(format!("2024-01-{:02}", (i % 28) + 1)),
                ],
            )
        })
        .collect()
}

fn fields() -> Vec<FieldMapping> {
    vec![
        FieldMapping::key("emp_id", "employee_id"),
        FieldMapping::new("name", "full_name"),
        FieldMapping::new("salary", "base_pay").with_kind(FieldKind::Decimal),
        FieldMapping::new("hire_date", "hired_on").with_kind(FieldKind::Date),
    ]
}

fn bench_compare(c: &mut Criterion) {
    let left = generate_rows(20_000, false);
    let right = generate_rows(20_000, true);
    let fields = fields();

    let mut group = c.benchmark_group("compare_rows");
    for (label, config) in [
        ("default", NormalizationConfig::default()),
        ("exact", NormalizationConfig::exact()),
    ] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || (),
                |_| {
                    let result = compare(&left, &right, &fields, &config).expect("compare");
                    black_box(result.counts());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compare);
criterion_main!(benches);
