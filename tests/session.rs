mod common;

use common::TestWorkspace;
use drift_compare::{
    data::Value,
    error::ErrorKind,
    mapping::MappingSet,
    normalize::NormalizationConfig,
    session::{CompareOptions, PairOutcome, Session, TraceOutcome},
    source::{CsvSource, RowSource},
    suggest::{ConfidenceTier, SuggestConfig},
};

fn options() -> CompareOptions {
    CompareOptions {
        normalization: NormalizationConfig {
            numeric_round_precision: Some(2),
            ..NormalizationConfig::default()
        },
        ..CompareOptions::default()
    }
}

fn sources(workspace: &TestWorkspace) -> (CsvSource, CsvSource) {
    (
        CsvSource::new(workspace.left_dir()),
        CsvSource::new(workspace.right_dir()),
    )
}

#[test]
fn compares_csv_environments_and_isolates_failing_pairs() {
    let workspace = TestWorkspace::new().with_worker_tables();
    let mappings = MappingSet::load(&workspace.mapping()).expect("mapping");
    let (left, right) = sources(&workspace);
    let session = Session::new(&mappings, &left, &right, options());

    let outcomes = session.compare_active();
    assert_eq!(outcomes.len(), 2);
    let PairOutcome::Compared(report) = &outcomes[0] else {
        panic!("worker pair should compare: {:?}", outcomes[0]);
    };
    let result = &report.result;
    assert_eq!(result.left_only.len(), 1);
    assert_eq!(result.left_only[0].get("name"), Some(&Value::from("Carol")));
    assert_eq!(result.right_only.len(), 1);
    assert_eq!(result.right_only[0].get("full_name"), Some(&Value::from("Dan")));
    assert_eq!(result.mismatched.len(), 1);
    assert_eq!(result.mismatched[0].key.to_string(), r#"("2",)"#);
    assert_eq!(result.mismatched[0].field_diffs[0].right_field, "base_pay");
    assert_eq!(result.matched, 1);
    assert_eq!(report.unmapped.left, vec!["legacy_code"]);

    // the job pair has no key field and fails on its own
    let PairOutcome::Failed(err) = &outcomes[1] else {
        panic!("job pair should fail");
    };
    assert_eq!(err.kind, ErrorKind::Mapping);
    assert_eq!(err.pair.left_table, "dev.job");
}

#[test]
fn trace_records_cover_both_fetches_and_redact_sql() {
    let workspace = TestWorkspace::new().with_worker_tables();
    let mappings = MappingSet::load(&workspace.mapping()).expect("mapping");
    let (left, right) = sources(&workspace);
    let session = Session::new(&mappings, &left, &right, options());
    let report = session.compare_pair(&mappings.tables[0]).expect("compare");
    assert_eq!(report.traces.len(), 2);
    assert_eq!(report.traces[0].table, "dev.worker");
    assert_eq!(report.traces[0].row_count, 3);
    assert_eq!(report.traces[1].table, "prod.worker");
    assert_eq!(report.traces[1].sql_display(), "hidden");
}

#[test]
fn missing_table_file_is_a_fetch_error_with_a_trace() {
    let workspace = TestWorkspace::new();
    workspace.write_left(
        "dev.worker",
        "emp_id,name,salary\n1,Alice,10\n",
    );
    let mappings = MappingSet::load(&workspace.mapping()).expect("mapping");
    let (left, right) = sources(&workspace);
    let session = Session::new(&mappings, &left, &right, options());
    let err = session.compare_pair(&mappings.tables[0]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Fetch);
    assert!(err.to_string().contains("prod.worker"));
}

#[test]
fn key_filter_limits_the_comparison_to_selected_entities() {
    let workspace = TestWorkspace::new().with_worker_tables();
    let mappings = MappingSet::load(&workspace.mapping()).expect("mapping");
    let (left, right) = sources(&workspace);
    let session = Session::new(
        &mappings,
        &left,
        &right,
        CompareOptions {
            key_values: vec![Value::from("2")],
            god_mode: true,
            ..options()
        },
    );
    let report = session.compare_pair(&mappings.tables[0]).expect("compare");
    assert!(report.result.left_only.is_empty());
    assert!(report.result.right_only.is_empty());
    assert_eq!(report.result.mismatched.len(), 1);
    assert!(
        report.traces[1]
            .sql_display()
            .contains(r#"WHERE "employee_id" IN ('2')"#)
    );
}

#[test]
fn entity_trace_collects_rows_from_both_sides() {
    let workspace = TestWorkspace::new().with_worker_tables();
    let mappings = MappingSet::load(&workspace.mapping()).expect("mapping");
    let (left, right) = sources(&workspace);
    let session = Session::new(&mappings, &left, &right, options());
    let pairs: Vec<_> = mappings.tables.iter().collect();
    let outcomes = session.trace_entity(&pairs, &Value::from("1"));
    assert_eq!(outcomes.len(), 2);
    let TraceOutcome::Traced(frame) = &outcomes[0] else {
        panic!("worker trace should succeed");
    };
    assert_eq!(frame.left_rows.len(), 1);
    assert_eq!(frame.right_rows.len(), 1);
    assert_eq!(frame.right_rows[0].get("full_name"), Some(&Value::from("Alice ")));
    assert_eq!(frame.traces.len(), 2);
    assert!(matches!(outcomes[1], TraceOutcome::Failed(_)));
}

#[test]
fn introspection_reads_headers_and_suggests() {
    let workspace = TestWorkspace::new();
    workspace.write_left("dev.worker", "Employee_ID,Full Name,dept_code\n");
    workspace.write_right("prod.worker", "employee_id\tfullname\tdepartment_code\n");
    std::fs::rename(
        workspace.right_dir().join("prod.worker.csv"),
        workspace.right_dir().join("prod.worker.tsv"),
    )
    .expect("rename to tsv");
    let mappings = MappingSet::from_yaml(
        "tables:\n  - { left_table: dev.worker, right_table: prod.worker }\n",
    )
    .expect("mapping");
    let (left, right) = sources(&workspace);
    assert_eq!(
        right.columns("prod.worker").expect("columns"),
        vec!["employee_id", "fullname", "department_code"]
    );
    let session = Session::new(&mappings, &left, &right, options());
    let report = session
        .introspect(&mappings.tables[0], &SuggestConfig::default())
        .expect("introspect");
    assert_eq!(report.unmapped.left.len(), 3);
    let tiers: Vec<(&str, ConfidenceTier)> = report
        .suggestions
        .iter()
        .map(|s| (s.left_field.as_str(), s.confidence_tier))
        .collect();
    assert_eq!(
        tiers,
        vec![
            ("Employee_ID", ConfidenceTier::Normalized),
            ("Full Name", ConfidenceTier::Normalized),
        ]
    );
}
