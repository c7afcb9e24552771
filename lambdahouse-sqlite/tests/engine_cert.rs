use lambdahouse_core::testing as cert;
use lambdahouse_core::{ConfigTree, QueryEngine};
use lambdahouse_sqlite::{EngineConfig, SqliteEngine};

fn create_engine() -> SqliteEngine {
    SqliteEngine::start(EngineConfig::from_tree(ConfigTree::new()).unwrap()).unwrap()
}

fn with_engine(check: fn(&mut dyn QueryEngine)) {
    let mut engine = create_engine();
    check(&mut engine);
    engine.shutdown().unwrap();
}

#[test]
fn select_one_defaults_to_tsv() {
    with_engine(cert::test_select_one_defaults_to_tsv);
}

#[test]
fn requested_output_format_is_used() {
    with_engine(cert::test_requested_output_format_is_used);
}

#[test]
fn format_clause_overrides_requested_format() {
    with_engine(cert::test_format_clause_overrides_requested_format);
}

#[test]
fn inline_csv_input_is_queryable() {
    with_engine(cert::test_inline_csv_input_is_queryable);
}

#[test]
fn input_table_does_not_outlive_the_query() {
    with_engine(cert::test_input_table_does_not_outlive_the_query);
}

#[test]
fn input_without_structure_fails() {
    with_engine(cert::test_input_without_structure_fails);
}

#[test]
fn outfile_is_rejected() {
    with_engine(cert::test_outfile_is_rejected);
}

#[test]
fn second_format_is_rejected() {
    with_engine(cert::test_second_format_is_rejected);
}

#[test]
fn engine_errors_are_reported() {
    with_engine(cert::test_engine_errors_are_reported);
}

#[test]
fn unknown_output_format_is_rejected() {
    with_engine(cert::test_unknown_output_format_is_rejected);
}

#[test]
fn repeated_query_is_deterministic() {
    with_engine(cert::test_repeated_query_is_deterministic);
}
