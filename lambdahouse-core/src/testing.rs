use crate::{Query, QueryEngine, QueryResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Engine double that echoes the query text back, for channel and dispatcher tests.
pub struct ScriptedEngine {
    shut_down: Arc<AtomicBool>,
}

impl ScriptedEngine {
    pub const PANIC: &'static str = "PANIC";
    pub const FAIL: &'static str = "FAIL";

    pub fn echo() -> Self {
        Self {
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag flipped by `shutdown`, readable after the engine moved to its thread.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shut_down)
    }
}

impl QueryEngine for ScriptedEngine {
    fn run_query(&mut self, query: Query) -> QueryResult {
        match query.query_text.as_str() {
            Self::PANIC => panic!("scripted panic"),
            Self::FAIL => QueryResult::error("scripted failure"),
            text => {
                let format = if query.output_format.is_empty() {
                    "TSV".to_string()
                } else {
                    query.output_format
                };
                QueryResult::success(format, text)
            }
        }
    }

    fn shutdown(&mut self) -> crate::Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn expect_success(result: QueryResult) -> (String, String) {
    match result {
        QueryResult::Success { format, data } => (format, data),
        QueryResult::Failure { error } => panic!("expected success, got error: {error}"),
    }
}

fn expect_failure(result: QueryResult) -> String {
    match result {
        QueryResult::Failure { error } => error,
        QueryResult::Success { format, data } => {
            panic!("expected an error, got {format} result: {data:?}")
        }
    }
}

// ---- Engine Certification Tests ----

pub fn test_select_one_defaults_to_tsv(engine: &mut dyn QueryEngine) {
    let (format, data) = expect_success(engine.run_query(Query::new("SELECT 1")));
    assert_eq!(format, "TSV");
    assert_eq!(data, "1\n");
}

pub fn test_requested_output_format_is_used(engine: &mut dyn QueryEngine) {
    let query = Query::new("SELECT 1").with_output_format("JSONEachRow");
    let (format, data) = expect_success(engine.run_query(query));
    assert_eq!(format, "JSONEachRow");
    assert_eq!(data, "{\"1\":1}\n");
}

pub fn test_format_clause_overrides_requested_format(engine: &mut dyn QueryEngine) {
    let query = Query::new("SELECT 1 AS x, 'a' AS y FORMAT CSV").with_output_format("JSONEachRow");
    let (format, data) = expect_success(engine.run_query(query));
    assert_eq!(format, "CSV");
    assert_eq!(data, "1,\"a\"\n");
}

pub fn test_inline_csv_input_is_queryable(engine: &mut dyn QueryEngine) {
    let query = Query::new("SELECT a+b FROM table").with_input("CSV", "a Int64, b Int64", "1,2\n3,4");
    let (format, data) = expect_success(engine.run_query(query));
    assert_eq!(format, "TSV");
    assert_eq!(data, "3\n7\n");
}

pub fn test_input_table_does_not_outlive_the_query(engine: &mut dyn QueryEngine) {
    let query = Query::new("SELECT count(*) FROM table").with_input("TSV", "x String", "a\nb\n");
    let (_, data) = expect_success(engine.run_query(query));
    assert_eq!(data, "2\n");

    expect_failure(engine.run_query(Query::new("SELECT count(*) FROM \"table\"")));
}

pub fn test_input_without_structure_fails(engine: &mut dyn QueryEngine) {
    let query = Query::new("SELECT * FROM table").with_input("CSV", "", "1,2\n");
    expect_failure(engine.run_query(query));
}

pub fn test_outfile_is_rejected(engine: &mut dyn QueryEngine) {
    let error = expect_failure(engine.run_query(Query::new("SELECT 1 INTO OUTFILE 'out.tsv'")));
    assert_eq!(error, "OUTFILE file is not supported in AWS lambda queries");
}

pub fn test_second_format_is_rejected(engine: &mut dyn QueryEngine) {
    let error = expect_failure(engine.run_query(Query::new("SELECT 1 FORMAT CSV \\G")));
    assert_eq!(error, "Output format already specified");
}

pub fn test_engine_errors_are_reported(engine: &mut dyn QueryEngine) {
    let error = expect_failure(engine.run_query(Query::new("SELECT nonexistent()")));
    assert!(error.contains("nonexistent"), "unexpected message: {error}");
}

pub fn test_unknown_output_format_is_rejected(engine: &mut dyn QueryEngine) {
    let query = Query::new("SELECT 1").with_output_format("Parquetish");
    let error = expect_failure(engine.run_query(query));
    assert!(error.contains("Parquetish"), "unexpected message: {error}");
}

pub fn test_repeated_query_is_deterministic(engine: &mut dyn QueryEngine) {
    let query = Query::new("SELECT x * 2 FROM table ORDER BY x")
        .with_input("TSV", "x Int32", "3\n1\n2\n")
        .with_output_format("CSVWithNames");
    let first = expect_success(engine.run_query(query.clone()));
    let second = expect_success(engine.run_query(query));
    assert_eq!(first, second);
    assert_eq!(first.1, "\"x * 2\"\n2\n4\n6\n");
}
