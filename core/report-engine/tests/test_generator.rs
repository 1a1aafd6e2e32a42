//! FILENAME: tests/test_generator.rs
//! Integration tests for end-to-end report generation.

mod common;

use common::{params, sales_report_json, MemoryDataSource};
use engine::{DefaultFormatter, ReportError, ReportPhase, Value};
use pivot_engine::DimensionKey;
use pivot_engine::KeyValue;
use report_engine::{ReportDefinition, ReportGenerator, ReportSettings};
use serde_json::json;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn sales_definition() -> ReportDefinition {
    ReportDefinition::from_json_str(&sales_report_json().to_string()).unwrap()
}

fn text_key(text: &str) -> DimensionKey {
    DimensionKey::Single(KeyValue::Text(text.to_string()))
}

// ============================================================================
// MAIN REPORT
// ============================================================================

#[test]
fn test_generate_regional_sales() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let data = generator
        .generate(&sales_definition(), &params(json!({"region": "North"})))
        .unwrap();

    assert_eq!(data.report_name, "regional_sales");
    assert_eq!(data.main_data.row_count, 4);
    assert!(!data.main_data.truncated);
    assert!(data.warnings.is_empty());

    // Default applied and coerced
    assert_eq!(data.parameters.get("limit"), Some(&Value::Number(50.0)));

    let executed = source.executed();
    assert_eq!(executed[0].0, "orders");
    assert_eq!(executed[0].1, json!([{"$match": {"store.region": "North"}}]));
}

#[test]
fn test_table_output() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let data = generator
        .generate(&sales_definition(), &params(json!({"region": "North"})))
        .unwrap();
    let table = data.main_data.table.unwrap();

    assert_eq!(table.row_count, 4);
    assert_eq!(table.column_count, 3);
    assert_eq!(table.cell(0, "product").unwrap().formatted_value, "Widget");
    assert_eq!(table.cell(0, "sales").unwrap().formatted_value, "$10,000.00");
    assert_eq!(table.totals["sales"].sum, 39000.0);
    assert_eq!(table.totals["sales"].count, 4);
}

#[test]
fn test_pivot_output() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let data = generator
        .generate(&sales_definition(), &params(json!({"region": "North"})))
        .unwrap();
    let pivot = data.main_data.pivot.unwrap();

    assert_eq!(pivot.row_labels, vec!["Gadget", "Widget"]);
    assert_eq!(pivot.column_labels, vec!["Q1", "Q2"]);
    assert_eq!(pivot.value(&text_key("Gadget"), &text_key("Q2"), "sales"), Some(9000.0));
    assert_eq!(pivot.row_totals[1]["sales"], 22000.0);
    assert_eq!(pivot.column_totals[0]["sales"], 18000.0);
    assert_eq!(pivot.grand_totals.unwrap()["sales"], 39000.0);
}

#[test]
fn test_summary_output() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let data = generator
        .generate(&sales_definition(), &params(json!({"region": "South"})))
        .unwrap();
    let summary = data.main_data.summary.unwrap();

    assert_eq!(summary["orders"], 4);
    assert_eq!(summary["q1_orders"], 2);
}

#[test]
fn test_pivot_columns_capped_by_settings() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let settings = ReportSettings { max_columns_per_pivot: 1, ..Default::default() };
    let generator = ReportGenerator::new(&source, &formatter, settings);

    let data = generator
        .generate(&sales_definition(), &params(json!({"region": "East"})))
        .unwrap();
    let pivot = data.main_data.pivot.unwrap();

    assert_eq!(pivot.column_labels, vec!["Q1"]);
    assert!(pivot.has_warnings());
    assert_eq!(data.warnings.len(), 1);
}

// ============================================================================
// SUBREPORTS
// ============================================================================

#[test]
fn test_subreport_inherits_region_without_customer_id() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let data = generator
        .generate(&sales_definition(), &params(json!({"region": "North"})))
        .unwrap();

    let customers = &data.subreports[0];
    assert!(customers.error.is_none());
    assert_eq!(customers.row_count, 2);
    assert!(customers.page_break_before);
    assert_eq!(customers.context_params.get("region"), Some(&Value::from("North")));
    assert!(!customers.context_params.contains_key("customerId"));

    assert_eq!(data.subreport_summary.total_subreports, 1);
    assert_eq!(data.subreport_summary.total_rows, 2);
}

#[test]
fn test_subreport_failure_does_not_abort_report() {
    let source = MemoryDataSource::with_sales_data().failing_on("customers");
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let data = generator
        .generate(&sales_definition(), &params(json!({"region": "North"})))
        .unwrap();

    assert_eq!(data.main_data.row_count, 4);
    let customers = &data.subreports[0];
    assert!(customers.data.is_empty());
    assert!(customers.error.as_ref().unwrap().contains("unavailable"));
    assert_eq!(data.subreport_summary.failed_subreports, 1);
}

// ============================================================================
// FAILURES AND CONNECTION LIFETIME
// ============================================================================

#[test]
fn test_one_connection_per_request_released_on_success() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    generator
        .generate(&sales_definition(), &params(json!({"region": "North"})))
        .unwrap();

    assert_eq!(source.connects(), 1);
    assert_eq!(source.releases(), 1);
    // Main query and subreport shared it
    assert_eq!(source.executed().len(), 2);
}

#[test]
fn test_connection_released_when_main_query_fails() {
    let source = MemoryDataSource::with_sales_data().failing_on("orders");
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let err = generator
        .generate(&sales_definition(), &params(json!({"region": "North"})))
        .unwrap_err();

    assert!(matches!(err, ReportError::DataSource(_)));
    assert_eq!(err.phase(), ReportPhase::DataExecution);
    assert_eq!(err.to_string(), "collection 'orders' is unavailable");
    assert_eq!(source.connects(), 1);
    assert_eq!(source.releases(), 1);
}

#[test]
fn test_refused_connection_propagates() {
    let source = MemoryDataSource::with_sales_data().refusing_connections();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let err = generator
        .generate(&sales_definition(), &params(json!({"region": "North"})))
        .unwrap_err();

    assert_eq!(err.to_string(), "connection refused");
}

#[test]
fn test_validation_failure_never_connects() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());

    let err = generator
        .generate(&sales_definition(), &params(json!({"limit": "many"})))
        .unwrap_err();

    assert_eq!(err.phase(), ReportPhase::Validation);
    assert_eq!(source.connects(), 0);
}

#[test]
fn test_assembly_failure_never_connects() {
    let source = MemoryDataSource::with_sales_data();
    let formatter = DefaultFormatter::new();
    let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());
    let mut definition = sales_definition();
    definition.pipeline = vec![
        Value::from(json!({"$match": {"region": "{{region}}"}})),
        Value::from(json!({"$match": {"tags": "x-{{region}}"}})),
    ];
    // An array value cannot be embedded in text
    definition.parameters[0].kind = query_engine::ParameterKind::Array;

    let err = generator
        .generate(&definition, &params(json!({"region": ["North", "South"]})))
        .unwrap_err();

    assert_eq!(err.phase(), ReportPhase::Assembly);
    assert_eq!(source.connects(), 0);
}
