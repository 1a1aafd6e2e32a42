//! FILENAME: tests/common/mod.rs
//! Shared harness and fixtures for report-engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use engine::{resolve_path, DataSourceError, Map, Value};
use query_engine::{DataConnection, DataSource, Pipeline};
use serde_json::json;

// ============================================================================
// IN-MEMORY DATA SOURCE
// ============================================================================

/// Collections of records held in memory. Understands `$match` with plain
/// equality on dotted paths and `$limit`; every other stage is ignored.
/// Counts connections so tests can check that each one is released.
#[derive(Default)]
pub struct MemoryDataSource {
    collections: BTreeMap<String, Vec<Value>>,
    failing_collections: Vec<String>,
    refuse_connections: bool,
    executed: Mutex<Vec<(String, serde_json::Value)>>,
    connects: AtomicUsize,
    releases: AtomicUsize,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source holding `SalesFixture` orders and customers.
    pub fn with_sales_data() -> Self {
        Self::new()
            .with_collection("orders", SalesFixture::orders())
            .with_collection("customers", SalesFixture::customers())
    }

    pub fn with_collection(mut self, name: &str, records: Vec<Value>) -> Self {
        self.collections.insert(name.to_string(), records);
        self
    }

    /// Executions against `name` fail with a data-source error.
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing_collections.push(name.to_string());
        self
    }

    /// Every `connect` call fails.
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// (collection, resolved pipeline) for every execution, in order.
    pub fn executed(&self) -> Vec<(String, serde_json::Value)> {
        self.executed.lock().unwrap().clone()
    }

    fn run(&self, pipeline: &Pipeline, collection: &str) -> Result<Vec<Value>, DataSourceError> {
        self.executed
            .lock()
            .unwrap()
            .push((collection.to_string(), pipeline.to_json()));

        if self.failing_collections.iter().any(|c| c == collection) {
            return Err(DataSourceError::new(format!("collection '{}' is unavailable", collection)));
        }

        let mut records = self.collections.get(collection).cloned().unwrap_or_default();
        for stage in pipeline.stages() {
            if let Some(Value::Object(criteria)) = stage.get("$match") {
                records.retain(|record| matches_criteria(record, criteria));
            }
            if let Some(limit) = stage.get("$limit").and_then(Value::as_f64) {
                records.truncate(limit as usize);
            }
        }
        Ok(records)
    }
}

fn matches_criteria(record: &Value, criteria: &Map) -> bool {
    criteria
        .iter()
        .all(|(path, expected)| resolve_path(record, path) == Some(expected))
}

struct MemoryConnection<'a> {
    source: &'a MemoryDataSource,
}

impl DataConnection for MemoryConnection<'_> {
    fn execute(&mut self, pipeline: &Pipeline, collection: &str) -> Result<Vec<Value>, DataSourceError> {
        self.source.run(pipeline, collection)
    }
}

impl Drop for MemoryConnection<'_> {
    fn drop(&mut self) {
        self.source.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl DataSource for MemoryDataSource {
    fn connect(&self) -> Result<Box<dyn DataConnection + '_>, DataSourceError> {
        if self.refuse_connections {
            return Err(DataSourceError::new("connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection { source: self }))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub struct SalesFixture;

impl SalesFixture {
    pub fn data() -> Vec<(&'static str, &'static str, &'static str, f64, f64)> {
        vec![
            ("North", "Widget", "Q1", 10000.0, 100.0),
            ("North", "Widget", "Q2", 12000.0, 120.0),
            ("North", "Gadget", "Q1", 8000.0, 80.0),
            ("North", "Gadget", "Q2", 9000.0, 90.0),
            ("South", "Widget", "Q1", 15000.0, 150.0),
            ("South", "Widget", "Q2", 14000.0, 140.0),
            ("South", "Gadget", "Q1", 11000.0, 110.0),
            ("South", "Gadget", "Q2", 13000.0, 130.0),
            ("East", "Widget", "Q1", 9000.0, 90.0),
            ("East", "Widget", "Q2", 11000.0, 110.0),
            ("East", "Gadget", "Q1", 7000.0, 70.0),
            ("East", "Gadget", "Q2", 8500.0, 85.0),
        ]
    }

    /// One order document per data row, with the region nested under `store`.
    pub fn orders() -> Vec<Value> {
        Self::data()
            .into_iter()
            .enumerate()
            .map(|(i, (region, product, quarter, sales, quantity))| {
                Value::from(json!({
                    "orderId": i + 1,
                    "store": {"region": region},
                    "product": product,
                    "quarter": quarter,
                    "sales": sales,
                    "quantity": quantity,
                }))
            })
            .collect()
    }

    pub fn customers() -> Vec<Value> {
        vec![
            Value::from(json!({"name": "Acme", "region": "North", "active": true})),
            Value::from(json!({"name": "Borealis", "region": "North", "active": false})),
            Value::from(json!({"name": "Cape Co", "region": "South", "active": true})),
        ]
    }
}

/// Builds a raw parameter map from a JSON object.
pub fn params(value: serde_json::Value) -> Map {
    match Value::from(value) {
        Value::Object(map) => map,
        other => panic!("parameters must be an object, got {:?}", other),
    }
}

/// Sales report: region filter, currency table, product x quarter pivot,
/// summary counts and a customers subreport inheriting the region.
pub fn sales_report_json() -> serde_json::Value {
    json!({
        "name": "regional_sales",
        "description": "Sales per region",
        "collection": "orders",
        "template": "sales.html",
        "pipeline": [
            {"$match": {"store.region": "{{region}}"}}
        ],
        "parameters": [
            {"name": "region", "type": "string", "required": true},
            {"name": "limit", "type": "integer", "default": 50}
        ],
        "columns": [
            {"label": "report.product", "field": "product"},
            {"label": "report.quarter", "field": "quarter"},
            {"label": "report.sales", "field": "sales", "type": "currency", "format": "USD", "align": "right"}
        ],
        "pivot": {
            "rows": ["product"],
            "columns": ["quarter"],
            "measures": [{"name": "sales", "field": "sales", "type": "sum"}]
        },
        "summary": {
            "fields": [
                {"name": "orders", "label_key": "summary.orders"},
                {"name": "q1_orders", "label_key": "summary.q1", "filter": "quarter:Q1"}
            ]
        },
        "subreports": [
            {
                "name": "customers",
                "template": "customers.html",
                "collection": "customers",
                "pipeline": [{"$match": {"region": "{{region}}"}}],
                "context_params": ["region", "customerId"],
                "page_break_before": true
            }
        ]
    })
}
