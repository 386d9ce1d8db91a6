#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use macropulse::domain::dataset::{Dataset, Series};
use macropulse::domain::error::EngineError;
use macropulse::domain::result::DomainResult;
use macropulse::domain::schema::DomainSchema;
use macropulse::ports::result_store_port::ResultStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;

/// Every input column the standard pipeline reads, with a base level and
/// a relative amplitude for the synthetic wave.
pub const COLUMNS: [(&str, f64, f64); 37] = [
    ("btc_price", 40_000.0, 0.20),
    ("eth_price", 2_500.0, 0.25),
    ("eurusd", 1.08, 0.03),
    ("gbpusd", 1.26, 0.03),
    ("usdjpy", 148.0, 0.04),
    ("usdcny", 7.2, 0.01),
    ("fed_assets", 7_500.0, 0.05),
    ("ecb_assets", 6_900.0, 0.05),
    ("boj_assets", 750_000.0, 0.04),
    ("pboc_assets", 42_000.0, 0.03),
    ("boe_assets", 900.0, 0.05),
    ("m2_us", 20_800.0, 0.02),
    ("m2_eu", 15_500.0, 0.02),
    ("m2_cn", 290_000.0, 0.02),
    ("m2_jp", 1_240_000.0, 0.01),
    ("m2_uk", 2_900.0, 0.02),
    ("tga", 750.0, 0.20),
    ("rrp", 500.0, 0.30),
    ("hy_oas", 3.5, 0.15),
    ("ig_oas", 1.1, 0.10),
    ("vix", 16.0, 0.25),
    ("nfci", 0.5, 0.40),
    ("dgs10", 4.2, 0.08),
    ("dgs2", 4.5, 0.08),
    ("dgs3mo", 5.3, 0.03),
    ("sofr", 5.31, 0.01),
    ("iorb", 5.40, 0.002),
    ("tbill_3m", 5.25, 0.01),
    ("fed_funds", 5.33, 0.01),
    ("fed_funds_12m", 4.6, 0.05),
    ("core_pce_yoy", 2.8, 0.05),
    ("usdt_supply", 110.0, 0.05),
    ("usdc_supply", 33.0, 0.08),
    ("dai_supply", 5.0, 0.10),
    ("dxy", 104.0, 0.03),
    ("xccy_basis_eur", -15.0, 0.30),
    ("xccy_basis_jpy", -30.0, 0.30),
];

pub fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    (0..n).map(|i| start + Days::new(i as u64)).collect()
}

/// A deterministic wave around `base` with a column-specific period and phase.
pub fn wave(n: usize, column: usize, base: f64, amplitude: f64) -> Series {
    let period = 37.0 + 11.0 * column as f64;
    let phase = column as f64 * 0.7;
    (0..n)
        .map(|i| {
            let t = i as f64;
            let cycle = (t * std::f64::consts::TAU / period + phase).sin();
            let drift = 0.5 * (t / 53.0 + phase).cos();
            Some(base * (1.0 + amplitude * (0.7 * cycle + 0.3 * drift)))
        })
        .collect()
}

pub fn columns(n: usize) -> BTreeMap<String, Series> {
    let mut columns: BTreeMap<String, Series> = COLUMNS
        .iter()
        .enumerate()
        .map(|(i, (name, base, amplitude))| (name.to_string(), wave(n, i, *base, *amplitude)))
        .collect();
    // Swap lines are mostly zero, with a drawing episode.
    let swap_lines: Series = (0..n)
        .map(|i| Some(if (n / 2..n / 2 + 20).contains(&i) { 5.0 + i as f64 * 0.1 } else { 0.1 }))
        .collect();
    columns.insert("fed_swap_lines".to_string(), swap_lines);
    columns
}

pub fn full_dataset(n: usize) -> Dataset {
    Dataset::new(dates(n), columns(n)).unwrap()
}

pub fn dataset_without(n: usize, dropped: &[&str]) -> Dataset {
    let mut columns = columns(n);
    for name in dropped {
        columns.remove(*name);
    }
    Dataset::new(dates(n), columns).unwrap()
}

pub fn dataset_from(n: usize, columns: &[(&str, Series)]) -> Dataset {
    let columns = columns
        .iter()
        .map(|(name, values)| (name.to_string(), values.clone()))
        .collect();
    Dataset::new(dates(n), columns).unwrap()
}

/// Render a dataset as the wide CSV the input adapter reads.
pub fn to_csv(dataset: &Dataset) -> String {
    let names: Vec<&str> = dataset.column_names().collect();
    let mut out = String::from("date");
    for name in &names {
        write!(out, ",{name}").unwrap();
    }
    out.push('\n');
    for (i, date) in dataset.dates().iter().enumerate() {
        write!(out, "{}", date.format("%Y-%m-%d")).unwrap();
        for name in &names {
            match dataset.column(name).unwrap()[i] {
                Some(v) => write!(out, ",{v}").unwrap(),
                None => out.push(','),
            }
        }
        out.push('\n');
    }
    out
}

/// Result store that keeps documents in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub documents: Mutex<BTreeMap<String, Value>>,
    pub merged: Mutex<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, domain: &str) -> Option<Value> {
        self.documents.lock().unwrap().get(domain).cloned()
    }

    pub fn domains(&self) -> Vec<String> {
        self.documents.lock().unwrap().keys().cloned().collect()
    }
}

impl ResultStore for MemoryStore {
    fn save(&self, schema: &DomainSchema, _dates: &[NaiveDate], result: &DomainResult) -> Result<(), EngineError> {
        self.documents
            .lock()
            .unwrap()
            .insert(schema.domain.to_string(), result.to_document());
        Ok(())
    }

    fn load(&self, domain: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.document(domain))
    }

    fn save_merged(&self, document: &Value) -> Result<(), EngineError> {
        *self.merged.lock().unwrap() = Some(document.clone());
        Ok(())
    }
}

/// Store whose writes always fail.
pub struct FailingStore;

impl ResultStore for FailingStore {
    fn save(&self, _: &DomainSchema, _: &[NaiveDate], _: &DomainResult) -> Result<(), EngineError> {
        Err(EngineError::persistence("disk full"))
    }

    fn load(&self, _: &str) -> Result<Option<Value>, EngineError> {
        Ok(None)
    }

    fn save_merged(&self, _: &Value) -> Result<(), EngineError> {
        Err(EngineError::persistence("disk full"))
    }
}
