//! Test runner and performance metrics.
//!
//! A [`Test`] drives one trace through one hierarchy. The collected
//! metrics follow the block-hierarchy AMAT decomposition: every request
//! pays the L1 latency, and each deeper level contributes its latency
//! weighted by the probability of reaching it.

use crate::config::{self, TestConfig};
use crate::dram::MainMemory;
use crate::hierarchy::Hierarchy;
use crate::trace::{TraceError, TraceSource};

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

/// How a metric value renders in the table and the CSV.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Plain number with a unit.
    Number { value: f64, unit: &'static str },
    /// Ratio rendered as a percentage.
    Percent(f64),
    /// String-valued metric, e.g. an inclusion policy name.
    Label(String),
}

impl Value {
    fn csv_value(&self) -> String {
        match self {
            Self::Number { value, .. } => format!("{value}"),
            Self::Percent(ratio) => format!("{}", ratio * 100.0),
            Self::Label(text) => text.clone(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Number { value, unit } => write!(f, "{value:.2} {unit}"),
            Self::Percent(ratio) => write!(f, "{:.2} %", ratio * 100.0),
            Self::Label(text) => write!(f, "{text}"),
        }
    }
}

/// One reported measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: Value,
}

impl Metric {
    fn number(name: impl Into<String>, value: f64, unit: &'static str) -> Self {
        Self {
            name: name.into(),
            value: Value::Number { value, unit },
        }
    }

    fn percent(name: impl Into<String>, ratio: f64) -> Self {
        Self {
            name: name.into(),
            value: Value::Percent(ratio),
        }
    }

    fn label(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::Label(text.into()),
        }
    }
}

/// Metrics of one completed test run.
#[derive(Clone, Debug)]
pub struct TestResult {
    pub name: String,
    /// Wall-clock duration of the trace run; observational only.
    pub execution_time: Duration,
    pub metrics: Vec<Metric>,
}

/// One runnable test: hierarchy, memory, and the trace driving them.
pub struct Test {
    pub name: String,
    pub hierarchy: Hierarchy,
    pub memory: MainMemory,
    pub trace: Box<dyn TraceSource>,
}

impl Test {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::Error> {
        let config = TestConfig::from_file(path)?;
        Ok(Self {
            hierarchy: config.build_hierarchy()?,
            memory: config.build_memory(),
            trace: config.build_trace()?,
            name: config.test_name,
        })
    }
}

/// Runs tests and compares their metrics.
#[derive(Default)]
pub struct Analyzer {
    tests: Vec<Test>,
}

impl Analyzer {
    pub fn add_test(&mut self, test: Test) {
        self.tests.push(test);
    }

    /// Run every registered test in order.
    ///
    /// A trace failure aborts only the failing test; the remaining tests
    /// still run. Returns the completed results and the number of
    /// failures.
    pub fn run_tests(&mut self) -> (Vec<TestResult>, usize) {
        let mut results = Vec::with_capacity(self.tests.len());
        let mut failures = 0;
        for test in &mut self.tests {
            match run_test(test) {
                Ok(result) => results.push(result),
                Err(err) => {
                    log::error!("test {:?} failed: {err}", test.name);
                    failures += 1;
                }
            }
        }
        (results, failures)
    }
}

fn run_test(test: &mut Test) -> Result<TestResult, TraceError> {
    log::info!("running test {:?}", test.name);
    test.hierarchy.reset();
    test.memory.reset();
    test.trace.reset()?;

    let start = Instant::now();
    let mut total_latency: u64 = 0;
    let mut accesses: u64 = 0;
    while let Some(access) = test.trace.next_access()? {
        let (mut latency, hit) = test.hierarchy.access(access.addr, access.kind);
        if !hit {
            latency += test.memory.access(access.addr, access.kind);
        }
        total_latency += latency;
        accesses += 1;
    }
    let execution_time = start.elapsed();
    log::debug!(
        "test {:?}: {accesses} accesses in {execution_time:?}",
        test.name,
    );

    let mut metrics = Vec::new();
    if accesses > 0 {
        metrics.push(Metric::number(
            "Average Access Time",
            total_latency as f64 / accesses as f64,
            "cycles",
        ));
    }
    metrics.extend(collect_metrics(&test.hierarchy, &test.memory));

    Ok(TestResult {
        name: test.name.clone(),
        execution_time,
        metrics,
    })
}

/// Derive AMAT and traffic metrics from a finished run.
#[must_use]
pub fn collect_metrics(hierarchy: &Hierarchy, memory: &MainMemory) -> Vec<Metric> {
    let levels = hierarchy.levels();
    let mut metrics = Vec::new();

    // every request pays the L1 latency
    let l1_latency = levels[0].config().access_latency as f64;
    let mut amat = l1_latency;
    metrics.push(Metric::number("L1 AMAT Contribution", l1_latency, "cycles"));

    // probability of reaching each deeper level is the product of the
    // miss rates above it
    let mut miss_path = levels[0].stats().miss_rate();
    for (index, level) in levels.iter().enumerate().skip(1) {
        let contribution = miss_path * level.config().access_latency as f64;
        amat += contribution;
        metrics.push(Metric::number(
            format!("L{} AMAT Contribution", index + 1),
            contribution,
            "cycles",
        ));
        miss_path *= level.stats().miss_rate();
    }

    let memory_contribution = miss_path * memory.access_latency() as f64;
    amat += memory_contribution;
    metrics.push(Metric::number(
        "Memory AMAT Contribution",
        memory_contribution,
        "cycles",
    ));
    metrics.push(Metric::number("Total System AMAT", amat, "cycles"));

    for (index, level) in levels.iter().enumerate() {
        let stats = level.stats();
        metrics.push(Metric::percent(
            format!("L{} Hit Rate", index + 1),
            stats.hit_rate(),
        ));
        metrics.push(Metric::number(
            format!("L{} Hits", index + 1),
            stats.hits as f64,
            "accesses",
        ));
        metrics.push(Metric::number(
            format!("L{} Misses", index + 1),
            stats.misses as f64,
            "accesses",
        ));
    }

    for (index, level) in levels.iter().enumerate().skip(1) {
        metrics.push(Metric::label(
            format!("L{} Inclusion Policy", index + 1),
            level.config().inclusion_policy.to_string(),
        ));
    }

    metrics.push(Metric::number(
        "Memory Reads",
        memory.stats().reads as f64,
        "accesses",
    ));
    metrics.push(Metric::number(
        "Memory Writes",
        memory.stats().writes as f64,
        "accesses",
    ));

    metrics
}

/// Metric names across all results, first-seen order.
fn metric_names(results: &[TestResult]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for result in results {
        for metric in &result.metrics {
            if !names.contains(&metric.name) {
                names.push(metric.name.clone());
            }
        }
    }
    names
}

fn find<'r>(result: &'r TestResult, name: &str) -> Option<&'r Metric> {
    result.metrics.iter().find(|metric| metric.name == name)
}

/// Render the side-by-side comparison table.
///
/// One row per metric, one column per test; missing cells show `N/A`.
#[must_use]
pub fn render_table(results: &[TestResult]) -> String {
    let names = metric_names(results);

    let metric_width = names
        .iter()
        .map(|name| name.len() + 2)
        .max()
        .unwrap_or(0)
        .max(20);
    let column_widths: Vec<usize> = results
        .iter()
        .map(|result| {
            names
                .iter()
                .filter_map(|name| find(result, name))
                .map(|metric| metric.value.to_string().len() + 2)
                .max()
                .unwrap_or(0)
                .max(result.name.len() + 2)
                .max(15)
        })
        .collect();

    let mut out = String::new();
    out.push_str(&format!("{:<metric_width$}", "Metric"));
    for (result, width) in results.iter().zip(column_widths.iter().copied()) {
        out.push_str(&format!(" | {:<width$}", result.name));
    }
    out.push('\n');

    out.push_str(&"-".repeat(metric_width));
    for width in column_widths.iter().copied() {
        out.push_str("-+-");
        out.push_str(&"-".repeat(width));
    }
    out.push('\n');

    for name in &names {
        out.push_str(&format!("{name:<metric_width$}"));
        for (result, width) in results.iter().zip(column_widths.iter().copied()) {
            let cell = find(result, name)
                .map_or_else(|| "N/A".to_string(), |metric| metric.value.to_string());
            out.push_str(&format!(" | {cell:<width$}"));
        }
        out.push('\n');
    }
    out
}

/// Write the comparison as CSV: `Metric` first, one column per test.
pub fn write_csv<W: Write>(results: &[TestResult], writer: W) -> Result<(), csv::Error> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);

    let mut header = vec!["Metric".to_string()];
    header.extend(results.iter().map(|result| result.name.clone()));
    csv_writer.write_record(&header)?;

    for name in metric_names(results) {
        let mut row = vec![name.clone()];
        for result in results {
            row.push(find(result, &name).map_or_else(String::new, |metric| metric.value.csv_value()));
        }
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
