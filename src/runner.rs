//! Minimal benchmark runner: suite setup, timed iterations, teardown, report.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::errors::BenchError;

/// A benchmark with a suite lifecycle around a repeated measured operation.
pub trait Benchmark {
    fn name(&self) -> String;

    fn before_suite(&mut self) -> Result<(), BenchError>;

    /// One measured invocation.
    fn run_test(&mut self) -> Result<(), BenchError>;

    /// Always called once `before_suite` has been attempted.
    fn after_suite(&mut self) -> Result<(), BenchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Untimed iterations run before measuring
    pub warmup_iterations: usize,
    pub iterations: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            warmup_iterations: 0,
            iterations: 10,
        }
    }
}

/// Timing summary of a run, all durations in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub name: String,
    pub iterations: usize,
    pub min_us: f64,
    pub p10_us: f64,
    pub p50_us: f64,
    pub p90_us: f64,
    pub max_us: f64,
    pub mean_us: f64,
}

impl Report {
    /// Summarizes the measured samples. Returns `None` without samples.
    pub fn from_samples(name: &str, samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut micros: Vec<f64> = samples
            .iter()
            .map(|d| d.as_nanos() as f64 / 1000.0)
            .collect();
        micros.sort_by(f64::total_cmp);
        let mean = micros.iter().sum::<f64>() / micros.len() as f64;

        Some(Self {
            name: name.to_string(),
            iterations: micros.len(),
            min_us: micros[0],
            p10_us: percentile(&micros, 10),
            p50_us: percentile(&micros, 50),
            p90_us: percentile(&micros, 90),
            max_us: micros[micros.len() - 1],
            mean_us: mean,
        })
    }

    pub fn header() -> String {
        format!(
            "{:<48} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "# benchmark", "N", "min(us)", "10%", "50%", "90%", "max", "mean"
        )
    }

    pub fn to_text(&self) -> String {
        format!(
            "{:<48} {:>6} {:>10.1} {:>10.1} {:>10.1} {:>10.1} {:>10.1} {:>10.1}",
            self.name,
            self.iterations,
            self.min_us,
            self.p10_us,
            self.p50_us,
            self.p90_us,
            self.max_us,
            self.mean_us
        )
    }

    pub fn to_json(&self) -> Result<String, BenchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[f64], pct: usize) -> f64 {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

/// Runs a benchmark suite.
///
/// `after_suite` runs whatever happened before it. The first error wins: a
/// teardown failure is only returned when setup and measurement succeeded.
pub fn run<B: Benchmark + ?Sized>(
    benchmark: &mut B,
    options: RunOptions,
) -> Result<Report, BenchError> {
    let name = benchmark.name();
    tracing::info!("Setting up {}", name);
    let outcome = benchmark
        .before_suite()
        .and_then(|()| measure(benchmark, &name, options));

    let teardown = benchmark.after_suite();
    match (outcome, teardown) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown_error)) => {
            tracing::warn!("Teardown of {} also failed: {}", name, teardown_error);
            Err(e)
        }
    }
}

fn measure<B: Benchmark + ?Sized>(
    benchmark: &mut B,
    name: &str,
    options: RunOptions,
) -> Result<Report, BenchError> {
    for _ in 0..options.warmup_iterations {
        benchmark.run_test()?;
    }

    let mut samples = Vec::with_capacity(options.iterations);
    for _ in 0..options.iterations {
        let start = Instant::now();
        benchmark.run_test()?;
        samples.push(start.elapsed());
    }
    tracing::info!("Measured {} iterations of {}", samples.len(), name);

    Report::from_samples(name, &samples).ok_or_else(|| {
        BenchError::Assertion(format!("{name}: no measured iterations"))
    })
}
