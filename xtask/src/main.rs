use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "lifeline workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark suites and summarise them
    Bench {
        /// Run quickly (lower sample size/time)
        #[arg(long, default_value_t = false)]
        quick: bool,

        /// Generate report only (skip running benchmarks)
        #[arg(long, default_value_t = false)]
        report_only: bool,
    },
}

const SUITES: &[&str] = &["sync_benchmark", "weak_collections_benchmark"];
const BASELINE: &str = "current";

/// Implementations whose name starts with this are the comparison point of
/// their group.
const REFERENCE_PREFIX: &str = "std_";

#[derive(Deserialize)]
struct Estimates {
    mean: Estimate,
}

#[derive(Deserialize)]
struct Estimate {
    point_estimate: f64,
}

#[derive(Deserialize)]
struct BenchmarkId {
    group_id: String,
    function_id: Option<String>,
    value_str: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Bench { quick, report_only } => {
            if !report_only {
                run_benchmarks(quick)?;
            }
            generate_report()?;
        }
    }

    Ok(())
}

fn run_benchmarks(quick: bool) -> Result<()> {
    println!("Compiling benchmarks...");
    let status = Command::new("cargo")
        .args(["build", "--benches", "--release"])
        .status()?;
    if !status.success() {
        anyhow::bail!("Failed to compile benchmarks");
    }

    for suite in SUITES {
        println!("\n>>> Running {suite}");
        let start = Instant::now();

        let mut cmd = Command::new("cargo");
        cmd.args(["bench", "--bench", suite, "--"]);
        cmd.arg("--save-baseline").arg(BASELINE);
        if quick {
            cmd.arg("--measurement-time").arg("0.1");
            cmd.arg("--noplot");
            cmd.arg("--sample-size").arg("10");
        }

        let status = cmd
            .status()
            .with_context(|| format!("Failed to run bench {suite}"))?;
        if status.success() {
            println!("Finished {suite} in {:.2?}", start.elapsed());
        } else {
            eprintln!("Warning: benchmark suite {suite} failed");
        }
    }

    Ok(())
}

/// group -> (function [/ parameter], label) -> mean time in ns
type Results = BTreeMap<String, BTreeMap<(String, String), f64>>;

fn generate_report() -> Result<()> {
    println!("\n>>> Generating Report...");
    let criterion_dir = Path::new("target/criterion");
    if !criterion_dir.exists() {
        eprintln!("No criterion output found at {}", criterion_dir.display());
        return Ok(());
    }

    let mut results = Results::new();
    collect_results(criterion_dir, &mut results)?;

    let report_path = Path::new("benchmark_results/report.md");
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(report_path)?;

    writeln!(file, "# Benchmark Report")?;
    for (group, rows) in &results {
        writeln!(file, "\n## {group}\n")?;
        writeln!(file, "| Benchmark | Input | Mean | vs std |")?;
        writeln!(file, "|---|---|---|---|")?;

        for ((function, input), mean_ns) in rows {
            let reference = rows
                .iter()
                .find(|((f, i), _)| f.starts_with(REFERENCE_PREFIX) && i == input)
                .map(|(_, ns)| *ns);
            let relative = match reference {
                Some(ns) if ns > 0.0 => format!("**{:.2}x**", mean_ns / ns),
                _ => String::from("-"),
            };
            writeln!(
                file,
                "| {function} | {input} | {} | {relative} |",
                format_time(*mean_ns)
            )?;
        }
    }

    println!("Report written to {}", report_path.display());
    Ok(())
}

fn format_time(ns: f64) -> String {
    if ns >= 1_000_000.0 {
        format!("{:.2} ms", ns / 1_000_000.0)
    } else if ns >= 1_000.0 {
        format!("{:.2} µs", ns / 1_000.0)
    } else {
        format!("{ns:.1} ns")
    }
}

fn collect_results(dir: &Path, results: &mut Results) -> Result<()> {
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().and_then(|s| s.to_str()) == Some("report") {
                continue;
            }
            collect_results(&path, results)?;
            continue;
        }

        // Layout: .../<benchmark>/<BASELINE>/{estimates,benchmark}.json
        let in_baseline = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            == Some(BASELINE);
        if !in_baseline || path.file_name().and_then(|s| s.to_str()) != Some("estimates.json") {
            continue;
        }

        let Some(baseline_dir) = path.parent() else {
            continue;
        };
        let id_path = baseline_dir.join("benchmark.json");
        let id_json = fs::read_to_string(&id_path)
            .with_context(|| format!("reading {}", id_path.display()))?;
        let id: BenchmarkId = serde_json::from_str(&id_json)
            .with_context(|| format!("parsing {}", id_path.display()))?;
        let estimates_json = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let estimates: Estimates = serde_json::from_str(&estimates_json)
            .with_context(|| format!("parsing {}", path.display()))?;

        results.entry(id.group_id).or_default().insert(
            (
                id.function_id.unwrap_or_default(),
                id.value_str.unwrap_or_else(|| String::from("-")),
            ),
            estimates.mean.point_estimate,
        );
    }
    Ok(())
}
