// Colored terminal output for coefficient tables and dataset stats.
//
// This module handles all terminal-specific formatting. The main.rs command
// handlers delegate here.

use colored::Colorize;

use crate::error::Warning;
use crate::pipeline::{CoefficientTable, DatasetStats};

/// Display a ranked coefficient table. `top` limits each end of the ranking:
/// the `top` highest and the `top` lowest rows are shown.
pub fn display_coefficients(table: &CoefficientTable, top: Option<usize>) {
    let ranked = table.sorted_desc();
    if ranked.is_empty() {
        println!("No coefficients.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Satiety Coefficients: {} ({} rows) ===", table.stage, ranked.len()).bold()
    );
    println!();
    println!(
        "  {:>4}  {:<40} {:>14}  {:>7}",
        "Rank".dimmed(),
        "Label".dimmed(),
        "Coefficient".dimmed(),
        "Cluster".dimmed(),
    );
    println!("  {}", "-".repeat(70).dimmed());

    let shown: Vec<usize> = match top {
        Some(n) if 2 * n < ranked.len() => (0..n).chain(ranked.len() - n..ranked.len()).collect(),
        _ => (0..ranked.len()).collect(),
    };

    let mut previous = None;
    for i in shown {
        if previous.is_some_and(|p: usize| i > p + 1) {
            println!("  {:>4}  {}", "", "...".dimmed());
        }
        previous = Some(i);

        let row = ranked[i];
        let cluster = row.cluster.map(|c| c.to_string()).unwrap_or_default();
        println!(
            "  {:>4}. {:<40} {:>14}  {:>7}",
            i + 1,
            super::truncate_chars(&row.label, 37),
            colorize_coefficient(row.coefficient),
            cluster.dimmed(),
        );
    }
    println!();

    let d = &table.diagnostics;
    let status = if d.converged {
        "converged".green()
    } else {
        "not converged".yellow()
    };
    println!(
        "  Solver: {} after {} iterations ({}), residual {:.3}",
        status, d.iterations, d.stop_reason, d.residual_norm
    );
    if let Some(rank) = d.rank {
        println!("  Numerical rank: {rank}");
    }
    if let Some(cond) = d.condition_estimate {
        println!("  Condition estimate: {cond:.3e}");
    }
}

/// Display dataset shape after extraction and partitioning.
pub fn display_stats(stats: &DatasetStats) {
    println!("\n{}", "=== Dataset ===".bold());
    println!("  Lines read:        {}", stats.lines_read);
    println!("  Person-days:       {}", stats.days);
    if stats.skipped > 0 {
        println!("  Skipped:           {}", stats.skipped.to_string().yellow());
    } else {
        println!("  Skipped:           0");
    }
    println!("  People:            {}", stats.people);
    if let (Some(first), Some(last)) = (stats.first_date, stats.last_date) {
        println!("  Date range:        {first} to {last}");
    }
    println!("  Total calories:    {:.0}", stats.total_calories);
    println!("  Distinct foods:    {}", stats.distinct_foods);
    println!(
        "  Significant foods: {} (threshold {})",
        stats.significant_foods, stats.threshold
    );
    println!(
        "  Calories retained: {:.1}%",
        stats.retained_fraction * 100.0
    );
}

/// Display collected warnings, one per line.
pub fn display_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("\n{}", format!("=== Warnings ({}) ===", warnings.len()).bold());
    for w in warnings {
        let line = match w {
            Warning::Convergence {
                stage,
                iterations,
                reason,
            } => format!("{stage}: stopped after {iterations} iterations ({reason})"),
            Warning::DegenerateInput { stage, detail } => format!("{stage}: {detail}"),
            Warning::LabelCollision { label, clusters } => {
                format!("label '{label}' shared by clusters {clusters:?}")
            }
            Warning::SkippedRecord { line, reason } => format!("line {line} skipped: {reason}"),
        };
        println!("  {} {}", "!".yellow(), line);
    }
}

fn colorize_coefficient(value: f64) -> colored::ColoredString {
    let text = format!("{value:.6}");
    if value.is_nan() {
        text.dimmed()
    } else if value >= 0.0 {
        text.green()
    } else {
        text.red()
    }
}
