//! Console reports for benchmark runs
//!
//! This crate renders the text the binary prints around a run:
//!
//! - A configuration banner before the first server starts
//! - The final summary table, one row per planned server

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::fmt::Write;

use serverbench_core::{RunPlan, RunSummary, ServerReport, ServerStatus};

const RULE_WIDTH: usize = 70;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Banner describing what is about to run
pub fn render_plan(plan: &RunPlan) -> String {
    let mut out = String::new();
    let names: Vec<&str> = plan.servers.iter().map(|s| s.name.as_str()).collect();
    let resources: Vec<String> = plan.resources.iter().map(|r| r.to_string()).collect();
    let capacity: Vec<String> = plan.capacity.iter().map(|c| c.to_string()).collect();

    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "   Server Bench");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "  Servers:      {}", names.join(", "));
    let _ = writeln!(out, "  Resources:    {}", resources.join(", "));
    let _ = writeln!(out, "  Capacity:     {}", capacity.join(", "));
    let _ = writeln!(
        out,
        "  Warmup:       {} requests x {} workers",
        plan.warmup.requests, plan.warmup.concurrency
    );
    match &plan.stack {
        Some(stack) => {
            let _ = writeln!(
                out,
                "  Stack:        {} ({})",
                stack.project_name,
                stack.required_services.join(", ")
            );
        }
        None => {
            let _ = writeln!(out, "  Stack:        none");
        }
    }
    let _ = writeln!(out, "  Results:      {}", plan.results_root.display());
    let _ = writeln!(out, "{}", rule());
    out
}

fn reason(report: &ServerReport) -> String {
    match (&report.reason, &report.detail) {
        (Some(kind), Some(detail)) => format!("{}: {}", kind.as_str(), detail),
        (Some(kind), None) => kind.as_str().to_string(),
        (None, _) => String::new(),
    }
}

/// Final table: server, status, cells, requests, errors, best RPS, reason
pub fn render_summary(summary: &RunSummary) -> String {
    let name_width = summary
        .servers
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("Server".len());

    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "   Benchmark Summary");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(
        out,
        "{:<name_width$}  {:<11}  {:>5}  {:>9}  {:>7}  {:>10}  Reason",
        "Server", "Status", "Cells", "Requests", "Errors", "Best RPS",
    );
    for report in &summary.servers {
        let _ = writeln!(
            out,
            "{:<name_width$}  {:<11}  {:>5}  {:>9}  {:>7}  {:>10.1}  {}",
            report.name,
            report.status.label(),
            report.cells,
            report.requests,
            report.errors,
            report.best_rps,
            reason(report),
        );
    }
    let _ = writeln!(out);

    let elapsed = summary.ended_at - summary.started_at;
    let _ = writeln!(
        out,
        "  {} ok, {} failed, {} interrupted, {} skipped in {:.1}s",
        summary.count(ServerStatus::Completed),
        summary.count(ServerStatus::Failed),
        summary.count(ServerStatus::Interrupted),
        summary.count(ServerStatus::Skipped),
        elapsed.num_milliseconds().max(0) as f64 / 1000.0,
    );
    let _ = writeln!(out, "  Outcome:      {:?}", summary.outcome);
    let _ = writeln!(out, "  Results:      {}", summary.run_dir.display());
    let _ = writeln!(out, "{}", rule());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serverbench_core::{
        apply_runtime_options, Catalogue, FailureKind, RunOutcome, RuntimeOptions,
    };
    use std::path::PathBuf;

    fn summary() -> RunSummary {
        let started_at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let mut ok = ServerReport::skipped("chi");
        ok.status = ServerStatus::Completed;
        ok.cells = 6;
        ok.requests = 6000;
        ok.errors = 3;
        ok.best_rps = 10432.25;

        let mut failed = ServerReport::skipped("actix-web");
        failed.status = ServerStatus::Failed;
        failed.reason = Some(FailureKind::ImageMissing);
        failed.detail = Some("bench/actix:latest".to_string());

        RunSummary {
            outcome: RunOutcome::Completed,
            servers: vec![ok, failed, ServerReport::skipped("gin")],
            run_dir: PathBuf::from("/results/20240309-070501"),
            started_at,
            ended_at: started_at + chrono::Duration::milliseconds(92_500),
        }
    }

    #[test]
    fn test_summary_rows() {
        let text = render_summary(&summary());
        let rows: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("chi") || l.starts_with("actix-web") || l.starts_with("gin"))
            .collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].contains("OK"));
        assert!(rows[0].contains("6000"));
        assert!(rows[0].contains("10432.2") || rows[0].contains("10432.3"));
        assert!(rows[1].contains("FAILED"));
        assert!(rows[1].ends_with("IMAGE_MISSING: bench/actix:latest"));
        assert!(rows[2].contains("SKIPPED"));
    }

    #[test]
    fn test_summary_columns_align() {
        let text = render_summary(&summary());
        let header = text.lines().find(|l| l.starts_with("Server")).unwrap();
        let row = text.lines().find(|l| l.starts_with("chi")).unwrap();
        assert_eq!(header.find("Status"), row.find("OK"));
    }

    #[test]
    fn test_summary_footer() {
        let text = render_summary(&summary());
        assert!(text.contains("1 ok, 1 failed, 0 interrupted, 1 skipped in 92.5s"));
        assert!(text.contains("/results/20240309-070501"));
    }

    #[test]
    fn test_plan_banner() {
        let catalogue = Catalogue::from_yaml(
            r#"
servers:
  - { name: chi, image: bench/chi:latest, hostPort: 8080, containerPort: 8080 }
  - { name: gin, image: bench/gin:latest, hostPort: 8081, containerPort: 8080 }
"#,
        )
        .unwrap();
        let options = RuntimeOptions {
            capacity: Some(vec![1, 8]),
            results_dir: Some(PathBuf::from("/tmp/bench")),
            ..Default::default()
        };
        let (plan, _) = apply_runtime_options(&catalogue, &options).unwrap();
        let text = render_plan(&plan);
        assert!(text.contains("Servers:      chi, gin"));
        assert!(text.contains("Capacity:     1, 8"));
        assert!(text.contains("Stack:        none"));
        assert!(text.contains("/tmp/bench"));
    }
}
