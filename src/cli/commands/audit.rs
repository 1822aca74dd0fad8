//! One-off audit command.

use console::style;

use crate::audit::{AuditRequest, AuditService};
use crate::config::Settings;

/// Run a single audit and print the report as JSON.
pub async fn cmd_audit(settings: &Settings, url: &str, full: bool, deep: bool) -> anyhow::Result<()> {
    let service = AuditService::from_settings(settings).await?;
    let request = AuditRequest {
        url: url.to_string(),
        full_audit: full,
        deep_tech_detect: deep,
    };

    eprintln!("{} Auditing {}...", style("→").cyan(), url);
    match service.run(&request).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            eprintln!(
                "{} Score {} ({:?}) in {}ms",
                style("✓").green(),
                style(report.score).bold(),
                report.grade,
                report.duration_ms
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {} ({})", style("✗").red(), e.public_message(), e.code());
            std::process::exit(1);
        }
    }
}
