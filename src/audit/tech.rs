//! Technology detection from headers, markup and rendered JS signals.

use scraper::{Html, Selector};

use super::analyzer::{Analyzer, Category, CategoryReport, Issue, PageSnapshot, Severity};

pub struct TechAnalyzer;

impl TechAnalyzer {
    fn generator(page: &PageSnapshot) -> Option<String> {
        let document = Html::parse_document(page.html());
        let selector = Selector::parse("meta[name='generator']").ok()?;
        let content = document
            .select(&selector)
            .next()?
            .value()
            .attr("content")?
            .trim()
            .to_string();
        (!content.is_empty()).then_some(content)
    }
}

/// Major version below which jQuery is considered unmaintained.
const JQUERY_CURRENT_MAJOR: u32 = 3;

fn major_version(version: &str) -> Option<u32> {
    version.trim_start_matches('v').split('.').next()?.parse().ok()
}

impl Analyzer for TechAnalyzer {
    fn category(&self) -> Category {
        Category::Technology
    }

    fn weight(&self) -> f64 {
        0.15
    }

    fn requires_full_audit(&self) -> bool {
        true
    }

    fn analyze(&self, page: &PageSnapshot) -> CategoryReport {
        let mut findings = Vec::new();
        let mut issues = Vec::new();

        if let Some(server) = page.header("server") {
            findings.push(format!("Server: {}", server));
        }
        if let Some(powered_by) = page.header("x-powered-by") {
            findings.push(format!("Powered by: {}", powered_by));
        }
        if let Some(generator) = Self::generator(page) {
            if generator.chars().any(|c| c.is_ascii_digit()) {
                issues.push(Issue::new(
                    "generator-version",
                    Severity::Info,
                    format!("Generator meta tag exposes a version ({})", generator),
                ));
            }
            findings.push(format!("Generator: {}", generator));
        }

        if let Some(rendered) = &page.rendered {
            let signals = &rendered.js_signals;
            findings.extend(signals.detected().into_iter().map(str::to_string));

            if let Some(version) = signals.jquery_version.as_deref() {
                if major_version(version).is_some_and(|major| major < JQUERY_CURRENT_MAJOR) {
                    issues.push(Issue::new(
                        "outdated-jquery",
                        Severity::Warning,
                        format!("jQuery {} is no longer maintained", version),
                    ));
                }
            }
            if rendered.partial {
                issues.push(Issue::new(
                    "partial-render",
                    Severity::Info,
                    "Rendering timed out; detection may be incomplete",
                ));
            }
            if rendered.blocked_requests > 0 {
                issues.push(Issue::new(
                    "blocked-requests",
                    Severity::Info,
                    format!(
                        "{} requests to private or local addresses were blocked",
                        rendered.blocked_requests
                    ),
                ));
            }
        }

        if findings.is_empty() && issues.is_empty() {
            return CategoryReport::not_applicable(Category::Technology);
        }
        CategoryReport::from_issues(Category::Technology, issues).with_findings(findings)
    }
}
