//! Transport and response-header hygiene.

use super::analyzer::{Analyzer, Category, CategoryReport, Issue, PageSnapshot, Severity};

/// Headers a hardened page is expected to send, with the severity of
/// leaving each one out.
const EXPECTED_HEADERS: &[(&str, &str, Severity)] = &[
    ("strict-transport-security", "missing-hsts", Severity::Warning),
    ("content-security-policy", "missing-csp", Severity::Warning),
    ("x-content-type-options", "missing-nosniff", Severity::Info),
    ("x-frame-options", "missing-frame-options", Severity::Info),
    ("referrer-policy", "missing-referrer-policy", Severity::Info),
];

pub struct SecurityAnalyzer;

impl Analyzer for SecurityAnalyzer {
    fn category(&self) -> Category {
        Category::Security
    }

    fn weight(&self) -> f64 {
        0.25
    }

    fn analyze(&self, page: &PageSnapshot) -> CategoryReport {
        let mut issues = Vec::new();

        if !page.is_https() {
            issues.push(Issue::new(
                "no-https",
                Severity::Critical,
                "The page is served over plain HTTP",
            ));
        }

        for (header, code, severity) in EXPECTED_HEADERS {
            // HSTS is meaningless over plain HTTP; no-https already covers it
            if *header == "strict-transport-security" && !page.is_https() {
                continue;
            }
            if page.header(header).is_none() {
                issues.push(Issue::new(
                    code,
                    *severity,
                    format!("Response has no {} header", header),
                ));
            }
        }

        if let Some(powered_by) = page.header("x-powered-by") {
            issues.push(Issue::new(
                "exposes-powered-by",
                Severity::Info,
                format!("X-Powered-By reveals the stack ({})", powered_by),
            ));
        }

        if page.is_https() && page.html().contains("src=\"http://") {
            issues.push(Issue::new(
                "mixed-content",
                Severity::Warning,
                "The page loads resources over plain HTTP",
            ));
        }

        CategoryReport::from_issues(Category::Security, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::tests::{snapshot, snapshot_at};

    #[test]
    fn test_hardened_https_page() {
        let page = snapshot(
            "<html></html>",
            &[
                ("strict-transport-security", "max-age=63072000"),
                ("content-security-policy", "default-src 'self'"),
                ("x-content-type-options", "nosniff"),
                ("x-frame-options", "DENY"),
                ("referrer-policy", "no-referrer"),
            ],
        );
        let report = SecurityAnalyzer.analyze(&page);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.score, 100);
    }

    #[test]
    fn test_plain_http_skips_hsts() {
        let page = snapshot_at("http://shop.example/", "<html></html>", &[]);
        let report = SecurityAnalyzer.analyze(&page);
        let codes: Vec<_> = report.issues.iter().map(|i| i.code).collect();
        assert!(codes.contains(&"no-https"));
        assert!(!codes.contains(&"missing-hsts"));
        assert!(codes.contains(&"missing-csp"));
    }

    #[test]
    fn test_mixed_content_and_powered_by() {
        let page = snapshot(
            r#"<script src="http://cdn.example/a.js"></script>"#,
            &[("x-powered-by", "PHP/8.1")],
        );
        let report = SecurityAnalyzer.analyze(&page);
        let codes: Vec<_> = report.issues.iter().map(|i| i.code).collect();
        assert!(codes.contains(&"mixed-content"));
        assert!(codes.contains(&"exposes-powered-by"));
    }
}
