//! Page weight and caching checks. Full audits only.

use scraper::{Html, Selector};

use super::analyzer::{Analyzer, Category, CategoryReport, Issue, PageSnapshot, Severity};

const HEAVY_HTML_BYTES: usize = 500 * 1024;
const MANY_SCRIPTS: usize = 30;
const MANY_STYLESHEETS: usize = 10;

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

pub struct PerformanceAnalyzer;

impl Analyzer for PerformanceAnalyzer {
    fn category(&self) -> Category {
        Category::Performance
    }

    fn weight(&self) -> f64 {
        0.25
    }

    fn requires_full_audit(&self) -> bool {
        true
    }

    fn analyze(&self, page: &PageSnapshot) -> CategoryReport {
        let document = Html::parse_document(page.html());
        let mut issues = Vec::new();

        let size = page.html().len();
        if size > HEAVY_HTML_BYTES {
            issues.push(Issue::new(
                "heavy-html",
                Severity::Warning,
                format!("HTML document is {} KiB", size / 1024),
            ));
        }

        let scripts = count(&document, "script[src]");
        if scripts > MANY_SCRIPTS {
            issues.push(Issue::new(
                "many-scripts",
                Severity::Warning,
                format!("{} external scripts", scripts),
            ));
        }

        let blocking = count(&document, "head script[src]:not([async]):not([defer]):not([type='module'])");
        if blocking > 0 {
            issues.push(Issue::new(
                "render-blocking-scripts",
                Severity::Warning,
                format!("{} scripts in head block rendering", blocking),
            ));
        }

        let stylesheets = count(&document, "link[rel='stylesheet']");
        if stylesheets > MANY_STYLESHEETS {
            issues.push(Issue::new(
                "many-stylesheets",
                Severity::Info,
                format!("{} stylesheets", stylesheets),
            ));
        }

        let lazy_candidates = count(&document, "img:not([loading])");
        if lazy_candidates > 5 {
            issues.push(Issue::new(
                "no-lazy-images",
                Severity::Info,
                format!("{} images without a loading attribute", lazy_candidates),
            ));
        }

        if page.header("content-encoding").is_none() {
            issues.push(Issue::new(
                "uncompressed",
                Severity::Warning,
                "Response was not compressed",
            ));
        }
        if page.header("cache-control").is_none() {
            issues.push(Issue::new(
                "no-cache-control",
                Severity::Info,
                "Response has no Cache-Control header",
            ));
        }

        CategoryReport::from_issues(Category::Performance, issues)
    }
}
