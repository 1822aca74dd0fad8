//! Markup checks for search engine basics.

use scraper::{ElementRef, Html, Selector};

use super::analyzer::{Analyzer, Category, CategoryReport, Issue, PageSnapshot, Severity};

const TITLE_MIN_CHARS: usize = 10;
const TITLE_MAX_CHARS: usize = 60;
const DESCRIPTION_MIN_CHARS: usize = 50;
const DESCRIPTION_MAX_CHARS: usize = 160;

/// Elements matching a CSS selector. An invalid selector matches nothing.
fn select<'a>(document: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn text_of(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn attr<'a>(element: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub struct SeoAnalyzer;

impl Analyzer for SeoAnalyzer {
    fn category(&self) -> Category {
        Category::Seo
    }

    fn weight(&self) -> f64 {
        0.35
    }

    fn analyze(&self, page: &PageSnapshot) -> CategoryReport {
        let document = Html::parse_document(page.html());
        let mut issues = Vec::new();

        check_title(&document, &mut issues);
        check_description(&document, &mut issues);
        check_headings(&document, &mut issues);

        if select(&document, "meta[name='viewport']").is_empty() {
            issues.push(Issue::new(
                "missing-viewport",
                Severity::Warning,
                "No viewport meta tag; the page may not render well on mobile",
            ));
        }

        let has_lang = select(&document, "html")
            .first()
            .and_then(|html| attr(html, "lang"))
            .is_some();
        if !has_lang {
            issues.push(Issue::new(
                "missing-lang",
                Severity::Warning,
                "The html element has no lang attribute",
            ));
        }

        if select(&document, "link[rel='canonical']").is_empty() {
            issues.push(Issue::new(
                "missing-canonical",
                Severity::Info,
                "No canonical link",
            ));
        }

        let images = select(&document, "img");
        let missing_alt = images.iter().filter(|img| img.value().attr("alt").is_none()).count();
        if missing_alt > 0 {
            issues.push(Issue::new(
                "img-missing-alt",
                Severity::Warning,
                format!("{} of {} images have no alt text", missing_alt, images.len()),
            ));
        }

        CategoryReport::from_issues(Category::Seo, issues)
    }
}

fn check_title(document: &Html, issues: &mut Vec<Issue>) {
    let title = select(document, "title")
        .first()
        .map(text_of)
        .unwrap_or_default();
    let len = title.chars().count();

    if len == 0 {
        issues.push(Issue::new("missing-title", Severity::Critical, "The page has no title"));
    } else if len < TITLE_MIN_CHARS {
        issues.push(Issue::new(
            "short-title",
            Severity::Warning,
            format!("Title is {} characters; aim for {} to {}", len, TITLE_MIN_CHARS, TITLE_MAX_CHARS),
        ));
    } else if len > TITLE_MAX_CHARS {
        issues.push(Issue::new(
            "long-title",
            Severity::Info,
            format!("Title is {} characters and may be truncated in results", len),
        ));
    }
}

fn check_description(document: &Html, issues: &mut Vec<Issue>) {
    let description = select(document, "meta[name='description']")
        .first()
        .and_then(|meta| attr(meta, "content"))
        .map(|c| c.chars().count());

    match description {
        None => issues.push(Issue::new(
            "missing-description",
            Severity::Critical,
            "No meta description",
        )),
        Some(len) if len < DESCRIPTION_MIN_CHARS => issues.push(Issue::new(
            "short-description",
            Severity::Info,
            format!("Meta description is only {} characters", len),
        )),
        Some(len) if len > DESCRIPTION_MAX_CHARS => issues.push(Issue::new(
            "long-description",
            Severity::Info,
            format!("Meta description is {} characters and may be truncated", len),
        )),
        Some(_) => {}
    }
}

fn check_headings(document: &Html, issues: &mut Vec<Issue>) {
    match select(document, "h1").len() {
        0 => issues.push(Issue::new("missing-h1", Severity::Critical, "The page has no h1")),
        1 => {}
        n => issues.push(Issue::new(
            "multiple-h1",
            Severity::Warning,
            format!("The page has {} h1 elements", n),
        )),
    }
}
