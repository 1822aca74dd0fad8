//! Analyzer and aggregator seams.

use serde::Serialize;

use crate::browser::RenderedResult;
use crate::fetch::FetchResult;

/// Everything analyzers get to look at.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub fetch: FetchResult,
    pub rendered: Option<RenderedResult>,
}

impl PageSnapshot {
    pub fn html(&self) -> &str {
        &self.fetch.html
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.fetch.header(name)
    }

    pub fn is_https(&self) -> bool {
        self.fetch.final_url.scheme() == "https"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Seo,
    Security,
    Performance,
    Technology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    fn penalty(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 8,
            Self::Critical => 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    pub fn new(code: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
        }
    }
}

/// One category's result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub category: Category,
    /// 0 to 100.
    pub score: u8,
    /// Relative weight in the overall score.
    pub weight: f64,
    /// False when the category has nothing to say about this page.
    pub applicable: bool,
    pub issues: Vec<Issue>,
    /// Neutral observations, such as detected technologies.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<String>,
}

impl CategoryReport {
    /// Score by subtracting a fixed penalty per issue severity.
    pub fn from_issues(category: Category, issues: Vec<Issue>) -> Self {
        let penalty: u32 = issues.iter().map(|i| u32::from(i.severity.penalty())).sum();
        Self {
            category,
            score: 100u32.saturating_sub(penalty) as u8,
            weight: 1.0,
            applicable: true,
            issues,
            findings: Vec::new(),
        }
    }

    pub fn not_applicable(category: Category) -> Self {
        Self {
            applicable: false,
            ..Self::from_issues(category, Vec::new())
        }
    }

    pub fn with_findings(mut self, findings: Vec<String>) -> Self {
        self.findings = findings;
        self
    }
}

/// Produces one category report from a page.
pub trait Analyzer: Send + Sync {
    fn category(&self) -> Category;

    fn weight(&self) -> f64;

    /// Only run when a full audit was requested.
    fn requires_full_audit(&self) -> bool {
        false
    }

    fn analyze(&self, page: &PageSnapshot) -> CategoryReport;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => Self::A,
            80..=89 => Self::B,
            70..=79 => Self::C,
            60..=69 => Self::D,
            _ => Self::F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverallScore {
    pub score: u8,
    pub grade: Grade,
}

/// Folds category reports into one score.
pub trait ScoreAggregator: Send + Sync {
    fn aggregate(&self, reports: &[CategoryReport]) -> OverallScore;
}
