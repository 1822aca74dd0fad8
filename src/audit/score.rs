//! Weighted score aggregation.

use super::analyzer::{CategoryReport, Grade, OverallScore, ScoreAggregator};

/// Weighted mean of applicable category scores. Weights are renormalized
/// over the categories that ran, so a quick audit is not penalized for the
/// categories it skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedAggregator;

impl ScoreAggregator for WeightedAggregator {
    fn aggregate(&self, reports: &[CategoryReport]) -> OverallScore {
        let (sum, total) = reports
            .iter()
            .filter(|r| r.applicable && r.weight > 0.0)
            .fold((0.0, 0.0), |(sum, total), r| {
                (sum + f64::from(r.score) * r.weight, total + r.weight)
            });

        let score = if total > 0.0 {
            (sum / total).round().clamp(0.0, 100.0) as u8
        } else {
            0
        };

        OverallScore {
            score,
            grade: Grade::from_score(score),
        }
    }
}
