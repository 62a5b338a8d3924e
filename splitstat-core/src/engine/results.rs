//! Analysis snapshot, winner selection and recommendations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{MetricType, Test, TestStatus, Variant};
use crate::stats::Significance;

/// Per-variant section of [`TestResults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: String,
    pub name: String,
    pub is_control: bool,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub revenue: f64,
    pub engagement_rate: f64,
    pub conversion_rate: f64,
    pub revenue_per_visitor: f64,
    pub confidence_interval: (f64, f64),
    /// p-value against the control; absent for the control and for untestable metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    /// Whether the comparison ran and cleared the significance threshold.
    /// False for sentinel p-values.
    #[serde(default)]
    pub is_significant: bool,
    pub statistical_significance: f64,
    pub is_winner: bool,
}

impl VariantResult {
    pub(crate) fn from_variant(variant: &Variant, significance: Option<Significance>) -> Self {
        Self {
            variant_id: variant.variant_id.clone(),
            name: variant.name.clone(),
            is_control: variant.is_control,
            impressions: variant.impressions,
            clicks: variant.clicks,
            conversions: variant.conversions,
            revenue: variant.revenue,
            engagement_rate: variant.engagement_rate,
            conversion_rate: variant.conversion_rate,
            revenue_per_visitor: variant.revenue_per_visitor,
            confidence_interval: variant.confidence_interval,
            p_value: significance.map(|s| s.p_value),
            is_significant: significance.is_some_and(|s| s.is_significant),
            statistical_significance: variant.statistical_significance,
            is_winner: variant.is_winner,
        }
    }
}

/// Full analysis of a test at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub test_id: String,
    pub test_name: String,
    pub status: TestStatus,
    pub primary_metric: MetricType,
    pub confidence_level: f64,
    pub minimum_sample_size: u64,
    pub total_impressions: u64,
    pub variants: Vec<VariantResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub recommendations: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl TestResults {
    pub fn winner_result(&self) -> Option<&VariantResult> {
        let id = self.winner.as_deref()?;
        self.variants.iter().find(|v| v.variant_id == id)
    }

    pub fn control_result(&self) -> Option<&VariantResult> {
        self.variants.iter().find(|v| v.is_control)
    }
}

/// Index of the variant with the highest primary metric, first one on ties.
///
/// Cancelled tests and metrics without a tracked value have no winner.
pub(crate) fn determine_winner(test: &Test) -> Option<usize> {
    if test.status == TestStatus::Cancelled {
        return None;
    }
    let metric = test.primary_metric;
    let mut best: Option<(usize, f64)> = None;
    for (index, variant) in test.variants.iter().enumerate() {
        let value = variant.metric_value(metric)?;
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// Relative lift of `winner` over `control` in percent, if the control is non-zero.
pub(crate) fn lift_percent(winner: f64, control: f64) -> Option<f64> {
    if control == 0.0 {
        None
    } else {
        Some((winner - control) / control * 100.0)
    }
}

pub(crate) fn generate_recommendations(test: &Test, winner: Option<usize>) -> Vec<String> {
    let mut recommendations = Vec::new();
    let metric = test.primary_metric;
    let control = test.control_index();

    match (winner, control) {
        (Some(w), Some(c)) if w != c => {
            let winner = &test.variants[w];
            let winner_value = winner.metric_value(metric).unwrap_or(0.0);
            let control_value = test.variants[c].metric_value(metric).unwrap_or(0.0);
            match lift_percent(winner_value, control_value) {
                Some(lift) => {
                    recommendations.push(format!(
                        "Implement {} - shows {:.1}% improvement over control",
                        winner.name, lift
                    ));
                    recommendations.push(format!(
                        "Expected impact: {:.1}% increase in {}",
                        lift, metric
                    ));
                }
                None => recommendations.push(format!(
                    "Implement {} - control recorded no {}, so the relative lift is undefined",
                    winner.name, metric
                )),
            }
        }
        _ => recommendations.push(
            "No significant winner found - consider running longer or testing different variants"
                .to_string(),
        ),
    }

    let total = test.total_impressions();
    if total < test.minimum_sample_size {
        recommendations.push(format!(
            "Increase sample size - need {} more impressions",
            test.minimum_sample_size - total
        ));
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestType;

    fn make_test(metric: MetricType, rates: &[(u64, u64)]) -> Test {
        let now = Utc::now();
        let variants = rates
            .iter()
            .enumerate()
            .map(|(i, &(impressions, conversions))| {
                let mut v = Variant::new(
                    format!("variant_{}", i),
                    format!("V{}", i),
                    1.0 / rates.len() as f64,
                    i == 0,
                );
                v.impressions = impressions;
                v.conversions = conversions;
                v.clicks = conversions;
                v.revenue = conversions as f64 * 10.0;
                v.update_rates();
                v
            })
            .collect();
        Test {
            test_id: "test_00000000".to_string(),
            name: "t".to_string(),
            description: String::new(),
            test_type: TestType::Pricing,
            primary_metric: metric,
            secondary_metrics: Vec::new(),
            variants,
            minimum_sample_size: 1000,
            minimum_effect_size: 0.1,
            baseline_rate: 0.05,
            confidence_level: 0.95,
            statistical_power: 0.8,
            start_date: now,
            end_date: now,
            max_duration_days: 30,
            status: TestStatus::Running,
            stop_reason: None,
            winning_variant_id: None,
            test_results: None,
            recommendations: Vec::new(),
            created_by: "system".to_string(),
            created_date: now,
            last_updated: now,
        }
    }

    #[test]
    fn test_winner_is_max_metric() {
        let test = make_test(MetricType::ConversionRate, &[(100, 5), (100, 9), (100, 7)]);
        assert_eq!(determine_winner(&test), Some(1));
    }

    #[test]
    fn test_winner_ties_pick_first() {
        let test = make_test(MetricType::ConversionRate, &[(100, 5), (100, 5)]);
        assert_eq!(determine_winner(&test), Some(0));
    }

    #[test]
    fn test_no_winner_for_untracked_metric() {
        let test = make_test(MetricType::BounceRate, &[(100, 5), (100, 9)]);
        assert_eq!(determine_winner(&test), None);
    }

    #[test]
    fn test_no_winner_when_cancelled() {
        let mut test = make_test(MetricType::ConversionRate, &[(100, 5), (100, 9)]);
        test.status = TestStatus::Cancelled;
        assert_eq!(determine_winner(&test), None);
    }

    #[test]
    fn test_recommendations_with_lift() {
        let test = make_test(MetricType::ConversionRate, &[(1000, 60), (1000, 90)]);
        let recs = generate_recommendations(&test, determine_winner(&test));
        assert!(recs[0].contains("Implement V1"));
        assert!(recs[0].contains("50.0%"));
        assert!(recs[1].contains("conversion_rate"));
    }

    #[test]
    fn test_recommendations_sample_shortfall() {
        let test = make_test(MetricType::ConversionRate, &[(100, 9), (100, 5)]);
        let recs = generate_recommendations(&test, determine_winner(&test));
        assert!(recs[0].starts_with("No significant winner found"));
        assert_eq!(recs[1], "Increase sample size - need 800 more impressions");
    }

    #[test]
    fn test_recommendations_zero_control() {
        let test = make_test(MetricType::RevenuePerVisitor, &[(100, 0), (100, 3)]);
        let recs = generate_recommendations(&test, determine_winner(&test));
        assert!(recs[0].contains("relative lift is undefined"));
    }

    #[test]
    fn test_lift_percent() {
        assert!((lift_percent(0.09, 0.06).unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(lift_percent(0.1, 0.0), None);
    }
}
