//! Pure statistical functions: power analysis, significance tests and
//! confidence intervals. Nothing here has side effects.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{EngineError, Result};
use crate::model::{MetricType, Variant};

mod ttest;
mod ztest;

pub use ttest::RevenueTTest;
pub use ztest::TwoProportionZTest;

/// p-value below which a difference is reported as significant.
///
/// Fixed regardless of a test's configured confidence level.
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.05;

/// Stricter p-value required to stop a running test early.
pub const EARLY_STOPPING_P_VALUE: f64 = 0.01;

/// Lower bound on any computed sample size.
pub const MIN_SAMPLE_SIZE: u64 = 100;

/// Outcome of comparing one variant against the control.
///
/// When no test could be performed the p-value carries a sentinel:
/// `0.0` for a proportion test without data, `1.0` for an underpowered revenue test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Significance {
    pub p_value: f64,
    pub is_significant: bool,
}

impl Significance {
    pub(crate) fn from_p_value(p_value: f64) -> Self {
        Self {
            p_value,
            is_significant: p_value < SIGNIFICANCE_THRESHOLD,
        }
    }

    pub(crate) fn untested(p_value: f64) -> Self {
        Self {
            p_value,
            is_significant: false,
        }
    }
}

/// A significance test comparing a variant to the control on one metric.
pub trait SignificanceTest: Send + Sync {
    fn test(&self, control: &Variant, other: &Variant) -> Significance;
}

/// Entry points used by the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalAnalyzer;

impl StatisticalAnalyzer {
    /// Per-variant sample size needed to detect a relative lift of
    /// `minimum_effect_size` over `baseline_rate`, never below [`MIN_SAMPLE_SIZE`].
    ///
    /// n = ceil([z_a * sqrt(2 p (1 - p)) + z_b * sqrt(p1 (1 - p1) + p2 (1 - p2))]^2 / (p2 - p1)^2)
    /// with p the mean of p1 and p2.
    pub fn calculate_sample_size(
        baseline_rate: f64,
        minimum_effect_size: f64,
        confidence_level: f64,
        power: f64,
    ) -> Result<u64> {
        if !(baseline_rate > 0.0 && baseline_rate < 1.0) {
            return Err(EngineError::Configuration(format!(
                "baseline_rate must be in (0, 1), got {}",
                baseline_rate
            )));
        }
        if !(minimum_effect_size > 0.0) || !minimum_effect_size.is_finite() {
            return Err(EngineError::Configuration(format!(
                "minimum_effect_size must be positive, got {}",
                minimum_effect_size
            )));
        }
        check_probability("confidence_level", confidence_level)?;
        check_probability("statistical_power", power)?;

        let p1 = baseline_rate;
        let p2 = baseline_rate * (1.0 + minimum_effect_size);
        if p2 > 1.0 {
            return Err(EngineError::Configuration(format!(
                "baseline_rate {} with lift {} exceeds a rate of 1",
                baseline_rate, minimum_effect_size
            )));
        }

        let alpha = 1.0 - confidence_level;
        let z_alpha = z_quantile(1.0 - alpha / 2.0)?;
        let z_beta = z_quantile(power)?;

        let p_pooled = (p1 + p2) / 2.0;
        let numerator = (z_alpha * (2.0 * p_pooled * (1.0 - p_pooled)).sqrt()
            + z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt())
        .powi(2);
        let denominator = (p2 - p1).powi(2);

        let n = (numerator / denominator).ceil();
        if !n.is_finite() {
            return Ok(u64::MAX);
        }
        Ok((n as u64).max(MIN_SAMPLE_SIZE))
    }

    /// Compare `other` against `control` on `metric`.
    ///
    /// Only conversion rate and revenue per visitor have a defined test.
    pub fn calculate_statistical_significance(
        control: &Variant,
        other: &Variant,
        metric: MetricType,
    ) -> Result<Significance> {
        match metric {
            MetricType::ConversionRate => Ok(TwoProportionZTest.test(control, other)),
            MetricType::RevenuePerVisitor => Ok(RevenueTTest.test(control, other)),
            other_metric => Err(EngineError::UnsupportedMetric(other_metric)),
        }
    }

    /// Interval for `variant`'s value of `metric`. `(0.0, 0.0)` without impressions
    /// or for metrics without a defined interval.
    pub fn calculate_confidence_interval(
        variant: &Variant,
        metric: MetricType,
        confidence_level: f64,
    ) -> (f64, f64) {
        if variant.impressions == 0 {
            return (0.0, 0.0);
        }
        let z = match z_quantile(1.0 - (1.0 - confidence_level) / 2.0) {
            Ok(z) => z,
            Err(_) => return (0.0, 0.0),
        };
        match metric {
            MetricType::ConversionRate => ztest::wald_interval(variant, z),
            MetricType::RevenuePerVisitor => ttest::revenue_interval(variant, z),
            _ => (0.0, 0.0),
        }
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(EngineError::Configuration(format!(
            "{} must be in (0, 1), got {}",
            name, value
        )))
    }
}

/// Inverse standard normal CDF.
fn z_quantile(p: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(EngineError::Configuration(format!(
            "probability must be in (0, 1), got {}",
            p
        )));
    }
    match Normal::new(0.0, 1.0) {
        Ok(normal) => Ok(normal.inverse_cdf(p)),
        Err(e) => Err(EngineError::Configuration(e.to_string())),
    }
}

/// Two-tailed p-value of a standard normal statistic.
fn two_tailed_normal_p(z: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(normal) => 2.0 * (1.0 - normal.cdf(z.abs())),
        Err(_) => 1.0,
    }
}
