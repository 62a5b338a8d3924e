use statrs::distribution::{ContinuousCDF, StudentsT};

use super::{Significance, SignificanceTest};
use crate::model::Variant;

/// Minimum impressions per variant before revenue is compared.
pub const MIN_REVENUE_SAMPLES: u64 = 30;

/// Assumed coefficient of variation of per-visitor revenue.
///
/// Individual revenue observations are not retained, so the standard deviation is
/// estimated as `mean * REVENUE_CV` instead of being measured.
pub const REVENUE_CV: f64 = 0.5;

/// Assumed standard error of mean revenue, as a fraction of the mean.
pub const REVENUE_SE_FRACTION: f64 = 0.1;

/// Approximate two-sample t-test on revenue per visitor.
///
/// Standard deviations come from [`REVENUE_CV`] rather than sample variance, and the
/// degrees of freedom are `n1 + n2 - 2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevenueTTest;

impl SignificanceTest for RevenueTTest {
    fn test(&self, control: &Variant, other: &Variant) -> Significance {
        let (n1, n2) = (control.impressions, other.impressions);
        if n1 < MIN_REVENUE_SAMPLES || n2 < MIN_REVENUE_SAMPLES {
            return Significance::untested(1.0);
        }

        let mean1 = control.revenue_per_visitor;
        let mean2 = other.revenue_per_visitor;
        let std1 = mean1 * REVENUE_CV;
        let std2 = mean2 * REVENUE_CV;

        let se = (std1.powi(2) / n1 as f64 + std2.powi(2) / n2 as f64).sqrt();
        if se == 0.0 {
            return Significance::untested(0.0);
        }

        let t_statistic = (mean2 - mean1) / se;
        let df = (n1 + n2 - 2) as f64;

        let p_value = match StudentsT::new(0.0, 1.0, df) {
            Ok(t_dist) => 2.0 * (1.0 - t_dist.cdf(t_statistic.abs())),
            Err(_) => 1.0, // Conservative fallback if distribution creation fails
        };

        Significance::from_p_value(p_value)
    }
}

/// `mean ± z * mean * REVENUE_SE_FRACTION`, lower bound clamped at zero.
pub(super) fn revenue_interval(variant: &Variant, z: f64) -> (f64, f64) {
    let mean = variant.revenue_per_visitor;
    let margin = z * mean * REVENUE_SE_FRACTION;
    ((mean - margin).max(0.0), mean + margin)
}
