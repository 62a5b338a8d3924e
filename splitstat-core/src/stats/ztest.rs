use super::{two_tailed_normal_p, Significance, SignificanceTest};
use crate::model::Variant;

/// Two-proportion z-test on conversions over impressions, using the pooled
/// proportion for the standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoProportionZTest;

impl SignificanceTest for TwoProportionZTest {
    fn test(&self, control: &Variant, other: &Variant) -> Significance {
        let (n1, n2) = (control.impressions, other.impressions);
        if n1 == 0 || n2 == 0 {
            return Significance::untested(0.0);
        }

        let (x1, x2) = (control.conversions as f64, other.conversions as f64);
        let (n1, n2) = (n1 as f64, n2 as f64);
        let p1 = x1 / n1;
        let p2 = x2 / n2;
        let p_pooled = (x1 + x2) / (n1 + n2);

        let variance = p_pooled * (1.0 - p_pooled) * (1.0 / n1 + 1.0 / n2);
        // More conversions than impressions makes the pooled variance negative.
        if !(variance > 0.0) {
            return Significance::untested(0.0);
        }
        let se = variance.sqrt();

        let z = (p2 - p1) / se;
        Significance::from_p_value(two_tailed_normal_p(z))
    }
}

/// Wald interval `p ± z * sqrt(p (1 - p) / n)` clamped to [0, 1].
pub(super) fn wald_interval(variant: &Variant, z: f64) -> (f64, f64) {
    let p = variant.conversion_rate;
    let n = variant.impressions as f64;
    let se = (p * (1.0 - p) / n).max(0.0).sqrt();
    let margin = z * se;
    ((p - margin).max(0.0), (p + margin).min(1.0))
}
