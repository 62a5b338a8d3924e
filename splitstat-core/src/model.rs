//! Test and variant data model.
//!
//! A [`Test`] owns an ordered list of [`Variant`]s. Counters on a variant are only
//! ever mutated by [`Variant::record`]; the derived rates are recomputed from those
//! counters and never stored independently of them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::TestResults;

/// Schema-less payload attached to variants and events.
pub type Payload = Map<String, Value>;

/// What kind of change a test exercises. Descriptive only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    ContentHook,
    CallToAction,
    Thumbnail,
    PostingTime,
    Hashtags,
    CaptionLength,
    ContentFormat,
    Pricing,
    EmailSubject,
    LandingPage,
    AdCreative,
    AudienceTargeting,
}

/// The KPI a test is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    EngagementRate,
    ClickThroughRate,
    ConversionRate,
    RevenuePerVisitor,
    CostPerAcquisition,
    RetentionRate,
    ViralCoefficient,
    TimeOnPage,
    BounceRate,
    ShareRate,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::EngagementRate => "engagement_rate",
            MetricType::ClickThroughRate => "click_through_rate",
            MetricType::ConversionRate => "conversion_rate",
            MetricType::RevenuePerVisitor => "revenue_per_visitor",
            MetricType::CostPerAcquisition => "cost_per_acquisition",
            MetricType::RetentionRate => "retention_rate",
            MetricType::ViralCoefficient => "viral_coefficient",
            MetricType::TimeOnPage => "time_on_page",
            MetricType::BounceRate => "bounce_rate",
            MetricType::ShareRate => "share_rate",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Draft => "draft",
            TestStatus::Running => "running",
            TestStatus::Paused => "paused",
            TestStatus::Completed => "completed",
            TestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-facing event recorded against a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    Conversion,
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impression" => Ok(EventType::Impression),
            "click" => Ok(EventType::Click),
            "conversion" => Ok(EventType::Conversion),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub variant_id: String,
    pub name: String,
    pub description: String,
    /// The creative, price or copy under test. Never interpreted here.
    pub variant_data: Payload,
    /// Share of traffic in [0, 1].
    pub traffic_allocation: f64,

    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub revenue: f64,

    pub engagement_rate: f64,
    pub conversion_rate: f64,
    pub revenue_per_visitor: f64,

    /// Interval of the primary metric at the test's confidence level.
    pub confidence_interval: (f64, f64),
    /// `1 - p_value` against the control. Zero for the control itself.
    pub statistical_significance: f64,

    pub is_control: bool,
    pub is_winner: bool,
}

impl Variant {
    pub fn new(
        variant_id: impl Into<String>,
        name: impl Into<String>,
        traffic_allocation: f64,
        is_control: bool,
    ) -> Self {
        Self {
            variant_id: variant_id.into(),
            name: name.into(),
            description: String::new(),
            variant_data: Payload::new(),
            traffic_allocation,
            impressions: 0,
            clicks: 0,
            conversions: 0,
            revenue: 0.0,
            engagement_rate: 0.0,
            conversion_rate: 0.0,
            revenue_per_visitor: 0.0,
            confidence_interval: (0.0, 0.0),
            statistical_significance: 0.0,
            is_control,
            is_winner: false,
        }
    }

    /// Apply one event to the counters and refresh the derived rates.
    ///
    /// Conversions add `event_data.revenue` when it is a finite, non-negative number.
    pub fn record(&mut self, event_type: EventType, event_data: Option<&Payload>) {
        match event_type {
            EventType::Impression => self.impressions += 1,
            EventType::Click => self.clicks += 1,
            EventType::Conversion => {
                self.conversions += 1;
                let revenue = event_data
                    .and_then(|data| data.get("revenue"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                if revenue.is_finite() && revenue > 0.0 {
                    self.revenue += revenue;
                }
            }
        }
        self.update_rates();
    }

    /// Recompute rates from the counters. All rates are zero without impressions.
    pub fn update_rates(&mut self) {
        if self.impressions == 0 {
            self.engagement_rate = 0.0;
            self.conversion_rate = 0.0;
            self.revenue_per_visitor = 0.0;
            return;
        }
        let n = self.impressions as f64;
        self.engagement_rate = self.clicks as f64 / n;
        self.conversion_rate = self.conversions as f64 / n;
        self.revenue_per_visitor = self.revenue / n;
    }

    /// Value of `metric` for this variant, if the engine tracks it.
    pub fn metric_value(&self, metric: MetricType) -> Option<f64> {
        match metric {
            MetricType::ConversionRate => Some(self.conversion_rate),
            MetricType::RevenuePerVisitor => Some(self.revenue_per_visitor),
            MetricType::EngagementRate => Some(self.engagement_rate),
            _ => None,
        }
    }
}

/// An A/B test: configuration, variants with running counters, and the last analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    pub test_id: String,
    pub name: String,
    pub description: String,
    pub test_type: TestType,

    pub primary_metric: MetricType,
    #[serde(default)]
    pub secondary_metrics: Vec<MetricType>,
    pub variants: Vec<Variant>,

    pub minimum_sample_size: u64,
    pub minimum_effect_size: f64,
    pub baseline_rate: f64,
    pub confidence_level: f64,
    pub statistical_power: f64,

    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_duration_days: u32,

    pub status: TestStatus,
    pub stop_reason: Option<String>,

    pub winning_variant_id: Option<String>,
    pub test_results: Option<TestResults>,
    #[serde(default)]
    pub recommendations: Vec<String>,

    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Test {
    pub fn control_index(&self) -> Option<usize> {
        if self.variants.is_empty() {
            return None;
        }
        Some(
            self.variants
                .iter()
                .position(|v| v.is_control)
                .unwrap_or(0),
        )
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.variant_id == variant_id)
    }

    pub fn variant_mut(&mut self, variant_id: &str) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.variant_id == variant_id)
    }

    pub fn total_impressions(&self) -> u64 {
        self.variants.iter().map(|v| v.impressions).sum()
    }

    pub fn total_allocation(&self) -> f64 {
        self.variants.iter().map(|v| v.traffic_allocation).sum()
    }

    /// The instant after which a running test is stopped automatically:
    /// the earlier of `end_date` and `start_date + max_duration_days`.
    /// A duration past the representable range leaves `end_date` in charge.
    pub fn deadline(&self) -> DateTime<Utc> {
        chrono::Duration::try_days(i64::from(self.max_duration_days))
            .and_then(|duration| self.start_date.checked_add_signed(duration))
            .map_or(self.end_date, |by_duration| self.end_date.min(by_duration))
    }
}

/// Per-variant input to [`crate::ABTestEngine::create_test`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_allocation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_control: Option<bool>,
}

impl VariantConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_allocation(mut self, allocation: f64) -> Self {
        self.traffic_allocation = Some(allocation);
        self
    }

    pub fn control(mut self) -> Self {
        self.is_control = Some(true);
        self
    }
}

/// Input to [`crate::ABTestEngine::create_test`]. Omitted parameters fall back to
/// the engine's [`TestDefaults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub test_type: TestType,
    pub primary_metric: MetricType,
    #[serde(default)]
    pub secondary_metrics: Vec<MetricType>,
    pub variants: Vec<VariantConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_effect_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistical_power: Option<f64>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Parameters used when a [`TestConfig`] leaves them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestDefaults {
    pub baseline_rate: f64,
    pub minimum_effect_size: f64,
    pub confidence_level: f64,
    pub statistical_power: f64,
    pub max_duration_days: u32,
}

impl Default for TestDefaults {
    fn default() -> Self {
        Self {
            baseline_rate: 0.05,
            minimum_effect_size: 0.1,
            confidence_level: 0.95,
            statistical_power: 0.8,
            max_duration_days: 30,
        }
    }
}
