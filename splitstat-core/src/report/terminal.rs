use std::io::{self, Write};

use colored::Colorize;

use super::{ReportError, Reporter};
use crate::engine::{TestResults, VariantResult};
use crate::model::MetricType;

/// A reporter that prints test results as a table on the terminal.
#[derive(Debug, Clone, Default)]
pub struct TerminalReporter {
    /// Whether to use colors in output (defaults to true).
    use_colors: bool,
}

/// Verdict shown in the last column of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Winner,
    Control,
    Significant,
    Inconclusive,
}

impl Verdict {
    fn of(variant: &VariantResult) -> Self {
        if variant.is_winner {
            Verdict::Winner
        } else if variant.is_control {
            Verdict::Control
        } else if variant.is_significant {
            Verdict::Significant
        } else {
            Verdict::Inconclusive
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Verdict::Winner => "winner",
            Verdict::Control => "control",
            Verdict::Significant => "significant",
            Verdict::Inconclusive => "inconclusive",
        }
    }
}

impl TerminalReporter {
    /// Create a new terminal reporter with default settings.
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    /// Create a terminal reporter with color output disabled.
    pub fn without_colors() -> Self {
        Self { use_colors: false }
    }

    /// Shorten a variant name to fit the first column, counting characters.
    fn truncate_name(name: &str) -> String {
        if name.chars().count() > 26 {
            let head: String = name.chars().take(23).collect();
            format!("{}...", head)
        } else {
            name.to_string()
        }
    }

    /// Format a proportion as a percentage.
    fn format_rate(rate: f64) -> String {
        format!("{:.2}%", rate * 100.0)
    }

    /// Format a money amount.
    fn format_money(amount: f64) -> String {
        format!("${:.2}", amount)
    }

    /// Format a confidence interval in the units of `metric`.
    fn format_interval(metric: MetricType, (lower, upper): (f64, f64)) -> String {
        match metric {
            MetricType::RevenuePerVisitor => {
                format!("{} - {}", Self::format_money(lower), Self::format_money(upper))
            }
            MetricType::ConversionRate | MetricType::EngagementRate => {
                format!("{} - {}", Self::format_rate(lower), Self::format_rate(upper))
            }
            _ => "n/a".to_string(),
        }
    }

    fn format_p_value(p_value: Option<f64>) -> String {
        match p_value {
            Some(p) => format!("{:.4}", p),
            None => "-".to_string(),
        }
    }

    fn paint(&self, verdict: Verdict) -> String {
        let text = verdict.label();
        if !self.use_colors {
            return text.to_string();
        }
        match verdict {
            Verdict::Winner => text.green().bold().to_string(),
            Verdict::Control => text.normal().to_string(),
            Verdict::Significant => text.cyan().to_string(),
            Verdict::Inconclusive => text.yellow().to_string(),
        }
    }

    /// Print the test title and table header.
    fn print_header(&self, writer: &mut impl Write, results: &TestResults) -> io::Result<()> {
        writeln!(writer)?;
        let title = format!(
            "{} ({}) - {} on {}",
            results.test_name, results.test_id, results.status, results.primary_metric
        );
        if self.use_colors {
            writeln!(writer, "{}", title.bold())?;
        } else {
            writeln!(writer, "{}", title)?;
        }

        let header = format!(
            "{:<28} {:>12} {:>12} {:>10} {:>12} {:>24} {:>10} {:>14}",
            "Variant", "Impressions", "Conversions", "Conv.", "Rev/visitor", "CI", "p-value", "Result"
        );
        if self.use_colors {
            writeln!(writer, "{}", header.bold())?;
        } else {
            writeln!(writer, "{}", header)?;
        }
        writeln!(writer, "{}", "-".repeat(130))?;
        Ok(())
    }

    /// Print a single variant row.
    fn print_row(
        &self,
        writer: &mut impl Write,
        metric: MetricType,
        variant: &VariantResult,
    ) -> io::Result<()> {
        let name = Self::truncate_name(&variant.name);

        let verdict = Verdict::of(variant);
        // Pad by visible width; ANSI escapes would throw off `{:>14}`.
        let result_padding = 14_usize.saturating_sub(verdict.label().len());

        writeln!(
            writer,
            "{:<28} {:>12} {:>12} {:>10} {:>12} {:>24} {:>10} {:>width$}{}",
            name,
            variant.impressions,
            variant.conversions,
            Self::format_rate(variant.conversion_rate),
            Self::format_money(variant.revenue_per_visitor),
            Self::format_interval(metric, variant.confidence_interval),
            Self::format_p_value(variant.p_value),
            "",
            self.paint(verdict),
            width = result_padding,
        )?;
        Ok(())
    }

    /// Print recommendations and the sample-size summary.
    fn print_summary(&self, writer: &mut impl Write, results: &TestResults) -> io::Result<()> {
        writeln!(writer, "{}", "-".repeat(130))?;

        let label = "Recommendations:";
        if self.use_colors {
            writeln!(writer, "{}", label.bold())?;
        } else {
            writeln!(writer, "{}", label)?;
        }
        for recommendation in &results.recommendations {
            writeln!(writer, "  - {}", recommendation)?;
        }

        let winner = results
            .winner_result()
            .map(|v| v.name.as_str())
            .unwrap_or("none");
        writeln!(
            writer,
            "Summary: {}/{} impressions, winner: {}",
            results.total_impressions, results.minimum_sample_size, winner
        )?;
        writeln!(writer)?;
        Ok(())
    }

    fn write_report(&self, writer: &mut impl Write, results: &TestResults) -> io::Result<()> {
        self.print_header(writer, results)?;
        for variant in &results.variants {
            self.print_row(writer, results.primary_metric, variant)?;
        }
        self.print_summary(writer, results)
    }
}

impl Reporter for TerminalReporter {
    fn report(&self, results: &TestResults) -> Result<(), ReportError> {
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        self.write_report(&mut writer, results)?;
        Ok(())
    }
}
