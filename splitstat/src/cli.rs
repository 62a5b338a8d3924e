//! Command-line interface for splitstat.

use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "splitstat")]
#[command(about = "Run and inspect statistically rigorous A/B tests")]
#[command(version)]
pub struct Cli {
    /// Path to config file (defaults to .splitstat.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the splitstat server
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Compute the minimum sample size for a test
    SampleSize {
        /// Conversion rate of the control (0.0-1.0)
        #[arg(long)]
        baseline_rate: Option<f64>,

        /// Smallest relative lift worth detecting (0.1 = 10%)
        #[arg(long)]
        minimum_effect_size: Option<f64>,

        /// Confidence level (0.0-1.0)
        #[arg(long)]
        confidence_level: Option<f64>,

        /// Statistical power (0.0-1.0)
        #[arg(long)]
        power: Option<f64>,
    },

    /// Create a test from a JSON definition
    Create {
        /// JSON file with the test definition
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Start a draft test
    Start { test_id: String },

    /// List active and completed tests
    List,

    /// Analyze a test and print the results
    Results {
        test_id: String,

        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Stop a running test and print the final results
    Stop {
        test_id: String,

        /// Reason recorded on the test
        #[arg(long)]
        reason: Option<String>,

        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Pause a running test
    Pause {
        test_id: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Resume a paused test
    Resume { test_id: String },

    /// Cancel a running or paused test
    Cancel {
        test_id: String,

        #[arg(long)]
        reason: Option<String>,
    },
}

impl Cli {
    /// Apply CLI overrides to the configuration.
    ///
    /// CLI arguments take precedence over config file values.
    /// Only non-None optional values will override the config.
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.client.base_url = url.clone();
        }

        match &self.command {
            Command::Serve { bind, port } => {
                if let Some(bind) = bind {
                    config.server.bind_address = bind.clone();
                }
                if let Some(port) = port {
                    config.server.port = *port;
                }
            }
            Command::SampleSize {
                baseline_rate,
                minimum_effect_size,
                confidence_level,
                power,
            } => {
                if let Some(v) = baseline_rate {
                    config.defaults.baseline_rate = *v;
                }
                if let Some(v) = minimum_effect_size {
                    config.defaults.minimum_effect_size = *v;
                }
                if let Some(v) = confidence_level {
                    config.defaults.confidence_level = *v;
                }
                if let Some(v) = power {
                    config.defaults.statistical_power = *v;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_serve_overrides() {
        let cli = Cli::parse_from(["splitstat", "serve", "--bind", "127.0.0.1", "-p", "8088"]);

        let mut config = Config::default();
        cli.apply_to_config(&mut config);

        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 8088);
    }

    #[test]
    fn test_apply_without_overrides() {
        let cli = Cli::parse_from(["splitstat", "list"]);

        let mut config = Config::default();
        cli.apply_to_config(&mut config);

        assert_eq!(config.client.base_url, "http://127.0.0.1:9200");
        assert_eq!(config.server.port, 9200);
        assert_eq!(config.defaults.baseline_rate, 0.05);
    }

    #[test]
    fn test_apply_partial_sample_size_overrides() {
        let cli = Cli::parse_from([
            "splitstat",
            "sample-size",
            "--baseline-rate",
            "0.03",
            "--power",
            "0.9",
        ]);

        let mut config = Config::default();
        cli.apply_to_config(&mut config);

        assert_eq!(config.defaults.baseline_rate, 0.03);
        assert_eq!(config.defaults.statistical_power, 0.9);
        assert_eq!(config.defaults.minimum_effect_size, 0.1);
        assert_eq!(config.defaults.confidence_level, 0.95);
    }

    #[test]
    fn test_global_url_after_subcommand() {
        let cli = Cli::parse_from([
            "splitstat",
            "results",
            "test_1a2b3c4d",
            "--url",
            "http://ab.internal:9200",
            "--json",
        ]);

        let mut config = Config::default();
        cli.apply_to_config(&mut config);

        assert_eq!(config.client.base_url, "http://ab.internal:9200");
        match cli.command {
            Command::Results { test_id, json } => {
                assert_eq!(test_id, "test_1a2b3c4d");
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_stop_with_reason() {
        let cli = Cli::parse_from([
            "splitstat",
            "--verbose",
            "stop",
            "test_1a2b3c4d",
            "--reason",
            "launch",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Command::Stop {
                test_id,
                reason,
                json,
            } => {
                assert_eq!(test_id, "test_1a2b3c4d");
                assert_eq!(reason.as_deref(), Some("launch"));
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_requires_file() {
        assert!(Cli::try_parse_from(["splitstat", "create"]).is_err());

        let cli = Cli::parse_from(["splitstat", "create", "-f", "checkout.json"]);
        match cli.command {
            Command::Create { file } => assert_eq!(file, PathBuf::from("checkout.json")),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
