use anyhow::{Context, Result};
use clap::Parser;
use splitstat::{
    ABTestEngine, Cli, Command, Config, EngineClient, Reporter, StatisticalAnalyzer,
    TerminalReporter, TestConfig, TestResults,
};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config and apply CLI overrides
    let mut config = Config::load_from(cli.config.as_deref())?;
    cli.apply_to_config(&mut config);
    debug!(?config, "Configuration loaded");

    match &cli.command {
        Command::Serve { .. } => {
            let engine = ABTestEngine::new().with_defaults(config.defaults.clone());
            splitstat::run_server_async(engine, &config.server.bind_address, config.server.port)
                .await
                .context("Server failed")?;
        }
        Command::SampleSize { .. } => {
            let d = &config.defaults;
            let n = StatisticalAnalyzer::calculate_sample_size(
                d.baseline_rate,
                d.minimum_effect_size,
                d.confidence_level,
                d.statistical_power,
            )?;
            println!("{}", n);
        }
        Command::Create { file } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read test definition: {}", file.display()))?;
            let request: TestConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse test definition: {}", file.display()))?;

            let test = connect(&config)?.create_test(&request).await?;
            println!(
                "Created {} ({}), minimum sample size {}",
                test.test_id, test.name, test.minimum_sample_size
            );
        }
        Command::Start { test_id } => {
            let response = connect(&config)?.start_test(test_id).await?;
            println!("{} is {}", response.test_id, response.status);
        }
        Command::List => {
            let list = connect(&config)?.list_tests().await?;
            for test in list.active.iter().chain(&list.completed) {
                println!(
                    "{}  {:<10} {:>8}/{:<8} {}",
                    test.test_id,
                    test.status,
                    test.total_impressions(),
                    test.minimum_sample_size,
                    test.name
                );
            }
        }
        Command::Results { test_id, json } => {
            let results = connect(&config)?.results(test_id).await?;
            print_results(&results, *json, cli.no_color)?;
        }
        Command::Stop {
            test_id,
            reason,
            json,
        } => {
            let results = connect(&config)?
                .stop_test(test_id, reason.as_deref())
                .await?;
            print_results(&results, *json, cli.no_color)?;
        }
        Command::Pause { test_id, reason } => {
            let response = connect(&config)?
                .pause_test(test_id, reason.as_deref())
                .await?;
            println!("{} is {}", response.test_id, response.status);
        }
        Command::Resume { test_id } => {
            let response = connect(&config)?.resume_test(test_id).await?;
            println!("{} is {}", response.test_id, response.status);
        }
        Command::Cancel { test_id, reason } => {
            let response = connect(&config)?
                .cancel_test(test_id, reason.as_deref())
                .await?;
            println!("{} is {}", response.test_id, response.status);
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn connect(config: &Config) -> Result<EngineClient> {
    EngineClient::connect(
        &config.client.base_url,
        Duration::from_millis(config.client.timeout_ms),
    )
    .with_context(|| format!("Failed to connect to {}", config.client.base_url))
}

fn print_results(results: &TestResults, json: bool, no_color: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    let reporter = if no_color {
        TerminalReporter::without_colors()
    } else {
        TerminalReporter::new()
    };
    reporter.report(results)?;
    Ok(())
}
