//! Check command implementation
//!
//! Loads and validates a configuration file and prints the resolved settings.

use std::path::Path;

use crate::cli::output::Output;
use crate::config::{Config, EndpointLayout};
use crate::model::SignalKind;

/// Run the check command
pub fn run_check(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let validation = config.validate();

    if json {
        let report = serde_json::json!({
            "valid": validation.is_ok(),
            "error": validation.as_ref().err().map(|e| e.to_string()),
            "endpoints": SignalKind::ALL
                .iter()
                .map(|kind| (kind.to_string(), config.endpoint_for(*kind)))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "config": Config {
                api_key: config.api_key.as_deref().map(Output::mask),
                ..config.clone()
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        validation?;
        return Ok(());
    }

    if let Err(e) = validation {
        Output::error(&format!("{}: {}", config_path.display(), e));
        anyhow::bail!("invalid configuration");
    }

    Output::success(&format!("{} is valid", config_path.display()));

    Output::header("Delivery");
    Output::kv("enabled", &config.enabled.to_string());
    for kind in SignalKind::ALL {
        Output::kv(&kind.to_string(), &config.endpoint_for(kind));
    }
    if config.endpoint_layout == EndpointLayout::Combined {
        Output::info("All signal kinds share one endpoint");
    }
    Output::kv(
        "api key",
        &config
            .api_key
            .as_deref()
            .map(Output::mask)
            .unwrap_or_else(|| "(none)".to_string()),
    );
    Output::kv("timeout", &format!("{}ms", config.timeout_ms));

    Output::header("Batching");
    Output::kv("batch size", &config.batch_size.to_string());
    Output::kv("interval", &format!("{}ms", config.batch_interval_ms));
    Output::kv("max queue size", &config.max_queue_size.to_string());
    Output::kv("prioritize errors", &config.prioritize_errors.to_string());
    Output::kv("minimum severity", &config.sync_minimum_severity.to_string());

    Output::header("Retry");
    Output::kv("max retries", &config.max_retries.to_string());
    Output::kv("base delay", &format!("{}ms", config.retry_base_delay_ms));
    Output::kv("max backoff", &format!("{}ms", config.max_backoff_ms));

    if !config.enabled {
        Output::warning("Delivery is disabled; items will be discarded");
    }

    Ok(())
}
