//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use jobtrack_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str =
    "data_dir, remote_url, api_key, user_id, request_timeout_secs, queue_failed_writes, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let api_key = config.api_key.as_deref().map(mask_secret);

    match output.format {
        OutputFormat::Json => {
            output.print_json(&serde_json::json!({
                "data_dir": config.data_dir,
                "remote_url": config.remote_url,
                "api_key": api_key,
                "user_id": config.user_id,
                "request_timeout_secs": config.request_timeout_secs,
                "queue_failed_writes": config.queue_failed_writes,
                "log_file": config.log_file
            }));
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!(
                "  remote_url:           {}",
                config.remote_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  api_key:              {}",
                api_key.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  user_id:              {}",
                config.user_id.as_deref().unwrap_or("(not set)")
            );
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!("  queue_failed_writes:  {}", config.queue_failed_writes);
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "api_key" {
        mask_secret(&value)
    } else {
        value
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "remote_url" => {
            config.remote_url = optional(value);
        }
        "api_key" => {
            config.api_key = optional(value);
        }
        "user_id" => {
            config.user_id = optional(value);
        }
        "request_timeout_secs" => {
            let secs: u64 = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a whole number of seconds.")?;
            if secs == 0 {
                bail!("request_timeout_secs must be at least 1");
            }
            config.request_timeout_secs = secs;
        }
        "queue_failed_writes" => {
            config.queue_failed_writes = value
                .parse()
                .context("Invalid value for queue_failed_writes. Use 'true' or 'false'.")?;
        }
        "log_file" => {
            config.log_file = optional(value).map(PathBuf::from);
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

/// Empty or "none" clears an optional value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_keys() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(temp_dir.path());

        apply(&mut config, "remote_url", "https://db.example.com/rest/v1").unwrap();
        assert_eq!(
            config.remote_url.as_deref(),
            Some("https://db.example.com/rest/v1")
        );

        apply(&mut config, "remote_url", "none").unwrap();
        assert!(config.remote_url.is_none());

        apply(&mut config, "request_timeout_secs", "30").unwrap();
        assert_eq!(config.request_timeout_secs, 30);

        apply(&mut config, "queue_failed_writes", "true").unwrap();
        assert!(config.queue_failed_writes);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();
        assert!(apply(&mut config, "request_timeout_secs", "0").is_err());
        assert!(apply(&mut config, "request_timeout_secs", "soon").is_err());
        assert!(apply(&mut config, "queue_failed_writes", "maybe").is_err());
        assert!(apply(&mut config, "favorite_color", "blue").is_err());
    }

    #[test]
    fn test_set_saves_to_override_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        set(
            "data_dir".to_string(),
            temp_dir.path().join("data").display().to_string(),
            Some(&path),
            &output,
        )
        .unwrap();
        set("user_id".to_string(), "user-1".to_string(), Some(&path), &output).unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.user_id.as_deref(), Some("user-1"));
        assert_eq!(config.data_dir, temp_dir.path().join("data"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("abcd1234efgh"), "abcd****");
    }
}
