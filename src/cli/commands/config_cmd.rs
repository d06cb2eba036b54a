//! Configuration management commands.

use crate::cli::icons::arrow;
use crate::config::{Config, Settings};

/// Print the effective configuration as TOML.
pub fn cmd_config_show(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    match config.source_path {
        Some(ref path) => eprintln!("{} Loaded from {}", arrow(), path.display()),
        None => eprintln!("{} No config file found, showing defaults", arrow()),
    }

    let text = toml::to_string_pretty(settings)?;
    print!("{}", text);
    Ok(())
}
