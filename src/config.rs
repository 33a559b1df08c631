use std::fs;

use anyhow::Result;
use log::LevelFilter;
use serde::Deserialize;

use crate::battery::BatteryParameters;
use crate::tariff::TariffSchedule;

#[derive(Deserialize)]
pub struct Solver {
    pub integer_sizing: bool,
}

#[derive(Deserialize)]
pub struct Files {
    pub load_csv: String,
    pub output_csv: String,
}

#[derive(Deserialize)]
pub struct General {
    pub log_path: String,
    pub log_level: LevelFilter,
    pub log_to_stdout: bool,
    pub timezone: String,
}

#[derive(Deserialize)]
pub struct Config {
    pub battery: BatteryParameters,
    #[serde(default)]
    pub tariff: TariffSchedule,
    pub solver: Solver,
    pub files: Files,
    pub general: General,
}

/// Loads the configuration file and returns a struct with all configuration items.
///
/// # Arguments
///
/// * `config_path` - path to the configuration file
pub fn load_config(config_path: &str) -> Result<Config> {
    let toml = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&toml)?;
    Ok(config)
}
