// Configuration management module
// TOML settings, environment overrides and the interactive setup

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, DEFAULT_FUNCTION_NAME, ModelsConfig, StorageConfig, UiConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
