// Configuration management module
// TOML settings in the application directory, with secrets overlaid from the environment

pub mod settings;

#[cfg(test)]
mod tests;

pub use settings::{Config, ConfigError, NotionConfig, OpenAiConfig, RagConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
