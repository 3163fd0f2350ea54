// Configuration management: TOML settings file plus interactive setup

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{ArxivConfig, Config, ConfigError, OllamaConfig};

/// Load the configuration from the default directory
#[inline]
pub fn load_default() -> anyhow::Result<Config> {
    let config_dir = Config::default_dir()?;
    Config::load(config_dir)
}
