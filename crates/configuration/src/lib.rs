use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use logging::init_tracing;
pub use settings::{
    ArtifactSettings, Config, EnsembleSettings, ForestParams, LoggingSettings, NetworkParams,
    TrainingSettings,
};

/// Prefix for environment overrides, e.g. `VERDICT__ARTIFACTS__MODEL_DIR=/srv/models`.
pub const ENV_PREFIX: &str = "VERDICT";

/// Loads the application configuration.
///
/// Reads `path` (or `config.toml` in the working directory when `None`), then
/// layers `VERDICT__*` environment variables on top. Every section has
/// defaults, so a missing file yields the default configuration. The result
/// is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name("config.toml").required(false),
    };

    let builder = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[artifacts]\nmodel_dir = \"/tmp/verdict-models\"\n\n[training.forest]\nn_trees = 25\n"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(
            config.artifacts.model_dir,
            std::path::PathBuf::from("/tmp/verdict-models")
        );
        assert_eq!(config.training.forest.n_trees, 25);
        assert_eq!(config.training.forest.max_depth, Some(12));
        assert_eq!(config.ensemble.primary_weight, 0.55);
        assert_eq!(config.training.network.hidden_layers, vec![256, 128, 64, 32]);
    }

    #[test]
    fn invalid_weights_fail_validation() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[ensemble]\nprimary_weight = 0.7\nsecondary_weight = 0.7\n").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn nan_weight_in_file_fails_validation() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[ensemble]\nprimary_weight = nan\nsecondary_weight = 0.45\n").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/verdict.toml")));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
