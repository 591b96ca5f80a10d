//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_EXTRACTOR_TIMEOUT_SECS, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! Configuration is loaded and validated once at startup and is immutable
//! afterwards; there is no runtime reload path. Replacing model artifacts or
//! retuning the extractor requires a process restart.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub extractor: ExtractorConfig,
    pub performance: PerformanceConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the pretrained model artifacts live.
///
/// ## Expected directory contents:
/// - `label_encoder.json`: shared emotion-name/class-index mapping
/// - `nn_scaler.json`: shared neural-net feature scaler (mean/scale)
/// - one `<Model_Name>.json` per classical model
/// - `Neural_Network.json` + `Neural_Network.safetensors` for the neural net
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub model_dir: PathBuf,
}

/// External feature-extraction toolkit settings.
///
/// ## Fields:
/// - `binary`: path to the openSMILE `SMILExtract` executable
/// - `config_file`: fixed toolkit configuration (ComParE_2016 functionals)
/// - `timeout_secs`: hard deadline for one extraction subprocess
/// - `feature_dimension`: K, the exact number of floats every successful
///   extraction must produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub binary: PathBuf,
    pub config_file: PathBuf,
    pub timeout_secs: u64,
    pub feature_dimension: usize,
}

/// Performance tuning.
///
/// `max_concurrent_extractions` bounds subprocess fan-out under load; 0 means
/// "use available CPU parallelism".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_extractions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            artifacts: ArtifactsConfig {
                model_dir: PathBuf::from("saved_models"),
            },
            extractor: ExtractorConfig {
                binary: PathBuf::from("SMILExtract"),
                config_file: PathBuf::from("conf/ComParE_2016.conf"),
                timeout_secs: 60,
                // ComParE_2016 functionals vector size
                feature_dimension: 6373,
            },
            performance: PerformanceConfig {
                max_concurrent_extractions: 0,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and the environment.
    ///
    /// `HOST`/`PORT` are honored without the APP_ prefix because deployment
    /// platforms commonly inject them that way.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching bad values here gives a clear startup error instead of a
    /// confusing failure on the first prediction request.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.extractor.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Extractor timeout must be greater than 0"));
        }

        if self.extractor.feature_dimension == 0 {
            return Err(anyhow::anyhow!(
                "Feature dimension must be greater than 0"
            ));
        }

        if self.extractor.binary.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Extractor binary path cannot be empty"));
        }

        Ok(())
    }

    /// Effective extraction concurrency bound.
    ///
    /// 0 in the config means "size to the machine": one subprocess per
    /// available core, since the toolkit is CPU-bound.
    pub fn extraction_concurrency(&self) -> usize {
        if self.performance.max_concurrent_extractions > 0 {
            self.performance.max_concurrent_extractions
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.extractor.feature_dimension, 6373);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.extractor.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.extractor.feature_dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extraction_concurrency_defaults_to_cores() {
        let config = AppConfig::default();
        assert!(config.extraction_concurrency() >= 1);

        let mut config = AppConfig::default();
        config.performance.max_concurrent_extractions = 3;
        assert_eq!(config.extraction_concurrency(), 3);
    }
}
