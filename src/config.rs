use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::errors::ConfigError;
use crate::fixture::VanityFixtureConfig;
use crate::runner::RunOptions;

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "vpb.toml";

/// How reports are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::InvalidOutput {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BenchConfig {
    /// Outer vanity nodes (`a0`..`aN`) below the root under test
    pub node_count: usize,
    /// Vanity children per outer node
    pub child_node_count: usize,
    /// Measured iterations of the resolve call. Must be > 0.
    pub iterations: usize,
    /// Untimed iterations before measuring
    #[serde(default)]
    pub warmup_iterations: usize,
    /// Fixed seed for reproducible aliases. Unset draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// "text" or "json"
    pub output: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            node_count: 1000,
            child_node_count: 10,
            iterations: 10,
            warmup_iterations: 0,
            seed: None,
            output: "text".to_string(),
        }
    }
}

impl BenchConfig {
    /// Layers defaults, `VPB_*` environment variables and the TOML file.
    ///
    /// A missing file is only an error when it was named explicitly.
    pub fn read(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let path: PathBuf = match config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::FileNotFound {
                        path: path.to_path_buf(),
                    });
                }
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config: BenchConfig = Figment::new()
            .merge(Serialized::defaults(BenchConfig::default()))
            .merge(Env::prefixed("VPB_"))
            .merge(Toml::file(&path))
            .extract()
            .map_err(|e| ConfigError::ParseFailed(Box::new(e)))?;
        tracing::debug!("Loaded config: {:?}", &config);
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// - `iterations`: Must be > 0
    /// - `output`: Must be "text" or "json"
    ///
    /// `node_count` and `child_node_count` of 0 are valid (empty population).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::InvalidIterations {
                value: self.iterations,
            });
        }
        self.output_format()?;
        Ok(())
    }

    pub fn output_format(&self) -> Result<OutputFormat, ConfigError> {
        self.output.parse()
    }

    pub fn fixture_config(&self) -> VanityFixtureConfig {
        VanityFixtureConfig {
            node_count: self.node_count,
            child_node_count: self.child_node_count,
            seed: self.seed,
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            warmup_iterations: self.warmup_iterations,
            iterations: self.iterations,
        }
    }
}
