use crate::cli::Cli;
use crate::client::URL_BASE;
use crate::dispatcher::SearchLimits;
use crate::logging::LoggingOptions;
use crate::persistence::Database;
use crate::placemark::Coordinate;
use crate::recent::DEFAULT_CAPACITY;
use anyhow::Result;
use etcetera::{choose_app_strategy, AppStrategy, AppStrategyArgs};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all};
use std::path::PathBuf;
use tracing::{info, warn};

const ENV_PREFIX: &str = "DESTINATION_SEARCH_";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(skip)]
    pub config_path: PathBuf,
    pub main: MainConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: Self::default_path(),
            main: MainConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MainConfig {
    pub state_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub base_url: String,
    /// Language for results. Defaults to the system language unless it's English.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_location: Option<Coordinate>,
    pub recent_capacity: usize,
    pub limits: SearchLimits,
    pub timeout_secs: u64,
    pub retry_limit: u64,
    pub retry_delay: u64,
    pub logging: LoggingOptions,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            state_dir: Config::default_dirs().state.clone(),
            access_token: None,
            base_url: URL_BASE.to_string(),
            language: None,
            focal_location: None,
            recent_capacity: DEFAULT_CAPACITY,
            limits: SearchLimits::default(),
            timeout_secs: 5,
            retry_limit: 5,
            retry_delay: 7,
            logging: LoggingOptions::default(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        let mut path = PathBuf::from(&Self::default_dirs().config);
        path.push("config.yml");
        path
    }

    pub fn default_dirs() -> &'static DefaultDirs {
        DEFAULT_DIRS.get_or_init(|| {
            let strategy = choose_app_strategy(AppStrategyArgs {
                top_level_domain: "org".to_string(),
                author: "sublipri".to_string(),
                app_name: "Destination Search".to_string(),
            });
            match strategy {
                Ok(strategy) => DefaultDirs {
                    config: strategy.config_dir(),
                    state: strategy.state_dir().unwrap_or(strategy.data_dir()),
                },
                Err(err) => {
                    warn!("No home directory ({err}), using the working directory");
                    DefaultDirs {
                        config: PathBuf::from("."),
                        state: PathBuf::from("."),
                    }
                }
            }
        })
    }

    fn figment(config_path: &PathBuf) -> Figment {
        Figment::from(Serialized::defaults(MainConfig::default()))
            .merge(Yaml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_cli(args: &Cli) -> Result<Self> {
        let config_path = if let Some(path) = &args.config_path {
            path.to_owned()
        } else {
            Self::default_path().to_owned()
        };

        let main = Self::figment(&config_path)
            .merge(Serialized::defaults(args))
            .extract()?;

        Ok(Config { config_path, main })
    }

    pub fn write_config_file(&self) -> Result<()> {
        if let Some(dir) = self.config_path.parent() {
            create_dir_all(dir)?;
        }
        let yaml = serde_yaml::to_string(&self.main)?;
        fs::write(&self.config_path, yaml)?;
        info!("Wrote config to {}", self.config_path.display());
        Ok(())
    }

    pub fn get_database(&self) -> Result<Database> {
        create_dir_all(&self.main.state_dir)?;
        let mut path = PathBuf::from(&self.main.state_dir);
        path.push("destination-search.db");
        Database::from_path(path)
    }
}

static DEFAULT_DIRS: OnceCell<DefaultDirs> = OnceCell::new();

#[derive(Debug, Deserialize, Serialize)]
pub struct DefaultDirs {
    pub config: PathBuf,
    pub state: PathBuf,
}
