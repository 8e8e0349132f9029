use clap::Args;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::default_store_path;

/// Config file picked up from the working directory when none is given.
const CWD_CONFIG_FILE: &str = "kcd.yaml";

/// Global flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Config file path
    #[arg(short, long, global = true, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Backend base URL (takes `/api`, `/api/v1` or a bare origin)
    #[arg(long, global = true, env = "KCD_API_BASE")]
    pub api_base: Option<String>,

    /// Only try the primary API base
    #[arg(long, global = true)]
    pub locked: bool,

    /// Session store file
    #[arg(long, global = true, env = "KCD_STORE")]
    pub store: Option<PathBuf>,

    /// Chat polling interval in seconds
    #[arg(long, global = true)]
    pub poll_interval: Option<u64>,
}

#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct ConfigCli {
    #[command(flatten)]
    args: ConfigArgs,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub chat: ChatConfig,
    pub session: SessionConfig,
    pub demo: DemoConfig,
}

/// How many API bases a request may try.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Production: the primary base only.
    Locked,
    /// Try the ordered candidate list until one answers.
    Candidates,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    pub frontend_origin: String,
    pub mode: ResolveMode,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub poll_interval_secs: u64,
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Where an unauthenticated client lands after loading.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartupVariant {
    /// Splash, then the public home page.
    #[default]
    Splash,
    /// Splash straight into the login form.
    DirectLogin,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    pub startup: StartupVariant,
}

impl SessionConfig {
    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(default_store_path)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DemoConfig {
    pub email: String,
    pub password: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = <ConfigCli as clap::Parser>::try_parse_from(args)
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_args(&cli.args)
    }

    /// Priority: CLI flag > `KCD_` env > config file > defaults.
    pub fn from_args(args: &ConfigArgs) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("api.frontend_origin", "http://localhost:8000")?
            .set_default("api.mode", "candidates")?
            .set_default("api.denylist", vec!["kcd-frontend.onrender.com"])?
            .set_default("api.timeout_secs", 10)?
            .set_default("chat.poll_interval_secs", 5)?
            .set_default("session.startup", "splash")?
            .set_default("demo.email", "free@kcd-agency.com")?
            .set_default("demo.password", "free123")?;

        if let Some(path) = &args.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new(CWD_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(CWD_CONFIG_FILE).required(false));
        }

        // E.g. KCD_API__BASE_URL=https://staging.kcd.dev/api
        builder = builder.add_source(
            Environment::with_prefix("KCD")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("api.fallbacks")
                .with_list_parse_key("api.denylist")
                .try_parsing(true),
        );

        if let Some(base) = &args.api_base {
            builder = builder.set_override("api.base_url", base.as_str())?;
        }
        if args.locked {
            builder = builder.set_override("api.mode", "locked")?;
        }
        if let Some(path) = &args.store {
            builder = builder.set_override("session.store_path", path.display().to_string())?;
        }
        if let Some(secs) = args.poll_interval {
            builder = builder.set_override("chat.poll_interval_secs", secs)?;
        }

        // Legacy build-time names used by the web client.
        for legacy in ["VITE_API_BASE_URL", "VITE_API_URL"] {
            if args.api_base.is_none() && env::var("KCD_API__BASE_URL").is_err() {
                if let Ok(val) = env::var(legacy) {
                    if !val.trim().is_empty() {
                        builder = builder.set_override("api.base_url", val)?;
                        break;
                    }
                }
            }
        }

        builder.build()?.try_deserialize()
    }
}
