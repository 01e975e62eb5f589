//! Runtime configuration.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! `websrv.toml` in the working directory, and `WEBSRV_*` environment
//! variables (`WEBSRV_ADDR`, `WEBSRV_SESSION_TTL_SECS`, ...).

use std::net::SocketAddr;
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::Error;
use crate::middleware::{COOKIE_NAME, COOKIE_TTL};

/// Reference sweep period for the session store.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Server and session settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Address to listen on.
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,

    /// Lifetime of issued sessions and their cookies, in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Period of the expired-session sweep, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

const fn default_session_ttl_secs() -> u64 {
    COOKIE_TTL.as_secs()
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_cookie_name() -> String {
    COOKIE_NAME.to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            session_ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            cookie_name: default_cookie_name(),
        }
    }
}

impl Config {
    /// Loads `websrv.toml` (if present) and `WEBSRV_*` variables over the
    /// defaults.
    pub fn load() -> Result<Self, Error> {
        Self::from_builder(
            config::Config::builder()
                .add_source(File::with_name("websrv").required(false))
                .add_source(Environment::with_prefix("WEBSRV").try_parsing(true)),
        )
    }

    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, Error> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Both periods must be positive.
    fn validate(&self) -> Result<(), Error> {
        if self.session_ttl_secs == 0 {
            return Err(Error::InvalidTtl(Duration::ZERO));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sweep_interval_secs must be at least 1".to_owned(),
            )));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
