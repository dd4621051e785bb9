//! Marshaller settings.
//!
//! Settings are layered with the `config` crate: built-in defaults first, then
//! an optional TOML file, then `SESSION_MARSHAL_*` environment variables, e.g.
//! `SESSION_MARSHAL_VERIFY_CHAIN_FINGERPRINT=false`.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::Result;
use crate::stream::DEFAULT_LENGTH_LIMIT;

pub const ENV_PREFIX: &str = "SESSION_MARSHAL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarshallerConfig {
    /// Reject streams whose recorded chain fingerprint differs from ours.
    pub verify_chain_fingerprint: bool,
    /// First id handed out by a freshly created identity strategy.
    pub identity_id_base: u32,
    /// Upper bound for any single length-prefixed field read from a stream.
    pub max_payload_bytes: u32,
}

impl Default for MarshallerConfig {
    fn default() -> Self {
        Self {
            verify_chain_fingerprint: true,
            identity_id_base: 0,
            max_payload_bytes: DEFAULT_LENGTH_LIMIT,
        }
    }
}

impl MarshallerConfig {
    /// Defaults overlaid with the environment.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("verify_chain_fingerprint", defaults.verify_chain_fingerprint)?
            .set_default("identity_id_base", i64::from(defaults.identity_id_base))?
            .set_default("max_payload_bytes", i64::from(defaults.max_payload_bytes))?;
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
