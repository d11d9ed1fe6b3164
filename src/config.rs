use std::fmt::Display;
use std::path::Path;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dns: crate::dns::config::Config,
    #[serde(default)]
    pub upstream: crate::repository::resolver::Config,
    #[serde(default)]
    pub hosts: crate::repository::hosts::Config,
    #[serde(default)]
    pub cache: crate::repository::cache::Config,
    #[serde(default)]
    pub search: crate::search::Config,
    #[serde(default)]
    pub routing: crate::routing::Config,
}

impl Config {
    pub fn load(path: &Path) -> Self {
        let conf = ::config::Config::builder()
            .add_source(::config::File::from(path).required(true))
            .add_source(::config::Environment::default().separator("_"))
            .build()
            .expect("unable to locate configuration file");
        conf.try_deserialize()
            .expect("configuration format invalid")
    }
}

/// Anything rejected while freezing the configuration. All of these are
/// fatal before the listeners bind and unreachable afterwards.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidEndpoint(String),
    InvalidZone(String),
    InvalidStubZone(String),
    InvalidAlias(String),
    InvalidSearchDomain(String),
    NoUpstreams,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEndpoint(value) => write!(f, "invalid upstream endpoint {value:?}"),
            Self::InvalidZone(value) => write!(f, "invalid zone name {value:?}"),
            Self::InvalidStubZone(value) => write!(f, "invalid stub zone entry {value:?}"),
            Self::InvalidAlias(value) => write!(f, "invalid alias entry {value:?}"),
            Self::InvalidSearchDomain(value) => write!(f, "invalid search domain {value:?}"),
            Self::NoUpstreams => write!(f, "no upstream nameserver configured"),
        }
    }
}

impl std::error::Error for ConfigError {}
