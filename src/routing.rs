//! Decides where a query name goes: through a zone alias, to a stub zone's
//! dedicated upstreams, or to the default upstream list.

use crate::config::ConfigError;
use crate::name;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

const DNS_PORT: u16 = 53;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// `zone[,zone]/endpoint[,endpoint]` entries, a DNS subtree forwarded
    /// to a dedicated upstream set.
    #[serde(default)]
    pub stubzones: Vec<String>,
    /// `source/target` entries, a zone rewritten onto another before
    /// routing.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Config {
    pub fn build(
        self,
        upstreams: Vec<SocketAddr>,
        no_recursion: bool,
    ) -> Result<RoutingTable, ConfigError> {
        if upstreams.is_empty() {
            return Err(ConfigError::NoUpstreams);
        }
        let mut stubs = Vec::new();
        for entry in &self.stubzones {
            let (zones, endpoints) = entry
                .split_once('/')
                .ok_or_else(|| ConfigError::InvalidStubZone(entry.clone()))?;
            let endpoints = endpoints
                .split(',')
                .map(parse_endpoint)
                .collect::<Result<Vec<_>, _>>()?;
            for zone in zones.split(',') {
                let zone = name::canonicalize(zone)
                    .ok_or_else(|| ConfigError::InvalidZone(zone.to_string()))?;
                stubs.push((zone, endpoints.clone()));
            }
        }
        let mut aliases = Vec::new();
        for entry in &self.aliases {
            let (source, target) = entry
                .split_once('/')
                .ok_or_else(|| ConfigError::InvalidAlias(entry.clone()))?;
            let source = name::canonicalize(source)
                .ok_or_else(|| ConfigError::InvalidZone(source.to_string()))?;
            let target = name::canonicalize(target)
                .ok_or_else(|| ConfigError::InvalidZone(target.to_string()))?;
            aliases.push((source, target));
        }
        Ok(RoutingTable {
            aliases,
            stubs,
            upstreams,
            no_recursion,
        })
    }
}

/// `host[:port]` with the port defaulting to 53. An IPv6 literal carrying a
/// port must be bracketed.
pub(crate) fn parse_endpoint(input: &str) -> Result<SocketAddr, ConfigError> {
    let input = input.trim();
    if let Ok(address) = input.parse::<SocketAddr>() {
        return Ok(address);
    }
    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }
    if let Some(inner) = input
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        if let Ok(ip) = inner.parse::<Ipv6Addr>() {
            return Ok(SocketAddr::new(IpAddr::V6(ip), DNS_PORT));
        }
    }
    Err(ConfigError::InvalidEndpoint(input.to_string()))
}

#[derive(Debug)]
pub struct RoutingTable {
    /// Source zone to replacement zone, declaration order.
    aliases: Vec<(String, String)>,
    /// Stub zone to endpoints, declaration order.
    stubs: Vec<(String, Vec<SocketAddr>)>,
    upstreams: Vec<SocketAddr>,
    no_recursion: bool,
}

/// Whether `name` equals `zone` or sits below it. Both canonical.
fn in_zone(name: &str, zone: &str) -> bool {
    if zone == "." {
        return true;
    }
    name == zone
        || name
            .strip_suffix(zone)
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

impl RoutingTable {
    pub fn no_recursion(&self) -> bool {
        self.no_recursion
    }

    /// Alias substitution for `name`: the matched zone suffix is replaced by
    /// the alias target, the leading labels are kept. Callers apply at most
    /// one hop, so chains cannot loop.
    pub fn rewrite(&self, qname: &str) -> Option<String> {
        let (source, target) = self
            .aliases
            .iter()
            .filter(|(source, _)| in_zone(qname, source))
            .max_by_key(|(source, _)| name::label_count(source))?;
        let prefix = &qname[..qname.len() - source.len()];
        Some(format!("{prefix}{target}"))
    }

    /// The stub zone endpoints owning `name`, if any. The zone with the most
    /// labels wins; between equally specific zones the one declared first
    /// wins.
    pub fn stub_match(&self, qname: &str) -> Option<&[SocketAddr]> {
        self.stubs
            .iter()
            .filter(|(zone, _)| in_zone(qname, zone))
            .max_by_key(|(zone, _)| name::label_count(zone))
            .map(|(_, endpoints)| endpoints.as_slice())
    }

    /// Endpoints to forward a query for `name` to.
    pub fn endpoints(&self, qname: &str) -> &[SocketAddr] {
        self.stub_match(qname).unwrap_or(&self.upstreams)
    }
}
