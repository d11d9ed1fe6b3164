//! Search-domain expansion, mirroring what a standard stub resolver does
//! with its `search` and `ndots` options.

use crate::config::ConfigError;
use crate::name;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Suffixes appended to short names, in order.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Whether expansion happens at all.
    #[serde(default)]
    pub append: bool,
    #[serde(default = "Config::default_ndots")]
    pub ndots: usize,
    #[serde(default)]
    pub fwd_ndots: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            append: false,
            ndots: Self::default_ndots(),
            fwd_ndots: 0,
        }
    }
}

impl Config {
    pub fn default_ndots() -> usize {
        1
    }

    pub fn build(self) -> Result<Expander, ConfigError> {
        let domains = self
            .domains
            .iter()
            .map(|domain| {
                name::canonicalize(domain)
                    .ok_or_else(|| ConfigError::InvalidSearchDomain(domain.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expander {
            domains,
            append: self.append,
            ndots: self.ndots,
            fwd_ndots: self.fwd_ndots,
        })
    }
}

/// Expands a question name into the ordered list of names actually resolved.
#[derive(Debug, Clone)]
pub struct Expander {
    domains: Vec<String>,
    append: bool,
    ndots: usize,
    fwd_ndots: usize,
}

impl Expander {
    /// Candidate names for `qname`, in resolution order.
    ///
    /// A name with at least `ndots` labels is tried as-is first, then with
    /// each search domain appended. A shorter name is tried with each search
    /// domain first and as-is last, the conventional fallback order.
    pub fn candidates(&self, qname: &str) -> Vec<String> {
        let qname = name::wire(qname);
        if !self.append || self.domains.is_empty() {
            return vec![qname];
        }
        let expanded = self
            .domains
            .iter()
            .map(|domain| format!("{qname}.{}", name::wire(domain)));
        if name::label_count(&qname) >= self.ndots {
            std::iter::once(qname.clone()).chain(expanded).collect()
        } else {
            expanded.chain(std::iter::once(qname.clone())).collect()
        }
    }

    /// Whether `qname` is too short to be forwarded upstream at all.
    pub fn below_forward_threshold(&self, qname: &str) -> bool {
        name::label_count(qname) < self.fwd_ndots
    }
}
