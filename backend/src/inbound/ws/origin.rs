//! Configurable allow-list for the `Origin` header of upgrade requests.
//!
//! Entries take the form `scheme://host[:port]`. A host of `*.example.com`
//! admits every subdomain of `example.com` but not the apex. Without a port
//! an entry admits any port, including the scheme default.

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginRuleError {
    #[error("origin rule `{0}` must have the form scheme://host[:port]")]
    Malformed(String),
    #[error("origin rule `{0}` has an invalid port")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    Subdomain(String),
}

impl HostPattern {
    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(expected) => host.eq_ignore_ascii_case(expected),
            Self::Subdomain(apex) => host
                .len()
                .checked_sub(apex.len() + 1)
                .and_then(|split| host.get(split..))
                .and_then(|tail| tail.strip_prefix('.'))
                .is_some_and(|tail| tail.eq_ignore_ascii_case(apex)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OriginRule {
    scheme: String,
    host: HostPattern,
    port: Option<u16>,
}

impl OriginRule {
    fn parse(raw: &str) -> Result<Self, OriginRuleError> {
        let malformed = || OriginRuleError::Malformed(raw.to_owned());
        let (scheme, rest) = raw.trim().split_once("://").ok_or_else(malformed)?;
        let authority = rest.trim_end_matches('/');
        if scheme.is_empty() || authority.is_empty() || authority.contains('/') {
            return Err(malformed());
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| OriginRuleError::InvalidPort(raw.to_owned()))?;
                (host, Some(port))
            }
            None => (authority, None),
        };
        let host = match host.strip_prefix("*.") {
            Some(apex) if !apex.is_empty() => HostPattern::Subdomain(apex.to_ascii_lowercase()),
            Some(_) => return Err(malformed()),
            None if host.is_empty() || host.contains('*') => return Err(malformed()),
            None => HostPattern::Exact(host.to_ascii_lowercase()),
        };
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host,
            port,
        })
    }

    fn admits(&self, origin: &Url) -> bool {
        let Some(host) = origin.host_str() else {
            return false;
        };
        origin.scheme() == self.scheme
            && self.host.matches(host)
            && self
                .port
                .is_none_or(|port| origin.port_or_known_default() == Some(port))
    }
}

/// Parsed allow-list. An empty policy rejects every origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    rules: Vec<OriginRule>,
}

impl OriginPolicy {
    pub fn parse<I, S>(entries: I) -> Result<Self, OriginRuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = entries
            .into_iter()
            .map(|entry| OriginRule::parse(entry.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    #[must_use]
    pub fn allows(&self, origin: &Url) -> bool {
        self.rules.iter().any(|rule| rule.admits(origin))
    }
}
