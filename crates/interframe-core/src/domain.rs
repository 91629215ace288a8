//! Domain matching and bridge naming.

use std::fmt;

/// Target origin meaning "any origin".
pub const WILDCARD: &str = "*";

/// Which origins a message may be delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DomainMatcher {
    /// Any origin (`*`).
    #[default]
    Any,
    /// Exactly one origin.
    Exact(String),
    /// Any of the listed origins.
    OneOf(Vec<String>),
}

impl DomainMatcher {
    /// Check whether `origin` is accepted by this matcher.
    pub fn matches(&self, origin: &str) -> bool {
        match self {
            DomainMatcher::Any => true,
            DomainMatcher::Exact(domain) => domain == WILDCARD || domain == origin,
            DomainMatcher::OneOf(domains) => domains
                .iter()
                .any(|domain| domain == WILDCARD || domain == origin),
        }
    }

    /// Origins to pass to the host's dispatch primitive, one dispatch each.
    ///
    /// `file://` origins cannot be targeted, so they are addressed with `*`.
    pub fn target_origins(&self) -> Vec<String> {
        let domains: Vec<&str> = match self {
            DomainMatcher::Any => vec![WILDCARD],
            DomainMatcher::Exact(domain) => vec![domain.as_str()],
            DomainMatcher::OneOf(domains) => domains.iter().map(String::as_str).collect(),
        };

        domains
            .into_iter()
            .map(|domain| {
                if domain.starts_with("file:") {
                    WILDCARD
                } else {
                    domain
                }
            })
            .map(str::to_string)
            .collect()
    }
}

impl From<&str> for DomainMatcher {
    fn from(domain: &str) -> Self {
        if domain == WILDCARD {
            DomainMatcher::Any
        } else {
            DomainMatcher::Exact(domain.to_string())
        }
    }
}

impl From<String> for DomainMatcher {
    fn from(domain: String) -> Self {
        DomainMatcher::from(domain.as_str())
    }
}

impl From<Vec<String>> for DomainMatcher {
    fn from(domains: Vec<String>) -> Self {
        DomainMatcher::OneOf(domains)
    }
}

impl fmt::Display for DomainMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainMatcher::Any => f.write_str(WILDCARD),
            DomainMatcher::Exact(domain) => f.write_str(domain),
            DomainMatcher::OneOf(domains) => write!(f, "[{}]", domains.join(", ")),
        }
    }
}

/// Frame name under which a domain publishes its bridge.
///
/// Only the `http(s)://host` part of `domain` is used; every run of
/// non-alphanumeric characters becomes a single `_`.
pub fn bridge_name(prefix: &str, domain: &str) -> String {
    let mut sanitized = String::with_capacity(domain.len());
    let mut in_run = false;

    for ch in strip_path(domain).chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch);
            in_run = false;
        } else if !in_run {
            sanitized.push('_');
            in_run = true;
        }
    }

    format!("{prefix}_{sanitized}")
}

fn strip_path(domain: &str) -> &str {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            if rest.is_empty() || rest.starts_with('/') {
                return domain;
            }
            let end = rest.find('/').map_or(domain.len(), |i| scheme.len() + i);
            return &domain[..end];
        }
    }
    domain
}
