use crate::relay::{executor::DEFAULT_TIMEOUT_MS, RedirectPolicy, DEFAULT_USER_AGENT};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Applied when a descriptor carries no timeout of its own.
    pub request_timeout: Duration,
    pub follow_redirects: bool,
    pub user_agent: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Missing or
    /// unparseable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            request_timeout: lookup("REQUEST_TIMEOUT_MS")
                .and_then(|t| t.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            follow_redirects: lookup("FOLLOW_REDIRECTS")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.follow_redirects),
            user_agent: lookup("USER_AGENT")
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or(defaults.user_agent),
        }
    }

    pub fn redirect_policy(&self) -> RedirectPolicy {
        if self.follow_redirects {
            RedirectPolicy::default()
        } else {
            RedirectPolicy::none()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.port, 5000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.follow_redirects);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("REQUEST_TIMEOUT_MS", "2500"),
            ("FOLLOW_REDIRECTS", "false"),
            ("USER_AGENT", "relay/9"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.redirect_policy(), RedirectPolicy::none());
        assert_eq!(config.user_agent, "relay/9");
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "eighty"),
            ("REQUEST_TIMEOUT_MS", "-1"),
            ("FOLLOW_REDIRECTS", "maybe"),
            ("USER_AGENT", "   "),
        ]));
        assert_eq!(config.port, 5000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.follow_redirects);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }
}
