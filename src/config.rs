//! Runtime settings read from the environment.

use std::env;

pub const API_URL_ENV: &str = "WEDESIGNZ_API_URL";
pub const MIN_DESIGNS_ENV: &str = "WEDESIGNZ_MIN_DESIGNS";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the marketplace API
    pub api_url: String,
    /// Fixed onboarding threshold; `None` means ask the API
    pub minimum_designs: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            minimum_designs: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(MIN_DESIGNS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(value) => config.minimum_designs = Some(value),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid {}", MIN_DESIGNS_ENV),
            }
        }

        config
    }

    /// Apply command-line values on top of the environment.
    pub fn with_overrides(mut self, api_url: Option<String>, minimum_designs: Option<usize>) -> Self {
        if let Some(url) = api_url {
            self.api_url = url;
        }
        if minimum_designs.is_some() {
            self.minimum_designs = minimum_designs;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.api_url, "http://localhost:8000");
    }

    #[test]
    fn reads_environment_values() {
        let config = Config::from_lookup(lookup(&[
            (API_URL_ENV, " https://api.wedesignz.com "),
            (MIN_DESIGNS_ENV, "25"),
        ]));
        assert_eq!(config.api_url, "https://api.wedesignz.com");
        assert_eq!(config.minimum_designs, Some(25));
    }

    #[test]
    fn invalid_minimum_is_ignored() {
        let config = Config::from_lookup(lookup(&[(MIN_DESIGNS_ENV, "lots")]));
        assert_eq!(config.minimum_designs, None);
    }

    #[test]
    fn flags_override_environment() {
        let config = Config::from_lookup(lookup(&[(MIN_DESIGNS_ENV, "25")]))
            .with_overrides(Some("http://staging:9000".to_string()), None);
        assert_eq!(config.api_url, "http://staging:9000");
        assert_eq!(config.minimum_designs, Some(25));

        let config = config.with_overrides(None, Some(3));
        assert_eq!(config.minimum_designs, Some(3));
    }
}
