use reqwest::Url;

use crate::error::RemoteError;
use crate::error::Result;

pub const DEFAULT_HOST: &str = "http://localhost:8080";

/// Where the CoCo server lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL, without a trailing slash.
    pub host: String,
    /// Session token sent as `Authorization: Bearer`. No header is sent
    /// without one.
    pub token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>) -> Self {
        let host: String = host.into();
        Self {
            host: host.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Reads `COCO_HOST` (default `http://localhost:8080`) and `COCO_TOKEN`.
    /// An empty token counts as no token.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("COCO_HOST")
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let config = Self::new(host);
        match lookup("COCO_TOKEN").filter(|t| !t.is_empty()) {
            Some(token) => config.with_token(token),
            None => config,
        }
    }

    /// The host URL with `segments` appended, each percent-encoded as a
    /// single path segment.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let invalid = || RemoteError::InvalidHost(self.host.clone());
        let mut url = Url::parse(&self.host).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = RemoteConfig::from_lookup(lookup(&[]));
        assert_eq!(config, RemoteConfig::default());
        assert_eq!(
            config.endpoint(&["data", "x"]).unwrap().as_str(),
            "http://localhost:8080/data/x"
        );
    }

    #[test]
    fn env_overrides_host_and_token() {
        let config = RemoteConfig::from_lookup(lookup(&[
            ("COCO_HOST", "https://coco.example/"),
            ("COCO_TOKEN", "secret"),
        ]));
        assert_eq!(config.host, "https://coco.example");
        assert_eq!(config.token.as_deref(), Some("secret"));
    }

    #[test]
    fn endpoint_encodes_each_segment() {
        let config = RemoteConfig::new("https://coco.example/api/");
        assert_eq!(
            config.endpoint(&["data", "a/b?c#d e"]).unwrap().as_str(),
            "https://coco.example/api/data/a%2Fb%3Fc%23d%20e"
        );
        assert!(matches!(
            RemoteConfig::new("not a url").endpoint(&["data"]),
            Err(RemoteError::InvalidHost(_))
        ));
    }

    #[test]
    fn empty_token_is_ignored() {
        let config = RemoteConfig::from_lookup(lookup(&[("COCO_TOKEN", "")]));
        assert_eq!(config.token, None);
    }
}
