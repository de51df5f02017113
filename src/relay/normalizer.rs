//! Request canonicalization ahead of dispatch.
//!
//! Pure and I/O free: the only rejection is an unknown method. URLs are not
//! validated here; the executor reports unparseable targets.

use super::types::{Method, NormalizedDescriptor, RequestDescriptor};
use crate::error::NormalizeError;
use std::collections::HashMap;
use url::form_urlencoded;

/// `User-Agent` sent when the caller does not supply one.
pub const DEFAULT_USER_AGENT: &str = "API-Testing-Tool/1.0";

#[derive(Debug, Clone)]
pub struct Normalizer {
    user_agent: String,
}

impl Normalizer {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    pub fn normalize(&self, raw: RequestDescriptor) -> Result<NormalizedDescriptor, NormalizeError> {
        let method: Method = raw.method.parse()?;
        let url = merge_query(&raw.url, &raw.params);
        let headers = merge_headers(&self.user_agent, raw.headers);

        Ok(NormalizedDescriptor {
            method,
            url,
            headers,
            body: raw.data,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

/// Normalizes with the default `User-Agent`.
pub fn normalize(raw: RequestDescriptor) -> Result<NormalizedDescriptor, NormalizeError> {
    Normalizer::default().normalize(raw)
}

fn merge_headers(user_agent: &str, supplied: HashMap<String, String>) -> HashMap<String, String> {
    let mut headers = HashMap::with_capacity(supplied.len() + 1);
    if !supplied.keys().any(|k| k.eq_ignore_ascii_case("user-agent")) {
        headers.insert("User-Agent".to_string(), user_agent.to_string());
    }
    headers.extend(supplied);
    headers
}

/// Appends the non-empty parameters to the query component of `url`,
/// keeping any existing query and fragment intact.
fn merge_query(url: &str, params: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if pairs.is_empty() {
        return url.to_string();
    }
    pairs.sort_unstable();

    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();

    let (base, fragment) = match url.find('#') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    };

    let separator = match base.find('?') {
        None => "?",
        Some(_) if base.ends_with('?') || base.ends_with('&') => "",
        Some(_) => "&",
    };

    format!("{base}{separator}{encoded}{fragment}")
}
