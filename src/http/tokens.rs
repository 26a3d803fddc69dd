use std::sync::LazyLock;

use dashmap::DashMap;
use regex::Regex;

static JWT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_=\-]+\.[A-Za-z0-9_=\-]+\.?[A-Za-z0-9_.+/=\-]*").unwrap()
});

/// Every JSON Web Token candidate in `text`, in order of appearance.
pub fn extract_jwt_tokens(text: &str) -> impl Iterator<Item = &str> + '_ {
    JWT.find_iter(text).map(|m| m.as_str())
}

/// Tokens seen during a scan, keyed by token with the first URL it came from.
#[derive(Debug, Default)]
pub struct TokenJar {
    seen: DashMap<String, String>,
}

impl TokenJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, source: &str, text: &str) {
        for token in extract_jwt_tokens(text) {
            self.seen.entry(token.to_string()).or_insert_with(|| source.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// `(token, source)` pairs ordered by token.
    pub fn tokens(&self) -> Vec<(String, String)> {
        let mut tokens: Vec<_> = self.seen.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        tokens.sort();
        tokens
    }
}
