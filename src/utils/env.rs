//! Environment handling for spawned commands
//!
//! Collects variables contributed by extensions. Later contributions win;
//! values are never logged since they may carry credentials.

use std::collections::BTreeMap;
use tracing::debug;

/// Ordered set of environment variables for external commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: BTreeMap<String, String>,
}

impl EnvVars {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add variables from `source`, replacing earlier values
    pub fn extend<I, K, V>(&mut self, source: &str, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let key = key.into();
            if self.vars.insert(key.clone(), value.into()).is_some() {
                debug!("{} overrides environment variable {}", source, key);
            } else {
                debug!("{} sets environment variable {}", source, key);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.vars.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_sources_win() {
        let mut env = EnvVars::new();
        env.extend("settings", [("A", "1"), ("B", "2")]);
        env.extend("vault", [("B", "3")]);

        assert_eq!(env.len(), 2);
        assert_eq!(env.get("B"), Some("3"));
        assert_eq!(
            env.into_vec(),
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "3".to_string())
            ]
        );
    }
}
