//! Arguments handed to command handlers

use std::collections::BTreeMap;

/// A single keyword argument value taken from the parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KwValue {
    /// Boolean switch (`store_true` / `store_false`)
    Flag(bool),
    /// Number of occurrences of a counting flag
    Count(u8),
    /// Single value
    Value(String),
    /// Multiple values, in command-line order
    List(Vec<String>),
}

/// Keyword arguments keyed by argument id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Kwargs {
    values: BTreeMap<String, KwValue>,
}

impl Kwargs {
    /// Create an empty set of keyword arguments
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous one with the same id
    pub fn insert(&mut self, id: impl Into<String>, value: KwValue) -> Option<KwValue> {
        self.values.insert(id.into(), value)
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, value: KwValue) -> Self {
        self.insert(id, value);
        self
    }

    /// Merge `other` into `self`; values from `other` win
    pub fn extend(&mut self, other: Self) {
        self.values.extend(other.values);
    }

    pub fn get(&self, id: &str) -> Option<&KwValue> {
        self.values.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    /// Single string value; the first element for lists
    pub fn get_str(&self, id: &str) -> Option<&str> {
        match self.values.get(id)? {
            KwValue::Value(value) => Some(value),
            KwValue::List(values) => values.first().map(String::as_str),
            _ => None,
        }
    }

    /// All values for `id`; empty when absent or not a value argument
    pub fn get_list(&self, id: &str) -> Vec<String> {
        match self.values.get(id) {
            Some(KwValue::Value(value)) => vec![value.clone()],
            Some(KwValue::List(values)) => values.clone(),
            _ => Vec::new(),
        }
    }

    /// Boolean value; counts are true when nonzero, absent is false
    pub fn get_flag(&self, id: &str) -> bool {
        match self.values.get(id) {
            Some(KwValue::Flag(flag)) => *flag,
            Some(KwValue::Count(count)) => *count > 0,
            _ => false,
        }
    }

    pub fn get_count(&self, id: &str) -> u8 {
        match self.values.get(id) {
            Some(KwValue::Count(count)) => *count,
            Some(KwValue::Flag(true)) => 1,
            _ => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KwValue)> {
        self.values.iter().map(|(id, value)| (id.as_str(), value))
    }
}

/// Positional and keyword arguments for one command call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Positional arguments passed through verbatim
    pub args: Vec<String>,
    /// Parsed options of the command's sub-parser
    pub kwargs: Kwargs,
}

impl Invocation {
    #[must_use]
    pub fn new(args: Vec<String>, kwargs: Kwargs) -> Self {
        Self { args, kwargs }
    }
}
