//! Bound statement parameters as captured by the profiler.
use rusqlite::types::Value;
use std::fmt;

/// Key of a bound parameter: a position or a placeholder name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKey {
    Position(usize),
    Name(String),
}

impl From<usize> for ParamKey {
    fn from(position: usize) -> Self {
        ParamKey::Position(position)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::Name(name.to_string())
    }
}

impl From<String> for ParamKey {
    fn from(name: String) -> Self {
        ParamKey::Name(name)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Position(position) => write!(f, "{}", position),
            ParamKey::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Insertion-ordered parameter map.
///
/// Inserting an existing key replaces its value without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParams {
    entries: Vec<(ParamKey, Value)>,
}

impl BoundParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-based positional parameters, in order.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .enumerate()
            .map(|(position, value)| (ParamKey::Position(position), value.into()))
            .collect()
    }

    /// Named parameters, in order.
    pub fn named<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .map(|(name, value)| (ParamKey::Name(name.into()), value.into()))
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<ParamKey>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &ParamKey) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &ParamKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Returns the parameters the way the profiler stores them.
    ///
    /// A set containing position `0` is treated as a zero-based list: every
    /// positional key is renumbered from 1 in insertion order. Named keys are
    /// untouched, and sets without position `0` are returned as they are.
    pub fn shifted(&self) -> BoundParams {
        if !self.contains_key(&ParamKey::Position(0)) {
            return self.clone();
        }

        let mut next = 1;
        self.entries
            .iter()
            .map(|(key, value)| match key {
                ParamKey::Position(_) => {
                    let key = ParamKey::Position(next);
                    next += 1;
                    (key, value.clone())
                }
                ParamKey::Name(_) => (key.clone(), value.clone()),
            })
            .collect()
    }

    /// JSON object view, used when persisting or printing profiles.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(key, value)| (key.to_string(), value_to_json(value)))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(ParamKey, Value)> for BoundParams {
    fn from_iter<T: IntoIterator<Item = (ParamKey, Value)>>(iter: T) -> Self {
        let mut params = BoundParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Value::from(*f),
        Value::Text(t) => serde_json::Value::from(t.as_str()),
        Value::Blob(b) => serde_json::Value::from(format!("<BLOB: {} bytes>", b.len())),
    }
}
