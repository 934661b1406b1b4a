use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{Entry, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyToggle {
    All,
    None,
    Key(String),
}

impl From<&str> for KeyToggle {
    fn from(s: &str) -> Self {
        match s {
            "all" => KeyToggle::All,
            "none" => KeyToggle::None,
            other => KeyToggle::Key(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Preview {
    pub key: String,
    pub value: Value,
}

/// An open edit: the value as loaded plus the text being edited.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EditState {
    pub key: String,
    pub value: Value,
    pub text: String,
}

impl EditState {
    pub fn new(key: String, value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Self { key, value, text }
    }

    pub fn parse(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.text)
    }
}

/// Per-namespace selection, keyed by key name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    pub checked: BTreeSet<String>,
    pub preview: Option<Preview>,
    pub edit: Option<EditState>,
}

impl Selection {
    pub fn toggle(&mut self, toggle: KeyToggle, entries: &[Entry]) {
        match toggle {
            KeyToggle::All => {
                self.checked = entries.iter().map(|e| e.key.clone()).collect();
            }
            KeyToggle::None => self.checked.clear(),
            KeyToggle::Key(key) => {
                if !self.checked.remove(&key) {
                    self.checked.insert(key);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
