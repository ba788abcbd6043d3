//! The persisted reminder document
//!
//! The whole state lives in one JSON object:
//!
//! ```json
//! { "reminders": { "<id>": { ... } }, "cycles": { "<rid>@<YYYYMMDDHHMM>": { ... } } }
//! ```
//!
//! Top-level keys other than these two are kept and written back untouched.

use crate::features::reminders::model::{key_belongs_to, Cycle, Reminder};
use anyhow::{anyhow, Result};
use log::warn;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const REMINDERS_KEY: &str = "reminders";
const CYCLES_KEY: &str = "cycles";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub reminders: BTreeMap<String, Reminder>,
    pub cycles: BTreeMap<String, Cycle>,
    /// Unrecognized top-level keys, preserved across saves
    pub extra: Map<String, Value>,
}

impl Document {
    /// Decode a document from raw JSON text; empty text is an empty document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Document::default());
        }
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| anyhow!("State document is not valid JSON: {}", e))?;
        Self::from_value(value)
    }

    /// Decode a document from a JSON value
    ///
    /// `null` yields an empty document; any other non-object is an error.
    /// Individual entries that cannot be decoded are dropped with a warning.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut root = match value {
            Value::Null => return Ok(Document::default()),
            Value::Object(map) => map,
            other => {
                return Err(anyhow!(
                    "State document must be a JSON object, got {}",
                    json_kind(&other)
                ))
            }
        };

        let mut doc = Document::default();

        if let Some(section) = root.remove(REMINDERS_KEY) {
            for (key, entry) in section_entries(REMINDERS_KEY, section) {
                match Reminder::from_json(&key, &entry) {
                    Some(reminder) => {
                        doc.reminders.insert(key, reminder);
                    }
                    None => warn!("Dropping undecodable reminder entry '{key}'"),
                }
            }
        }

        if let Some(section) = root.remove(CYCLES_KEY) {
            for (key, entry) in section_entries(CYCLES_KEY, section) {
                match Cycle::from_json(&key, &entry) {
                    Some(cycle) => {
                        doc.cycles.insert(key, cycle);
                    }
                    None => warn!("Dropping undecodable cycle entry '{key}'"),
                }
            }
        }

        doc.extra = root;
        Ok(doc)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Delete a reminder together with every cycle it produced
    pub fn remove_reminder(&mut self, reminder_id: &str) -> Option<Reminder> {
        let removed = self.reminders.remove(reminder_id);
        self.cycles.retain(|key, _| !key_belongs_to(key, reminder_id));
        removed
    }

    /// Whether any cycle produced by the reminder is still stored
    pub fn has_cycles_for(&self, reminder_id: &str) -> bool {
        self.cycles.keys().any(|key| key_belongs_to(key, reminder_id))
    }
}

fn section_entries(name: &str, section: Value) -> Map<String, Value> {
    match section {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            warn!(
                "Ignoring '{name}' section: expected an object, got {}",
                json_kind(&other)
            );
            Map::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.extra.len() + 2))?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(REMINDERS_KEY, &self.reminders)?;
        map.serialize_entry(CYCLES_KEY, &self.cycles)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Document::from_value(value).map_err(serde::de::Error::custom)
    }
}
