use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Stream name → per-stream mapping of one deserializer, in declaration order.
///
/// Serializes as a dictionary. Declaration order is kept on both sides because
/// stream ids are numbered in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct InputMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for InputMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> InputMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the mapping for `name`. Returns `true` if an earlier
    /// mapping was replaced; its position is kept.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> bool {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => {
                slot.1 = value;
                true
            }
            None => {
                self.entries.push((name, value));
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Serialize> Serialize for InputMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct InputMapVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for InputMapVisitor<T> {
    type Value = InputMap<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a mapping from stream name to stream configuration")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = InputMap::new();
        while let Some((name, value)) = access.next_entry::<String, T>()? {
            if map.get(&name).is_some() {
                return Err(serde::de::Error::custom(format!(
                    "stream '{}' is mapped more than once",
                    name
                )));
            }
            map.insert(name, value);
        }
        Ok(map)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for InputMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(InputMapVisitor(PhantomData))
    }
}
