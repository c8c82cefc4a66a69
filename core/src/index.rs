use std::collections::HashMap;

pub type WordId = u32;
pub type ConceptId = u32;

/// Bijective map between string keys and dense ids `0..len`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMap {
    ids: HashMap<String, u32>,
    labels: Vec<String>,
}

pub type ConceptIndex = IdMap;
pub type WordIndex = IdMap;

impl IdMap {
    pub fn new() -> Self { Self::default() }

    /// Assign ids in iteration order. Duplicate keys keep their first id.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = Self::new();
        for key in keys {
            map.insert(key.into());
        }
        map
    }

    /// Rebuild from a persisted `key -> id` map. Returns `None` unless the
    /// ids are exactly `0..len` with no repeats.
    pub fn from_map(ids: HashMap<String, u32>) -> Option<Self> {
        let mut labels: Vec<Option<String>> = vec![None; ids.len()];
        for (key, &id) in &ids {
            let slot = labels.get_mut(id as usize)?;
            if slot.is_some() { return None; }
            *slot = Some(key.clone());
        }
        let labels = labels.into_iter().collect::<Option<Vec<_>>>()?;
        Some(Self { ids, labels })
    }

    fn insert(&mut self, key: String) -> u32 {
        if let Some(&id) = self.ids.get(&key) { return id; }
        let id = self.labels.len() as u32;
        self.labels.push(key.clone());
        self.ids.insert(key, id);
        id
    }

    pub fn get(&self, key: &str) -> Option<u32> { self.ids.get(key).copied() }

    pub fn label(&self, id: u32) -> Option<&str> { self.labels.get(id as usize).map(String::as_str) }

    pub fn len(&self) -> usize { self.labels.len() }

    pub fn is_empty(&self) -> bool { self.labels.is_empty() }

    pub fn as_map(&self) -> &HashMap<String, u32> { &self.ids }

    /// Keys in id order.
    pub fn labels(&self) -> &[String] { &self.labels }
}
