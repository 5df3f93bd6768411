//! Owned titles and the per-holder collection.

use std::collections::HashMap;
use std::collections::hash_map;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::holder::HolderId;

/// Number of titles after which a holder's collection is considered full.
pub const MAX_TITLES: usize = 54;

/// One title owned by a holder.
///
/// `title` may embed color/style markup (`&c`, `#FF0000`); it is stored and
/// compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRecord {
    pub holder: HolderId,
    pub title: String,
    /// Milliseconds since the Unix epoch.
    pub acquired_at: i64,
}

impl TitleRecord {
    pub fn new(holder: HolderId, title: impl Into<String>, acquired_at: i64) -> Self {
        Self {
            holder,
            title: title.into(),
            acquired_at,
        }
    }
}

/// Every title a holder owns, keyed by title text.
///
/// The key of each entry is always its record's `title`; the only way in is
/// [`TitleCollection::insert`], which derives the key from the record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleCollection {
    titles: HashMap<String, TitleRecord>,
}

impl TitleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing an existing record with the same title.
    pub fn insert(&mut self, record: TitleRecord) -> Option<TitleRecord> {
        self.titles.insert(record.title.clone(), record)
    }

    pub fn get(&self, title: &str) -> Option<&TitleRecord> {
        self.titles.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.titles.contains_key(title)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Whether the collection reached [`MAX_TITLES`].
    pub fn is_full(&self) -> bool {
        self.titles.len() >= MAX_TITLES
    }

    pub fn iter(&self) -> hash_map::Values<'_, String, TitleRecord> {
        self.titles.values()
    }

    /// Records sorted by acquisition time, oldest first.
    pub fn titles_by_acquisition(&self) -> Vec<&TitleRecord> {
        let mut records: Vec<&TitleRecord> = self.titles.values().collect();
        records.sort_by(|a, b| {
            a.acquired_at
                .cmp(&b.acquired_at)
                .then_with(|| a.title.cmp(&b.title))
        });
        records
    }
}

impl FromIterator<TitleRecord> for TitleCollection {
    fn from_iter<I: IntoIterator<Item = TitleRecord>>(iter: I) -> Self {
        let mut collection = TitleCollection::new();
        for record in iter {
            collection.insert(record);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a TitleCollection {
    type Item = &'a TitleRecord;
    type IntoIter = hash_map::Values<'a, String, TitleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.titles.values()
    }
}

impl Serialize for TitleCollection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.titles.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TitleCollection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Keys are re-derived from the records so a corrupt cache entry
        // cannot break the key/title invariant.
        let raw = HashMap::<String, TitleRecord>::deserialize(deserializer)?;
        Ok(raw.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_same_title() {
        let holder = HolderId::random();
        let mut collection = TitleCollection::new();
        assert!(collection.insert(TitleRecord::new(holder, "Champion", 1)).is_none());
        let previous = collection.insert(TitleRecord::new(holder, "Champion", 2));

        assert_eq!(previous.map(|r| r.acquired_at), Some(1));
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get("Champion").unwrap().acquired_at, 2);
    }

    #[test]
    fn test_is_full_at_capacity() {
        let holder = HolderId::random();
        let mut collection: TitleCollection = (0..MAX_TITLES - 1)
            .map(|i| TitleRecord::new(holder, format!("t{i}"), i as i64))
            .collect();
        assert!(!collection.is_full());

        collection.insert(TitleRecord::new(holder, "last", 99));
        assert!(collection.is_full());
    }

    #[test]
    fn test_deserialize_rekeys_by_title() {
        let holder = HolderId::random();
        let json = format!(
            r#"{{"wrong-key": {{"holder": "{holder}", "title": "&cHero", "acquired_at": 5}}}}"#
        );
        let collection: TitleCollection = serde_json::from_str(&json).unwrap();

        assert!(collection.contains("&cHero"));
        assert!(!collection.contains("wrong-key"));
    }

    #[test]
    fn test_titles_by_acquisition_orders_oldest_first() {
        let holder = HolderId::random();
        let collection: TitleCollection = [
            TitleRecord::new(holder, "b", 20),
            TitleRecord::new(holder, "a", 10),
            TitleRecord::new(holder, "c", 30),
        ]
        .into_iter()
        .collect();

        let order: Vec<&str> = collection
            .titles_by_acquisition()
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
