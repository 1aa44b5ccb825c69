// In-memory player store keyed by resolved record key.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::normalize::{is_player_item, normalize};
use crate::player::{PlayerRecord, CLUB_LOCATION};

/// Keyed collection of normalized player records.
///
/// Owned by a single context; every mutation happens on that context's
/// message loop, so no locking is involved.
#[derive(Debug, Default)]
pub struct PlayerStore {
    players: HashMap<String, PlayerRecord>,
    active_squad: HashMap<i64, bool>,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and store every player-like item, last write wins.
    ///
    /// Items tagged with a non-player `itemType` and items that fail
    /// normalization are skipped silently. Returns the records actually
    /// stored, in input order.
    pub fn upsert_many(&mut self, items: &[Value]) -> Vec<PlayerRecord> {
        let mut stored = Vec::with_capacity(items.len());
        for item in items.iter().filter(|item| is_player_item(item)) {
            let Some(mut record) = normalize(item) else {
                continue;
            };
            record.location = Some(CLUB_LOCATION.to_string());
            record.active_squad = self.is_active(record.resource_id);
            self.players.insert(record.store_key(), record.clone());
            stored.push(record);
        }
        debug!(
            "Stored {} of {} club items ({} total)",
            stored.len(),
            items.len(),
            self.players.len()
        );
        stored
    }

    /// All stored records in store iteration order.
    pub fn snapshot(&self) -> Vec<PlayerRecord> {
        self.players.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }

    pub fn get(&self, key: &str) -> Option<&PlayerRecord> {
        self.players.get(key)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Replace the active-squad membership map from a loosely-typed value.
    ///
    /// Accepts a plain object (`{"123": true}`) or a list of key/value
    /// entries (`[[123, true]]`). Keys that are not finite integral numbers
    /// are skipped; values follow JavaScript truthiness.
    pub fn set_active_squad_membership(&mut self, membership: &Value) {
        let parsed: HashMap<i64, bool> = match membership {
            Value::Object(obj) => obj
                .iter()
                .filter_map(|(key, value)| Some((parse_key_str(key)?, truthy(value))))
                .collect(),
            Value::Array(entries) => entries
                .iter()
                .filter_map(|entry| {
                    let pair = entry.as_array()?;
                    let key = parse_key(pair.first()?)?;
                    let value = pair.get(1).map(truthy).unwrap_or(false);
                    Some((key, value))
                })
                .collect(),
            _ => HashMap::new(),
        };
        self.set_active_squad(parsed);
    }

    /// Replace the active-squad membership map wholesale.
    pub fn set_active_squad(&mut self, membership: HashMap<i64, bool>) {
        debug!("Active squad membership replaced ({} entries)", membership.len());
        self.active_squad = membership;
    }

    /// Whether the given resource id is in the active squad.
    pub fn is_active(&self, resource_id: i64) -> bool {
        self.active_squad.get(&resource_id).copied().unwrap_or(false)
    }
}

fn parse_key(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let f = n.as_f64()?;
            (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
        }
        Value::String(s) => parse_key_str(s),
        _ => None,
    }
}

fn parse_key_str(key: &str) -> Option<i64> {
    let f = key.trim().parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_then_snapshot_keeps_every_distinct_record() {
        let mut store = PlayerStore::new();
        let items: Vec<Value> = (1..=5)
            .map(|i| json!({ "id": i, "rating": 70 + i, "preferredPosition": "cm" }))
            .collect();

        let stored = store.upsert_many(&items);
        assert_eq!(stored.len(), 5);

        let mut snapshot = store.snapshot();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[0].id, "1");
        assert_eq!(snapshot[0].rating, 71.0);
        assert_eq!(snapshot[4].preferred_position.as_deref(), Some("CM"));
        assert!(snapshot.iter().all(|p| p.location.as_deref() == Some("club")));
    }

    #[test]
    fn same_key_keeps_later_values() {
        let mut store = PlayerStore::new();
        store.upsert_many(&[
            json!({ "id": "p1", "resourceId": 5, "rating": 75 }),
            json!({ "id": "p1", "resourceId": 5, "rating": 91, "name": "Later" }),
        ]);
        assert_eq!(store.len(), 1);
        let record = store.get("p1").unwrap();
        assert_eq!(record.rating, 91.0);
        assert_eq!(record.name.as_deref(), Some("Later"));
    }

    #[test]
    fn malformed_and_non_player_items_are_skipped() {
        let mut store = PlayerStore::new();
        let stored = store.upsert_many(&[
            json!({ "id": 1, "rating": 80 }),
            json!({ "id": 2 }),
            json!("not an object"),
            json!({ "id": 3, "rating": 80, "itemType": "training" }),
            json!({ "id": 4, "rating": 82, "itemType": "Player" }),
        ]);
        assert_eq!(stored.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn active_squad_lookup_uses_resource_id() {
        let mut store = PlayerStore::new();
        store.set_active_squad_membership(&json!({ "123": true }));
        let stored = store.upsert_many(&[
            json!({ "id": "a", "resourceId": 123, "rating": 80 }),
            json!({ "id": "b", "resourceId": 456, "rating": 80 }),
        ]);
        assert!(stored[0].active_squad);
        assert!(!stored[1].active_squad);
    }

    #[test]
    fn membership_accepts_entry_lists_and_skips_bad_keys() {
        let mut store = PlayerStore::new();
        store.set_active_squad_membership(&json!([
            [123, true],
            ["456", 1],
            ["abc", true],
            [1.5, true]
        ]));
        assert!(store.is_active(123));
        assert!(store.is_active(456));
        assert!(!store.is_active(1));
    }

    #[test]
    fn membership_is_replaced_not_merged() {
        let mut store = PlayerStore::new();
        store.set_active_squad_membership(&json!({ "1": true }));
        store.set_active_squad_membership(&json!({ "2": true }));
        assert!(!store.is_active(1));
        assert!(store.is_active(2));
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = PlayerStore::new();
        store.upsert_many(&[json!({ "id": 1, "rating": 80 })]);
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }
}
