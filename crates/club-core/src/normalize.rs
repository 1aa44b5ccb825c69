// Payload normalizer: loosely-typed club items -> canonical player records.
//
// The web client delivers the same logical field under several names
// depending on endpoint and client version. Every field is resolved from an
// ordered candidate table with first-success semantics; a candidate whose
// value does not coerce is skipped in favour of the next one.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::player::{EvolutionAttributes, PlayerRecord, GOALKEEPER_STYLE};

// ---------------------------------------------------------------------------
// Candidate tables
// ---------------------------------------------------------------------------

const ID_FIELDS: &[&str] = &["id", "itemId", "definitionId", "resourceId"];
const RATING_FIELDS: &[&str] = &["rating", "overallRating", "overall", "ovr"];
const RESOURCE_ID_FIELDS: &[&str] = &["resourceId", "definitionId", "itemId", "id"];
const POSITION_FIELDS: &[&str] = &["preferredPosition", "position", "pos"];
const CHEM_STYLE_FIELDS: &[&str] = &["playStyle", "chemistryStyle", "chemStyle"];
const UNTRADEABLE_FLAG: &str = "untradeable";
const UNTRADEABLE_STATUS: &str = "isUntradeable";
const UNTRADEABLE_TEXT_FIELDS: &[&str] = &["untradeable", "tradeState", "tradeStatus"];
const OWNERS_FIELD: &str = "owners";
const BOUGHT_FOR_FIELDS: &[&str] = &["lastSalePrice", "boughtFor", "purchasePrice"];
const OBTAINED_FIELDS: &[&str] = &["timestamp", "obtainedTimestamp", "acquiredAt"];
const ITEM_TYPE_FIELD: &str = "itemType";
const PLAYER_ITEM_TYPE: &str = "player";

/// Collections an intercepted payload may wrap its items in.
const ITEM_COLLECTION_FIELDS: &[&str] = &["itemData", "items"];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Normalize one raw item into a [`PlayerRecord`].
///
/// Returns `None` for non-object input and whenever `id`, `rating` or
/// `resourceId` cannot be resolved. Never panics on malformed input.
pub fn normalize(item: &Value) -> Option<PlayerRecord> {
    let obj = item.as_object()?;

    let id = first_of(obj, ID_FIELDS, coerce_id)?;
    let rating = first_of(obj, RATING_FIELDS, coerce_number)?;
    let resource_id = resolve_resource_id(obj, Some(id.as_str()))?;

    let preferred_position = first_of(obj, POSITION_FIELDS, coerce_position);
    let chem_style = first_of(obj, CHEM_STYLE_FIELDS, coerce_string).unwrap_or_else(|| {
        if preferred_position.as_deref() == Some(GOALKEEPER_STYLE) {
            GOALKEEPER_STYLE.to_string()
        } else {
            String::new()
        }
    });

    let first_owner = obj.get(OWNERS_FIELD).and_then(coerce_number) == Some(1.0);

    Some(PlayerRecord {
        id,
        rating,
        resource_id,
        untradeable: resolve_untradeable(obj),
        preferred_position,
        chem_style,
        first_owner,
        bought_for: first_of(obj, BOUGHT_FOR_FIELDS, coerce_number),
        obtained_timestamp: first_of(obj, OBTAINED_FIELDS, coerce_number),
        raw_evolution_attributes: resolve_evolution(obj),
        name: resolve_name(obj),
        nation_name: obj.get("nationName").and_then(coerce_string),
        league_name: obj.get("leagueName").and_then(coerce_string),
        club_name: obj.get("clubName").and_then(coerce_string),
        discard_value: obj.get("discardValue").and_then(coerce_number),
        location: None,
        active_squad: false,
    })
}

/// True when the item carries no type tag or is tagged as a player.
pub fn is_player_item(item: &Value) -> bool {
    match item.get(ITEM_TYPE_FIELD) {
        None | Some(Value::Null) => true,
        Some(Value::String(tag)) => tag.eq_ignore_ascii_case(PLAYER_ITEM_TYPE),
        Some(_) => false,
    }
}

/// Pull the item collection out of an intercepted club payload.
///
/// Accepts a bare array or an object wrapping the array under one of the
/// known collection keys. Anything else yields an empty collection.
pub fn extract_items(payload: &Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => ITEM_COLLECTION_FIELDS
            .iter()
            .find_map(|field| obj.get(*field).and_then(Value::as_array))
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Build an active-squad membership map from an active-squad payload.
///
/// Each entry of `players` is either the item itself or wraps it under
/// `itemData`; entries without a resolvable resource id are skipped.
pub fn squad_membership(payload: &Value) -> HashMap<i64, bool> {
    let entries = payload
        .get("players")
        .or_else(|| payload.get("squad").and_then(|s| s.get("players")))
        .and_then(Value::as_array);

    let Some(entries) = entries else {
        return HashMap::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let item = entry.get("itemData").unwrap_or(entry);
            let obj = item.as_object()?;
            let fallback = first_of(obj, ID_FIELDS, coerce_id);
            resolve_resource_id(obj, fallback.as_deref())
        })
        .filter(|resource_id| *resource_id != 0)
        .map(|resource_id| (resource_id, true))
        .collect()
}

// ---------------------------------------------------------------------------
// Field resolvers
// ---------------------------------------------------------------------------

fn first_of<T>(
    obj: &Map<String, Value>,
    fields: &[&str],
    coerce: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    fields
        .iter()
        .find_map(|field| obj.get(*field).and_then(&coerce))
}

fn resolve_resource_id(obj: &Map<String, Value>, fallback_id: Option<&str>) -> Option<i64> {
    first_of(obj, RESOURCE_ID_FIELDS, coerce_integer).or_else(|| {
        fallback_id.and_then(|id| coerce_integer(&Value::String(id.to_string())))
    })
}

fn resolve_untradeable(obj: &Map<String, Value>) -> bool {
    if let Some(Value::Bool(flag)) = obj.get(UNTRADEABLE_FLAG) {
        return *flag;
    }
    if let Some(Value::Bool(flag)) = obj.get(UNTRADEABLE_STATUS) {
        return *flag;
    }
    first_of(obj, UNTRADEABLE_TEXT_FIELDS, |v| {
        coerce_string(v).and_then(|text| untradeable_from_text(&text))
    })
    .unwrap_or(false)
}

/// String heuristic for trade status. `None` means the text says nothing.
fn untradeable_from_text(text: &str) -> Option<bool> {
    let lower = text.trim().to_ascii_lowercase();
    match lower.as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ if lower.contains("untrade") => Some(true),
        _ => None,
    }
}

fn resolve_evolution(obj: &Map<String, Value>) -> Option<EvolutionAttributes> {
    let verbatim = |field: &str| obj.get(field).filter(|v| !v.is_null()).cloned();
    let attrs = EvolutionAttributes {
        upgrades: verbatim("upgrades"),
        evolution_info: verbatim("evolutionInfo"),
        academy_attributes: verbatim("academyAttributes"),
        academy_id: verbatim("academyId"),
    };
    attrs.is_present().then_some(attrs)
}

fn resolve_name(obj: &Map<String, Value>) -> Option<String> {
    let field = |name: &str| obj.get(name).and_then(coerce_string);
    field("commonName")
        .or_else(|| field("name"))
        .or_else(|| match (field("firstName"), field("lastName")) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        })
        .or_else(|| field("lastName"))
}

// ---------------------------------------------------------------------------
// Coercions
// ---------------------------------------------------------------------------

fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(_) => coerce_number(value).map(format_number),
        _ => None,
    }
}

/// Finite number from a JSON number or a numeric string.
fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn coerce_integer(value: &Value) -> Option<i64> {
    let n = coerce_number(value)?;
    (n.fract() == 0.0 && n.abs() < i64::MAX as f64).then_some(n as i64)
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(_) => coerce_number(value).map(format_number),
        _ => None,
    }
}

fn coerce_position(value: &Value) -> Option<String> {
    coerce_string(value).map(|s| s.to_uppercase())
}

/// Integral values print without a fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
