// Canonical player record produced by the normalizer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Location tag attached to every record stored from a club payload.
pub const CLUB_LOCATION: &str = "club";

/// Chemistry-style sentinel used for goalkeepers that carry no explicit style.
pub const GOALKEEPER_STYLE: &str = "GK";

/// A normalized player entity.
///
/// Only ever constructed when both `id` and `rating` resolved from the raw
/// item; see [`crate::normalize::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    pub rating: f64,
    /// Secondary numeric identity used to correlate with squad membership.
    pub resource_id: i64,
    pub untradeable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_position: Option<String>,
    pub chem_style: String,
    pub first_owner: bool,
    pub bought_for: Option<f64>,
    /// Epoch seconds at which the item entered the club.
    pub obtained_timestamp: Option<f64>,
    pub raw_evolution_attributes: Option<EvolutionAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_value: Option<f64>,
    /// Set by the store; `None` for records straight out of the normalizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub active_squad: bool,
}

impl PlayerRecord {
    /// Key under which the record is stored. Falls back to a resource-id
    /// derived key when the id is empty.
    pub fn store_key(&self) -> String {
        if self.id.is_empty() {
            format!("resource:{}", self.resource_id)
        } else {
            self.id.clone()
        }
    }

    /// Best display name available for the record.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Evolution sub-fields copied verbatim from the raw item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionAttributes {
    pub upgrades: Option<Value>,
    pub evolution_info: Option<Value>,
    pub academy_attributes: Option<Value>,
    pub academy_id: Option<Value>,
}

impl EvolutionAttributes {
    /// True when at least one sub-field carries a value.
    pub fn is_present(&self) -> bool {
        self.upgrades.is_some()
            || self.evolution_info.is_some()
            || self.academy_attributes.is_some()
            || self.academy_id.is_some()
    }
}
