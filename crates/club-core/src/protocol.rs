// Message shapes exchanged between the page, content and background contexts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::player::PlayerRecord;

/// Source tag on page-bus messages posted by the page context.
pub const PAGE_SOURCE: &str = "fc26-club-exporter";

/// Source tag on page-bus messages posted by the content context.
pub const EXTENSION_SOURCE: &str = "fc26-club-exporter-extension";

/// Error text returned by `copyRoster` before any roster has been captured.
pub const NO_DATA_ERROR: &str = "No club data captured yet";

// ---------------------------------------------------------------------------
// Page bus
// ---------------------------------------------------------------------------

/// A message on the page's same-window broadcast bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope {
    pub source: String,
    #[serde(flatten)]
    pub message: PageMessage,
}

impl PageEnvelope {
    pub fn from_page(message: PageMessage) -> Self {
        Self {
            source: PAGE_SOURCE.to_string(),
            message,
        }
    }

    pub fn from_extension(message: PageMessage) -> Self {
        Self {
            source: EXTENSION_SOURCE.to_string(),
            message,
        }
    }

    pub fn is_from_page(&self) -> bool {
        self.source == PAGE_SOURCE
    }

    pub fn is_from_extension(&self) -> bool {
        self.source == EXTENSION_SOURCE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageMessage {
    /// Raw club payload as intercepted from the network.
    Club { payload: Value },
    /// Raw active-squad payload as intercepted from the network.
    Squad { payload: Value },
    /// Current page-side roster. `request_id` is set when answering a
    /// `requestState` or `clearRoster` broadcast.
    State {
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(flatten)]
        snapshot: RosterSnapshot,
    },
    RequestState {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    ClearRoster {
        #[serde(rename = "requestId")]
        request_id: String,
    },
}

/// Roster text plus the records it was rendered from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub roster: String,
    pub players: Vec<PlayerRecord>,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Extension runtime messaging
// ---------------------------------------------------------------------------

/// Messages delivered to the background context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuntimeMessage {
    /// Item collection relayed from the page. Anything other than an array
    /// is treated as an empty collection by the receiver.
    Club {
        #[serde(default)]
        items: Value,
    },
    SquadMembership { membership: Value },
    ClearStore,
    GetPlayers,
}

/// Requests delivered to a tab's content context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TabMessage {
    GetSummary,
    CopyRoster,
    ClearRoster,
}

/// Structured reply crossing a context boundary. Delivery problems travel
/// here as `success: false` rather than as errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<PlayerRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl ExtensionResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn summary(snapshot: RosterSnapshot) -> Self {
        Self {
            success: true,
            error: None,
            roster: Some(snapshot.roster),
            count: Some(snapshot.count),
            players: Some(snapshot.players),
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}
