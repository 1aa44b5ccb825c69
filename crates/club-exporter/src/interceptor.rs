// Network interceptor: observes the page's HTTP requests and picks out the
// club and active-squad responses.
//
// The terminal response does not reliably carry the URL that was requested,
// so method and URL are captured when the request is opened and looked up
// again when the request reaches its terminal ready state.

use std::collections::HashMap;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::InterceptorConfig;

/// Opaque per-request handle assigned by the browser hook.
pub type RequestId = u64;

/// Requests that never reach `Done` are forgotten oldest-first past this.
const MAX_TRACKED_REQUESTS: usize = 256;

/// XMLHttpRequest ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

impl TryFrom<u8> for ReadyState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unsent),
            1 => Ok(Self::Opened),
            2 => Ok(Self::HeadersReceived),
            3 => Ok(Self::Loading),
            4 => Ok(Self::Done),
            other => Err(format!("invalid ready state {other}")),
        }
    }
}

/// A response the page context should broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum Intercepted {
    Club(Value),
    Squad(Value),
}

#[derive(Debug)]
struct TrackedRequest {
    seq: u64,
    method: String,
    url: Option<Url>,
}

/// Tracks opened requests and filters their terminal responses.
#[derive(Debug)]
pub struct Interceptor {
    origin: Option<Url>,
    club_suffix: String,
    squad_suffix: String,
    auth_failure_code: i64,
    requests: HashMap<RequestId, TrackedRequest>,
    /// Instrumented request ids, each with the sequence number it got.
    instrumented: HashMap<RequestId, u64>,
    next_seq: u64,
}

impl Interceptor {
    pub fn new(config: &InterceptorConfig) -> Self {
        let origin = match Url::parse(&config.page_origin) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Invalid page origin {:?}: {}", config.page_origin, e);
                None
            }
        };
        Self {
            origin,
            club_suffix: config.club_path_suffix.clone(),
            squad_suffix: config.squad_path_suffix.clone(),
            auth_failure_code: config.auth_failure_code,
            requests: HashMap::new(),
            instrumented: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Attach the response observer to a request. Returns `false` when the
    /// request was already instrumented by another entry point.
    pub fn instrument(&mut self, request: RequestId) -> bool {
        if self.instrumented.contains_key(&request) {
            return false;
        }
        if self.instrumented.len() >= MAX_TRACKED_REQUESTS {
            evict_oldest(&mut self.instrumented, |seq| *seq);
        }
        let seq = self.bump_seq();
        self.instrumented.insert(request, seq);
        true
    }

    /// Record method and resolved URL at open time.
    pub fn open(&mut self, request: RequestId, method: &str, url: &str) {
        self.instrument(request);
        let resolved = match &self.origin {
            Some(origin) => origin.join(url).ok(),
            None => Url::parse(url).ok(),
        };
        if resolved.is_none() {
            debug!("Request {} opened with unresolvable URL {:?}", request, url);
        }
        if !self.requests.contains_key(&request) && self.requests.len() >= MAX_TRACKED_REQUESTS {
            evict_oldest(&mut self.requests, |tracked| tracked.seq);
        }
        let seq = self.bump_seq();
        self.requests.insert(
            request,
            TrackedRequest {
                seq,
                method: method.to_ascii_uppercase(),
                url: resolved,
            },
        );
    }

    /// Feed a ready-state transition. Only `Done` is acted on; the request
    /// is forgotten afterwards.
    pub fn ready_state_change(
        &mut self,
        request: RequestId,
        state: ReadyState,
        body: Option<&str>,
    ) -> Option<Intercepted> {
        if state != ReadyState::Done {
            return None;
        }
        self.instrumented.remove(&request);
        let tracked = self.requests.remove(&request)?;

        if tracked.method != "GET" {
            return None;
        }
        let url = tracked.url?;
        if !self.is_same_origin(&url) {
            return None;
        }

        let path = url.path();
        let wrap: fn(Value) -> Intercepted = if path.ends_with(&self.club_suffix) {
            Intercepted::Club
        } else if path.ends_with(&self.squad_suffix) {
            Intercepted::Squad
        } else {
            return None;
        };

        let payload: Value = match serde_json::from_str(body?) {
            Ok(v) => v,
            Err(e) => {
                debug!("Dropping non-JSON response from {}: {}", url, e);
                return None;
            }
        };

        if self.is_auth_failure(&payload) {
            warn!("Session expired response from {}, ignoring", url);
            return None;
        }

        debug!("Intercepted response from {}", url);
        Some(wrap(payload))
    }

    /// Number of requests opened but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.requests.len()
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        match &self.origin {
            Some(origin) => origin.origin() == url.origin(),
            None => false,
        }
    }

    fn is_auth_failure(&self, payload: &Value) -> bool {
        let code = match payload.get("code") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        code == Some(self.auth_failure_code)
    }
}

fn evict_oldest<V>(map: &mut HashMap<RequestId, V>, seq: impl Fn(&V) -> u64) {
    let oldest = map
        .iter()
        .min_by_key(|(_, value)| seq(value))
        .map(|(id, _)| *id);
    if let Some(id) = oldest {
        debug!("Forgetting request {} that never completed", id);
        map.remove(&id);
    }
}
