//! Request/response protocol between UI surfaces and the focus engine.
//!
//! Requests are JSON objects tagged by `type`. Every request gets exactly one
//! [`Response`]: `{"success": true, ...payload}` or
//! `{"success": false, "error": "..."}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::focus::{FocusManager, StartRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    FocusStart {
        options: StartRequest,
    },
    FocusStop,
    FocusGetStatus,
    /// Either list may be omitted to leave it unchanged.
    FocusUpdateSites {
        #[serde(default)]
        blacklist: Option<Vec<String>>,
        #[serde(default)]
        whitelist: Option<Vec<String>>,
    },
    FocusGetSites,
    GetBlockingInfo,
    ToggleChanged {
        key: String,
        value: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            payload: Map::new(),
        }
    }

    /// Success carrying the fields of `value`, which must serialize to an
    /// object.
    pub fn with<T: Serialize>(value: &T) -> Result<Self, CoreError> {
        let payload = match serde_json::to_value(value)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".into(), other);
                map
            }
        };
        Ok(Self {
            payload,
            ..Self::ok()
        })
    }

    pub fn failure(err: &CoreError) -> Self {
        let message = match err {
            CoreError::Validation(e) => e.to_string(),
            CoreError::Host(e) => e.to_string(),
            other => other.to_string(),
        };
        Self {
            success: false,
            error: Some(message),
            payload: Map::new(),
        }
    }
}

impl FocusManager {
    /// Dispatch one request. Never fails; errors become `success: false`.
    pub async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::FocusStart { options } => self.start_session(options).await.map(|_| Response::ok()),
            Request::FocusStop => self.stop_session().await.map(|_| Response::ok()),
            Request::FocusGetStatus => self.get_status().await.and_then(|status| Response::with(&status)),
            Request::FocusUpdateSites {
                blacklist,
                whitelist,
            } => self
                .update_site_lists(blacklist, whitelist)
                .await
                .map(|_| Response::ok()),
            Request::FocusGetSites => self.get_site_lists().await.and_then(|lists| Response::with(&lists)),
            Request::GetBlockingInfo => self.blocking_info().await.and_then(|info| Response::with(&info)),
            Request::ToggleChanged { key, value } => {
                self.set_toggle(&key, value).await.map(|_| Response::ok())
            }
        };

        result.unwrap_or_else(|e| {
            log::warn!("request failed: {e}");
            Response::failure(&e)
        })
    }
}
