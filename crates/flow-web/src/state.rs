//! Shared state and request attribution for the HTTP surface.

use axum::http::HeaderMap;
use std::sync::Arc;

use flow_core::types::{Actor, ChangeSource};
use flowd::engine::TransitionEngine;

use crate::error::WebError;
use crate::model::default_web_change_source;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const CHANGE_SOURCE_HEADER: &str = "x-change-source";

const DEFAULT_WEB_ROLE: &str = "api";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TransitionEngine>,
}

impl AppState {
    pub fn new(engine: Arc<TransitionEngine>) -> Self {
        Self { engine }
    }
}

fn header_value(headers: &HeaderMap, name: &'static str) -> Result<Option<String>, WebError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| WebError::BadRequest {
        message: format!("header {name} is not valid UTF-8"),
    })?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

/// Resolve the actor a mutating request is attributed to. The id header is
/// mandatory; the role defaults to `api`.
pub fn resolve_actor(headers: &HeaderMap) -> Result<Actor, WebError> {
    let id = header_value(headers, ACTOR_ID_HEADER)?.ok_or(WebError::Unauthorized {
        header: ACTOR_ID_HEADER,
    })?;
    let role =
        header_value(headers, ACTOR_ROLE_HEADER)?.unwrap_or_else(|| DEFAULT_WEB_ROLE.to_string());
    Ok(Actor::new(id, role))
}

/// Resolve the change source header; HTTP callers default to `api`.
pub fn resolve_change_source(headers: &HeaderMap) -> Result<ChangeSource, WebError> {
    match header_value(headers, CHANGE_SOURCE_HEADER)? {
        Some(value) => value
            .parse()
            .map_err(|message: String| WebError::BadRequest { message }),
        None => Ok(default_web_change_source()),
    }
}
