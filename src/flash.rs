//! One-shot flash messages carried in the cookie session, read and cleared on
//! the next rendered page.

use actix_session::Session;
use serde::{Deserialize, Serialize};

const FLASH_KEY: &str = "_flash";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flash {
    pub level: String,
    pub message: String,
}

pub fn flash(session: &Session, level: &str, message: &str) {
    let mut queued: Vec<Flash> = session.get(FLASH_KEY).unwrap_or_default().unwrap_or_default();
    queued.push(Flash { level: level.to_string(), message: message.to_string() });
    if let Err(e) = session.insert(FLASH_KEY, &queued) {
        log::warn!("failed to queue flash message: {e}");
    }
}

/// Drains any pending messages; the session entry is removed so each message
/// renders exactly once.
pub fn take(session: &Session) -> Vec<Flash> {
    let queued: Vec<Flash> = session.get(FLASH_KEY).unwrap_or_default().unwrap_or_default();
    if !queued.is_empty() {
        session.remove(FLASH_KEY);
    }
    queued
}
