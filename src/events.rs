use log::warn;
use serde::Serialize;
use serde_json::Value;
use tauri::{AppHandle, Emitter};

pub const SESSION_STATE_CHANGED: &str = "session-state-changed";
pub const ATTENTION_SAMPLE: &str = "attention-sample";
pub const SESSION_FINISHED: &str = "session-finished";
pub const SESSION_ERROR: &str = "session-error";
pub const PLAYBACK_SEEK: &str = "playback-seek";
pub const NEURO_STREAM: &str = "neuro-stream";

/// Push channel towards the dashboard webview.
pub trait UiEmitter: Send + Sync {
    fn emit_value(&self, event: &str, payload: Value);
}

impl UiEmitter for AppHandle {
    fn emit_value(&self, event: &str, payload: Value) {
        if let Err(err) = Emitter::emit(self, event, payload) {
            warn!("failed to emit {event}: {err}");
        }
    }
}

pub fn emit<T: Serialize>(emitter: &dyn UiEmitter, event: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => emitter.emit_value(event, value),
        Err(err) => warn!("failed to serialize {event} payload: {err}"),
    }
}
