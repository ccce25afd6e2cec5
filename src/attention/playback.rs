use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;

use crate::events::{UiEmitter, PLAYBACK_SEEK};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackKind {
    /// Embedded third-party player; time is only known by polling it.
    RemoteEmbedded,
    /// Local media element; time updates and seek events fire natively.
    LocalFile,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
}

pub trait PlaybackSource: Send + Sync {
    fn kind(&self) -> PlaybackKind;
    fn current_time(&self) -> f64;
    fn subscribe(&self) -> watch::Receiver<PlayerState>;
    fn seek_to(&self, seconds: f64);
}

/// Player living in the dashboard webview. The page reports time and state
/// through commands; seeks are pushed back as `playback-seek` events.
pub struct WebviewPlayer {
    kind: PlaybackKind,
    time: Mutex<f64>,
    state: watch::Sender<PlayerState>,
    emitter: Arc<dyn UiEmitter>,
}

impl WebviewPlayer {
    pub fn new(kind: PlaybackKind, emitter: Arc<dyn UiEmitter>) -> Self {
        let (state, _) = watch::channel(PlayerState::Unstarted);
        Self {
            kind,
            time: Mutex::new(0.0),
            state,
            emitter,
        }
    }

    pub fn set_time(&self, seconds: f64) {
        if seconds.is_finite() && seconds >= 0.0 {
            *self.time.lock().unwrap_or_else(|p| p.into_inner()) = seconds;
        }
    }

    pub fn set_state(&self, state: PlayerState) {
        self.state.send_replace(state);
    }
}

impl PlaybackSource for WebviewPlayer {
    fn kind(&self) -> PlaybackKind {
        self.kind
    }

    fn current_time(&self) -> f64 {
        *self.time.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.state.subscribe()
    }

    fn seek_to(&self, seconds: f64) {
        self.set_time(seconds);
        self.emitter
            .emit_value(PLAYBACK_SEEK, json!({ "seconds": seconds }));
    }
}

/// Keeps playback moving forward. Backward seeks further than `tolerance`
/// behind the furthest validly reached time are snapped back.
///
/// Polled sources are checked at the poll cadence only, so a scrub that
/// starts and ends between two polls goes unnoticed.
pub struct PlaybackGuard {
    source: Arc<dyn PlaybackSource>,
    tolerance: f64,
    last_valid_time: f64,
    seeking: bool,
    corrections: u32,
}

impl PlaybackGuard {
    pub fn new(source: Arc<dyn PlaybackSource>, tolerance: f64) -> Self {
        Self {
            source,
            tolerance: tolerance.max(0.0),
            last_valid_time: 0.0,
            seeking: false,
            corrections: 0,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.source.current_time()
    }

    pub fn last_valid_time(&self) -> f64 {
        self.last_valid_time
    }

    pub fn corrections(&self) -> u32 {
        self.corrections
    }

    pub fn report_time(&mut self, seconds: f64) {
        if !self.seeking && seconds.is_finite() {
            self.last_valid_time = self.last_valid_time.max(seconds);
        }
    }

    /// Returns the position playback was forced back to, if any.
    pub fn on_seeking(&mut self, seconds: f64) -> Option<f64> {
        self.seeking = true;
        self.correct(seconds)
    }

    pub fn on_seeked(&mut self) {
        self.seeking = false;
    }

    /// Reactive check for sources without native seek events.
    pub fn poll(&mut self) -> Option<f64> {
        let seconds = self.source.current_time();
        let corrected = self.correct(seconds);
        if corrected.is_none() {
            self.report_time(seconds);
        }
        corrected
    }

    fn correct(&mut self, seconds: f64) -> Option<f64> {
        if seconds < self.last_valid_time - self.tolerance {
            self.source.seek_to(self.last_valid_time);
            self.corrections += 1;
            Some(self.last_valid_time)
        } else {
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedPlayer;
    use super::*;
    use crate::events::testing::RecordingEmitter;

    fn guard_at(player: &Arc<ScriptedPlayer>, last_valid: f64, tolerance: f64) -> PlaybackGuard {
        let mut guard = PlaybackGuard::new(player.clone(), tolerance);
        guard.report_time(last_valid);
        guard
    }

    #[test]
    fn backward_seek_beyond_tolerance_is_corrected() {
        let player = ScriptedPlayer::new(PlaybackKind::LocalFile);
        let mut guard = guard_at(&player, 10.0, 0.5);

        assert_eq!(guard.on_seeking(9.0), Some(10.0));
        assert_eq!(player.seeks(), vec![10.0]);
        assert_eq!(guard.corrections(), 1);
    }

    #[test]
    fn backward_seek_within_tolerance_is_allowed() {
        let player = ScriptedPlayer::new(PlaybackKind::LocalFile);
        let mut guard = guard_at(&player, 10.0, 0.5);

        assert_eq!(guard.on_seeking(9.6), None);
        assert!(player.seeks().is_empty());
    }

    #[test]
    fn time_updates_during_seek_do_not_advance() {
        let player = ScriptedPlayer::new(PlaybackKind::LocalFile);
        let mut guard = guard_at(&player, 5.0, 0.5);

        assert_eq!(guard.on_seeking(60.0), None);
        guard.report_time(60.0);
        assert_eq!(guard.last_valid_time(), 5.0);

        guard.on_seeked();
        guard.report_time(60.5);
        assert_eq!(guard.last_valid_time(), 60.5);
        guard.report_time(3.0);
        assert_eq!(guard.last_valid_time(), 60.5);
    }

    #[test]
    fn polling_detects_scrubs_on_embedded_players() {
        let player = ScriptedPlayer::new(PlaybackKind::RemoteEmbedded);
        let mut guard = PlaybackGuard::new(player.clone(), 1.0);

        player.set_time(12.0);
        assert_eq!(guard.poll(), None);
        assert_eq!(guard.last_valid_time(), 12.0);

        player.set_time(11.5);
        assert_eq!(guard.poll(), None);

        player.set_time(4.0);
        assert_eq!(guard.poll(), Some(12.0));
        assert_eq!(player.current_time(), 12.0);
        assert_eq!(player.seeks(), vec![12.0]);
    }

    #[test]
    fn webview_player_pushes_seeks_to_the_page() {
        let emitter = Arc::new(RecordingEmitter::default());
        let player = WebviewPlayer::new(PlaybackKind::RemoteEmbedded, emitter.clone());
        let states = player.subscribe();

        player.set_time(8.0);
        player.set_time(f64::NAN);
        assert_eq!(player.current_time(), 8.0);

        player.seek_to(20.0);
        assert_eq!(player.current_time(), 20.0);
        assert_eq!(emitter.named(PLAYBACK_SEEK), vec![json!({ "seconds": 20.0 })]);

        player.set_state(PlayerState::Playing);
        assert_eq!(*states.borrow(), PlayerState::Playing);
    }
}
