use std::sync::Arc;

use tauri::{AppHandle, State};

use crate::{
    attention::{
        AttentionSessionController, PlayerState, SessionSnapshot, VideoSource, WebviewPlayer,
    },
    events::UiEmitter,
    AppState,
};

fn controller_from_state(state: &State<'_, AppState>) -> AttentionSessionController {
    state.session.clone()
}

fn current_player(state: &State<'_, AppState>) -> Option<Arc<WebviewPlayer>> {
    state
        .player
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

async fn load(
    state: &State<'_, AppState>,
    app_handle: AppHandle,
    video: VideoSource,
) -> SessionSnapshot {
    let emitter: Arc<dyn UiEmitter> = Arc::new(app_handle);
    let player = Arc::new(WebviewPlayer::new(video.playback_kind(), emitter));
    *state
        .player
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&player));

    controller_from_state(state).load_video(video, player).await
}

#[tauri::command]
pub async fn load_video_url(
    state: State<'_, AppState>,
    app_handle: AppHandle,
    url: String,
) -> Result<SessionSnapshot, String> {
    let video = VideoSource::parse_url(&url).map_err(|e| e.to_string())?;
    Ok(load(&state, app_handle, video).await)
}

#[tauri::command]
pub async fn load_video_file(
    state: State<'_, AppState>,
    app_handle: AppHandle,
    name: String,
    mime_type: Option<String>,
) -> Result<SessionSnapshot, String> {
    let video = VideoSource::from_file(&name, mime_type.as_deref()).map_err(|e| e.to_string())?;
    Ok(load(&state, app_handle, video).await)
}

/// State changes flow to the session through the player's watch channel.
#[tauri::command]
pub async fn report_player_state(
    state: State<'_, AppState>,
    player_state: PlayerState,
) -> Result<(), String> {
    let player = current_player(&state).ok_or_else(|| "No video loaded".to_string())?;
    player.set_state(player_state);
    Ok(())
}

#[tauri::command]
pub async fn report_playback_time(state: State<'_, AppState>, seconds: f64) -> Result<(), String> {
    if let Some(player) = current_player(&state) {
        player.set_time(seconds);
        controller_from_state(&state).report_time(seconds).await;
    }
    Ok(())
}

#[tauri::command]
pub async fn report_seeking(
    state: State<'_, AppState>,
    seconds: f64,
) -> Result<Option<f64>, String> {
    let Some(player) = current_player(&state) else {
        return Ok(None);
    };
    player.set_time(seconds);
    Ok(controller_from_state(&state).report_seeking(seconds).await)
}

#[tauri::command]
pub async fn report_seeked(state: State<'_, AppState>) -> Result<(), String> {
    controller_from_state(&state).report_seeked().await;
    Ok(())
}

#[tauri::command]
pub async fn get_session_snapshot(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    Ok(controller_from_state(&state).snapshot().await)
}

#[tauri::command]
pub async fn retry_metrics_stream(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    Ok(controller_from_state(&state).retry_metrics_stream().await)
}

#[tauri::command]
pub async fn end_session(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    state
        .player
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    Ok(controller_from_state(&state).teardown().await)
}
