mod attention;
mod events;
mod feed;
mod neuro;
mod settings;
mod utils;

use std::sync::{Arc, Mutex};

use attention::{
    commands::{
        end_session, get_session_snapshot, load_video_file, load_video_url, report_playback_time,
        report_player_state, report_seeked, report_seeking, retry_metrics_stream,
    },
    AttentionSessionController, WebviewPlayer,
};
use events::{emit, UiEmitter, NEURO_STREAM};
use feed::FeedHub;
use neuro::{
    commands::{
        connect_device, disconnect_device, get_device_status, scan_devices, start_stream,
        stop_stream,
    },
    emotions::{EmotionalMath, SimulatedMath},
    simulated::SimulatedBackend,
    MathFactory, NeuroController,
};
use settings::{FocusSettings, SettingsStore};
use tauri::{Manager, State};

pub(crate) struct AppState {
    pub(crate) neuro: NeuroController,
    pub(crate) session: AttentionSessionController,
    pub(crate) settings: Arc<SettingsStore>,
    /// Player of the currently loaded video, fed by the dashboard.
    pub(crate) player: Mutex<Option<Arc<WebviewPlayer>>>,
}

#[tauri::command]
fn get_settings(state: State<AppState>) -> Result<FocusSettings, String> {
    Ok(state.settings.current())
}

#[tauri::command]
async fn update_settings(
    settings: FocusSettings,
    state: State<'_, AppState>,
) -> Result<FocusSettings, String> {
    state
        .settings
        .update(settings.clone())
        .map_err(|e| e.to_string())?;
    state.session.apply_settings(settings.clone()).await;
    Ok(settings)
}

fn simulated_math(settings: Arc<SettingsStore>) -> MathFactory {
    Arc::new(move || {
        let calibration_secs = settings.current().calibration_length_secs;
        Box::new(SimulatedMath::new(calibration_secs)) as Box<dyn EmotionalMath>
    })
}

/// Ends any session and releases the headset before the process exits.
async fn shutdown(state: &AppState) {
    state
        .player
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    state.session.teardown().await;
    state.neuro.disconnect_sensor();
    log::info!("FocusFlow shut down");
}

/// Forwards every hub message to the dashboard as `neuro-stream`.
fn spawn_stream_bridge(hub: &FeedHub, emitter: Arc<dyn UiEmitter>) {
    let mut subscription = hub.subscribe();
    tauri::async_runtime::spawn(async move {
        while let Some(message) = subscription.next().await {
            log::trace!("forwarding {} message", message.kind());
            emit(emitter.as_ref(), NEURO_STREAM, &message);
        }
    });
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let level = if std::env::var("FOCUSFLOW_DEBUG").is_ok_and(|value| value == "1") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("FocusFlow starting up...");

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let settings_store = Arc::new(SettingsStore::new(app_data_dir.join("settings.json"))?);
                let settings = settings_store.current();

                let hub = FeedHub::new(settings.stream_channel_capacity);
                let neuro = NeuroController::new(
                    Arc::new(SimulatedBackend::new()),
                    hub.clone(),
                    simulated_math(Arc::clone(&settings_store)),
                );

                let emitter: Arc<dyn UiEmitter> = Arc::new(app.handle().clone());
                let session = AttentionSessionController::new(
                    Arc::new(neuro.clone()),
                    Arc::clone(&emitter),
                    settings,
                );
                spawn_stream_bridge(&hub, emitter);

                app.manage(AppState {
                    neuro,
                    session,
                    settings: settings_store,
                    player: Mutex::new(None),
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            scan_devices,
            connect_device,
            disconnect_device,
            get_device_status,
            start_stream,
            stop_stream,
            load_video_url,
            load_video_file,
            report_player_state,
            report_playback_time,
            report_seeking,
            report_seeked,
            get_session_snapshot,
            retry_metrics_stream,
            end_session,
            get_settings,
            update_settings,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| {
        if let tauri::RunEvent::Exit = event {
            if let Some(state) = app_handle.try_state::<AppState>() {
                tauri::async_runtime::block_on(shutdown(&state));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attention::{playback::testing::ScriptedPlayer, PlaybackKind, SessionState, VideoSource},
        events::testing::RecordingEmitter,
    };
    use tokio::time::Duration;

    fn app_state() -> AppState {
        let path = std::env::temp_dir().join(format!(
            "focusflow-{}-settings.json",
            uuid::Uuid::new_v4()
        ));
        let settings = Arc::new(SettingsStore::new(path).unwrap());
        let neuro = NeuroController::new(
            Arc::new(SimulatedBackend::new()),
            FeedHub::new(64),
            simulated_math(Arc::clone(&settings)),
        );
        let session = AttentionSessionController::new(
            Arc::new(neuro.clone()),
            Arc::new(RecordingEmitter::default()),
            settings.current(),
        );
        AppState {
            neuro,
            session,
            settings,
            player: Mutex::new(None),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_session_and_headset() {
        let state = app_state();
        state.neuro.scan_devices(Duration::from_secs(1)).await.unwrap();
        assert!(state.neuro.connect_sensor(0).unwrap());

        let video = VideoSource::LocalFile {
            name: "talk.mp4".into(),
        };
        let snapshot = state
            .session
            .load_video(video, ScriptedPlayer::new(PlaybackKind::LocalFile))
            .await;
        assert_eq!(snapshot.state, SessionState::Calibrating);
        assert!(!state.neuro.active_streams().is_empty());

        shutdown(&state).await;
        assert!(!state.neuro.is_connected());
        assert!(state.neuro.active_streams().is_empty());
        assert_eq!(state.session.snapshot().await.state, SessionState::Idle);
    }
}
