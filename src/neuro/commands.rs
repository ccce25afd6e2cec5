use serde::Serialize;
use tauri::State;

use crate::{
    neuro::{DeviceStatus, NeuroController, SensorInfo, StreamKind},
    AppState,
};

fn controller_from_state(state: &State<'_, AppState>) -> NeuroController {
    state.neuro.clone()
}

#[derive(Debug, Serialize)]
pub struct ConnectResult {
    pub connected: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResult {
    pub data_type: StreamKind,
    pub active: Vec<StreamKind>,
}

#[tauri::command]
pub async fn scan_devices(state: State<'_, AppState>) -> Result<Vec<SensorInfo>, String> {
    let duration = state.settings.current().scan_duration();
    controller_from_state(&state)
        .scan_devices(duration)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn connect_device(
    state: State<'_, AppState>,
    index: usize,
) -> Result<ConnectResult, String> {
    let connected = controller_from_state(&state)
        .connect_sensor(index)
        .map_err(|e| e.to_string())?;
    Ok(ConnectResult { connected })
}

#[tauri::command]
pub async fn disconnect_device(state: State<'_, AppState>) -> Result<DeviceStatus, String> {
    let controller = controller_from_state(&state);
    controller.disconnect_sensor();
    Ok(controller.status())
}

#[tauri::command]
pub async fn get_device_status(state: State<'_, AppState>) -> Result<DeviceStatus, String> {
    Ok(controller_from_state(&state).status())
}

#[tauri::command]
pub async fn start_stream(
    state: State<'_, AppState>,
    data_type: String,
) -> Result<StreamResult, String> {
    let kind: StreamKind = data_type.parse().map_err(|e: anyhow::Error| e.to_string())?;
    let controller = controller_from_state(&state);
    controller.start_stream(kind).map_err(|e| e.to_string())?;
    Ok(StreamResult {
        data_type: kind,
        active: controller.active_streams(),
    })
}

#[tauri::command]
pub async fn stop_stream(
    state: State<'_, AppState>,
    data_type: String,
) -> Result<StreamResult, String> {
    let kind: StreamKind = data_type.parse().map_err(|e: anyhow::Error| e.to_string())?;
    let controller = controller_from_state(&state);
    controller.stop_stream(kind);
    Ok(StreamResult {
        data_type: kind,
        active: controller.active_streams(),
    })
}
