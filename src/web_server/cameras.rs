use super::prelude::*;

/// `GET /list_cameras`: names currently in the registry.
#[instrument(skip_all)]
pub(crate) async fn list_cameras(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let names = state.registry.snapshot().names();
    debug!("Listing {} cameras", names.len());
    Json(names)
}

pub(crate) async fn list_camera_details(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<CameraSummary>>> {
    let snapshot = state.registry.snapshot();
    let cameras = snapshot
        .entries
        .values()
        .map(|entry| CameraSummary::from_entry(entry, &state.stream_base))
        .collect();
    Json(ApiResponse::success(cameras))
}

pub(crate) async fn get_camera(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<CameraSummary>>) {
    match state.registry.snapshot().get(&name) {
        Some(entry) => (
            StatusCode::OK,
            Json(ApiResponse::success(CameraSummary::from_entry(
                entry,
                &state.stream_base,
            ))),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Camera '{name}' not found"))),
        ),
    }
}

pub(crate) async fn hub_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HubStatus>> {
    let snapshot = state.registry.snapshot();
    Json(ApiResponse::success(HubStatus {
        camera_count: snapshot.len(),
        streaming_count: snapshot.entries.values().filter(|e| e.in_use).count(),
        passes: snapshot.generation,
        last_reconciled: snapshot.published_at,
    }))
}

pub(crate) async fn not_found() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error("Not found".to_string())),
    )
}
