use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::db::{ArchivedSubject, Database};
use crate::metrics::MetricsCollector;
use crate::models::UpdatePayload;

use super::roster::{ClassRoster, ReplaceOutcome, SubjectRecord};

const BROADCAST_CAPACITY: usize = 64;
const DEFAULT_ARCHIVE_LIMIT: u32 = 50;

type ApiError = (StatusCode, String);

pub type SharedState = Arc<RelayState>;

pub struct RelayState {
    roster: RwLock<ClassRoster>,
    tx: broadcast::Sender<String>,
    db: Option<Database>,
    metrics: MetricsCollector,
    started_at: Instant,
}

impl RelayState {
    pub fn new(db: Option<Database>) -> SharedState {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(Self {
            roster: RwLock::new(ClassRoster::new()),
            tx,
            db,
            metrics: MetricsCollector::new(),
            started_at: Instant::now(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, SubjectRecord> {
        self.roster.read().await.snapshot()
    }

    pub async fn apply_update(&self, subject_id: &str, payload: UpdatePayload) -> ReplaceOutcome {
        let mut roster = self.roster.write().await;
        let outcome = roster.replace(subject_id, payload, Utc::now());
        if outcome.changed() {
            self.broadcast_roster(&roster);
        }
        outcome
    }

    /// Drops the subject from the roster and archives its last state.
    pub async fn remove_subject(&self, subject_id: &str) -> Option<SubjectRecord> {
        let removed = {
            let mut roster = self.roster.write().await;
            let removed = roster.remove(subject_id);
            if removed.is_some() {
                self.broadcast_roster(&roster);
            }
            removed
        };

        if let (Some(record), Some(db)) = (&removed, &self.db) {
            match db.archive_subject(record).await {
                Ok(archived) => info!(
                    "archived {} (left desk {}, looked down {})",
                    archived.subject_id, archived.left_desk_count, archived.looked_down_count
                ),
                Err(err) => warn!("failed to archive {subject_id}: {err:?}"),
            }
        }
        removed
    }

    fn broadcast_roster(&self, roster: &ClassRoster) {
        match serde_json::to_string(&roster.snapshot()) {
            // No receivers is fine
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(err) => warn!("failed to serialize roster: {err}"),
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/subjects", get(list_subjects))
        .route(
            "/api/subjects/:subject_id",
            get(get_subject).post(post_subject).delete(delete_subject),
        )
        .route("/api/archive", get(list_archive))
        .route("/api/archive/:subject_id", get(subject_archive))
        .route("/ws/teacher", get(ws_teacher_handler))
        .route("/ws/student", get(ws_student_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Serves until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: SharedState, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("relay listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("relay server failed")
}

// ── REST ────────────────────────────────────────────────────────────────────

async fn list_subjects(State(state): State<SharedState>) -> Json<BTreeMap<String, SubjectRecord>> {
    Json(state.snapshot().await)
}

async fn get_subject(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> Result<Json<SubjectRecord>, ApiError> {
    state
        .roster
        .read()
        .await
        .get(&subject_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown subject {subject_id}")))
}

async fn post_subject(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
    Json(payload): Json<UpdatePayload>,
) -> Result<Json<SubjectRecord>, ApiError> {
    if let Some(body_id) = payload.subject_id.as_deref() {
        if body_id != subject_id {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("subjectId {body_id} does not match path {subject_id}"),
            ));
        }
    }

    state.apply_update(&subject_id, payload).await;
    state
        .roster
        .read()
        .await
        .get(&subject_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| (StatusCode::INTERNAL_SERVER_ERROR, "subject vanished".into()))
}

async fn delete_subject(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> StatusCode {
    match state.remove_subject(&subject_id).await {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveQuery {
    limit: Option<u32>,
}

fn archive_db(state: &RelayState) -> Result<&Database, ApiError> {
    state
        .db
        .as_ref()
        .ok_or_else(|| (StatusCode::NOT_FOUND, "archive disabled".to_string()))
}

fn internal(err: anyhow::Error) -> ApiError {
    warn!("archive query failed: {err:?}");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

async fn list_archive(
    State(state): State<SharedState>,
    Query(query): Query<ArchiveQuery>,
) -> Result<Json<Vec<ArchivedSubject>>, ApiError> {
    let db = archive_db(&state)?;
    let limit = query.limit.unwrap_or(DEFAULT_ARCHIVE_LIMIT);
    db.list_archived(limit).await.map(Json).map_err(internal)
}

async fn subject_archive(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<ArchivedSubject>>, ApiError> {
    let db = archive_db(&state)?;
    db.get_archived_for_subject(&subject_id)
        .await
        .map(Json)
        .map_err(internal)
}

async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let subjects = state.roster.read().await.len();
    let system = state.metrics.sample_system_metrics().await;
    Json(serde_json::json!({
        "status": "ok",
        "subjects": subjects,
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "archive": state.db.is_some(),
        "cpuPercent": system.cpu_percent,
        "memoryMb": system.memory_mb,
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────────

async fn ws_teacher_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_teacher(socket, state))
}

async fn send_snapshot(socket: &mut WebSocket, state: &RelayState) -> bool {
    match serde_json::to_string(&state.snapshot().await) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            warn!("failed to serialize roster: {err}");
            false
        }
    }
}

async fn handle_teacher(mut socket: WebSocket, state: SharedState) {
    let mut rx = state.subscribe();
    info!("teacher dashboard connected");

    if send_snapshot(&mut socket, &state).await {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Ok(json) => {
                            if socket.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        // Missed some; a fresh snapshot supersedes them
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            if !send_snapshot(&mut socket, &state).await {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        _ => {}
                    }
                }
            }
        }
    }

    info!("teacher dashboard disconnected");
}

async fn ws_student_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_student(socket, state))
}

async fn handle_student(mut socket: WebSocket, state: SharedState) {
    let mut subjects: HashSet<String> = HashSet::new();

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let payload: UpdatePayload = match serde_json::from_str(&text) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("ignoring malformed student update: {err}");
                continue;
            }
        };
        let Some(subject_id) = payload.subject_id.clone().filter(|id| !id.is_empty()) else {
            warn!("ignoring student update without subjectId");
            continue;
        };

        if subjects.insert(subject_id.clone()) {
            info!("student {subject_id} connected");
        }
        state.apply_update(&subject_id, payload).await;
    }

    for subject_id in subjects {
        info!("student {subject_id} disconnected");
        state.remove_subject(&subject_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ViolationKind, ViolationRecord};

    fn payload(engagement: f64) -> UpdatePayload {
        UpdatePayload {
            subject_id: Some("s-1".into()),
            name: Some("Ada".into()),
            engagement: Some(engagement),
            violations: Some(vec![ViolationRecord {
                time: "09:00:00".into(),
                kind: ViolationKind::LeftDesk,
                detail: None,
            }]),
        }
    }

    #[tokio::test]
    async fn only_changes_are_broadcast() {
        let state = RelayState::new(None);
        let mut rx = state.subscribe();

        state.apply_update("s-1", payload(60.0)).await;
        state.apply_update("s-1", payload(60.0)).await;
        state.apply_update("s-1", payload(61.0)).await;

        let first: BTreeMap<String, SubjectRecord> =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["s-1"].engagement, 60);
        let second: BTreeMap<String, SubjectRecord> =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["s-1"].engagement, 61);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removal_broadcasts_and_archives() {
        let dir = std::env::temp_dir().join(format!("classwatch-relay-{}", uuid::Uuid::new_v4()));
        let db = Database::new(dir.join("archive.db")).unwrap();
        let state = RelayState::new(Some(db.clone()));

        state.apply_update("s-1", payload(60.0)).await;
        let mut rx = state.subscribe();
        assert!(state.remove_subject("s-1").await.is_some());
        assert!(state.remove_subject("s-1").await.is_none());

        let roster: BTreeMap<String, SubjectRecord> =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert!(roster.is_empty());

        let archived = db.get_archived_for_subject("s-1").await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].left_desk_count, 1);

        drop(state);
        drop(db);
        let _ = std::fs::remove_dir_all(dir);
    }
}
