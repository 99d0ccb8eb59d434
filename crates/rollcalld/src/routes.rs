//! REST surface: enrollment, roster and session administration, manual and
//! one-shot detection marking, CSV export. Thin plumbing around the store —
//! the orchestration lives in `orchestrator`/`engine`.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use rollcall_core::pipeline::PipelineError;
use rollcall_store::{
    AttendanceRow, ClassSession, Instructor, MarkOutcome, NewStudent, SessionStats, StoreError,
    Student, StudentStats,
};

use crate::engine::EngineError;
use crate::state::{refresh_gallery, AppState};
use crate::ws;

pub fn router(state: AppState) -> Router {
    let photos_dir = state.config.photos_dir.clone();
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .route("/api/instructors", post(create_instructor).get(list_instructors))
        .route("/api/students", post(enroll_student).get(list_students))
        .route("/api/students/:id", get(get_student).delete(delete_student))
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/:id/end", put(end_session))
        .route("/api/sessions/:id/stats", get(session_stats))
        .route("/api/sessions/:id/attendance", get(session_attendance))
        .route("/api/sessions/:id/export", get(export_csv))
        .route("/api/attendance/mark", post(mark_attendance))
        .route("/api/attendance/detect", post(detect_once))
        .nest_service("/photos", ServeDir::new(photos_dir))
        .with_state(state)
}

// --- Error mapping ---

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(d) => (StatusCode::BAD_REQUEST, d),
            ApiError::NotFound(d) => (StatusCode::NOT_FOUND, d),
            ApiError::Conflict(d) => (StatusCode::CONFLICT, d),
            ApiError::Internal(d) => (StatusCode::INTERNAL_SERVER_ERROR, d),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail(_) => ApiError::Conflict(e.to_string()),
            StoreError::StudentNotFound(_) | StoreError::SessionNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            other => {
                tracing::error!(error = %other, "store failure");
                ApiError::Internal("store failure".to_string())
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Pipeline(PipelineError::Decode(_))
            | EngineError::Pipeline(PipelineError::NoFaceFound)
            | EngineError::Pipeline(PipelineError::MultipleFacesFound(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            other => {
                tracing::error!(error = %other, "engine failure");
                ApiError::Internal("detection engine failure".to_string())
            }
        }
    }
}

// --- Health ---

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    active_sessions: usize,
    gallery_size: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.registry.active_sessions(),
        gallery_size: state.gallery.snapshot().len(),
    })
}

// --- Instructors ---

#[derive(Deserialize)]
struct CreateInstructor {
    first_name: String,
    last_name: String,
    subject: String,
    email: String,
}

#[derive(Serialize)]
struct Created {
    id: i64,
}

async fn create_instructor(
    State(state): State<AppState>,
    Json(body): Json<CreateInstructor>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    if body.first_name.is_empty() || body.last_name.is_empty() || body.email.is_empty() {
        return Err(ApiError::BadRequest(
            "first_name, last_name and email are required".into(),
        ));
    }
    let id = state
        .store
        .add_instructor(&body.first_name, &body.last_name, &body.subject, &body.email)
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

async fn list_instructors(
    State(state): State<AppState>,
) -> Result<Json<Vec<Instructor>>, ApiError> {
    Ok(Json(state.store.list_instructors().await?))
}

// --- Students ---

#[derive(Deserialize)]
struct EnrollStudent {
    first_name: String,
    last_name: String,
    email: String,
    /// Base64 enrollment photo; when present it must contain exactly one face.
    #[serde(default)]
    photo: Option<String>,
}

#[derive(Serialize)]
struct EnrolledStudent {
    id: i64,
    has_vector: bool,
    photo_path: Option<String>,
}

async fn enroll_student(
    State(state): State<AppState>,
    Json(body): Json<EnrollStudent>,
) -> Result<(StatusCode, Json<EnrolledStudent>), ApiError> {
    if body.first_name.is_empty() || body.last_name.is_empty() || body.email.is_empty() {
        return Err(ApiError::BadRequest(
            "first_name, last_name and email are required".into(),
        ));
    }
    if state.store.student_by_email(&body.email).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "a record with email {} already exists",
            body.email
        )));
    }

    let mut vector = None;
    let mut photo_path = None;
    if let Some(photo) = &body.photo {
        let encoded = photo.rsplit(',').next().unwrap_or(photo);
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| ApiError::BadRequest(format!("invalid photo payload: {e}")))?;

        // Exactly-one-face rule: anything else rejects the enrollment with
        // nothing stored.
        vector = Some(state.engine.encode(bytes.clone()).await?);
        photo_path = Some(save_photo(&state, &body.first_name, &body.last_name, &bytes).await?);
    }

    let has_vector = vector.is_some();
    let id = state
        .store
        .add_student(NewStudent {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            photo_path: photo_path.clone(),
            vector,
        })
        .await?;

    if has_vector {
        if let Err(e) = refresh_gallery(&state).await {
            tracing::warn!(error = %e, "gallery refresh failed after enrollment");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(EnrolledStudent {
            id,
            has_vector,
            photo_path,
        }),
    ))
}

async fn save_photo(
    state: &AppState,
    first_name: &str,
    last_name: &str,
    bytes: &[u8],
) -> Result<String, ApiError> {
    let ext = image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("jpg");
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!(
        "{}_{}_{stamp}.{ext}",
        sanitize(first_name),
        sanitize(last_name)
    );

    let path = state.config.photos_dir.join(&filename);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store photo: {e}")))?;
    Ok(filename)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

async fn list_students(State(state): State<AppState>) -> Result<Json<Vec<Student>>, ApiError> {
    Ok(Json(state.store.list_students().await?))
}

#[derive(Serialize)]
struct StudentDetail {
    #[serde(flatten)]
    student: Student,
    statistics: StudentStats,
}

async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StudentDetail>, ApiError> {
    let student = state.store.student(id).await?;
    let statistics = state.store.student_stats(id).await?;
    Ok(Json(StudentDetail {
        student,
        statistics,
    }))
}

async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let photo = state.store.remove_student(id).await?;
    if let Some(photo) = photo {
        let path = state.config.photos_dir.join(photo);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete photo file");
        }
    }
    if let Err(e) = refresh_gallery(&state).await {
        tracing::warn!(error = %e, "gallery refresh failed after deletion");
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Sessions ---

#[derive(Deserialize)]
struct CreateSession {
    #[serde(default)]
    instructor_id: Option<i64>,
    subject: String,
    #[serde(default)]
    session_date: Option<String>,
}

#[derive(Serialize)]
struct SessionCreated {
    id: i64,
    students_enrolled: usize,
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSession>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    if body.subject.is_empty() {
        return Err(ApiError::BadRequest("subject is required".into()));
    }
    let id = state
        .store
        .create_session(body.instructor_id, &body.subject, body.session_date.as_deref())
        .await?;
    let students_enrolled = refresh_gallery(&state).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "gallery refresh failed on session create");
        state.gallery.snapshot().len()
    });
    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            id,
            students_enrolled,
        }),
    ))
}

#[derive(Serialize)]
struct SessionClosed {
    id: i64,
    statistics: SessionStats,
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SessionClosed>, ApiError> {
    state.store.end_session(id).await?;
    let statistics = state.store.session_stats(id).await?;
    Ok(Json(SessionClosed { id, statistics }))
}

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<ClassSession>>, ApiError> {
    Ok(Json(state.store.list_sessions().await?))
}

async fn session_stats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SessionStats>, ApiError> {
    // Resolve the session first so unknown ids 404 instead of reporting
    // zeroes.
    state.store.session(id).await?;
    Ok(Json(state.store.session_stats(id).await?))
}

async fn session_attendance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AttendanceRow>>, ApiError> {
    state.store.session(id).await?;
    Ok(Json(state.store.session_attendance(id).await?))
}

async fn export_csv(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    state.store.session(id).await?;
    let csv = state.store.export_csv(id).await?;
    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"attendance_session_{id}.csv\""),
        ),
    ];
    Ok((headers, csv).into_response())
}

// --- Attendance ---

#[derive(Deserialize)]
struct MarkRequest {
    session_id: i64,
    student_id: i64,
}

async fn mark_attendance(
    State(state): State<AppState>,
    Json(body): Json<MarkRequest>,
) -> Result<Json<MarkOutcome>, ApiError> {
    state.store.session(body.session_id).await?;
    state.store.student(body.student_id).await?;
    Ok(Json(
        state
            .store
            .mark_attendance(body.session_id, body.student_id)
            .await?,
    ))
}

#[derive(Deserialize)]
struct DetectRequest {
    session_id: i64,
    image: String,
}

#[derive(Serialize)]
struct DetectOutcome {
    student_id: i64,
    name: String,
    confidence: f32,
    marked: bool,
    already_present: bool,
}

#[derive(Serialize)]
struct DetectResponse {
    session_id: i64,
    faces_detected: usize,
    students: Vec<DetectOutcome>,
    session_stats: SessionStats,
}

/// One-shot request form: run the full pipeline once, synchronously, with a
/// forced gallery refresh first, and reply directly instead of notifying.
async fn detect_once(
    State(state): State<AppState>,
    Json(body): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    state.store.session(body.session_id).await?;
    refresh_gallery(&state).await?;

    let encoded = body.image.rsplit(',').next().unwrap_or(&body.image);
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| ApiError::BadRequest(format!("invalid image payload: {e}")))?;

    let analysis = state
        .engine
        .analyze(
            bytes,
            state.gallery.snapshot(),
            state.config.tolerance,
            state.config.downscale_divisor,
        )
        .await?;

    let mut students = Vec::with_capacity(analysis.matches.len());
    for face in &analysis.matches {
        match state
            .store
            .mark_attendance(body.session_id, face.student_id)
            .await
        {
            Ok(outcome) => students.push(DetectOutcome {
                student_id: face.student_id,
                name: face.name.clone(),
                confidence: face.confidence,
                marked: outcome.newly_marked,
                already_present: !outcome.newly_marked,
            }),
            Err(e) => {
                // Partial success: keep processing the other faces.
                tracing::warn!(student = face.student_id, error = %e, "one-shot mark failed");
                students.push(DetectOutcome {
                    student_id: face.student_id,
                    name: face.name.clone(),
                    confidence: face.confidence,
                    marked: false,
                    already_present: false,
                });
            }
        }
    }

    let session_stats = state.store.session_stats(body.session_id).await?;
    Ok(Json(DetectResponse {
        session_id: body.session_id,
        faces_detected: analysis.faces_detected,
        students,
        session_stats,
    }))
}
