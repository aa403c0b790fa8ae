//! HTTP surface (actix-web)
//!
//! Identity is supplied by the fronting auth gateway: `X-User-Id` carries the
//! logged-in user and `X-Admin-Id` the logged-in administrator. Handlers call
//! into [`BoxOffice`] and translate ledger errors to responses; nothing here
//! touches a lock or the store directly.

use crate::{
    office::BoxOffice,
    report::write_csv,
    types::{EventId, UserId},
    Error,
};
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// Header carrying the authenticated user id
pub const USER_HEADER: &str = "X-User-Id";

/// Header carrying the authenticated administrator id
pub const ADMIN_HEADER: &str = "X-Admin-Id";

/// Shared handler state
pub type OfficeData = web::Data<Arc<BoxOffice>>;

/// Errors returned by handlers
#[derive(Debug)]
pub enum ApiError {
    /// Ledger error
    Ledger(Error),
    /// No user identity on a user endpoint
    LoginRequired,
    /// No administrator identity on an admin endpoint
    AdminLoginRequired,
    /// User asked for another user's page
    Forbidden,
    /// Rank segment of a seat path names no rank
    UnknownRank(String),
}

impl ApiError {
    /// Stable machine-readable code
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::LoginRequired => "login_required",
            ApiError::AdminLoginRequired => "admin_login_required",
            ApiError::Forbidden => "forbidden",
            ApiError::UnknownRank(_) => "invalid_rank",
            ApiError::Ledger(e) => match e {
                Error::NotFound { .. } => "not_found",
                Error::InvalidEvent(_) => "invalid_event",
                Error::OutOfRange(_) => "invalid_sheet",
                Error::InvalidRank(_) => "invalid_rank",
                Error::SoldOut { .. } => "sold_out",
                Error::AlreadyCanceled(_) => "already_canceled",
                Error::Forbidden(_) => "not_permitted",
                Error::NotReserved { .. } => "not_reserved",
                Error::SeatTaken { .. } => "seat_taken",
                Error::EventClosed(_) => "cannot_edit_closed_event",
                Error::CannotClosePublic(_) => "cannot_close_public_event",
                Error::InvalidVisibility(_) => "invalid_visibility",
                Error::Validation(_) => "validation_error",
                Error::Unavailable(_) => "service_unavailable",
                _ => "internal_error",
            },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Ledger(e) => write!(f, "{}", e),
            ApiError::LoginRequired => write!(f, "Login required"),
            ApiError::AdminLoginRequired => write!(f, "Administrator login required"),
            ApiError::Forbidden => write!(f, "Forbidden"),
            ApiError::UnknownRank(rank) => write!(f, "Invalid rank: {}", rank),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Ledger(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::LoginRequired | ApiError::AdminLoginRequired => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::UnknownRank(_) => StatusCode::NOT_FOUND,
            ApiError::Ledger(e) => match e {
                Error::NotFound { .. } | Error::InvalidEvent(_) | Error::OutOfRange(_) => {
                    StatusCode::NOT_FOUND
                }
                Error::InvalidRank(_)
                | Error::Validation(_)
                | Error::NotReserved { .. }
                | Error::EventClosed(_)
                | Error::CannotClosePublic(_)
                | Error::InvalidVisibility(_) => StatusCode::BAD_REQUEST,
                Error::Forbidden(_) => StatusCode::FORBIDDEN,
                Error::SoldOut { .. } | Error::AlreadyCanceled(_) | Error::SeatTaken { .. } => {
                    StatusCode::CONFLICT
                }
                Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.error_type(),
            "message": self.to_string(),
        }))
    }
}

fn header_id(req: &HttpRequest, name: &str) -> Option<i64> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Logged-in user, if any
fn viewer(req: &HttpRequest) -> Option<UserId> {
    header_id(req, USER_HEADER)
}

fn require_user(req: &HttpRequest) -> Result<UserId, ApiError> {
    viewer(req).ok_or(ApiError::LoginRequired)
}

fn require_admin(req: &HttpRequest) -> Result<i64, ApiError> {
    header_id(req, ADMIN_HEADER).ok_or(ApiError::AdminLoginRequired)
}

/// Reservation request body
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    /// Rank label
    pub sheet_rank: String,
}

/// Event creation body
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    /// Title
    pub title: String,
    /// Visible right away
    #[serde(default)]
    pub public: bool,
    /// Base price
    pub price: i64,
}

/// Visibility edit body
#[derive(Debug, Deserialize)]
pub struct EditEventRequest {
    /// New public flag
    #[serde(default)]
    pub public: bool,
    /// New closed flag
    #[serde(default)]
    pub closed: bool,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" once serving
    pub status: String,
    /// Crate version
    pub version: String,
    /// Events in memory
    pub events: usize,
    /// Reservation rows in memory
    pub reservations: usize,
}

// ===== Health Check =====
/// Liveness plus in-memory row counts
pub async fn health_check(office: OfficeData) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        events: office.event_count(),
        reservations: office.reservation_count(),
    })
}

// ===== Metrics =====
/// Prometheus text exposition
pub async fn metrics(office: OfficeData) -> Result<HttpResponse, ApiError> {
    let body = office
        .metrics()
        .render()
        .map_err(Error::from)?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

// ===== Public Events =====
/// Public events, no seat detail
pub async fn list_events(office: OfficeData) -> HttpResponse {
    HttpResponse::Ok().json(office.public_events())
}

/// One public event with seat detail
pub async fn get_event(
    req: HttpRequest,
    path: web::Path<EventId>,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    let event = office.public_event(path.into_inner(), viewer(&req))?;
    Ok(HttpResponse::Ok().json(event))
}

// ===== Reservations =====
/// Reserve a random free seat of a rank
pub async fn reserve(
    req: HttpRequest,
    path: web::Path<EventId>,
    body: web::Json<ReserveRequest>,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&req)?;
    let receipt = office.reserve(path.into_inner(), &body.sheet_rank, user_id)?;
    Ok(HttpResponse::Accepted().json(receipt))
}

/// Cancel the caller's reservation of a seat
pub async fn cancel(
    req: HttpRequest,
    path: web::Path<(EventId, String, i64)>,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&req)?;
    let (event_id, rank, num) = path.into_inner();
    office
        .cancel(event_id, &rank, num, user_id)
        .map_err(|e| match e {
            // The rank is a path segment here: an unknown one names no seat
            Error::InvalidRank(rank) => ApiError::UnknownRank(rank),
            e => ApiError::Ledger(e),
        })?;
    Ok(HttpResponse::NoContent().finish())
}

// ===== Users =====
/// The caller's activity summary
pub async fn get_user(
    req: HttpRequest,
    path: web::Path<UserId>,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&req)?;
    if path.into_inner() != user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(HttpResponse::Ok().json(office.user_activity(user_id)?))
}

// ===== Admin Events =====
/// Every event, no seat detail
pub async fn admin_list_events(
    req: HttpRequest,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    Ok(HttpResponse::Ok().json(office.events(true)))
}

/// Create an event
pub async fn admin_create_event(
    req: HttpRequest,
    body: web::Json<CreateEventRequest>,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    let body = body.into_inner();
    let event = office.create_event(&body.title, body.public, body.price)?;
    Ok(HttpResponse::Ok().json(event))
}

/// Any event with seat detail
pub async fn admin_get_event(
    req: HttpRequest,
    path: web::Path<EventId>,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    Ok(HttpResponse::Ok().json(office.event(path.into_inner(), None)?))
}

/// Change visibility flags
pub async fn admin_edit_event(
    req: HttpRequest,
    path: web::Path<EventId>,
    body: web::Json<EditEventRequest>,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    let event = office.edit_event(path.into_inner(), body.public, body.closed)?;
    Ok(HttpResponse::Ok().json(event))
}

// ===== Reports =====
fn csv_response(rows: &[crate::report::SalesRow]) -> Result<HttpResponse, ApiError> {
    let mut body = Vec::new();
    write_csv(rows, &mut body)?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=UTF-8")
        .insert_header(("Content-Disposition", r#"attachment; filename="report.csv""#))
        .body(body))
}

/// Sales CSV of one event
pub async fn event_sales(
    req: HttpRequest,
    path: web::Path<EventId>,
    office: OfficeData,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    csv_response(&office.sales_report(path.into_inner())?)
}

/// Sales CSV of every event
pub async fn all_sales(req: HttpRequest, office: OfficeData) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    csv_response(&office.sales_report_all()?)
}

// ===== Maintenance =====
/// Drain the writer and re-read the store
pub async fn reload(req: HttpRequest, office: OfficeData) -> Result<HttpResponse, ApiError> {
    require_admin(&req)?;
    office.reload().await?;
    Ok(HttpResponse::NoContent().finish())
}

// ===== Configure Routes =====
/// Mount the public API, the admin API, `/health` and `/metrics`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/events", web::get().to(list_events))
            .route("/events/{id}", web::get().to(get_event))
            .route("/events/{id}/actions/reserve", web::post().to(reserve))
            .route(
                "/events/{id}/sheets/{rank}/{num}/reservation",
                web::delete().to(cancel),
            )
            .route("/users/{id}", web::get().to(get_user)),
    )
    .service(
        web::scope("/admin/api")
            .route("/events", web::get().to(admin_list_events))
            .route("/events", web::post().to(admin_create_event))
            .route("/events/{id}", web::get().to(admin_get_event))
            .route("/events/{id}/actions/edit", web::post().to(admin_edit_event))
            .route("/reports/events/{id}/sales", web::get().to(event_sales))
            .route("/reports/sales", web::get().to(all_sales))
            .route("/actions/reload", web::post().to(reload)),
    )
    .route("/health", web::get().to(health_check))
    .route("/metrics", web::get().to(metrics));
}
