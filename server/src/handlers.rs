use axum::{
    extract::{FromRequest, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::auth::{self, AuthUser};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::*;
use crate::AppState;

/// JSON body extractor whose rejections use the API error format.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

// === Auth endpoints ===

pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let new_user = req.validate()?;

    let password = new_user.password;
    let password_hash =
        tokio::task::spawn_blocking(move || auth::hash_password(&password)).await??;

    let user = User {
        id: new_id(),
        username: new_user.username,
        email: new_user.email,
        password_hash,
        role: new_user.role,
        created_at: Utc::now(),
    };
    state.db.create_user(&user)?;
    let token = state.tokens.issue(&user)?;

    tracing::info!(user_id = %user.id, username = %user.username, role = %user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let email = req.email.filter(|e| !e.trim().is_empty());
    let password = req.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(AppError::Validation("email and password are required".into()));
    };

    let email = email.trim().to_ascii_lowercase();
    let Some(user) = state.db.find_user_by_email(&email)? else {
        tokio::task::spawn_blocking(move || auth::verify_unknown_user(&password)).await??;
        tracing::warn!(email = %email, "login for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    let stored = user.password_hash.clone();
    let valid =
        tokio::task::spawn_blocking(move || auth::verify_password(&password, &stored)).await??;
    if !valid {
        tracing::warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.tokens.issue(&user)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

pub async fn profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DataResponse<PublicUser>>> {
    let record = state
        .db
        .get_user(&user.id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(DataResponse::new(PublicUser::from(&record))))
}

// === Users (admin) ===

pub async fn list_users(State(state): State<AppState>) -> Result<Json<DataResponse<Vec<PublicUser>>>> {
    let users = state.db.list_users()?;
    Ok(Json(DataResponse::new(
        users.iter().map(PublicUser::from).collect(),
    )))
}

// === Aircraft endpoints ===

fn aircraft_view(db: &Database, aircraft: Aircraft) -> Result<AircraftView> {
    let owner = db.get_user(&aircraft.owner)?;
    Ok(AircraftView::new(aircraft, owner.as_ref().map(PublicUser::from)))
}

fn owned_aircraft(db: &Database, id: &str, owner: &str) -> Result<Aircraft> {
    db.get_aircraft(id)?
        .filter(|a| a.owner == owner)
        .ok_or_else(|| AppError::NotFound("Aircraft not found".into()))
}

pub async fn list_aircraft(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DataResponse<Vec<AircraftView>>>> {
    let aircraft = state.db.list_aircraft(&user.id)?;
    // every record shares the caller as owner
    let owner = state.db.get_user(&user.id)?;
    let owner = owner.as_ref().map(PublicUser::from);

    Ok(Json(DataResponse::new(
        aircraft
            .into_iter()
            .map(|a| AircraftView::new(a, owner.clone()))
            .collect(),
    )))
}

pub async fn get_aircraft(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<AircraftView>>> {
    let aircraft = owned_aircraft(&state.db, &id, &user.id)?;
    Ok(Json(DataResponse::new(aircraft_view(&state.db, aircraft)?)))
}

pub async fn create_aircraft(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<AircraftRequest>,
) -> Result<(StatusCode, Json<DataResponse<AircraftView>>)> {
    let aircraft = req.into_aircraft(&user.id)?;
    state.db.create_aircraft(&aircraft)?;

    tracing::info!(aircraft_id = %aircraft.id, tail_number = %aircraft.tail_number, owner = %user.id, "aircraft created");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(aircraft_view(&state.db, aircraft)?)),
    ))
}

pub async fn update_aircraft(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<AircraftRequest>,
) -> Result<Json<DataResponse<AircraftView>>> {
    owned_aircraft(&state.db, &id, &user.id)?;
    let changes = req.validate_changes()?;

    let aircraft = state.db.update_aircraft(&id, &user.id, changes)?;
    Ok(Json(DataResponse::new(aircraft_view(&state.db, aircraft)?)))
}

pub async fn delete_aircraft(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.db.delete_aircraft(&id, &user.id)?;

    tracing::info!(aircraft_id = %id, owner = %user.id, "aircraft deleted");
    Ok(Json(MessageResponse::new("Aircraft deleted successfully")))
}

// === Presentation endpoints ===

fn presentation_view(db: &Database, presentation: Presentation) -> Result<PresentationView> {
    let aircraft = db.get_aircraft(&presentation.aircraft)?;
    let presenter = db.get_user(&presentation.presenter)?;

    let mut attendees = Vec::with_capacity(presentation.attendees.len());
    for id in &presentation.attendees {
        if let Some(user) = db.get_user(id)? {
            attendees.push(PublicUser::from(&user));
        }
    }

    Ok(PresentationView {
        id: presentation.id,
        title: presentation.title,
        description: presentation.description,
        location: presentation.location,
        aircraft: aircraft.as_ref().map(AircraftSummary::from),
        presenter: presenter.as_ref().map(PublicUser::from),
        attendees,
        status: presentation.status,
        scheduled_date: presentation.scheduled_date,
        duration: presentation.duration,
        created_at: presentation.created_at,
        updated_at: presentation.updated_at,
    })
}

/// Rejects references to aircraft or users that do not exist.
fn check_references(db: &Database, aircraft: Option<&str>, attendees: Option<&[String]>) -> Result<()> {
    if let Some(id) = aircraft {
        if db.get_aircraft(id)?.is_none() {
            return Err(AppError::Validation(format!("aircraft '{}' does not exist", id)));
        }
    }
    for id in attendees.unwrap_or_default() {
        if db.get_user(id)?.is_none() {
            return Err(AppError::Validation(format!("attendee '{}' does not exist", id)));
        }
    }
    Ok(())
}

pub async fn list_presentations(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<DataResponse<Vec<PresentationView>>>> {
    let presentations = state.db.list_presentations()?;
    let views = presentations
        .into_iter()
        .map(|p| presentation_view(&state.db, p))
        .collect::<Result<Vec<_>>>()?;
    Ok(Json(DataResponse::new(views)))
}

pub async fn get_presentation(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<PresentationView>>> {
    let presentation = state
        .db
        .get_presentation(&id)?
        .ok_or_else(|| AppError::NotFound("Presentation not found".into()))?;
    Ok(Json(DataResponse::new(presentation_view(&state.db, presentation)?)))
}

pub async fn create_presentation(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<PresentationRequest>,
) -> Result<(StatusCode, Json<DataResponse<PresentationView>>)> {
    let presentation = req.into_presentation(&user.id)?;
    check_references(
        &state.db,
        Some(presentation.aircraft.as_str()),
        Some(presentation.attendees.as_slice()),
    )?;
    state.db.create_presentation(&presentation)?;

    tracing::info!(presentation_id = %presentation.id, presenter = %user.id, "presentation scheduled");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(presentation_view(&state.db, presentation)?)),
    ))
}

pub async fn update_presentation(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<PresentationRequest>,
) -> Result<Json<DataResponse<PresentationView>>> {
    if state.db.get_presentation(&id)?.is_none() {
        return Err(AppError::NotFound("Presentation not found".into()));
    }
    let changes = req.validate_changes()?;
    check_references(&state.db, changes.aircraft.as_deref(), changes.attendees.as_deref())?;

    let presentation = state.db.update_presentation(&id, changes)?;
    Ok(Json(DataResponse::new(presentation_view(&state.db, presentation)?)))
}

pub async fn delete_presentation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.db.delete_presentation(&id)?;

    tracing::info!(presentation_id = %id, deleted_by = %user.id, "presentation deleted");
    Ok(Json(MessageResponse::new("Presentation deleted successfully")))
}

// === Health check ===

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.db.ping() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "database health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        timestamp: Utc::now(),
    })
}

pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}
