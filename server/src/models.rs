use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const MIN_PASSWORD_LEN: usize = 6;
const MIN_AIRCRAFT_YEAR: i32 = 1900;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Trims a required text field, rejecting absent or blank values.
fn required(value: Option<String>, field: &str) -> Result<String> {
    optional(value).ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// === Users ===

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "viewer" => Ok(Self::Viewer),
            other => Err(AppError::Validation(format!(
                "invalid role '{}': expected admin, manager or viewer",
                other
            ))),
        }
    }
}

/// Stored user record. Never serialized to clients; see [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

/// Registration input after validation; the password is still plaintext.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<NewUser> {
        let username = required(self.username, "username")?;
        let email = normalize_email(&required(self.email, "email")?)?;
        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::Validation("password is required".into()))?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let role = match optional(self.role) {
            Some(role) => role.parse()?,
            None => Role::default(),
        };

        Ok(NewUser {
            username,
            email,
            password,
            role,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    let well_formed = matches!(
        email.split_once('@'),
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@')
    );
    if well_formed {
        Ok(email)
    } else {
        Err(AppError::Validation("email is malformed".into()))
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

// === Aircraft ===

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AircraftStatus {
    #[default]
    Active,
    Maintenance,
    Retired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aircraft {
    pub id: String,
    pub tail_number: String,
    pub model: String,
    pub manufacturer: String,
    pub year: i32,
    pub status: AircraftStatus,
    pub specifications: Map<String, Value>,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of both create and update; on update absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AircraftRequest {
    pub tail_number: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub year: Option<i32>,
    pub status: Option<AircraftStatus>,
    pub specifications: Option<Map<String, Value>>,
}

pub fn normalize_tail_number(tail_number: &str) -> String {
    tail_number.trim().to_ascii_uppercase()
}

fn validate_year(year: i32) -> Result<i32> {
    let max = Utc::now().year() + 1;
    if (MIN_AIRCRAFT_YEAR..=max).contains(&year) {
        Ok(year)
    } else {
        Err(AppError::Validation(format!(
            "year must be between {} and {}",
            MIN_AIRCRAFT_YEAR, max
        )))
    }
}

impl AircraftRequest {
    pub fn into_aircraft(self, owner: &str) -> Result<Aircraft> {
        let tail_number = normalize_tail_number(&required(self.tail_number, "tailNumber")?);
        let model = required(self.model, "model")?;
        let manufacturer = required(self.manufacturer, "manufacturer")?;
        let year = self
            .year
            .ok_or_else(|| AppError::Validation("year is required".into()))
            .and_then(validate_year)?;
        let now = Utc::now();

        Ok(Aircraft {
            id: new_id(),
            tail_number,
            model,
            manufacturer,
            year,
            status: self.status.unwrap_or_default(),
            specifications: self.specifications.unwrap_or_default(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Checks the provided fields without touching a record, so the store
    /// can apply them inside its write transaction.
    pub fn validate_changes(self) -> Result<Self> {
        let blank = |field: &Option<String>| field.as_deref().is_some_and(|v| v.trim().is_empty());
        for (value, name) in [
            (&self.tail_number, "tailNumber"),
            (&self.model, "model"),
            (&self.manufacturer, "manufacturer"),
        ] {
            if blank(value) {
                return Err(AppError::Validation(format!("{} must not be empty", name)));
            }
        }
        if let Some(year) = self.year {
            validate_year(year)?;
        }

        Ok(Self {
            tail_number: self.tail_number.as_deref().map(normalize_tail_number),
            model: optional(self.model),
            manufacturer: optional(self.manufacturer),
            ..self
        })
    }

    pub fn apply_to(self, aircraft: &mut Aircraft) {
        if let Some(tail_number) = self.tail_number {
            aircraft.tail_number = tail_number;
        }
        if let Some(model) = self.model {
            aircraft.model = model;
        }
        if let Some(manufacturer) = self.manufacturer {
            aircraft.manufacturer = manufacturer;
        }
        if let Some(year) = self.year {
            aircraft.year = year;
        }
        if let Some(status) = self.status {
            aircraft.status = status;
        }
        if let Some(specifications) = self.specifications {
            aircraft.specifications = specifications;
        }
        aircraft.updated_at = Utc::now();
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AircraftView {
    pub id: String,
    pub tail_number: String,
    pub model: String,
    pub manufacturer: String,
    pub year: i32,
    pub status: AircraftStatus,
    pub specifications: Map<String, Value>,
    pub owner: Option<PublicUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AircraftView {
    pub fn new(aircraft: Aircraft, owner: Option<PublicUser>) -> Self {
        Self {
            id: aircraft.id,
            tail_number: aircraft.tail_number,
            model: aircraft.model,
            manufacturer: aircraft.manufacturer,
            year: aircraft.year,
            status: aircraft.status,
            specifications: aircraft.specifications,
            owner,
            created_at: aircraft.created_at,
            updated_at: aircraft.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AircraftSummary {
    pub id: String,
    pub tail_number: String,
    pub model: String,
    pub manufacturer: String,
}

impl From<&Aircraft> for AircraftSummary {
    fn from(aircraft: &Aircraft) -> Self {
        Self {
            id: aircraft.id.clone(),
            tail_number: aircraft.tail_number.clone(),
            model: aircraft.model.clone(),
            manufacturer: aircraft.manufacturer.clone(),
        }
    }
}

// === Presentations ===

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresentationStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presentation {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub aircraft: String,
    pub presenter: String,
    pub attendees: Vec<String>,
    pub status: PresentationStatus,
    pub scheduled_date: DateTime<Utc>,
    pub duration: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub aircraft: Option<String>,
    pub attendees: Option<Vec<String>>,
    pub status: Option<PresentationStatus>,
    pub scheduled_date: Option<DateTime<Utc>>,
    /// Minutes.
    pub duration: Option<u32>,
}

fn validate_duration(duration: u32) -> Result<u32> {
    if duration == 0 {
        return Err(AppError::Validation("duration must be greater than zero".into()));
    }
    Ok(duration)
}

/// Removes blanks and repeats while keeping first-seen order.
fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim().to_string();
        if !id.is_empty() && !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

impl PresentationRequest {
    pub fn into_presentation(self, presenter: &str) -> Result<Presentation> {
        let title = required(self.title, "title")?;
        let scheduled_date = self
            .scheduled_date
            .ok_or_else(|| AppError::Validation("scheduledDate is required".into()))?;
        let duration = self
            .duration
            .ok_or_else(|| AppError::Validation("duration is required".into()))
            .and_then(validate_duration)?;
        let aircraft = required(self.aircraft, "aircraft")?;
        let now = Utc::now();

        Ok(Presentation {
            id: new_id(),
            title,
            description: optional(self.description),
            location: optional(self.location),
            aircraft,
            presenter: presenter.to_string(),
            attendees: dedup_ids(self.attendees.unwrap_or_default()),
            status: self.status.unwrap_or_default(),
            scheduled_date,
            duration,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn validate_changes(self) -> Result<Self> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(AppError::Validation("title must not be empty".into()));
        }
        if self.aircraft.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(AppError::Validation("aircraft must not be empty".into()));
        }
        if let Some(duration) = self.duration {
            validate_duration(duration)?;
        }

        Ok(Self {
            title: optional(self.title),
            aircraft: optional(self.aircraft),
            attendees: self.attendees.map(dedup_ids),
            ..self
        })
    }

    pub fn apply_to(self, presentation: &mut Presentation) {
        if let Some(title) = self.title {
            presentation.title = title;
        }
        if let Some(description) = self.description {
            presentation.description = optional(Some(description));
        }
        if let Some(location) = self.location {
            presentation.location = optional(Some(location));
        }
        if let Some(aircraft) = self.aircraft {
            presentation.aircraft = aircraft;
        }
        if let Some(attendees) = self.attendees {
            presentation.attendees = attendees;
        }
        if let Some(status) = self.status {
            presentation.status = status;
        }
        if let Some(scheduled_date) = self.scheduled_date {
            presentation.scheduled_date = scheduled_date;
        }
        if let Some(duration) = self.duration {
            presentation.duration = duration;
        }
        presentation.updated_at = Utc::now();
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationView {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub aircraft: Option<AircraftSummary>,
    pub presenter: Option<PublicUser>,
    pub attendees: Vec<PublicUser>,
    pub status: PresentationStatus,
    pub scheduled_date: DateTime<Utc>,
    pub duration: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// === Responses ===

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub timestamp: DateTime<Utc>,
}

// === Errors ===

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ErrorResponse {
    pub fn new(code: &'static str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(password: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some("  pilot ".into()),
            email: Some(" Pilot@Example.COM ".into()),
            password: Some(password.into()),
            role: None,
        }
    }

    #[test]
    fn test_register_normalizes_and_defaults_role() {
        let user = register("secret1").validate().unwrap();
        assert_eq!(user.username, "pilot");
        assert_eq!(user.email, "pilot@example.com");
        assert_eq!(user.role, Role::Viewer);
    }

    #[test]
    fn test_register_rejects_short_password() {
        let err = register("12345").validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_register_rejects_unknown_role() {
        let mut req = register("secret1");
        req.role = Some("pilot".into());
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_normalize_email_requires_local_and_domain() {
        assert!(normalize_email("a@b").is_ok());
        assert!(normalize_email("@b").is_err());
        assert!(normalize_email("a@").is_err());
        assert!(normalize_email("ab").is_err());
        assert!(normalize_email("a@b@c").is_err());
    }

    #[test]
    fn test_aircraft_defaults() {
        let aircraft = AircraftRequest {
            tail_number: Some(" n12345 ".into()),
            model: Some("172".into()),
            manufacturer: Some("Cessna".into()),
            year: Some(1998),
            ..Default::default()
        }
        .into_aircraft("owner-1")
        .unwrap();

        assert_eq!(aircraft.tail_number, "N12345");
        assert_eq!(aircraft.status, AircraftStatus::Active);
        assert!(aircraft.specifications.is_empty());
        assert_eq!(aircraft.owner, "owner-1");
    }

    #[test]
    fn test_aircraft_requires_year() {
        let err = AircraftRequest {
            tail_number: Some("N1".into()),
            model: Some("172".into()),
            manufacturer: Some("Cessna".into()),
            ..Default::default()
        }
        .into_aircraft("owner-1")
        .unwrap_err();
        assert_eq!(err.to_string(), "year is required");
    }

    #[test]
    fn test_presentation_status_wire_names() {
        let status: PresentationStatus = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(status, PresentationStatus::InProgress);
    }

    #[test]
    fn test_presentation_dedups_attendees() {
        let presentation = PresentationRequest {
            title: Some("Walkaround".into()),
            aircraft: Some("a-1".into()),
            scheduled_date: Some(Utc::now()),
            duration: Some(30),
            attendees: Some(vec!["u1".into(), "u2".into(), "u1".into(), " ".into()]),
            ..Default::default()
        }
        .into_presentation("presenter")
        .unwrap();

        assert_eq!(presentation.attendees, vec!["u1", "u2"]);
        assert_eq!(presentation.status, PresentationStatus::Scheduled);
    }
}
