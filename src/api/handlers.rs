use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    extract::{Query, State},
    Form, Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

use super::{
    dto::{
        now_stamp, AuthResponse, IngestResponse, LatestReadingResponse, ReadingsResponse,
        RelayControlResponse, SensorReadingDto, SystemStatus, ThresholdValues,
        ThresholdsResponse, UpdateDebugInfo, UpdateThresholdsResponse, UserPayload,
    },
    errors::ApiFailure,
    AppState,
};
use crate::control::ManualControlError;
use crate::db::models::{ControlMode, DetectionState, RelayState};
use crate::sensors::{service::resolve_limit, TelemetrySample};
use crate::settings::store::screen_update;
use crate::users::AuthError;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Raw telemetry query parameters. Everything is optional and parsed
/// leniently: a flaky device must still get a relay command back.
#[derive(Debug, Deserialize)]
pub struct IngestParams {
    pub temp: Option<String>,
    pub hum: Option<String>,
    pub motion: Option<String>,
    pub vibration: Option<String>,
    pub relay: Option<String>,
}

impl IngestParams {
    fn into_sample(self) -> TelemetrySample {
        TelemetrySample {
            temperature: lenient_f64(self.temp.as_deref()),
            humidity: lenient_f64(self.hum.as_deref()),
            motion: lenient_enum(self.motion.as_deref()),
            vibration: lenient_enum(self.vibration.as_deref()),
            reported_relay: lenient_enum(self.relay.as_deref()),
        }
    }
}

fn lenient_f64(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0.0)
}

fn lenient_enum<T: FromStr + Default>(raw: Option<&str>) -> T {
    raw.and_then(|s| s.parse().ok()).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct RelayControlParams {
    pub relay_state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReadingsParams {
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CredentialsForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

// ---------------------------------------------------------------------------
// Device-facing handlers
// ---------------------------------------------------------------------------

/// Ingest one telemetry sample and reply with the arbitrated relay command.
///
/// Never fails outward: if persistence breaks, the device still receives a
/// well-formed envelope commanding the relay OFF.
#[utoipa::path(
    get,
    path = "/telemetry/ingest",
    params(
        ("temp" = Option<String>, Query, description = "Temperature in °C; malformed values degrade to 0"),
        ("hum" = Option<String>, Query, description = "Relative humidity in %; malformed values degrade to 0"),
        ("motion" = Option<String>, Query, description = "DETECTED or CLEAR (default CLEAR)"),
        ("vibration" = Option<String>, Query, description = "DETECTED or CLEAR (default CLEAR)"),
        ("relay" = Option<String>, Query, description = "Device-reported relay state; informational only"),
    ),
    responses(
        (status = 200, description = "Relay command for the device", body = IngestResponse),
    ),
    tag = "telemetry"
)]
pub async fn ingest_telemetry(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
) -> Json<IngestResponse> {
    let sample = params.into_sample();
    match state.telemetry.ingest(&sample).await {
        Ok(outcome) => Json(IngestResponse::success(&outcome)),
        Err(e) => {
            error!(error = %e, "telemetry ingestion failed; answering fallback command");
            Json(IngestResponse::fallback())
        }
    }
}

/// Operator relay override. Requires MANUAL mode; `relay_state` must be
/// exactly `ON` or `OFF`.
#[utoipa::path(
    get,
    path = "/relay/manual",
    params(
        ("relay_state" = Option<String>, Query, description = "ON or OFF, case-sensitive (default OFF)"),
    ),
    responses(
        (status = 200, description = "Override applied, or an error envelope when in AUTO mode", body = RelayControlResponse),
    ),
    tag = "relay"
)]
pub async fn set_relay(
    State(state): State<AppState>,
    Query(params): Query<RelayControlParams>,
) -> Result<Json<RelayControlResponse>, ApiFailure> {
    let raw = params.relay_state.unwrap_or_else(|| "OFF".to_owned());
    let requested: RelayState = raw
        .parse()
        .map_err(|_| ApiFailure::message("Invalid relay state. Use 'ON' or 'OFF'"))?;

    state.relay.set_manual(requested).await.map_err(|e| match e {
        ManualControlError::AutoModeActive => ApiFailure::message(e.to_string()),
        ManualControlError::Store(e) => e.into(),
    })?;

    Ok(Json(RelayControlResponse {
        status: "success".into(),
        message: format!("Manual relay control: {requested}"),
        relay_state: requested,
        control_reason: "manual_app_control".into(),
        timestamp: now_stamp(),
    }))
}

// ---------------------------------------------------------------------------
// Dashboard handlers
// ---------------------------------------------------------------------------

/// Latest reading plus the derived system status headline.
#[utoipa::path(
    get,
    path = "/readings/latest",
    responses(
        (status = 200, description = "Latest reading, or a no_data envelope", body = LatestReadingResponse),
    ),
    tag = "readings"
)]
pub async fn get_latest_reading(
    State(state): State<AppState>,
) -> Result<Json<LatestReadingResponse>, ApiFailure> {
    let latest = state.telemetry.latest_reading().await?;
    let system_status = SystemStatus::from_latest(latest.as_ref());

    Ok(Json(match latest {
        Some(reading) => LatestReadingResponse {
            status: "success".into(),
            message: None,
            data: Some(reading.into()),
            system_status,
            timestamp: now_stamp(),
        },
        None => LatestReadingResponse {
            status: "no_data".into(),
            message: Some("No sensor data found in database".into()),
            data: None,
            system_status,
            timestamp: now_stamp(),
        },
    }))
}

/// Paged history, oldest first, with the latest reading and the table total.
#[utoipa::path(
    get,
    path = "/readings",
    params(
        ("limit" = Option<String>, Query, description = "Rows to return; default 20, maximum 500"),
    ),
    responses(
        (status = 200, description = "Page of readings", body = ReadingsResponse),
    ),
    tag = "readings"
)]
pub async fn get_readings(
    State(state): State<AppState>,
    Query(params): Query<ReadingsParams>,
) -> Result<Json<ReadingsResponse>, ApiFailure> {
    let limit = resolve_limit(params.limit.as_deref());
    let page = state.telemetry.reading_page(limit).await?;

    let data: Vec<SensorReadingDto> = page.readings.into_iter().map(Into::into).collect();
    Ok(Json(ReadingsResponse {
        status: "success".into(),
        count_in_response: data.len(),
        data,
        latest_reading: page.latest.map(Into::into),
        total_records_in_table: page.total,
        limit_applied: limit,
    }))
}

// ---------------------------------------------------------------------------
// Threshold configuration handlers
// ---------------------------------------------------------------------------

/// Current thresholds, mode and relay command, creating the config row with
/// defaults when the table is still empty.
#[utoipa::path(
    get,
    path = "/thresholds",
    responses(
        (status = 200, description = "Current configuration", body = ThresholdsResponse),
    ),
    tag = "thresholds"
)]
pub async fn get_thresholds(
    State(state): State<AppState>,
) -> Result<Json<ThresholdsResponse>, ApiFailure> {
    let (config, created) = state.settings.get_or_init().await?;

    Ok(Json(ThresholdsResponse {
        status: "success".into(),
        temp_threshold: config.temp_high_threshold,
        temp_low_threshold: config.temp_low_threshold,
        hum_threshold: config.humidity_threshold,
        auto_relay: config.control_mode == ControlMode::Auto,
        relay_command: config.current_relay_state,
        relay_reason: if created { "default" } else { "system" }.into(),
    }))
}

/// Partial threshold/mode update from query parameters.
#[utoipa::path(
    get,
    path = "/thresholds/update",
    params(
        ("temp_high_threshold" = Option<String>, Query, description = "New high temperature threshold, [-50, 100]"),
        ("temp_low_threshold" = Option<String>, Query, description = "New low temperature threshold, [-50, 100]"),
        ("humidity_threshold" = Option<String>, Query, description = "New humidity threshold, [0, 100]"),
        ("auto_relay" = Option<String>, Query, description = "yes/1 for AUTO, no/0 for MANUAL"),
    ),
    responses(
        (status = 200, description = "Update confirmation with previous and final values", body = UpdateThresholdsResponse),
    ),
    tag = "thresholds"
)]
pub async fn update_thresholds_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<UpdateThresholdsResponse>, ApiFailure> {
    let input = Value::Object(
        params
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    );
    apply_threshold_update(&state, &input).await
}

/// Partial threshold/mode update from a JSON body.
#[utoipa::path(
    post,
    path = "/thresholds/update",
    request_body(content = String, description = "JSON object with any subset of temp_high_threshold, temp_low_threshold, humidity_threshold, auto_relay"),
    responses(
        (status = 200, description = "Update confirmation with previous and final values", body = UpdateThresholdsResponse),
    ),
    tag = "thresholds"
)]
pub async fn update_thresholds_post(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<UpdateThresholdsResponse>, ApiFailure> {
    let input: Value =
        serde_json::from_str(&body).map_err(|_| ApiFailure::message("No input data received"))?;
    apply_threshold_update(&state, &input).await
}

async fn apply_threshold_update(
    state: &AppState,
    input: &Value,
) -> Result<Json<UpdateThresholdsResponse>, ApiFailure> {
    let Some(fields) = input.as_object() else {
        return Err(ApiFailure::message("No input data received"));
    };
    if fields.is_empty() {
        return Err(ApiFailure::message("No input data received"));
    }

    let screened = screen_update(input);
    if screened.update.is_empty() {
        return Err(ApiFailure::message("No valid fields to update"));
    }

    let outcome = state.settings.apply_update(&screened.update).await?;
    let message = if outcome.affected_rows > 0 {
        "Settings updated successfully"
    } else {
        "Settings confirmed (no changes needed)"
    };

    Ok(Json(UpdateThresholdsResponse {
        status: "success".into(),
        message: message.into(),
        affected_rows: outcome.affected_rows,
        updated_values: (&outcome.current).into(),
        debug_info: UpdateDebugInfo {
            previous_values: (&outcome.previous).into(),
            dropped_fields: screened.dropped.iter().map(ToString::to_string).collect(),
        },
        timestamp: now_stamp(),
    }))
}

// ---------------------------------------------------------------------------
// User handlers
// ---------------------------------------------------------------------------

/// Register a new account.
#[utoipa::path(
    post,
    path = "/users/register",
    request_body(content = CredentialsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Registration outcome", body = AuthResponse),
    ),
    tag = "users"
)]
pub async fn register_user(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Result<Json<AuthResponse>, ApiFailure> {
    match state.users.register(&form.email, &form.password).await {
        Ok(account) => Ok(Json(AuthResponse {
            status: "success".into(),
            message: "Registration successful".into(),
            data: Some(UserPayload {
                user_id: account.user_id,
                user_email: account.user_email,
            }),
        })),
        Err(e) => Err(auth_failure(e)),
    }
}

/// Verify credentials and return the account identity.
#[utoipa::path(
    post,
    path = "/users/login",
    request_body(content = CredentialsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login outcome", body = AuthResponse),
    ),
    tag = "users"
)]
pub async fn login_user(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Result<Json<AuthResponse>, ApiFailure> {
    match state.users.login(&form.email, &form.password).await {
        Ok(account) => Ok(Json(AuthResponse {
            status: "success".into(),
            message: "Login successful".into(),
            data: Some(UserPayload {
                user_id: account.user_id,
                user_email: account.user_email,
            }),
        })),
        Err(e) => Err(auth_failure(e)),
    }
}

/// Validation failures keep their specific message; store and hashing
/// failures are logged and answered generically.
fn auth_failure(e: AuthError) -> ApiFailure {
    match e {
        AuthError::Store(e) => e.into(),
        AuthError::Hash(e) => {
            error!(error = %e, "password hashing failed");
            ApiFailure::message("Server error processing request. Check server logs.")
        }
        other => ApiFailure::message(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        ingest_telemetry,
        set_relay,
        get_latest_reading,
        get_readings,
        get_thresholds,
        update_thresholds_get,
        update_thresholds_post,
        register_user,
        login_user,
        health,
    ),
    components(schemas(
        IngestResponse,
        RelayControlResponse,
        LatestReadingResponse,
        ReadingsResponse,
        ThresholdsResponse,
        UpdateThresholdsResponse,
        ThresholdValues,
        UpdateDebugInfo,
        AuthResponse,
        UserPayload,
        CredentialsForm,
        SensorReadingDto,
        SystemStatus,
        RelayState,
        DetectionState,
        ControlMode,
    )),
    tags(
        (name = "telemetry", description = "Device-facing telemetry ingestion"),
        (name = "relay", description = "Manual relay control"),
        (name = "readings", description = "Stored sensor readings"),
        (name = "thresholds", description = "Threshold and mode configuration"),
        (name = "users", description = "Registration and login"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "Home Guardian API",
        version = "0.1.0",
        description = "REST API for the home monitoring backend: telemetry ingestion, relay arbitration, thresholds and user accounts"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
