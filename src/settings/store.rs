use std::ops::RangeInclusive;

use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::info;

use crate::db::models::{ControlMode, RelayState, ThresholdConfig};

pub const THRESHOLD_ROW_ID: i64 = 1;

/// Accepted range for both temperature thresholds, in °C.
pub const TEMP_RANGE: RangeInclusive<f64> = -50.0..=100.0;
/// Accepted range for the humidity threshold, in %RH.
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

// ---------------------------------------------------------------------------
// Row-level helpers (shared with ingestion and manual control)
// ---------------------------------------------------------------------------

async fn fetch(conn: &mut SqliteConnection) -> sqlx::Result<Option<ThresholdConfig>> {
    sqlx::query_as("SELECT * FROM threshold_config WHERE threshold_id = ?")
        .bind(THRESHOLD_ROW_ID)
        .fetch_optional(conn)
        .await
}

/// Fetch the singleton config row, inserting the defaults first if the table
/// is empty. Returns the row and whether it had to be created.
///
/// Every endpoint that lazily creates the row goes through here, so the
/// bootstrap values (mode AUTO included) are identical on all code paths.
pub async fn load_or_init(conn: &mut SqliteConnection) -> sqlx::Result<(ThresholdConfig, bool)> {
    if let Some(config) = fetch(conn).await? {
        return Ok((config, false));
    }

    // INSERT OR IGNORE keeps a concurrent initialisation from failing the
    // slower writer; whoever lost the race re-reads the winner's row.
    let defaults = ThresholdConfig::default();
    sqlx::query(
        "INSERT OR IGNORE INTO threshold_config \
         (threshold_id, temp_high_threshold, temp_low_threshold, humidity_threshold, control_mode, current_relay_state) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(defaults.threshold_id)
    .bind(defaults.temp_high_threshold)
    .bind(defaults.temp_low_threshold)
    .bind(defaults.humidity_threshold)
    .bind(defaults.control_mode)
    .bind(defaults.current_relay_state)
    .execute(&mut *conn)
    .await?;

    info!("threshold config row created with defaults");
    let config = fetch(conn).await?.ok_or(sqlx::Error::RowNotFound)?;
    Ok((config, true))
}

pub async fn set_relay_state(conn: &mut SqliteConnection, state: RelayState) -> sqlx::Result<()> {
    sqlx::query("UPDATE threshold_config SET current_relay_state = ? WHERE threshold_id = ?")
        .bind(state)
        .bind(THRESHOLD_ROW_ID)
        .execute(conn)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Update screening
// ---------------------------------------------------------------------------

/// The validated subset of fields an update request will actually write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdUpdate {
    pub temp_high_threshold: Option<f64>,
    pub temp_low_threshold: Option<f64>,
    pub humidity_threshold: Option<f64>,
    pub control_mode: Option<ControlMode>,
}

impl ThresholdUpdate {
    pub fn is_empty(&self) -> bool {
        self.temp_high_threshold.is_none()
            && self.temp_low_threshold.is_none()
            && self.humidity_threshold.is_none()
            && self.control_mode.is_none()
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ScreenedUpdate {
    pub update: ThresholdUpdate,
    /// Fields that were present in the input but unparseable or out of range.
    pub dropped: Vec<&'static str>,
}

/// Screen a raw update payload (query parameters or JSON body) into the
/// subset that will be written. Absent fields stay untouched; present but
/// unparseable or out-of-range fields are dropped and reported, never
/// applied and never fatal.
pub fn screen_update(input: &Value) -> ScreenedUpdate {
    let mut screened = ScreenedUpdate::default();

    screen_number(
        input,
        "temp_high_threshold",
        &TEMP_RANGE,
        &mut screened.update.temp_high_threshold,
        &mut screened.dropped,
    );
    screen_number(
        input,
        "temp_low_threshold",
        &TEMP_RANGE,
        &mut screened.update.temp_low_threshold,
        &mut screened.dropped,
    );
    screen_number(
        input,
        "humidity_threshold",
        &HUMIDITY_RANGE,
        &mut screened.update.humidity_threshold,
        &mut screened.dropped,
    );

    if let Some(raw) = input.get("auto_relay") {
        match parse_mode_flag(raw) {
            Some(mode) => screened.update.control_mode = Some(mode),
            None => screened.dropped.push("auto_relay"),
        }
    }

    screened
}

fn screen_number(
    input: &Value,
    field: &'static str,
    range: &RangeInclusive<f64>,
    slot: &mut Option<f64>,
    dropped: &mut Vec<&'static str>,
) {
    let Some(raw) = input.get(field) else { return };
    match coerce_f64(raw) {
        Some(value) if range.contains(&value) => *slot = Some(value),
        _ => dropped.push(field),
    }
}

/// Accept JSON numbers and numeric strings (query parameters arrive as
/// strings); anything else is not a number.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse the two-state relay-mode flag from the small set of accepted forms:
/// `"yes" | "1" | 1 | true` → AUTO, `"no" | "0" | 0 | false` → MANUAL.
///
/// Everything else is rejected, so a typo can never silently flip the mode.
pub fn parse_mode_flag(value: &Value) -> Option<ControlMode> {
    match value {
        Value::Bool(true) => Some(ControlMode::Auto),
        Value::Bool(false) => Some(ControlMode::Manual),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(ControlMode::Auto),
            Some(0) => Some(ControlMode::Manual),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "yes" | "1" => Some(ControlMode::Auto),
            "no" | "0" => Some(ControlMode::Manual),
            _ => None,
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

pub struct UpdateOutcome {
    pub previous: ThresholdConfig,
    pub current: ThresholdConfig,
    pub affected_rows: u64,
}

#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read the config row, creating it with defaults when absent.
    pub async fn get_or_init(&self) -> sqlx::Result<(ThresholdConfig, bool)> {
        let mut tx = self.pool.begin().await?;
        let loaded = load_or_init(&mut tx).await?;
        tx.commit().await?;
        Ok(loaded)
    }

    /// Apply exactly the fields carried by `update` to the config row and
    /// return the previous and final values for confirmation.
    ///
    /// The ensure-read-update-reread sequence runs in one transaction, so a
    /// concurrent writer can never be half-observed.
    pub async fn apply_update(&self, update: &ThresholdUpdate) -> sqlx::Result<UpdateOutcome> {
        let mut tx = self.pool.begin().await?;
        let (previous, _) = load_or_init(&mut tx).await?;

        if update.is_empty() {
            // still commit: the row may have just been lazily created
            tx.commit().await?;
            let current = previous.clone();
            return Ok(UpdateOutcome {
                previous,
                current,
                affected_rows: 0,
            });
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE threshold_config SET ");
        let mut assignments = builder.separated(", ");
        if let Some(value) = update.temp_high_threshold {
            assignments
                .push("temp_high_threshold = ")
                .push_bind_unseparated(value);
        }
        if let Some(value) = update.temp_low_threshold {
            assignments
                .push("temp_low_threshold = ")
                .push_bind_unseparated(value);
        }
        if let Some(value) = update.humidity_threshold {
            assignments
                .push("humidity_threshold = ")
                .push_bind_unseparated(value);
        }
        if let Some(mode) = update.control_mode {
            assignments.push("control_mode = ").push_bind_unseparated(mode);
        }
        builder.push(" WHERE threshold_id = ").push_bind(THRESHOLD_ROW_ID);

        let affected_rows = builder.build().execute(&mut *tx).await?.rows_affected();
        let current = fetch(&mut tx).await?.ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;

        info!(
            affected_rows,
            mode = ?current.control_mode,
            "threshold config updated"
        );
        Ok(UpdateOutcome {
            previous,
            current,
            affected_rows,
        })
    }
}
