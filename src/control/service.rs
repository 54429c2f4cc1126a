use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use crate::db::models::{ControlMode, RelayState};
use crate::settings::store;

#[derive(Debug, Error)]
pub enum ManualControlError {
    #[error("Cannot control relay manually while in auto mode. Switch to manual mode first.")]
    AutoModeActive,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Operator-facing relay override. Separate from the arbiter: this path only
/// ever runs for explicit `/relay/manual` requests.
#[derive(Clone)]
pub struct RelayControlService {
    pool: SqlitePool,
}

impl RelayControlService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply an operator override to `current_relay_state`.
    ///
    /// Only legal in MANUAL mode. The mode check and the write share one
    /// transaction so a concurrent mode flip cannot slip in between them.
    /// Thresholds and mode are never touched here.
    pub async fn set_manual(&self, requested: RelayState) -> Result<(), ManualControlError> {
        let mut tx = self.pool.begin().await?;
        let (config, _) = store::load_or_init(&mut tx).await?;

        if config.control_mode == ControlMode::Auto {
            return Err(ManualControlError::AutoModeActive);
        }

        store::set_relay_state(&mut tx, requested).await?;
        tx.commit().await?;

        info!(state = %requested, "manual relay override applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::store::THRESHOLD_ROW_ID;

    async fn stored_relay_state(pool: &SqlitePool) -> RelayState {
        sqlx::query_scalar("SELECT current_relay_state FROM threshold_config WHERE threshold_id = ?")
            .bind(THRESHOLD_ROW_ID)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn override_rejected_in_auto_mode(pool: SqlitePool) {
        let service = RelayControlService::new(pool.clone());

        let err = service.set_manual(RelayState::On).await.unwrap_err();
        assert!(matches!(err, ManualControlError::AutoModeActive));
        assert!(err.to_string().contains("Switch to manual mode first"));

        // the guard ran against a lazily created default row and wrote nothing
        assert_eq!(stored_relay_state(&pool).await, RelayState::Off);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn override_applies_in_manual_mode(pool: SqlitePool) {
        sqlx::query(
            "INSERT INTO threshold_config \
             (threshold_id, temp_high_threshold, temp_low_threshold, humidity_threshold, control_mode, current_relay_state) \
             VALUES (1, 30.0, 18.0, 90.0, 'MANUAL', 'OFF')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let service = RelayControlService::new(pool.clone());
        service.set_manual(RelayState::On).await.unwrap();
        assert_eq!(stored_relay_state(&pool).await, RelayState::On);

        service.set_manual(RelayState::Off).await.unwrap();
        assert_eq!(stored_relay_state(&pool).await, RelayState::Off);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn override_never_touches_thresholds_or_mode(pool: SqlitePool) {
        sqlx::query(
            "INSERT INTO threshold_config \
             (threshold_id, temp_high_threshold, temp_low_threshold, humidity_threshold, control_mode, current_relay_state) \
             VALUES (1, 25.5, 10.0, 70.0, 'MANUAL', 'OFF')",
        )
        .execute(&pool)
        .await
        .unwrap();

        RelayControlService::new(pool.clone())
            .set_manual(RelayState::On)
            .await
            .unwrap();

        let (high, low, humidity, mode): (f64, f64, f64, ControlMode) = sqlx::query_as(
            "SELECT temp_high_threshold, temp_low_threshold, humidity_threshold, control_mode \
             FROM threshold_config WHERE threshold_id = 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(high, 25.5);
        assert_eq!(low, 10.0);
        assert_eq!(humidity, 70.0);
        assert_eq!(mode, ControlMode::Manual);
    }
}
