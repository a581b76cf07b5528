use storage::repository::{TrackingStore, TrackingTx};

use crate::error::EngineError;

/// Opens a tracking transaction.
pub(crate) async fn begin(tracking: &dyn TrackingStore) -> Result<Box<dyn TrackingTx>, EngineError> {
    Ok(tracking.begin().await?)
}

/// Commits when `result` is `Ok`, otherwise rolls back and surfaces the
/// original error.
pub(crate) async fn finish<T>(
    tx: Box<dyn TrackingTx>,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, cause = %err, "rollback failed");
            }
            Err(err)
        }
    }
}
