//! Fatal run errors
//!
//! Anything surfacing as a `FlowError` aborts the run and rolls back its edit session.
//! Per-edge and per-flag problems never become a `FlowError`; they are reported as
//! diagnostics or failed outcomes instead.

use crate::network::output::OutputError;
use crate::storage::StoreError;

#[derive(Debug)]
pub enum FlowError {
    Store(StoreError),
    Output(OutputError),
}

impl From<StoreError> for FlowError {
    fn from(err: StoreError) -> Self {
        FlowError::Store(err)
    }
}

impl From<OutputError> for FlowError {
    fn from(err: OutputError) -> Self {
        FlowError::Output(err)
    }
}

impl std::fmt::Display for FlowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowError::Store(e) => write!(f, "Storage error: {}", e),
            FlowError::Output(e) => write!(f, "Output error: {}", e),
        }
    }
}

impl std::error::Error for FlowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlowError::Store(e) => Some(e),
            FlowError::Output(e) => Some(e),
        }
    }
}

/// Close an edit session after a run body
///
/// Commits when `outcome` is `Ok`, otherwise rolls back and returns the original
/// error. A failed rollback is logged; the run error still wins.
pub(crate) fn finish_session<T>(
    session: &mut dyn crate::storage::EditSession,
    outcome: Result<T, FlowError>,
) -> Result<T, FlowError> {
    match outcome {
        Ok(value) => {
            session.commit()?;
            log::info!("💾 Edits saved");
            Ok(value)
        }
        Err(e) => {
            log::error!("❌ {}", e);
            match session.rollback() {
                Ok(()) => log::warn!("↩️  Stopped editing and no changes were saved"),
                Err(rollback_err) => log::error!("Rollback failed: {}", rollback_err),
            }
            Err(e)
        }
    }
}
