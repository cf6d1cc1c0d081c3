//! Error types for the detection pipeline

use crate::models::ModelKind;
use thiserror::Error;

/// Errors surfaced by the detection pipeline
#[derive(Debug, Error)]
pub enum DetectorError {
    /// An artifact for this model kind could not be loaded
    #[error("{kind} model unavailable: {reason}")]
    ModelUnavailable { kind: ModelKind, reason: String },

    /// The forward pass failed or produced an unusable output
    #[error("{kind} inference failed: {reason}")]
    Inference { kind: ModelKind, reason: String },

    /// The reference dataset has no rows to offer
    #[error("no samples available from reference dataset")]
    NoData,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DetectorError {
    pub(crate) fn unavailable(kind: ModelKind, err: &anyhow::Error) -> Self {
        // {:#} keeps the whole context chain on one line
        DetectorError::ModelUnavailable {
            kind,
            reason: format!("{:#}", err),
        }
    }

    pub(crate) fn inference(kind: ModelKind, err: &anyhow::Error) -> Self {
        DetectorError::Inference {
            kind,
            reason: format!("{:#}", err),
        }
    }

    /// True when the failure is a missing or broken artifact
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DetectorError::ModelUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
