//! Error taxonomy
//!
//! Every collaborator failure is converted into a typed substitute at the
//! component that made the call. These errors describe why the substitute was
//! needed; none of them is allowed to abort a cycle.

use std::fmt;
use thiserror::Error;

use crate::signal::SignalSource;

/// Failure talking to a generative collaborator
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("collaborator returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response was not valid JSON: {0}")]
    Decode(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis call failed: {0}")]
    Call(#[from] CollaboratorError),

    #[error("synthesis timed out after {0} ms")]
    Timeout(u64),

    #[error("synthesis response violated schema: {0}")]
    Schema(String),
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review call failed: {0}")]
    Call(#[from] CollaboratorError),

    #[error("review timed out after {0} ms")]
    Timeout(u64),

    #[error("review response violated schema: {0}")]
    Schema(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Non-fatal conditions the pipeline records while it keeps going
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineFault {
    UpstreamSignalMissing { symbol: String, source: SignalSource, reason: String },
    SynthesisFailure { symbol: String, reason: String },
    ValidationFailure { symbol: String, reason: String },
    CacheFailure { key: String, reason: String },
    ThresholdRejected { symbol: String, composite: f64, threshold: f64 },
}

impl fmt::Display for PipelineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineFault::UpstreamSignalMissing { symbol, source, reason } => {
                write!(f, "{} signal missing for {}: {}", source, symbol, reason)
            }
            PipelineFault::SynthesisFailure { symbol, reason } => {
                write!(f, "synthesis failed for {}: {}", symbol, reason)
            }
            PipelineFault::ValidationFailure { symbol, reason } => {
                write!(f, "validation unavailable for {}: {}", symbol, reason)
            }
            PipelineFault::CacheFailure { key, reason } => {
                write!(f, "cache failure on {}: {}", key, reason)
            }
            PipelineFault::ThresholdRejected { symbol, composite, threshold } => {
                write!(f, "{} rejected: composite {:.3} below gate {:.3}", symbol, composite, threshold)
            }
        }
    }
}
