use thiserror::Error;

/// Failure surface for the netcode layer.
///
/// None of these are allowed to unwind past a tick: callers log and continue,
/// per the crate's tick-is-the-failure-boundary discipline.
#[derive(Debug, Error)]
pub enum GloopError {
    #[error("failed to send datagram: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("failed to receive datagram: {0}")]
    RecvFailed(#[source] std::io::Error),

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("connection timed out")]
    Timeout,

    #[error("rejected: {reason}")]
    Rejected { reason: String },

    #[error("simulated packet loss")]
    SimulatedLoss,

    #[error("simulated lag spike")]
    SimulatedSpike,

    #[error("update could not be applied consistently, deferring")]
    Inconsistent,
}

pub type Result<T> = std::result::Result<T, GloopError>;
