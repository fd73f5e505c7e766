use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported at stream configuration/registration time.
///
/// The control loops themselves never fail; numeric hazards are handled by
/// clamping and flooring, and a missing stream lookup is an ordinary `None`.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("stream priority must be positive and finite")]
    ErrInvalidPriority,
    #[error("bitrate bounds must satisfy 0 < min <= max")]
    ErrInvalidBitrateBounds,
    #[error("hysteresis must be non-negative and finite")]
    ErrInvalidHysteresis,
    #[error("max RTP queue delay must be positive and finite")]
    ErrInvalidQueueDelay,
    #[error("rate history length must be at least 1")]
    ErrEmptyRateHistory,
    #[error("target rate scale bounds must satisfy 0 < min <= max")]
    ErrInvalidRateScaleBounds,
    #[error("smoothing factor must be within [0, 1]")]
    ErrInvalidSmoothing,
    #[error("a stream with this SSRC is already registered")]
    ErrDuplicateSsrc,
}
