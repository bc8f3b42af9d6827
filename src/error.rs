/// Failures surfaced by the track generator API.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("coordinate ({latitude}, {longitude}) is outside latitude [-90, 90] / longitude [-180, 180]")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("invalid simulator configuration: {0}")]
    InvalidConfig(String),

    /// `start` was called outside of a tokio runtime.
    #[error("track generator must be started from within a tokio runtime")]
    NoRuntime,

    #[error("sample sink failed")]
    Sink(#[source] anyhow::Error),

    #[error("track worker ended abnormally")]
    Worker(#[from] tokio::task::JoinError),
}
