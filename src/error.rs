//! Venue-boundary error classification.
//!
//! Everything coming back from an exchange is folded into `VenueError` so the
//! stream driver can decide between backoff (transient) and row-level skips
//! (malformed). None of these are fatal to the process.

#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("rate limited (http {status})")]
    RateLimited { status: u16 },

    #[error("server error (http {status})")]
    Server { status: u16 },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl VenueError {
    /// Transient failures resume after backoff; malformed payloads are also
    /// retried on the next poll, they just never abort the stream.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, VenueError::RateLimited { .. })
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            VenueError::Malformed(err.to_string())
        } else {
            VenueError::Transport(err)
        }
    }
}
