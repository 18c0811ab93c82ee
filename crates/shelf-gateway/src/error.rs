//! Gateway errors

use std::time::Duration;

use shelf_core::ShelfError;
use thiserror::Error;

/// Gateway sync errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Connect failure or transport error
    #[error("Gateway unreachable: {0}")]
    Unavailable(String),

    #[error("Gateway did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The Gateway answered with something the engine cannot use
    #[error("Invalid Gateway payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    /// Whether the Gateway could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidPayload(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

impl From<GatewayError> for ShelfError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidPayload(msg) => ShelfError::InvalidRequest(msg),
            other => ShelfError::GatewayUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_to_shelf_error() {
        let err: ShelfError = GatewayError::Timeout(Duration::from_secs(1)).into();
        assert_eq!(err.code(), ShelfError::GatewayUnavailable(String::new()).code());

        let err: ShelfError = GatewayError::InvalidPayload("slots".into()).into();
        assert!(matches!(err, ShelfError::InvalidRequest(_)));
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(GatewayError::Unavailable("refused".into()).is_unavailable());
        assert!(GatewayError::Timeout(Duration::from_millis(5)).is_unavailable());
        assert!(
            !GatewayError::Status {
                status: 500,
                body: String::new()
            }
            .is_unavailable()
        );
    }
}
