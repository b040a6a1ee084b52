/// Errors from the Jimeng API layer.
///
/// Every failure of the HTTP client is normalized into one of these
/// variants. [`code`](Self::code) gives the provider or HTTP code when one
/// exists, and [`payload`](Self::payload) the raw response for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum JimengError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Jimeng returned a non-2xx status code.
    #[error("Jimeng API error ({status}): {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The request reached Jimeng but was refused (`ret != "0"`).
    #[error("Jimeng rejected the request (ret={code}): {message}")]
    Rejected {
        code: String,
        message: String,
        payload: serde_json::Value,
    },

    /// The response could not be interpreted.
    #[error("Malformed Jimeng response: {message}")]
    Malformed {
        message: String,
        payload: Option<serde_json::Value>,
    },

    /// The client was configured with unusable credentials.
    #[error("Invalid Jimeng credentials: {0}")]
    InvalidCredentials(String),
}

impl JimengError {
    /// Provider or HTTP error code, if the failure carried one.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Http { status, .. } => Some(status.to_string()),
            Self::Rejected { code, .. } => Some(code.clone()),
            Self::Request(e) => e.status().map(|s| s.as_u16().to_string()),
            Self::Malformed { .. } | Self::InvalidCredentials(_) => None,
        }
    }

    /// Raw response payload, when one was received.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Rejected { payload, .. } => Some(payload),
            Self::Malformed { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// Human-readable message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Rejected { message, .. } | Self::Malformed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_exposes_code_and_payload() {
        let err = JimengError::Rejected {
            code: "1015".into(),
            message: "too many requests".into(),
            payload: serde_json::json!({"ret": "1015"}),
        };
        assert_eq!(err.code().as_deref(), Some("1015"));
        assert_eq!(err.payload().unwrap()["ret"], "1015");
        assert_eq!(err.message(), "too many requests");
    }

    #[test]
    fn http_error_code_is_status() {
        let err = JimengError::Http {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.code().as_deref(), Some("502"));
        assert!(err.payload().is_none());
    }

    #[test]
    fn malformed_has_no_code() {
        let err = JimengError::Malformed {
            message: "missing history id".into(),
            payload: None,
        };
        assert!(err.code().is_none());
        assert_eq!(err.message(), "missing history id");
    }
}
