use thiserror::Error;

/// Substring PyPI puts in the fault string when it throttles a client.
pub const RATE_LIMIT_MARKER: &str = "HTTPTooManyRequests";

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML parsing failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML escaping failed: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("registry fault {code}: {message}")]
    Fault { code: i32, message: String },

    #[error("registry error: {0}")]
    Registry(String),

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("lack of information: {0}")]
    LackOfInformation(String),

    #[error("{0}")]
    Package(String),
}

impl Error {
    /// True for registry faults that indicate throttling; only these are
    /// worth retrying during the fetch step.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::Fault { message, .. } if message.contains(RATE_LIMIT_MARKER))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_matched_by_substring() {
        let err = Error::Fault {
            code: -32500,
            message: "HTTPTooManyRequests: The action could not be performed".to_string(),
        };
        assert!(err.is_rate_limit());
    }

    #[test]
    fn other_faults_are_not_rate_limits() {
        let err = Error::Fault {
            code: 1,
            message: "TypeError: unsupported argument".to_string(),
        };
        assert!(!err.is_rate_limit());
        assert!(!Error::Registry("503 Service Unavailable".to_string()).is_rate_limit());
    }
}
