use thiserror::Error;

/// Failures of the photo and text analysis pipelines.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("task submission failed: {0}")]
    Submission(String),

    #[error("recognition timed out after {attempts} polls: {last_error}")]
    Timeout { attempts: u32, last_error: String },

    #[error("recognition task failed")]
    TaskFailed,

    #[error("unknown task status '{0}'")]
    UnknownStatus(String),

    #[error("could not parse response: {0}")]
    Parse(String),

    #[error("no food recognised")]
    NoData,

    #[error("rate limit reached for {service}, try again in a minute")]
    RateLimited { service: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("nothing to analyse")]
    EmptyInput,
}

impl AnalysisError {
    /// Transport and decoding errors, which a poll loop may retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Parse(_))
    }

    /// Short message suitable for showing to the person logging food.
    #[must_use]
    pub fn user_message(&self, photo: bool) -> String {
        match self {
            Self::RateLimited { .. } => self.to_string(),
            Self::EmptyInput => "Please enter what you ate".to_string(),
            _ if photo => "Could not recognise the photo, please try again".to_string(),
            _ => "Could not understand that description".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AnalysisError::Request("reset".into()).is_transient());
        assert!(AnalysisError::Parse("eof".into()).is_transient());
        assert!(!AnalysisError::TaskFailed.is_transient());
        assert!(!AnalysisError::UnknownStatus("WAT".into()).is_transient());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            AnalysisError::NoData.user_message(true),
            "Could not recognise the photo, please try again"
        );
        assert_eq!(
            AnalysisError::Parse("x".into()).user_message(false),
            "Could not understand that description"
        );
        let limited = AnalysisError::RateLimited {
            service: "vision".into(),
        };
        assert!(limited.user_message(true).contains("vision"));
    }
}
