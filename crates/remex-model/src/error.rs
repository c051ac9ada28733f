use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("malformed stage uri '{uri}': {reason}")]
    MalformedStageUri { uri: String, reason: &'static str },

    #[error("failed to render job specification: {0}")]
    Render(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
