use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Template processing failed: {0}")]
    Processing(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VmiError {
    /// True for required lookups that came back empty, whether reported by
    /// this crate or by the API server as a 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            VmiError::NotFound(_) => true,
            VmiError::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}

pub type Result<T, E = VmiError> = std::result::Result<T, E>;
