use thiserror::Error;

#[derive(Error, Debug)]
pub enum VecError {
    #[error("vecstore: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("vecstore: empty vector for {0}")]
    EmptyVector(String),

    #[error("vecstore: backend unavailable: {0}")]
    Unavailable(String),

    #[error("vecstore: {0}")]
    Backend(String),
}

impl VecError {
    /// Returns true if repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, VecError::Unavailable(_))
    }
}
