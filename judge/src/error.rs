use thiserror::Error;

#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("judge: transport error: {0}")]
    Transport(String),

    #[error("judge: HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("judge: invalid verdict: {0}")]
    InvalidVerdict(String),
}

impl JudgeError {
    /// Returns true if repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            JudgeError::Transport(_) => true,
            JudgeError::Http { status, .. } => *status == 429 || *status >= 500,
            JudgeError::InvalidVerdict(_) => false,
        }
    }
}
