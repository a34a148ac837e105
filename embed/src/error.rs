use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embed: empty input")]
    EmptyInput,

    #[error("embed: transport error: {0}")]
    Transport(String),

    #[error("embed: HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("embed: invalid response: {0}")]
    InvalidResponse(String),

    #[error("embed: missing embedding for index {0}")]
    MissingIndex(usize),

    #[error("embed: unexpected embedding index {index} for batch size {batch_size}")]
    UnexpectedIndex { index: usize, batch_size: usize },
}

impl EmbedError {
    /// Returns true if repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Transport(_) => true,
            EmbedError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbedError::Transport("reset".into()).is_transient());
        assert!(EmbedError::Http { status: 503, body: String::new() }.is_transient());
        assert!(EmbedError::Http { status: 429, body: String::new() }.is_transient());
        assert!(!EmbedError::Http { status: 400, body: String::new() }.is_transient());
        assert!(!EmbedError::EmptyInput.is_transient());
        assert!(!EmbedError::MissingIndex(0).is_transient());
    }
}
