use thiserror::Error;

/// The error taxonomy of the coordination core.
///
/// `RoleError` covers the leader-side `NODE_KILLED`/`NOT_LEADER` codes;
/// callers treat it exactly like `Transport` (clear leader, re-elect).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("communication error: {0}")]
    Transport(String),

    #[error("role error: {0}")]
    RoleError(String),

    #[error("topology error: {0}")]
    Topology(String),

    #[error("node is administratively killed")]
    Administrative,
}

impl CoreError {
    pub fn is_leader_loss(&self) -> bool {
        matches!(self, CoreError::Transport(_) | CoreError::RoleError(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
