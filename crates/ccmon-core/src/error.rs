use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unknown session status: {0}")]
    UnknownStatus(String),

    #[error("status \"{0}\" cannot be set directly; delete the session instead")]
    StatusNotSettable(String),
}
