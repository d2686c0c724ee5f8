use thiserror::Error;

/// A well-framed request that cannot be executed.
///
/// These are recoverable: the client gets the message back as an error
/// frame and the connection keeps serving requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Not a non-empty array headed by a string
    #[error("bad request")]
    BadRequest,

    #[error("unrecognized command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments")]
    WrongArity,

    /// A key argument that is not a bulk or simple string
    #[error("invalid key")]
    InvalidKey,
}

/// Result type for command handlers.
pub type CommandResult<T = crate::protocol::RespValue> = Result<T, CommandError>;
