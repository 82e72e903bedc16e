use crate::object::Handle;
use thiserror::Error;

/// Rejected admission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmitError {
    /// The object already has an entry waiting in the queue.
    #[error("object {0} is already queued")]
    AlreadyQueued(Handle),
}

/// Failure while saving or restoring a queue.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("unsupported queue format version {0}")]
    UnsupportedVersion(u32),

    #[error("queue payload codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// The body decoded cleanly but was followed by unread data.
    #[error("queue payload has {0} trailing bytes")]
    TrailingBytes(usize),

    /// The payload names the same object twice.
    #[error("object {0} appears twice in the queue payload")]
    DuplicateEntry(Handle),
}

/// Failure to bring up the timer thread.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to build timer runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[source] std::io::Error),
}
