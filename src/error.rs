use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Waiting on the multiplexer failed; the reactor cannot continue.
    #[error("Event poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Response of {count} ids exceeds the limit of {limit}")]
    ResponseTooLarge { count: usize, limit: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("System error: {0}")]
    System(#[from] nix::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error ends the reactor rather than a single connection
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Poll(_))
    }

    /// Whether the error is an expected way for a peer to go away
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_poll_failures_are_fatal() {
        assert!(Error::Poll(io::Error::other("epoll_wait")).is_fatal());
        assert!(!Error::Io(io::Error::other("read")).is_fatal());
        assert!(!Error::Protocol("short frame".into()).is_fatal());
    }

    #[test]
    fn peer_resets_count_as_disconnects() {
        let reset = Error::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());
        assert!(Error::ConnectionClosed.is_disconnect());
        assert!(!Error::Protocol("oversized frame".into()).is_disconnect());
    }

    #[test]
    fn oversized_response_message() {
        let err = Error::ResponseTooLarge {
            count: 10,
            limit: 4,
        };
        assert_eq!(
            err.to_string(),
            "Response of 10 ids exceeds the limit of 4"
        );
    }
}
