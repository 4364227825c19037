use super::Connection;
use mio::Interest;

/// What a registered descriptor belongs to
///
/// Every token in the reactor's table maps to exactly one of these, and the
/// entry lives exactly as long as the descriptor's registration.
pub enum FileEvent {
    /// The listening socket, owned by the server itself
    Listener,
    /// A client socket and all of its state
    Connection(Connection),
}

impl FileEvent {
    /// Interest mask last registered for the descriptor
    pub fn interest(&self) -> Interest {
        match self {
            FileEvent::Listener => Interest::READABLE,
            FileEvent::Connection(conn) => conn.interest(),
        }
    }

    pub fn as_connection_mut(&mut self) -> Option<&mut Connection> {
        match self {
            FileEvent::Connection(conn) => Some(conn),
            FileEvent::Listener => None,
        }
    }

    pub fn into_connection(self) -> Option<Connection> {
        match self {
            FileEvent::Connection(conn) => Some(conn),
            FileEvent::Listener => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_binding() {
        let mut event = FileEvent::Listener;
        assert_eq!(event.interest(), Interest::READABLE);
        assert!(event.as_connection_mut().is_none());
        assert!(event.into_connection().is_none());
    }
}
