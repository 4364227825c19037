mod connection;
mod event;
mod multiplexer;

pub use connection::{Connection, FlushStatus, ReadStatus};
pub use event::FileEvent;
pub use multiplexer::{Multiplexer, Readiness};
