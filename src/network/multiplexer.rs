use crate::error::{Error, Result};
use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use std::io::{self, ErrorKind};
use std::time::Duration;

/// Readiness observed for one registered descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// Both directions of the peer are gone
    pub hangup: bool,
    pub error: bool,
}

impl Readiness {
    fn from_event(event: &mio::event::Event) -> Self {
        Self {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            hangup: event.is_read_closed() && event.is_write_closed(),
            error: event.is_error(),
        }
    }
}

/// Kernel readiness notification with a reusable event batch
///
/// mio reports readiness edge-triggered. Handlers drain sockets until
/// `WouldBlock`, and re-registering interest re-reports current readiness, so
/// nothing is lost between cycles.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    registrations: usize,
}

impl Multiplexer {
    /// Create a multiplexer whose wait calls return at most `capacity` events
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity),
            registrations: 0,
        })
    }

    pub fn register<S>(&mut self, source: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().register(source, token, interest)?;
        self.registrations += 1;
        Ok(())
    }

    pub fn reregister<S>(&mut self, source: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().reregister(source, token, interest)?;
        Ok(())
    }

    /// Remove a descriptor
    ///
    /// The registration is counted as gone even if the kernel call fails, since
    /// the caller is about to close the descriptor anyway.
    pub fn deregister<S>(&mut self, source: &mut S) -> Result<()>
    where
        S: Source + ?Sized,
    {
        self.registrations = self.registrations.saturating_sub(1);
        self.poll.registry().deregister(source)?;
        Ok(())
    }

    /// Wait for readiness and copy the batch into `ready`
    ///
    /// `None` blocks until something is ready. An interrupted wait yields an
    /// empty batch; any other failure is fatal for the reactor.
    pub fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> Result<usize> {
        ready.clear();

        if !wait_outcome(self.poll.poll(&mut self.events, timeout))? {
            return Ok(0);
        }

        ready.extend(self.events.iter().map(Readiness::from_event));
        Ok(ready.len())
    }

    /// Number of descriptors currently registered
    pub fn registrations(&self) -> usize {
        self.registrations
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }
}

/// `Ok(false)` for an interrupted wait, `Error::Poll` for any other failure
fn wait_outcome(result: io::Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::Interrupted => Ok(false),
        Err(e) => Err(Error::Poll(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::{TcpListener, TcpStream};
    use nix::sys::pthread::{pthread_kill, pthread_self};
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use std::io::Write;
    use std::sync::mpsc;

    #[test]
    fn tracks_registrations() {
        let mut mux = Multiplexer::new(8).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        assert_eq!(mux.registrations(), 0);
        mux.register(&mut listener, Token(0), Interest::READABLE)
            .unwrap();
        assert_eq!(mux.registrations(), 1);
        mux.deregister(&mut listener).unwrap();
        assert_eq!(mux.registrations(), 0);
        assert_eq!(mux.capacity(), 8);
    }

    #[test]
    fn timeout_returns_empty_batch() {
        let mut mux = Multiplexer::new(8).unwrap();
        let mut ready = vec![Readiness {
            token: Token(42),
            readable: true,
            writable: false,
            hangup: false,
            error: false,
        }];

        let n = mux
            .wait(Some(Duration::from_millis(10)), &mut ready)
            .unwrap();
        assert_eq!(n, 0);
        assert!(ready.is_empty());
    }

    #[test]
    fn reports_listener_and_stream_readiness() {
        let mut mux = Multiplexer::new(8).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        mux.register(&mut listener, Token(0), Interest::READABLE)
            .unwrap();

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        let mut ready = Vec::new();

        let mut accepted: Option<TcpStream> = None;
        for _ in 0..50 {
            mux.wait(Some(Duration::from_millis(20)), &mut ready)
                .unwrap();
            if ready.iter().any(|r| r.token == Token(0) && r.readable) {
                let (stream, _) = listener.accept().unwrap();
                accepted = Some(stream);
                break;
            }
        }
        let mut stream = accepted.expect("listener never became readable");
        mux.register(&mut stream, Token(1), Interest::READABLE)
            .unwrap();

        client.write_all(&[1, 2, 3]).unwrap();
        let mut seen = false;
        for _ in 0..50 {
            mux.wait(Some(Duration::from_millis(20)), &mut ready)
                .unwrap();
            if ready.iter().any(|r| r.token == Token(1) && r.readable) {
                seen = true;
                break;
            }
        }
        assert!(seen);
        assert_eq!(mux.registrations(), 2);
    }

    extern "C" fn wake(_: nix::libc::c_int) {}

    #[test]
    fn interrupted_wait_yields_empty_batch() {
        let action = SigAction::new(SigHandler::Handler(wake), SaFlags::empty(), SigSet::empty());
        // SAFETY: the handler does nothing
        unsafe { sigaction(Signal::SIGUSR1, &action) }.unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = std::thread::spawn(move || {
            let mut mux = Multiplexer::new(8).unwrap();
            let mut ready = Vec::new();
            tx.send(pthread_self()).unwrap();
            let n = mux.wait(None, &mut ready).map_err(|e| e.to_string());
            (n, ready.len())
        });

        // Keep signalling: a signal landing before the wait starts is lost
        let thread = rx.recv().unwrap();
        while !waiter.is_finished() {
            let _ = pthread_kill(thread, Signal::SIGUSR1);
            std::thread::sleep(Duration::from_millis(20));
        }

        let (n, len) = waiter.join().unwrap();
        assert_eq!(n, Ok(0));
        assert_eq!(len, 0);
    }

    #[test]
    fn wait_failures_are_fatal_except_interrupts() {
        assert!(wait_outcome(Ok(())).unwrap());
        assert!(!wait_outcome(Err(io::Error::from(ErrorKind::Interrupted))).unwrap());

        let err = wait_outcome(Err(io::Error::from_raw_os_error(nix::libc::EBADF))).unwrap_err();
        assert!(matches!(err, Error::Poll(_)));
        assert!(err.is_fatal());
    }
}
