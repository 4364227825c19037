use crate::error::{Error, Result};
use crate::index::SpatialIndex;
use crate::protocol::{decode_request, encode_response, BoundingBox, REQUEST_LEN};
use bytes::BytesMut;
use mio::net::TcpStream;
use mio::Interest;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;

const READ_CHUNK: usize = 64;

/// Outcome of draining the socket on read readiness
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadStatus {
    /// Nothing arrived (spurious wakeup)
    Idle,
    /// A complete request frame
    Request(BoundingBox),
    /// Orderly shutdown with no request pending
    Closed,
}

/// Outcome of flushing the outbound buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Everything staged has been written (or nothing was staged)
    Done,
    /// The socket stopped accepting data; wait for the next writable event
    Partial,
}

/// A connected query client
///
/// Requests are served lockstep: one 16-byte frame in, one response out, and
/// the socket is not read again until that response is fully flushed.
pub struct Connection {
    stream: TcpStream,
    addr: SocketAddr,

    // Read cursor over the frame being assembled
    frame: [u8; REQUEST_LEN],
    filled: usize,

    write_buffer: BytesMut,
    write_position: usize,

    interest: Interest,
    peer_closed: bool,
    max_response_ids: usize,
    requests_served: u64,
}

impl Connection {
    pub fn new(stream: TcpStream, addr: SocketAddr, max_response_ids: usize) -> Self {
        Self {
            stream,
            addr,
            frame: [0u8; REQUEST_LEN],
            filled: 0,
            write_buffer: BytesMut::new(),
            write_position: 0,
            interest: Interest::READABLE | Interest::WRITABLE,
            peer_closed: false,
            max_response_ids,
            requests_served: 0,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Requests answered over the connection's lifetime
    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Interest mask last registered for this socket
    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    /// Interest the connection needs given its current state
    pub fn desired_interest(&self) -> Interest {
        if self.has_pending_writes() {
            Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// The peer half-closed after its last request
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn has_pending_writes(&self) -> bool {
        self.write_position < self.write_buffer.len()
    }

    pub fn pending_writes(&self) -> &[u8] {
        &self.write_buffer[self.write_position..]
    }

    /// Drain the socket into the frame cursor
    ///
    /// A read burst must hold exactly one frame. Fewer bytes when the socket
    /// runs dry, or any byte beyond the frame, is a protocol violation.
    pub fn read_request(&mut self) -> Result<ReadStatus> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.peer_closed = true;
                    break;
                }
                Ok(n) => {
                    let total = self.filled + n;
                    if total > REQUEST_LEN {
                        return Err(Error::Protocol(format!(
                            "oversized frame: got at least {} bytes, need {}",
                            total, REQUEST_LEN
                        )));
                    }
                    self.frame[self.filled..total].copy_from_slice(&chunk[..n]);
                    self.filled = total;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match self.filled {
            0 if self.peer_closed => Ok(ReadStatus::Closed),
            0 => Ok(ReadStatus::Idle),
            REQUEST_LEN => {
                self.filled = 0;
                Ok(ReadStatus::Request(decode_request(&self.frame)))
            }
            n => Err(Error::Protocol(format!(
                "short frame: got {} bytes, need {}",
                n, REQUEST_LEN
            ))),
        }
    }

    /// Run `bbox` against `index` and stage the encoded ids
    ///
    /// Returns the number of ids staged.
    pub fn answer<I>(&mut self, index: &I, bbox: &BoundingBox) -> Result<usize>
    where
        I: SpatialIndex + ?Sized,
    {
        let ids = index.query_bounding_box(bbox);

        if !self.has_pending_writes() {
            self.write_buffer.clear();
            self.write_position = 0;
        }
        encode_response(&ids, self.max_response_ids, &mut self.write_buffer)?;

        self.requests_served += 1;
        Ok(ids.len())
    }

    /// Write staged bytes until done or the socket would block
    pub fn flush(&mut self) -> Result<FlushStatus> {
        while self.has_pending_writes() {
            match self.stream.write(&self.write_buffer[self.write_position..]) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => self.write_position += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(FlushStatus::Partial),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        self.write_buffer.clear();
        self.write_position = 0;
        Ok(FlushStatus::Done)
    }
}
