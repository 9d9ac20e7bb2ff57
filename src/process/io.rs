//! A concrete, minimal [`ConnectionContext`] backing for a `tokio::net::TcpStream`.
//!
//! The spec treats the byte-level reactor as an external collaborator with
//! only its interface specified (spec §6); this is the bundled runtime's own
//! implementation of that interface, non-blocking via `try_read`/`try_write`
//! rather than a full epoll-style poller.

use std::io;

use tokio::net::TcpStream;

use crate::ids::ConnectionId;
use crate::reactor::ConnectionContext;

pub struct BufferedConnection {
    stream: TcpStream,
    recv: Vec<u8>,
    send: Vec<u8>,
    gid: ConnectionId,
    worker_idx: i32,
    closed: bool,
}

impl BufferedConnection {
    pub fn new(stream: TcpStream, gid: ConnectionId, worker_idx: i32) -> Self {
        Self {
            stream,
            recv: Vec::new(),
            send: Vec::new(),
            gid,
            worker_idx,
            closed: false,
        }
    }

    /// Waits for the socket to become readable; the caller then drains it
    /// with [`try_fill_recv`](Self::try_fill_recv).
    pub async fn readable(&self) -> io::Result<()> {
        self.stream.readable().await
    }

    /// Drains whatever is currently available into the receive buffer.
    /// Returns `Ok(0)` once the peer has performed an orderly shutdown.
    pub fn try_fill_recv(&mut self) -> io::Result<usize> {
        let mut scratch = [0u8; 8192];
        let mut total = 0;
        loop {
            match self.stream.try_read(&mut scratch) {
                Ok(0) => {
                    if total == 0 {
                        self.closed = true;
                    }
                    break;
                }
                Ok(n) => {
                    self.recv.extend_from_slice(&scratch[..n]);
                    total += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Pushes as much of the outgoing buffer onto the socket as it accepts.
    pub fn try_flush_send(&mut self) -> io::Result<()> {
        while !self.send.is_empty() {
            match self.stream.try_write(&self.send) {
                Ok(n) => {
                    self.send.drain(0..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ConnectionContext for BufferedConnection {
    fn get_recv_buffer_size(&self) -> usize {
        self.recv.len()
    }

    fn recv_buffer(&self) -> &[u8] {
        &self.recv
    }

    fn recv_buffer_move_read_ptr_n(&mut self, n: usize) {
        self.recv.drain(0..n);
    }

    fn get_send_buffer_size(&self) -> usize {
        self.send.len()
    }

    fn send_data(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.send.extend_from_slice(bytes);
        self.try_flush_send()?;
        Ok(bytes.len())
    }

    fn set_conn_is_close(&mut self, close: bool) {
        self.closed = close;
    }

    fn is_conn_close(&self) -> bool {
        self.closed
    }

    fn event_mod_deregister(&mut self) {
        self.closed = true;
    }

    fn get_conn_gid(&self) -> ConnectionId {
        self.gid
    }

    fn get_worker_idx(&self) -> i32 {
        self.worker_idx
    }
}
