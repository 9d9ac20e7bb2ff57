//! The reactor contract consumed from the I/O layer (spec §6). This system
//! does not implement a generic byte-level socket reactor — that is an
//! external collaborator (spec §1) — it only specifies the shape every
//! connection context exposes to the framing/dispatch code in this crate.

use crate::ids::ConnectionId;

/// Everything the WebSocket reassembler, IPC framer, and tunnel dispatcher
/// need from a connection's owning reactor. A real deployment backs this
/// with an epoll/io_uring event loop; tests and the bundled process runtime
/// back it with an in-memory buffer (see `process::io::BufferedConnection`).
pub trait ConnectionContext {
    fn get_recv_buffer_size(&self) -> usize;
    /// Borrowed view of the unread portion of the receive buffer, standing
    /// in for the source's raw `get_recv_buffer_read_ptr()`.
    fn recv_buffer(&self) -> &[u8];
    fn recv_buffer_move_read_ptr_n(&mut self, n: usize);

    fn get_send_buffer_size(&self) -> usize;
    /// Queues `bytes` for the wire. Returns the number of bytes accepted.
    fn send_data(&mut self, bytes: &[u8]) -> std::io::Result<usize>;

    fn set_conn_is_close(&mut self, close: bool);
    fn is_conn_close(&self) -> bool;

    /// Deregisters read/write interest. A no-op for contexts not backed by
    /// a real reactor (e.g. in tests); real implementations forward to
    /// `event_mod` on the underlying poller.
    fn event_mod_deregister(&mut self);

    fn get_conn_gid(&self) -> ConnectionId;
    fn get_worker_idx(&self) -> i32;
}
