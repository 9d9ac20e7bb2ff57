//! WebSocket frame reassembler and emitter (spec §4.1), the single largest
//! slice of the core budget (~25%).

pub mod reassembler;
pub mod writer;

pub use reassembler::WebSocketReassembler;
pub use writer::send_sync_package;

/// Receive-buffer and accumulated-payload cap shared by both directions
/// (spec §4.1 "Backpressure / abuse limits").
pub const MAX_BUFFERED_BYTES: usize = 1_024_000;
