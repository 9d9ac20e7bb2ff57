//! Frames one logical message back out onto the wire (spec §4.1 "Emission"),
//! grounded on `original_source/src/app/websocket_app.cpp`'s
//! `send_sync_package` and the teacher's `src/write.rs` header-building style.

use crate::error::Error;
use crate::frame::OpCode;
use crate::reactor::ConnectionContext;
use crate::websocket::MAX_BUFFERED_BYTES;

/// Wraps `payload` in a single unmasked, FIN-set BINARY frame and queues it
/// on `ctx`. Servers never mask outbound frames (RFC 6455 §5.1). Closes the
/// connection if the send buffer is left over the shared backpressure cap.
pub fn send_sync_package<C: ConnectionContext>(ctx: &mut C, payload: &[u8]) -> Result<(), Error> {
    let mut header = Vec::with_capacity(10);
    header.push(0b1000_0000 | OpCode::Binary.as_u8());

    let len = payload.len();
    if len <= 125 {
        header.push(len as u8);
    } else if len <= u16::MAX as usize {
        header.push(126);
        header.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        header.push(127);
        header.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let projected_size = ctx.get_send_buffer_size() + header.len() + payload.len();
    if projected_size > MAX_BUFFERED_BYTES {
        log::error!(
            "gid {} send would grow send buffer to {}, exceeding cap, closing",
            ctx.get_conn_gid(),
            projected_size
        );
        ctx.set_conn_is_close(true);
        ctx.event_mod_deregister();
        return Err(Error::SendBufferOverflow {
            cap: MAX_BUFFERED_BYTES,
        });
    }

    ctx.send_data(&header)?;
    ctx.send_data(payload)?;

    Ok(())
}
