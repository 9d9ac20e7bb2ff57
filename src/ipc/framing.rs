//! `[be64 length][length bytes of a ProtoPackage]` stream framing, grounded
//! on `other_app::on_process_connection`.
//!
//! Two Open Question behaviors are preserved verbatim rather than "fixed":
//! a zero-length frame advances the read pointer past its 8-byte header and
//! stops the current parse pass; a package that fails to decode advances
//! past the whole bad frame and also stops the pass (it does not resume to
//! process frames already queued behind it in the same buffer).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::proto::ProtoPackage;
use crate::reactor::ConnectionContext;

/// Matches the original's `ctx.get_recv_buffer_size() > 2048000` cap. Twice
/// the WebSocket transport's cap since IPC frames carry full tunnel envelopes.
pub const IPC_RECV_CAP: usize = 2_048_000;

/// Parses every complete, well-formed frame currently buffered. Stops (without
/// erroring) on the first zero-length or undecodable frame in a pass; the
/// caller is expected to call this again on the next readable event, which
/// resumes past whatever was skipped.
pub fn on_process_connection<C: ConnectionContext>(
    ctx: &mut C,
) -> Result<Vec<ProtoPackage>, Error> {
    if ctx.get_recv_buffer_size() > IPC_RECV_CAP {
        log::error!(
            "gid {} ipc recv buffer size {} exceeds cap",
            ctx.get_conn_gid(),
            ctx.get_recv_buffer_size()
        );
        ctx.set_conn_is_close(true);
        ctx.event_mod_deregister();
        return Ok(Vec::new());
    }

    let mut packages = Vec::new();

    loop {
        let data = ctx.recv_buffer();
        if data.len() < 8 {
            break;
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&data[0..8]);
        let data_size = u64::from_be_bytes(len_bytes) as usize;

        if data_size + 8 > data.len() {
            break;
        }

        if data_size == 0 {
            log::error!("gid {} ipc frame data_size == 0", ctx.get_conn_gid());
            ctx.recv_buffer_move_read_ptr_n(8);
            break;
        }

        let body = Bytes::copy_from_slice(&data[8..8 + data_size]);
        match ProtoPackage::decode(body) {
            Ok(package) => {
                ctx.recv_buffer_move_read_ptr_n(8 + data_size);
                packages.push(package);
            }
            Err(_) => {
                log::error!(
                    "gid {} ipc protoPackage parse failed, data_size {}",
                    ctx.get_conn_gid(),
                    data_size
                );
                ctx.recv_buffer_move_read_ptr_n(8 + data_size);
                break;
            }
        }
    }

    Ok(packages)
}

/// Wraps an already-encoded package with its 8-byte big-endian length header.
pub fn encode_frame(package: &ProtoPackage) -> Bytes {
    let body = package.encode();
    let mut buf = BytesMut::with_capacity(8 + body.len());
    buf.put_u64(body.len() as u64);
    buf.extend_from_slice(&body);
    buf.freeze()
}
