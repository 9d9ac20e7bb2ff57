//! Wire envelopes (spec §3): `ProtoPackage`, `TunnelPackage`, and the two
//! worker↔other envelopes. The protocol-buffer wire codec itself is out of
//! this system's scope (spec §1); what follows is a schema-equivalent binary
//! codec in the same byte-banging style the teacher uses for frame headers
//! (`src/write.rs`, `src/read.rs`): big-endian length-prefixed fields via
//! `bytes::{Buf, BufMut}`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::ids::{Command, TunnelId};

/// `{cmd, payload_bytes}` — the innermost wire envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoPackage {
    pub cmd: i32,
    pub payload: Bytes,
}

impl ProtoPackage {
    pub fn new(cmd: Command, payload: Bytes) -> Self {
        Self {
            cmd: cmd.code(),
            payload,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.payload.len());
        buf.put_i32(self.cmd);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, Error> {
        if bytes.len() < 4 {
            return Err(Error::PackageDecodeError);
        }
        let cmd = bytes.get_i32();
        Ok(Self {
            cmd,
            payload: bytes,
        })
    }
}

/// Outer envelope wrapping a [`ProtoPackage`] with routing metadata. Never
/// forwarded back to `source_tunnel_id` (spec §4.3 self-delivery policy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelPackage {
    pub source_tunnel_id: TunnelId,
    pub destination_tunnel_ids: Vec<TunnelId>,
    pub inner: ProtoPackage,
}

/// `{gid, worker_idx, inner}` emitted by workers on every client-origin event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker2OtherLuaVm {
    pub gid: u64,
    pub worker_idx: i32,
    pub inner: ProtoPackage,
}

impl Worker2OtherLuaVm {
    pub fn encode(&self) -> Bytes {
        let inner = self.inner.encode();
        let mut buf = BytesMut::with_capacity(16 + inner.len());
        buf.put_u64(self.gid);
        buf.put_i32(self.worker_idx);
        buf.put_u32(inner.len() as u32);
        buf.put_slice(&inner);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, Error> {
        if bytes.len() < 16 {
            return Err(Error::PackageDecodeError);
        }
        let gid = bytes.get_u64();
        let worker_idx = bytes.get_i32();
        let inner_len = bytes.get_u32() as usize;
        if bytes.len() < inner_len {
            return Err(Error::PackageDecodeError);
        }
        let inner = ProtoPackage::decode(bytes.split_to(inner_len))?;
        Ok(Self {
            gid,
            worker_idx,
            inner,
        })
    }
}

/// `{gid, worker_idx, inner}` emitted by the other-VM to reach one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherLuaVm2WorkerConn {
    pub gid: u64,
    pub worker_idx: i32,
    pub inner: ProtoPackage,
}

impl OtherLuaVm2WorkerConn {
    pub fn encode(&self) -> Bytes {
        let inner = self.inner.encode();
        let mut buf = BytesMut::with_capacity(16 + inner.len());
        buf.put_u64(self.gid);
        buf.put_i32(self.worker_idx);
        buf.put_u32(inner.len() as u32);
        buf.put_slice(&inner);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, Error> {
        if bytes.len() < 16 {
            return Err(Error::PackageDecodeError);
        }
        let gid = bytes.get_u64();
        let worker_idx = bytes.get_i32();
        let inner_len = bytes.get_u32() as usize;
        if bytes.len() < inner_len {
            return Err(Error::PackageDecodeError);
        }
        let inner = ProtoPackage::decode(bytes.split_to(inner_len))?;
        Ok(Self {
            gid,
            worker_idx,
            inner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_package_round_trips() {
        let pkg = ProtoPackage::new(Command::CsReqExample, Bytes::from_static(b"HELLO"));
        let encoded = pkg.encode();
        let decoded = ProtoPackage::decode(encoded).unwrap();
        assert_eq!(decoded.cmd, Command::CsReqExample.code());
        assert_eq!(&decoded.payload[..], b"HELLO");
    }

    #[test]
    fn worker2other_envelope_round_trips_nested_package() {
        let inner = ProtoPackage::new(Command::CsReqExample, Bytes::from_static(b"HELLO"));
        let envelope = Worker2OtherLuaVm {
            gid: 7,
            worker_idx: 2,
            inner,
        };
        let decoded = Worker2OtherLuaVm::decode(envelope.encode()).unwrap();
        assert_eq!(decoded.gid, 7);
        assert_eq!(decoded.worker_idx, 2);
        assert_eq!(decoded.inner.cmd, Command::CsReqExample.code());
    }

    #[test]
    fn truncated_package_is_a_decode_error() {
        assert!(ProtoPackage::decode(Bytes::from_static(b"ab")).is_err());
    }
}
