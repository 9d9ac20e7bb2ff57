//! Concrete structured-message schema types a [`crate::factory::MessageFactory`]
//! can construct and parse a [`crate::proto::ProtoPackage`] payload into.
//!
//! Grounded on the payload shapes named in `original_source/src/app/other_app.cpp`
//! and `websocket_app.cpp` (`ProtoIPCStreamAuthHandshake`, `ProtoCSReqExample`,
//! `ProtoTunnelOther2WorkerTest`, the two `Worker2OtherEvent*` markers).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::any::Any;
use std::fmt::Debug;

use crate::error::Error;
use crate::ids::Command;

/// Base type every registered message implements, standing in for the
/// dynamic `google::protobuf::Message` base class the original factory
/// (`lua_plugin::protobuf_cmd2message`) hands out.
pub trait ProtoMessage: Debug + Send + Sync {
    fn decode(&mut self, bytes: &[u8]) -> Result<(), Error>;
    fn encode(&self) -> Bytes;
    fn as_any(&self) -> &dyn Any;
}

fn get_string(buf: &mut Bytes) -> Result<String, Error> {
    if buf.remaining() < 4 {
        return Err(Error::PackageDecodeError);
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(Error::PackageDecodeError);
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|source| Error::FromUtf8Error { source })
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

/// First message exchanged on every IPC-stream connection (spec §4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthHandshake {
    pub appid: String,
}

impl ProtoMessage for AuthHandshake {
    fn decode(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut buf = Bytes::copy_from_slice(bytes);
        self.appid = get_string(&mut buf)?;
        Ok(())
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.appid);
        buf.freeze()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Canonical client request used throughout the end-to-end scenarios (spec §8).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsReqExample {
    pub testcontext: String,
}

impl ProtoMessage for CsReqExample {
    fn decode(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut buf = Bytes::copy_from_slice(bytes);
        self.testcontext = get_string(&mut buf)?;
        Ok(())
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.testcontext);
        buf.freeze()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewClientConnection {
    pub gid: u64,
}

impl ProtoMessage for NewClientConnection {
    fn decode(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() < 8 {
            return Err(Error::PackageDecodeError);
        }
        self.gid = Bytes::copy_from_slice(bytes).get_u64();
        Ok(())
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u64(self.gid);
        buf.freeze()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseClientConnection {
    pub gid: u64,
}

impl ProtoMessage for CloseClientConnection {
    fn decode(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() < 8 {
            return Err(Error::PackageDecodeError);
        }
        self.gid = Bytes::copy_from_slice(bytes).get_u64();
        Ok(())
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u64(self.gid);
        buf.freeze()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Periodic (>=5s) health broadcast from other to every worker (spec §4.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Other2WorkerTest {
    pub time: i64,
}

impl ProtoMessage for Other2WorkerTest {
    fn decode(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() < 8 {
            return Err(Error::PackageDecodeError);
        }
        self.time = Bytes::copy_from_slice(bytes).get_i64();
        Ok(())
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_i64(self.time);
        buf.freeze()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The sentinel close-client command carried as `inner.cmd` inside an
/// `OtherLuaVm2WorkerConn` envelope (spec §4.3). Its payload is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseClientCommand;

impl ProtoMessage for CloseClientCommand {
    fn decode(&mut self, _bytes: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn encode(&self) -> Bytes {
        Bytes::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Constructs a fresh, empty message for `cmd`, or `None` when `cmd` names an
/// envelope type routed by [`crate::tunnel`] directly rather than parsed
/// through the generic factory (`TunnelWorker2OtherLuaVm`,
/// `TunnelOtherLuaVm2WorkerConn` — see `proto::Worker2OtherLuaVm` /
/// `proto::OtherLuaVm2WorkerConn`).
pub fn empty_message_for(cmd: Command) -> Option<Box<dyn ProtoMessage>> {
    match cmd {
        Command::IpcStreamAuthHandshake => Some(Box::<AuthHandshake>::default()),
        Command::CsReqExample => Some(Box::<CsReqExample>::default()),
        Command::TunnelWorker2OtherLuaVm => None,
        Command::TunnelOtherLuaVm2WorkerConn => None,
        Command::TunnelWorker2OtherEventNewClientConnection => {
            Some(Box::<NewClientConnection>::default())
        }
        Command::TunnelWorker2OtherEventCloseClientConnection => {
            Some(Box::<CloseClientConnection>::default())
        }
        Command::TunnelOther2WorkerTest => Some(Box::<Other2WorkerTest>::default()),
        Command::OtherLuaVm2WorkerCloseClientConnection => {
            Some(Box::<CloseClientCommand>::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cs_req_example_round_trips() {
        let msg = CsReqExample {
            testcontext: "HELLO".to_owned(),
        };
        let encoded = msg.encode();
        let mut decoded = CsReqExample::default();
        decoded.decode(&encoded).unwrap();
        assert_eq!(decoded.testcontext, "HELLO");
    }

    #[test]
    fn auth_handshake_round_trips() {
        let msg = AuthHandshake {
            appid: "peer-a".to_owned(),
        };
        let mut decoded = AuthHandshake::default();
        decoded.decode(&msg.encode()).unwrap();
        assert_eq!(decoded.appid, "peer-a");
    }
}
