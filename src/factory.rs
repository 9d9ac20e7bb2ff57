//! Command → typed-message factory (spec §4.4).
//!
//! The single authority that turns `(cmd, bytes)` into a typed, parsed
//! message. Built once during main-VM initialisation by enumerating every
//! known [`Command`] and registering a zero-argument constructor for its
//! schema type; subsequently read-only and shared by replication across
//! processes (spec §5 "Shared resource policy").

use std::collections::HashMap;

use crate::error::Error;
use crate::ids::Command;
use crate::messages::{self, ProtoMessage};

type Constructor = fn() -> Option<Box<dyn ProtoMessage>>;

#[derive(Clone)]
pub struct MessageFactory {
    constructors: HashMap<i32, Constructor>,
}

impl MessageFactory {
    /// Builds the factory by enumerating `Command::ALL`, mirroring
    /// `lua_plugin::init_message_factory` in the original source.
    pub fn new() -> Self {
        let mut constructors: HashMap<i32, Constructor> = HashMap::new();
        for cmd in Command::ALL {
            constructors.insert(cmd.code(), command_constructor(cmd));
        }
        Self { constructors }
    }

    /// Returns a fresh empty message of the type registered for `cmd`, or
    /// `None` if `cmd` is unregistered (spec: "Unknown command is a
    /// recoverable error: log and drop").
    pub fn protobuf_cmd2message(&self, cmd: i32) -> Option<Box<dyn ProtoMessage>> {
        self.constructors.get(&cmd).copied().and_then(|ctor| ctor())
    }

    /// Convenience: look up, construct, and decode in one step.
    pub fn decode(&self, cmd: i32, bytes: &[u8]) -> Result<Box<dyn ProtoMessage>, Error> {
        let mut message = self
            .protobuf_cmd2message(cmd)
            .ok_or(Error::UnknownCommand { cmd })?;
        message
            .decode(bytes)
            .map_err(|_| Error::MessageDecodeError { cmd })?;
        Ok(message)
    }
}

impl Default for MessageFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn command_constructor(cmd: Command) -> Constructor {
    match cmd {
        Command::IpcStreamAuthHandshake => {
            || messages::empty_message_for(Command::IpcStreamAuthHandshake)
        }
        Command::CsReqExample => || messages::empty_message_for(Command::CsReqExample),
        Command::TunnelWorker2OtherLuaVm => {
            || messages::empty_message_for(Command::TunnelWorker2OtherLuaVm)
        }
        Command::TunnelOtherLuaVm2WorkerConn => {
            || messages::empty_message_for(Command::TunnelOtherLuaVm2WorkerConn)
        }
        Command::TunnelWorker2OtherEventNewClientConnection => || {
            messages::empty_message_for(Command::TunnelWorker2OtherEventNewClientConnection)
        },
        Command::TunnelWorker2OtherEventCloseClientConnection => || {
            messages::empty_message_for(Command::TunnelWorker2OtherEventCloseClientConnection)
        },
        Command::TunnelOther2WorkerTest => {
            || messages::empty_message_for(Command::TunnelOther2WorkerTest)
        }
        Command::OtherLuaVm2WorkerCloseClientConnection => {
            || messages::empty_message_for(Command::OtherLuaVm2WorkerCloseClientConnection)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CsReqExample, ProtoMessage as _};

    #[test]
    fn registered_command_constructs_and_decodes() {
        let factory = MessageFactory::new();
        let original = CsReqExample {
            testcontext: "HELLO".to_owned(),
        };
        let decoded = factory
            .decode(Command::CsReqExample.code(), &original.encode())
            .unwrap();
        let decoded = decoded.as_any().downcast_ref::<CsReqExample>().unwrap();
        assert_eq!(decoded.testcontext, "HELLO");
    }

    #[test]
    fn unregistered_command_is_none() {
        let factory = MessageFactory::new();
        assert!(factory.protobuf_cmd2message(9999).is_none());
        assert!(matches!(
            factory.decode(9999, &[]),
            Err(Error::UnknownCommand { cmd: 9999 })
        ));
    }

    #[test]
    fn envelope_commands_have_no_generic_message() {
        let factory = MessageFactory::new();
        assert!(factory
            .protobuf_cmd2message(Command::TunnelWorker2OtherLuaVm.code())
            .is_none());
        assert!(factory
            .protobuf_cmd2message(Command::TunnelOtherLuaVm2WorkerConn.code())
            .is_none());
    }
}
