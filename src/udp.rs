//! UDP datagram ingestion into the other-process VM (spec §4.6), grounded
//! on `other_app::on_udp_server_recvfrom`: decode a bare `ProtoPackage` (no
//! length prefix — one datagram is one package), look the command up in the
//! factory, and hand the parsed message to the VM with the sender's address.
//! There is no implicit reply; anything sent back is a separate, explicit
//! `tunnel_forward`/send call from inside the VM.

use bytes::Bytes;

use crate::error::Error;
use crate::factory::MessageFactory;
use crate::messages::ProtoMessage;
use crate::proto::ProtoPackage;

/// One decoded inbound datagram, ready for `vm::dispatch_other_message`.
pub struct UdpMessage {
    pub cmd: i32,
    pub message: Box<dyn ProtoMessage>,
    pub from_ip: String,
    pub from_port: u16,
}

/// Parses one UDP datagram. A malformed envelope or an unregistered command
/// is a recoverable per-datagram error: log and drop, never close anything
/// (there is no connection to close).
pub fn on_recvfrom(
    factory: &MessageFactory,
    datagram: &[u8],
    from_ip: String,
    from_port: u16,
) -> Result<UdpMessage, Error> {
    let package = ProtoPackage::decode(Bytes::copy_from_slice(datagram))?;
    let message = factory.decode(package.cmd, &package.payload)?;
    Ok(UdpMessage {
        cmd: package.cmd,
        message,
        from_ip,
        from_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Command;
    use crate::messages::CsReqExample;

    #[test]
    fn valid_datagram_decodes_to_its_message() {
        let factory = MessageFactory::new();
        let inner = CsReqExample {
            testcontext: "PING".to_owned(),
        };
        let package = ProtoPackage::new(Command::CsReqExample, inner.encode());
        let encoded = package.encode();

        let parsed = on_recvfrom(&factory, &encoded, "127.0.0.1".to_owned(), 9000).unwrap();
        assert_eq!(parsed.cmd, Command::CsReqExample.code());
        assert_eq!(parsed.from_port, 9000);
        let decoded = parsed
            .message
            .as_any()
            .downcast_ref::<CsReqExample>()
            .unwrap();
        assert_eq!(decoded.testcontext, "PING");
    }

    #[test]
    fn truncated_datagram_is_a_decode_error() {
        let factory = MessageFactory::new();
        assert!(on_recvfrom(&factory, b"a", "127.0.0.1".to_owned(), 9000).is_err());
    }

    #[test]
    fn unregistered_command_is_an_error() {
        let factory = MessageFactory::new();
        let package = ProtoPackage {
            cmd: 9999,
            payload: Bytes::new(),
        };
        let encoded = package.encode();
        assert!(on_recvfrom(&factory, &encoded, "127.0.0.1".to_owned(), 9000).is_err());
    }
}
