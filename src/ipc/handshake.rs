//! The IPC auth handshake state machine (spec §4.2), grounded on
//! `other_app::on_new_connection_remote2this` and the
//! `PROTO_CMD_IPC_STREAM_AUTH_HANDSHAKE` branch of `on_recv_package`.

use bytes::Bytes;

use crate::error::Error;
use crate::ids::{AppId, Command, ConnectionId};
use crate::ipc::framing::encode_frame;
use crate::ipc::table::AuthTable;
use crate::messages::{AuthHandshake, ProtoMessage};
use crate::proto::ProtoPackage;
use crate::reactor::ConnectionContext;

fn auth_handshake_frame(local_app_id: &AppId) -> Bytes {
    let message = AuthHandshake {
        appid: local_app_id.as_str().to_owned(),
    };
    let package = ProtoPackage::new(Command::IpcStreamAuthHandshake, message.encode());
    encode_frame(&package)
}

/// Called right after accepting an inbound IPC connection: this side
/// announces its own app id first ("this -- whoami --> remote"), before any
/// handshake frame has arrived from the peer.
pub fn on_new_connection_remote2this<C: ConnectionContext>(
    ctx: &mut C,
    local_app_id: &AppId,
) -> Result<(), Error> {
    ctx.send_data(&auth_handshake_frame(local_app_id))?;
    Ok(())
}

/// Handles one received `IpcStreamAuthHandshake` payload. `is_outbound`
/// means this process dialed the peer; in that case this side has not yet
/// announced itself and must echo its own handshake before attempting the
/// bind, matching the original's `is_this2remote` asymmetry (preserved as-is,
/// not "fixed" — see spec §4.2 Open Questions).
pub fn on_ipc_auth_handshake<C: ConnectionContext>(
    ctx: &mut C,
    is_outbound: bool,
    payload: &[u8],
    table: &mut AuthTable,
    local_app_id: &AppId,
) -> Result<(), Error> {
    if is_outbound {
        ctx.send_data(&auth_handshake_frame(local_app_id))?;
    }

    let mut incoming = AuthHandshake::default();
    incoming.decode(payload)?;

    let gid = ctx.get_conn_gid();
    let appid = AppId::new(incoming.appid);
    let succ = table.bind(gid, appid.clone());

    if succ {
        log::error!(
            "{{appId {}, auth_gid {}}} insert to authenticated_ipc_pair succ",
            appid,
            gid
        );
    } else {
        log::error!(
            "{{appId {}, auth_gid {}}} insert to authenticated_ipc_pair failed",
            appid,
            gid
        );
    }

    Ok(())
}

/// Removes whatever binding this connection held, matching
/// `other_app::on_close_connection`.
pub fn on_close_connection(gid: ConnectionId, table: &mut AuthTable) {
    table.unbind(gid);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeConn {
        send: Vec<u8>,
        gid: ConnectionId,
    }

    impl ConnectionContext for FakeConn {
        fn get_recv_buffer_size(&self) -> usize {
            0
        }
        fn recv_buffer(&self) -> &[u8] {
            &[]
        }
        fn recv_buffer_move_read_ptr_n(&mut self, _n: usize) {}
        fn get_send_buffer_size(&self) -> usize {
            self.send.len()
        }
        fn send_data(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
            self.send.extend_from_slice(bytes);
            Ok(bytes.len())
        }
        fn set_conn_is_close(&mut self, _close: bool) {}
        fn is_conn_close(&self) -> bool {
            false
        }
        fn event_mod_deregister(&mut self) {}
        fn get_conn_gid(&self) -> ConnectionId {
            self.gid
        }
        fn get_worker_idx(&self) -> i32 {
            0
        }
    }

    #[test]
    fn inbound_handshake_binds_without_echo() {
        let mut conn = FakeConn {
            send: Vec::new(),
            gid: ConnectionId::new(1),
        };
        let mut table = AuthTable::new();
        let local = AppId::new("this-app");
        let peer_payload = AuthHandshake {
            appid: "peer-app".to_owned(),
        }
        .encode();

        on_ipc_auth_handshake(&mut conn, false, &peer_payload, &mut table, &local).unwrap();

        assert!(conn.send.is_empty());
        assert_eq!(table.gid_for(&AppId::new("peer-app")), Some(conn.gid));
    }

    #[test]
    fn outbound_handshake_echoes_before_binding() {
        let mut conn = FakeConn {
            send: Vec::new(),
            gid: ConnectionId::new(2),
        };
        let mut table = AuthTable::new();
        let local = AppId::new("this-app");
        let peer_payload = AuthHandshake {
            appid: "peer-app".to_owned(),
        }
        .encode();

        on_ipc_auth_handshake(&mut conn, true, &peer_payload, &mut table, &local).unwrap();

        assert!(!conn.send.is_empty());
        assert_eq!(table.gid_for(&AppId::new("peer-app")), Some(conn.gid));
    }

    #[test]
    fn colliding_handshake_leaves_binding_untouched_and_connection_open() {
        let local = AppId::new("this-app");
        let mut table = AuthTable::new();
        table.bind(ConnectionId::new(1), AppId::new("peer-app"));

        let mut conn = FakeConn {
            send: Vec::new(),
            gid: ConnectionId::new(2),
        };
        let peer_payload = AuthHandshake {
            appid: "peer-app".to_owned(),
        }
        .encode();

        on_ipc_auth_handshake(&mut conn, false, &peer_payload, &mut table, &local).unwrap();

        assert_eq!(table.gid_for(&AppId::new("peer-app")), Some(ConnectionId::new(1)));
        assert!(table.appid_for(ConnectionId::new(2)).is_none());
    }
}
