//! IPC-stream transport: length-prefixed framing, the auth handshake state
//! machine, and the bidirectional gid/appid binding table (spec §4.2),
//! grounded on `original_source/src/app/other_app.cpp`.

pub mod framing;
pub mod handshake;
pub mod table;

pub use framing::{encode_frame, on_process_connection, IPC_RECV_CAP};
pub use handshake::{on_close_connection, on_ipc_auth_handshake, on_new_connection_remote2this};
pub use table::AuthTable;
