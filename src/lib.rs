//! Multi-process tunnel and scripting-VM fabric.
//!
//! A small application server that terminates three edges — WebSocket
//! clients, an IPC-stream mesh to peer instances, and raw UDP — and routes
//! every message they carry into one of a fixed set of embedded-VM slots
//! (one main, N worker, one other). Built on tokio, using non-blocking
//! `try_read`/`try_write` over `TcpStream` as the reactor rather than a
//! full epoll-style poller, and a schema-equivalent binary codec in place
//! of a protobuf wire codec (both out of this crate's scope).

pub mod cli;
pub mod config;
pub mod error;
pub mod factory;
pub mod frame;
pub mod ids;
pub mod ipc;
pub mod messages;
pub mod process;
pub mod proto;
pub mod reactor;
pub mod tunnel;
pub mod udp;
pub mod vm;
pub mod websocket;
