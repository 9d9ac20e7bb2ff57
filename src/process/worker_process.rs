//! Worker process role (spec §2): owns a WebSocket listener and the set of
//! client connections accepted on it. Fork/supervision is out of scope
//! (spec §1), so here a "worker" is one tokio task per configured worker
//! tunnel id rather than a forked OS process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::error::Error;
use crate::ids::{Command, ConnectionId, TunnelId};
use crate::messages::{CloseClientConnection, NewClientConnection, ProtoMessage as _};
use crate::process::io::BufferedConnection;
use crate::proto::{OtherLuaVm2WorkerConn, ProtoPackage, Worker2OtherLuaVm};
use crate::reactor::ConnectionContext;
use crate::tunnel::TunnelRegistry;
use crate::vm::{VmHooks, VmSlot};
use crate::websocket::{send_sync_package, WebSocketReassembler};

type Registry = Arc<Mutex<TunnelRegistry<mpsc::UnboundedSender<ProtoPackage>>>>;

/// No-op worker-VM hooks (spec §4.5: one VM slot per worker, generic
/// init/stop/tick/reload only — workers have no typed message hooks of
/// their own, unlike the other-VM). A real embedding supplies its own.
struct NoopWorkerVmHooks {
    worker_idx: i32,
}

impl VmHooks for NoopWorkerVmHooks {
    fn on_init(&mut self) {
        log::info!("worker {} VM init", self.worker_idx);
    }
    fn on_stop(&mut self) {
        log::info!("worker {} VM stop", self.worker_idx);
    }
    fn on_tick(&mut self) {}
    fn on_reload(&mut self) {
        log::info!("worker {} VM reload", self.worker_idx);
    }
}

/// Runs one worker: accepts client TCP connections, reassembles WebSocket
/// frames into `ProtoPackage`s, tunnels them to the other process, and
/// applies whatever `OtherLuaVm2WorkerConn` envelopes come back.
pub async fn run(
    config: AppConfig,
    worker_idx: i32,
    tunnel_id: TunnelId,
    registry: Registry,
    mut inbox: mpsc::UnboundedReceiver<ProtoPackage>,
) -> Result<(), Error> {
    let listener = TcpListener::bind(&config.websocket_listen_addr).await?;
    let other_tunnel_id = TunnelId::new(config.other_tunnel_id);
    let next_gid = Arc::new(AtomicU64::new(1));

    let mut vm = VmSlot::new(NoopWorkerVmHooks { worker_idx });
    vm.init();

    // Routes an envelope addressed to a client gid to that client's task.
    let clients: Arc<Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<ProtoPackage>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let accept_clients = Arc::clone(&clients);
    let accept_registry = Arc::clone(&registry);
    let accept_gid = Arc::clone(&next_gid);
    let accept_loop = tokio::spawn(async move {
        loop {
            let (stream, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    log::error!("worker {} accept failed: {}", worker_idx, err);
                    continue;
                }
            };

            let gid = ConnectionId::new(accept_gid.fetch_add(1, Ordering::Relaxed));
            let (client_tx, client_rx) = mpsc::unbounded_channel();
            accept_clients.lock().unwrap().insert(gid, client_tx);

            let conn = BufferedConnection::new(stream, gid, worker_idx);
            let registry = Arc::clone(&accept_registry);
            let clients = Arc::clone(&accept_clients);
            tokio::spawn(run_client(conn, tunnel_id, other_tunnel_id, registry, clients, client_rx));
        }
    });

    // Dispatches envelopes arriving from the other process to the right client,
    // ticking the worker VM once a second (spec §4.5).
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        tokio::select! {
            maybe_package = inbox.recv() => {
                let package = match maybe_package {
                    Some(package) => package,
                    None => break,
                };
                if package.cmd != Command::TunnelOtherLuaVm2WorkerConn.code() {
                    log::error!("worker {} got unexpected tunnel cmd {}", worker_idx, package.cmd);
                    continue;
                }
                let envelope = match OtherLuaVm2WorkerConn::decode(package.payload) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        log::error!("worker {} failed to decode OtherLuaVm2WorkerConn: {}", worker_idx, err);
                        continue;
                    }
                };
                let gid = ConnectionId::new(envelope.gid);
                let sender = clients.lock().unwrap().get(&gid).cloned();
                if let Some(sender) = sender {
                    let _ = sender.send(envelope.inner);
                } else {
                    log::error!("worker {} routing miss for gid {}", worker_idx, gid);
                }
            }
            _ = tick.tick() => {
                vm.tick();
            }
        }
    }

    vm.stop();
    accept_loop.abort();
    Ok(())
}

async fn run_client(
    mut conn: BufferedConnection,
    tunnel_id: TunnelId,
    other_tunnel_id: TunnelId,
    registry: Registry,
    clients: Arc<Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<ProtoPackage>>>>,
    mut inbound: mpsc::UnboundedReceiver<ProtoPackage>,
) {
    let gid = conn.get_conn_gid();
    let worker_idx = conn.get_worker_idx();
    let mut reassembler = WebSocketReassembler::new();

    forward_to_other(
        &registry,
        tunnel_id,
        other_tunnel_id,
        Worker2OtherLuaVm {
            gid: gid.get(),
            worker_idx,
            inner: ProtoPackage::new(
                Command::TunnelWorker2OtherEventNewClientConnection,
                NewClientConnection { gid: gid.get() }.encode(),
            ),
        },
    );

    loop {
        tokio::select! {
            readiness = conn.readable() => {
                if readiness.is_err() || conn.try_fill_recv().is_err() {
                    break;
                }
                match reassembler.on_process_connection(&mut conn) {
                    Ok(frames) => {
                        for frame in frames {
                            let inner = match ProtoPackage::decode(Bytes::from(frame.payload)) {
                                Ok(inner) => inner,
                                Err(err) => {
                                    log::error!("gid {} frame body decode failed: {}", gid, err);
                                    conn.set_conn_is_close(true);
                                    break;
                                }
                            };
                            forward_to_other(
                                &registry,
                                tunnel_id,
                                other_tunnel_id,
                                Worker2OtherLuaVm { gid: gid.get(), worker_idx, inner },
                            );
                        }
                    }
                    Err(err) => {
                        log::error!("gid {} reassembly failed: {}", gid, err);
                    }
                }
                if conn.is_conn_close() {
                    break;
                }
            }
            message = inbound.recv() => {
                match message {
                    Some(inner) => {
                        if inner.cmd == Command::OtherLuaVm2WorkerCloseClientConnection.code() {
                            break;
                        }
                        if send_sync_package(&mut conn, &inner.encode()).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    clients.lock().unwrap().remove(&gid);
    forward_to_other(
        &registry,
        tunnel_id,
        other_tunnel_id,
        Worker2OtherLuaVm {
            gid: gid.get(),
            worker_idx,
            inner: ProtoPackage::new(
                Command::TunnelWorker2OtherEventCloseClientConnection,
                CloseClientConnection { gid: gid.get() }.encode(),
            ),
        },
    );
}

fn forward_to_other(
    registry: &Registry,
    source: TunnelId,
    other_tunnel_id: TunnelId,
    envelope: Worker2OtherLuaVm,
) {
    let package = ProtoPackage::new(Command::TunnelWorker2OtherLuaVm, envelope.encode());
    registry
        .lock()
        .unwrap()
        .tunnel_forward(source, &[other_tunnel_id], package);
}
