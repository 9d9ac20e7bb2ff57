//! Other process role (spec §2): owns the IPC mesh, the UDP endpoint, and
//! the authoritative VM that receives every client-originated message.
//! Grounded on `original_source/src/app/other_app.cpp`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::error::Error;
use crate::factory::MessageFactory;
use crate::ids::{AppId, Command, ConnectionId, TunnelId};
use crate::ipc;
use crate::ipc::table::AuthTable;
use crate::process::io::BufferedConnection;
use crate::proto::{ProtoPackage, Worker2OtherLuaVm};
use crate::reactor::ConnectionContext;
use crate::tunnel::{HealthBroadcastTimer, TunnelRegistry};
use crate::udp;
use crate::vm::{dispatch_other_message, OtherMessageSource, OtherVmHooks, VmHooks, VmSlot};

type Registry = Arc<Mutex<TunnelRegistry<mpsc::UnboundedSender<ProtoPackage>>>>;
type SharedAuthTable = Arc<Mutex<AuthTable>>;
type IpcSenders = Arc<Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<ProtoPackage>>>>;
type SharedVm = Arc<Mutex<VmSlot<NoopOtherVmHooks>>>;

/// No-op VM hooks: the embedded script interpreter is this system's one
/// genuine external collaborator (spec §1). A real embedding supplies its
/// own [`OtherVmHooks`]; this lets the bundled runtime boot without one.
#[derive(Default)]
struct NoopOtherVmHooks;

impl VmHooks for NoopOtherVmHooks {
    fn on_init(&mut self) {
        log::info!("other VM init");
    }
    fn on_stop(&mut self) {
        log::info!("other VM stop");
    }
    fn on_tick(&mut self) {}
    fn on_reload(&mut self) {
        log::info!("other VM reload");
    }
}

impl OtherVmHooks for NoopOtherVmHooks {
    fn on_recv_client_message(
        &mut self,
        cmd: i32,
        _message: &dyn crate::messages::ProtoMessage,
        gid: u64,
        worker_idx: i32,
    ) {
        log::debug!("client message cmd={} gid={} worker={}", cmd, gid, worker_idx);
    }
    fn on_recv_ipc_message(&mut self, cmd: i32, _message: &dyn crate::messages::ProtoMessage, app_id: &str) {
        log::debug!("ipc message cmd={} from={}", cmd, app_id);
    }
    fn on_recv_udp_message(
        &mut self,
        cmd: i32,
        _message: &dyn crate::messages::ProtoMessage,
        from_ip: &str,
        from_port: u16,
    ) {
        log::debug!("udp message cmd={} from={}:{}", cmd, from_ip, from_port);
    }
}

pub async fn run(
    config: AppConfig,
    factory: Arc<MessageFactory>,
    registry: Registry,
    mut inbox: mpsc::UnboundedReceiver<ProtoPackage>,
) -> Result<(), Error> {
    let vm: SharedVm = Arc::new(Mutex::new(VmSlot::new(NoopOtherVmHooks)));
    vm.lock().unwrap().init();

    let local_app_id = AppId::new(config.app_id.clone());
    let auth_table: SharedAuthTable = Arc::new(Mutex::new(AuthTable::new()));
    let ipc_senders: IpcSenders = Arc::new(Mutex::new(HashMap::new()));
    let mut health_timer = HealthBroadcastTimer::new();

    let udp_socket = UdpSocket::bind(&config.udp_bind_addr).await?;
    let ipc_listener = if let Some(first) = config.ipc_listen_addrs.first() {
        Some(TcpListener::bind(first).await?)
    } else {
        None
    };

    for addr in &config.ipc_connect_addrs {
        if let Ok(stream) = TcpStream::connect(addr).await {
            spawn_ipc_connection(
                stream,
                &auth_table,
                &ipc_senders,
                &vm,
                &factory,
                local_app_id.clone(),
                true,
            );
        } else {
            log::error!("other process failed to dial ipc peer {}", addr);
        }
    }

    let mut udp_buf = [0u8; 65536];
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut elapsed_seconds: i64 = 0;

    loop {
        tokio::select! {
            Some(package) = inbox.recv() => {
                handle_tunnel_package(vm.lock().unwrap().hooks_mut(), &factory, package);
            }
            accepted = accept_ipc(&ipc_listener) => {
                if let Some(stream) = accepted {
                    spawn_ipc_connection(
                        stream,
                        &auth_table,
                        &ipc_senders,
                        &vm,
                        &factory,
                        local_app_id.clone(),
                        false,
                    );
                }
            }
            result = udp_socket.recv_from(&mut udp_buf) => {
                if let Ok((len, addr)) = result {
                    match udp::on_recvfrom(&factory, &udp_buf[..len], addr.ip().to_string(), addr.port()) {
                        Ok(parsed) => dispatch_other_message(
                            vm.lock().unwrap().hooks_mut(),
                            OtherMessageSource::Udp { from_ip: parsed.from_ip, from_port: parsed.from_port },
                            parsed.cmd,
                            parsed.message.as_ref(),
                        ),
                        Err(err) => log::error!("udp datagram rejected: {}", err),
                    }
                }
            }
            _ = tick.tick() => {
                elapsed_seconds += 1;
                vm.lock().unwrap().tick();
                if health_timer.should_fire(elapsed_seconds) {
                    broadcast_health(&registry, TunnelId::new(config.other_tunnel_id), &config.worker_tunnel_ids, elapsed_seconds);
                }
            }
        }
    }
}

async fn accept_ipc(listener: &Option<TcpListener>) -> Option<TcpStream> {
    match listener {
        Some(listener) => listener.accept().await.ok().map(|(stream, _)| stream),
        None => std::future::pending().await,
    }
}

fn handle_tunnel_package(hooks: &mut impl OtherVmHooks, factory: &MessageFactory, package: ProtoPackage) {
    if package.cmd != Command::TunnelWorker2OtherLuaVm.code() {
        log::error!("other process received unexpected tunnel cmd {}", package.cmd);
        return;
    }
    let envelope = match Worker2OtherLuaVm::decode(package.payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            log::error!("failed to decode Worker2OtherLuaVm: {}", err);
            return;
        }
    };
    let message = match factory.decode(envelope.inner.cmd, &envelope.inner.payload) {
        Ok(message) => message,
        Err(err) => {
            log::error!("other_app on_other_tunnel unknown cmd {}: {}", envelope.inner.cmd, err);
            return;
        }
    };
    dispatch_other_message(
        hooks,
        OtherMessageSource::Client {
            gid: envelope.gid,
            worker_idx: envelope.worker_idx,
        },
        envelope.inner.cmd,
        message.as_ref(),
    );
}

fn broadcast_health(registry: &Registry, source: TunnelId, worker_tunnel_ids: &[i32], now: i64) {
    use crate::messages::{Other2WorkerTest, ProtoMessage as _};

    let inner = ProtoPackage::new(Command::TunnelOther2WorkerTest, Other2WorkerTest { time: now }.encode());
    let destinations: Vec<TunnelId> = worker_tunnel_ids.iter().map(|&id| TunnelId::new(id)).collect();
    registry.lock().unwrap().tunnel_forward(source, &destinations, inner);
}

/// The other-VM can originate an IPC message to a peer AppId without having
/// received one first, looked up through the same `appid2gid` binding used
/// for inbound authentication (`other_lua_send_ipc_package` in the original).
/// Returns `false` if `appid` has no bound connection right now.
pub fn send_to_appid(table: &SharedAuthTable, senders: &IpcSenders, appid: &AppId, package: ProtoPackage) -> bool {
    let gid = match table.lock().unwrap().gid_for(appid) {
        Some(gid) => gid,
        None => return false,
    };
    match senders.lock().unwrap().get(&gid) {
        Some(sender) => sender.send(package).is_ok(),
        None => false,
    }
}

fn spawn_ipc_connection(
    stream: TcpStream,
    table: &SharedAuthTable,
    senders: &IpcSenders,
    vm: &SharedVm,
    factory: &Arc<MessageFactory>,
    local_app_id: AppId,
    is_outbound: bool,
) {
    let gid = ConnectionId::new(rand::random());
    let mut conn = BufferedConnection::new(stream, gid, -1);
    if !is_outbound {
        if let Err(err) = ipc::on_new_connection_remote2this(&mut conn, &local_app_id) {
            log::error!("ipc handshake push failed: {}", err);
            return;
        }
    }

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    senders.lock().unwrap().insert(gid, outbound_tx);

    tokio::spawn(run_ipc_connection(
        conn,
        Arc::clone(table),
        Arc::clone(senders),
        Arc::clone(vm),
        Arc::clone(factory),
        local_app_id,
        is_outbound,
        outbound_rx,
    ));
}

/// Drives one IPC-stream connection's whole lifetime: auth handshake,
/// authenticated-message decode and dispatch into the other-VM's IPC hook,
/// outbound sends queued via `send_to_appid`, and binding cleanup on close.
/// `is_outbound` is constant for the connection's life — it marks which side
/// dialed, matching `is_this2remote` in the original (spec §4.2, §9 Open
/// Questions).
async fn run_ipc_connection(
    mut conn: BufferedConnection,
    table: SharedAuthTable,
    senders: IpcSenders,
    vm: SharedVm,
    factory: Arc<MessageFactory>,
    local_app_id: AppId,
    is_outbound: bool,
    mut outbound: mpsc::UnboundedReceiver<ProtoPackage>,
) {
    loop {
        tokio::select! {
            readiness = conn.readable() => {
                if readiness.is_err() || conn.try_fill_recv().is_err() {
                    break;
                }
                let packages = match ipc::on_process_connection(&mut conn) {
                    Ok(packages) => packages,
                    Err(_) => break,
                };
                for package in packages {
                    if package.cmd == Command::IpcStreamAuthHandshake.code() {
                        let mut table = table.lock().unwrap();
                        if let Err(err) =
                            ipc::on_ipc_auth_handshake(&mut conn, is_outbound, &package.payload, &mut table, &local_app_id)
                        {
                            log::error!("ipc handshake failed: {}", err);
                        }
                    } else {
                        let appid = table.lock().unwrap().appid_for(conn.get_conn_gid()).cloned();
                        match appid {
                            None => {
                                log::error!("ipc message before authentication, dropping cmd {}", package.cmd);
                            }
                            Some(appid) => match factory.decode(package.cmd, &package.payload) {
                                Ok(message) => {
                                    let mut guard = vm.lock().unwrap();
                                    dispatch_other_message(
                                        guard.hooks_mut(),
                                        OtherMessageSource::Ipc { app_id: appid.to_string() },
                                        package.cmd,
                                        message.as_ref(),
                                    );
                                }
                                Err(err) => {
                                    log::error!("ipc message cmd {} decode failed: {}", package.cmd, err);
                                }
                            },
                        }
                    }
                }
                if conn.is_conn_close() {
                    break;
                }
            }
            message = outbound.recv() => {
                match message {
                    Some(package) => {
                        if conn.send_data(&ipc::encode_frame(&package)).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    senders.lock().unwrap().remove(&conn.get_conn_gid());
    ipc::on_close_connection(conn.get_conn_gid(), &mut table.lock().unwrap());
}
