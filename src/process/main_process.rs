//! Main process role (spec §2): owns the process-wide configuration and
//! message factory, stands up the tunnel registry, and spawns the other
//! process plus one worker task per configured worker tunnel id. Fork-based
//! process supervision is out of scope (spec §1); the three roles run as
//! tokio tasks inside this one binary instead of as forked children.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::error::Error;
use crate::factory::MessageFactory;
use crate::ids::TunnelId;
use crate::proto::ProtoPackage;
use crate::process::{other_process, worker_process};
use crate::tunnel::TunnelRegistry;
use crate::vm::{VmHooks, VmSlot};

type Registry = Arc<Mutex<TunnelRegistry<mpsc::UnboundedSender<ProtoPackage>>>>;

/// No-op main-VM hooks, standing in for the embedded script host's
/// process-wide slot (spec §4.5); a real embedding supplies its own.
#[derive(Default)]
struct NoopMainVmHooks;

impl VmHooks for NoopMainVmHooks {
    fn on_init(&mut self) {
        log::info!("main VM init");
    }
    fn on_stop(&mut self) {
        log::info!("main VM stop");
    }
    fn on_tick(&mut self) {}
    fn on_reload(&mut self) {
        log::info!("main VM reload");
    }
}

/// Boots every role and runs until one of the spawned tasks exits.
pub async fn run(config: AppConfig) -> Result<(), Error> {
    let factory = Arc::new(MessageFactory::new());
    let registry: Registry = Arc::new(Mutex::new(TunnelRegistry::new()));

    let mut main_vm = VmSlot::new(NoopMainVmHooks);
    main_vm.init();

    let (other_tx, other_rx) = mpsc::unbounded_channel();
    registry
        .lock()
        .unwrap()
        .register_other(TunnelId::new(config.other_tunnel_id), other_tx);

    let mut worker_inboxes = Vec::with_capacity(config.worker_count as usize);
    for worker_idx in 0..config.worker_count as i32 {
        let tunnel_id = TunnelId::new(
            config
                .worker_tunnel_id(worker_idx)
                .unwrap_or(worker_idx),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        registry.lock().unwrap().register_worker(tunnel_id, tx);
        worker_inboxes.push((worker_idx, tunnel_id, rx));
    }

    let mut tasks = Vec::new();

    let other_config = config.clone();
    let other_factory = Arc::clone(&factory);
    let other_registry = Arc::clone(&registry);
    tasks.push(tokio::spawn(async move {
        other_process::run(other_config, other_factory, other_registry, other_rx).await
    }));

    for (worker_idx, tunnel_id, rx) in worker_inboxes {
        let worker_config = config.clone();
        let worker_registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            worker_process::run(worker_config, worker_idx, tunnel_id, worker_registry, rx).await
        }));
    }

    let tick_loop = tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tick.tick().await;
            main_vm.tick();
        }
    });

    let (outcome, _index, _rest) = futures::future::select_all(tasks).await;
    match outcome {
        Ok(Ok(())) => log::warn!("a process role exited cleanly"),
        Ok(Err(err)) => log::error!("a process role failed: {}", err),
        Err(err) => log::error!("a process role task panicked: {}", err),
    }

    tick_loop.abort();
    Ok(())
}
