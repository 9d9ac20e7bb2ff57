//! Scripting-VM lifecycle and dispatch contract (spec §4.5), grounded on
//! `original_source/src/app/lua_plugin.h`'s three VM slots (main, N workers,
//! other) and their `On*Init`/`On*Stop`/`On*Tick`/`On*Reload` hooks.
//!
//! Executing an embedded script is this system's one true external
//! collaborator (spec §1 Non-goals): this module only owns the slot
//! lifecycle and the reload-flag/tick contract around whatever hook
//! implementation a real embedding supplies.

use crate::messages::ProtoMessage;

/// Lifecycle hooks every VM slot exposes, regardless of role.
pub trait VmHooks: Send {
    fn on_init(&mut self);
    fn on_stop(&mut self);
    fn on_tick(&mut self);
    fn on_reload(&mut self);
}

/// One VM slot's lifecycle state machine. `request_reload` just raises a
/// flag; the reload itself is consumed atomically at the start of the next
/// tick, never during one (`lua_state_be_reload` in the original), so a
/// VM's own tick never observes a reload mid-flight.
pub struct VmSlot<H: VmHooks> {
    hooks: H,
    reload_pending: bool,
    initialized: bool,
}

impl<H: VmHooks> VmSlot<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            hooks,
            reload_pending: false,
            initialized: false,
        }
    }

    pub fn init(&mut self) {
        self.hooks.on_init();
        self.initialized = true;
    }

    pub fn stop(&mut self) {
        self.hooks.on_stop();
        self.initialized = false;
    }

    pub fn request_reload(&mut self) {
        self.reload_pending = true;
    }

    /// Consumes any pending reload, then runs one tick.
    pub fn tick(&mut self) {
        if self.reload_pending {
            self.reload_pending = false;
            self.hooks.on_reload();
        }
        self.hooks.on_tick();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }
}

/// The origin of one message handed to the other-process VM, replacing the
/// original's `(msg_type, uint64_param1, int64_param2, str_param3)` packed
/// dispatch with a typed enum (`exe_OnLuaVMRecvMessage`'s three call sites).
pub enum OtherMessageSource {
    Client { gid: u64, worker_idx: i32 },
    Ipc { app_id: String },
    Udp { from_ip: String, from_port: u16 },
}

/// Hooks specific to the other-process VM: every message arriving from a
/// worker-relayed client, an authenticated IPC peer, or raw UDP ends up here
/// once the factory has decoded it.
pub trait OtherVmHooks: VmHooks {
    fn on_recv_client_message(&mut self, cmd: i32, message: &dyn ProtoMessage, gid: u64, worker_idx: i32);
    fn on_recv_ipc_message(&mut self, cmd: i32, message: &dyn ProtoMessage, app_id: &str);
    fn on_recv_udp_message(&mut self, cmd: i32, message: &dyn ProtoMessage, from_ip: &str, from_port: u16);
}

/// Single dispatch point mirroring `lua_plugin::exe_OnLuaVMRecvMessage`: one
/// message, routed by its origin to the matching typed hook.
pub fn dispatch_other_message<H: OtherVmHooks>(
    hooks: &mut H,
    source: OtherMessageSource,
    cmd: i32,
    message: &dyn ProtoMessage,
) {
    match source {
        OtherMessageSource::Client { gid, worker_idx } => {
            hooks.on_recv_client_message(cmd, message, gid, worker_idx)
        }
        OtherMessageSource::Ipc { app_id } => hooks.on_recv_ipc_message(cmd, message, &app_id),
        OtherMessageSource::Udp { from_ip, from_port } => {
            hooks.on_recv_udp_message(cmd, message, &from_ip, from_port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use crate::error::Error;
    use bytes::Bytes;

    #[derive(Default)]
    struct RecordingHooks {
        inits: u32,
        stops: u32,
        ticks: u32,
        reloads: u32,
        client_messages: u32,
        ipc_messages: u32,
        udp_messages: u32,
    }

    impl VmHooks for RecordingHooks {
        fn on_init(&mut self) {
            self.inits += 1;
        }
        fn on_stop(&mut self) {
            self.stops += 1;
        }
        fn on_tick(&mut self) {
            self.ticks += 1;
        }
        fn on_reload(&mut self) {
            self.reloads += 1;
        }
    }

    impl OtherVmHooks for RecordingHooks {
        fn on_recv_client_message(&mut self, _cmd: i32, _message: &dyn ProtoMessage, _gid: u64, _worker_idx: i32) {
            self.client_messages += 1;
        }
        fn on_recv_ipc_message(&mut self, _cmd: i32, _message: &dyn ProtoMessage, _app_id: &str) {
            self.ipc_messages += 1;
        }
        fn on_recv_udp_message(&mut self, _cmd: i32, _message: &dyn ProtoMessage, _from_ip: &str, _from_port: u16) {
            self.udp_messages += 1;
        }
    }

    #[derive(Debug)]
    struct DummyMessage;

    impl ProtoMessage for DummyMessage {
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

    #[test]
    fn reload_is_consumed_exactly_once_before_the_next_tick() {
        let mut slot = VmSlot::new(RecordingHooks::default());
        slot.init();
        slot.request_reload();
        slot.tick();
        slot.tick();
        assert_eq!(slot.hooks().reloads, 1);
        assert_eq!(slot.hooks().ticks, 2);
    }

    #[test]
    fn dispatch_routes_by_source() {
        let mut hooks = RecordingHooks::default();
        let message = DummyMessage;
        dispatch_other_message(&mut hooks, OtherMessageSource::Client { gid: 1, worker_idx: 0 }, 5, &message);
        dispatch_other_message(&mut hooks, OtherMessageSource::Ipc { app_id: "peer".into() }, 2, &message);
        dispatch_other_message(&mut hooks, OtherMessageSource::Udp { from_ip: "127.0.0.1".into(), from_port: 9 }, 2, &message);
        assert_eq!(hooks.client_messages, 1);
        assert_eq!(hooks.ipc_messages, 1);
        assert_eq!(hooks.udp_messages, 1);
    }
}
