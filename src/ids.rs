//! Core identifiers shared by every component: connection handles, peer
//! application ids, tunnel ids, and the closed command enumeration.

use std::fmt;

/// Opaque handle for one socket context, unique within a process for the
/// lifetime of that socket (open to close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short UTF-8 identifier of a peer application instance across the IPC mesh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(pub String);

impl AppId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AppId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AppId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Small integer naming a destination process within the local application.
/// Workers occupy `0..worker_count`; the "other" process id is distinguished
/// and exposed by the process-wide [`crate::tunnel::TunnelRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TunnelId(pub i32);

impl TunnelId {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed enumeration drawn from the wire. Each variant both selects the
/// routing rule for a package and the structured-message type used to parse
/// its payload (see [`crate::factory::MessageFactory`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Command {
    IpcStreamAuthHandshake = 1,
    CsReqExample = 2,
    TunnelWorker2OtherLuaVm = 3,
    TunnelOtherLuaVm2WorkerConn = 4,
    TunnelWorker2OtherEventNewClientConnection = 5,
    TunnelWorker2OtherEventCloseClientConnection = 6,
    TunnelOther2WorkerTest = 7,
    OtherLuaVm2WorkerCloseClientConnection = 8,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::IpcStreamAuthHandshake,
        Command::CsReqExample,
        Command::TunnelWorker2OtherLuaVm,
        Command::TunnelOtherLuaVm2WorkerConn,
        Command::TunnelWorker2OtherEventNewClientConnection,
        Command::TunnelWorker2OtherEventCloseClientConnection,
        Command::TunnelOther2WorkerTest,
        Command::OtherLuaVm2WorkerCloseClientConnection,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Command> {
        Command::ALL.into_iter().find(|c| c.code() == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_its_code() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_code(cmd.code()), Some(cmd));
        }
    }

    #[test]
    fn unknown_command_code_is_none() {
        assert_eq!(Command::from_code(999), None);
    }

    #[test]
    fn connection_id_displays_as_its_integer() {
        assert_eq!(ConnectionId::new(42).to_string(), "42");
    }
}
