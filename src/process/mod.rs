//! Process roles (spec §2): `main`, `worker`, and `other`. Real `fork()`/OS
//! supervision is out of scope (spec §1); each role here is a tokio task
//! wired together by `main_process::run`.

pub mod io;
pub mod main_process;
pub mod other_process;
pub mod worker_process;

pub use io::BufferedConnection;

use tokio::sync::mpsc;

use crate::error::Error;
use crate::proto::ProtoPackage;
use crate::tunnel::TunnelSink;

/// An in-process tunnel is just an mpsc channel; delivery failure means the
/// receiving task has already exited.
impl TunnelSink for mpsc::UnboundedSender<ProtoPackage> {
    fn deliver(&mut self, package: ProtoPackage) -> Result<(), Error> {
        self.send(package).map_err(|_| Error::CommunicationError)
    }
}
