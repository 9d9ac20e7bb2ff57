//! The bidirectional `gid2appid`/`appid2gid` binding table (spec §4.2),
//! grounded on `other_app.cpp`'s static `authenticated_ipc_pair`.

use std::collections::HashMap;

use crate::ids::{AppId, ConnectionId};

/// Tracks which IPC connection is authenticated as which peer application.
/// The two maps are always mutual inverses: a (gid, appid) binding exists in
/// one iff it exists in the other.
#[derive(Debug, Default)]
pub struct AuthTable {
    gid2appid: HashMap<ConnectionId, AppId>,
    appid2gid: HashMap<AppId, ConnectionId>,
}

impl AuthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `gid` to `appid`. Succeeds only if neither side already has an
    /// entry for this pair; on collision the existing binding is left
    /// untouched and the connection stays open for further handshake
    /// attempts (spec §4.2, §8 scenarios 3/4).
    pub fn bind(&mut self, gid: ConnectionId, appid: AppId) -> bool {
        if self.appid2gid.contains_key(&appid) || self.gid2appid.contains_key(&gid) {
            return false;
        }
        self.appid2gid.insert(appid.clone(), gid);
        self.gid2appid.insert(gid, appid);
        true
    }

    /// Removes whatever binding `gid` holds, if any (spec §4.2
    /// `on_close_connection`).
    pub fn unbind(&mut self, gid: ConnectionId) -> Option<AppId> {
        let appid = self.gid2appid.remove(&gid)?;
        self.appid2gid.remove(&appid);
        Some(appid)
    }

    pub fn gid_for(&self, appid: &AppId) -> Option<ConnectionId> {
        self.appid2gid.get(appid).copied()
    }

    pub fn appid_for(&self, gid: ConnectionId) -> Option<&AppId> {
        self.gid2appid.get(&gid)
    }

    pub fn is_authenticated(&self, gid: ConnectionId) -> bool {
        self.gid2appid.contains_key(&gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_lookup_both_directions() {
        let mut table = AuthTable::new();
        let gid = ConnectionId::new(1);
        let appid = AppId::new("peer-a");
        assert!(table.bind(gid, appid.clone()));
        assert_eq!(table.gid_for(&appid), Some(gid));
        assert_eq!(table.appid_for(gid), Some(&appid));
    }

    #[test]
    fn colliding_appid_binding_fails_and_leaves_original_untouched() {
        let mut table = AuthTable::new();
        let appid = AppId::new("peer-a");
        assert!(table.bind(ConnectionId::new(1), appid.clone()));
        assert!(!table.bind(ConnectionId::new(2), appid.clone()));
        assert_eq!(table.gid_for(&appid), Some(ConnectionId::new(1)));
    }

    #[test]
    fn colliding_gid_binding_fails_and_leaves_original_untouched() {
        let mut table = AuthTable::new();
        let gid = ConnectionId::new(1);
        assert!(table.bind(gid, AppId::new("peer-a")));
        assert!(!table.bind(gid, AppId::new("peer-b")));
        assert_eq!(table.appid_for(gid), Some(&AppId::new("peer-a")));
    }

    #[test]
    fn unbind_removes_both_sides() {
        let mut table = AuthTable::new();
        let gid = ConnectionId::new(1);
        let appid = AppId::new("peer-a");
        table.bind(gid, appid.clone());
        assert_eq!(table.unbind(gid), Some(appid.clone()));
        assert!(table.gid_for(&appid).is_none());
        assert!(table.appid_for(gid).is_none());
    }

    #[test]
    fn unbind_of_unknown_gid_is_none() {
        let mut table = AuthTable::new();
        assert_eq!(table.unbind(ConnectionId::new(99)), None);
    }
}
