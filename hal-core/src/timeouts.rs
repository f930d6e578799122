//! Time budgets for verifying lifecycle actions, in seconds.

use crate::ActionKind;

pub const DEFAULT_TIMEOUT: u64 = 10;
pub const SERVER_START_TIMEOUT: u64 = 15;
pub const SERVER_STOP_TIMEOUT: u64 = 4;
pub const SERVER_SUSPEND_TIMEOUT: u64 = 1;
pub const SERVER_RELOAD_TIMEOUT: u64 = 5;
pub const SERVER_RESTART_TIMEOUT: u64 = SERVER_STOP_TIMEOUT + SERVER_START_TIMEOUT;
pub const SERVER_DESTROY_TIMEOUT: u64 = SERVER_STOP_TIMEOUT;
pub const SERVER_KILL_TIMEOUT: u64 = SERVER_STOP_TIMEOUT;

/// Delay between two status reads.
pub const POLL_INTERVAL_MILLIS: u64 = 500;

/// Budget for a single server.
pub fn server_timeout(action: ActionKind) -> u64 {
    match action {
        ActionKind::Start | ActionKind::Resume => SERVER_START_TIMEOUT,
        ActionKind::Stop => SERVER_STOP_TIMEOUT,
        ActionKind::Suspend => SERVER_SUSPEND_TIMEOUT,
        ActionKind::Reload => SERVER_RELOAD_TIMEOUT,
        ActionKind::Restart => SERVER_RESTART_TIMEOUT,
        ActionKind::Destroy => SERVER_DESTROY_TIMEOUT,
        ActionKind::Kill => SERVER_KILL_TIMEOUT,
        ActionKind::Remove | ActionKind::Copy => DEFAULT_TIMEOUT,
    }
}

/// Budget for an action on a server group with `servers` affected servers.
pub fn server_group_timeout(servers: usize, action: ActionKind) -> u64 {
    DEFAULT_TIMEOUT + server_timeout(action) * servers.max(1) as u64
}

/// Budget for an action on a host with `servers` affected servers. The host
/// controller itself has to come back first.
pub fn host_timeout(servers: usize, action: ActionKind) -> u64 {
    DEFAULT_TIMEOUT + server_timeout(ActionKind::Restart) + server_timeout(action) * servers as u64
}
