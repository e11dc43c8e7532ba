use axum::extract::FromRef;

use crate::background_jobs::SchedulerHandle;
use crate::library::Authenticator;
use crate::whatsnew::{RefreshCoordinator, WhatsNewService};
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedWhatsNewService = Arc<WhatsNewService>;
pub type GuardedRefreshCoordinator = Arc<RefreshCoordinator>;
pub type GuardedAuthenticator = Arc<dyn Authenticator>;
pub type OptionalSchedulerHandle = Option<SchedulerHandle>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub whatsnew: GuardedWhatsNewService,
    pub refresh: GuardedRefreshCoordinator,
    pub authenticator: GuardedAuthenticator,
    pub scheduler_handle: OptionalSchedulerHandle,
    pub hash: String,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedWhatsNewService {
    fn from_ref(input: &ServerState) -> Self {
        input.whatsnew.clone()
    }
}

impl FromRef<ServerState> for GuardedRefreshCoordinator {
    fn from_ref(input: &ServerState) -> Self {
        input.refresh.clone()
    }
}

impl FromRef<ServerState> for OptionalSchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}
