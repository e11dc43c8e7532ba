use crate::config::WhatsNewSettings;
use crate::whatsnew::WhatsNewService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub whatsnew: Arc<WhatsNewService>,

    pub settings: Arc<WhatsNewSettings>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        whatsnew: Arc<WhatsNewService>,
        settings: Arc<WhatsNewSettings>,
    ) -> Self {
        Self {
            cancellation_token,
            whatsnew,
            settings,
        }
    }

    /// Same resources, different cancellation token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            whatsnew: Arc::clone(&self.whatsnew),
            settings: Arc::clone(&self.settings),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
