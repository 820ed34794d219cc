use core_config::AppInfo;
use domain_notifications::DispatchService;
use std::sync::Arc;

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The dispatch core, shared with nothing else in this process.
    pub dispatch: Arc<DispatchService>,
    /// Static app identity for health/status responses.
    pub app: AppInfo,
}
