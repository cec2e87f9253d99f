pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod glob_match;
pub mod matcher;
pub mod model;
pub mod payload;
pub mod session;
pub mod signature;
pub mod store;
pub mod template;

use config::Config;
use session::SessionManager;
use store::TenantStore;

/// Shared process state handed to every handler via axum's `State`
/// extractor, mirroring the teacher's `AppState` (db pools + mode flags).
pub struct AppState {
    pub config: Config,
    pub store: TenantStore,
    pub sessions: SessionManager,
}
