mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use error::err;
pub use router::handle_request;
pub use types::{AppState, Request};

/// Opens a workspace outside the request loop (startup `--workspace`).
pub fn open_workspace(state: &mut AppState, path: &std::path::Path) -> anyhow::Result<usize> {
    handlers::core::open_workspace(state, path)
        .map_err(|e| anyhow::anyhow!("{}: {}", e.code, e.message))
}
