pub mod router;
pub mod server;
pub mod state;
pub mod tracing;

pub use router::api_router;
pub use server::{serve, shutdown_signal};
pub use state::AppState;
