pub mod draw;
pub mod http;
pub mod registry;
pub mod run;
pub mod session;
pub mod state;
pub mod ws;

// Export commonly used types and functions
pub use registry::RoomRegistry;
pub use run::{build_router, run_server};
pub use session::{CommandError, RoomSession};
pub use state::AppState;
