pub mod broadcast;
pub mod handlers;
pub mod server;

pub use broadcast::{Broadcaster, UpdateMessage};
pub use handlers::{ApiError, AppState};
pub use server::{build_router, run_server};
