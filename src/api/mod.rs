// HTTP surface: router, shared state, handlers and the bearer-token extractor

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use errors::ApiError;
pub use routes::build_router;
pub use state::AppState;
