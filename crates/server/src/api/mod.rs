pub mod control;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod routes;

pub use routes::create_router;
