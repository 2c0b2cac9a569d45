pub mod handlers;
pub mod owner;
pub mod response;
pub mod routes;
pub mod ttl;

pub use routes::create_router;
