mod health;
mod routes;

pub use routes::api_routes;
