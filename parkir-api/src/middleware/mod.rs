pub mod auth;
pub mod resiliency;

pub use auth::session_auth_middleware;
pub use resiliency::circuit_breaker_middleware;
