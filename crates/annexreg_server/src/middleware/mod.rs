pub mod auth;
pub mod headers;
pub mod rate_limit;
