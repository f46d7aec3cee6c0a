//! Request authentication and throttling middleware.
//!
//! - [`middleware::auth_middleware`]: HS256 bearer-token verification
//! - [`rate_limit::rate_limit_middleware`]: global token-bucket limiter

pub mod claims;
pub mod middleware;
pub mod rate_limit;

pub use claims::{UserClaims, UserContext};
pub use rate_limit::RateLimiter;
