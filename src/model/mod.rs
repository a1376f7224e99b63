pub mod auth;
pub mod bug;
pub mod global_error;
pub mod hierarchy;
pub mod user;

pub use auth::{AuthResponse, Claims, LoginRequest, LogoutRequest, RefreshTokenRequest};
pub use user::UserResponse;
