use chrono::{Duration, Utc};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::ActiveEnum;
use std::env;

use crate::entity::user::Role;
use crate::model::auth::Claims;

pub struct JwtUtils;

pub enum TokenVerifyResult {
    Valid(Claims),
    Expired,
    Invalid,
}

/// Marker stored in the `role` claim of refresh tokens so they cannot be
/// replayed as access tokens.
pub const REFRESH_ROLE: &str = "refresh";

impl JwtUtils {
    fn get_secret() -> String {
        env::var("JWT_SECRET").expect("JWT_SECRET must be set")
    }

    pub fn generate_access_token(user_id: i32, role: Role) -> Result<String, JwtError> {
        Self::generate(user_id, role.to_value(), Duration::hours(1))
    }

    pub fn generate_refresh_token(user_id: i32) -> Result<String, JwtError> {
        Self::generate(user_id, REFRESH_ROLE.to_string(), Duration::days(30))
    }

    fn generate(user_id: i32, role: String, lifetime: Duration) -> Result<String, JwtError> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(lifetime)
            .expect("token expiry out of range")
            .timestamp() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: expiration,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(Self::get_secret().as_bytes()),
        )
    }

    pub fn verify_token(token: &str) -> TokenVerifyResult {
        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(Self::get_secret().as_bytes()),
            &Validation::default(),
        ) {
            Ok(data) => TokenVerifyResult::Valid(data.claims),
            Err(err) => match *err.kind() {
                ErrorKind::ExpiredSignature => TokenVerifyResult::Expired,
                _ => TokenVerifyResult::Invalid,
            },
        }
    }
}
