use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    error::ErrorUnauthorized,
};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::task::{Context, Poll};

use super::jwt::{JwtUtils, REFRESH_ROLE, TokenVerifyResult};

/// Bearer-token guard. On success the caller's user id is inserted into the
/// request extensions and handlers receive it as `web::ReqData<i32>`.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let auth_header = req.headers().get("Authorization");

        let auth_result = match auth_header {
            Some(header_value) => {
                let auth_str = header_value.to_str().unwrap_or("");
                if let Some(token) = auth_str.strip_prefix("Bearer ") {
                    match JwtUtils::verify_token(token) {
                        TokenVerifyResult::Valid(claims) if claims.role != REFRESH_ROLE => {
                            match claims.sub.parse::<i32>() {
                                Ok(user_id) => {
                                    req.extensions_mut().insert(user_id);
                                    Ok(())
                                }
                                Err(_) => Err(ErrorUnauthorized("Invalid token subject")),
                            }
                        }
                        TokenVerifyResult::Valid(_) => {
                            Err(ErrorUnauthorized("Refresh token cannot be used for access"))
                        }
                        TokenVerifyResult::Expired => Err(ErrorUnauthorized("Token expired")),
                        TokenVerifyResult::Invalid => Err(ErrorUnauthorized("Invalid token")),
                    }
                } else {
                    Err(ErrorUnauthorized("Invalid Authorization header format"))
                }
            }
            None => Err(ErrorUnauthorized("Authorization header missing")),
        };

        let fut = self.service.call(req);
        Box::pin(async move {
            match auth_result {
                Ok(_) => fut.await,
                Err(e) => Err(e),
            }
        })
    }
}
