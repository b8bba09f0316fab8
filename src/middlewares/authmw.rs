use std::future::{Ready, ready};

use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header,
    web,
};
use futures_util::future::LocalBoxFuture;

use crate::error::AnalyticsError;
use crate::state::app_state::AppState;
use crate::utils::jwt::{Claims, bearer_token, validate_token};

/// Claims from a valid bearer token on `req`, if any.
pub fn verified_claims(req: &HttpRequest, secret: &str) -> Option<Claims> {
    let header_value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = bearer_token(header_value)?;
    validate_token(token, secret).ok()
}

/// Owner user id stored by `JwtAuth`.
pub fn current_user_id(req: &HttpRequest) -> Option<String> {
    req.extensions().get::<Claims>().map(|claims| claims.sub.clone())
}

pub struct JwtAuth;

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware { service }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let secret = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state.jwt_secret.clone(),
            None => {
                log::error!("AppState missing; rejecting authenticated route");
                return Box::pin(async move { Err(AnalyticsError::NotAuthenticated.into()) });
            }
        };

        // Queries never run with an empty identity
        let claims = match verified_claims(req.request(), &secret) {
            Some(claims) if !claims.sub.trim().is_empty() => claims,
            _ => {
                return Box::pin(async move { Err(AnalyticsError::NotAuthenticated.into()) });
            }
        };

        req.extensions_mut().insert(claims);

        Box::pin(self.service.call(req))
    }
}
