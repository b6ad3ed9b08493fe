use actix_service::{forward_ready, Service};
use actix_web::body::EitherBody;
use actix_web::dev::{ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{Error, HttpMessage};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{AuthError, Claims, TokenIssuer};
use crate::errors::ApiError;

/// The signed-in admin, available to handlers as `web::ReqData<AdminIdentity>`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminIdentity {
    pub id: String,
    pub email: String,
}

impl From<Claims> for AdminIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
        }
    }
}

fn bearer_token(req: &ServiceRequest) -> Result<&str, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?;
    let value = header.to_str().map_err(|_| AuthError::InvalidScheme)?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidScheme)
}

// Middleware factory
pub struct AdminAuth {
    issuer: Arc<TokenIssuer>,
}

impl AdminAuth {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        AdminAuth { issuer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdminAuthMiddleware<S>;
    type InitError = ();

    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AdminAuthMiddleware {
            service: Rc::new(service),
            issuer: self.issuer.clone(),
        })
    }
}

pub struct AdminAuthMiddleware<S> {
    service: Rc<S>,
    issuer: Arc<TokenIssuer>,
}

impl<S, B> Service<ServiceRequest> for AdminAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let issuer = self.issuer.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let claims = match bearer_token(&req).and_then(|token| issuer.decode(token)) {
                Ok(claims) => claims,
                Err(e) => {
                    let response = req.error_response(ApiError::from(e));
                    return Ok(response.map_into_right_body());
                }
            };

            req.extensions_mut().insert(AdminIdentity::from(claims));
            service.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}
