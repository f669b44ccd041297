use std::rc::Rc;

use actix_service::{forward_ready, Service};
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ok, ready, LocalBoxFuture, Ready};

use crate::auth::{Identity, TokenService};
use crate::error::{AppError, AuthError};

/// Outcome of checking the request's credential, stashed in request extensions.
#[derive(Debug, Clone)]
struct Verified(Result<Identity, AuthError>);

/// Verifies the bearer token when one is sent. Requests without a header pass
/// through untouched; the `Identity` extractor decides whether that is fatal.
pub struct AuthMiddleware {
    tokens: TokenService,
}

impl AuthMiddleware {
    pub fn new(tokens: TokenService) -> Self {
        AuthMiddleware { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    tokens: TokenService,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        if let Some(value) = req.headers().get(AUTHORIZATION) {
            let outcome = match value.to_str() {
                Ok(raw) => self.tokens.verify(Some(raw)),
                Err(_) => Err(AuthError::InvalidCredential),
            };
            if let Err(e) = &outcome {
                log::debug!("{} {}: {}", req.method(), req.path(), e);
            }
            req.extensions_mut().insert(Verified(outcome));
        }

        Box::pin(async move { service.call(req).await })
    }
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let outcome = match req.extensions().get::<Verified>() {
            Some(Verified(outcome)) => outcome.clone().map_err(AppError::from),
            None => Err(AppError::from(AuthError::NoCredential)),
        };
        ready(outcome)
    }
}
