//! Shared-secret gate.
//!
//! Wraps a resource and compares the `x-api-key` header with the configured
//! key before the inner service runs, so a rejected request never has its
//! body read, decoded or staged. The key is injected at construction; the
//! middleware holds no global state.

use crate::error::AppError;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};
use tracing::warn;

pub const API_KEY_HEADER: &str = "x-api-key";

/// How a failed key check is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// 401 "Invalid API Key"
    Unauthorized,
    /// 403 "Access Denied: Invalid API Key"
    Forbidden,
}

impl Rejection {
    fn to_error(self) -> AppError {
        match self {
            Rejection::Unauthorized => AppError::Unauthorized("Invalid API Key".to_string()),
            Rejection::Forbidden => {
                AppError::Forbidden("Access Denied: Invalid API Key".to_string())
            }
        }
    }
}

#[derive(Clone)]
pub struct ApiKeyGuard {
    api_key: Arc<str>,
    rejection: Rejection,
}

impl ApiKeyGuard {
    pub fn new(api_key: impl Into<Arc<str>>, rejection: Rejection) -> Self {
        Self {
            api_key: api_key.into(),
            rejection,
        }
    }

    /// Guard that answers 401 on a missing or wrong key.
    pub fn unauthorized(api_key: impl Into<Arc<str>>) -> Self {
        Self::new(api_key, Rejection::Unauthorized)
    }

    /// Guard that answers 403 on a missing or wrong key.
    pub fn forbidden(api_key: impl Into<Arc<str>>) -> Self {
        Self::new(api_key, Rejection::Forbidden)
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyGuardMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyGuardMiddleware {
            service: Rc::new(service),
            api_key: Arc::clone(&self.api_key),
            rejection: self.rejection,
        }))
    }
}

pub struct ApiKeyGuardMiddleware<S> {
    service: Rc<S>,
    api_key: Arc<str>,
    rejection: Rejection,
}

impl<S, B> Service<ServiceRequest> for ApiKeyGuardMiddleware<S>
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
        let authorized = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|presented| presented == &*self.api_key);

        if !authorized {
            warn!(
                method = %req.method(),
                path = %req.path(),
                header_present = req.headers().contains_key(API_KEY_HEADER),
                "Rejected request with missing or invalid API key"
            );
            let response = req.error_response(self.rejection.to_error()).map_into_right_body();
            return Box::pin(async move { Ok(response) });
        }

        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let response = service.call(req).await?;
            Ok(response.map_into_left_body())
        })
    }
}
