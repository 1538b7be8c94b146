use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::response::UnexpectedFailure;
use super::AppState;
use crate::models::users::Role;
use crate::services::ServiceError;

pub const CSRF_COOKIE: &str = "csrf_secret";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Route guard state: the services plus the lowest role allowed through.
#[derive(Clone)]
pub struct RoleGuard {
    pub state: AppState,
    pub required: Role,
}

/// Resolves the bearer token to an active user of sufficient rank and hands
/// it to the handler through the request extensions.
pub async fn authorize(
    State(guard): State<RoleGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let user = guard
        .state
        .services
        .auth
        .authorize(header, guard.required)
        .await?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Double-submit check on every state-changing request: the token header
/// must be derived from the secret cookie.
pub async fn csrf(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return next.run(request).await;
    }

    let headers = request.headers();
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok());

    if !state
        .services
        .auth
        .verify_csrf(cookie(headers, CSRF_COOKIE), token)
    {
        log::warn!("Rejected {} {} with a bad csrf token", request.method(), request.uri());
        return ServiceError::Unauthorized("Invalid csrf token".to_string()).into_response();
    }

    next.run(request).await
}

/// Mails the developer about failures the error mapping could not classify.
pub async fn report_failures(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    if let Some(UnexpectedFailure(details)) = response.extensions().get::<UnexpectedFailure>() {
        state.services.mailer.notify_developer(
            &format!("{} {} failed", method, uri.path()),
            format!("{} {}\n\n{}", method, uri, details),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; csrf_secret=abc123; lang=en"),
        );

        assert_eq!(cookie(&headers, CSRF_COOKIE), Some("abc123"));
        assert_eq!(cookie(&headers, "missing"), None);
    }
}
