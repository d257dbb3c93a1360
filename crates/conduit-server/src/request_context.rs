use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use conduit_core::RequestContext;

/// Attach a `RequestContext` to every request
///
/// Handlers read the caller's bearer credential from it instead of from
/// raw headers.
pub async fn request_context_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let context = RequestContext::from_parts(parts.clone());

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);

    next.run(request).await
}
