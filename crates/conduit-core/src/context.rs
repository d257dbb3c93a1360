use http::header::AUTHORIZATION;
use secrecy::SecretString;

/// Runtime context for a single inbound relay request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions)
    pub parts: http::request::Parts,
    /// Bearer credential supplied by the client, if any
    pub api_key: Option<SecretString>,
}

impl RequestContext {
    /// Build a context from request parts, extracting the bearer credential
    pub fn from_parts(parts: http::request::Parts) -> Self {
        let api_key = bearer_token(&parts.headers).map(SecretString::from);
        Self { parts, api_key }
    }

    /// Create a minimal context with no headers and no credential
    ///
    /// # Panics
    ///
    /// Never in practice: the request is built from static, valid parts.
    pub fn empty() -> Self {
        let (parts, ()) = http::Request::builder()
            .method(http::Method::POST)
            .uri("/")
            .body(())
            .expect("valid minimal request")
            .into_parts();

        Self { parts, api_key: None }
    }

    /// Access request headers
    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
///
/// The credential is forwarded as-is; nothing here validates it.
fn bearer_token(headers: &http::HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();

    (!token.is_empty()).then(|| token.to_owned())
}
