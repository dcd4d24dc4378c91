/// Header carrying a caller-supplied request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request context handed to the LLM handlers
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions)
    pub parts: http::request::Parts,
    /// Correlation id used in logs, taken from `x-request-id` when present
    pub request_id: String,
}

impl RequestContext {
    /// Build a context from request parts
    pub fn from_parts(parts: http::request::Parts) -> Self {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().simple().to_string(), ToOwned::to_owned);

        Self { parts, request_id }
    }

    /// Create a minimal context for non-HTTP use
    ///
    /// # Panics
    ///
    /// Never in practice; the minimal request is statically valid.
    pub fn empty() -> Self {
        let (parts, ()) = http::Request::builder()
            .method(http::Method::GET)
            .uri("/")
            .body(())
            .expect("valid minimal request")
            .into_parts();

        Self::from_parts(parts)
    }

    /// Access request headers
    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_gets_generated_id() {
        let ctx = RequestContext::empty();
        assert!(ctx.headers().is_empty());
        assert_eq!(ctx.request_id.len(), 32);
    }

    #[test]
    fn request_id_header_is_reused() {
        let (parts, ()) = http::Request::builder()
            .header(REQUEST_ID_HEADER, "req-42")
            .body(())
            .unwrap()
            .into_parts();

        assert_eq!(RequestContext::from_parts(parts).request_id, "req-42");
    }
}
