//! Request transformation
//!
//! Turns a decoded caller request into the payload and header set sent
//! upstream. The caller's structure is forwarded as-is; only `model` may be
//! rewritten, and only when the gateway pins one.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName};

use crate::config::Settings;
use crate::schemas::openai::ChatCompletionRequest;

/// Inbound headers that are never reused on the upstream call.
const STRIPPED_HEADERS: &[&str] = &[
    // Caller credentials and routing
    "authorization",
    "host",
    // Hop-by-hop
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    // Set by the gateway or tied to the inbound body
    "content-length",
    "content-type",
    "accept-encoding",
];

/// Check if an inbound header may be forwarded upstream.
pub fn should_forward_header(name: &HeaderName) -> bool {
    !STRIPPED_HEADERS.contains(&name.as_str())
}

/// A request ready to be sent with any credential
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Serialized payload, reused for every attempt
    pub body: Bytes,
    /// Caller headers to forward (already filtered)
    pub headers: HeaderMap,
    /// Model the payload carries, for logging
    pub model: Option<String>,
    /// Whether the caller wants a streamed reply
    pub stream: bool,
}

/// Converts caller requests into upstream requests
#[derive(Debug, Clone, Default)]
pub struct RequestTransformer {
    pinned_model: Option<String>,
    forward_client_headers: bool,
}

impl RequestTransformer {
    pub fn new(pinned_model: Option<String>, forward_client_headers: bool) -> Self {
        Self {
            pinned_model,
            forward_client_headers,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.pinned_model.clone(), settings.forward_client_headers)
    }

    /// Apply the model policy to a decoded request
    pub fn rewrite(&self, mut request: ChatCompletionRequest) -> ChatCompletionRequest {
        if let Some(ref pinned) = self.pinned_model {
            request.set_model(pinned.clone());
        }
        request
    }

    /// Filter the caller's headers for reuse upstream
    pub fn forwarded_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        if !self.forward_client_headers {
            return HeaderMap::new();
        }

        let mut headers = HeaderMap::new();
        for (name, value) in inbound.iter() {
            if should_forward_header(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers
    }

    /// Build the upstream request
    pub fn transform(
        &self,
        request: ChatCompletionRequest,
        inbound_headers: &HeaderMap,
    ) -> Result<UpstreamRequest, serde_json::Error> {
        let stream = request.wants_stream();
        let request = self.rewrite(request);
        let body = Bytes::from(serde_json::to_vec(&request)?);

        Ok(UpstreamRequest {
            body,
            headers: self.forwarded_headers(inbound_headers),
            model: request.model().map(str::to_string),
            stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::{json, Value};

    fn request(value: Value) -> ChatCompletionRequest {
        serde_json::from_value(value).unwrap()
    }

    fn inbound_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer caller-secret"));
        headers.insert("host", HeaderValue::from_static("gateway.local"));
        headers.insert("content-length", HeaderValue::from_static("42"));
        headers.insert("accept-encoding", HeaderValue::from_static("gzip"));
        headers.insert("x-custom-header", HeaderValue::from_static("keep-me"));
        headers.insert("accept", HeaderValue::from_static("text/event-stream"));
        headers
    }

    #[test]
    fn test_should_forward_header() {
        assert!(should_forward_header(&HeaderName::from_static("accept")));
        assert!(should_forward_header(&HeaderName::from_static("x-custom-header")));

        assert!(!should_forward_header(&HeaderName::from_static("authorization")));
        assert!(!should_forward_header(&HeaderName::from_static("host")));
        assert!(!should_forward_header(&HeaderName::from_static("connection")));
        assert!(!should_forward_header(&HeaderName::from_static("transfer-encoding")));
    }

    #[test]
    fn test_pinned_model_overrides_caller() {
        let transformer = RequestTransformer::new(Some("org/pinned".to_string()), false);
        let out = transformer
            .transform(request(json!({"model": "gpt-4", "messages": []})), &HeaderMap::new())
            .unwrap();

        let body: Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(body["model"], "org/pinned");
        assert_eq!(out.model.as_deref(), Some("org/pinned"));
    }

    #[test]
    fn test_pinned_model_fills_missing_model() {
        let transformer = RequestTransformer::new(Some("org/pinned".to_string()), false);
        let out = transformer
            .transform(request(json!({"messages": []})), &HeaderMap::new())
            .unwrap();

        let body: Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(body["model"], "org/pinned");
    }

    #[test]
    fn test_passthrough_keeps_payload_intact() {
        let raw = json!({
            "model": "caller/model",
            "messages": [
                {"role": "system", "content": "s"},
                {"role": "user", "content": "u"},
                {"role": "assistant", "content": "a"}
            ],
            "temperature": 0.7,
            "max_tokens": 256,
            "stream": true,
            "top_p": 0.5
        });
        let transformer = RequestTransformer::default();
        let out = transformer.transform(request(raw.clone()), &HeaderMap::new()).unwrap();

        let body: Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(body, raw);
        assert!(out.stream);
    }

    #[test]
    fn test_no_defaults_are_synthesized() {
        let transformer = RequestTransformer::default();
        let out = transformer
            .transform(
                request(json!({"messages": [{"role": "user", "content": "hi"}]})),
                &HeaderMap::new(),
            )
            .unwrap();

        let body: Value = serde_json::from_slice(&out.body).unwrap();
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert!(!object.contains_key("model"));
        assert!(!object.contains_key("temperature"));
        assert!(!object.contains_key("max_tokens"));
        assert!(!object.contains_key("stream"));
        assert!(!out.stream);
    }

    #[test]
    fn test_tool_call_conversation_forwarded_verbatim() {
        let raw = json!({
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {"name": "weather", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "sunny"}
            ],
            "temperature": 1,
            "max_tokens": null
        });
        let transformer = RequestTransformer::default();
        let out = transformer.transform(request(raw.clone()), &HeaderMap::new()).unwrap();

        let body: Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(body, raw);
        assert!(std::str::from_utf8(&out.body).unwrap().contains(r#""temperature":1,"#));
    }

    #[test]
    fn test_headers_not_forwarded_by_default() {
        let transformer = RequestTransformer::default();
        assert!(transformer.forwarded_headers(&inbound_headers()).is_empty());
    }

    #[test]
    fn test_forwarded_headers_are_filtered() {
        let transformer = RequestTransformer::new(None, true);
        let headers = transformer.forwarded_headers(&inbound_headers());

        assert!(headers.get("authorization").is_none());
        assert!(headers.get("host").is_none());
        assert!(headers.get("content-length").is_none());
        assert!(headers.get("accept-encoding").is_none());
        assert_eq!(headers.get("x-custom-header").unwrap(), "keep-me");
        assert_eq!(headers.get("accept").unwrap(), "text/event-stream");
    }
}
