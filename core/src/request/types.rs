use crate::errors::ProjectError;
use crate::request::parser::{parse_form_body, parse_json_body, parse_query_string};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    TRACE,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Splits an optional `?query` off `target`.
    pub fn new(method: HttpMethod, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query_string(query)),
            None => (target, HashMap::new()),
        };
        Self {
            method,
            path: path.to_string(),
            headers: HashMap::new(),
            query_params: query,
            body: RequestBody::Empty,
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new(HttpMethod::GET, target)
    }

    pub fn post(target: &str) -> Self {
        Self::new(HttpMethod::POST, target)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Decodes `data` by its `Content-Type`: JSON and url-encoded forms are
    /// parsed, anything else is kept raw.
    pub fn with_encoded_body(self, content_type: &str, data: &[u8]) -> Result<Self, ProjectError> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let body = match media_type.as_str() {
            _ if data.is_empty() => RequestBody::Empty,
            "application/json" => RequestBody::Json(parse_json_body(data)?),
            "application/x-www-form-urlencoded" => RequestBody::Form(parse_form_body(data)?),
            _ => RequestBody::Raw(data.to_vec()),
        };
        Ok(self
            .with_header("Content-Type", content_type)
            .with_body(body))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(HashMap<String, String>),
    Multipart(Vec<MultipartPart>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl MultipartPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: "text/plain".to_string(),
            data: value.into().into_bytes(),
        }
    }
}

/// Contextual view of the request URI.
#[derive(Debug, Clone, PartialEq)]
pub struct UriInfo {
    pub path: String,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}
