use crate::request::parser::parse_cookie_header;
use crate::request::types::{HttpMethod, HttpRequest, MultipartPart, RequestBody, UriInfo};
use crate::types::{TypeInfo, Value};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type ContextFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// **REQUEST CONTEXT**
///
/// **PURPOSE**: What the request-bound strategies read from: path, query, header,
/// cookie and form values by name, plus contextual objects by type.
#[derive(Clone)]
pub struct RequestContext {
    request: Arc<HttpRequest>,
    path_params: HashMap<String, String>,
    cookies: HashMap<String, String>,
    contextual: HashMap<TypeId, ContextFn>,
}

impl RequestContext {
    /// Registers `Arc<HttpRequest>`, `HttpMethod` and `UriInfo` as contextual objects.
    pub fn new(request: HttpRequest) -> Self {
        let cookies = request
            .header("Cookie")
            .map(parse_cookie_header)
            .unwrap_or_default();
        let mut context = Self {
            request: Arc::new(request),
            path_params: HashMap::new(),
            cookies,
            contextual: HashMap::new(),
        };
        context.refresh_builtin_context();
        context
    }

    /// Path parameters matched by the router.
    pub fn with_path_params(mut self, params: HashMap<String, String>) -> Self {
        self.path_params = params;
        self.refresh_builtin_context();
        self
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self.refresh_builtin_context();
        self
    }

    /// Makes `value` available to `Annotation::Context` points declared as `D`.
    pub fn insert_context<D: Clone + Send + Sync + 'static>(&mut self, value: D) {
        self.contextual
            .insert(TypeId::of::<D>(), Arc::new(move || Box::new(value.clone()) as Value));
    }

    pub fn with_context<D: Clone + Send + Sync + 'static>(mut self, value: D) -> Self {
        self.insert_context(value);
        self
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn uri_info(&self) -> UriInfo {
        UriInfo {
            path: self.request.path.clone(),
            path_params: self.path_params.clone(),
            query_params: self.request.query_params.clone(),
        }
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.request.query_params.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Url-encoded field, or the text of a multipart part without a filename.
    pub fn form_field(&self, name: &str) -> Option<String> {
        match &self.request.body {
            RequestBody::Form(fields) => fields.get(name).cloned(),
            RequestBody::Multipart(parts) => parts
                .iter()
                .find(|p| p.name == name && p.filename.is_none())
                .map(|p| String::from_utf8_lossy(&p.data).into_owned()),
            _ => None,
        }
    }

    pub fn form_part(&self, name: &str) -> Option<MultipartPart> {
        match &self.request.body {
            RequestBody::Multipart(parts) => parts.iter().find(|p| p.name == name).cloned(),
            _ => None,
        }
    }

    /// A fresh copy of the contextual object registered for `declared`.
    pub fn context_value(&self, declared: TypeInfo) -> Option<Value> {
        self.contextual.get(&declared.type_id).map(|produce| produce())
    }

    fn refresh_builtin_context(&mut self) {
        let uri_info = self.uri_info();
        let request = Arc::clone(&self.request);
        let method: HttpMethod = request.method;
        self.insert_context(request);
        self.insert_context(method);
        self.insert_context(uri_info);
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("path_params", &self.path_params)
            .field("contextual", &self.contextual.len())
            .finish()
    }
}
