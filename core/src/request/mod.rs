pub mod context;
pub mod parser;
pub mod types;

pub use context::RequestContext;
pub use parser::{parse_cookie_header, parse_form_body, parse_json_body, parse_query_string};
pub use types::{HttpMethod, HttpRequest, MultipartPart, RequestBody, UriInfo};
