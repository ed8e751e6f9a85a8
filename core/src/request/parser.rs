//! Raw request text into the name/value maps `RequestContext` reads from.

use crate::errors::{error_codes, ProjectError};
use std::collections::HashMap;

/// `a=1&b=two+words&flag` into a map. Pairs that fail percent-decoding are dropped.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

pub fn parse_json_body(data: &[u8]) -> Result<serde_json::Value, ProjectError> {
    serde_json::from_slice(data).map_err(|e| ProjectError::Validation {
        code: error_codes::INVALID_JSON_BODY.to_string(),
        message: format!("Request body is not valid JSON: {}", e),
    })
}

/// `application/x-www-form-urlencoded` body, decoded like a query string.
pub fn parse_form_body(data: &[u8]) -> Result<HashMap<String, String>, ProjectError> {
    let text = std::str::from_utf8(data).map_err(|e| ProjectError::Validation {
        code: error_codes::INVALID_FORM_ENCODING.to_string(),
        message: format!("Form body is not UTF-8: {}", e),
    })?;
    Ok(parse_query_string(text))
}

/// `Cookie: a=1; b=2` into a name/value map. Later duplicates win.
/// Values are percent-decoded only; `+` stays a literal plus.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some((name.to_string(), percent_decode(value)?))
        })
        .collect()
}

/// Form-style decoding, where `+` encodes a space.
fn decode_component(raw: &str) -> Option<String> {
    percent_decode(&raw.replace('+', " "))
}

fn percent_decode(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
        map.get(key).map(String::as_str)
    }

    #[test]
    fn test_query_pairs_and_flags() {
        let params = parse_query_string("page=2&verbose&&sort=name");
        assert_eq!(value(&params, "page"), Some("2"));
        assert_eq!(value(&params, "verbose"), Some(""));
        assert_eq!(value(&params, "sort"), Some("name"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_query_decoding() {
        let params = parse_query_string("q=rust%20di&owner=Ada+Lovelace&bad=%FF");
        assert_eq!(value(&params, "q"), Some("rust di"));
        assert_eq!(value(&params, "owner"), Some("Ada Lovelace"));
        assert_eq!(value(&params, "bad"), None);
    }

    #[test]
    fn test_json_body() {
        let body = parse_json_body(br#"{"id": 7, "tags": ["a"]}"#).unwrap();
        assert_eq!(body["id"], 7);
        assert_eq!(body["tags"][0], "a");

        match parse_json_body(b"{id: 7}").unwrap_err() {
            ProjectError::Validation { code, .. } => assert_eq!(code, error_codes::INVALID_JSON_BODY),
            other => panic!("Wrong error type: {other}"),
        }
    }

    #[test]
    fn test_form_body() {
        let fields = parse_form_body(b"title=Hello+world&count=3").unwrap();
        assert_eq!(value(&fields, "title"), Some("Hello world"));
        assert_eq!(value(&fields, "count"), Some("3"));

        match parse_form_body(&[0xFF, 0xFE]).unwrap_err() {
            ProjectError::Validation { code, .. } => {
                assert_eq!(code, error_codes::INVALID_FORM_ENCODING)
            }
            other => panic!("Wrong error type: {other}"),
        }
    }

    #[test]
    fn test_cookie_header() {
        let cookies = parse_cookie_header("a=hello; session=\"abc%3D\";  ; =skip; a=again");
        assert_eq!(value(&cookies, "a"), Some("again"));
        assert_eq!(value(&cookies, "session"), Some("abc="));
        assert_eq!(cookies.len(), 2);

        let cookies = parse_cookie_header("a=b+c; token=x%2By+z");
        assert_eq!(value(&cookies, "a"), Some("b+c"));
        assert_eq!(value(&cookies, "token"), Some("x+y+z"));
    }
}
