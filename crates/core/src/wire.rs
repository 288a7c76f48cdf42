//! Wire decoding of browser requests
//!
//! The extension sends either a query string (`GET /?event=change&...`) or a
//! form-encoded body (`POST /`). Both carry the same fields:
//!
//! | field         | reload | change   |
//! |---------------|--------|----------|
//! | `event`       | `reload` / `navigate` | `change` |
//! | `documentUrl` | required | required |
//! | `selector`    | -      | required |
//! | `property`    | -      | required |
//! | `value`       | -      | required, may be empty |
//! | `important`   | -      | optional |
//! | `media`       | -      | optional |
//!
//! Decoding is pure: it never touches session state.

use crate::event::{split_important, ChangeEvent, RuleChange};
use percent_encoding::percent_decode;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors decoding a request into an event
///
/// All of these are caused by the client and map to a 4xx response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

/// HTTP method of an inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl From<&str> for Method {
    fn from(method: &str) -> Self {
        if method.eq_ignore_ascii_case("GET") {
            Method::Get
        } else if method.eq_ignore_ascii_case("POST") {
            Method::Post
        } else {
            Method::Other(method.to_string())
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
            Method::Other(other) => f.write_str(other),
        }
    }
}

/// Decode a request into a change event
///
/// `query` is the raw query string (without `?`); `body` is the raw request
/// body, read as form-encoded fields for `POST`. Body fields override query
/// fields of the same name.
pub fn decode(method: &Method, query: Option<&str>, body: &[u8]) -> Result<ChangeEvent, DecodeError> {
    if let Method::Other(other) = method {
        return Err(DecodeError::UnsupportedMethod(other.clone()));
    }

    let mut fields = HashMap::new();
    if let Some(query) = query {
        parse_form(query.as_bytes(), &mut fields)?;
    }
    if *method == Method::Post && !body.is_empty() {
        parse_form(body, &mut fields)?;
    }

    let event = required(&fields, "event")?;
    let document_url = required(&fields, "documentUrl")?;
    if document_url.trim().is_empty() {
        return Err(DecodeError::MissingField("documentUrl"));
    }
    let document_url = document_url.trim();

    match event {
        "reload" | "navigate" => Ok(ChangeEvent::reload(document_url)),
        "change" => {
            let selector = non_blank(&fields, "selector")?;
            let property = non_blank(&fields, "property")?;
            let raw_value = required(&fields, "value")?;
            let (value, inline_important) = split_important(raw_value);

            let important = inline_important
                || fields
                    .get("important")
                    .map(|flag| is_truthy(flag))
                    .unwrap_or(false);

            let change = RuleChange::new(selector, property, value)
                .with_important(important)
                .with_media(fields.get("media").map(String::as_str));

            Ok(ChangeEvent::rule(document_url, change))
        }
        other => Err(DecodeError::Malformed(format!("unknown event type {other:?}"))),
    }
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &'static str) -> Result<&'a str, DecodeError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(DecodeError::MissingField(name))
}

fn non_blank<'a>(fields: &'a HashMap<String, String>, name: &'static str) -> Result<&'a str, DecodeError> {
    let value = required(fields, name)?;
    if value.trim().is_empty() {
        return Err(DecodeError::MissingField(name));
    }
    Ok(value)
}

fn is_truthy(flag: &str) -> bool {
    matches!(
        flag.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Parse `application/x-www-form-urlencoded` pairs into `fields`
///
/// Stricter than a lenient form parser: a `%` must be followed by two hex
/// digits and the decoded bytes must be UTF-8.
fn parse_form(input: &[u8], fields: &mut HashMap<String, String>) -> Result<(), DecodeError> {
    for pair in input.split(|b| *b == b'&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.iter().position(|b| *b == b'=') {
            Some(idx) => (&pair[..idx], &pair[idx + 1..]),
            None => (pair, &[][..]),
        };
        let key = decode_component(key)?;
        let value = decode_component(value)?;
        fields.insert(key, value);
    }
    Ok(())
}

fn decode_component(raw: &[u8]) -> Result<String, DecodeError> {
    let mut bytes = raw.iter();
    while let Some(&byte) = bytes.next() {
        if byte == b'%' {
            let hi = bytes.next().copied();
            let lo = bytes.next().copied();
            match (hi, lo) {
                (Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => {}
                _ => return Err(DecodeError::Malformed("invalid percent-encoding".into())),
            }
        }
    }

    let plus_decoded: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();

    percent_decode(&plus_decoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| DecodeError::Malformed("field is not valid UTF-8".into()))
}
