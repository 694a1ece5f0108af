//! URL and JSON validation helpers shared by the config layer and the log.

use std::collections::BTreeMap;

use url::Url;

use crate::Result;
use crate::error::Error;

/// Parse an endpoint and require a `ws` or `wss` scheme.
pub fn validate_ws_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_url(raw, "URL must not be empty"));
    }

    let url = Url::parse(trimmed).map_err(|e| Error::invalid_url(raw, e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::invalid_url(
            raw,
            format!("unsupported scheme `{other}`, expected ws or wss"),
        )),
    }
}

/// Validate advisory header text: must be a JSON object with string values.
///
/// The headers are never transmitted (a browser-style handshake cannot carry
/// them); validation only protects the user from typos in the form field.
pub fn validate_header_json(raw: &str) -> Result<BTreeMap<String, String>> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::invalid_payload(format!("headers must be valid JSON: {e}")))?;

    let Some(object) = value.as_object() else {
        return Err(Error::invalid_payload("headers must be a JSON object"));
    };

    let mut headers = BTreeMap::new();
    for (key, value) in object {
        let Some(text) = value.as_str() else {
            return Err(Error::invalid_payload(format!(
                "header `{key}` must have a string value"
            )));
        };
        headers.insert(key.clone(), text.to_owned());
    }
    Ok(headers)
}

/// Splice query parameters onto an endpoint, replacing any existing query.
///
/// Pairs with a blank key or value are skipped, matching the behavior of the
/// interactive parameter builder this backs. Keys and values are
/// percent-encoded.
pub fn append_query_params(raw: &str, params: &[(String, String)]) -> Result<String> {
    let mut url = validate_ws_url(raw)?;

    let pairs: Vec<_> = params
        .iter()
        .filter(|(key, value)| !key.trim().is_empty() && !value.trim().is_empty())
        .collect();
    if pairs.is_empty() {
        return Ok(url.into());
    }

    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key.trim(), value.trim());
        }
    }
    Ok(url.into())
}

/// Best-effort JSON pretty-print; non-JSON input comes back untouched.
#[must_use]
pub fn pretty_json(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_owned()),
        Err(_) => raw.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    #[test]
    fn ws_and_wss_urls_are_accepted() {
        assert!(validate_ws_url("ws://example.test/echo").is_ok());
        assert!(validate_ws_url("wss://api.example.com/ws?token=abc").is_ok());
        // Surrounding whitespace from a form field is tolerated.
        assert!(validate_ws_url("  wss://api.example.com/ws  ").is_ok());
    }

    #[test]
    fn other_schemes_are_rejected() {
        for raw in ["http://example.test", "https://example.test", "ftp://x"] {
            let error = validate_ws_url(raw).expect_err("scheme must be rejected");
            assert_eq!(error.kind(), Kind::InvalidUrl);
        }
    }

    #[test]
    fn garbage_and_empty_urls_are_rejected() {
        assert_eq!(
            validate_ws_url("").expect_err("empty").kind(),
            Kind::InvalidUrl
        );
        assert_eq!(
            validate_ws_url("not a url").expect_err("garbage").kind(),
            Kind::InvalidUrl
        );
    }

    #[test]
    fn header_json_must_be_a_string_map() {
        let headers =
            validate_header_json(r#"{"Authorization": "Bearer abc", "X-Env": "prod"}"#).expect("valid");
        assert_eq!(headers.get("X-Env").map(String::as_str), Some("prod"));

        assert_eq!(
            validate_header_json("[1,2,3]").expect_err("array").kind(),
            Kind::InvalidPayload
        );
        assert_eq!(
            validate_header_json(r#"{"n": 1}"#).expect_err("number value").kind(),
            Kind::InvalidPayload
        );
        assert_eq!(
            validate_header_json("{not json").expect_err("syntax").kind(),
            Kind::InvalidPayload
        );
    }

    #[test]
    fn query_params_replace_the_existing_query() {
        let spliced = append_query_params(
            "wss://example.test/ws?old=1",
            &[
                ("token".to_owned(), "a b".to_owned()),
                ("".to_owned(), "skipped".to_owned()),
                ("blank".to_owned(), "  ".to_owned()),
            ],
        )
        .expect("splice");

        assert_eq!(spliced, "wss://example.test/ws?token=a+b");
    }

    #[test]
    fn all_blank_params_leave_the_url_alone() {
        let spliced = append_query_params(
            "wss://example.test/ws?keep=1",
            &[("".to_owned(), "".to_owned())],
        )
        .expect("splice");

        assert_eq!(spliced, "wss://example.test/ws?keep=1");
    }

    #[test]
    fn json_frames_are_pretty_printed() {
        assert_eq!(pretty_json(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn non_json_frames_pass_through() {
        assert_eq!(pretty_json("hello there"), "hello there");
        assert_eq!(pretty_json("{broken"), "{broken");
    }
}
