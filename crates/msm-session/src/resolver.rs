//! Session id resolution and cookie issuance.

use std::borrow::Cow;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::header::{COOKIE, HeaderValue};
use http::request::Parts;
use rand::RngCore;
use url::form_urlencoded;

use crate::error::{Error, Result};

/// Maps an inbound request to a session id.
///
/// The named cookie wins; when it is missing or empty, a form field with the
/// same name (query string first, then a urlencoded body) is used instead.
#[derive(Debug, Clone)]
pub struct CookieResolver {
    cookie_name: String,
}

impl CookieResolver {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Resolve the session id carried by a request.
    ///
    /// Returns `Ok(None)` when neither the cookie nor the form field is
    /// present. `form` is the request body when it is urlencoded form data.
    pub fn resolve(&self, parts: &Parts, form: Option<&[u8]>) -> Result<Option<String>> {
        if let Some(sid) = self.from_cookie(parts)? {
            return Ok(Some(sid));
        }
        Ok(self.from_form(parts, form))
    }

    fn from_cookie(&self, parts: &Parts) -> Result<Option<String>> {
        for header in parts.headers.get_all(COOKIE) {
            let Ok(raw) = header.to_str() else {
                return Err(Error::Request("cookie header is not valid ASCII".to_string()));
            };
            for pair in raw.split(';') {
                let Some((name, value)) = pair.trim().split_once('=') else {
                    continue;
                };
                if name.trim() != self.cookie_name {
                    continue;
                }
                let value = value.trim().trim_matches('"');
                if value.is_empty() {
                    continue;
                }
                let decoded = urlencoding::decode(value).map_err(|e| {
                    Error::Request(format!("cookie '{}' is malformed: {e}", self.cookie_name))
                })?;
                return Ok(Some(decoded.into_owned()));
            }
        }
        Ok(None)
    }

    fn from_form(&self, parts: &Parts, form: Option<&[u8]>) -> Option<String> {
        let query = parts.uri.query().map(str::as_bytes);
        [query, form]
            .into_iter()
            .flatten()
            .find_map(|body| self.form_field(body))
    }

    fn form_field(&self, body: &[u8]) -> Option<String> {
        form_urlencoded::parse(body)
            .find(|(name, value)| **name == *self.cookie_name && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    }
}

/// Outbound session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub max_age: Duration,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age,
        }
    }

    fn encoded_value(&self) -> Cow<'_, str> {
        urlencoding::encode(&self.value)
    }

    /// `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly",
            self.name,
            self.encoded_value(),
            self.max_age.as_secs()
        )
    }

    /// `name=value` pair as carried by a `Cookie` request header.
    pub fn to_request_pair(&self) -> String {
        format!("{}={}", self.name, self.encoded_value())
    }

    /// Add this cookie to an inbound request so later handling sees it.
    pub fn mirror_onto(&self, parts: &mut Parts) -> Result<()> {
        let value = HeaderValue::from_str(&self.to_request_pair())
            .map_err(|e| Error::Request(format!("cannot mirror session cookie: {e}")))?;
        parts.headers.append(COOKIE, value);
        Ok(())
    }
}

/// Mint a new random session id of `len` characters.
///
/// Ids are drawn from the thread-local CSPRNG and rendered as URL-safe
/// base64, so they are safe to place in a cookie without escaping.
pub fn generate_sid(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(4) * 3];
    rand::rng().fill_bytes(&mut bytes);
    let mut sid = URL_SAFE_NO_PAD.encode(&bytes);
    sid.truncate(len);
    sid
}
