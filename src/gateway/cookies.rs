//! Minimal `Set-Cookie` handling for the login session.

use chrono::{DateTime, NaiveDateTime, Utc};

/// A cookie name/value pair; attributes are not retained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse the leading `name=value` pair of a `Set-Cookie` header.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, value.trim().trim_matches('"')))
    }
}

/// Apply one `Set-Cookie` header to `jar`.
///
/// An empty value, a non-positive `Max-Age` or an `Expires` date at or before
/// `now` deletes the cookie instead of storing it.
pub(crate) fn apply_set_cookie(jar: &mut Vec<Cookie>, header: &str, now: DateTime<Utc>) {
    let Some(cookie) = Cookie::parse_set_cookie(header) else {
        return;
    };
    if cookie.value.is_empty() || is_expired(header, now) {
        jar.retain(|existing| existing.name != cookie.name);
    } else {
        merge(jar, cookie);
    }
}

fn is_expired(header: &str, now: DateTime<Utc>) -> bool {
    let mut max_age = None;
    let mut expires = None;
    for attribute in header.split(';').skip(1) {
        let (key, value) = attribute.split_once('=').unwrap_or((attribute, ""));
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "max-age" => max_age = value.parse::<i64>().ok(),
            "expires" => expires = parse_cookie_date(value),
            _ => {}
        }
    }
    // Max-Age wins over Expires.
    match (max_age, expires) {
        (Some(seconds), _) => seconds <= 0,
        (None, Some(at)) => at <= now,
        (None, None) => false,
    }
}

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Insert or replace `cookie` in `jar`, keeping first-seen order.
fn merge(jar: &mut Vec<Cookie>, cookie: Cookie) {
    match jar.iter_mut().find(|existing| existing.name == cookie.name) {
        Some(existing) => existing.value = cookie.value,
        None => jar.push(cookie),
    }
}
