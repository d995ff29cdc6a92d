//! Derivation of the socket URL from the application URL.

use tungstenite::http::Uri;

/// Path of the view-module feed, appended to the application path.
pub const FEED_PATH: &str = "/0/Nui/ViewModule.aspx.ashx";

/// Resolved socket target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    host: String,
    port: u16,
    secure: bool,
}

impl Endpoint {
    /// Upgrade `http`/`https` to `ws`/`wss` and point at the feed path.
    ///
    /// Any query or fragment on the application URL is dropped.
    pub fn from_app_url(app_url: &str) -> Result<Self, String> {
        let uri: Uri = app_url
            .trim()
            .parse()
            .map_err(|err| format!("{app_url}: {err}"))?;
        let secure = match uri.scheme_str() {
            Some(scheme) if scheme.eq_ignore_ascii_case("https") => true,
            Some(scheme) if scheme.eq_ignore_ascii_case("http") => false,
            Some(scheme) => return Err(format!("{app_url}: unsupported scheme {scheme}")),
            None => return Err(format!("{app_url}: missing scheme")),
        };
        let authority = uri
            .authority()
            .ok_or_else(|| format!("{app_url}: missing host"))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned();
        if host.is_empty() {
            return Err(format!("{app_url}: missing host"));
        }
        let port = authority
            .port_u16()
            .unwrap_or(if secure { 443 } else { 80 });
        let scheme = if secure { "wss" } else { "ws" };
        let path = uri.path().trim_end_matches('/');
        let url = format!("{scheme}://{}{path}{FEED_PATH}", authority.as_str());
        Ok(Self {
            url,
            host,
            port,
            secure,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the socket runs over TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }
}
