//! `ureq`-backed implementation of [`FeedControl`].
//!
//! Requests are JSON POSTs relative to the application URL. The login call
//! captures the session cookies; every later call sends them back together
//! with the CSRF token the server issued as a cookie. Failed calls are retried
//! according to a [`RequestPolicy`]:
//!
//! - **2xx**: success.
//! - **429 / 5xx / transport errors**: retried after a fixed delay.
//! - **Other 4xx**: permanent, returned immediately.

use std::{fmt, sync::Arc, thread, time::Duration};

use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use ureq::{Agent, AgentBuilder};

use crate::tls::TrustPolicy;

use super::{
    BroadcastSettings, Credentials, FeedControl, GatewayError,
    cookies::{self, Cookie},
};

/// Login endpoint, relative to the application URL.
pub const LOGIN_PATH: &str = "/ServiceModel/AuthService.svc/Login";
/// Endpoint enabling the log broadcast.
pub const START_BROADCAST_PATH: &str = "/0/rest/ATFLogService/StartLogBroadcast";
/// Endpoint resetting the log broadcast configuration.
pub const STOP_BROADCAST_PATH: &str = "/0/rest/ATFLogService/ResetConfiguration";
/// Cookie carrying the CSRF token, echoed back as a header of the same name.
pub const CSRF_COOKIE: &str = "BPMCSRF";

/// Default timeout for establishing HTTP connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout and retry budget for one kind of request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestPolicy {
    /// Overall timeout for a single attempt.
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl RequestPolicy {
    pub const fn login() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub const fn start_broadcast() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 10,
            retry_delay: Duration::from_secs(3),
        }
    }

    pub const fn stop_broadcast() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 1,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Settings for [`HttpGateway`].
#[derive(Clone)]
pub struct GatewayConfig {
    /// Base URL of the application, e.g. `https://host/app`.
    pub app_url: String,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub login: RequestPolicy,
    pub start: RequestPolicy,
    pub stop: RequestPolicy,
    pub trust: TrustPolicy,
}

impl GatewayConfig {
    pub fn new(
        app_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            app_url: app_url.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_url: String::new(),
            username: String::new(),
            password: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            login: RequestPolicy::login(),
            start: RequestPolicy::start_broadcast(),
            stop: RequestPolicy::stop_broadcast(),
            trust: TrustPolicy::default(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("app_url", &self.app_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("trust", &self.trust)
            .finish()
    }
}

/// Classification of an HTTP outcome for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseClass {
    Success,
    Retryable,
    Permanent,
}

/// Classifies an HTTP status code for retry logic.
pub(crate) fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        429 => ResponseClass::Retryable,
        500..=599 => ResponseClass::Retryable,
        _ => ResponseClass::Permanent,
    }
}

struct Failure {
    class: ResponseClass,
    error: GatewayError,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "Code")]
    code: i64,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

/// Feed control over HTTP using a pooled `ureq` agent.
pub struct HttpGateway {
    config: GatewayConfig,
    agent: Agent,
    jar: Vec<Cookie>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let connector = config
            .trust
            .connector()
            .map_err(|err| GatewayError::Transport {
                url: config.app_url.clone(),
                message: format!("TLS setup failed: {err}"),
            })?;
        let agent = AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .tls_connector(Arc::new(connector))
            .build();
        Ok(Self {
            config,
            agent,
            jar: Vec::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.app_url.trim_end_matches('/'), path)
    }

    fn credentials(&self) -> Credentials {
        Credentials::new(self.jar.clone())
    }

    fn post(
        &mut self,
        path: &str,
        body: &str,
        policy: &RequestPolicy,
    ) -> Result<String, GatewayError> {
        let url = self.url(path);
        let attempts = policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            let failure = match self.execute(&url, body, policy.timeout) {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };
            if failure.class == ResponseClass::Permanent || attempt >= attempts {
                return Err(failure.error);
            }
            warn!(
                "HttpGateway: {} (attempt {attempt}/{attempts}); retrying in {:?}",
                failure.error, policy.retry_delay
            );
            thread::sleep(policy.retry_delay);
            attempt += 1;
        }
    }

    fn execute(&mut self, url: &str, body: &str, timeout: Duration) -> Result<String, Failure> {
        let mut request = self
            .agent
            .post(url)
            .timeout(timeout)
            .set("Content-Type", "application/json");
        let credentials = self.credentials();
        if let Some(cookie) = credentials.cookie_header() {
            request = request.set("Cookie", &cookie);
        }
        if let Some(token) = credentials.get(CSRF_COOKIE) {
            request = request.set(CSRF_COOKIE, token);
        }

        match request.send_string(body) {
            Ok(response) => {
                self.capture_cookies(&response);
                response.into_string().map_err(|err| Failure {
                    class: ResponseClass::Retryable,
                    error: GatewayError::Transport {
                        url: url.to_owned(),
                        message: format!("reading body: {err}"),
                    },
                })
            }
            Err(ureq::Error::Status(status, _)) => Err(Failure {
                class: classify_status(status),
                error: GatewayError::Status {
                    url: url.to_owned(),
                    status,
                },
            }),
            Err(ureq::Error::Transport(transport)) => Err(Failure {
                class: ResponseClass::Retryable,
                error: GatewayError::Transport {
                    url: url.to_owned(),
                    message: transport.to_string(),
                },
            }),
        }
    }

    fn capture_cookies(&mut self, response: &ureq::Response) {
        for header in response.all("set-cookie") {
            cookies::apply_set_cookie(&mut self.jar, header, Utc::now());
        }
    }
}

impl FeedControl for HttpGateway {
    fn login(&mut self) -> Result<Credentials, GatewayError> {
        self.jar.clear();
        let body = json!({
            "UserName": self.config.username,
            "UserPassword": self.config.password,
        })
        .to_string();
        let policy = self.config.login.clone();
        let response = self.post(LOGIN_PATH, &body, &policy)?;
        let parsed: LoginResponse =
            serde_json::from_str(&response).map_err(|err| GatewayError::InvalidResponse {
                url: self.url(LOGIN_PATH),
                message: err.to_string(),
            })?;
        if parsed.code != 0 {
            return Err(GatewayError::Rejected {
                code: parsed.code,
                message: parsed.message.unwrap_or_default(),
            });
        }
        debug!("HttpGateway: logged in as {}", self.config.username);
        Ok(self.credentials())
    }

    fn start_broadcast(&mut self, settings: &BroadcastSettings) -> Result<(), GatewayError> {
        let body = json!({
            "logLevelStr": settings.level.to_string(),
            "bufferSize": settings.buffer_size,
            "loggerPattern": settings.pattern,
        })
        .to_string();
        let policy = self.config.start.clone();
        self.post(START_BROADCAST_PATH, &body, &policy)?;
        info!("HttpGateway: log broadcast started");
        Ok(())
    }

    fn stop_broadcast(&mut self) -> Result<(), GatewayError> {
        let policy = self.config.stop.clone();
        self.post(STOP_BROADCAST_PATH, "", &policy)?;
        info!("HttpGateway: log broadcast stopped");
        Ok(())
    }
}

impl fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpGateway")
            .field("config", &self.config)
            .field("cookies", &self.jar.len())
            .finish()
    }
}
