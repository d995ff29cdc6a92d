//! Builder for [`FeedListener`].
//!
//! Collects the application URL, credentials, broadcast settings, socket and
//! loop timings, and observers. Every numeric setting is validated when the
//! listener is built; unset values fall back to the `DEFAULT_*` constants of
//! the module that owns them.

use std::{io, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    dispatcher::{
        Diagnostic, DiagnosticObserver, Dispatcher, ObserverError, RecordObserver, StateObserver,
    },
    gateway::{BroadcastSettings, FeedControl, GatewayConfig, GatewayError, HttpGateway},
    level::LogLevel,
    record::Record,
    session::{
        ConnectionSession, Connector, Endpoint, SessionOptions, SocketOptions, WebSocketConnector,
    },
    state::ConnectionState,
    tls::TrustPolicy,
};

use super::{config::ListenerConfig, handle::FeedListener};

/// Errors raised while building a listener.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid listener configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(BuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for [`FeedListener`] instances.
#[derive(Clone, Debug, Default)]
pub struct ListenerBuilder {
    app_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    log_level: Option<LogLevel>,
    logger_pattern: Option<String>,
    buffer_capacity: Option<usize>,
    accept_invalid_certs: Option<bool>,
    connect_timeout_ms: Option<u64>,
    keep_alive_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    close_timeout_ms: Option<u64>,
    backoff_ms: Option<u64>,
    warn_interval_ms: Option<u64>,
    thread_name: Option<String>,
    headers: Vec<(String, String)>,
    dispatcher: Dispatcher,
}

impl ListenerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application URL the socket endpoint is derived from.
    pub fn with_app_url(mut self, app_url: impl Into<String>) -> Self {
        self.app_url = Some(app_url.into());
        self
    }

    /// Set the login used for every (re)connect.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the server-side logger pattern; empty matches every logger.
    pub fn with_logger_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.logger_pattern = Some(pattern.into());
        self
    }

    /// Add a header sent with the socket handshake.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Name the receive thread.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    option_setter!(
        #[doc = "Set the minimum level the server broadcasts."]
        with_log_level,
        log_level,
        LogLevel
    );
    option_setter!(
        #[doc = "Set the receive buffer capacity in bytes."]
        with_buffer_capacity,
        buffer_capacity,
        usize
    );
    option_setter!(
        #[doc = "Accept self-signed certificates and mismatched hostnames."]
        with_accept_invalid_certs,
        accept_invalid_certs,
        bool
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_keep_alive_ms, keep_alive_ms, u64);
    option_setter!(with_poll_interval_ms, poll_interval_ms, u64);
    option_setter!(with_close_timeout_ms, close_timeout_ms, u64);
    option_setter!(with_backoff_ms, backoff_ms, u64);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);

    /// Register an observer for decoded records.
    pub fn on_record<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Record) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.dispatcher.on_record(observer);
        self
    }

    /// Register an observer for state transitions.
    pub fn on_state_change<F>(mut self, observer: F) -> Self
    where
        F: Fn(ConnectionState) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.dispatcher.on_state_change(observer);
        self
    }

    /// Register an observer for diagnostics.
    pub fn on_diagnostic<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Diagnostic) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.dispatcher.on_diagnostic(observer);
        self
    }

    /// Replace every registered observer with those of `dispatcher`.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn subscribe_records(mut self, observer: Arc<dyn RecordObserver>) -> Self {
        self.dispatcher.subscribe_records(observer);
        self
    }

    pub fn subscribe_states(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.dispatcher.subscribe_states(observer);
        self
    }

    pub fn subscribe_diagnostics(mut self, observer: Arc<dyn DiagnosticObserver>) -> Self {
        self.dispatcher.subscribe_diagnostics(observer);
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        let app_url = self
            .app_url
            .as_deref()
            .ok_or_else(|| BuildError::InvalidConfig("app_url is required".into()))?;
        Endpoint::from_app_url(app_url).map_err(BuildError::InvalidConfig)?;
        if let Some(capacity) = self.buffer_capacity {
            ensure_positive!(capacity, "buffer_capacity")?;
        }
        for (value, field) in [
            (self.connect_timeout_ms, "connect_timeout_ms"),
            (self.keep_alive_ms, "keep_alive_ms"),
            (self.poll_interval_ms, "poll_interval_ms"),
            (self.close_timeout_ms, "close_timeout_ms"),
            (self.backoff_ms, "backoff_ms"),
            (self.warn_interval_ms, "warn_interval_ms"),
        ] {
            if let Some(value) = value {
                ensure_positive!(value, field)?;
            }
        }
        if self.thread_name.as_deref().is_some_and(str::is_empty) {
            return Err(BuildError::InvalidConfig(
                "thread_name must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn trust(&self) -> TrustPolicy {
        self.accept_invalid_certs
            .map(TrustPolicy::from_accept_invalid)
            .unwrap_or_default()
    }

    /// Session settings derived from this builder.
    pub fn session_options(&self) -> SessionOptions {
        let defaults = SessionOptions::default();
        SessionOptions {
            app_url: self.app_url.clone().unwrap_or_default(),
            broadcast: BroadcastSettings {
                level: self.log_level.unwrap_or_default(),
                pattern: self.logger_pattern.clone().unwrap_or_default(),
                ..BroadcastSettings::default()
            },
            buffer_capacity: self.buffer_capacity.unwrap_or(defaults.buffer_capacity),
            close_timeout: self
                .close_timeout_ms
                .map_or(defaults.close_timeout, Duration::from_millis),
        }
    }

    /// Socket settings derived from this builder.
    pub fn socket_options(&self) -> SocketOptions {
        let defaults = SocketOptions::default();
        SocketOptions {
            connect_timeout: self
                .connect_timeout_ms
                .map_or(defaults.connect_timeout, Duration::from_millis),
            keep_alive: self
                .keep_alive_ms
                .map_or(defaults.keep_alive, Duration::from_millis),
            poll_interval: self
                .poll_interval_ms
                .map_or(defaults.poll_interval, Duration::from_millis),
            trust: self.trust(),
            headers: self.headers.clone(),
        }
    }

    /// Loop settings derived from this builder.
    pub fn listener_config(&self) -> ListenerConfig {
        let defaults = ListenerConfig::default();
        ListenerConfig {
            backoff: self.backoff_ms.map_or(defaults.backoff, Duration::from_millis),
            warn_interval: self
                .warn_interval_ms
                .map_or(defaults.warn_interval, Duration::from_millis),
            thread_name: self.thread_name.clone().unwrap_or(defaults.thread_name),
        }
    }

    /// HTTP gateway settings derived from this builder.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            trust: self.trust(),
            ..GatewayConfig::new(
                self.app_url.clone().unwrap_or_default(),
                self.username.clone().unwrap_or_default(),
                self.password.clone().unwrap_or_default(),
            )
        }
    }

    /// Build a listener using a WebSocket connector and the HTTP gateway.
    pub fn build(self) -> Result<FeedListener<WebSocketConnector, HttpGateway>, BuildError> {
        if self.username.as_deref().is_none_or(str::is_empty) {
            return Err(BuildError::InvalidConfig("username is required".into()));
        }
        self.validate()?;
        let gateway = HttpGateway::new(self.gateway_config())?;
        let connector = WebSocketConnector::new(self.socket_options());
        self.build_with(connector, gateway)
    }

    /// Build a listener over caller-supplied collaborators.
    pub fn build_with<C, G>(
        self,
        connector: C,
        gateway: G,
    ) -> Result<FeedListener<C, G>, BuildError>
    where
        C: Connector + 'static,
        G: FeedControl + 'static,
    {
        self.validate()?;
        let dispatcher = Arc::new(self.dispatcher.clone());
        let session = ConnectionSession::new(
            connector,
            gateway,
            self.session_options(),
            Arc::clone(&dispatcher),
        );
        Ok(FeedListener::new(session, dispatcher, &self.listener_config()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingGateway, ScriptedConnector};
    use rstest::rstest;

    fn base() -> ListenerBuilder {
        ListenerBuilder::new().with_app_url("https://crm.example.com")
    }

    #[rstest]
    fn defaults_follow_module_constants() {
        let builder = base();
        assert_eq!(builder.listener_config(), ListenerConfig::default());
        let session = builder.session_options();
        assert_eq!(session.buffer_capacity, crate::buffer::DEFAULT_BUFFER_CAPACITY);
        assert_eq!(session.broadcast, BroadcastSettings::default());
        let socket = builder.socket_options();
        assert_eq!(socket.keep_alive, Duration::from_secs(30));
        assert_eq!(socket.trust, TrustPolicy::AcceptInvalid);
    }

    #[rstest]
    fn overrides_reach_every_component() {
        let builder = base()
            .with_log_level(LogLevel::Warn)
            .with_logger_pattern("Feed.*")
            .with_buffer_capacity(1024)
            .with_backoff_ms(50)
            .with_poll_interval_ms(10)
            .with_accept_invalid_certs(false)
            .with_thread_name("feed-test");
        assert_eq!(builder.session_options().broadcast.level, LogLevel::Warn);
        assert_eq!(builder.session_options().broadcast.pattern, "Feed.*");
        assert_eq!(builder.session_options().buffer_capacity, 1024);
        assert_eq!(builder.listener_config().backoff, Duration::from_millis(50));
        assert_eq!(builder.listener_config().thread_name, "feed-test");
        assert_eq!(builder.socket_options().poll_interval, Duration::from_millis(10));
        assert_eq!(builder.gateway_config().trust, TrustPolicy::Verify);
    }

    #[rstest]
    #[case(base().with_buffer_capacity(0), "buffer_capacity")]
    #[case(base().with_backoff_ms(0), "backoff_ms")]
    #[case(base().with_poll_interval_ms(0), "poll_interval_ms")]
    #[case(base().with_thread_name(""), "thread_name")]
    #[case(ListenerBuilder::new(), "app_url")]
    #[case(ListenerBuilder::new().with_app_url("ftp://host"), "unsupported scheme")]
    fn rejects_invalid_settings(#[case] builder: ListenerBuilder, #[case] field: &str) {
        let err = builder
            .build_with(ScriptedConnector::new(), RecordingGateway::new())
            .err()
            .expect("invalid configuration");
        assert!(matches!(err, BuildError::InvalidConfig(ref msg) if msg.contains(field)), "{err}");
    }

    #[rstest]
    fn websocket_build_requires_a_username() {
        let err = base().build().err().expect("missing username");
        assert!(matches!(err, BuildError::InvalidConfig(ref msg) if msg.contains("username")));
    }

    #[rstest]
    fn built_listener_starts_unconnected() {
        let listener = base()
            .build_with(ScriptedConnector::new(), RecordingGateway::new())
            .expect("valid configuration");
        assert_eq!(listener.state(), ConnectionState::Unconnected);
        assert!(!listener.is_running());
    }
}
