//! WebSocket transport built on `tungstenite` and `native-tls`.
//!
//! The socket is blocking with a short read timeout. Each timeout returns
//! control to [`WebSocketTransport::receive`], which checks the cancellation
//! token and sends a keep-alive ping when the connection has been idle for the
//! configured interval, then resumes reading. `tungstenite` buffers partially
//! read frames internally, so resuming after a timeout loses nothing.

use std::{
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use log::{debug, warn};
use tungstenite::{
    Message, WebSocket,
    client::IntoClientRequest,
    http::{HeaderName, HeaderValue, Request},
    stream::MaybeTlsStream,
};

use crate::cancel::CancelToken;
use crate::gateway::Credentials;
use crate::tls::TrustPolicy;

use super::endpoint::Endpoint;
use super::transport::{ConnectError, Connector, FeedTransport, MessageKind, Receipt, ReceiveError};

/// Default timeout for the TCP connect and the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default idle interval after which a ping is sent.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
/// Default socket read timeout, bounding how long cancellation can go unnoticed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Headers sent with every handshake in addition to the session cookie.
pub const DEFAULT_HEADERS: [(&str, &str); 3] = [
    ("Accept-Encoding", "gzip,deflate"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Cache-Control", "no-cache"),
];

/// Options applied to each WebSocket connection.
#[derive(Clone, Debug)]
pub struct SocketOptions {
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
    pub poll_interval: Duration,
    pub trust: TrustPolicy,
    /// Extra handshake headers, sent after [`DEFAULT_HEADERS`].
    pub headers: Vec<(String, String)>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            trust: TrustPolicy::default(),
            headers: Vec::new(),
        }
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Opens [`WebSocketTransport`]s.
#[derive(Clone, Debug, Default)]
pub struct WebSocketConnector {
    options: SocketOptions,
}

impl WebSocketConnector {
    pub fn new(options: SocketOptions) -> Self {
        Self { options }
    }

    fn build_request(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Request<()>, ConnectError> {
        let mut request = endpoint
            .url()
            .into_client_request()
            .map_err(|err| ConnectError::Endpoint(err.to_string()))?;
        let headers = request.headers_mut();
        let defaults = DEFAULT_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()));
        let cookie = credentials
            .cookie_header()
            .map(|value| ("Cookie".to_owned(), value));
        for (name, value) in defaults
            .chain(self.options.headers.iter().cloned())
            .chain(cookie)
        {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ConnectError::Handshake(format!("header {name}: {err}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|err| ConnectError::Handshake(format!("header {name}: {err}")))?;
            headers.insert(name, value);
        }
        Ok(request)
    }
}

impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<WebSocketTransport, ConnectError> {
        let request = self.build_request(endpoint, credentials)?;
        let timeout = self.options.connect_timeout;
        let stream = connect_tcp(endpoint, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let connector = if endpoint.is_secure() {
            tungstenite::Connector::NativeTls(self.options.trust.connector()?)
        } else {
            tungstenite::Connector::Plain
        };
        let (socket, response) =
            tungstenite::client_tls_with_config(request, stream, None, Some(connector))
                .map_err(|err| ConnectError::Handshake(err.to_string()))?;
        debug!(
            "WebSocketConnector: handshake with {} completed ({})",
            endpoint.url(),
            response.status()
        );

        let mut transport = WebSocketTransport {
            socket,
            pending: None,
            keep_alive: self.options.keep_alive,
            last_activity: Instant::now(),
        };
        transport.set_timeouts(Some(self.options.poll_interval), None)?;
        Ok(transport)
    }
}

fn connect_tcp(endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (endpoint.host(), endpoint.port())
        .to_socket_addrs()?
        .collect();
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!(
                "no addresses resolved for {}:{}",
                endpoint.host(),
                endpoint.port()
            ),
        )
    }))
}

/// A message being handed out across several receipts.
struct Pending {
    kind: MessageKind,
    payload: Vec<u8>,
    offset: usize,
}

/// Open WebSocket connection yielding message payloads as chunks.
///
/// A message larger than the caller's slice is delivered over several
/// receipts; only the last one has `end_of_message` set.
pub struct WebSocketTransport {
    socket: Socket,
    pending: Option<Pending>,
    keep_alive: Duration,
    last_activity: Instant,
}

impl WebSocketTransport {
    fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        let tcp = match self.socket.get_ref() {
            MaybeTlsStream::Plain(stream) => stream,
            MaybeTlsStream::NativeTls(stream) => stream.get_ref(),
            _ => return Ok(()),
        };
        tcp.set_read_timeout(read)?;
        tcp.set_write_timeout(write)
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> Option<Receipt> {
        let pending = self.pending.as_mut()?;
        let remaining = &pending.payload[pending.offset..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        pending.offset += count;
        let end_of_message = pending.offset == pending.payload.len();
        let receipt = Receipt {
            count,
            end_of_message,
            kind: pending.kind,
        };
        if end_of_message {
            self.pending = None;
        }
        Some(receipt)
    }

    fn ping_if_idle(&mut self) -> Result<(), ReceiveError> {
        if self.last_activity.elapsed() < self.keep_alive {
            return Ok(());
        }
        self.socket
            .send(Message::Ping(Default::default()))
            .map_err(receive_error)?;
        self.last_activity = Instant::now();
        Ok(())
    }
}

impl FeedTransport for WebSocketTransport {
    fn receive(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<Receipt, ReceiveError> {
        loop {
            if let Some(receipt) = self.take_pending(buf) {
                return Ok(receipt);
            }
            if cancel.is_cancelled() {
                return Err(ReceiveError::Cancelled);
            }
            match self.socket.read() {
                Ok(message) => {
                    self.last_activity = Instant::now();
                    let (kind, payload) = match message {
                        Message::Text(text) => (MessageKind::Text, text.as_bytes().to_vec()),
                        Message::Binary(data) => (MessageKind::Binary, data.to_vec()),
                        Message::Close(_) => return Ok(Receipt::close()),
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                    };
                    self.pending = Some(Pending {
                        kind,
                        payload,
                        offset: 0,
                    });
                }
                Err(tungstenite::Error::Io(err)) if is_timeout(&err) => self.ping_if_idle()?,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(Receipt::close());
                }
                Err(err) => return Err(receive_error(err)),
            }
        }
    }

    fn close(&mut self, timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        if let Err(err) = self.socket.close(None) {
            return match err {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Ok(()),
                other => Err(io::Error::other(other.to_string())),
            };
        }
        while Instant::now() < deadline {
            match self.socket.read() {
                Ok(_) => continue,
                Err(tungstenite::Error::Io(err)) if is_timeout(&err) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(());
                }
                Err(err) => return Err(io::Error::other(err.to_string())),
            }
        }
        warn!("WebSocketTransport: peer did not acknowledge close within {timeout:?}");
        Ok(())
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn receive_error(err: tungstenite::Error) -> ReceiveError {
    match err {
        tungstenite::Error::Io(io) => ReceiveError::Io(io),
        other => ReceiveError::Protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Cookie;
    use rstest::rstest;
    use std::net::TcpListener;

    fn endpoint(app_url: &str) -> Endpoint {
        Endpoint::from_app_url(app_url).expect("valid app url")
    }

    #[rstest]
    fn request_carries_feed_headers_and_cookies() {
        let connector = WebSocketConnector::new(SocketOptions {
            headers: vec![("X-Client".into(), "logfeed".into())],
            ..SocketOptions::default()
        });
        let credentials = Credentials::new(vec![Cookie::new("BPMCSRF", "token")]);
        let request = connector
            .build_request(&endpoint("https://crm.example.com"), &credentials)
            .expect("request builds");

        let headers = request.headers();
        assert_eq!(headers["accept-encoding"], "gzip,deflate");
        assert_eq!(headers["accept-language"], "en-US,en;q=0.9");
        assert_eq!(headers["cache-control"], "no-cache");
        assert_eq!(headers["x-client"], "logfeed");
        assert_eq!(headers["cookie"], "BPMCSRF=token");
        assert_eq!(
            request.uri().to_string(),
            "wss://crm.example.com/0/Nui/ViewModule.aspx.ashx"
        );
    }

    #[rstest]
    fn request_without_cookies_omits_the_header() {
        let request = WebSocketConnector::default()
            .build_request(&endpoint("http://localhost:8080"), &Credentials::default())
            .expect("request builds");
        assert!(request.headers().get("cookie").is_none());
    }

    #[rstest]
    fn invalid_header_is_a_handshake_error() {
        let connector = WebSocketConnector::new(SocketOptions {
            headers: vec![("Bad Header".into(), "x".into())],
            ..SocketOptions::default()
        });
        let err = connector
            .build_request(&endpoint("http://localhost"), &Credentials::default())
            .expect_err("space in header name");
        assert!(matches!(err, ConnectError::Handshake(_)));
    }

    #[rstest]
    fn refused_connection_is_an_io_error() {
        let port = {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let mut connector = WebSocketConnector::new(SocketOptions {
            connect_timeout: Duration::from_secs(1),
            ..SocketOptions::default()
        });
        let err = connector
            .connect(
                &endpoint(&format!("http://127.0.0.1:{port}")),
                &Credentials::default(),
            )
            .err()
            .expect("nothing listening");
        assert!(matches!(err, ConnectError::Io(_)), "{err}");
    }

    #[rstest]
    fn non_websocket_peer_fails_the_handshake() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        std::thread::spawn(move || {
            use std::io::{Read, Write};
            if let Ok((mut stream, _)) = listener.accept() {
                let mut scratch = [0u8; 1024];
                let _ = stream.read(&mut scratch);
                let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
            }
        });
        let mut connector = WebSocketConnector::default();
        let err = connector
            .connect(
                &endpoint(&format!("http://127.0.0.1:{port}")),
                &Credentials::default(),
            )
            .err()
            .expect("plain HTTP peer");
        assert!(matches!(err, ConnectError::Handshake(_)), "{err}");
    }
}
