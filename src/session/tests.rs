//! Unit tests for `ConnectionSession` against scripted collaborators.

use std::sync::Arc;

use rstest::{fixture, rstest};

use crate::cancel::CancelSource;
use crate::dispatcher::Dispatcher;
use crate::error::FeedError;
use crate::gateway::BroadcastSettings;
use crate::level::LogLevel;
use crate::state::ConnectionState;
use crate::test_utils::{Collector, GatewayCall, RecordingGateway, ScriptedConnector, Step};

use super::{ConnectError, ConnectionSession, MessageKind, SessionOptions};

type Session = ConnectionSession<ScriptedConnector, RecordingGateway>;

#[fixture]
fn collector() -> Collector {
    Collector::new()
}

fn options() -> SessionOptions {
    SessionOptions {
        broadcast: BroadcastSettings {
            level: LogLevel::Error,
            pattern: "Feed.*".into(),
            buffer_size: 1,
        },
        buffer_capacity: 64,
        ..SessionOptions::new("https://crm.example.com/app/")
    }
}

fn session(
    connector: ScriptedConnector,
    gateway: RecordingGateway,
    collector: &Collector,
) -> Session {
    let mut dispatcher = Dispatcher::new();
    collector.attach(&mut dispatcher);
    ConnectionSession::new(connector, gateway, options(), Arc::new(dispatcher))
}

#[rstest]
fn connect_logs_in_opens_socket_and_starts_broadcast(collector: Collector) {
    let connector = ScriptedConnector::new().open([]);
    let gateway = RecordingGateway::new();
    let mut session = session(connector.clone(), gateway.clone(), &collector);

    session.connect().expect("connect succeeds");

    assert_eq!(session.state(), ConnectionState::Open);
    assert_eq!(
        collector.states(),
        vec![ConnectionState::Connecting, ConnectionState::Open]
    );
    assert_eq!(
        gateway.calls(),
        vec![
            GatewayCall::Login,
            GatewayCall::StartBroadcast(options().broadcast)
        ]
    );
    assert_eq!(
        connector.endpoints(),
        vec!["wss://crm.example.com/app/0/Nui/ViewModule.aspx.ashx".to_owned()]
    );
    assert_eq!(connector.credentials(), vec![RecordingGateway::credentials()]);
}

#[rstest]
fn rejected_login_is_an_authentication_failure(collector: Collector) {
    let gateway = RecordingGateway::new().fail_logins(1);
    let connector = ScriptedConnector::new();
    let mut session = session(connector.clone(), gateway, &collector);

    let err = session.connect().expect_err("login rejected");
    assert!(matches!(err, ConnectError::Authentication(_)));
    assert!(connector.attempts().is_empty());
    assert_eq!(session.state(), ConnectionState::Connecting);
}

#[rstest]
fn failed_activation_drops_the_socket(collector: Collector) {
    let gateway = RecordingGateway::new().fail_starts(1);
    let mut session = session(ScriptedConnector::new().open([]), gateway, &collector);

    let err = session.connect().expect_err("activation fails");
    assert!(matches!(err, ConnectError::Activation(_)));
    let receive = session.receive(&CancelSource::new().token());
    assert!(matches!(
        receive,
        Err(FeedError::Receive(super::ReceiveError::NotConnected))
    ));
}

#[rstest]
fn text_advances_the_cursor_but_binary_does_not(collector: Collector) {
    let connector = ScriptedConnector::new().open([Step::fragment("abc"), Step::binary(10)]);
    let mut session = session(connector, RecordingGateway::new(), &collector);
    session.connect().expect("connect");
    let cancel = CancelSource::new();

    let text = session.receive(&cancel.token()).expect("text chunk");
    assert_eq!(text.kind, MessageKind::Text);
    assert!(!text.end_of_message);
    assert_eq!(session.buffer().filled(), b"abc");

    let binary = session.receive(&cancel.token()).expect("binary chunk");
    assert_eq!(binary.kind, MessageKind::Binary);
    assert_eq!(binary.count, 10);
    assert_eq!(session.buffer().filled(), b"abc");
}

#[rstest]
fn full_buffer_is_a_capacity_fault(collector: Collector) {
    let connector =
        ScriptedConnector::new().open([Step::fragment([b'x'; 64]), Step::fragment("y")]);
    let mut session = session(connector, RecordingGateway::new(), &collector);
    session.connect().expect("connect");
    let cancel = CancelSource::new();

    session.receive(&cancel.token()).expect("fills the buffer");
    let err = session.receive(&cancel.token()).expect_err("no space left");
    assert!(matches!(err, FeedError::Capacity(fault) if fault.capacity == 64));
}

#[rstest]
fn delimiter_after_a_full_buffer_is_accepted(collector: Collector) {
    let connector =
        ScriptedConnector::new().open([Step::fragment([b'x'; 64]), Step::fragment("\u{1e}")]);
    let mut session = session(connector, RecordingGateway::new(), &collector);
    session.connect().expect("connect");
    let cancel = CancelSource::new();

    session.receive(&cancel.token()).expect("fills the buffer");
    let receipt = session.receive(&cancel.token()).expect("delimiter fits");
    assert_eq!(receipt.count, 1);
    assert_eq!(session.buffer().len(), 65);
    assert_eq!(session.buffer().filled().last(), Some(&0x1e));
}

#[rstest]
fn reconnect_starts_from_an_empty_buffer(collector: Collector) {
    let connector = ScriptedConnector::new()
        .open([Step::fragment("stale")])
        .open([Step::text("fresh")]);
    let mut session = session(connector, RecordingGateway::new(), &collector);
    let cancel = CancelSource::new();

    session.connect().expect("first connect");
    session.receive(&cancel.token()).expect("partial record");
    assert_eq!(session.buffer().len(), 5);

    session.mark_faulted();
    assert!(session.buffer().is_empty());
    session.connect().expect("second connect");
    session.receive(&cancel.token()).expect("fresh record");
    assert_eq!(session.buffer().filled(), b"fresh");
}

#[rstest]
fn disconnect_stops_broadcast_and_is_idempotent(collector: Collector) {
    let connector = ScriptedConnector::new().open([]);
    let gateway = RecordingGateway::new();
    let mut session = session(connector.clone(), gateway.clone(), &collector);
    session.connect().expect("connect");

    session.disconnect();
    session.disconnect();

    assert_eq!(gateway.count(&GatewayCall::StopBroadcast), 1);
    assert_eq!(connector.closes(), 1);
    assert_eq!(
        collector.states(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ]
    );
}

#[rstest]
fn disconnect_without_broadcast_skips_stop(collector: Collector) {
    let gateway = RecordingGateway::new();
    let mut session = session(ScriptedConnector::new(), gateway.clone(), &collector);
    session.disconnect();
    assert_eq!(gateway.count(&GatewayCall::StopBroadcast), 0);
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[rstest]
fn graceful_close_passes_through_closing(collector: Collector) {
    let connector = ScriptedConnector::new().open([Step::Close]);
    let mut session = session(connector.clone(), RecordingGateway::new(), &collector);
    session.connect().expect("connect");
    let receipt = session.receive(&CancelSource::new().token()).expect("close");
    assert_eq!(receipt.kind, MessageKind::Close);

    session.close_gracefully();
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(connector.closes(), 1);
    assert_eq!(
        collector.states()[2..],
        [ConnectionState::Closing, ConnectionState::Closed]
    );
}

#[rstest]
fn repeated_state_is_not_renotified(collector: Collector) {
    let mut session = session(ScriptedConnector::new(), RecordingGateway::new(), &collector);
    session.mark_faulted();
    session.mark_faulted();
    assert_eq!(collector.states(), vec![ConnectionState::Faulted]);
}

#[rstest]
fn cancelled_receive_reports_cancellation(collector: Collector) {
    let connector = ScriptedConnector::new().open([]);
    let mut session = session(connector, RecordingGateway::new(), &collector);
    session.connect().expect("connect");
    let cancel = CancelSource::new();
    cancel.cancel();
    let err = session.receive(&cancel.token()).expect_err("cancelled");
    assert!(err.is_cancellation());
}
