//! Shared helpers for integration tests driving a listener over scripted
//! collaborators.

use std::thread;
use std::time::{Duration, Instant};

use logfeed::test_utils::{Collector, RecordingGateway, ScriptedConnector};
use logfeed::{Dispatcher, FeedListener, ListenerBuilder};

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Build and start a listener whose observers feed `collector`.
///
/// # Arguments
/// * `backoff_ms` – fixed wait between a fault and the next connect.
pub fn listener_for(
    connector: &ScriptedConnector,
    gateway: &RecordingGateway,
    collector: &Collector,
    backoff_ms: u64,
    configure: impl FnOnce(ListenerBuilder) -> ListenerBuilder,
) -> FeedListener<ScriptedConnector, RecordingGateway> {
    let mut dispatcher = Dispatcher::new();
    collector.attach(&mut dispatcher);
    let builder = ListenerBuilder::new()
        .with_app_url("http://feed.test/app")
        .with_backoff_ms(backoff_ms)
        .with_dispatcher(dispatcher);
    let mut listener = configure(builder)
        .build_with(connector.clone(), gateway.clone())
        .expect("valid listener configuration");
    listener.start().expect("spawn receive thread");
    listener
}
