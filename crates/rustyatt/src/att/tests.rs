//! Tests for the ATT client

use super::*;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::join;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(1);
const QUIET: Duration = Duration::from_millis(100);

const VALUE_HANDLE: Handle = Handle::new(0x0037);

/// In-memory transport: the client end
struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl AttTransport for MockTransport {
    async fn read_frame(&mut self) -> io::Result<Vec<u8>> {
        self.inbound
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed"))
    }

    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.outbound
            .send(frame.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))?;
        Ok(frame.len())
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory transport: the remote end
struct MockPeer {
    to_client: mpsc::UnboundedSender<Vec<u8>>,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockPeer {
    fn send(&self, frame: &[u8]) {
        self.to_client.send(frame.to_vec()).unwrap();
    }

    async fn expect_frame(&mut self) -> Vec<u8> {
        timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("client closed the transport")
    }

    async fn expect_silence(&mut self) {
        let frame = timeout(QUIET, self.from_client.recv()).await;
        assert!(frame.is_err(), "unexpected frame {:?}", frame);
    }
}

fn connect_with(config: AttClientConfig) -> (AttClient, MockPeer) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();

    let client = AttClient::with_config(MockTransport { inbound, outbound }, config);
    (
        client,
        MockPeer {
            to_client,
            from_client,
        },
    )
}

fn connect() -> (AttClient, MockPeer) {
    connect_with(AttClientConfig {
        transaction_timeout: WAIT,
        ..AttClientConfig::default()
    })
}

/// Subscribe to `VALUE_HANDLE`, collecting notifications into a channel
async fn subscribe(client: &AttClient, peer: &mut MockPeer) -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x12, 0x38, 0x00, 0x01, 0x00]);
        peer.send(&[0x13]);
    };
    let callback = move |value: &[u8]| {
        let _ = tx.send(value.to_vec());
    };
    let (result, _) = join!(client.subscribe(VALUE_HANDLE, callback), peer_side);
    result.unwrap();

    rx
}

/// Complete one read of handle 0x0001, which flushes every frame the peer
/// sent before it through the connection task
async fn round_trip(client: &AttClient, peer: &mut MockPeer) {
    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x01, 0x00]);
        peer.send(&[0x0B, 0xAA]);
    };
    let (value, _) = join!(client.read(Handle::new(0x0001), WAIT), peer_side);
    assert_eq!(value.unwrap(), vec![0xAA]);
}

#[tokio::test]
async fn test_read_returns_value() {
    let (client, mut peer) = connect();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x37, 0x00]);
        peer.send(&[0x0B, 0x41, 0x42]);
    };
    let (value, _) = join!(client.read(VALUE_HANDLE, WAIT), peer_side);

    assert_eq!(value.unwrap(), vec![0x41, 0x42]);
}

#[tokio::test]
async fn test_reads_resolve_in_request_order() {
    let (client, mut peer) = connect();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x10, 0x00]);
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x20, 0x00]);
        peer.send(&[0x0B, 0x01]);
        peer.send(&[0x0B, 0x02]);
    };
    let (first, second, _) = join!(
        client.read(Handle::new(0x0010), WAIT),
        async {
            // Keep the second request behind the first on the wire
            sleep(Duration::from_millis(20)).await;
            client.read(Handle::new(0x0020), WAIT).await
        },
        peer_side
    );

    assert_eq!(first.unwrap(), vec![0x01]);
    assert_eq!(second.unwrap(), vec![0x02]);
}

#[tokio::test]
async fn test_write_waits_for_response() {
    let (client, mut peer) = connect();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x12, 0x3A, 0x00, 0x70, 0x61]);
        peer.send(&[0x13]);
    };
    let (result, _) = join!(client.write(Handle::new(0x003A), &[0x70, 0x61]), peer_side);

    result.unwrap();
}

#[tokio::test]
async fn test_write_response_resolves_oldest_write_only() {
    let (client, mut peer) = connect();
    let client = Arc::new(client);

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.write(Handle::new(0x0040), &[0x01]).await }
    });
    assert_eq!(peer.expect_frame().await, vec![0x12, 0x40, 0x00, 0x01]);

    let second = tokio::spawn({
        let client = client.clone();
        async move { client.write(Handle::new(0x0050), &[0x02]).await }
    });
    assert_eq!(peer.expect_frame().await, vec![0x12, 0x50, 0x00, 0x02]);

    peer.send(&[0x13]);
    timeout(WAIT, first).await.unwrap().unwrap().unwrap();

    sleep(QUIET).await;
    assert!(!second.is_finished());

    peer.send(&[0x13]);
    timeout(WAIT, second).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_write_command_needs_no_response() {
    let (client, mut peer) = connect();

    client
        .write_command(Handle::new(0x003A), &[0x70, 0x0D])
        .await
        .unwrap();

    assert_eq!(peer.expect_frame().await, vec![0x52, 0x3A, 0x00, 0x70, 0x0D]);
}

#[tokio::test]
async fn test_subscribe_delivers_notification_once() {
    let (client, mut peer) = connect();
    let mut notifications = subscribe(&client, &mut peer).await;

    peer.send(&[0x1B, 0x37, 0x00, 0x41, 0x42]);

    let value = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert_eq!(value, vec![0x41, 0x42]);

    round_trip(&client, &mut peer).await;
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_notifications_keep_arrival_order() {
    let (client, mut peer) = connect();
    let mut notifications = subscribe(&client, &mut peer).await;

    for i in 0..5u8 {
        peer.send(&[0x1B, 0x37, 0x00, i]);
    }

    for i in 0..5u8 {
        let value = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
        assert_eq!(value, vec![i]);
    }
}

#[tokio::test]
async fn test_callback_registered_only_after_ccc_write_acknowledged() {
    let (client, mut peer) = connect();
    let (tx, mut notifications) = mpsc::unbounded_channel();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x12, 0x38, 0x00, 0x01, 0x00]);
        peer.send(&[0x1B, 0x37, 0x00, 0x01]);
        peer.send(&[0x13]);
    };
    let callback = move |value: &[u8]| {
        let _ = tx.send(value.to_vec());
    };
    let (result, _) = join!(client.subscribe(VALUE_HANDLE, callback), peer_side);
    result.unwrap();

    peer.send(&[0x1B, 0x37, 0x00, 0x02]);

    let value = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert_eq!(value, vec![0x02]);
}

#[tokio::test]
async fn test_subscribe_replaces_previous_callback() {
    let (client, mut peer) = connect();
    let mut old = subscribe(&client, &mut peer).await;
    let mut new = subscribe(&client, &mut peer).await;

    peer.send(&[0x1B, 0x37, 0x00, 0x07]);

    let value = timeout(WAIT, new.recv()).await.unwrap().unwrap();
    assert_eq!(value, vec![0x07]);
    assert!(old.try_recv().is_err());
}

#[tokio::test]
async fn test_subscribe_rejects_last_handle() {
    let (client, mut peer) = connect();

    let result = client.subscribe(Handle::new(0xFFFF), |_: &[u8]| {}).await;

    assert!(matches!(result, Err(AttError::InvalidHandle(0x10000))));
    peer.expect_silence().await;
}

#[tokio::test]
async fn test_indication_is_confirmed() {
    let (client, mut peer) = connect();
    let (tx, mut indications) = mpsc::unbounded_channel();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x12, 0x38, 0x00, 0x02, 0x00]);
        peer.send(&[0x13]);
    };
    let callback = move |value: &[u8]| {
        let _ = tx.send(value.to_vec());
    };
    let (result, _) = join!(client.subscribe_indications(VALUE_HANDLE, callback), peer_side);
    result.unwrap();

    peer.send(&[0x1D, 0x37, 0x00, 0x05]);

    assert_eq!(peer.expect_frame().await, vec![0x1E]);
    let value = timeout(WAIT, indications.recv()).await.unwrap().unwrap();
    assert_eq!(value, vec![0x05]);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (client, mut peer) = connect();
    let mut notifications = subscribe(&client, &mut peer).await;

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x12, 0x38, 0x00, 0x00, 0x00]);
        peer.send(&[0x13]);
    };
    let (result, _) = join!(client.unsubscribe(VALUE_HANDLE), peer_side);
    result.unwrap();

    peer.send(&[0x1B, 0x37, 0x00, 0x41]);
    round_trip(&client, &mut peer).await;

    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_unhandled_notification_is_dropped() {
    let (client, mut peer) = connect();

    peer.send(&[0x1B, 0x99, 0x00, 0x01]);

    round_trip(&client, &mut peer).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_read_timeout_leaves_connection_usable() {
    let (client, mut peer) = connect();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x10, 0x00]);
    };
    let (result, _) = join!(
        client.read(Handle::new(0x0010), Duration::from_millis(100)),
        peer_side
    );
    assert!(matches!(result, Err(AttError::ReadTimeout(h)) if h == Handle::new(0x0010)));
    assert!(client.is_connected());

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x20, 0x00]);
        peer.send(&[0x0B, 0x07]);
    };
    let (value, _) = join!(client.read(Handle::new(0x0020), WAIT), peer_side);
    assert_eq!(value.unwrap(), vec![0x07]);
}

#[tokio::test]
async fn test_late_read_response_before_next_read_is_discarded() {
    let (client, mut peer) = connect();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x10, 0x00]);
    };
    let (result, _) = join!(
        client.read(Handle::new(0x0010), Duration::from_millis(50)),
        peer_side
    );
    assert!(result.unwrap_err().is_timeout());

    peer.send(&[0x0B, 0x09]);
    sleep(QUIET).await;

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x10, 0x00]);
        peer.send(&[0x0B, 0x07]);
    };
    let (value, _) = join!(client.read(Handle::new(0x0010), WAIT), peer_side);
    assert_eq!(value.unwrap(), vec![0x07]);
}

#[tokio::test]
async fn test_late_read_response_resolves_next_read() {
    let (client, mut peer) = connect();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x10, 0x00]);
    };
    let (result, _) = join!(
        client.read(Handle::new(0x0010), Duration::from_millis(50)),
        peer_side
    );
    assert!(result.unwrap_err().is_timeout());

    // Responses carry no handle, so the stale value answers the next read
    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x20, 0x00]);
        peer.send(&[0x0B, 0xAA]);
        peer.send(&[0x0B, 0xBB]);
    };
    let (value, _) = join!(client.read(Handle::new(0x0020), WAIT), peer_side);
    assert_eq!(value.unwrap(), vec![0xAA]);

    sleep(QUIET).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_write_timeout() {
    let (client, mut peer) = connect_with(AttClientConfig {
        transaction_timeout: Duration::from_millis(100),
        ..AttClientConfig::default()
    });

    let peer_side = async {
        peer.expect_frame().await;
    };
    let (result, _) = join!(client.write(Handle::new(0x0040), &[0x01]), peer_side);
    assert!(matches!(result, Err(AttError::WriteTimeout(h)) if h == Handle::new(0x0040)));

    let peer_side = async {
        peer.expect_frame().await;
        peer.send(&[0x13]);
    };
    let (result, _) = join!(client.write(Handle::new(0x0041), &[0x02]), peer_side);
    result.unwrap();
}

#[tokio::test]
async fn test_error_response_fails_pending_read() {
    let (client, mut peer) = connect();

    let peer_side = async {
        peer.expect_frame().await;
        peer.send(&[0x01, 0x0A, 0x37, 0x00, 0x02]);
    };
    let (result, _) = join!(client.read(VALUE_HANDLE, WAIT), peer_side);

    match result {
        Err(AttError::Protocol {
            request,
            handle,
            code,
        }) => {
            assert_eq!(request, Opcode::ReadRequest);
            assert_eq!(handle, VALUE_HANDLE);
            assert_eq!(code, AttErrorCode::ReadNotPermitted);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_error_response_fails_pending_write() {
    let (client, mut peer) = connect();

    let peer_side = async {
        peer.expect_frame().await;
        peer.send(&[0x01, 0x12, 0x38, 0x00, 0x03]);
    };
    let (result, _) = join!(client.subscribe(VALUE_HANDLE, |_: &[u8]| {}), peer_side);

    assert_eq!(
        result.unwrap_err().error_code(),
        Some(AttErrorCode::WriteNotPermitted)
    );
}

#[tokio::test]
async fn test_error_response_without_handle_fails_oldest_write() {
    let (client, mut peer) = connect();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x12, 0x40, 0x00, 0x01]);
        peer.send(&[0x01, 0x12, 0x00, 0x00, 0x06]);
    };
    let (result, _) = join!(client.write(Handle::new(0x0040), &[0x01]), peer_side);

    match result {
        Err(AttError::Protocol {
            request,
            handle,
            code,
        }) => {
            assert_eq!(request, Opcode::WriteRequest);
            assert_eq!(handle, Handle::new(0x0000));
            assert_eq!(code, AttErrorCode::RequestNotSupported);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_error_response_without_handle_fails_oldest_read() {
    let (client, mut peer) = connect();

    let peer_side = async {
        assert_eq!(peer.expect_frame().await, vec![0x0A, 0x37, 0x00]);
        peer.send(&[0x01, 0x0A, 0x00, 0x00, 0x11]);
    };
    let (result, _) = join!(client.read(VALUE_HANDLE, WAIT), peer_side);

    assert_eq!(
        result.unwrap_err().error_code(),
        Some(AttErrorCode::InsufficientResources)
    );

    round_trip(&client, &mut peer).await;
}

#[tokio::test]
async fn test_find_by_type_value_request_is_rejected() {
    let (client, mut peer) = connect();

    peer.send(&[0x06, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28, 0x0D, 0x18]);

    assert_eq!(peer.expect_frame().await, vec![0x01, 0x06, 0x00, 0x00, 0x06]);
    peer.expect_silence().await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_other_peer_requests_are_ignored() {
    let (client, mut peer) = connect();

    peer.send(&[0x0A, 0x01, 0x00]);
    peer.send(&[0x02, 0x17, 0x00]);

    peer.expect_silence().await;
    round_trip(&client, &mut peer).await;
}

#[tokio::test]
async fn test_malformed_frames_do_not_interrupt_processing() {
    let (client, mut peer) = connect();
    let mut notifications = subscribe(&client, &mut peer).await;

    peer.send(&[0xFF]);
    peer.send(&[]);
    peer.send(&[0x01, 0x0A, 0x00]);
    peer.send(&[0x1B, 0x37]);
    peer.send(&[0x01, 0x0A, 0x00, 0x00, 0x99]);
    peer.send(&[0x1B, 0x37, 0x00, 0x01]);
    peer.send(&[0x14, 0x00]);
    peer.send(&[0x1B, 0x37, 0x00, 0x02]);

    for expected in [vec![0x01], vec![0x02]] {
        let value = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
        assert_eq!(value, expected);
    }

    round_trip(&client, &mut peer).await;
}

#[tokio::test]
async fn test_transport_failure_fails_pending_requests() {
    let (client, peer) = connect();
    let MockPeer {
        to_client,
        mut from_client,
    } = peer;

    let peer_side = async move {
        from_client.recv().await;
        drop(to_client);
        from_client
    };
    let (result, _from_client) = join!(client.read(VALUE_HANDLE, WAIT), peer_side);

    assert!(matches!(result, Err(AttError::ConnectionClosed)));
    assert!(!client.is_connected());
    assert!(matches!(
        client.read(VALUE_HANDLE, WAIT).await,
        Err(AttError::ConnectionClosed)
    ));
    assert!(matches!(client.close().await, Err(AttError::Transport(_))));
}

#[tokio::test]
async fn test_close_shuts_down_connection() {
    let (client, mut peer) = connect();

    client.close().await.unwrap();

    let frame = timeout(WAIT, peer.from_client.recv()).await.unwrap();
    assert!(frame.is_none());
}
