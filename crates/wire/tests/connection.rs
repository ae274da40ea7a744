//! Integration tests for the connection reader and sender tasks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use wire::testing::MemoryTransport;
use wire::{
    Connection, ConnectionConfig, DisconnectReason, FrameHandler, ProtocolFrame, Transport, split,
};

#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<ProtocolFrame>>,
    disconnects: Mutex<Vec<DisconnectReason>>,
    notify: Notify,
}

impl FrameHandler for Recorder {
    fn on_frame_received(&self, frame: ProtocolFrame) {
        self.frames.lock().unwrap().push(frame);
        self.notify.notify_one();
    }

    fn on_disconnected(&self, reason: DisconnectReason) {
        self.disconnects.lock().unwrap().push(reason);
        self.notify.notify_one();
    }
}

impl Recorder {
    async fn wait_until(&self, pred: impl Fn(&Recorder) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !pred(self) {
                self.notify.notified().await;
            }
        })
        .await
        .expect("timed out waiting for recorder");
    }
}

#[tokio::test]
async fn frames_are_delivered_in_wire_order() {
    let (client, debuggee) = MemoryTransport::pair();
    let recorder = Arc::new(Recorder::default());
    let _connection = Connection::start(client, recorder.clone(), &ConnectionConfig::default());

    let (_reader, mut writer) = split(debuggee);
    for seq in [6, 2, 4] {
        writer
            .send(ProtocolFrame::new(105, seq, "<xml></xml>"))
            .await
            .unwrap();
    }

    recorder
        .wait_until(|r| r.frames.lock().unwrap().len() == 3)
        .await;
    let seqs: Vec<_> = recorder
        .frames
        .lock()
        .unwrap()
        .iter()
        .map(ProtocolFrame::sequence)
        .collect();
    assert_eq!(seqs, vec![6, 2, 4]);
}

#[tokio::test]
async fn concurrent_sends_do_not_interleave() {
    let (client, debuggee) = MemoryTransport::pair();
    let recorder = Arc::new(Recorder::default());
    let connection = Arc::new(Connection::start(
        client,
        recorder,
        &ConnectionConfig {
            outbound_buffer: 4,
            ..Default::default()
        },
    ));

    let mut handles = Vec::new();
    for i in 0..20 {
        let connection = connection.clone();
        handles.push(tokio::spawn(async move {
            let payload = format!("t{i}\t{i}\tLOCAL\t{}", "x".repeat(1000));
            connection
                .send(ProtocolFrame::new(110, 2 * i + 1, payload))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let (mut reader, _writer) = split(debuggee);
    let mut seen = Vec::new();
    for _ in 0..20 {
        let frame = reader.next().await.unwrap().unwrap();
        let expected_prefix = format!("t{}\t", (frame.sequence() - 1) / 2);
        assert!(frame.payload().starts_with(&expected_prefix));
        seen.push(frame.sequence());
    }
    seen.sort();
    assert_eq!(seen, (0..20).map(|i| 2 * i + 1).collect::<Vec<_>>());
}

#[tokio::test]
async fn malformed_bytes_tear_down_the_connection() {
    let (client, debuggee) = MemoryTransport::pair();
    let recorder = Arc::new(Recorder::default());
    let connection = Connection::start(client, recorder.clone(), &ConnectionConfig::default());

    let (_read, mut write) = debuggee.into_split();
    write.write_all(b"not-a-number\t1\tx\n").await.unwrap();

    recorder
        .wait_until(|r| !r.disconnects.lock().unwrap().is_empty())
        .await;
    assert!(matches!(
        recorder.disconnects.lock().unwrap()[0],
        DisconnectReason::Decode(_)
    ));
    assert!(!connection.is_connected());
    assert!(!connection.send(ProtocolFrame::new(102, 1, "")).await);
}

#[tokio::test]
async fn disconnect_is_reported_once() {
    let (client, debuggee) = MemoryTransport::pair();
    let recorder = Arc::new(Recorder::default());
    let connection = Connection::start(client, recorder.clone(), &ConnectionConfig::default());

    connection.disconnect();
    connection.disconnect();
    connection.close().await;
    drop(debuggee);

    assert_eq!(
        *recorder.disconnects.lock().unwrap(),
        vec![DisconnectReason::Closed]
    );
    assert!(!connection.send(ProtocolFrame::new(102, 1, "")).await);
}

#[tokio::test]
async fn peer_eof_is_reported() {
    let (client, debuggee) = MemoryTransport::pair();
    let recorder = Arc::new(Recorder::default());
    let _connection = Connection::start(client, recorder.clone(), &ConnectionConfig::default());

    drop(debuggee);

    recorder
        .wait_until(|r| !r.disconnects.lock().unwrap().is_empty())
        .await;
    assert_eq!(
        recorder.disconnects.lock().unwrap()[0],
        DisconnectReason::Eof
    );
}

#[tokio::test]
async fn close_flushes_queued_frames() {
    let (client, debuggee) = MemoryTransport::pair();
    let recorder = Arc::new(Recorder::default());
    let connection = Connection::start(client, recorder, &ConnectionConfig::default());

    assert!(connection.send(ProtocolFrame::new(106, 1, "t1")).await);
    connection.close().await;

    let (mut reader, _writer) = split(debuggee);
    let frame = reader.next().await.unwrap().unwrap();
    assert_eq!(frame.payload(), "t1");
    assert!(reader.next().await.is_none());
}
