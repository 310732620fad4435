//! Integration tests for HuffStream
//!
//! Exercise the codec, transfer protocol, session server and file I/O
//! together over real loopback sockets.

use huffstream_codec::{HEADER_LEN, compress, decompress};
use huffstream_core::{
    Ack, ControlRequest, ControlResponse, ErrorKind, FramedChannel, TransferProtocol,
    TransferStatus, control,
};
use huffstream_files::DirectorySink;
use huffstream_integration_tests::{
    LOOPBACK, connect, sample_text, start_memory_server, start_server, test_config,
    wait_for_sessions,
};
use huffstream_transport::{
    Acceptor, BoxedChannel, Connector, SecureChannel, TcpAcceptor, TcpConnector,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Control and data channels driven by hand
struct RawSession {
    control: FramedChannel<BoxedChannel>,
    data: FramedChannel<BoxedChannel>,
}

impl RawSession {
    async fn open(server: &huffstream_core::RunningServer) -> Self {
        let connector = TcpConnector::default();
        let control = connector
            .connect(LOOPBACK, server.control_addr().port())
            .await
            .unwrap();
        let mut control = FramedChannel::new(control, 256);

        let session_id = match read_response(&mut control).await {
            ControlResponse::Welcome { session_id } => session_id,
            other => panic!("unexpected greeting: {other:?}"),
        };

        let data = connector
            .connect(LOOPBACK, server.data_addr().port())
            .await
            .unwrap();
        let mut data = FramedChannel::new(data, 256);
        data.write_all(format!("{session_id}\n").as_bytes(), TIMEOUT)
            .await
            .unwrap();

        Self { control, data }
    }

    async fn request(&mut self, request: &ControlRequest) -> ControlResponse {
        let line = control::encode_line(request).unwrap();
        self.send_line(&line).await;
        self.response().await
    }

    async fn send_line(&mut self, line: &[u8]) {
        self.control.write_all(line, TIMEOUT).await.unwrap();
    }

    async fn response(&mut self) -> ControlResponse {
        read_response(&mut self.control).await
    }
}

async fn read_response(control: &mut FramedChannel<BoxedChannel>) -> ControlResponse {
    let line = control
        .read_line(4096, Some(TIMEOUT))
        .await
        .unwrap()
        .expect("control channel open");
    control::decode_line(&line).unwrap()
}

// ============================================================================
// Codec and Container
// ============================================================================

#[test]
fn test_roundtrip_edge_inputs() {
    let inputs: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0x42],
        vec![0x00; 4096],
        (0..=255u8).collect(),
        b"abracadabra".to_vec(),
        sample_text(10_000),
    ];

    for input in inputs {
        let blob = compress(&input).unwrap();
        assert_eq!(decompress(&blob).unwrap(), input, "input of {} bytes", input.len());
    }
}

#[test]
fn test_compression_sanity() {
    let repeated = vec![b'z'; 1000];
    let blob = compress(&repeated).unwrap();
    // one-bit codes: 125 payload bytes plus header and a two-byte tree
    assert!(blob.len() <= HEADER_LEN + 2 + 125, "container is {} bytes", blob.len());

    let text = sample_text(20_000);
    assert!(compress(&text).unwrap().len() < text.len() / 2);

    let mut rng = StdRng::seed_from_u64(7);
    let random: Vec<u8> = (0..1000).map(|_| rng.r#gen()).collect();
    let blob = compress(&random).unwrap();
    assert!(blob.len() >= random.len());
    assert_eq!(decompress(&blob).unwrap(), random);
}

#[test]
fn test_bit_flip_never_yields_wrong_output() {
    let original = sample_text(300);
    let blob = compress(&original).unwrap();

    let mut detected = 0usize;
    for byte in 0..blob.len() {
        for bit in 0..8 {
            let mut damaged = blob.clone();
            damaged[byte] ^= 1 << bit;
            match decompress(&damaged) {
                Ok(decoded) => assert_eq!(decoded, original, "byte {byte} bit {bit}"),
                Err(_) => detected += 1,
            }
        }
    }

    // only flips that land in zero padding can go unnoticed
    assert!(detected >= blob.len() * 8 - 7);
}

// ============================================================================
// Transfer Framing over TCP
// ============================================================================

#[tokio::test]
async fn test_partial_reads_over_tcp() {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let port = acceptor.local_addr().unwrap().port();

    let sender = tokio::spawn(async move {
        let mut channel = TcpConnector::default()
            .connect(LOOPBACK, port)
            .await
            .unwrap();
        channel.write_all(b"report.txt|17\n").await.unwrap();
        for chunk in [&b"hello"[..], b" worl", b"d again"] {
            tokio::time::sleep(Duration::from_millis(20)).await;
            channel.write_all(chunk).await.unwrap();
        }

        let mut ack = Vec::new();
        let mut buf = [0u8; 8];
        while ack.len() < 8 {
            let n = channel.read(&mut buf).await.unwrap();
            assert_ne!(n, 0, "closed before acknowledgement");
            ack.extend_from_slice(&buf[..n]);
        }
        ack
    });

    let channel = acceptor.accept().await.unwrap();
    let mut framed = FramedChannel::new(channel, 4096);
    let protocol = TransferProtocol::new(&test_config(1));

    let pending = protocol.receive(&mut framed).await.unwrap();
    let message = pending.acknowledge(Ack::Complete).await.unwrap();
    assert_eq!(message.name, "report.txt");
    assert_eq!(message.body, b"hello world again");

    assert_eq!(sender.await.unwrap(), b"COMPLETE");
}

#[tokio::test]
async fn test_sender_close_mid_body_over_tcp() {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let port = acceptor.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut channel = TcpConnector::default()
            .connect(LOOPBACK, port)
            .await
            .unwrap();
        channel.write_all(b"cut.bin|100\n0123456789").await.unwrap();
        channel.shutdown().await.unwrap();
    });

    let channel = acceptor.accept().await.unwrap();
    let mut framed = FramedChannel::new(channel, 4096);
    let err = TransferProtocol::new(&test_config(1))
        .receive(&mut framed)
        .await
        .err()
        .unwrap();

    assert_eq!(err.kind(), ErrorKind::IncompleteTransfer);
    assert!(matches!(
        err,
        huffstream_core::Error::IncompleteTransfer {
            expected: 100,
            received: 10
        }
    ));
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_file_transfer_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("report.txt");
    let text = sample_text(50_000);
    tokio::fs::write(&source, &text).await.unwrap();

    let inbox = dir.path().join("inbox");
    let sink = DirectorySink::create(&inbox).await.unwrap();
    let server = start_server(test_config(4), Arc::new(sink)).await;

    let name = huffstream_files::encoded_name(&source).unwrap();
    let mut client = connect(&server).await.unwrap();
    let mut reported = Vec::new();
    let report = client
        .send_with_progress(&name, &text, |sent| reported.push(sent))
        .await
        .unwrap();

    assert_eq!(name, "report_encoded.txt");
    assert_eq!(report.stats.original_size, text.len() as u64);
    assert_eq!(reported.last().copied(), Some(report.stats.container_size));

    let container = tokio::fs::read(inbox.join("report_encoded.txt")).await.unwrap();
    assert_eq!(container.len() as u64, report.stats.container_size);
    assert_eq!(tokio::fs::read(inbox.join("report_decoded.txt")).await.unwrap(), text);

    client.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_session_bound_two_of_three() {
    let (server, sink) = start_memory_server(2).await;

    let mut first = connect(&server).await.unwrap();
    let mut second = connect(&server).await.unwrap();
    wait_for_sessions(&server, 2).await;

    let err = connect(&server).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::SessionLimitExceeded);

    let first_text = sample_text(4000);
    let second_text = sample_text(7000);
    let (a, b) = tokio::join!(
        first.send("first.txt", &first_text),
        second.send("second.txt", &second_text),
    );
    a.unwrap();
    b.unwrap();

    let mut stored = sink.transfers();
    stored.sort_by(|x, y| x.name.cmp(&y.name));
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].data, first_text);
    assert_eq!(stored[1].data, second_text);

    first.close().await.unwrap();
    wait_for_sessions(&server, 1).await;
    let mut third = connect(&server).await.unwrap();
    third.send("third.txt", b"admitted now").await.unwrap();

    server.shutdown().await;
}

#[tokio::test]
async fn test_many_sessions_in_parallel() {
    let (server, sink) = start_memory_server(8).await;
    let endpoint = server.endpoint(LOOPBACK);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let endpoint = endpoint.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = huffstream_core::SessionClient::connect(
                &endpoint,
                test_config(1),
                &TcpConnector::default(),
            )
            .await
            .unwrap();
            let data = sample_text(1000 + i * 333);
            client.send(&format!("file{i}.txt"), &data).await.unwrap();
            client.close().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(sink.len(), 8);
    server.shutdown().await;
}

#[tokio::test]
async fn test_cancel_mid_transfer_ends_session() {
    let (server, sink) = start_memory_server(1).await;
    let mut raw = RawSession::open(&server).await;

    let ready = raw
        .request(&ControlRequest::Prepare {
            transfer_id: "t-cancel".into(),
            filename: "big.bin".into(),
            filesize: 1000,
        })
        .await;
    assert_eq!(
        ready,
        ControlResponse::Ready {
            transfer_id: "t-cancel".into()
        }
    );

    raw.data
        .write_all(b"big.bin|1000\npartial body", TIMEOUT)
        .await
        .unwrap();

    let status = raw
        .request(&ControlRequest::Status {
            transfer_id: "t-cancel".into(),
        })
        .await;
    assert_eq!(
        status,
        ControlResponse::Transfer {
            transfer_id: "t-cancel".into(),
            state: TransferStatus::Receiving
        }
    );

    let cancelled = raw
        .request(&ControlRequest::Cancel {
            transfer_id: "t-cancel".into(),
        })
        .await;
    assert_eq!(
        cancelled,
        ControlResponse::Cancelled {
            transfer_id: "t-cancel".into()
        }
    );

    let closed = raw.control.read_line(4096, Some(TIMEOUT)).await.unwrap();
    assert_eq!(closed, None);
    wait_for_sessions(&server, 0).await;
    assert!(sink.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_control_close_mid_transfer_releases_permit() {
    let (server, sink) = start_memory_server(1).await;
    let mut raw = RawSession::open(&server).await;

    raw.request(&ControlRequest::Prepare {
        transfer_id: "t".into(),
        filename: "x.bin".into(),
        filesize: 500,
    })
    .await;
    raw.data.write_all(b"x.bin|500\nabc", TIMEOUT).await.unwrap();
    raw.control.shutdown().await.unwrap();

    wait_for_sessions(&server, 0).await;
    assert!(sink.is_empty());
    assert!(connect(&server).await.is_ok());

    server.shutdown().await;
}

#[tokio::test]
async fn test_data_close_while_idle_releases_permit() {
    let (server, sink) = start_memory_server(1).await;
    let mut raw = RawSession::open(&server).await;
    wait_for_sessions(&server, 1).await;

    raw.data.shutdown().await.unwrap();
    drop(raw.data);

    wait_for_sessions(&server, 0).await;
    let closed = raw.control.read_line(4096, Some(TIMEOUT)).await.unwrap();
    assert_eq!(closed, None);
    assert!(sink.is_empty());
    assert!(connect(&server).await.is_ok());

    server.shutdown().await;
}

#[tokio::test]
async fn test_data_outside_transfer_ends_session() {
    let (server, _sink) = start_memory_server(1).await;
    let mut raw = RawSession::open(&server).await;
    wait_for_sessions(&server, 1).await;

    raw.data.write_all(b"stray.bin|3\nabc", TIMEOUT).await.unwrap();

    wait_for_sessions(&server, 0).await;
    assert!(connect(&server).await.is_ok());

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_cancel_during_send() {
    let (server, _sink) = start_memory_server(1).await;
    let mut client = connect(&server).await.unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let data: Vec<u8> = (0..4 * 1024 * 1024).map(|_| rng.r#gen()).collect();
    let container = compress(&data).unwrap();

    let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
    let mut cancel_tx = Some(cancel_tx);
    let progress = move |_sent: u64| {
        if let Some(tx) = cancel_tx.take() {
            let _ = tx.send(());
        }
    };
    let cancel = async move {
        if cancel_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let err = client
        .send_container_with_cancel("big.bin", &container, progress, cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let _ = client.close().await;
    wait_for_sessions(&server, 0).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_control_line_keeps_session() {
    let (server, _sink) = start_memory_server(1).await;
    let mut raw = RawSession::open(&server).await;

    raw.send_line(b"{not json}\n").await;
    assert!(matches!(raw.response().await, ControlResponse::Error { .. }));

    raw.send_line(b"{\"command\":\"launch\"}\n").await;
    assert!(matches!(raw.response().await, ControlResponse::Error { .. }));

    let status = raw
        .request(&ControlRequest::Status {
            transfer_id: "nope".into(),
        })
        .await;
    assert_eq!(
        status,
        ControlResponse::Transfer {
            transfer_id: "nope".into(),
            state: TransferStatus::Unknown
        }
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_header_mismatch_fails_transfer() {
    let (server, sink) = start_memory_server(1).await;
    let mut raw = RawSession::open(&server).await;

    raw.request(&ControlRequest::Prepare {
        transfer_id: "t".into(),
        filename: "expected.bin".into(),
        filesize: 4,
    })
    .await;
    raw.data.write_all(b"other.bin|4\nabcd", TIMEOUT).await.unwrap();

    wait_for_sessions(&server, 0).await;
    assert!(sink.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_busy_reply_wire_form() {
    let (server, _sink) = start_memory_server(1).await;
    let _holder = connect(&server).await.unwrap();
    wait_for_sessions(&server, 1).await;

    let control = TcpConnector::default()
        .connect(LOOPBACK, server.control_addr().port())
        .await
        .unwrap();
    let mut control = FramedChannel::new(control, 256);
    let line = control
        .read_line(4096, Some(TIMEOUT))
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
    assert_eq!(value["status"], "busy");
    assert_eq!(value["limit"], 1);
    assert_eq!(control.read_line(4096, Some(TIMEOUT)).await.unwrap(), None);

    server.shutdown().await;
}
