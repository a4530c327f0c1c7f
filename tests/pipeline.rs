//! End-to-end pipeline scenarios
//!
//! Runs the real server and session supervisor against a fake upstream
//! client and a scripted wake word detector, with a real WebSocket client on
//! the other side. No network access or audio hardware required.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use wavelet_relay::server::{app, AppState, DetectorFactory, UpstreamFactory};
use wavelet_relay::upstream::AiClient;
use wavelet_relay::wake::KeywordDetector;
use wavelet_relay::{Audio, Config, EventType, Result};

/// First sample value that makes the scripted detector fire
const TRIGGER_MARKER: i16 = 31_000;

/// Detector that fires when a frame's first sample carries the marker
struct ScriptedDetector {
    frame_length: usize,
}

impl KeywordDetector for ScriptedDetector {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, frame: &[i16]) -> Result<bool> {
        Ok(frame.first() == Some(&TRIGGER_MARKER))
    }
}

/// Upstream stand-in: records sent audio, replays scripted responses
struct FakeAiClient {
    response_rx: Option<mpsc::UnboundedReceiver<Audio>>,
    events_rx: Option<mpsc::UnboundedReceiver<Result<EventType>>>,
    sent: Arc<Mutex<Vec<Audio>>>,
    fail_initialize: bool,
}

#[async_trait]
impl AiClient for FakeAiClient {
    async fn initialize(&mut self, _shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.fail_initialize {
            return Err(wavelet_relay::Error::UpstreamUnreachable {
                status: Some(503),
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    async fn send_audio(&self, audio: Audio) -> Result<()> {
        self.sent.lock().await.push(audio);
        Ok(())
    }

    fn take_response_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Audio>> {
        self.response_rx.take()
    }

    fn take_events_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Result<EventType>>> {
        self.events_rx.take()
    }

    async fn close(&self) {}
}

/// Handles the test keeps to drive and observe the fake upstream
struct FakeHandles {
    response_tx: mpsc::UnboundedSender<Audio>,
    events_tx: mpsc::UnboundedSender<Result<EventType>>,
    sent: Arc<Mutex<Vec<Audio>>>,
}

fn fake_upstream(fail_initialize: bool) -> (UpstreamFactory, FakeHandles) {
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));

    let streams = std::sync::Mutex::new(Some((response_rx, events_rx)));
    let sent_for_factory = Arc::clone(&sent);
    let factory: UpstreamFactory = Arc::new(move |_config: &Config| {
        let (response_rx, events_rx) = streams
            .lock()
            .unwrap()
            .take()
            .expect("one connection per test");
        Box::new(FakeAiClient {
            response_rx: Some(response_rx),
            events_rx: Some(events_rx),
            sent: Arc::clone(&sent_for_factory),
            fail_initialize,
        }) as Box<dyn AiClient>
    });

    (
        factory,
        FakeHandles {
            response_tx,
            events_tx,
            sent,
        },
    )
}

fn scripted_detector(frame_length: usize) -> DetectorFactory {
    Arc::new(move |_config: &Config| {
        Ok(Box::new(ScriptedDetector { frame_length }) as Box<dyn KeywordDetector>)
    })
}

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the relay on an ephemeral port and connect a client to it
async fn start_relay(
    config: Config,
    upstream: UpstreamFactory,
    detector: DetectorFactory,
) -> WsClient {
    let state = Arc::new(AppState {
        config,
        upstream,
        detector,
    });
    let router = app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let (client, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("failed to connect");
    client
}

fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// A mono frame whose sample at `index` carries `value`
fn marked_frame(len: usize, index: usize, value: i16) -> Vec<u8> {
    let mut samples = vec![0i16; len];
    samples[index] = value;
    pcm_bytes(&samples)
}

/// Poll until the fake upstream has received `count` audio blocks
async fn wait_for_sent(sent: &Arc<Mutex<Vec<Audio>>>, count: usize) -> Vec<Audio> {
    for _ in 0..200 {
        {
            let sent = sent.lock().await;
            if sent.len() >= count {
                return sent.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("upstream never received {count} audio blocks");
}

async fn next_binary(client: &mut WsClient) -> Vec<u8> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a binary frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Binary(data) = message {
            return data.to_vec();
        }
    }
}

fn mono_config() -> Config {
    let mut config = Config::default();
    config.audio.channels = 1;
    config
}

#[tokio::test]
async fn trigger_replays_pre_roll_then_streams() {
    let (upstream, handles) = fake_upstream(false);
    let mut client = start_relay(mono_config(), upstream, scripted_detector(512)).await;

    // Nine non-trigger frames, each tagged at sample 1, then the trigger
    for i in 1..=9i16 {
        client
            .send(Message::binary(marked_frame(512, 1, i * 100)))
            .await
            .unwrap();
    }
    client
        .send(Message::binary(marked_frame(512, 0, TRIGGER_MARKER)))
        .await
        .unwrap();

    let sent = wait_for_sent(&handles.sent, 10).await;
    assert_eq!(sent.len(), 10, "pre-roll plus trigger frame expected");
    for (i, audio) in sent.iter().take(9).enumerate() {
        assert_eq!(
            audio.as_int16()[1],
            (i as i16 + 1) * 100,
            "pre-roll frame {i} out of order"
        );
    }
    assert_eq!(sent[9].as_int16()[0], TRIGGER_MARKER);

    // Armed: the next frame flows straight through
    client
        .send(Message::binary(marked_frame(512, 1, 4242)))
        .await
        .unwrap();
    let sent = wait_for_sent(&handles.sent, 11).await;
    assert_eq!(sent[10].as_int16()[1], 4242);
}

#[tokio::test]
async fn upstream_burst_reaches_client_as_fixed_frames() {
    // Client at the model's rate so payloads pass through byte-identical
    let mut config = mono_config();
    config.audio.sample_rate = 24_000;

    let (upstream, handles) = fake_upstream(false);
    let mut client = start_relay(config, upstream, scripted_detector(512)).await;

    let mut pushed = Vec::new();
    for seed in [1u8, 2, 3] {
        let bytes: Vec<u8> = (0..3000).map(|i| seed.wrapping_mul(i as u8)).collect();
        // Force even samples: 3000 bytes is 1500 samples
        let audio = Audio::from_pcm16(&bytes, 24_000, 1).unwrap();
        pushed.extend_from_slice(&bytes);
        handles.response_tx.send(audio).unwrap();
    }

    // 9000 bytes in: two full frames out, 808 bytes held back
    let first = next_binary(&mut client).await;
    let second = next_binary(&mut client).await;

    // Receiving the second frame proves the pump consumed every delta, so
    // the done-triggered flush cannot overtake them.
    handles
        .events_tx
        .send(Ok(EventType::ResponseAudioDone))
        .unwrap();
    let flushed = next_binary(&mut client).await;

    assert_eq!(first.len(), 4096);
    assert_eq!(second.len(), 4096);
    assert_eq!(flushed.len(), 808);

    let mut received = first;
    received.extend(second);
    received.extend(flushed);
    assert_eq!(received, pushed, "byte order corrupted in transit");
}

#[tokio::test]
async fn stereo_ingestion_is_downmixed_before_the_gate() {
    let mut config = Config::default();
    config.audio.channels = 2;

    let (upstream, handles) = fake_upstream(false);
    // 4096 stereo bytes = 1024 samples per channel after downmix
    let mut client = start_relay(config, upstream, scripted_detector(1024)).await;

    // Interleaved L,R pairs; both channels carry the trigger marker in the
    // first pair so the downmixed average still triggers.
    let mut samples = vec![0i16; 2048];
    samples[0] = TRIGGER_MARKER;
    samples[1] = TRIGGER_MARKER;
    samples[2] = 600;
    samples[3] = 200;
    client
        .send(Message::binary(pcm_bytes(&samples)))
        .await
        .unwrap();

    let sent = wait_for_sent(&handles.sent, 1).await;
    let frame = &sent[0];
    assert_eq!(frame.channels(), 1);
    assert_eq!(frame.sample_rate(), 16_000);
    assert_eq!(frame.frame_length(), 1024);

    let mixed = frame.as_int16();
    assert_eq!(mixed[0], TRIGGER_MARKER);
    assert_eq!(mixed[1], 400, "pairwise average expected");
}

#[tokio::test]
async fn malformed_payload_is_dropped_and_session_survives() {
    let (upstream, handles) = fake_upstream(false);
    let mut client = start_relay(mono_config(), upstream, scripted_detector(512)).await;

    // Odd byte length: logged, dropped, nothing forwarded
    client
        .send(Message::binary(vec![0x01, 0x02, 0x03]))
        .await
        .unwrap();

    // The session must still accept well-formed audio afterwards
    client
        .send(Message::binary(marked_frame(512, 0, TRIGGER_MARKER)))
        .await
        .unwrap();

    let sent = wait_for_sent(&handles.sent, 1).await;
    assert_eq!(sent.len(), 1, "only the valid trigger frame may arrive");
    assert_eq!(sent[0].as_int16()[0], TRIGGER_MARKER);
}

#[tokio::test]
async fn failed_upstream_handshake_closes_the_client_socket() {
    let (upstream, _handles) = fake_upstream(true);
    let mut client = start_relay(mono_config(), upstream, scripted_detector(512)).await;

    let message = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("expected a prompt close");

    match message {
        Some(Ok(Message::Close(_))) | None => {}
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn mid_session_upstream_error_terminates_the_session() {
    let (upstream, handles) = fake_upstream(false);
    let mut client = start_relay(mono_config(), upstream, scripted_detector(512)).await;

    // Session is live: a trigger frame flows upstream
    client
        .send(Message::binary(marked_frame(512, 0, TRIGGER_MARKER)))
        .await
        .unwrap();
    wait_for_sent(&handles.sent, 1).await;

    // The server-sent error envelope surfaces as the stream's terminal item
    handles
        .events_tx
        .send(Err(wavelet_relay::Error::Upstream(
            "invalid_request_error: session timed out".to_string(),
        )))
        .unwrap();

    // The supervisor cancels and the client still gets a normal closure
    let mut closed = false;
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_secs(2), client.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                closed = true;
                break;
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(_))) => {
                closed = true;
                break;
            }
            Err(_) => break,
        }
    }
    assert!(closed, "upstream error did not terminate the session");
}

#[tokio::test]
async fn client_close_tears_the_session_down() {
    let (upstream, handles) = fake_upstream(false);
    let mut client = start_relay(mono_config(), upstream, scripted_detector(512)).await;

    client
        .send(Message::binary(marked_frame(512, 0, TRIGGER_MARKER)))
        .await
        .unwrap();
    wait_for_sent(&handles.sent, 1).await;

    client.close(None).await.unwrap();

    // The server finishes the closing handshake and the stream ends
    let mut closed = false;
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_secs(2), client.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                closed = true;
                break;
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(_))) => {
                closed = true;
                break;
            }
            Err(_) => break,
        }
    }
    assert!(closed, "server never completed the closing handshake");
}
