//! Realtime WebSocket client for the speech-to-speech model service

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::events::{InputAudioAppend, ServerEvent, SessionUpdate};
use super::{AiClient, EventType, MODEL_SAMPLE_RATE};
use crate::audio::Audio;
use crate::config::AzureConfig;
use crate::{Error, Result};

/// Handshake deadline
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-write deadline
const WRITE_WAIT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket client for the realtime model service
///
/// Owns the outbound socket behind a write mutex (the send-audio path and
/// the ping ticker both write), a done signal, and the two outbound streams
/// the supervisor consumes.
pub struct RealtimeClient {
    url: String,
    api_key: String,
    instructions: Option<String>,
    pong_wait: Duration,
    writer: Option<Arc<Mutex<WsSink>>>,
    done: Arc<watch::Sender<bool>>,
    closed: Arc<AtomicBool>,
    response_rx: Option<mpsc::UnboundedReceiver<Audio>>,
    events_rx: Option<mpsc::UnboundedReceiver<Result<EventType>>>,
}

impl RealtimeClient {
    /// Create an unconnected client from the service configuration
    #[must_use]
    pub fn new(config: &AzureConfig, instructions: Option<String>, pong_wait: Duration) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            url: config.service_url.clone(),
            api_key: config.openai_key.clone(),
            instructions,
            pong_wait,
            writer: None,
            done: Arc::new(done),
            closed: Arc::new(AtomicBool::new(false)),
            response_rx: None,
            events_rx: None,
        }
    }

    /// Serialize `value` and send it as one text frame, under the write mutex
    async fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| Error::Socket("upstream session not connected".to_string()))?;
        let text = serde_json::to_string(value)?;

        write_text(writer, text).await
    }
}

async fn write_text(writer: &Arc<Mutex<WsSink>>, text: String) -> Result<()> {
    let mut sink = writer.lock().await;
    timeout(WRITE_WAIT, sink.send(Message::text(text)))
        .await
        .map_err(|_| Error::Socket("upstream write timed out".to_string()))?
        .map_err(|e| Error::Socket(e.to_string()))
}

#[async_trait]
impl AiClient for RealtimeClient {
    async fn initialize(&mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Config(format!("invalid upstream url: {e}")))?;
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| Error::Config(format!("invalid api key header: {e}")))?;
        request.headers_mut().insert("api-key", key);

        let (socket, _) = timeout(HANDSHAKE_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| Error::UpstreamUnreachable {
                status: None,
                message: "handshake timed out".to_string(),
            })?
            .map_err(unreachable_error)?;

        tracing::info!(url = %self.url, "connected to upstream model service");

        let (sink, source) = socket.split();
        let writer = Arc::new(Mutex::new(sink));
        self.writer = Some(Arc::clone(&writer));

        let configure = SessionUpdate::new(self.instructions.as_deref());
        self.write_json(&configure).await?;

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.response_rx = Some(response_rx);
        self.events_rx = Some(events_rx);

        tokio::spawn(read_loop(
            source,
            response_tx,
            events_tx,
            Arc::clone(&self.done),
            shutdown.clone(),
            self.pong_wait,
        ));

        tokio::spawn(ping_loop(
            writer,
            Arc::clone(&self.done),
            shutdown,
            self.pong_wait,
        ));

        Ok(())
    }

    async fn send_audio(&self, audio: Audio) -> Result<()> {
        let mono = audio.stereo_to_mono()?;
        let canonical = if mono.sample_rate() == MODEL_SAMPLE_RATE {
            mono
        } else {
            mono.resample(MODEL_SAMPLE_RATE)
        };

        let encoded = BASE64.encode(canonical.as_pcm16());
        self.write_json(&InputAudioAppend::new(&encoded)).await
    }

    fn take_response_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Audio>> {
        self.response_rx.take()
    }

    fn take_events_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Result<EventType>>> {
        self.events_rx.take()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(writer) = &self.writer {
            let mut sink = writer.lock().await;
            // Best effort: the peer may already be gone.
            let _ = timeout(WRITE_WAIT, sink.send(Message::Close(None))).await;
        }

        let _ = self.done.send(true);
        tracing::debug!("upstream session closed");
    }
}

/// Map a failed handshake onto the unreachable error, keeping the HTTP
/// status when the server answered with one
fn unreachable_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            Error::UpstreamUnreachable {
                status: Some(status),
                message: format!("handshake rejected with status {status}"),
            }
        }
        other => Error::UpstreamUnreachable {
            status: None,
            message: other.to_string(),
        },
    }
}

/// Background reader: classify inbound envelopes and dispatch them
///
/// Exits on server error, socket close, cancellation, or a missed pong
/// deadline; dropping the stream senders is what signals end-of-stream to
/// the supervisor.
async fn read_loop(
    mut source: WsSource,
    response_tx: mpsc::UnboundedSender<Audio>,
    events_tx: mpsc::UnboundedSender<Result<EventType>>,
    done: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
    pong_wait: Duration,
) {
    let mut done_rx = done.subscribe();
    let mut deadline = tokio::time::Instant::now() + pong_wait;

    loop {
        tokio::select! {
            _ = done_rx.changed() => break,
            _ = shutdown.changed() => break,
            () = tokio::time::sleep_until(deadline) => {
                tracing::error!("upstream read deadline elapsed without pong");
                break;
            }
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if !dispatch_event(text.as_str(), &response_tx, &events_tx) {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    deadline = tokio::time::Instant::now() + pong_wait;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "upstream closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "upstream read failed");
                    break;
                }
                None => break,
            }
        }
    }

    let _ = done.send(true);
}

/// Handle one decoded envelope; false means the stream must terminate
fn dispatch_event(
    raw: &str,
    response_tx: &mpsc::UnboundedSender<Audio>,
    events_tx: &mpsc::UnboundedSender<Result<EventType>>,
) -> bool {
    let event = match serde_json::from_str::<ServerEvent>(raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable upstream envelope dropped");
            return true;
        }
    };

    match event {
        ServerEvent::Error { error } => {
            tracing::error!(
                kind = ?error.kind,
                code = ?error.code,
                message = %error.message,
                "upstream reported an error"
            );
            let _ = events_tx.send(Err(Error::Upstream(format!(
                "{}: {}",
                error.kind.as_deref().unwrap_or("unknown"),
                error.message
            ))));
            false
        }
        ServerEvent::AudioDelta { delta } => {
            let pcm = match BASE64.decode(&delta) {
                Ok(pcm) => pcm,
                Err(e) => {
                    tracing::warn!(error = %e, "audio delta with bad base64 dropped");
                    return true;
                }
            };
            match Audio::from_pcm16(&pcm, MODEL_SAMPLE_RATE, 1) {
                Ok(audio) => {
                    let _ = response_tx.send(audio);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed audio delta dropped");
                }
            }
            true
        }
        ServerEvent::AudioDone => {
            let _ = events_tx.send(Ok(EventType::ResponseAudioDone));
            true
        }
        ServerEvent::SessionCreated => {
            tracing::debug!("upstream session created");
            true
        }
        other => {
            tracing::debug!(event = ?other, "unhandled upstream event");
            true
        }
    }
}

/// Keep the connection alive with periodic pings
///
/// A failed ping write terminates the session via the done signal.
async fn ping_loop(
    writer: Arc<Mutex<WsSink>>,
    done: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
    pong_wait: Duration,
) {
    let mut done_rx = done.subscribe();
    let mut ticker = tokio::time::interval(pong_wait * 9 / 10);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = done_rx.changed() => break,
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let mut sink = writer.lock().await;
                let sent = timeout(WRITE_WAIT, sink.send(Message::Ping(Vec::new().into()))).await;
                drop(sink);

                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "upstream ping failed");
                        let _ = done.send(true);
                        break;
                    }
                    Err(_) => {
                        tracing::error!("upstream ping timed out");
                        let _ = done.send(true);
                        break;
                    }
                }
            }
        }
    }
}
