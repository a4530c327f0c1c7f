//! Per-connection session supervisor
//!
//! Owns the client socket and the upstream session, wires the pipeline
//! stages together, and manages cancellation and shutdown ordering. Each
//! stage runs as its own task with a single duty; they communicate only over
//! channels, and every blocking point selects on the shared shutdown signal.
//!
//! Client → model: ingress reader → downmix/resample → wake gate → upstream.
//! Model → client: response pump → resample → re-chunker → egress writer.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::audio::{Audio, FrameChunker};
use crate::config::{AudioConfig, Config, WebsocketConfig};
use crate::upstream::{AiClient, EventType};
use crate::wake::{self, GateConfig, KeywordDetector, WakeGate};
use crate::{Error, Result};

/// Run one session to completion
///
/// Establishes the upstream session, spawns the pipeline tasks, and tears
/// everything down when any of them finishes. The client socket is always
/// left with a normal close frame; failures surface only in the logs.
pub async fn run(
    socket: WebSocket,
    config: Config,
    mut upstream: Box<dyn AiClient>,
    detector: Box<dyn KeywordDetector>,
) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Err(e) = upstream.initialize(shutdown_rx.clone()).await {
        tracing::error!(error = %e, "could not initialize upstream session");
        close_socket(socket).await;
        return;
    }

    let (Some(response_rx), Some(events_rx)) = (
        upstream.take_response_stream(),
        upstream.take_events_stream(),
    ) else {
        tracing::error!("upstream client yielded no streams");
        close_socket(socket).await;
        return;
    };

    let queue = config.websocket.max_message_queue;
    let (chunker, chunk_rx) = FrameChunker::new(config.audio.frame_bytes, queue);
    let chunker = Arc::new(chunker);

    let gate = WakeGate::new(
        detector,
        GateConfig {
            silence_threshold: config.wake_word.silence_threshold,
            arm_timeout: config.wake_word.arm_timeout,
        },
    );
    let (gate_tx, gate_input_rx) = mpsc::channel(queue);
    let gated_rx = gate.start(gate_input_rx);

    let upstream: Arc<dyn AiClient> = Arc::from(upstream);
    let (ws_tx, ws_rx) = socket.split();

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    tasks.spawn(egress_writer(
        ws_tx,
        chunk_rx,
        config.websocket.clone(),
        shutdown_rx.clone(),
    ));
    tasks.spawn(lifecycle_watcher(
        events_rx,
        Arc::clone(&chunker),
        shutdown_rx.clone(),
    ));
    tasks.spawn(response_pump(
        response_rx,
        Arc::clone(&chunker),
        config.audio.sample_rate,
        shutdown_rx.clone(),
    ));
    tasks.spawn(ingress_reader(
        ws_rx,
        gate_tx,
        config.audio.clone(),
        config.websocket.pong_wait,
        shutdown_rx.clone(),
    ));
    tasks.spawn(forward_gated(gated_rx, Arc::clone(&upstream), shutdown_rx));

    // The first task to finish — cleanly or not — ends the session.
    if let Some(joined) = tasks.join_next().await {
        log_task_exit(joined);
    }
    let _ = shutdown_tx.send(true);
    upstream.close().await;

    // Remaining tasks observe the signal and drain; write-wait bounds how
    // long we believe them.
    let drain = async {
        while let Some(joined) = tasks.join_next().await {
            log_task_exit(joined);
        }
    };
    if timeout(config.websocket.write_wait, drain).await.is_err() {
        tracing::warn!("session tasks did not stop within write-wait, aborting");
        tasks.abort_all();
    }

    tracing::info!("session ended");
}

fn log_task_exit(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) | Ok(Err(Error::Cancelled)) => {}
        Ok(Err(e @ Error::Upstream(_))) => {
            tracing::error!(error = %e, "session terminated by upstream error");
        }
        Ok(Err(e)) => tracing::error!(error = %e, "session task failed"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!(error = %e, "session task panicked"),
    }
}

/// Best-effort normal closure of a socket we never started streaming on
async fn close_socket(mut socket: WebSocket) {
    let _ = socket.send(Message::Close(None)).await;
}

/// Write each re-chunked frame to the client as one binary message
///
/// Sole writer on the client socket; also carries the keepalive pings so the
/// socket stays single-writer. On shutdown it drains whatever the chunker
/// already emitted, then sends the normal close frame.
async fn egress_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut chunk_rx: mpsc::Receiver<Vec<u8>>,
    config: WebsocketConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(config.ping_interval);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    let result = loop {
        tokio::select! {
            _ = shutdown.changed() => break Ok(()),
            _ = ticker.tick() => {
                if let Err(e) = send_with_deadline(
                    &mut ws_tx,
                    Message::Ping(Vec::new().into()),
                    config.write_wait,
                )
                .await
                {
                    break Err(e);
                }
            }
            chunk = chunk_rx.recv() => match chunk {
                Some(chunk) => {
                    if let Err(e) = send_with_deadline(
                        &mut ws_tx,
                        Message::Binary(chunk.into()),
                        config.write_wait,
                    )
                    .await
                    {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            }
        }
    };

    // Flush frames that were already emitted before the signal arrived.
    while let Ok(chunk) = chunk_rx.try_recv() {
        if send_with_deadline(&mut ws_tx, Message::Binary(chunk.into()), config.write_wait)
            .await
            .is_err()
        {
            break;
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
    result
}

async fn send_with_deadline(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: Message,
    write_wait: Duration,
) -> Result<()> {
    timeout(write_wait, ws_tx.send(message))
        .await
        .map_err(|_| Error::Socket("client write timed out".to_string()))?
        .map_err(|e| Error::Socket(e.to_string()))
}

/// React to upstream lifecycle events
///
/// `response.audio.done` flushes the re-chunker so the final partial frame
/// of a response is not withheld from the client. A server-sent error
/// envelope arrives as the stream's terminal `Err` item and ends the
/// session through the normal cancellation path.
async fn lifecycle_watcher(
    mut events_rx: mpsc::UnboundedReceiver<Result<EventType>>,
    chunker: Arc<FrameChunker>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            event = events_rx.recv() => match event {
                Some(Ok(EventType::ResponseAudioDone)) => {
                    tracing::debug!("response audio complete, flushing residual frame");
                    chunker.flush().await?;
                }
                Some(Ok(event)) => tracing::trace!(%event, "upstream lifecycle event"),
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            }
        }
    }
}

/// Move model audio into the re-chunker, converting to the client's rate
async fn response_pump(
    mut response_rx: mpsc::UnboundedReceiver<Audio>,
    chunker: Arc<FrameChunker>,
    client_rate: u32,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            audio = response_rx.recv() => match audio {
                Some(audio) => {
                    let audio = if audio.sample_rate() == client_rate {
                        audio
                    } else {
                        audio.resample(client_rate)
                    };
                    chunker.write(&audio.as_pcm16()).await?;
                }
                None => return Ok(()),
            }
        }
    }
}

/// Read client audio, canonicalize it, and feed the wake gate
///
/// A malformed payload is logged and dropped — the session continues. An
/// unsupported channel layout is a configuration bug and ends the session.
async fn ingress_reader(
    mut ws_rx: SplitStream<WebSocket>,
    gate_tx: mpsc::Sender<Audio>,
    audio: AudioConfig,
    pong_wait: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut deadline = tokio::time::Instant::now() + pong_wait;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            () = tokio::time::sleep_until(deadline) => {
                return Err(Error::Socket("client read deadline elapsed".to_string()));
            }
            message = ws_rx.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    let frame = match Audio::from_pcm16(&data, audio.sample_rate, audio.channels) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed client audio dropped");
                            continue;
                        }
                    };

                    let mono = match frame.stereo_to_mono() {
                        Ok(mono) => mono,
                        Err(e @ Error::MalformedInput(_)) => {
                            tracing::warn!(error = %e, "malformed client audio dropped");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let canonical = if mono.sample_rate() == wake::SAMPLE_RATE {
                        mono
                    } else {
                        mono.resample(wake::SAMPLE_RATE)
                    };

                    if gate_tx.send(canonical).await.is_err() {
                        return Ok(());
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    deadline = tokio::time::Instant::now() + pong_wait;
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("client closed the connection");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(Error::Socket(e.to_string())),
                None => return Ok(()),
            }
        }
    }
}

/// Forward gate-approved frames to the upstream model
async fn forward_gated(
    mut gated_rx: mpsc::Receiver<Audio>,
    upstream: Arc<dyn AiClient>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            frame = gated_rx.recv() => match frame {
                Some(frame) => upstream.send_audio(frame).await?,
                None => return Ok(()),
            }
        }
    }
}
