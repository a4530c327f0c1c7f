//! Wake-word gating stage
//!
//! Sits between the client's ingress path and the upstream model: audio flows
//! through only after the trigger phrase is heard, and keeps flowing until a
//! trailing-silence timeout disarms the gate.
//!
//! The model's speech understanding is conditioned on the acoustic context
//! just before the trigger. Emitting only frames strictly after the hit cuts
//! off the utterance onset ("Hey Kon, how are..." loses its opening words),
//! so the gate keeps a pre-roll ring of recent frames and replays it, in
//! arrival order, ahead of the triggering frame.

mod detector;

pub use detector::{EnergyDetector, KeywordDetector, FRAME_LENGTH, SAMPLE_RATE};

#[cfg(feature = "porcupine")]
pub use detector::PorcupineDetector;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::Audio;
use crate::{Error, Result};

/// Frames of lookback replayed on trigger (~320 ms at 16 kHz / 512 samples)
const PRE_ROLL_FRAMES: usize = 10;

/// Output channel capacity
const OUTPUT_BUFFER: usize = 10;

/// Source of monotonic time, swappable for deterministic tests
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Gate parameters
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Peak-amplitude threshold below which a frame counts as silent
    pub silence_threshold: f32,
    /// Trailing silence after which the gate disarms
    pub arm_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            silence_threshold: crate::audio::DEFAULT_SILENCE_THRESHOLD,
            arm_timeout: Duration::from_secs(30),
        }
    }
}

/// Wake-word gate over a stream of fixed-length mono frames
pub struct WakeGate {
    detector: Box<dyn KeywordDetector>,
    config: GateConfig,
    clock: Arc<dyn Clock>,
}

impl WakeGate {
    /// Create a gate around the given detector
    #[must_use]
    pub fn new(detector: Box<dyn KeywordDetector>, config: GateConfig) -> Self {
        Self {
            detector,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock (deterministic tests)
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the gate task
    ///
    /// Consumes `input` and returns the gated output stream. The task runs
    /// until the input closes or a fatal frame-length mismatch occurs; either
    /// way the output channel closes, which downstream consumers treat as
    /// end-of-stream.
    #[must_use]
    pub fn start(self, input: mpsc::Receiver<Audio>) -> mpsc::Receiver<Audio> {
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);

        tokio::spawn(async move {
            if let Err(e) = self.run(input, tx).await {
                tracing::error!(error = %e, "wake gate terminated");
            }
        });

        rx
    }

    async fn run(mut self, mut input: mpsc::Receiver<Audio>, tx: mpsc::Sender<Audio>) -> Result<()> {
        let mut pre_roll: VecDeque<Audio> = VecDeque::with_capacity(PRE_ROLL_FRAMES);
        let mut armed = false;
        let mut last_voiced = self.clock.now();

        while let Some(frame) = input.recv().await {
            let expected = self.detector.frame_length();
            if frame.frame_length() != expected {
                return Err(Error::FrameLengthMismatch {
                    actual: frame.frame_length(),
                    expected,
                });
            }

            let hit = match self.detector.process(&frame.as_int16()) {
                Ok(hit) => hit,
                Err(e) => {
                    tracing::warn!(error = %e, "detector failed, skipping frame");
                    continue;
                }
            };

            if hit {
                if !armed {
                    tracing::info!(pre_roll = pre_roll.len(), "wake word detected");
                    for buffered in pre_roll.drain(..) {
                        if tx.send(buffered).await.is_err() {
                            return Ok(());
                        }
                    }
                    armed = true;
                }
                // A re-trigger while armed only refreshes the silence clock
                last_voiced = self.clock.now();
            }

            // The ring always tracks the most recent input frames so the
            // next trigger after a disarm has fresh lookback.
            if pre_roll.len() == PRE_ROLL_FRAMES {
                pre_roll.pop_front();
            }
            pre_roll.push_back(frame.clone());

            if armed {
                if frame.is_silent_with_threshold(self.config.silence_threshold) {
                    if self.clock.now().duration_since(last_voiced) >= self.config.arm_timeout {
                        tracing::debug!("trailing silence exceeded arm timeout, disarming");
                        armed = false;
                        continue;
                    }
                } else {
                    last_voiced = self.clock.now();
                }

                // Once armed every frame is forwarded, silent ones included;
                // the model assumes frame continuity within an utterance.
                if tx.send(frame).await.is_err() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}
