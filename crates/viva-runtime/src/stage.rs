//! Stage - async host for a `StreamCoordinator`
//!
//! One task owns the coordinator. Everything else talks to it through
//! channels: the UI through `StageHandle`, the producer through a
//! `ProducerLink`, the audio device through its event receiver. Display
//! frames are one-shot sleeps, armed only when the coordinator asks for the
//! next one.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};

use viva_core::{MediaTime, SessionState, VivaError, VivaResult};
use viva_visual::{ExpressionRef, FrameRequest, SharedTarget};
use viva_voice::{AudioOutput, OutputEvent};
use viva_wire::{ProducerEvent, ProducerRequest};

use crate::{RuntimeConfig, SessionHandle, StreamCoordinator, StreamOptions};

/// Coordinator side of the producer boundary
///
/// Requests are unbounded: there is at most one credit per chunk, and the
/// stage must never block on a producer that is itself blocked sending.
pub struct ProducerLink {
    pub requests: mpsc::UnboundedSender<ProducerRequest>,
    pub events: mpsc::Receiver<ProducerEvent>,
}

/// Producer side of the producer boundary
pub struct ProducerEnd {
    pub requests: mpsc::UnboundedReceiver<ProducerRequest>,
    pub events: mpsc::Sender<ProducerEvent>,
}

impl ProducerLink {
    /// Connected pair of channels, events bounded by `capacity`
    pub fn channel(capacity: usize) -> (ProducerLink, ProducerEnd) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(capacity);
        (
            ProducerLink {
                requests: request_tx,
                events: event_rx,
            },
            ProducerEnd {
                requests: request_rx,
                events: event_tx,
            },
        )
    }
}

#[derive(Debug)]
enum StageCommand {
    Start {
        text: String,
        options: StreamOptions,
        reply: oneshot::Sender<VivaResult<SessionHandle>>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    SetExpression {
        expression: ExpressionRef,
        reply: oneshot::Sender<VivaResult<()>>,
    },
    ResetExpression {
        reply: oneshot::Sender<VivaResult<()>>,
    },
    PlayMotion {
        group: String,
        index: usize,
        reply: oneshot::Sender<VivaResult<()>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    Shutdown,
}

/// UI side of a running stage
#[derive(Clone, Debug)]
pub struct StageHandle {
    commands: mpsc::Sender<StageCommand>,
}

impl StageHandle {
    /// Start speaking `text`
    pub async fn start(&self, text: impl Into<String>, options: StreamOptions) -> VivaResult<SessionHandle> {
        let (reply, rx) = oneshot::channel();
        self.send(StageCommand::Start {
            text: text.into(),
            options,
            reply,
        })
        .await?;
        Self::reply(rx).await?
    }

    /// Cancel the active session; false if there was none
    pub async fn stop(&self) -> VivaResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(StageCommand::Stop { reply }).await?;
        Self::reply(rx).await
    }

    /// Manual expression; races with the driver, the last write wins
    pub async fn set_expression(&self, expression: ExpressionRef) -> VivaResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StageCommand::SetExpression { expression, reply }).await?;
        Self::reply(rx).await?
    }

    pub async fn reset_expression(&self) -> VivaResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StageCommand::ResetExpression { reply }).await?;
        Self::reply(rx).await?
    }

    /// Manual motion at the configured talking priority
    pub async fn play_motion(&self, group: impl Into<String>, index: usize) -> VivaResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StageCommand::PlayMotion {
            group: group.into(),
            index,
            reply,
        })
        .await?;
        Self::reply(rx).await?
    }

    /// Current coordinator state
    pub async fn state(&self) -> VivaResult<SessionState> {
        let (reply, rx) = oneshot::channel();
        self.send(StageCommand::State { reply }).await?;
        Self::reply(rx).await
    }

    /// Cancel any session and end the stage loop
    pub async fn shutdown(&self) -> VivaResult<()> {
        self.send(StageCommand::Shutdown).await
    }

    async fn send(&self, command: StageCommand) -> VivaResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| VivaError::ChannelClosed("stage commands"))
    }

    async fn reply<T>(rx: oneshot::Receiver<T>) -> VivaResult<T> {
        rx.await.map_err(|_| VivaError::ChannelClosed("stage reply"))
    }
}

/// Async host loop
pub struct Stage<D: AudioOutput = Box<dyn AudioOutput>> {
    coordinator: StreamCoordinator<D>,
    target: SharedTarget,
    frame_interval: Duration,
    motion_priority: u8,
    commands: mpsc::Receiver<StageCommand>,
    producer: ProducerLink,
    producer_open: bool,
    output_events: mpsc::UnboundedReceiver<OutputEvent>,
    frame: Option<Pin<Box<Sleep>>>,
    epoch: Instant,
}

impl<D: AudioOutput> Stage<D> {
    pub fn new(
        config: &RuntimeConfig,
        device: D,
        output_events: mpsc::UnboundedReceiver<OutputEvent>,
        target: SharedTarget,
        producer: ProducerLink,
    ) -> VivaResult<(Self, StageHandle)> {
        let coordinator = StreamCoordinator::new(config, device, target.clone())?;
        let (tx, rx) = mpsc::channel(config.stage.command_capacity);

        let stage = Self {
            coordinator,
            target,
            frame_interval: config.stage.frame_interval(),
            motion_priority: config.lipsync.motion_priority,
            commands: rx,
            producer,
            producer_open: true,
            output_events,
            frame: None,
            epoch: Instant::now(),
        };
        Ok((stage, StageHandle { commands: tx }))
    }

    pub fn coordinator(&self) -> &StreamCoordinator<D> {
        &self.coordinator
    }

    fn now(&self) -> MediaTime {
        MediaTime::from_duration(self.epoch.elapsed())
    }

    /// Run until shut down or every `StageHandle` is dropped
    pub async fn run(mut self) -> VivaResult<()> {
        tracing::info!("stage running");
        loop {
            self.flush_outgoing();
            if self.coordinator.take_frame_request() && self.frame.is_none() {
                self.arm_frame();
            }

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(StageCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.producer.events.recv(), if self.producer_open => match event {
                    Some(event) => {
                        let now = self.now();
                        self.coordinator.handle_producer_event(event, now);
                    }
                    None => self.producer_lost(),
                },
                Some(event) = self.output_events.recv() => {
                    let now = self.now();
                    self.coordinator.handle_output_event(event, now);
                }
                _ = next_frame(&mut self.frame) => {
                    self.frame = None;
                    let now = self.now();
                    if self.coordinator.on_frame(now) == FrameRequest::Reschedule {
                        self.arm_frame();
                    }
                }
            }
        }

        self.coordinator.stop();
        self.flush_outgoing();
        tracing::info!("stage stopped");
        Ok(())
    }

    /// Run on a new tokio task
    pub fn spawn(self) -> JoinHandle<VivaResult<()>>
    where
        D: 'static,
    {
        tokio::spawn(self.run())
    }

    fn arm_frame(&mut self) {
        self.frame = Some(Box::pin(tokio::time::sleep(self.frame_interval)));
    }

    fn handle_command(&mut self, command: StageCommand) {
        let now = self.now();
        match command {
            StageCommand::Start { text, options, reply } => {
                let result = self.coordinator.start_streaming(text, options, now);
                if let Err(error) = &result {
                    tracing::debug!(%error, "start rejected");
                }
                let _ = reply.send(result);
            }
            StageCommand::Stop { reply } => {
                let stopped = self.coordinator.stop();
                if stopped {
                    self.discard_queued_events(now);
                }
                let _ = reply.send(stopped);
            }
            StageCommand::SetExpression { expression, reply } => {
                let _ = reply.send(self.target.lock().set_expression(&expression));
            }
            StageCommand::ResetExpression { reply } => {
                let _ = reply.send(self.target.lock().reset_expression());
            }
            StageCommand::PlayMotion { group, index, reply } => {
                let result = self.target.lock().play_motion(&group, index, self.motion_priority);
                let _ = reply.send(result);
            }
            StageCommand::State { reply } => {
                let _ = reply.send(self.coordinator.state());
            }
            StageCommand::Shutdown => {}
        }
    }

    fn flush_outgoing(&mut self) {
        while let Some(request) = self.coordinator.pop_outgoing() {
            if self.producer_open && self.producer.requests.send(request).is_ok() {
                continue;
            }
            self.producer_lost();
        }
    }

    /// Events already queued belong to the cancelled session
    ///
    /// They go through the idle coordinator, which counts them as dropped,
    /// so the next session only sees what the producer sends after it starts.
    fn discard_queued_events(&mut self, now: MediaTime) {
        let mut discarded = 0usize;
        while let Ok(event) = self.producer.events.try_recv() {
            self.coordinator.handle_producer_event(event, now);
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "queued producer events discarded after stop");
        }
    }

    /// The producer went away; an active session cannot complete
    fn producer_lost(&mut self) {
        if self.producer_open {
            self.producer_open = false;
            tracing::warn!("producer disconnected");
        }
        if self.coordinator.state().is_active() {
            let now = self.now();
            self.coordinator
                .handle_producer_event(ProducerEvent::error("producer disconnected"), now);
        }
    }
}

fn next_frame(frame: &mut Option<Pin<Box<Sleep>>>) -> impl Future<Output = ()> + '_ {
    async move {
        match frame {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}
