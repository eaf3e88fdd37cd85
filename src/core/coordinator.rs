//! Module lifecycle coordinator.
//!
//! One [`Coordinator`] owns one execution context and one [`BotModule`]
//! record. All state changes happen on a single driver task that handles
//! exactly one event at a time: a caller command, a guest response, or a
//! deadline. Callers talk to it through channels and never touch the
//! record directly.
//!
//! ```text
//!   Uninitialized --init fail / instantiate fail--> Invalid
//!        |      \--setup deadline / lost / shutdown--> Shutdown
//!        | instantiate ok
//!        v
//!      Ready --tick timeout / guest error / strike-out / lost / shutdown--> Shutdown
//! ```

use crate::config::loader::CoordinatorConfig;
use crate::config::types::{BotModule, CoordinatorError, ModuleStatus, Result};
use crate::config::validator::validate_limits;
use crate::core::isolate::{ExecutionContext, ResponseReceiver};
use crate::core::types::{GuestResponse, HostRequest};
use crate::observability::audit::{self, BotEvent, BotEventType};
use crate::protocol::codec::WireReader;
use crate::protocol::{Message, MessageType, PresentCircumstances};
use crate::verdict::strikes::{KillCause, StrikePolicy, TickVerdict};
use log::{debug, info, warn};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Instant, Sleep};
use uuid::Uuid;

/// Outcome of setup as seen by `until_ready`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(CoordinatorError),
}

enum Command {
    Kickoff {
        program: Vec<u8>,
    },
    Tick {
        circumstances: PresentCircumstances,
        responder: oneshot::Sender<Result<Message>>,
    },
    Shutdown,
}

/// Caller-facing handle. Dropping it disposes the module.
pub struct Coordinator {
    commands: mpsc::UnboundedSender<Command>,
    readiness: watch::Receiver<Readiness>,
    state: watch::Receiver<BotModule>,
    module_id: Uuid,
}

impl Coordinator {
    /// Start a driver for `context` on the current tokio runtime.
    ///
    /// `responses` must be the channel `context` answers on.
    pub fn spawn<C>(context: C, responses: ResponseReceiver, config: CoordinatorConfig) -> Result<Self>
    where
        C: ExecutionContext + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoordinatorError::Config(format!("no tokio runtime available: {}", e)))?;
        validate_limits(&config.limits)?;

        let (driver, readiness_rx, state_rx) = Driver::new(Box::new(context), responses, config);
        let module_id = driver.module_id;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        runtime.spawn(driver.run(command_rx));

        debug!("Spawned coordinator for module {}", module_id);
        Ok(Self {
            commands: command_tx,
            readiness: readiness_rx,
            state: state_rx,
            module_id,
        })
    }

    pub fn module_id(&self) -> Uuid {
        self.module_id
    }

    /// Hand the guest program to the execution context. No state change.
    pub fn kickoff(&self, program: impl Into<Vec<u8>>) -> Result<()> {
        self.commands
            .send(Command::Kickoff {
                program: program.into(),
            })
            .map_err(|_| CoordinatorError::Disconnected)
    }

    /// Resolves once the guest has instantiated; fails with the setup error
    /// otherwise.
    pub async fn until_ready(&self) -> Result<()> {
        let mut readiness = self.readiness.clone();
        let outcome = readiness
            .wait_for(|r| *r != Readiness::Pending)
            .await
            .map(|r| r.clone())
            .map_err(|_| CoordinatorError::Disconnected)?;
        match outcome {
            Readiness::Ready => Ok(()),
            Readiness::Failed(e) => Err(e),
            Readiness::Pending => Err(CoordinatorError::Disconnected),
        }
    }

    /// Run one turn.
    ///
    /// The request is queued before this returns, so two calls made back to
    /// back are seen by the driver in call order.
    pub fn tick(
        &self,
        circumstances: PresentCircumstances,
    ) -> impl Future<Output = Result<Message>> + Send + 'static {
        let (responder, outcome) = oneshot::channel();
        let queued = self
            .commands
            .send(Command::Tick {
                circumstances,
                responder,
            })
            .is_ok();

        async move {
            if !queued {
                return Err(CoordinatorError::Disconnected);
            }
            outcome.await.map_err(|_| CoordinatorError::Disconnected)?
        }
    }

    /// Latest published state.
    pub fn snapshot(&self) -> BotModule {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ModuleStatus {
        self.state.borrow().status
    }

    /// Terminate the guest and reject anything pending.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SetupPhase {
    NotStarted,
    /// Init request sent, waiting for the load acknowledgement
    Loading,
    /// Instantiate request sent, setup deadline armed
    Instantiating,
    Done,
}

struct PendingTick {
    responder: oneshot::Sender<Result<Message>>,
    started: Instant,
    deadline: Pin<Box<Sleep>>,
    number: u64,
}

enum Event {
    SetupDeadline,
    TickDeadline,
    Response(Option<GuestResponse>),
    Command(Option<Command>),
}

struct Driver {
    module_id: Uuid,
    config: CoordinatorConfig,
    context: Option<Box<dyn ExecutionContext>>,
    responses: ResponseReceiver,
    responses_open: bool,
    module: BotModule,
    state_tx: watch::Sender<BotModule>,
    readiness_tx: watch::Sender<Readiness>,
    setup: SetupPhase,
    setup_deadline: Option<Pin<Box<Sleep>>>,
    pending_tick: Option<PendingTick>,
    ticks_started: u64,
    fingerprint: Option<String>,
}

async fn deadline(sleep: Option<&mut Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

impl Driver {
    fn new(
        context: Box<dyn ExecutionContext>,
        responses: ResponseReceiver,
        config: CoordinatorConfig,
    ) -> (Self, watch::Receiver<Readiness>, watch::Receiver<BotModule>) {
        let (readiness_tx, readiness_rx) = watch::channel(Readiness::Pending);
        let (state_tx, state_rx) = watch::channel(BotModule::default());
        let driver = Driver {
            module_id: Uuid::new_v4(),
            config,
            context: Some(context),
            responses,
            responses_open: true,
            module: BotModule::default(),
            state_tx,
            readiness_tx,
            setup: SetupPhase::NotStarted,
            setup_deadline: None,
            pending_tick: None,
            ticks_started: 0,
            fingerprint: None,
        };
        (driver, readiness_rx, state_rx)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let event = tokio::select! {
                biased;

                _ = deadline(self.setup_deadline.as_mut()) => Event::SetupDeadline,
                _ = deadline(self.pending_tick.as_mut().map(|t| &mut t.deadline)) => Event::TickDeadline,
                response = self.responses.recv(), if self.responses_open => Event::Response(response),
                command = commands.recv() => Event::Command(command),
            };

            match event {
                Event::SetupDeadline => self.on_setup_deadline(),
                Event::TickDeadline => self.on_tick_deadline(),
                Event::Response(Some(response)) => self.on_response(response),
                Event::Response(None) => self.on_responses_closed(),
                Event::Command(Some(command)) => self.on_command(command),
                Event::Command(None) => {
                    self.dispose("handle dropped");
                    break;
                }
            }
        }
        debug!("Coordinator driver for module {} stopped", self.module_id);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Kickoff { program } => self.kickoff(program),
            Command::Tick {
                circumstances,
                responder,
            } => self.start_tick(circumstances, responder),
            Command::Shutdown => self.dispose("shutdown requested"),
        }
    }

    fn kickoff(&mut self, program: Vec<u8>) {
        if self.setup != SetupPhase::NotStarted || self.module.status.is_terminal() {
            warn!(
                "Ignoring kickoff for module {} (status: {}, setup: {:?})",
                self.module_id, self.module.status, self.setup
            );
            return;
        }

        let fingerprint = audit::program_fingerprint(&program);
        audit::record(
            self.event(BotEventType::ModuleKickoff, format!("{} program bytes", program.len()))
                .with_fingerprint(Some(&fingerprint)),
        );
        self.fingerprint = Some(fingerprint);
        self.setup = SetupPhase::Loading;

        let request = HostRequest::InitModule {
            program,
            limits: self.config.limits.clone(),
        };
        self.send(request);
    }

    fn on_response(&mut self, response: GuestResponse) {
        if self.module.status.is_terminal() {
            debug!(
                "Discarding response from terminated module {}: {:?}",
                self.module_id, response
            );
            return;
        }

        match response {
            GuestResponse::Log { level, message } => {
                log::log!(target: "botbox::guest", log::Level::from(level), "[{}] {}", self.module_id, message);
            }
            GuestResponse::InitModuleDone { success, error } => self.on_init_done(success, error),
            GuestResponse::InstantiateDone { success } => self.on_instantiate_done(success),
            GuestResponse::RunTickDone {
                had_error,
                move_type,
                move_payload,
            } => match self.pending_tick.take() {
                Some(pending) => self.complete_tick(pending, had_error, move_type, &move_payload),
                None => warn!("Module {} answered a tick nobody asked for", self.module_id),
            },
        }
    }

    fn on_init_done(&mut self, success: bool, error: Option<String>) {
        if self.setup != SetupPhase::Loading {
            warn!("Unexpected init acknowledgement from module {}", self.module_id);
            return;
        }

        if !success {
            let reason = error.unwrap_or_else(|| "guest rejected program".to_string());
            self.fail(
                ModuleStatus::Invalid,
                CoordinatorError::InitFailure(reason.clone()),
                self.event(BotEventType::InitFailure, reason),
            );
            return;
        }

        self.setup = SetupPhase::Instantiating;
        self.setup_deadline = Some(Box::pin(sleep(self.config.limits.setup_time_limit)));
        let request = HostRequest::Instantiate {
            rng_seed: self.config.rng_seed,
            params: self.config.params.clone(),
        };
        self.send(request);
    }

    fn on_instantiate_done(&mut self, success: bool) {
        if self.setup != SetupPhase::Instantiating {
            warn!("Unexpected instantiate acknowledgement from module {}", self.module_id);
            return;
        }
        self.setup_deadline = None;

        if !success {
            self.fail(
                ModuleStatus::Invalid,
                CoordinatorError::InitFailure("guest failed to instantiate".to_string()),
                self.event(BotEventType::InstantiateFailure, "instantiate rejected"),
            );
            return;
        }

        self.setup = SetupPhase::Done;
        self.module.status = ModuleStatus::Ready;
        self.publish();
        self.readiness_tx.send_replace(Readiness::Ready);
        audit::record(self.event(BotEventType::ModuleReady, "module ready"));
    }

    fn on_setup_deadline(&mut self) {
        self.setup_deadline = None;
        if self.module.status != ModuleStatus::Uninitialized {
            return;
        }
        let limit_ms = duration_ms(self.config.limits.setup_time_limit);
        self.fail(
            ModuleStatus::Shutdown,
            CoordinatorError::SetupTimeout { limit_ms },
            self.event(
                BotEventType::SetupTimeout,
                format!("no instantiate acknowledgement within {}ms", limit_ms),
            ),
        );
    }

    fn start_tick(
        &mut self,
        mut circumstances: PresentCircumstances,
        responder: oneshot::Sender<Result<Message>>,
    ) {
        let rejection = match self.module.status {
            ModuleStatus::Shutdown => Some(CoordinatorError::ModuleShutdown),
            ModuleStatus::Ready if self.pending_tick.is_some() => {
                Some(CoordinatorError::ConcurrentTickRejected)
            }
            ModuleStatus::Ready => None,
            status => Some(CoordinatorError::NotReady(status)),
        };
        if let Some(error) = rejection {
            audit::record(self.event(BotEventType::TickRejected, error.to_string()));
            let _ = responder.send(Err(error));
            return;
        }

        self.ticks_started += 1;
        circumstances.last_tick_duration = self.module.last_tick_duration_ms;
        self.module.in_tick = true;
        self.publish();
        self.pending_tick = Some(PendingTick {
            responder,
            started: Instant::now(),
            deadline: Box::pin(sleep(self.config.limits.tick_kill_time_limit)),
            number: self.ticks_started,
        });

        self.send(HostRequest::RunTick { circumstances });
    }

    fn on_tick_deadline(&mut self) {
        let Some(pending) = self.pending_tick.as_ref() else {
            return;
        };
        let number = pending.number;
        let limit_ms = duration_ms(self.config.limits.tick_kill_time_limit);
        self.fail(
            ModuleStatus::Shutdown,
            CoordinatorError::TickTimeout { limit_ms },
            self.event(
                BotEventType::TickTimeout,
                format!("no response within {}ms", limit_ms),
            )
            .with_tick(number)
            .with_elapsed_ms(limit_ms),
        );
    }

    fn complete_tick(&mut self, pending: PendingTick, had_error: bool, move_type: u8, payload: &[u8]) {
        let elapsed = pending.started.elapsed();
        let number = pending.number;
        let elapsed_ms = duration_ms_ceil(elapsed);
        self.module.in_tick = false;
        self.module.last_tick_duration_ms = elapsed_ms;

        let prior = self.module.strike_count;
        let verdict = StrikePolicy::classify(elapsed, &self.config.limits, prior);
        self.module.strike_count = verdict.strikes(prior);
        self.publish();

        match verdict {
            TickVerdict::Ok => {}
            TickVerdict::Warn { strikes } => {
                let event = self.tick_event(
                    BotEventType::SoftOverrun,
                    format!("tick took {}ms (strike {})", elapsed_ms, strikes),
                    number,
                    elapsed_ms,
                );
                audit::record(event);
            }
            TickVerdict::Kill {
                strikes,
                cause: KillCause::StrikesExhausted,
            } => {
                let event = self.tick_event(
                    BotEventType::StrikeOut,
                    format!("tick took {}ms; {} strikes reached", elapsed_ms, strikes),
                    number,
                    elapsed_ms,
                );
                self.fail(ModuleStatus::Shutdown, CoordinatorError::ModuleShutdown, event);
            }
            TickVerdict::Kill {
                cause: KillCause::DeadlineExceeded,
                ..
            } => {
                let limit_ms = duration_ms(self.config.limits.tick_kill_time_limit);
                let event = self.tick_event(
                    BotEventType::TickTimeout,
                    format!("response arrived after {}ms limit", limit_ms),
                    number,
                    elapsed_ms,
                );
                self.fail(ModuleStatus::Shutdown, CoordinatorError::ModuleShutdown, event);
                let _ = pending.responder.send(Err(CoordinatorError::TickTimeout { limit_ms }));
                return;
            }
        }

        if had_error {
            let error = CoordinatorError::TickRuntimeError("guest reported an error".to_string());
            if !self.module.status.is_terminal() {
                let event = self.tick_event(
                    BotEventType::TickRuntimeError,
                    error.to_string(),
                    number,
                    elapsed_ms,
                );
                self.fail(ModuleStatus::Shutdown, error.clone(), event);
            }
            let _ = pending.responder.send(Err(error));
            return;
        }

        let message = reconstruct_move(move_type, payload);
        let remainder = self.config.limits.minimum_tick_time.saturating_sub(elapsed);
        if remainder.is_zero() {
            let _ = pending.responder.send(Ok(message));
        } else {
            let responder = pending.responder;
            tokio::spawn(async move {
                sleep(remainder).await;
                let _ = responder.send(Ok(message));
            });
        }
    }

    fn tick_event(&self, kind: BotEventType, details: String, number: u64, elapsed_ms: u32) -> BotEvent {
        self.event(kind, details)
            .with_tick(number)
            .with_elapsed_ms(u64::from(elapsed_ms))
            .with_strikes(self.module.strike_count)
    }

    fn on_responses_closed(&mut self) {
        self.responses_open = false;
        if self.module.status.is_terminal() {
            return;
        }

        let error = if self.setup == SetupPhase::Done {
            CoordinatorError::TickRuntimeError("execution context lost".to_string())
        } else {
            CoordinatorError::InitFailure("execution context lost".to_string())
        };
        self.fail(
            ModuleStatus::Shutdown,
            error,
            self.event(BotEventType::ContextLost, "response channel closed"),
        );
    }

    fn dispose(&mut self, reason: &str) {
        if self.module.status.is_terminal() {
            return;
        }
        self.fail(
            ModuleStatus::Shutdown,
            CoordinatorError::ModuleShutdown,
            self.event(BotEventType::Disposed, reason),
        );
    }

    /// Terminal transition: stop the guest, publish, report once, and reject
    /// whatever is still waiting.
    fn fail(&mut self, status: ModuleStatus, error: CoordinatorError, event: BotEvent) {
        if let Some(mut context) = self.context.take() {
            context.terminate();
        }
        self.setup_deadline = None;
        let pending = self.pending_tick.take();

        self.module.status = status;
        self.module.in_tick = false;
        self.publish();
        audit::record(event);

        if *self.readiness_tx.borrow() == Readiness::Pending {
            self.readiness_tx.send_replace(Readiness::Failed(error.clone()));
        }
        if let Some(pending) = pending {
            let _ = pending.responder.send(Err(error));
        }
        info!("Module {} is now {}", self.module_id, status);
    }

    fn send(&mut self, request: HostRequest) {
        let kind = request.kind();
        let result = match self.context.as_mut() {
            Some(context) => context.send(request),
            None => Err(CoordinatorError::ModuleShutdown),
        };
        if let Err(e) = result {
            let error = if self.setup == SetupPhase::Done {
                CoordinatorError::TickRuntimeError(format!("failed to send {}: {}", kind, e))
            } else {
                CoordinatorError::InitFailure(format!("failed to send {}: {}", kind, e))
            };
            self.fail(
                ModuleStatus::Shutdown,
                error,
                self.event(BotEventType::ContextLost, format!("{} request undeliverable", kind)),
            );
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.module.clone());
    }

    fn event(&self, kind: BotEventType, details: impl Into<String>) -> BotEvent {
        BotEvent::new(kind, details)
            .with_module(self.module_id)
            .with_fingerprint(self.fingerprint.as_deref())
    }
}

/// Rebuild the guest's move from its tag and untagged body.
fn reconstruct_move(move_type: u8, payload: &[u8]) -> Message {
    let Some(message_type) = MessageType::from_tag(move_type) else {
        return Message::error(format!("Invalid message type submitted: {}", move_type));
    };
    match Message::decode_body(message_type, &mut WireReader::new(payload)) {
        Ok(message) => message,
        Err(e) => Message::error(format!("Malformed {} payload: {}", message_type, e)),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn duration_ms_ceil(duration: Duration) -> u32 {
    let ms = duration.as_nanos().div_ceil(1_000_000);
    u32::try_from(ms).unwrap_or(u32::MAX)
}
