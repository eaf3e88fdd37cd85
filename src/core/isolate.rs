//! Isolated execution contexts.
//!
//! A context accepts [`HostRequest`]s and answers asynchronously on a
//! response channel. The coordinator never reaches into the guest; it only
//! sends requests, reads responses, and terminates.
//!
//! [`ThreadIsolate`] runs a guest on its own OS thread and speaks BSCI frames
//! to it, the same way an out-of-process guest would.

use crate::config::types::{CoordinatorError, Result, TimeLimits};
use crate::core::types::{GuestLogLevel, GuestResponse, HostRequest};
use crate::protocol::{self, InitialParameters, Message, PresentCircumstances, ProtocolError};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

pub type ResponseSender = mpsc::UnboundedSender<GuestResponse>;
pub type ResponseReceiver = mpsc::UnboundedReceiver<GuestResponse>;

/// Host side of one isolated guest.
pub trait ExecutionContext: Send {
    /// Queue a request for the guest. Must not block.
    fn send(&mut self, request: HostRequest) -> Result<()>;

    /// Abrupt, non-cooperative stop. Nothing the guest produces afterwards
    /// may reach the host.
    fn terminate(&mut self);
}

/// Services the host exposes to a running guest.
#[derive(Clone)]
pub struct GuestHost {
    responses: ResponseSender,
    terminated: Arc<AtomicBool>,
}

impl GuestHost {
    /// A host for running a guest in-process, outside any isolate.
    pub fn new(responses: ResponseSender) -> Self {
        Self {
            responses,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn log(&self, level: GuestLogLevel, message: impl Into<String>) {
        self.reply(GuestResponse::Log {
            level,
            message: message.into(),
        });
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Returns false once the host is gone or has terminated us.
    fn reply(&self, response: GuestResponse) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.responses.send(response).is_ok()
    }
}

/// A loaded guest program. Inputs and outputs are BSCI frames.
pub trait GuestProgram: Send {
    /// Accept or reject the game's initial parameters (one packed
    /// `InitialParameters` message).
    fn instantiate(
        &mut self,
        host: &GuestHost,
        rng_seed: u64,
        params: &[u8],
    ) -> std::result::Result<(), String>;

    /// One turn: a packed `PresentCircumstances` in, a packed move out.
    fn tick(&mut self, host: &GuestHost, circumstances: &[u8])
        -> std::result::Result<Vec<u8>, String>;
}

/// Turns program bytes into a runnable guest.
pub trait GuestLoader: Send + Sync {
    fn load(
        &self,
        program: &[u8],
        limits: &TimeLimits,
    ) -> std::result::Result<Box<dyn GuestProgram>, String>;
}

static NEXT_GUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Guest running on a dedicated thread.
///
/// Termination drops the request channel and silences the guest's outbound
/// side. The thread itself is detached: a guest stuck inside a call keeps
/// its thread until that call returns, but its output is discarded.
pub struct ThreadIsolate {
    requests: Option<Sender<HostRequest>>,
    terminated: Arc<AtomicBool>,
    name: String,
}

impl ThreadIsolate {
    pub fn launch(loader: Arc<dyn GuestLoader>) -> Result<(Self, ResponseReceiver)> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let terminated = Arc::new(AtomicBool::new(false));
        let host = GuestHost {
            responses: response_tx,
            terminated: Arc::clone(&terminated),
        };

        let name = format!(
            "botbox-guest-{}",
            NEXT_GUEST_ID.fetch_add(1, Ordering::Relaxed)
        );
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || guest_main(loader, host, request_rx))
            .map_err(|e| CoordinatorError::InitFailure(format!("failed to spawn guest thread: {}", e)))?;

        debug!("Launched guest thread {}", name);
        Ok((
            Self {
                requests: Some(request_tx),
                terminated,
                name,
            },
            response_rx,
        ))
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

impl ExecutionContext for ThreadIsolate {
    fn send(&mut self, request: HostRequest) -> Result<()> {
        let requests = self.requests.as_ref().ok_or(CoordinatorError::ModuleShutdown)?;
        requests
            .send(request)
            .map_err(|_| CoordinatorError::Disconnected)
    }

    fn terminate(&mut self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.requests = None;
        debug!("Terminated guest thread {}", self.name);
    }
}

impl Drop for ThreadIsolate {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn guest_main(loader: Arc<dyn GuestLoader>, host: GuestHost, requests: Receiver<HostRequest>) {
    let mut program: Option<Box<dyn GuestProgram>> = None;

    while let Ok(request) = requests.recv() {
        if host.is_terminated() {
            break;
        }

        let response = match request {
            HostRequest::InitModule {
                program: bytes,
                limits,
            } => match guarded(|| loader.load(&bytes, &limits)) {
                Ok(loaded) => {
                    program = Some(loaded);
                    GuestResponse::init_ok()
                }
                Err(e) => GuestResponse::init_failed(e),
            },
            HostRequest::Instantiate { rng_seed, params } => {
                let success = match program.as_mut() {
                    Some(program) => instantiate(&mut **program, &host, rng_seed, params),
                    None => {
                        warn!("Instantiate requested before a program was loaded");
                        false
                    }
                };
                GuestResponse::instantiated(success)
            }
            HostRequest::RunTick { circumstances } => match program.as_mut() {
                Some(program) => run_tick(&mut **program, &host, circumstances),
                None => {
                    warn!("Tick requested before a program was loaded");
                    GuestResponse::tick_error()
                }
            },
        };

        if !host.reply(response) {
            break;
        }
    }

    debug!(
        "Guest thread {} exiting",
        thread::current().name().unwrap_or("<unnamed>")
    );
}

fn instantiate(
    program: &mut dyn GuestProgram,
    host: &GuestHost,
    rng_seed: u64,
    params: InitialParameters,
) -> bool {
    let frame = match protocol::pack(&[Message::InitialParameters(params)]) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to pack initial parameters: {}", e);
            return false;
        }
    };

    match guarded(|| program.instantiate(host, rng_seed, &frame)) {
        Ok(()) => true,
        Err(e) => {
            host.log(GuestLogLevel::Error, format!("instantiate failed: {}", e));
            false
        }
    }
}

fn run_tick(
    program: &mut dyn GuestProgram,
    host: &GuestHost,
    circumstances: PresentCircumstances,
) -> GuestResponse {
    let frame = match protocol::pack(&[Message::PresentCircumstances(circumstances)]) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to pack circumstances: {}", e);
            return GuestResponse::tick_error();
        }
    };

    match guarded(|| program.tick(host, &frame)) {
        Ok(reply) => reply_to_response(&reply),
        Err(e) => {
            host.log(GuestLogLevel::Error, format!("tick failed: {}", e));
            GuestResponse::tick_error()
        }
    }
}

/// Maps a guest's packed reply onto the tick contract. Only the first
/// message of the frame counts as the move.
fn reply_to_response(reply: &[u8]) -> GuestResponse {
    match protocol::unpack(reply) {
        Ok(messages) => match messages.first() {
            Some(message) => GuestResponse::tick_message(message).unwrap_or_else(|e| {
                warn!("Failed to re-encode guest move: {}", e);
                GuestResponse::tick_error()
            }),
            None => {
                warn!("Guest submitted an empty frame");
                GuestResponse::tick_error()
            }
        },
        // Let the coordinator report the unknown tag as the move itself
        Err(ProtocolError::UnknownMessageType(tag)) => GuestResponse::tick_move(tag, Vec::new()),
        Err(e) => {
            warn!("Guest submitted a malformed frame: {}", e);
            GuestResponse::tick_error()
        }
    }
}

fn guarded<T>(call: impl FnOnce() -> std::result::Result<T, String>) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("guest panicked: {}", message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Direction, MoveTo};
    use std::time::Duration;

    struct Scripted {
        reply: Vec<u8>,
    }

    impl GuestProgram for Scripted {
        fn instantiate(&mut self, host: &GuestHost, _: u64, params: &[u8]) -> std::result::Result<(), String> {
            host.log(GuestLogLevel::Info, "hello");
            match protocol::unpack(params).map_err(|e| e.to_string())?.as_slice() {
                [Message::InitialParameters(p)] if p.params_version == 7 => Ok(()),
                _ => Err("unsupported parameters".to_string()),
            }
        }

        fn tick(&mut self, _: &GuestHost, circumstances: &[u8]) -> std::result::Result<Vec<u8>, String> {
            if circumstances.len() < 9 {
                return Err("short frame".to_string());
            }
            if self.reply.is_empty() {
                panic!("nothing to say");
            }
            Ok(self.reply.clone())
        }
    }

    struct Loader(Vec<u8>);

    impl GuestLoader for Loader {
        fn load(&self, program: &[u8], _: &TimeLimits) -> std::result::Result<Box<dyn GuestProgram>, String> {
            if program == b"bad" {
                return Err("cannot compile".to_string());
            }
            Ok(Box::new(Scripted {
                reply: self.0.clone(),
            }))
        }
    }

    fn limits() -> TimeLimits {
        TimeLimits {
            setup_time_limit: Duration::from_millis(100),
            tick_warn_time_limit: Duration::from_millis(50),
            tick_kill_time_limit: Duration::from_millis(200),
            minimum_tick_time: Duration::ZERO,
            max_strikes: 3,
        }
    }

    fn params(version: u16) -> InitialParameters {
        InitialParameters {
            params_version: version,
            ..Default::default()
        }
    }

    async fn next_non_log(rx: &mut ResponseReceiver) -> GuestResponse {
        loop {
            match rx.recv().await {
                Some(GuestResponse::Log { .. }) => continue,
                Some(other) => return other,
                None => panic!("response channel closed"),
            }
        }
    }

    fn launch(reply: Vec<u8>) -> (ThreadIsolate, ResponseReceiver) {
        ThreadIsolate::launch(Arc::new(Loader(reply))).unwrap()
    }

    #[tokio::test]
    async fn test_full_exchange() {
        let reply = protocol::pack(&[Message::MoveTo(MoveTo {
            direction: Direction::East,
            distance: 1,
        })])
        .unwrap();
        let (mut isolate, mut rx) = launch(reply);

        isolate
            .send(HostRequest::InitModule {
                program: b"ok".to_vec(),
                limits: limits(),
            })
            .unwrap();
        assert_eq!(next_non_log(&mut rx).await, GuestResponse::init_ok());

        isolate
            .send(HostRequest::Instantiate {
                rng_seed: 1,
                params: params(7),
            })
            .unwrap();
        assert!(matches!(rx.recv().await, Some(GuestResponse::Log { .. })));
        assert_eq!(next_non_log(&mut rx).await, GuestResponse::instantiated(true));

        isolate
            .send(HostRequest::RunTick {
                circumstances: PresentCircumstances::default(),
            })
            .unwrap();
        assert_eq!(
            next_non_log(&mut rx).await,
            GuestResponse::tick_move(6, vec![2, 1])
        );
    }

    #[tokio::test]
    async fn test_load_failure_is_reported() {
        let (mut isolate, mut rx) = launch(Vec::new());
        isolate
            .send(HostRequest::InitModule {
                program: b"bad".to_vec(),
                limits: limits(),
            })
            .unwrap();
        assert_eq!(
            next_non_log(&mut rx).await,
            GuestResponse::init_failed("cannot compile")
        );
    }

    #[tokio::test]
    async fn test_rejected_parameters() {
        let (mut isolate, mut rx) = launch(Vec::new());
        isolate
            .send(HostRequest::InitModule {
                program: b"ok".to_vec(),
                limits: limits(),
            })
            .unwrap();
        next_non_log(&mut rx).await;
        isolate
            .send(HostRequest::Instantiate {
                rng_seed: 1,
                params: params(6),
            })
            .unwrap();
        assert_eq!(next_non_log(&mut rx).await, GuestResponse::instantiated(false));
    }

    #[tokio::test]
    async fn test_guest_panic_becomes_tick_error() {
        let (mut isolate, mut rx) = launch(Vec::new());
        isolate
            .send(HostRequest::InitModule {
                program: b"ok".to_vec(),
                limits: limits(),
            })
            .unwrap();
        next_non_log(&mut rx).await;
        isolate
            .send(HostRequest::RunTick {
                circumstances: PresentCircumstances::default(),
            })
            .unwrap();
        assert_eq!(next_non_log(&mut rx).await, GuestResponse::tick_error());
    }

    #[test]
    fn test_reply_mapping() {
        let wait = protocol::pack(&[Message::Wait]).unwrap();
        assert_eq!(reply_to_response(&wait), GuestResponse::tick_move(4, Vec::new()));

        let mut unknown = wait.clone();
        unknown[8] = 42;
        assert_eq!(reply_to_response(&unknown), GuestResponse::tick_move(42, Vec::new()));

        assert_eq!(reply_to_response(b"nope"), GuestResponse::tick_error());
        let empty = protocol::pack(&[]).unwrap();
        assert_eq!(reply_to_response(&empty), GuestResponse::tick_error());
    }

    #[tokio::test]
    async fn test_terminate_closes_channels() {
        let (mut isolate, mut rx) = launch(Vec::new());
        isolate.terminate();
        assert!(isolate.is_terminated());
        assert!(matches!(
            isolate.send(HostRequest::RunTick {
                circumstances: PresentCircumstances::default(),
            }),
            Err(CoordinatorError::ModuleShutdown)
        ));
        assert!(rx.recv().await.is_none());
    }
}
