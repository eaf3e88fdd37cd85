//! Programmable execution context for deterministic lifecycle tests.
//!
//! Replies are scheduled on tokio timers, so under a paused clock every
//! delay is exact.

use crate::config::types::{CoordinatorError, Result};
use crate::core::isolate::{ExecutionContext, ResponseReceiver, ResponseSender};
use crate::core::types::{GuestResponse, HostRequest};
use crate::protocol::Message;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// What the fake guest does with one request.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Deliver each response once its delay (measured from the request) passes.
    Respond(Vec<(Duration, GuestResponse)>),
    /// Swallow the request.
    Silent,
    /// Close the response channel, as if the guest process died.
    Disconnect,
}

impl Reply {
    pub fn now(response: GuestResponse) -> Self {
        Reply::Respond(vec![(Duration::ZERO, response)])
    }

    pub fn after(delay_ms: u64, response: GuestResponse) -> Self {
        Reply::Respond(vec![(Duration::from_millis(delay_ms), response)])
    }

    /// Queue another response after this one.
    pub fn then(self, delay_ms: u64, response: GuestResponse) -> Self {
        let step = (Duration::from_millis(delay_ms), response);
        match self {
            Reply::Respond(mut steps) => {
                steps.push(step);
                Reply::Respond(steps)
            }
            _ => Reply::Respond(vec![step]),
        }
    }

    /// A tick answered with `message` after `delay_ms`.
    pub fn move_after(delay_ms: u64, message: &Message) -> Self {
        match GuestResponse::tick_message(message) {
            Ok(response) => Self::after(delay_ms, response),
            Err(_) => Self::after(delay_ms, GuestResponse::tick_error()),
        }
    }
}

/// Per-request behaviour. Tick replies are consumed in order; the last one
/// repeats.
#[derive(Clone, Debug)]
pub struct Script {
    init: Reply,
    instantiate: Reply,
    ticks: VecDeque<Reply>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    /// A guest that loads, instantiates, and waits every tick, all instantly.
    pub fn new() -> Self {
        Self {
            init: Reply::now(GuestResponse::init_ok()),
            instantiate: Reply::now(GuestResponse::instantiated(true)),
            ticks: VecDeque::from([Reply::move_after(0, &Message::Wait)]),
        }
    }

    pub fn on_init(mut self, reply: Reply) -> Self {
        self.init = reply;
        self
    }

    pub fn on_instantiate(mut self, reply: Reply) -> Self {
        self.instantiate = reply;
        self
    }

    /// Replace every tick reply with `reply`.
    pub fn on_tick(mut self, reply: Reply) -> Self {
        self.ticks = VecDeque::from([reply]);
        self
    }

    /// Replace tick replies with a sequence.
    pub fn on_ticks(mut self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.ticks = replies.into_iter().collect();
        self
    }

    fn next_tick(&mut self) -> Reply {
        if self.ticks.len() > 1 {
            self.ticks.pop_front().unwrap_or(Reply::Silent)
        } else {
            self.ticks.front().cloned().unwrap_or(Reply::Silent)
        }
    }
}

/// Read-only view a test keeps after handing the isolate away.
#[derive(Clone)]
pub struct ScriptProbe {
    requests: Arc<Mutex<Vec<HostRequest>>>,
    terminated: Arc<AtomicBool>,
    terminations: Arc<AtomicUsize>,
}

impl ScriptProbe {
    pub fn requests(&self) -> Vec<HostRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_kinds(&self) -> Vec<&'static str> {
        self.requests().iter().map(HostRequest::kind).collect()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn termination_count(&self) -> usize {
        self.terminations.load(Ordering::Acquire)
    }
}

/// Execution context that follows a [`Script`].
///
/// Replies already scheduled when `terminate` runs are still delivered,
/// the way a straggling message from a killed guest would be.
pub struct ScriptedIsolate {
    script: Script,
    responses: Option<ResponseSender>,
    probe: ScriptProbe,
}

impl ScriptedIsolate {
    pub fn launch(script: Script) -> (Self, ResponseReceiver, ScriptProbe) {
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = ScriptProbe {
            requests: Arc::new(Mutex::new(Vec::new())),
            terminated: Arc::new(AtomicBool::new(false)),
            terminations: Arc::new(AtomicUsize::new(0)),
        };
        let isolate = Self {
            script,
            responses: Some(tx),
            probe: probe.clone(),
        };
        (isolate, rx, probe)
    }

    fn play(&mut self, reply: Reply) {
        match reply {
            Reply::Silent => {}
            Reply::Disconnect => self.responses = None,
            Reply::Respond(steps) => {
                let Some(tx) = self.responses.clone() else {
                    return;
                };
                let start = Instant::now();
                if steps.iter().all(|(delay, _)| delay.is_zero()) {
                    for (_, response) in steps {
                        let _ = tx.send(response);
                    }
                    return;
                }
                tokio::spawn(async move {
                    for (delay, response) in steps {
                        sleep_until(start + delay).await;
                        let _ = tx.send(response);
                    }
                });
            }
        }
    }
}

impl ExecutionContext for ScriptedIsolate {
    fn send(&mut self, request: HostRequest) -> Result<()> {
        if self.probe.is_terminated() {
            return Err(CoordinatorError::ModuleShutdown);
        }
        if let Ok(mut requests) = self.probe.requests.lock() {
            requests.push(request.clone());
        }

        let reply = match request {
            HostRequest::InitModule { .. } => self.script.init.clone(),
            HostRequest::Instantiate { .. } => self.script.instantiate.clone(),
            HostRequest::RunTick { .. } => self.script.next_tick(),
        };
        self.play(reply);
        Ok(())
    }

    fn terminate(&mut self) {
        self.probe.terminated.store(true, Ordering::Release);
        self.probe.terminations.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PresentCircumstances;

    fn tick_request() -> HostRequest {
        HostRequest::RunTick {
            circumstances: PresentCircumstances::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_steps_arrive_in_order() {
        let script = Script::new().on_tick(
            Reply::after(10, GuestResponse::Log {
                level: crate::core::types::GuestLogLevel::Info,
                message: "thinking".to_string(),
            })
            .then(30, GuestResponse::tick_move(5, Vec::new())),
        );
        let (mut isolate, mut rx, probe) = ScriptedIsolate::launch(script);

        let start = Instant::now();
        isolate.send(tick_request()).unwrap();
        assert!(matches!(rx.recv().await, Some(GuestResponse::Log { .. })));
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert_eq!(rx.recv().await, Some(GuestResponse::tick_move(5, Vec::new())));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(probe.request_kinds(), vec!["run_tick"]);
    }

    #[tokio::test]
    async fn test_tick_sequence_repeats_last() {
        let script = Script::new().on_ticks([
            Reply::move_after(0, &Message::Resign),
            Reply::move_after(0, &Message::Wait),
        ]);
        let (mut isolate, mut rx, _probe) = ScriptedIsolate::launch(script);
        for expected in [5u8, 4, 4] {
            isolate.send(tick_request()).unwrap();
            assert_eq!(rx.recv().await, Some(GuestResponse::tick_move(expected, Vec::new())));
        }
    }

    #[tokio::test]
    async fn test_disconnect_closes_channel() {
        let (mut isolate, mut rx, _probe) =
            ScriptedIsolate::launch(Script::new().on_init(Reply::Disconnect));
        isolate
            .send(HostRequest::Instantiate {
                rng_seed: 0,
                params: Default::default(),
            })
            .unwrap();
        assert_eq!(rx.recv().await, Some(GuestResponse::instantiated(true)));

        isolate
            .send(HostRequest::InitModule {
                program: Vec::new(),
                limits: crate::config::types::TimeLimits {
                    setup_time_limit: Duration::from_millis(1),
                    tick_warn_time_limit: Duration::from_millis(1),
                    tick_kill_time_limit: Duration::from_millis(2),
                    minimum_tick_time: Duration::ZERO,
                    max_strikes: 1,
                },
            })
            .unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_terminate_rejects_further_requests() {
        let (mut isolate, _rx, probe) = ScriptedIsolate::launch(Script::new().on_tick(Reply::Silent));
        isolate.terminate();
        assert!(probe.is_terminated());
        assert_eq!(probe.termination_count(), 1);
        assert!(isolate.send(tick_request()).is_err());
        assert!(probe.requests().is_empty());
    }
}
