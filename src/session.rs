/*
    session.rs - C4: per-peer session bookkeeping and retry/backoff.

    Responsibilities:
    Tracks each peer's health as Fresh -> Healthy -> Unhealthy(retries, last_error),
    wraps every outbound RPC in the configured deadline, and computes the backoff
    window before a peer may be retried. A peer that has pushed at least
    `stable_message_count` messages over at least `stable_window` is considered
    stable and has its retry count reset, so a peer that hiccupped once during a
    long healthy run isn't penalized forever. Modeled on the mailbox/handle split
    in the router's connection actor, but collapsed to synchronous bookkeeping
    behind a mutex since there is no separate wire-level session to actor-ize here.

    Inputs: calls to run against a given peer.
    Outputs: the call's result, or `DhtError::PeerUnreachable` if the peer is
    currently backed off or the call times out.
*/

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::DhtConfig;
use crate::error::{DhtError, DhtResult};
use crate::key::RingKey;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Fresh,
    Healthy,
    Unhealthy { retries: u32, last_error: Instant },
}

#[derive(Debug, Clone)]
struct PeerSession {
    state: SessionState,
    message_count: u32,
    window_start: Instant,
}

impl PeerSession {
    fn fresh() -> Self {
        PeerSession { state: SessionState::Fresh, message_count: 0, window_start: Instant::now() }
    }
}

pub struct SessionManager {
    sessions: Mutex<HashMap<RingKey, PeerSession>>,
    rpc_deadline: Duration,
    stable_message_count: u32,
    stable_window: Duration,
    backoff_base: u64,
    backoff_retry_cap: u32,
}

impl SessionManager {
    pub fn new(config: &DhtConfig) -> Self {
        SessionManager {
            sessions: Mutex::new(HashMap::new()),
            rpc_deadline: config.rpc_deadline,
            stable_message_count: config.stable_message_count,
            stable_window: config.stable_window,
            backoff_base: config.backoff_base,
            backoff_retry_cap: config.backoff_retry_cap,
        }
    }

    pub async fn state(&self, peer_id: &RingKey) -> SessionState {
        self.sessions.lock().await.get(peer_id).map(|s| s.state.clone()).unwrap_or(SessionState::Fresh)
    }

    /// `None` if the peer may be contacted now; `Some(remaining)` if it is backed off.
    pub async fn backoff_remaining(&self, peer_id: &RingKey) -> Option<Duration> {
        let sessions = self.sessions.lock().await;
        match sessions.get(peer_id) {
            Some(PeerSession { state: SessionState::Unhealthy { retries, last_error }, .. }) => {
                let window = self.backoff_window(*retries);
                let elapsed = last_error.elapsed();
                if elapsed >= window {
                    None
                } else {
                    Some(window - elapsed)
                }
            }
            _ => None,
        }
    }

    fn backoff_window(&self, retries: u32) -> Duration {
        let exponent = retries.min(self.backoff_retry_cap);
        let seconds = self.backoff_base.saturating_pow(exponent);
        Duration::from_secs(seconds)
    }

    /// Runs `f` against the peer's session, subject to the RPC deadline, and
    /// records success/failure for future backoff decisions. Rejects outright if
    /// the peer is currently within its backoff window.
    pub async fn call<F, Fut, R>(&self, peer_id: RingKey, f: F) -> DhtResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DhtResult<R>>,
    {
        if let Some(_remaining) = self.backoff_remaining(&peer_id).await {
            return Err(DhtError::PeerUnreachable(peer_id));
        }

        metrics::counter!("dht.requests.total").increment(1);
        let started = Instant::now();
        let result = tokio::time::timeout(self.rpc_deadline, f()).await;
        metrics::histogram!("dht.request.duration_ms").record(started.elapsed().as_millis() as f64);

        match result {
            Ok(Ok(value)) => {
                metrics::counter!("dht.requests.success").increment(1);
                self.record_success(peer_id).await;
                Ok(value)
            }
            Ok(Err(err)) => {
                metrics::counter!("dht.requests.failed").increment(1);
                self.record_failure(peer_id).await;
                Err(err)
            }
            Err(_elapsed) => {
                metrics::counter!("dht.requests.failed").increment(1);
                self.record_failure(peer_id).await;
                Err(DhtError::PeerUnreachable(peer_id))
            }
        }
    }

    async fn record_success(&self, peer_id: RingKey) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(peer_id).or_insert_with(PeerSession::fresh);

        let now = Instant::now();
        if now.duration_since(session.window_start) >= self.stable_window {
            session.window_start = now;
            session.message_count = 0;
        }
        session.message_count += 1;

        let stable = session.message_count >= self.stable_message_count
            && now.duration_since(session.window_start) >= self.stable_window;

        session.state = if stable || matches!(session.state, SessionState::Fresh) {
            SessionState::Healthy
        } else {
            session.state.clone()
        };
    }

    /// Resets a peer straight to `Healthy` with retries cleared, for the
    /// transport's `on_peer_stable` callback (§4.4, §6): a peer observed stable
    /// for the configured message count/window doesn't have to climb back out
    /// of backoff through ordinary successful calls.
    pub async fn mark_stable(&self, peer_id: RingKey) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(peer_id).or_insert_with(PeerSession::fresh);
        session.state = SessionState::Healthy;
        session.message_count = self.stable_message_count;
        session.window_start = Instant::now() - self.stable_window;
    }

    /// Records a failure observed outside of a `call()` (the transport's
    /// `on_peer_failed` callback, §6), advancing the same retries/backoff state
    /// machine a failed `call()` would.
    pub async fn mark_failed(&self, peer_id: RingKey) {
        self.record_failure(peer_id).await;
    }

    async fn record_failure(&self, peer_id: RingKey) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(peer_id).or_insert_with(PeerSession::fresh);
        let retries = match &session.state {
            SessionState::Unhealthy { retries, .. } => retries + 1,
            _ => 1,
        };
        session.state = SessionState::Unhealthy { retries, last_error: Instant::now() };
        session.message_count = 0;
        session.window_start = Instant::now();
        metrics::gauge!("dht.session.backoff_seconds").set(self.backoff_window(retries).as_secs_f64());
    }
}
