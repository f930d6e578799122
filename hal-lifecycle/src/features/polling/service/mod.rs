use hal_core::{RunningState, ServerConfigStatus, SuspendState};
use hal_dispatch::{DispatchError, DispatchResult, Dispatcher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::shared::types::{PollRead, PollSnapshot, Predicate, Verification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied,
    TimedOut,
    /// The owner of the poll lost interest, e.g. the action was superseded.
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum PollError {
    #[error("Poll aborted: {0}")]
    Dispatch(DispatchError),
}

/// Re-reads remote state until a predicate holds or the budget runs out.
#[derive(Clone)]
pub struct Poller {
    dispatcher: Arc<dyn Dispatcher>,
    interval: Duration,
}

impl Poller {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn read(&self, read: &PollRead) -> DispatchResult<PollSnapshot> {
        match read {
            PollRead::Single(operation) => self
                .dispatcher
                .execute(operation)
                .await
                .map(PollSnapshot::Single),
            PollRead::Composite(composite) => self
                .dispatcher
                .execute_composite(composite)
                .await
                .map(PollSnapshot::Composite),
        }
    }

    /// Poll `verification.read` every interval. The first read happens one
    /// interval after the call. `cancelled` is checked before each read.
    pub async fn poll_until<C>(
        &self,
        verification: &Verification,
        cancelled: C,
    ) -> Result<PollOutcome, PollError>
    where
        C: Fn() -> bool + Send + Sync,
    {
        let started = Instant::now();
        let polling = async {
            let mut ticker = time::interval_at(started + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut attempt: u32 = 0;

            loop {
                ticker.tick().await;
                if cancelled() {
                    debug!(attempt, "Poll cancelled");
                    return Ok(PollOutcome::Cancelled);
                }
                attempt += 1;

                match self.read(&verification.read).await {
                    Ok(snapshot) if (verification.predicate)(&snapshot) => {
                        debug!(attempt, "Poll condition satisfied");
                        return Ok(PollOutcome::Satisfied);
                    }
                    Ok(_) => debug!(attempt, "Poll condition not met yet"),
                    Err(DispatchError::Transport(error))
                        if !verification.tolerate_transport_errors =>
                    {
                        warn!(attempt, error = %error, "Poll aborted by transport error");
                        return Err(PollError::Dispatch(DispatchError::Transport(error)));
                    }
                    Err(error) => debug!(attempt, error = %error, "Poll read failed, retrying"),
                }
            }
        };

        match time::timeout(verification.timeout, polling).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    timeout_ms = verification.timeout.as_millis() as u64,
                    "Poll timed out"
                );
                Ok(PollOutcome::TimedOut)
            }
        }
    }
}

fn predicate(check: impl Fn(&PollSnapshot) -> bool + Send + Sync + 'static) -> Predicate {
    Arc::new(check)
}

/// At least `expected` reads report one of `statuses`.
pub fn config_status_in(expected: usize, statuses: &[ServerConfigStatus]) -> Predicate {
    let statuses = statuses.to_vec();
    predicate(move |snapshot| {
        let matching = snapshot
            .values()
            .into_iter()
            .filter(|node| statuses.contains(&ServerConfigStatus::from_model(node)))
            .count();
        matching >= expected
    })
}

/// At least `expected` reads report `state`.
pub fn suspend_state_is(expected: usize, state: SuspendState) -> Predicate {
    predicate(move |snapshot| {
        let matching = snapshot
            .values()
            .into_iter()
            .filter(|node| SuspendState::from_model(node) == state)
            .count();
        matching >= expected
    })
}

/// Every read reports `state`.
pub fn running_state_is(state: RunningState) -> Predicate {
    predicate(move |snapshot| {
        let values = snapshot.values();
        !values.is_empty()
            && values
                .into_iter()
                .all(|node| RunningState::from_model(node) == state)
    })
}

/// Any successful read. Used to ping an endpoint that is coming back.
pub fn any_response() -> Predicate {
    predicate(|_| true)
}
