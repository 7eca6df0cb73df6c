use crate::{
    config::EngineConfig,
    error::{
        ConfirmationError,
        LedgerError,
    },
    types::{
        CommitmentLevel,
        ConfirmationStatus,
        TxHandle,
        TxStatus,
    },
};
use std::{
    future::Future,
    time::Duration,
};
use tokio::time::{
    self,
    MissedTickBehavior,
};
use tracing::{
    debug,
    warn,
};

pub trait TransactionStatusSource {
    fn transaction_status(
        &self,
        tx: &TxHandle,
        commitment: CommitmentLevel,
    ) -> impl Future<Output = Result<TxStatus, LedgerError>> + Send;
}

/// Polls a transaction until it reaches a terminal status or the timeout
/// elapses. A timeout ends the wait only; the transaction may still land.
#[derive(Clone, Debug)]
pub struct ConfirmationWaiter {
    poll_interval: Duration,
    max_poll_errors: u32,
}

impl ConfirmationWaiter {
    pub fn new(poll_interval: Duration, max_poll_errors: u32) -> Self {
        Self {
            poll_interval,
            max_poll_errors: max_poll_errors.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.poll_interval, config.max_poll_errors)
    }

    pub async fn wait<S: TransactionStatusSource>(
        &self,
        source: &S,
        tx: &TxHandle,
        timeout: Duration,
        commitment: CommitmentLevel,
    ) -> Result<ConfirmationStatus, ConfirmationError> {
        match time::timeout(timeout, self.poll(source, tx, commitment)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%tx, ?timeout, "gave up waiting for confirmation");
                Err(ConfirmationError::Timeout(timeout))
            }
        }
    }

    async fn poll<S: TransactionStatusSource>(
        &self,
        source: &S,
        tx: &TxHandle,
        commitment: CommitmentLevel,
    ) -> Result<ConfirmationStatus, ConfirmationError> {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_errors = 0;
        loop {
            ticker.tick().await;
            match source.transaction_status(tx, commitment).await {
                Ok(TxStatus::Pending) => {
                    consecutive_errors = 0;
                    debug!(%tx, %commitment, "transaction pending");
                }
                Ok(TxStatus::Confirmed) => return Ok(ConfirmationStatus::Confirmed),
                Ok(TxStatus::ProgramError(code)) => {
                    return Ok(ConfirmationStatus::ProgramError(code));
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(%tx, error = %e, consecutive_errors, "status poll failed");
                    if consecutive_errors >= self.max_poll_errors {
                        return Err(ConfirmationError::Network(e.to_string()));
                    }
                }
            }
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProgramErrorCode;
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            Mutex,
        },
    };

    /// Replays scripted statuses, then stays pending forever.
    #[derive(Clone, Default)]
    struct ScriptedStatus {
        script: Arc<Mutex<VecDeque<Result<TxStatus, LedgerError>>>>,
        polls: Arc<Mutex<Vec<CommitmentLevel>>>,
    }

    impl ScriptedStatus {
        fn new(script: Vec<Result<TxStatus, LedgerError>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                polls: Arc::default(),
            }
        }

        fn poll_count(&self) -> usize {
            self.polls.lock().unwrap().len()
        }
    }

    impl TransactionStatusSource for ScriptedStatus {
        async fn transaction_status(
            &self,
            _tx: &TxHandle,
            commitment: CommitmentLevel,
        ) -> Result<TxStatus, LedgerError> {
            self.polls.lock().unwrap().push(commitment);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(TxStatus::Pending))
        }
    }

    fn waiter() -> ConfirmationWaiter {
        ConfirmationWaiter::new(Duration::from_millis(250), 3)
    }

    #[tokio::test(start_paused = true)]
    async fn wait__returns_first_terminal_status() {
        // given
        let source = ScriptedStatus::new(vec![
            Ok(TxStatus::Pending),
            Ok(TxStatus::Pending),
            Ok(TxStatus::Confirmed),
        ]);

        // when
        let status = waiter()
            .wait(
                &source,
                &TxHandle::new("tx"),
                Duration::from_secs(10),
                CommitmentLevel::Processed,
            )
            .await;

        // then
        assert_eq!(status, Ok(ConfirmationStatus::Confirmed));
        assert_eq!(source.poll_count(), 3);
        assert!(
            source
                .polls
                .lock()
                .unwrap()
                .iter()
                .all(|c| *c == CommitmentLevel::Processed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait__surfaces_program_error_as_terminal() {
        let source = ScriptedStatus::new(vec![Ok(TxStatus::ProgramError(
            ProgramErrorCode::SUPPLY_EXHAUSTED,
        ))]);

        let status = waiter()
            .wait(
                &source,
                &TxHandle::new("tx"),
                Duration::from_secs(10),
                CommitmentLevel::Confirmed,
            )
            .await;

        assert_eq!(
            status,
            Ok(ConfirmationStatus::ProgramError(
                ProgramErrorCode::SUPPLY_EXHAUSTED
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait__times_out_when_status_stays_pending() {
        // given
        let source = ScriptedStatus::default();
        let timeout = Duration::from_secs(2);

        // when
        let status = waiter()
            .wait(&source, &TxHandle::new("tx"), timeout, CommitmentLevel::Processed)
            .await;

        // then
        assert_eq!(status, Err(ConfirmationError::Timeout(timeout)));
        assert!(source.poll_count() >= 8);
    }

    #[tokio::test(start_paused = true)]
    async fn wait__tolerates_transient_poll_errors() {
        let source = ScriptedStatus::new(vec![
            Err(LedgerError::Network("reset".into())),
            Err(LedgerError::Network("reset".into())),
            Ok(TxStatus::Confirmed),
        ]);

        let status = waiter()
            .wait(
                &source,
                &TxHandle::new("tx"),
                Duration::from_secs(10),
                CommitmentLevel::Processed,
            )
            .await;

        assert_eq!(status, Ok(ConfirmationStatus::Confirmed));
    }

    #[tokio::test(start_paused = true)]
    async fn wait__fails_after_too_many_consecutive_poll_errors() {
        let source = ScriptedStatus::new(vec![
            Err(LedgerError::Network("reset".into())),
            Err(LedgerError::Network("reset".into())),
            Err(LedgerError::Network("gone".into())),
        ]);

        let status = waiter()
            .wait(
                &source,
                &TxHandle::new("tx"),
                Duration::from_secs(10),
                CommitmentLevel::Processed,
            )
            .await;

        assert!(matches!(status, Err(ConfirmationError::Network(m)) if m.contains("gone")));
    }
}
