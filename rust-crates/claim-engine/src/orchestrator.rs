//! The claim state machine.
//!
//! `Idle → Gating → Submitting → AwaitingConfirmation → Reconciling → Idle`.
//! Gate and submission failures jump straight to `Reconciling`. Reconciling
//! always refreshes the balance, commits the reserve on success, refreshes
//! allocation state and then publishes exactly one [`Notice`].

use crate::{
    classifier::{
        ClassifiedError,
        classify,
    },
    config::{
        EngineConfig,
        GateMode,
        MintTarget,
        RegistryConfig,
    },
    confirmation::{
        ConfirmationWaiter,
        TransactionStatusSource,
    },
    eligibility::{
        self,
        AllowlistRegistry,
        EligibilityGate,
    },
    error::{
        ClaimFailure,
        GateViolation,
        LedgerError,
    },
    gateway_client::HttpLedgerGateway,
    ledger::{
        self,
        BalanceReader,
        LedgerStateReader,
    },
    registry_client::HttpRegistry,
    submitter::{
        ClaimSubmitter,
        SignerSession,
        submit_claim,
    },
    types::{
        AccountId,
        AllocationState,
        ConfirmationStatus,
        EligibilityRecord,
        TxHandle,
    },
};
use chrono::Utc;
use std::sync::{
    Arc,
    PoisonError,
    RwLock,
    atomic::{
        AtomicBool,
        Ordering,
    },
};
use tokio::sync::watch;
use tracing::{
    debug,
    info,
    warn,
};

pub const SUCCESS_MESSAGE: &str = "Congratulations! Mint succeeded!";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClaimPhase {
    #[default]
    Idle,
    Gating,
    Submitting,
    AwaitingConfirmation,
    Reconciling,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttemptStatus {
    #[default]
    Idle,
    Submitting,
    AwaitingConfirmation,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimAttempt {
    pub status: AttemptStatus,
    pub tx: Option<TxHandle>,
    pub failure: Option<ClassifiedError>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Succeeded {
        tx: TxHandle,
        /// Set when the reserve write-back failed; the claim itself stands.
        registry_warning: Option<String>,
    },
    Failed(ClassifiedError),
}

impl ClaimOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ClaimOutcome::Succeeded { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            ClaimOutcome::Succeeded { .. } => SUCCESS_MESSAGE,
            ClaimOutcome::Failed(error) => error.message.as_str(),
        }
    }
}

/// Terminal notification of one claim attempt. `seq` increases by one per
/// completed attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub seq: u64,
    pub outcome: ClaimOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EligibilityView {
    /// No allowlist in front of this mint.
    #[default]
    Open,
    Unknown,
    NotListed,
    Listed(EligibilityRecord),
}

/// Everything a front-end renders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineSnapshot {
    pub phase: ClaimPhase,
    pub attempt: ClaimAttempt,
    pub signer: Option<AccountId>,
    pub allocation: Option<AllocationState>,
    pub eligibility: EligibilityView,
    /// Signer balance in base units.
    pub balance: Option<u64>,
    pub last_notice: Option<Notice>,
    /// Last failed background refresh, cleared by the next good one.
    pub refresh_error: Option<String>,
}

impl EngineSnapshot {
    pub fn is_busy(&self) -> bool {
        self.phase != ClaimPhase::Idle
    }
}

struct Confirmed {
    tx: TxHandle,
    reserve: Option<i64>,
}

/// Resets the in-flight flag even if the attempt future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ClaimOrchestrator<L, R> {
    ledger: L,
    gate: Option<EligibilityGate<R>>,
    target: MintTarget,
    config: EngineConfig,
    waiter: ConfirmationWaiter,
    signer: RwLock<Option<Arc<dyn SignerSession>>>,
    in_flight: AtomicBool,
    state: watch::Sender<EngineSnapshot>,
}

impl<L, R> ClaimOrchestrator<L, R>
where
    L: LedgerStateReader + BalanceReader + ClaimSubmitter + TransactionStatusSource + Sync,
    R: AllowlistRegistry + Sync,
{
    /// `gate: None` runs an open mint without allowlist checks.
    pub fn new(
        ledger: L,
        gate: Option<EligibilityGate<R>>,
        target: MintTarget,
        config: EngineConfig,
    ) -> Self {
        let initial = EngineSnapshot {
            eligibility: if gate.is_some() {
                EligibilityView::Unknown
            } else {
                EligibilityView::Open
            },
            ..EngineSnapshot::default()
        };
        let (state, _) = watch::channel(initial);
        Self {
            ledger,
            gate,
            target,
            waiter: ConfirmationWaiter::from_config(&config),
            config,
            signer: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            state,
        }
    }

    pub fn target(&self) -> &MintTarget {
        &self.target
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gate_mode(&self) -> GateMode {
        if self.gate.is_some() {
            GateMode::Allowlist
        } else {
            GateMode::Open
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.borrow().clone()
    }

    fn current_signer(&self) -> Option<Arc<dyn SignerSession>> {
        self.signer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the signer session and resynchronise everything derived from
    /// it.
    pub async fn connect_signer(&self, signer: Option<Arc<dyn SignerSession>>) {
        let identity = signer.as_ref().map(|s| s.public_identity());
        *self.signer.write().unwrap_or_else(PoisonError::into_inner) = signer;
        info!(signer = ?identity, "signer changed");
        let mode = self.gate_mode();
        self.state.send_modify(|s| {
            s.signer = identity;
            s.balance = None;
            s.eligibility = match mode {
                GateMode::Open => EligibilityView::Open,
                GateMode::Allowlist => EligibilityView::Unknown,
            };
            if s.signer.is_none() {
                s.allocation = None;
            }
        });
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "allocation refresh after signer change failed");
        }
        self.refresh_balance().await;
        self.refresh_eligibility().await;
    }

    /// Fresh read of allocation state. A no-op without a signer.
    pub async fn refresh(&self) -> Result<Option<AllocationState>, LedgerError> {
        let signer = self.current_signer();
        self.refresh_allocation(signer.as_deref()).await
    }

    async fn refresh_allocation(
        &self,
        signer: Option<&dyn SignerSession>,
    ) -> Result<Option<AllocationState>, LedgerError> {
        match ledger::refresh(&self.ledger, &self.target.program, signer).await {
            Ok(Some(allocation)) => {
                debug!(
                    remaining = allocation.items_remaining,
                    redeemed = allocation.items_redeemed,
                    "allocation refreshed"
                );
                let reader = signer.map(|signer| signer.public_identity());
                let published = self.state.send_if_modified(|s| {
                    // the signer may have changed while the read was in flight
                    if s.signer != reader {
                        return false;
                    }
                    s.allocation = Some(allocation.clone());
                    s.refresh_error = None;
                    true
                });
                if !published {
                    debug!("signer changed during refresh; allocation dropped");
                }
                Ok(Some(allocation))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                let message = e.to_string();
                self.state.send_modify(|s| s.refresh_error = Some(message));
                Err(e)
            }
        }
    }

    pub async fn refresh_balance(&self) {
        let signer = self.current_signer();
        self.refresh_balance_for(signer.as_deref()).await;
    }

    async fn refresh_balance_for(&self, signer: Option<&dyn SignerSession>) {
        let Some(signer) = signer else {
            return;
        };
        let account = signer.public_identity();
        match self.ledger.balance(&account).await {
            Ok(balance) => {
                self.state.send_if_modified(|s| {
                    if s.signer.as_ref() != Some(&account) {
                        return false;
                    }
                    s.balance = Some(balance);
                    true
                });
            }
            Err(e) => warn!(%account, error = %e, "balance refresh failed"),
        }
    }

    /// Prefetch allowlist membership for display.
    pub async fn refresh_eligibility(&self) {
        let (Some(gate), Some(signer)) = (&self.gate, self.current_signer()) else {
            return;
        };
        let account = signer.public_identity();
        match gate.lookup(&account).await {
            Ok(record) => self.publish_eligibility(record),
            Err(e) => warn!(%account, error = %e, "eligibility lookup failed"),
        }
    }

    fn publish_eligibility(&self, record: Option<EligibilityRecord>) {
        let view = match record {
            Some(record) => EligibilityView::Listed(record),
            None => EligibilityView::NotListed,
        };
        self.state.send_modify(|s| s.eligibility = view);
    }

    fn set_phase(&self, phase: ClaimPhase) {
        debug!(?phase, "claim phase");
        self.state.send_modify(|s| s.phase = phase);
    }

    /// Run one claim attempt. Returns `None` without doing anything if an
    /// attempt is already live.
    pub async fn request_claim(&self) -> Option<ClaimOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("claim already in flight; ignoring request");
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        let signer = self.current_signer();
        self.state.send_modify(|s| {
            s.phase = ClaimPhase::Gating;
            s.attempt = ClaimAttempt::default();
        });
        let result = self.execute(signer.as_deref()).await;
        self.set_phase(ClaimPhase::Reconciling);
        Some(self.reconcile(signer.as_deref(), result).await)
    }

    async fn execute(
        &self,
        signer: Option<&dyn SignerSession>,
    ) -> Result<Confirmed, ClaimFailure> {
        let signer = signer.ok_or(GateViolation::NoSigner)?;
        let allocation = match self.snapshot().allocation {
            Some(allocation) => allocation,
            None => self
                .refresh_allocation(Some(signer))
                .await?
                .ok_or_else(|| {
                    LedgerError::InvalidResponse("no allocation state".to_string())
                })?,
        };
        if allocation.is_sold_out() {
            return Err(GateViolation::SoldOut.into());
        }
        if !allocation.is_live_at(Utc::now()) {
            return Err(GateViolation::NotStarted.into());
        }
        let reserve = match &self.gate {
            Some(gate) => {
                let record = gate.lookup(&signer.public_identity()).await?;
                self.publish_eligibility(record.clone());
                Some(eligibility::check(record.as_ref())?)
            }
            None => None,
        };

        self.state.send_modify(|s| {
            s.phase = ClaimPhase::Submitting;
            s.attempt.status = AttemptStatus::Submitting;
        });
        let tx = submit_claim(&self.ledger, &allocation, &self.target, signer).await?;

        self.state.send_modify(|s| {
            s.phase = ClaimPhase::AwaitingConfirmation;
            s.attempt.status = AttemptStatus::AwaitingConfirmation;
            s.attempt.tx = Some(tx.clone());
        });
        let status = self
            .waiter
            .wait(&self.ledger, &tx, self.config.tx_timeout, self.config.commitment)
            .await?;
        match status {
            ConfirmationStatus::Confirmed => Ok(Confirmed { tx, reserve }),
            ConfirmationStatus::ProgramError(code) => Err(ClaimFailure::Program(code)),
        }
    }

    async fn reconcile(
        &self,
        signer: Option<&dyn SignerSession>,
        result: Result<Confirmed, ClaimFailure>,
    ) -> ClaimOutcome {
        self.refresh_balance_for(signer).await;

        let outcome = match result {
            Ok(Confirmed { tx, reserve }) => {
                let registry_warning = self.commit_reserve(signer, reserve).await;
                info!(%tx, "claim confirmed");
                ClaimOutcome::Succeeded {
                    tx,
                    registry_warning,
                }
            }
            Err(failure) => {
                let classified = classify(&failure);
                warn!(error = %failure, kind = ?classified.kind, "claim failed");
                ClaimOutcome::Failed(classified)
            }
        };

        if let Err(e) = self.refresh_allocation(signer).await {
            warn!(error = %e, "allocation refresh after claim failed");
        }

        self.state.send_modify(|s| {
            match &outcome {
                ClaimOutcome::Succeeded { .. } => {
                    s.attempt.status = AttemptStatus::Succeeded;
                    s.attempt.failure = None;
                }
                ClaimOutcome::Failed(error) => {
                    s.attempt.status = AttemptStatus::Failed;
                    s.attempt.failure = Some(error.clone());
                }
            }
            let seq = s.last_notice.as_ref().map_or(1, |n| n.seq + 1);
            s.last_notice = Some(Notice {
                seq,
                outcome: outcome.clone(),
            });
            s.phase = ClaimPhase::Idle;
        });
        outcome
    }

    async fn commit_reserve(
        &self,
        signer: Option<&dyn SignerSession>,
        reserve: Option<i64>,
    ) -> Option<String> {
        let (Some(gate), Some(signer), Some(reserve)) = (&self.gate, signer, reserve)
        else {
            return None;
        };
        let account = signer.public_identity();
        let new_reserve = reserve - 1;
        match gate.commit(&account, new_reserve).await {
            Ok(()) => {
                info!(%account, reserve = new_reserve, "reserve updated");
                self.publish_eligibility(Some(EligibilityRecord {
                    account,
                    reserve_count: new_reserve,
                }));
                None
            }
            Err(e) => {
                warn!(%account, error = %e, "reserve update failed; claim stands");
                Some(format!("Updating reserves failed: {e}"))
            }
        }
    }
}

pub type HttpClaimOrchestrator = ClaimOrchestrator<HttpLedgerGateway, HttpRegistry>;

impl HttpClaimOrchestrator {
    /// Orchestrator over the HTTP ledger gateway. `registry: None` runs an
    /// open mint.
    pub fn over_http(
        gateway_url: &str,
        registry: Option<&RegistryConfig>,
        target: MintTarget,
        config: EngineConfig,
    ) -> Result<Self, ClaimFailure> {
        let ledger = HttpLedgerGateway::new(gateway_url)?;
        let gate = registry
            .map(|registry| {
                HttpRegistry::new(registry.base_url.clone())
                    .map(|client| EligibilityGate::new(client, registry.secret.clone()))
            })
            .transpose()?;
        Ok(Self::new(ledger, gate, target, config))
    }
}
