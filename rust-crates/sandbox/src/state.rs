//! In-memory mint program, balances and allowlist behind the sandbox.

use anyhow::{
    Context,
    anyhow,
};
use chrono::{
    DateTime,
    Utc,
};
use claim_engine::{
    AccountId,
    AllocationState,
    CommitmentLevel,
    ProgramErrorCode,
    ProgramId,
    SignedClaim,
    TxHandle,
    TxStatus,
};
use ed25519_dalek::{
    Signature,
    Verifier,
    VerifyingKey,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tracing::{
    debug,
    info,
};

#[derive(Clone, Debug)]
pub struct SandboxConfig {
    pub program: ProgramId,
    pub config: AccountId,
    pub treasury: AccountId,
    pub items_available: u64,
    pub go_live_at: DateTime<Utc>,
    /// Base units charged per claim.
    pub price: u64,
    /// Status polls before a transaction is visible at `processed`. Each
    /// stronger commitment needs one more.
    pub confirmation_delay: u32,
    /// Keep every transaction pending forever.
    pub never_confirm: bool,
    /// Report program errors when the claim is submitted instead of when
    /// it is polled.
    pub preflight: bool,
    pub registry_secret: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: ProgramId::new("mint"),
            config: AccountId::new("config"),
            treasury: AccountId::new("treasury"),
            items_available: 100,
            go_live_at: DateTime::UNIX_EPOCH,
            price: 1_000_000_000,
            confirmation_delay: 1,
            never_confirm: false,
            preflight: false,
            registry_secret: "sandbox-secret".to_string(),
        }
    }
}

/// Why the sandbox refused a claim outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    UnknownProgram,
    BadRequest(String),
    Program(ProgramErrorCode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Ok,
    Failed(ProgramErrorCode),
}

#[derive(Clone, Debug)]
struct TxRecord {
    outcome: Outcome,
    polls: u32,
}

#[derive(Debug)]
pub struct SandboxState {
    config: SandboxConfig,
    items_redeemed: u64,
    balances: HashMap<AccountId, u64>,
    members: HashMap<AccountId, i64>,
    transactions: HashMap<TxHandle, TxRecord>,
    by_idempotency_key: HashMap<String, TxHandle>,
    next_tx: u64,
}

impl SandboxState {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            items_redeemed: 0,
            balances: HashMap::new(),
            members: HashMap::new(),
            transactions: HashMap::new(),
            by_idempotency_key: HashMap::new(),
            next_tx: 0,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn allocation(&self) -> AllocationState {
        AllocationState {
            program: self.config.program.clone(),
            items_available: self.config.items_available,
            items_redeemed: self.items_redeemed,
            items_remaining: self
                .config
                .items_available
                .saturating_sub(self.items_redeemed),
            go_live_at: self.config.go_live_at,
        }
    }

    pub fn fund(&mut self, account: AccountId, amount: u64) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, account: &AccountId) -> Option<u64> {
        self.balances.get(account).copied()
    }

    pub fn set_member(&mut self, account: AccountId, reserve: i64) {
        self.members.insert(account, reserve);
    }

    pub fn member(&self, account: &AccountId) -> Option<i64> {
        self.members.get(account).copied()
    }

    pub fn set_never_confirm(&mut self, never_confirm: bool) {
        self.config.never_confirm = never_confirm;
    }

    pub fn set_go_live_at(&mut self, go_live_at: DateTime<Utc>) {
        self.config.go_live_at = go_live_at;
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Absolute reserve write. Fails for a wrong secret or an unknown
    /// member.
    pub fn update_reserve(
        &mut self,
        account: &AccountId,
        secret: &str,
        reserve: i64,
    ) -> Result<(), ReserveUpdateError> {
        if secret != self.config.registry_secret {
            return Err(ReserveUpdateError::Forbidden);
        }
        let entry = self
            .members
            .get_mut(account)
            .ok_or(ReserveUpdateError::UnknownMember)?;
        *entry = reserve;
        info!(%account, reserve, "reserve updated");
        Ok(())
    }

    /// Verify and execute one claim. Program failures are recorded on the
    /// transaction unless preflight is enabled.
    pub fn submit(
        &mut self,
        claim: &SignedClaim,
        now: DateTime<Utc>,
    ) -> Result<TxHandle, Rejection> {
        let tx = &claim.transaction;
        if tx.program != self.config.program {
            return Err(Rejection::UnknownProgram);
        }
        if tx.config != self.config.config || tx.treasury != self.config.treasury {
            return Err(Rejection::BadRequest(
                "claim names the wrong config or treasury account".to_string(),
            ));
        }
        if claim.idempotency_key != tx.idempotency_key() {
            return Err(Rejection::BadRequest(
                "idempotency key does not match claim".to_string(),
            ));
        }
        verify_signature(claim).map_err(|e| Rejection::BadRequest(format!("{e:#}")))?;

        if let Some(existing) = self.by_idempotency_key.get(&claim.idempotency_key) {
            debug!(tx = %existing, "duplicate claim broadcast");
            return Ok(existing.clone());
        }

        let outcome = self.execute(&tx.payer, now);
        if let (true, Outcome::Failed(code)) = (self.config.preflight, outcome) {
            return Err(Rejection::Program(code));
        }

        self.next_tx += 1;
        let handle = TxHandle::new(format!("sandbox-tx-{}", self.next_tx));
        self.transactions.insert(handle.clone(), TxRecord { outcome, polls: 0 });
        self.by_idempotency_key
            .insert(claim.idempotency_key.clone(), handle.clone());
        info!(tx = %handle, payer = %tx.payer, ?outcome, "claim executed");
        Ok(handle)
    }

    fn execute(&mut self, payer: &AccountId, now: DateTime<Utc>) -> Outcome {
        if now < self.config.go_live_at {
            return Outcome::Failed(ProgramErrorCode::NOT_LIVE_YET);
        }
        if self.items_redeemed >= self.config.items_available {
            return Outcome::Failed(ProgramErrorCode::SUPPLY_EXHAUSTED);
        }
        let price = self.config.price;
        match self.balances.get_mut(payer) {
            Some(balance) if *balance >= price => *balance -= price,
            _ => return Outcome::Failed(ProgramErrorCode::NOT_ENOUGH_FUNDS),
        }
        self.fund(self.config.treasury.clone(), price);
        self.items_redeemed += 1;
        Outcome::Ok
    }

    /// `None` for a transaction the sandbox never saw.
    pub fn poll(&mut self, tx: &TxHandle, commitment: CommitmentLevel) -> Option<TxStatus> {
        let never_confirm = self.config.never_confirm;
        let delay = self.config.confirmation_delay;
        let record = self.transactions.get_mut(tx)?;
        record.polls = record.polls.saturating_add(1);
        if never_confirm || record.polls <= delay + depth(commitment) {
            return Some(TxStatus::Pending);
        }
        Some(match record.outcome {
            Outcome::Ok => TxStatus::Confirmed,
            Outcome::Failed(code) => TxStatus::ProgramError(code),
        })
    }
}

fn depth(commitment: CommitmentLevel) -> u32 {
    match commitment {
        CommitmentLevel::Processed => 0,
        CommitmentLevel::Confirmed => 1,
        CommitmentLevel::Finalized => 2,
    }
}

fn verify_signature(claim: &SignedClaim) -> anyhow::Result<()> {
    let payer = hex::decode(claim.transaction.payer.as_str())
        .context("payer is not a hex public key")?;
    let payer: [u8; 32] = payer
        .try_into()
        .map_err(|_| anyhow!("payer public key must be 32 bytes"))?;
    let key = VerifyingKey::from_bytes(&payer).context("payer is not a valid public key")?;
    let signature = hex::decode(&claim.signature).context("signature is not hex")?;
    let signature = Signature::from_slice(&signature).context("malformed signature")?;
    key.verify(&claim.transaction.message(), &signature)
        .context("signature verification failed")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReserveUpdateError {
    Forbidden,
    UnknownMember,
}

/// State shared between the HTTP workers and whoever drives the sandbox.
#[derive(Clone, Debug)]
pub struct SharedState(Arc<Mutex<SandboxState>>);

impl SharedState {
    pub fn new(config: SandboxConfig) -> Self {
        Self(Arc::new(Mutex::new(SandboxState::new(config))))
    }

    pub fn lock(&self) -> MutexGuard<'_, SandboxState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
