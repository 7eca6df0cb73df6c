use crate::ui;
use chrono::Utc;
use claim_engine::{
    ClaimOutcome,
    GateMode,
    HttpClaimOrchestrator,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::time;
use tracing::{
    info,
    warn,
};

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { owner: String, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env: DeploymentEnv,
    pub gateway_url: Option<String>,
    pub wallets: WalletConfig,
    pub gate: GateMode,
}

/// Everything the claim screen shows that does not come from the engine.
#[derive(Clone, Debug, Default)]
pub struct AppView {
    pub network: String,
    pub wallet: String,
    pub status: String,
    pub errors: Vec<String>,
}

fn build_orchestrator(config: &AppConfig) -> Result<(HttpClaimOrchestrator, String)> {
    let store = DeploymentStore::new(config.env)
        .map_err(|e| eyre!(e))
        .wrap_err("opening deployments store")?;
    let record = store
        .require()
        .map_err(|e| eyre!(e))
        .wrap_err_with(|| format!("loading {} deployment", config.env))?;
    let gateway_url = config
        .gateway_url
        .clone()
        .unwrap_or_else(|| record.gateway_url.clone());
    let registry = record
        .registry_config(config.gate, |name| std::env::var(name).ok())
        .wrap_err("allowlist mode needs registry settings")?;
    info!(
        env = %config.env,
        %gateway_url,
        program = %record.program_id,
        gate = ?config.gate,
        "using deployment"
    );
    let orchestrator = HttpClaimOrchestrator::over_http(
        &gateway_url,
        registry.as_ref(),
        record.mint_target(),
        record.engine_config(),
    )
    .wrap_err("connecting to the ledger gateway")?;
    Ok((orchestrator, gateway_url))
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (orchestrator, gateway_url) = build_orchestrator(&config)?;
    let orchestrator = Arc::new(orchestrator);

    let WalletConfig::Keystore { owner, dir } = &config.wallets;
    let descriptor = wallets::find_wallet(dir, owner)?;
    // prompt before the terminal goes raw
    let signer = wallets::unlock_wallet(&descriptor)?;
    orchestrator.connect_signer(Some(Arc::new(signer))).await;

    let view = AppView {
        network: format!("{} ({gateway_url})", config.env),
        wallet: owner.clone(),
        status: String::new(),
        errors: Vec::new(),
    };
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(orchestrator, view, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

fn outcome_status(outcome: &ClaimOutcome) -> String {
    match outcome {
        ClaimOutcome::Succeeded {
            tx,
            registry_warning: None,
        } => format!("{} ({tx})", outcome.message()),
        ClaimOutcome::Succeeded {
            tx,
            registry_warning: Some(warning),
        } => format!("{} ({tx})\n{warning}", outcome.message()),
        ClaimOutcome::Failed(_) => outcome.message().to_string(),
    }
}

async fn run_loop(
    orchestrator: Arc<HttpClaimOrchestrator>,
    mut view: AppView,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    let mut updates = orchestrator.subscribe();
    let mut countdown = time::interval(COUNTDOWN_TICK);
    let mut last_notice_seq = 0;

    let mut snapshot = updates.borrow_and_update().clone();
    ui::draw(ui_state, &view, &snapshot, Utc::now()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("engine state channel closed");
                    break;
                }
                snapshot = updates.borrow_and_update().clone();
                if let Some(notice) = snapshot.last_notice.as_ref()
                    && notice.seq > last_notice_seq
                {
                    last_notice_seq = notice.seq;
                    view.status = outcome_status(&notice.outcome);
                }
                ui::draw(ui_state, &view, &snapshot, Utc::now())
                    .wrap_err("draw after engine update failed")?;
            }
            _ = countdown.tick() => {
                ui::draw(ui_state, &view, &snapshot, Utc::now())
                    .wrap_err("draw on countdown tick failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Claim => {
                        if snapshot.is_busy() {
                            view.status = "A claim is already in progress".to_string();
                        } else {
                            view.status = "Minting...".to_string();
                            view.errors.clear();
                            spawn_claim(orchestrator.clone());
                        }
                    }
                    ui::UserEvent::Refresh => {
                        view.status = "Refreshing...".to_string();
                        ui::draw(ui_state, &view, &snapshot, Utc::now())
                            .wrap_err("draw while refreshing failed")?;
                        match orchestrator.refresh().await {
                            Ok(_) => view.status = "Refreshed".to_string(),
                            Err(e) => {
                                warn!(error = %e, "manual refresh failed");
                                view.errors.push(format!("Refresh failed: {e}"));
                            }
                        }
                        orchestrator.refresh_balance().await;
                        orchestrator.refresh_eligibility().await;
                        snapshot = orchestrator.snapshot();
                    }
                }
                ui::draw(ui_state, &view, &snapshot, Utc::now())
                    .wrap_err("draw after input failed")?;
            }
        }
    }
    Ok(())
}

fn spawn_claim(orchestrator: Arc<HttpClaimOrchestrator>) {
    tokio::spawn(async move {
        // `None` means another attempt won the race; its notice covers it
        match orchestrator.request_claim().await {
            Some(outcome) => info!(success = outcome.is_success(), "claim finished"),
            None => info!("claim request ignored, attempt in flight"),
        }
    });
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use claim_engine::{
        ClassifiedError,
        ErrorKind,
        TxHandle,
    };

    #[test]
    fn outcome_status__shows_registry_warning_under_success() {
        let outcome = ClaimOutcome::Succeeded {
            tx: TxHandle::new("tx-1"),
            registry_warning: Some("Updating reserves failed".to_string()),
        };

        let status = outcome_status(&outcome);

        assert_eq!(
            status,
            "Congratulations! Mint succeeded! (tx-1)\nUpdating reserves failed"
        );
        assert_eq!(
            outcome_status(&ClaimOutcome::Failed(ClassifiedError::new(
                ErrorKind::SoldOut
            ))),
            "SOLD OUT!"
        );
    }
}
