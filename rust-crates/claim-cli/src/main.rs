use chrono::{
    DateTime,
    Utc,
};
use clap::{
    ArgGroup,
    Args,
    Parser,
    Subcommand,
};
use claim_engine::{
    AccountId,
    AllocationState,
    BalanceReader,
    ClaimOutcome,
    CommitmentLevel,
    EligibilityGate,
    GateMode,
    HttpClaimOrchestrator,
    HttpLedgerGateway,
    HttpRegistry,
    LedgerStateReader,
    SignerSession,
    eligibility,
    ledger::display_balance,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DEPLOYMENTS_ROOT,
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
};
use std::{
    process::ExitCode,
    sync::Arc,
    time::Duration,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wallets::KeystoreSigner;

const PASSWORD_VAR: &str = "CLAIM_WALLET_PASSWORD";

#[derive(Parser, Debug)]
#[command(
    name = "claim",
    about = "Inspect a mint and claim one item from it",
    version,
    group(
        ArgGroup::new("network")
            .args(["devnet", "testnet", "local"])
            .required(true)
    )
)]
struct Cli {
    /// Use the devnet deployment
    #[arg(long)]
    devnet: bool,

    /// Use the testnet deployment
    #[arg(long)]
    testnet: bool,

    /// Use the local sandbox deployment
    #[arg(long)]
    local: bool,

    /// Override the gateway URL of the deployment
    #[arg(long)]
    gateway_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct WalletArgs {
    /// Keystore wallet name
    #[arg(long)]
    wallet: String,

    /// Override the wallet directory (defaults to ~/.claim/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the allocation counters and go-live time
    State,
    /// Print the balance of a wallet
    Balance {
        #[command(flatten)]
        wallet: WalletArgs,
    },
    /// Look an account up in the allowlist registry
    Eligibility {
        /// Account to look up; defaults to the wallet's account
        #[arg(long, conflicts_with = "wallet")]
        account: Option<String>,

        #[arg(long)]
        wallet: Option<String>,

        #[arg(long)]
        wallet_dir: Option<String>,
    },
    /// Claim one item
    Claim {
        #[command(flatten)]
        wallet: WalletArgs,

        /// Gate the claim on the allowlist registry
        #[arg(long)]
        allowlist: bool,

        /// Commitment a transaction must reach before it counts
        #[arg(long, value_parser = parse_commitment)]
        commitment: Option<CommitmentLevel>,

        /// Give up waiting for confirmation after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Write the deployment record for the selected network
    InitDeployment {
        #[arg(long)]
        program: String,

        #[arg(long)]
        config: String,

        #[arg(long)]
        treasury: String,

        /// RFC 3339 go-live time, for display only
        #[arg(long)]
        start_date: Option<DateTime<Utc>>,

        #[arg(long)]
        tx_timeout_ms: Option<u64>,

        #[arg(long)]
        registry_url: Option<String>,
    },
}

fn parse_commitment(raw: &str) -> Result<CommitmentLevel, String> {
    raw.parse()
}

impl Cli {
    fn env(&self) -> DeploymentEnv {
        if self.devnet {
            DeploymentEnv::Dev
        } else if self.testnet {
            DeploymentEnv::Test
        } else {
            DeploymentEnv::Local
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();
    let cli = Cli::parse();
    deployments::ensure_structure(DEPLOYMENTS_ROOT)
        .map_err(|e| eyre!(e))
        .wrap_err("initializing deployment directories")?;

    let env = cli.env();
    let store = DeploymentStore::new(env)
        .map_err(|e| eyre!(e))
        .wrap_err("opening deployment store")?;

    let load = || -> Result<(DeploymentRecord, String)> {
        let record = store
            .require()
            .map_err(|e| eyre!(e))
            .wrap_err_with(|| format!("loading {env} deployment"))?;
        let gateway_url = cli
            .gateway_url
            .clone()
            .unwrap_or_else(|| record.gateway_url.clone());
        info!(%env, %gateway_url, program = %record.program_id, "using deployment");
        Ok((record, gateway_url))
    };

    match &cli.command {
        Command::InitDeployment {
            program,
            config,
            treasury,
            start_date,
            tx_timeout_ms,
            registry_url,
        } => {
            let gateway_url = cli
                .gateway_url
                .clone()
                .unwrap_or_else(|| env.default_gateway_url().to_string());
            let record = DeploymentRecord {
                start_date: *start_date,
                tx_timeout_ms: *tx_timeout_ms,
                registry_url: registry_url.clone(),
                ..DeploymentRecord::new(program, config, treasury, gateway_url)
            };
            store
                .save(&record)
                .map_err(|e| eyre!(e))
                .wrap_err("recording deployment")?;
            println!("Deployment metadata written to {}", store.path().display());
        }
        Command::State => {
            let (record, gateway_url) = load()?;
            let gateway = HttpLedgerGateway::new(&gateway_url)?;
            let state = gateway
                .read_state(&record.mint_target().program)
                .await?;
            print!("{}", describe_state(&state, Utc::now()));
        }
        Command::Balance { wallet } => {
            let (_, gateway_url) = load()?;
            let signer = unlock(&wallet.wallet, wallet.wallet_dir.as_deref())?;
            let gateway = HttpLedgerGateway::new(&gateway_url)?;
            let account = signer.public_identity();
            let balance = gateway.balance(&account).await?;
            println!("Wallet '{}' ({account})", wallet.wallet);
            println!("  Balance: {:.4}", display_balance(balance));
        }
        Command::Eligibility {
            account,
            wallet,
            wallet_dir,
        } => {
            let (record, _) = load()?;
            let account = match (account, wallet) {
                (Some(account), _) => AccountId::new(account),
                (None, Some(name)) => unlock(name, wallet_dir.as_deref())?.public_identity(),
                (None, None) => return Err(eyre!("Pass --account or --wallet")),
            };
            let registry = record
                .registry_config(GateMode::Allowlist, |name| std::env::var(name).ok())?
                .ok_or_else(|| eyre!("No registry configured"))?;
            let gate = EligibilityGate::new(
                HttpRegistry::new(registry.base_url)?,
                registry.secret,
            );
            let entry = gate.lookup(&account).await?;
            match eligibility::check(entry.as_ref()) {
                Ok(reserve) => println!("{account} is whitelisted with {reserve} reserved"),
                Err(violation) => {
                    println!("{account}: {violation}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Claim {
            wallet,
            allowlist,
            commitment,
            timeout_ms,
        } => {
            let (record, gateway_url) = load()?;
            let signer = unlock(&wallet.wallet, wallet.wallet_dir.as_deref())?;
            let registry = record.registry_config(
                GateMode::from_allowlist_flag(*allowlist),
                |name| std::env::var(name).ok(),
            )?;
            let mut config = record.engine_config();
            if let Some(commitment) = commitment {
                config.commitment = *commitment;
            }
            if let Some(ms) = timeout_ms {
                config.tx_timeout = Duration::from_millis(*ms);
            }
            let orchestrator = HttpClaimOrchestrator::over_http(
                &gateway_url,
                registry.as_ref(),
                record.mint_target(),
                config,
            )?;
            orchestrator.connect_signer(Some(Arc::new(signer))).await;
            let Some(outcome) = orchestrator.request_claim().await else {
                return Err(eyre!("A claim is already in progress"));
            };
            println!("{}", outcome.message());
            match &outcome {
                ClaimOutcome::Succeeded {
                    tx,
                    registry_warning,
                } => {
                    println!("  Transaction: {tx}");
                    if let Some(warning) = registry_warning {
                        eprintln!("{warning}");
                    }
                }
                ClaimOutcome::Failed(_) => return Ok(ExitCode::FAILURE),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn unlock(name: &str, dir: Option<&str>) -> Result<KeystoreSigner> {
    let dir = wallets::resolve_wallet_dir(dir).wrap_err("resolving wallet directory")?;
    let descriptor = wallets::find_wallet(&dir, name).wrap_err("locating requested wallet")?;
    match std::env::var(PASSWORD_VAR) {
        Ok(password) => wallets::unlock_with_password(&descriptor, &password),
        Err(_) => wallets::unlock_wallet(&descriptor),
    }
}

fn describe_state(state: &AllocationState, now: DateTime<Utc>) -> String {
    let status = if state.is_sold_out() {
        "SOLD OUT!".to_string()
    } else if state.is_live_at(now) {
        "Live".to_string()
    } else {
        let secs = (state.go_live_at - now).num_seconds();
        format!(
            "Starts in {} hours, {} minutes, {} seconds",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    };
    format!(
        "Program {}\n  Available: {}\n  Redeemed:  {}\n  Remaining: {}\n  Go-live:   {}\n  Status:    {status}\n",
        state.program,
        state.items_available,
        state.items_redeemed,
        state.items_remaining,
        state.go_live_at.to_rfc3339(),
    )
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use claim_engine::ProgramId;
    use clap::CommandFactory;

    fn state(remaining: u64, go_live_at: DateTime<Utc>) -> AllocationState {
        AllocationState {
            program: ProgramId::new("mint"),
            items_available: 10,
            items_redeemed: 10 - remaining,
            items_remaining: remaining,
            go_live_at,
        }
    }

    #[test]
    fn cli__definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli__requires_exactly_one_network() {
        assert!(Cli::try_parse_from(["claim", "state"]).is_err());
        assert!(Cli::try_parse_from(["claim", "--local", "--devnet", "state"]).is_err());
        let cli = Cli::try_parse_from(["claim", "--testnet", "state"]).unwrap();
        assert_eq!(cli.env(), DeploymentEnv::Test);
    }

    #[test]
    fn cli__claim_parses_commitment() {
        let cli = Cli::try_parse_from([
            "claim",
            "--local",
            "claim",
            "--wallet",
            "alice",
            "--commitment",
            "finalized",
        ])
        .unwrap();

        let Command::Claim { commitment, .. } = cli.command else {
            panic!("expected claim command");
        };
        assert_eq!(commitment, Some(CommitmentLevel::Finalized));
    }

    #[test]
    fn cli__claim_allowlist_flag_selects_gate() {
        let gated = Cli::try_parse_from([
            "claim", "--local", "claim", "--wallet", "alice", "--allowlist",
        ])
        .unwrap();
        let open = Cli::try_parse_from(["claim", "--local", "claim", "--wallet", "alice"]).unwrap();

        let gate = |cli: Cli| match cli.command {
            Command::Claim { allowlist, .. } => GateMode::from_allowlist_flag(allowlist),
            _ => panic!("expected claim command"),
        };
        assert_eq!(gate(gated), GateMode::Allowlist);
        assert_eq!(gate(open), GateMode::Open);
    }

    #[test]
    fn describe_state__reports_sold_out_live_and_countdown() {
        let now = Utc::now();

        let sold_out = describe_state(&state(0, now - TimeDelta::hours(1)), now);
        let live = describe_state(&state(4, now - TimeDelta::hours(1)), now);
        let pending = describe_state(&state(4, now + TimeDelta::seconds(3_725)), now);

        assert!(sold_out.contains("Status:    SOLD OUT!"));
        assert!(live.contains("Status:    Live"));
        assert!(live.contains("Remaining: 4"));
        assert!(pending.contains("Starts in 1 hours, 2 minutes, 5 seconds"));
    }
}
