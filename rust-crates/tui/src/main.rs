use color_eyre::eyre::{
    Result,
    eyre,
};
use claim_engine::GateMode;
use deployments::{
    DEPLOYMENTS_ROOT,
    DeploymentEnv,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod client;
mod ui;

const DEFAULT_LOG_DIR: &str = "logs";

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: claim-tui [--dev | --test | --local] [--gateway-url <url>]\n\
         [--wallet <name>] [--wallet-dir <path>] [--allowlist] [--log-dir <path>]\n\
         \n\
         Flags:\n\
           --dev               Use the devnet deployment\n\
           --test              Use the testnet deployment\n\
           --local             Use the local sandbox deployment\n\
           --gateway-url <url> Override the gateway URL of the deployment\n\
           --wallet <name>     Keystore wallet to claim with\n\
           --wallet-dir <path> Override the wallet directory (defaults to ~/.claim/wallets)\n\
           --allowlist         Gate claims on the allowlist registry\n\
                               (reads CLAIM_REGISTRY_SECRET, and CLAIM_REGISTRY_URL\n\
                               unless the deployment records a registry)\n\
           --log-dir <path>    Where to write logs (defaults to ./{DEFAULT_LOG_DIR})"
    );
    std::process::exit(0);
}

struct CliArgs {
    app: client::AppConfig,
    log_dir: PathBuf,
}

fn parse_cli_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut env: Option<DeploymentEnv> = None;
    let mut gateway_url: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut gate = GateMode::Open;
    let mut log_dir = PathBuf::from(DEFAULT_LOG_DIR);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dev" | "--test" | "--local" => {
                if env.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --dev/--test/--local"
                    ));
                }
                env = Some(arg.trim_start_matches("--").parse().map_err(|e| eyre!("{e}"))?);
            }
            "--gateway-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--gateway-url requires a URL argument"))?;
                if gateway_url.is_some() {
                    return Err(eyre!("--gateway-url may only be specified once"));
                }
                gateway_url = Some(url);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--allowlist" => gate = GateMode::Allowlist,
            "--log-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                log_dir = PathBuf::from(dir);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let env = env.ok_or_else(|| eyre!("Select a network with --dev, --test, or --local"))?;
    let wallet =
        wallet_name.ok_or_else(|| eyre!("Specify --wallet <name> to select a wallet"))?;
    let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;

    Ok(CliArgs {
        app: client::AppConfig {
            env,
            gateway_url,
            wallets: client::WalletConfig::Keystore { owner: wallet, dir },
            gate,
        },
        log_dir,
    })
}

/// The terminal belongs to the UI, so logs go to a daily rolling file.
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(log_dir, "claim-tui.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = parse_cli_args()?;
    let _log_guard = init_tracing(&args.log_dir);
    tracing::info!("starting claim client");
    deployments::ensure_structure(DEPLOYMENTS_ROOT).map_err(|e| eyre!(e))?;
    client::run_app(args.app).await
}
