use anyhow::{
    Context,
    anyhow,
};
use chrono::{
    TimeDelta,
    Utc,
};
use clap::Parser;
use claim_engine::{
    AccountId,
    ProgramId,
    config::REGISTRY_SECRET_VAR,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
};
use sandbox::{
    SandboxConfig,
    SandboxServer,
    SharedState,
    init_tracing,
};

#[derive(Parser, Debug)]
#[command(
    name = "claim-sandbox",
    about = "Local ledger gateway and allowlist registry for the claim engine",
    version
)]
struct Args {
    #[arg(short, long, default_value_t = 8899)]
    port: u16,

    #[arg(long, default_value = "mint")]
    program: String,

    #[arg(long, default_value_t = 100)]
    items: u64,

    /// Seconds from now until the mint goes live; negative means already live
    #[arg(long, default_value_t = -60, allow_hyphen_values = true)]
    go_live_in: i64,

    /// Base units charged per claim
    #[arg(long, default_value_t = 1_000_000_000)]
    price: u64,

    /// Status polls before a transaction shows up at `processed`
    #[arg(long, default_value_t = 1)]
    confirmation_delay: u32,

    /// Keep every transaction pending forever
    #[arg(long)]
    never_confirm: bool,

    /// Report program errors at submission time
    #[arg(long)]
    preflight: bool,

    #[arg(long, env = REGISTRY_SECRET_VAR, default_value = "sandbox-secret")]
    registry_secret: String,

    /// ACCOUNT=AMOUNT, may repeat
    #[arg(long = "fund", value_parser = parse_pair::<u64>)]
    funds: Vec<(String, u64)>,

    /// ACCOUNT=RESERVE, may repeat
    #[arg(long = "member", value_parser = parse_pair::<i64>)]
    members: Vec<(String, i64)>,

    /// Write this sandbox into the local deployment record
    #[arg(long)]
    record_deployment: bool,
}

fn parse_pair<T>(raw: &str) -> anyhow::Result<(String, T)>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let (account, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected ACCOUNT=VALUE, got `{raw}`"))?;
    let value = value
        .parse::<T>()
        .map_err(|e| anyhow!("invalid value in `{raw}`: {e}"))?;
    Ok((account.to_string(), value))
}

async fn handle_interupt() {
    match tokio::signal::ctrl_c().await {
        Ok(_) => tracing::info!("Received interrupt, exiting"),
        Err(_) => tracing::warn!("Received interrupt error, exiting anyway"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = SandboxConfig {
        program: ProgramId::new(&args.program),
        items_available: args.items,
        go_live_at: Utc::now() + TimeDelta::seconds(args.go_live_in),
        price: args.price,
        confirmation_delay: args.confirmation_delay,
        never_confirm: args.never_confirm,
        preflight: args.preflight,
        registry_secret: args.registry_secret.clone(),
        ..SandboxConfig::default()
    };
    let state = SharedState::new(config.clone());
    {
        let mut guard = state.lock();
        for (account, amount) in &args.funds {
            guard.fund(AccountId::new(account), *amount);
        }
        for (account, reserve) in &args.members {
            guard.set_member(AccountId::new(account), *reserve);
        }
    }

    let server = SandboxServer::start(state, Some(args.port))?;

    if args.record_deployment {
        let store = DeploymentStore::new(DeploymentEnv::Local)
            .context("opening local deployment store")?;
        let record = DeploymentRecord {
            start_date: Some(config.go_live_at),
            registry_url: Some(server.base_url().to_string()),
            ..DeploymentRecord::new(
                config.program.as_str(),
                config.config.as_str(),
                config.treasury.as_str(),
                server.base_url(),
            )
        };
        store.save(&record).context("saving local deployment record")?;
        tracing::info!(path = %store.path().display(), "recorded local deployment");
    }

    tracing::info!(
        program = %config.program,
        items = config.items_available,
        go_live_at = %config.go_live_at,
        "sandbox ready"
    );
    handle_interupt().await;
    drop(server);
    Ok(())
}
