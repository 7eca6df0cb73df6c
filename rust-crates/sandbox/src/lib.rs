//! Local stand-in for the ledger gateway and the allowlist registry.

pub mod server;
pub mod state;

pub use server::SandboxServer;
pub use state::{
    SandboxConfig,
    SandboxState,
    SharedState,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
