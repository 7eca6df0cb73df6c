use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::{
    DateTime,
    Utc,
};
use claim_engine::{
    AccountId,
    EngineConfig,
    GateMode,
    MintTarget,
    ProgramId,
    RegistryConfig,
    config::{
        ConfigError,
        REGISTRY_URL_VAR,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
    time::Duration,
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Dev,
    Test,
    Local,
}

impl DeploymentEnv {
    pub const ALL: [DeploymentEnv; 3] =
        [DeploymentEnv::Dev, DeploymentEnv::Test, DeploymentEnv::Local];

    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Dev => "dev",
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }

    /// Gateway used when the record does not name one.
    pub fn default_gateway_url(self) -> &'static str {
        match self {
            DeploymentEnv::Dev => "https://gateway.devnet.example.org",
            DeploymentEnv::Test => "https://gateway.testnet.example.org",
            DeploymentEnv::Local => "http://127.0.0.1:8899",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Dev => "Devnet",
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DeploymentEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "devnet" => Ok(DeploymentEnv::Dev),
            "test" | "testnet" => Ok(DeploymentEnv::Test),
            "local" => Ok(DeploymentEnv::Local),
            other => Err(anyhow!("unknown deployment environment `{other}`")),
        }
    }
}

/// Where a mint program lives and how clients should talk to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub program_id: String,
    pub config_id: String,
    pub treasury: String,
    pub gateway_url: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tx_timeout_ms: Option<u64>,
    #[serde(default)]
    pub registry_url: Option<String>,
}

impl DeploymentRecord {
    pub fn new(
        program_id: impl Into<String>,
        config_id: impl Into<String>,
        treasury: impl Into<String>,
        gateway_url: impl Into<String>,
    ) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            program_id: program_id.into(),
            config_id: config_id.into(),
            treasury: treasury.into(),
            gateway_url: gateway_url.into(),
            start_date: None,
            tx_timeout_ms: None,
            registry_url: None,
        }
    }

    pub fn mint_target(&self) -> MintTarget {
        MintTarget {
            program: ProgramId::new(&self.program_id),
            config: AccountId::new(&self.config_id),
            treasury: AccountId::new(&self.treasury),
        }
    }

    /// Engine defaults with the recorded confirmation timeout, if any.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(ms) = self.tx_timeout_ms {
            config.tx_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Registry settings for `mode`. `lookup` wins; the recorded registry URL
    /// fills in when it has no URL.
    pub fn registry_config(
        &self,
        mode: GateMode,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<RegistryConfig>, ConfigError> {
        RegistryConfig::for_mode(mode, |name| {
            lookup(name).or_else(|| {
                if name == REGISTRY_URL_VAR {
                    self.registry_url.clone()
                } else {
                    None
                }
            })
        })
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::new_in(DEPLOYMENTS_ROOT, env)
    }

    pub fn new_in(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    /// Like [`load`](Self::load) but treats a missing record as an error.
    pub fn require(&self) -> Result<DeploymentRecord> {
        self.load()?.ok_or_else(|| {
            anyhow!(
                "no deployment recorded in {}; run `claim-cli init-deployment` first",
                self.path.display()
            )
        })
    }

    pub fn save(&self, record: &DeploymentRecord) -> Result<()> {
        write_record(&self.path, record)
    }
}

pub fn ensure_structure(root: impl AsRef<Path>) -> Result<()> {
    for env in DeploymentEnv::ALL {
        let _ = ensure_store(root.as_ref(), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create deployments directory {}", env_dir.display())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        fs::write(&file_path, b"").with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment record")?;
    Ok(())
}
