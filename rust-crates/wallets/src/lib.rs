//! Keystore wallets on disk and the signer session built from them.

use claim_engine::{
    AccountId,
    SignerSession,
    SubmissionError,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ed25519_dalek::{
    Signer,
    SigningKey,
    VerifyingKey,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};
use tracing::info;

pub const WALLET_EXTENSION: &str = "wallet";

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".claim").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some(WALLET_EXTENSION) {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// Prompt for the wallet password on the terminal and unlock it.
pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<KeystoreSigner> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    unlock_with_password(descriptor, &password)
}

pub fn unlock_with_password(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<KeystoreSigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    let signer = KeystoreSigner::from_secret_bytes(&secret).wrap_err_with(|| {
        format!(
            "Wallet '{}' contained unsupported key material",
            descriptor.name
        )
    })?;
    info!(wallet = %descriptor.name, account = %signer.public_identity(), "wallet unlocked");
    Ok(signer)
}

/// An unlocked ed25519 key. The account id is the hex encoded public key.
#[derive(Clone)]
pub struct KeystoreSigner {
    key: SigningKey,
}

impl fmt::Debug for KeystoreSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoreSigner")
            .field("account", &self.public_identity())
            .finish_non_exhaustive()
    }
}

impl KeystoreSigner {
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = secret
            .try_into()
            .map_err(|_| eyre!("expected a 32 byte secret key, got {} bytes", secret.len()))?;
        Ok(Self {
            key: SigningKey::from_bytes(&bytes),
        })
    }

    /// Fresh throwaway key, for local sandboxes and tests.
    pub fn random() -> Self {
        Self {
            key: SigningKey::from_bytes(&rand::random::<[u8; 32]>()),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }
}

impl SignerSession for KeystoreSigner {
    fn public_identity(&self) -> AccountId {
        AccountId::new(hex::encode(self.key.verifying_key().as_bytes()))
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SubmissionError> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{
        Signature,
        Verifier,
    };
    use tempdir::TempDir;

    #[test]
    fn list_wallets__returns_sorted_wallet_files_only() {
        // given
        let dir = TempDir::new("wallets").unwrap();
        fs::write(dir.path().join("zed.wallet"), b"{}").unwrap();
        fs::write(dir.path().join("alice.wallet"), b"{}").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("nested.wallet")).unwrap();

        // when
        let wallets = list_wallets(dir.path()).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "zed"]);
    }

    #[test]
    fn list_wallets__missing_dir_is_empty() {
        let dir = TempDir::new("wallets").unwrap();

        let wallets = list_wallets(&dir.path().join("absent")).unwrap();

        assert!(wallets.is_empty());
    }

    #[test]
    fn find_wallet__reports_unknown_name() {
        let dir = TempDir::new("wallets").unwrap();
        fs::write(dir.path().join("alice.wallet"), b"{}").unwrap();

        assert!(find_wallet(dir.path(), "alice").is_ok());
        let err = find_wallet(dir.path(), "bob").unwrap_err();
        assert!(err.to_string().contains("'bob' not found"));
    }

    #[test]
    fn unlock_with_password__rejects_non_keystore_file() {
        let dir = TempDir::new("wallets").unwrap();
        let path = dir.path().join("alice.wallet");
        fs::write(&path, b"{}").unwrap();

        let result = unlock_with_password(&WalletDescriptor::new("alice", path), "pw");

        assert!(result.is_err());
    }

    #[test]
    fn resolve_wallet_dir__expands_tilde() {
        let home = std::env::var("HOME").unwrap();

        let dir = resolve_wallet_dir(Some("~/keys")).unwrap();

        assert_eq!(dir, PathBuf::from(home).join("keys"));
    }

    #[test]
    fn from_secret_bytes__requires_32_bytes() {
        assert!(KeystoreSigner::from_secret_bytes(&[7; 31]).is_err());
        assert!(KeystoreSigner::from_secret_bytes(&[7; 32]).is_ok());
    }

    #[test]
    fn sign__produces_signature_verifiable_with_public_identity() {
        // given
        let signer = KeystoreSigner::from_secret_bytes(&[42; 32]).unwrap();
        let message = b"claim:mint:config:treasury:payer:1";

        // when
        let signature = signer.sign(message).unwrap();

        // then
        let identity = hex::decode(signer.public_identity().as_str()).unwrap();
        let key = VerifyingKey::from_bytes(&identity.try_into().unwrap()).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();
        assert!(key.verify(message, &signature).is_ok());
        assert_eq!(signer.public_identity().as_str().len(), 64);
    }

    #[test]
    fn random__yields_distinct_accounts() {
        let a = KeystoreSigner::random();
        let b = KeystoreSigner::random();

        assert_ne!(a.public_identity(), b.public_identity());
        let restored = KeystoreSigner::from_secret_bytes(
            &hex::decode(a.secret_hex()).unwrap(),
        )
        .unwrap();
        assert_eq!(restored.public_identity(), a.public_identity());
    }
}
