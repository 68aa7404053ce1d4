//! Pluggable signers
//!
//! A signer is looked up by name once at startup and held for the whole
//! pass. The built-in `rpm-resign` signer shells out to `rpm --resign`.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use thiserror::Error;

use crate::package::SigKey;

/// Name of the built-in `rpm --resign` signer
pub const RPM_RESIGN: &str = "rpm-resign";

/// Signer failures
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("unknown signer '{name}' (available: {available})")]
    Unknown { name: String, available: String },

    #[error("no GPG identity found for key {0}")]
    UnknownIdentity(SigKey),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("signer failed: {0}")]
    Other(String),
}

/// Signs local RPM files in place with a key
pub trait Signer: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    fn sign(&self, key: &SigKey, paths: &[PathBuf]) -> Result<(), SignerError>;
}

/// Settings a signer factory may draw on
#[derive(Debug, Clone, Default)]
pub struct SignerContext {
    /// Key id to GPG uid overrides
    pub gpg_names: BTreeMap<String, String>,
}

type SignerFactory = Box<dyn Fn(&SignerContext) -> Arc<dyn Signer> + Send + Sync>;

/// Name to factory lookup
pub struct SignerRegistry {
    factories: BTreeMap<String, SignerFactory>,
}

impl Default for SignerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl SignerRegistry {
    /// Registry with no signers
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in signers
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(RPM_RESIGN, |ctx| Arc::new(RpmResignSigner::new(ctx.gpg_names.clone())));
        registry
    }

    /// Register (or replace) the factory for `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&SignerContext) -> Arc<dyn Signer> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the signer registered as `name`.
    pub fn resolve(&self, name: &str, ctx: &SignerContext) -> Result<Arc<dyn Signer>, SignerError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory(ctx)),
            None => Err(SignerError::Unknown {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            }),
        }
    }
}

/// Signs with `rpm --define "_gpg_name <uid>" --resign`
#[derive(Debug, Clone, Default)]
pub struct RpmResignSigner {
    gpg_names: BTreeMap<String, String>,
}

impl RpmResignSigner {
    pub fn new(gpg_names: BTreeMap<String, String>) -> Self {
        let gpg_names = gpg_names
            .into_iter()
            .map(|(k, v)| (SigKey::new(&k).as_str().to_string(), v))
            .collect();
        Self { gpg_names }
    }

    /// GPG uid for `key`: configured override first, then the local keyring.
    pub fn gpg_name(&self, key: &SigKey) -> Result<String, SignerError> {
        if let Some(name) = self.gpg_names.get(key.as_str()) {
            return Ok(name.clone());
        }

        let output = Command::new("gpg")
            .args(["--list-keys", "--with-colons"])
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SignerError::Spawn {
                program: "gpg".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SignerError::Failed {
                program: "gpg".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_gpg_uid(&String::from_utf8_lossy(&output.stdout), key)
            .ok_or_else(|| SignerError::UnknownIdentity(key.clone()))
    }

    /// Arguments passed to `rpm`
    pub fn command_args(gpg_name: &str, paths: &[PathBuf]) -> Vec<String> {
        let mut args = vec![
            "--define".to_string(),
            format!("_gpg_name {}", gpg_name),
            "--resign".to_string(),
        ];
        args.extend(paths.iter().map(|p| p.display().to_string()));
        args
    }
}

impl Signer for RpmResignSigner {
    fn name(&self) -> &str {
        RPM_RESIGN
    }

    fn sign(&self, key: &SigKey, paths: &[PathBuf]) -> Result<(), SignerError> {
        if paths.is_empty() {
            return Ok(());
        }
        let gpg_name = self.gpg_name(key)?;
        tracing::debug!("signing {} file(s) as '{}'", paths.len(), gpg_name);

        let output = Command::new("rpm")
            .args(Self::command_args(&gpg_name, paths))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SignerError::Spawn {
                program: "rpm".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SignerError::Failed {
                program: "rpm".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// First uid of the public key whose key id ends with `key`.
///
/// Reads `gpg --with-colons` listings: `pub` records carry the key id in
/// field 5 and the following `uid` records carry the user id in field 10.
pub fn parse_gpg_uid(listing: &str, key: &SigKey) -> Option<String> {
    let mut in_match = false;
    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("pub") => {
                let keyid = fields.get(4).copied().unwrap_or("").to_lowercase();
                in_match = keyid.len() >= 8 && keyid.get(keyid.len() - 8..) == Some(key.as_str());
            }
            Some("uid") if in_match => {
                if let Some(uid) = fields.get(9).filter(|u| !u.is_empty()) {
                    return Some(unescape_colons(uid));
                }
            }
            _ => {}
        }
    }
    None
}

// gpg escapes ':' in user ids as \x3a
fn unescape_colons(field: &str) -> String {
    field.replace("\\x3a", ":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LISTING: &str = "\
tru::1:1700000000:0:3:1:5
pub:u:4096:1:AAAABBBBCCCCDDDD:1700000000:::u:::scESC::::::23::0:
fpr:::::::::0123456789ABCDEF0123AAAABBBBCCCCDDDD:
uid:u::::1700000000::HASH::Test Beta <beta@example.com>::::::::::0:
pub:u:4096:1:1111222233334444:1700000000:::u:::scESC::::::23::0:
uid:u::::1700000000::HASH::Gold Key\\x3a Release <gold@example.com>::::::::::0:
";

    struct CountingSigner(Arc<AtomicUsize>);

    impl Signer for CountingSigner {
        fn name(&self) -> &str {
            "counting"
        }

        fn sign(&self, _key: &SigKey, _paths: &[PathBuf]) -> Result<(), SignerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_parse_gpg_uid() {
        assert_eq!(
            parse_gpg_uid(LISTING, &SigKey::new("CCCCDDDD")).as_deref(),
            Some("Test Beta <beta@example.com>")
        );
        assert_eq!(
            parse_gpg_uid(LISTING, &SigKey::new("33334444")).as_deref(),
            Some("Gold Key: Release <gold@example.com>")
        );
        assert_eq!(parse_gpg_uid(LISTING, &SigKey::new("deadbeef")), None);
    }

    #[test]
    fn test_parse_gpg_uid_non_ascii_key_field() {
        // multi-byte chars in field 5; a byte-offset slice would split one
        let listing = "pub:u:4096:1:éééééa:1600000000:::u:::scESC:\n\
                       uid:u::::1600000000::HASH::Odd <odd@example.com>:\n";
        assert_eq!(parse_gpg_uid(listing, &SigKey::new("aaaabbbb")), None);

        let listing = "pub:u:4096:1:éé00AAAABBBB:1600000000:::u:::scESC:\n\
                       uid:u::::1600000000::HASH::Odd <odd@example.com>:\n";
        assert_eq!(
            parse_gpg_uid(listing, &SigKey::new("aaaabbbb")).as_deref(),
            Some("Odd <odd@example.com>")
        );
    }

    #[test]
    fn test_command_args() {
        let args = RpmResignSigner::command_args("Test <t@example.com>", &[PathBuf::from("/tmp/a.rpm")]);
        assert_eq!(
            args,
            vec!["--define", "_gpg_name Test <t@example.com>", "--resign", "/tmp/a.rpm"]
        );
    }

    #[test]
    fn test_gpg_name_override() {
        let mut names = BTreeMap::new();
        names.insert("FD431D51".to_string(), "Release Key".to_string());
        let signer = RpmResignSigner::new(names);
        assert_eq!(signer.gpg_name(&SigKey::new("fd431d51")).unwrap(), "Release Key");
    }

    #[test]
    fn test_registry_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = SignerRegistry::with_builtins();
        let shared = Arc::clone(&calls);
        registry.register("counting", move |_| Arc::new(CountingSigner(Arc::clone(&shared))));

        let ctx = SignerContext::default();
        assert_eq!(registry.resolve(RPM_RESIGN, &ctx).unwrap().name(), RPM_RESIGN);

        let signer = registry.resolve("counting", &ctx).unwrap();
        signer.sign(&SigKey::new("k"), &[]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_unknown_lists_available() {
        let err = match SignerRegistry::with_builtins().resolve("pkcs11", &SignerContext::default()) {
            Err(e) => e,
            Ok(_) => panic!("resolved unknown signer"),
        };
        assert!(matches!(err, SignerError::Unknown { .. }));
        assert!(err.to_string().contains(RPM_RESIGN));
    }
}
