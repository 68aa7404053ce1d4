//! Test fixtures: a build-service topdir with synthetic RPMs
//!
//! Every RPM gets its own build (`pkg{id}-1.0-1`), is tagged into [`TAG`]
//! and has an unsigned main copy on disk. [`RpmState`] adds signed copies,
//! cached signature headers or a signed main copy on top of that.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use walkdir::WalkDir;

use releng_sign::mock::RecordingService;
use releng_sign::package::{PackageRef, SigKey};
use releng_sign::service::{
    BuildService, Catalog, CatalogBuild, CatalogRpm, CatalogTag, LocalBuildService, SignatureRow,
};
use releng_sign::sign::{BatchLimits, Reconciler, Signer, SignerError};
use releng_sign::PathInfo;
use rpm_sighdr::{build_sigpacket, SigHeaderBuilder, LEAD_MAGIC, LEAD_SIZE, SIGTAG_GPG};

/// Tag every fixture build is tagged into
pub const TAG: &str = "f40-compose";

/// Beta key used across tests
pub const BETA: &str = "b1b1b1b1";

/// Gold key used across tests
pub const GOLD: &str = "901d901d";

// non-signature digest tag present in every header
const SIGTAG_MD5: u32 = 1004;

/// Initial state of one RPM
#[derive(Debug, Clone, Default)]
pub struct RpmState {
    /// Keys with a signed copy on disk (and a cached header)
    pub signed_copies: Vec<&'static str>,
    /// Keys with a cached header only
    pub cached: Vec<&'static str>,
    /// Key the main copy is signed with
    pub main_signed_with: Option<&'static str>,
}

impl RpmState {
    pub fn unsigned() -> Self {
        Self::default()
    }

    pub fn signed(key: &'static str) -> Self {
        Self {
            signed_copies: vec![key],
            ..Self::default()
        }
    }

    pub fn cached(key: &'static str) -> Self {
        Self {
            cached: vec![key],
            ..Self::default()
        }
    }

    pub fn main_signed(key: &'static str) -> Self {
        Self {
            main_signed_with: Some(key),
            ..Self::default()
        }
    }
}

/// Builds a [`Fixture`]
#[derive(Default)]
pub struct FixtureBuilder {
    rpms: Vec<(u64, u64, RpmState)>,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an RPM of 1 KiB.
    pub fn rpm(self, id: u64, state: RpmState) -> Self {
        self.rpm_sized(id, 1024, state)
    }

    pub fn rpm_sized(mut self, id: u64, size: u64, state: RpmState) -> Self {
        self.rpms.push((id, size, state));
        self
    }

    pub fn build(self) -> Fixture {
        let top = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let paths = PathInfo::new(top.path());

        let mut catalog = Catalog::default();
        let mut tag = CatalogTag {
            name: TAG.to_string(),
            parents: Vec::new(),
            builds: Vec::new(),
        };
        for (id, size, _) in &self.rpms {
            catalog.builds.push(CatalogBuild {
                id: *id,
                name: format!("pkg{}", id),
                version: "1.0".to_string(),
                release: "1".to_string(),
            });
            catalog.rpms.push(CatalogRpm {
                id: *id,
                build_id: *id,
                name: format!("pkg{}", id),
                version: "1.0".to_string(),
                release: "1".to_string(),
                arch: "x86_64".to_string(),
                size: *size,
            });
            tag.builds.push(*id);
        }
        catalog.tags.push(tag);

        // lay out files, collecting cached rows
        let seed = LocalBuildService::create(top.path(), catalog.clone()).unwrap();
        let rpms = seed.list_tagged_rpms(TAG, true, false).unwrap();
        for rpm in &rpms {
            let Some((_, _, state)) = self.rpms.iter().find(|(id, _, _)| *id == rpm.id) else {
                continue;
            };
            let main = paths.locate(rpm, None);
            fs::create_dir_all(main.parent().unwrap()).unwrap();
            let header = match state.main_signed_with {
                Some(key) => signed_header(key),
                None => unsigned_header(),
            };
            fs::write(&main, rpm_bytes(&header, rpm)).unwrap();

            for key in state.signed_copies.iter().chain(&state.cached) {
                let sighdr = signed_header(key);
                let cache = paths.sigcache(rpm, &SigKey::new(key));
                fs::create_dir_all(cache.parent().unwrap()).unwrap();
                fs::write(&cache, &sighdr).unwrap();
                catalog.signatures.push(SignatureRow {
                    rpm_id: rpm.id,
                    sigkey: SigKey::new(key),
                    sighash: hex::encode(Sha256::digest(&sighdr)),
                });
            }
            for key in &state.signed_copies {
                let signed = paths.locate(rpm, Some(&SigKey::new(key)));
                fs::create_dir_all(signed.parent().unwrap()).unwrap();
                fs::write(&signed, rpm_bytes(&signed_header(key), rpm)).unwrap();
            }
        }
        drop(seed);

        let service = RecordingService::new(LocalBuildService::create(top.path(), catalog).unwrap());
        Fixture { top, scratch, service }
    }
}

/// A populated topdir and a recording service over it
pub struct Fixture {
    pub top: TempDir,
    pub scratch: TempDir,
    pub service: RecordingService<LocalBuildService>,
}

impl Fixture {
    /// All RPMs in [`TAG`], in the order they were added
    pub fn rpms(&self) -> Vec<PackageRef> {
        self.service.inner().list_tagged_rpms(TAG, true, false).unwrap()
    }

    pub fn paths(&self) -> &PathInfo {
        self.service.path_info()
    }

    /// Reconciler over the recording service, staging into the fixture's scratch dir
    pub fn reconciler(&self, signer: Arc<dyn Signer>) -> Reconciler<'_> {
        Reconciler::new(&self.service, signer)
            .unwrap()
            .with_parallelism(4)
            .unwrap()
            .with_limits(BatchLimits::default())
            .with_scratch_root(self.scratch.path())
    }

    /// Key embedded in the signed copy for `key`, if the copy exists
    pub fn signed_copy_key(&self, rpm: &PackageRef, key: &str) -> Option<String> {
        let path = self.paths().locate(rpm, Some(&SigKey::new(key)));
        if !path.is_file() {
            return None;
        }
        let sighdr = rpm_sighdr::rip_sighdr(&path).unwrap();
        Some(rpm_sighdr::header_key_id(&sighdr).unwrap())
    }

    /// Every file under the topdir and scratch dir with its contents
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        for root in [self.top.path(), self.scratch.path()] {
            for entry in WalkDir::new(root) {
                let entry = entry.unwrap();
                if entry.file_type().is_file() {
                    files.insert(entry.path().to_path_buf(), fs::read(entry.path()).unwrap());
                }
            }
        }
        files
    }

    /// Entries left in the scratch dir
    pub fn scratch_entries(&self) -> usize {
        fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

/// 8-byte OpenPGP key id whose low half is `key`
pub fn key_id(key: &str) -> [u8; 8] {
    let low = hex::decode(key).unwrap();
    let mut id = [0u8; 8];
    id[4..].copy_from_slice(&low);
    id
}

pub fn unsigned_header() -> Vec<u8> {
    SigHeaderBuilder::new().bin(SIGTAG_MD5, vec![0x5a; 16]).build()
}

pub fn signed_header(key: &str) -> Vec<u8> {
    SigHeaderBuilder::new()
        .bin(SIGTAG_MD5, vec![0x5a; 16])
        .bin(SIGTAG_GPG, build_sigpacket(key_id(key)))
        .build()
}

/// Lead, `sighdr`, then a payload unique to `rpm`
pub fn rpm_bytes(sighdr: &[u8], rpm: &PackageRef) -> Vec<u8> {
    let mut bytes = vec![0u8; LEAD_SIZE];
    bytes[..4].copy_from_slice(&LEAD_MAGIC);
    bytes.extend_from_slice(sighdr);
    bytes.extend_from_slice(format!("payload of {}", rpm.nvra()).as_bytes());
    bytes
}

/// Signer double that splices a header for its configured key into each file
pub struct FakeSigner {
    /// Key actually used; `None` signs with the requested key
    signs_as: Option<&'static str>,
    /// 1-based invocation from which every call fails
    fail_from: Option<usize>,
    invocations: AtomicUsize,
    signed: Mutex<Vec<PathBuf>>,
}

impl FakeSigner {
    fn with(signs_as: Option<&'static str>, fail_from: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            signs_as,
            fail_from,
            invocations: AtomicUsize::new(0),
            signed: Mutex::new(Vec::new()),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::with(None, None)
    }

    /// Signs with `key` whatever key is requested
    pub fn signing_as(key: &'static str) -> Arc<Self> {
        Self::with(Some(key), None)
    }

    /// Fails every call
    pub fn failing() -> Arc<Self> {
        Self::with(None, Some(1))
    }

    /// Succeeds `n - 1` times, then fails
    pub fn failing_from(n: usize) -> Arc<Self> {
        Self::with(None, Some(n))
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// File names signed so far, in order
    pub fn signed_files(&self) -> Vec<String> {
        self.signed
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }
}

impl Signer for FakeSigner {
    fn name(&self) -> &str {
        "fake"
    }

    fn sign(&self, key: &SigKey, paths: &[PathBuf]) -> Result<(), SignerError> {
        let call = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from.map_or(false, |n| call >= n) {
            return Err(SignerError::Other("signing server unavailable".to_string()));
        }
        let as_key = self.signs_as.unwrap_or(key.as_str());
        for path in paths {
            resign_in_place(path, as_key);
            self.signed.lock().unwrap().push(path.clone());
        }
        Ok(())
    }
}

fn resign_in_place(path: &Path, key: &str) {
    let tmp = path.with_extension("resign");
    rpm_sighdr::splice_sighdr(path, &tmp, &signed_header(key)).unwrap();
    fs::rename(&tmp, path).unwrap();
}
