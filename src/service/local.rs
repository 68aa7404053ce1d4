//! Build service backed by a topdir on the local filesystem
//!
//! Artifacts live under the standard layout (see [`PathInfo`]); builds, tags
//! and cached signature rows live in `catalog.json` at the topdir root.
//! Mutations rewrite the catalog through a temp file and a rename.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{AuthMode, BuildService, ServiceError, ServiceResult, SignatureEntry};
use crate::layout::PathInfo;
use crate::package::{BuildInfo, PackageRef, RpmId, SigKey};

/// Catalog file name at the topdir root
pub const CATALOG_FILE: &str = "catalog.json";

/// Persistent catalog contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub builds: Vec<CatalogBuild>,
    #[serde(default)]
    pub rpms: Vec<CatalogRpm>,
    #[serde(default)]
    pub tags: Vec<CatalogTag>,
    #[serde(default)]
    pub signatures: Vec<SignatureRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogBuild {
    pub id: u64,
    pub name: String,
    pub version: String,
    pub release: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRpm {
    pub id: RpmId,
    pub build_id: u64,
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub size: u64,
}

/// A tag; `builds` are in tagging order, newest last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTag {
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub builds: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRow {
    pub rpm_id: RpmId,
    pub sigkey: SigKey,
    pub sighash: String,
}

/// Filesystem build service
pub struct LocalBuildService {
    paths: PathInfo,
    auth: AuthMode,
    catalog: Mutex<Catalog>,
}

impl LocalBuildService {
    /// Open the service rooted at `topdir`, reading its catalog.
    pub fn open(topdir: impl Into<PathBuf>) -> ServiceResult<Self> {
        let paths = PathInfo::new(topdir);
        let raw = fs::read(paths.topdir().join(CATALOG_FILE))?;
        let catalog: Catalog = serde_json::from_slice(&raw)?;
        Ok(Self {
            paths,
            auth: AuthMode::None,
            catalog: Mutex::new(catalog),
        })
    }

    /// Initialize `topdir` with `catalog` and open it.
    pub fn create(topdir: impl Into<PathBuf>, catalog: Catalog) -> ServiceResult<Self> {
        let paths = PathInfo::new(topdir);
        fs::create_dir_all(paths.topdir())?;
        persist(paths.topdir(), &catalog)?;
        Ok(Self {
            paths,
            auth: AuthMode::None,
            catalog: Mutex::new(catalog),
        })
    }

    /// Require `auth` on login.
    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    /// Snapshot of the current catalog
    pub fn catalog(&self) -> Catalog {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        // a poisoned lock still holds a consistent catalog: every mutation
        // is validated before it is applied
        self.catalog.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Catalog {
    fn build(&self, id: u64) -> Option<&CatalogBuild> {
        self.builds.iter().find(|b| b.id == id)
    }

    fn tag(&self, name: &str) -> Option<&CatalogTag> {
        self.tags.iter().find(|t| t.name == name)
    }

    fn package_ref(&self, rpm: &CatalogRpm) -> Option<PackageRef> {
        let build = self.build(rpm.build_id)?;
        Some(PackageRef {
            id: rpm.id,
            build: BuildInfo {
                id: build.id,
                name: build.name.clone(),
                version: build.version.clone(),
                release: build.release.clone(),
            },
            name: rpm.name.clone(),
            version: rpm.version.clone(),
            release: rpm.release.clone(),
            arch: rpm.arch.clone(),
            size: rpm.size,
        })
    }

    fn rpms_of_builds(&self, build_ids: &[u64]) -> Vec<PackageRef> {
        let mut result = Vec::new();
        for build_id in build_ids {
            let mut rpms: Vec<&CatalogRpm> = self.rpms.iter().filter(|r| r.build_id == *build_id).collect();
            rpms.sort_by_key(|r| r.id);
            result.extend(rpms.into_iter().filter_map(|r| self.package_ref(r)));
        }
        result
    }

    /// Tag followed by its ancestors, depth first, each once.
    fn inheritance_chain(&self, tag: &str, inherit: bool) -> ServiceResult<Vec<&CatalogTag>> {
        let root = self.tag(tag).ok_or_else(|| ServiceError::UnknownTag(tag.to_string()))?;
        if !inherit {
            return Ok(vec![root]);
        }

        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.name.as_str()) {
                continue;
            }
            chain.push(current);
            for parent in current.parents.iter().rev() {
                let parent = self
                    .tag(parent)
                    .ok_or_else(|| ServiceError::UnknownTag(parent.clone()))?;
                stack.push(parent);
            }
        }
        Ok(chain)
    }

    fn has_signature(&self, rpm_id: RpmId, sigkey: &SigKey) -> bool {
        self.signatures.iter().any(|s| s.rpm_id == rpm_id && &s.sigkey == sigkey)
    }
}

impl BuildService for LocalBuildService {
    fn login(&self) -> ServiceResult<()> {
        self.auth.check()
    }

    fn path_info(&self) -> &PathInfo {
        &self.paths
    }

    fn list_tagged_rpms(&self, tag: &str, latest: bool, inherit: bool) -> ServiceResult<Vec<PackageRef>> {
        let catalog = self.lock();
        let chain = catalog.inheritance_chain(tag, inherit)?;

        let mut build_ids = Vec::new();
        let mut seen_builds = HashSet::new();
        let mut seen_packages = HashSet::new();
        for tag in chain {
            if latest {
                // newest first; a package already provided by a closer tag wins
                let mut newest_here = Vec::new();
                for build_id in tag.builds.iter().rev() {
                    let Some(build) = catalog.build(*build_id) else {
                        continue;
                    };
                    if seen_packages.contains(build.name.as_str()) {
                        continue;
                    }
                    if newest_here.iter().any(|(name, _)| *name == build.name.as_str()) {
                        continue;
                    }
                    newest_here.push((build.name.as_str(), build.id));
                }
                for (name, id) in newest_here.into_iter().rev() {
                    seen_packages.insert(name);
                    build_ids.push(id);
                }
            } else {
                for build_id in &tag.builds {
                    if seen_builds.insert(*build_id) {
                        build_ids.push(*build_id);
                    }
                }
            }
        }

        Ok(catalog.rpms_of_builds(&build_ids))
    }

    fn list_build_rpms(&self, nvrs: &[String]) -> ServiceResult<Vec<PackageRef>> {
        let catalog = self.lock();
        let mut build_ids = Vec::with_capacity(nvrs.len());
        for nvr in nvrs {
            let build = catalog
                .builds
                .iter()
                .find(|b| format!("{}-{}-{}", b.name, b.version, b.release) == *nvr)
                .ok_or_else(|| ServiceError::UnknownBuild(nvr.clone()))?;
            build_ids.push(build.id);
        }
        Ok(catalog.rpms_of_builds(&build_ids))
    }

    fn query_rpm_sigs(&self, rpm_ids: &[RpmId]) -> ServiceResult<Vec<Vec<SignatureEntry>>> {
        let catalog = self.lock();
        let mut by_rpm: HashMap<RpmId, Vec<SignatureEntry>> = HashMap::new();
        for row in &catalog.signatures {
            by_rpm.entry(row.rpm_id).or_default().push(SignatureEntry {
                rpm_id: row.rpm_id,
                sigkey: row.sigkey.clone(),
                sighash: row.sighash.clone(),
            });
        }
        Ok(rpm_ids
            .iter()
            .map(|id| by_rpm.get(id).cloned().unwrap_or_default())
            .collect())
    }

    fn write_signed_rpms(&self, rpms: &[PackageRef], sigkey: &SigKey) -> ServiceResult<()> {
        let catalog = self.lock();

        // validate and load every header before the first write
        let mut headers = Vec::with_capacity(rpms.len());
        for rpm in rpms {
            if !catalog.rpms.iter().any(|r| r.id == rpm.id) {
                return Err(ServiceError::UnknownRpm(rpm.id));
            }
            if !catalog.has_signature(rpm.id, sigkey) {
                return Err(ServiceError::NoCachedSignature {
                    nvra: rpm.nvra(),
                    sigkey: sigkey.clone(),
                });
            }
            let sighdr = fs::read(self.paths.sigcache(rpm, sigkey))?;
            rpm_sighdr::RawHeader::parse(&sighdr)?;
            headers.push(sighdr);
        }

        // splice every copy aside, then move them all into place
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(rpms.len());
        for (rpm, sighdr) in rpms.iter().zip(&headers) {
            let src = self.paths.locate(rpm, None);
            let dst = self.paths.locate(rpm, Some(sigkey));
            match splice_aside(&src, &dst, sighdr) {
                Ok(tmp) => staged.push((tmp, dst)),
                Err(e) => {
                    discard(staged.iter().map(|(tmp, _)| tmp));
                    return Err(e);
                }
            }
        }

        for (index, (tmp, dst)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, dst) {
                discard(staged[index..].iter().map(|(tmp, _)| tmp));
                return Err(e.into());
            }
        }
        for rpm in rpms {
            debug!(rpm = %rpm.nvra(), %sigkey, "wrote signed copy");
        }
        Ok(())
    }

    fn add_rpm_sig(&self, rpm: &PackageRef, sighdr: &[u8]) -> ServiceResult<()> {
        let mut catalog = self.lock();
        if !catalog.rpms.iter().any(|r| r.id == rpm.id) {
            return Err(ServiceError::UnknownRpm(rpm.id));
        }

        let sigkey = SigKey::new(rpm_sighdr::header_key_id(sighdr)?);
        if sigkey.is_unsigned() {
            return Err(ServiceError::UnsignedHeader { nvra: rpm.nvra() });
        }
        if catalog.has_signature(rpm.id, &sigkey) {
            return Err(ServiceError::DuplicateSignature {
                nvra: rpm.nvra(),
                sigkey,
            });
        }

        let cache_path = self.paths.sigcache(rpm, &sigkey);
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&cache_path, sighdr)?;

        let mut updated = catalog.clone();
        updated.signatures.push(SignatureRow {
            rpm_id: rpm.id,
            sigkey: sigkey.clone(),
            sighash: hex::encode(Sha256::digest(sighdr)),
        });
        persist(self.paths.topdir(), &updated)?;
        *catalog = updated;

        debug!(rpm = %rpm.nvra(), %sigkey, "cached signature header");
        Ok(())
    }
}

/// Splice `sighdr` into a temp file next to `dst`; returns the temp path.
fn splice_aside(src: &Path, dst: &Path, sighdr: &[u8]) -> ServiceResult<PathBuf> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = dst.with_extension("rpm.tmp");
    if let Err(e) = rpm_sighdr::splice_sighdr(src, &tmp, sighdr) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(tmp)
}

fn discard<'p>(tmps: impl Iterator<Item = &'p PathBuf>) {
    for tmp in tmps {
        if let Err(e) = fs::remove_file(tmp) {
            warn!(path = %tmp.display(), "could not remove temp copy: {}", e);
        }
    }
}

fn persist(topdir: &Path, catalog: &Catalog) -> ServiceResult<()> {
    let path = topdir.join(CATALOG_FILE);
    let tmp = topdir.join(format!("{}.tmp", CATALOG_FILE));
    fs::write(&tmp, serde_json::to_vec_pretty(catalog)?)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}
