//! Remote repositories hosting packages.
//!
//! A [`RemoteRepository`] resolves the latest published version of one
//! package, downloads the matching archive into a scratch directory and
//! locates the installable package folder inside the extracted tree.
//!
//! # Resolution policy
//!
//! Steps are tried in [`RESOLUTION_POLICY`] order; the first one producing a
//! result wins:
//!
//! 1. **Descriptor**: a declared subpath means the descriptor on the
//!    default branch is authoritative.
//! 2. **Tags**: the highest version among the repository's tags.
//! 3. **DefaultBranch**: the default-branch archive with an unknown version.

mod archive;
mod github;
mod host;

pub use archive::{extract_zip, find_package_folder, flush_dir, locate_subpath, top_level_dir};
pub use github::GitHubHost;
pub use host::{RepoId, RepositoryHost, Tag};

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::descriptor::{DESCRIPTOR_FILE, Descriptor};
use crate::events::{EventSink, LifecycleEvent, NullSink};
use crate::version::{Version, VersionError};

/// Errors raised by repository operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network failure, timeout or non-success status.
    #[error("Remote unreachable ({url}): {reason}")]
    Unreachable { url: String, reason: String },

    /// Repository identifier is not `owner/name`.
    #[error("Invalid repository '{0}': expected owner/name")]
    InvalidRepository(String),

    /// A remote descriptor could not be used.
    #[error("Invalid descriptor at {location}: {reason}")]
    InvalidDescriptor { location: String, reason: String },

    /// A response body could not be decoded.
    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// No package folder matched inside the extracted archive.
    #[error("Package folder '{target}' not found under {}", searched.display())]
    PackageFolderNotFound { searched: PathBuf, target: String },

    /// Zip decoding error.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Version parsing error.
    #[error(transparent)]
    Version(#[from] VersionError),
}

impl RemoteError {
    /// Returns true for network-level failures.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// A step of the resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    /// Version read from the subpath descriptor on the default branch.
    Descriptor,
    /// Highest version among tags.
    Tags,
    /// Default-branch archive, version unknown.
    DefaultBranch,
}

/// Resolution steps in the order they are attempted.
pub const RESOLUTION_POLICY: [ResolutionStep; 3] = [
    ResolutionStep::Descriptor,
    ResolutionStep::Tags,
    ResolutionStep::DefaultBranch,
];

/// Latest version and the archive to fetch for it, resolved together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Latest version string, `None` when it could not be determined.
    pub version: Option<String>,
    /// Archive to download.
    pub archive_url: String,
    /// Step that produced this resolution.
    pub step: ResolutionStep,
}

/// Options shared by all repositories of one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Branch used for descriptors and the fallback archive.
    pub default_branch: String,
    /// Package folder suffix convention.
    pub package_suffix: String,
    /// Root of per-package scratch directories.
    pub scratch_root: PathBuf,
}

impl RemoteOptions {
    /// Extracts the repository options from `settings`.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_branch: settings.default_branch.clone(),
            package_suffix: settings.package_suffix.clone(),
            scratch_root: settings.scratch_dir.clone(),
        }
    }
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// One hosted package.
pub struct RemoteRepository {
    /// Repository identifier.
    repo: RepoId,
    /// Package name, used for exact folder matching and scratch keying.
    name: String,
    /// Declared package folder location inside the repository.
    extension_path: Option<String>,
    /// Transport.
    host: Arc<dyn RepositoryHost>,
    /// Shared options.
    options: RemoteOptions,
    /// Live resolution, set at most once per instance.
    resolution: Option<Resolution>,
    /// Version restored from the update cache.
    cached_version: Option<String>,
    /// Download notifications.
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RemoteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRepository")
            .field("repo", &self.repo)
            .field("name", &self.name)
            .field("extension_path", &self.extension_path)
            .field("resolution", &self.resolution)
            .field("cached_version", &self.cached_version)
            .finish_non_exhaustive()
    }
}

impl RemoteRepository {
    /// Creates a repository for `repository` (`owner/name`).
    ///
    /// `name` defaults to the repository name.
    pub fn new(
        repository: &str,
        name: Option<&str>,
        extension_path: Option<&str>,
        host: Arc<dyn RepositoryHost>,
        options: RemoteOptions,
    ) -> Result<Self, RemoteError> {
        let repo = RepoId::parse(repository)?;
        let name = name
            .filter(|n| !n.is_empty())
            .map_or_else(|| repo.name.clone(), str::to_string);

        Ok(Self {
            repo,
            name,
            extension_path: extension_path
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            host,
            options,
            resolution: None,
            cached_version: None,
            events: Arc::new(NullSink),
        })
    }

    /// Routes download notifications to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Repository identifier.
    #[must_use]
    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared subpath.
    #[must_use]
    pub fn extension_path(&self) -> Option<&str> {
        self.extension_path.as_deref()
    }

    /// Live resolution, if performed.
    #[must_use]
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    /// Returns true once a live resolution or cached version is known.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some() || self.cached_version.is_some()
    }

    /// Latest known version: the live resolution's, else the cached one.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match &self.resolution {
            Some(resolution) => resolution.version.as_deref(),
            None => self.cached_version.as_deref(),
        }
    }

    /// Archive URL of the live resolution.
    #[must_use]
    pub fn archive_url(&self) -> Option<&str> {
        self.resolution.as_ref().map(|r| r.archive_url.as_str())
    }

    /// Attaches a version restored from cache. The live resolution, if any,
    /// still takes precedence and downloads always resolve live.
    pub fn set_cached_version(&mut self, version: Option<String>) {
        self.cached_version = version;
    }

    /// Scratch directory for this package.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.options
            .scratch_root
            .join(&self.repo.owner)
            .join(&self.name)
    }

    /// Resolves the latest version and its archive. Repeat calls return the
    /// first result without querying the remote again.
    pub fn resolve_latest(&mut self) -> Result<&Resolution, RemoteError> {
        let resolution = match self.resolution.take() {
            Some(resolution) => resolution,
            None => {
                let resolution = self.run_policy()?;
                info!(
                    "[REMOTE] {} resolved via {:?}: version={:?}",
                    self.repo, resolution.step, resolution.version
                );
                resolution
            }
        };
        Ok(self.resolution.insert(resolution))
    }

    fn run_policy(&self) -> Result<Resolution, RemoteError> {
        for step in RESOLUTION_POLICY {
            if let Some(resolution) = self.resolve_step(step)? {
                return Ok(resolution);
            }
        }
        Ok(self.resolve_from_default_branch())
    }

    /// Runs a single policy step.
    pub fn resolve_step(&self, step: ResolutionStep) -> Result<Option<Resolution>, RemoteError> {
        match step {
            ResolutionStep::Descriptor => self.resolve_from_descriptor(),
            ResolutionStep::Tags => self.resolve_from_tags(),
            ResolutionStep::DefaultBranch => Ok(Some(self.resolve_from_default_branch())),
        }
    }

    /// Reads the version from the subpath descriptor on the default branch.
    /// Produces nothing when no subpath is declared.
    pub fn resolve_from_descriptor(&self) -> Result<Option<Resolution>, RemoteError> {
        let Some(extension_path) = &self.extension_path else {
            return Ok(None);
        };

        let path = format!("{}/{}", extension_path, DESCRIPTOR_FILE);
        let location = format!("{}:{}/{}", self.repo, self.options.default_branch, path);
        debug!("[REMOTE] Reading remote descriptor {}", location);

        let bytes = self
            .host
            .fetch_file(&self.repo, &self.options.default_branch, &path)?;
        let descriptor = Descriptor::from_bytes(&bytes).map_err(|e| {
            RemoteError::InvalidDescriptor {
                location: location.clone(),
                reason: e.to_string(),
            }
        })?;

        let version = descriptor
            .version
            .ok_or_else(|| RemoteError::InvalidDescriptor {
                location,
                reason: "missing version".to_string(),
            })?;

        Ok(Some(Resolution {
            version: Some(version),
            archive_url: self.default_branch_archive_url(),
            step: ResolutionStep::Descriptor,
        }))
    }

    /// Picks the highest tag. Among tags with equal versions the one listed
    /// first wins. Tags that are not versions are skipped; if tags exist but
    /// none is a version, the first parse error is returned.
    pub fn resolve_from_tags(&self) -> Result<Option<Resolution>, RemoteError> {
        let tags = self.host.list_tags(&self.repo)?;
        if tags.is_empty() {
            debug!("[REMOTE] {} has no tags", self.repo);
            return Ok(None);
        }

        let mut first_error = None;
        let mut best: Option<(Version, &Tag)> = None;

        for tag in &tags {
            match Version::parse_tag(&tag.name) {
                Ok(version) => {
                    // Strictly greater keeps the earliest of equal versions
                    if best.as_ref().is_none_or(|(current, _)| version > *current) {
                        best = Some((version, tag));
                    }
                }
                Err(e) => {
                    warn!("[REMOTE] {}: skipping non-version tag '{}'", self.repo, tag.name);
                    first_error.get_or_insert(e);
                }
            }
        }

        match best {
            Some((_, tag)) => Ok(Some(Resolution {
                version: Some(tag.name.clone()),
                archive_url: tag.zip_url.clone(),
                step: ResolutionStep::Tags,
            })),
            None => match first_error {
                Some(e) => Err(e.into()),
                None => Ok(None),
            },
        }
    }

    /// Default-branch archive with unknown version.
    #[must_use]
    pub fn resolve_from_default_branch(&self) -> Resolution {
        Resolution {
            version: None,
            archive_url: self.default_branch_archive_url(),
            step: ResolutionStep::DefaultBranch,
        }
    }

    fn default_branch_archive_url(&self) -> String {
        self.host
            .branch_archive_url(&self.repo, &self.options.default_branch)
    }

    /// Downloads the latest archive and returns the extracted package
    /// folder.
    ///
    /// The scratch directory is wiped first and the archive is streamed to
    /// disk.
    pub fn download(&mut self) -> Result<PathBuf, RemoteError> {
        let url = self.resolve_latest()?.archive_url.clone();
        let scratch = self.scratch_dir();
        flush_dir(&scratch)?;

        let archive_path = scratch.join(archive_file_name(&url));
        info!(
            "[REMOTE] Downloading {} to {}",
            url,
            archive_path.display()
        );
        self.events.emit(LifecycleEvent::RepositoryWillDownload {
            repository: self.repo.to_string(),
        });

        let bytes = {
            let mut file = File::create(&archive_path)?;
            let bytes = self.host.download(&url, &mut file)?;
            file.flush()?;
            bytes
        };

        self.events.emit(LifecycleEvent::RepositoryDidDownload {
            repository: self.repo.to_string(),
            bytes,
        });

        self.extract(&archive_path)
    }

    /// Unpacks `archive` into the scratch directory, deletes the archive and
    /// returns the package folder.
    pub fn extract(&self, archive: &Path) -> Result<PathBuf, RemoteError> {
        let scratch = self.scratch_dir();
        extract_zip(archive, &scratch)?;
        std::fs::remove_file(archive)?;

        let folder = match &self.extension_path {
            Some(subpath) => locate_subpath(&scratch, subpath)?,
            None => find_package_folder(&scratch, &self.name, &self.options.package_suffix)?,
        };

        info!("[REMOTE] Package folder: {}", folder.display());
        Ok(folder)
    }
}

/// File name for a downloaded archive: the URL's last segment with a `.zip`
/// extension.
fn archive_file_name(url: &str) -> String {
    let last = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("archive");

    if last.ends_with(".zip") {
        last.to_string()
    } else {
        format!("{}.zip", last)
    }
}
