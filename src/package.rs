//! Installed packages.
//!
//! A [`LocalPackage`] wraps one package known to the bundle host: it reads
//! the package descriptor, configures the [`RemoteRepository`] the package
//! declares, compares versions and performs updates.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bundle::{BundleHost, DirectoryBundleHost, HostError};
use crate::config::Settings;
use crate::descriptor::{Descriptor, DescriptorError, DescriptorReader, PlistDescriptorReader};
use crate::events::{EventSink, LifecycleEvent, LogSink};
use crate::repository::{GitHubHost, RemoteError, RemoteOptions, RemoteRepository, RepositoryHost};
use crate::storage::{FileStorage, Storage, StorageError};
use crate::version::{Version, VersionError};

/// Storage key of the user-maintained list of package names never checked.
pub const IGNORE_KEY: &str = "ignore";

/// Errors raised by package operations.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The package declares no repository.
    #[error("Package '{name}' has no repository configured")]
    Unconfigured { name: String },

    /// The package has no location on disk.
    #[error("Package '{name}' is not on disk")]
    Missing { name: String },

    /// Remote repository failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Descriptor could not be read.
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Bundle host failure.
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Version parsing error.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PackageError {
    /// Returns true if the failure came from the network.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_unreachable())
    }
}

/// Collaborators shared by every package of one engine.
#[derive(Clone)]
pub struct PackageContext {
    /// Installs and enumerates packages.
    pub bundles: Arc<dyn BundleHost>,
    /// Remote transport.
    pub repositories: Arc<dyn RepositoryHost>,
    /// Cache and ignore list.
    pub storage: Arc<dyn Storage>,
    /// Descriptor format.
    pub descriptors: Arc<dyn DescriptorReader>,
    /// Lifecycle notifications.
    pub events: Arc<dyn EventSink>,
    /// Options handed to every remote repository.
    pub options: RemoteOptions,
}

impl PackageContext {
    /// Builds the default collaborators from `settings`: a directory bundle
    /// host, the GitHub transport, file-backed storage, plist descriptors
    /// and logged events.
    pub fn from_settings(settings: &Settings) -> Result<Self, RemoteError> {
        Ok(Self {
            bundles: Arc::new(DirectoryBundleHost::new(
                settings.extensions_dir.clone(),
                settings.package_suffix.clone(),
            )),
            repositories: Arc::new(GitHubHost::new(settings)?),
            storage: Arc::new(FileStorage::new(settings.storage_path.clone())),
            descriptors: Arc::new(PlistDescriptorReader),
            events: Arc::new(LogSink),
            options: RemoteOptions::from_settings(settings),
        })
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Names on the user's ignore list. Non-string entries are skipped.
    #[must_use]
    pub fn ignored(&self) -> Vec<String> {
        self.storage
            .get(IGNORE_KEY)
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

impl fmt::Debug for PackageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageContext")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// One installed (or extracted) package.
pub struct LocalPackage {
    name: String,
    path: Option<PathBuf>,
    descriptor: Option<Descriptor>,
    remote: Option<RemoteRepository>,
    ctx: PackageContext,
}

impl fmt::Debug for LocalPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPackage")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("descriptor", &self.descriptor)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl LocalPackage {
    /// Loads the installed package `name`.
    pub fn new(ctx: PackageContext, name: &str) -> Result<Self, PackageError> {
        let path = ctx.bundles.bundle_path(name);
        let mut package = Self {
            name: name.to_string(),
            path,
            descriptor: None,
            remote: None,
            ctx,
        };
        package.configure_remote()?;
        Ok(package)
    }

    /// Loads the package folder at `path`, e.g. a freshly extracted one.
    ///
    /// The name comes from the descriptor, else from the folder name without
    /// the package suffix.
    pub fn from_path(ctx: PackageContext, path: &Path) -> Result<Self, PackageError> {
        let folder = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = folder
            .strip_suffix(ctx.options.package_suffix.as_str())
            .unwrap_or(&folder)
            .to_string();

        let mut package = Self {
            name: stem,
            path: Some(path.to_path_buf()),
            descriptor: None,
            remote: None,
            ctx,
        };
        package.configure_remote()?;
        if let Some(name) = package.descriptor.as_ref().and_then(|d| d.name.clone()) {
            package.name = name;
        }
        Ok(package)
    }

    /// Reads the descriptor and sets up the remote it declares.
    ///
    /// A package without a descriptor, without a repository, or with a
    /// repository that is not `owner/name` stays unconfigured.
    pub fn configure_remote(&mut self) -> Result<(), PackageError> {
        self.remote = None;
        self.descriptor = match &self.path {
            Some(path) => self.ctx.descriptors.read_descriptor(path)?,
            None => None,
        };

        let Some(descriptor) = &self.descriptor else {
            debug!("[PACKAGE] {} has no descriptor", self.name);
            return Ok(());
        };
        let Some(repository) = &descriptor.repository else {
            debug!("[PACKAGE] {} declares no repository", self.name);
            return Ok(());
        };

        match RemoteRepository::new(
            repository,
            Some(&self.name),
            descriptor.extension_path.as_deref(),
            Arc::clone(&self.ctx.repositories),
            self.ctx.options.clone(),
        ) {
            Ok(remote) => {
                self.remote = Some(remote.with_events(Arc::clone(&self.ctx.events)));
            }
            Err(RemoteError::InvalidRepository(repo)) => {
                warn!("[PACKAGE] {} declares invalid repository '{}'", self.name, repo);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location on disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Descriptor contents.
    #[must_use]
    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    /// Locally installed version.
    #[must_use]
    pub fn local_version(&self) -> Option<&str> {
        self.descriptor.as_ref()?.version.as_deref()
    }

    /// Latest known remote version, without resolving.
    #[must_use]
    pub fn remote_version(&self) -> Option<&str> {
        self.remote.as_ref()?.version()
    }

    #[must_use]
    pub fn remote(&self) -> Option<&RemoteRepository> {
        self.remote.as_ref()
    }

    pub fn remote_mut(&mut self) -> Option<&mut RemoteRepository> {
        self.remote.as_mut()
    }

    /// Returns true if the package declares a usable repository.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Returns true if the package is configured and not ignored.
    #[must_use]
    pub fn may_update(&self) -> bool {
        self.is_configured() && !self.ctx.ignored().iter().any(|n| n == &self.name)
    }

    /// Returns true if the remote version is not newer than the local one.
    ///
    /// Resolves the remote first unless a version is already known. An
    /// unknown remote or local version counts as not current.
    pub fn is_current_version(&mut self) -> Result<bool, PackageError> {
        let name = self.name.clone();
        let remote = self
            .remote
            .as_mut()
            .ok_or(PackageError::Unconfigured { name })?;

        if !remote.is_resolved() {
            remote.resolve_latest()?;
        }

        let (Some(remote_version), Some(local_version)) =
            (self.remote_version(), self.local_version())
        else {
            debug!("[PACKAGE] {}: version unknown, assuming update", self.name);
            return Ok(false);
        };

        let current = Version::parse_tag(remote_version)? <= Version::parse(local_version)?;
        debug!(
            "[PACKAGE] {}: local {} remote {} current={}",
            self.name, local_version, remote_version, current
        );
        Ok(current)
    }

    /// Returns true if the known remote version is a patch-level update of
    /// the local version. No network access.
    #[must_use]
    pub fn is_patch_update(&self) -> bool {
        let (Some(remote), Some(local)) = (self.remote_version(), self.local_version()) else {
            return false;
        };
        match (Version::parse(local), Version::parse_tag(remote)) {
            (Ok(local), Ok(remote)) => local.is_patch_update(&remote),
            _ => false,
        }
    }

    /// Downloads (unless `extracted` is given) and installs the latest
    /// version, replacing the installed one. Returns the installed path.
    pub fn update(&mut self, extracted: Option<&Path>) -> Result<PathBuf, PackageError> {
        info!("[PACKAGE] Updating {}", self.name);
        self.ctx.events.emit(LifecycleEvent::ExtensionWillUpdate {
            name: self.name.clone(),
        });

        let source = match extracted {
            Some(path) => path.to_path_buf(),
            None => self
                .remote
                .as_mut()
                .ok_or_else(|| PackageError::Unconfigured {
                    name: self.name.clone(),
                })?
                .download()?,
        };

        let fresh = Self::from_path(self.ctx.clone(), &source)?;
        let installed = fresh.install()?;

        // A renamed package leaves its old folder behind.
        if fresh.name != self.name && self.ctx.bundles.bundle_path(&self.name).is_some() {
            self.ctx.bundles.deinstall(&self.name)?;
        }

        self.name = fresh.name;
        self.path = Some(installed.clone());
        self.configure_remote()?;

        self.ctx.events.emit(LifecycleEvent::ExtensionDidUpdate {
            name: self.name.clone(),
        });
        Ok(installed)
    }

    /// Installs this package folder through the bundle host, replacing any
    /// installed package of the same name. The installed package is only
    /// removed once the new copy is in place.
    pub fn install(&self) -> Result<PathBuf, PackageError> {
        let path = self.path.as_deref().ok_or_else(|| PackageError::Missing {
            name: self.name.clone(),
        })?;

        self.ctx.events.emit(LifecycleEvent::ExtensionWillInstall {
            name: self.name.clone(),
        });

        let installed = match self.ctx.bundles.bundle_path(&self.name) {
            Some(existing) if existing == path => existing,
            _ => self.ctx.bundles.replace(&self.name, path)?,
        };

        self.ctx.events.emit(LifecycleEvent::ExtensionDidInstall {
            name: self.name.clone(),
        });
        Ok(installed)
    }
}
