//! Host bundle system.
//!
//! The engine never touches installed packages directly; it goes through a
//! [`BundleHost`]. [`DirectoryBundleHost`] keeps each package as a
//! `<name><suffix>` folder inside one directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by a bundle host.
#[derive(Debug, Error)]
pub enum HostError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The source to install is not a package folder.
    #[error("Not a package folder: {}", .0.display())]
    NotAPackage(PathBuf),

    /// No installed package has this name.
    #[error("Package not installed: {0}")]
    NotInstalled(String),

    /// A package with this name is still installed.
    #[error("Package already installed: {0}")]
    AlreadyInstalled(String),
}

/// Installs, removes and enumerates packages.
pub trait BundleHost: Send + Sync {
    /// Names of all installed packages, sorted.
    fn list_installed(&self) -> Result<Vec<String>, HostError>;

    /// Location of the installed package `name`, if installed.
    fn bundle_path(&self, name: &str) -> Option<PathBuf>;

    /// Installs the package folder at `source` and returns its new location.
    fn install(&self, source: &Path) -> Result<PathBuf, HostError>;

    /// Installs the folder at `source` as package `name`, replacing any
    /// installed package of that name. The installed package stays in place
    /// until the new copy is complete.
    fn replace(&self, name: &str, source: &Path) -> Result<PathBuf, HostError>;

    /// Removes the installed package `name`.
    fn deinstall(&self, name: &str) -> Result<(), HostError>;
}

/// Packages stored as folders under a single root.
#[derive(Debug, Clone)]
pub struct DirectoryBundleHost {
    /// Directory holding installed packages.
    root: PathBuf,
    /// Package folder suffix.
    suffix: String,
}

impl DirectoryBundleHost {
    /// Creates a host over `root`. The directory is created on first
    /// install.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }

    /// Directory holding installed packages.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, self.suffix))
    }

    fn hidden_folder(&self, name: &str, kind: &str) -> PathBuf {
        self.root.join(format!(".{}{}.{}", name, self.suffix, kind))
    }

    /// Copies `source` into a hidden staging folder next to the target.
    fn stage(&self, name: &str, source: &Path) -> Result<PathBuf, HostError> {
        fs::create_dir_all(&self.root)?;

        let staging = self.hidden_folder(name, "staging");
        if staging.exists() {
            warn!("[BUNDLE] Removing leftover staging folder {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }

        if let Err(e) = copy_dir_recursive(source, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }
        Ok(staging)
    }

    /// Package name for a folder name, if it carries the suffix.
    fn package_name<'a>(&self, folder: &'a str) -> Option<&'a str> {
        folder
            .strip_suffix(self.suffix.as_str())
            .filter(|name| !name.is_empty() && !name.starts_with('.'))
    }
}

impl BundleHost for DirectoryBundleHost {
    fn list_installed(&self) -> Result<Vec<String>, HostError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let folder = entry.file_name().to_string_lossy().into_owned();
                self.package_name(&folder).map(str::to_string)
            })
            .collect();
        names.sort();

        debug!("[BUNDLE] {} installed package(s)", names.len());
        Ok(names)
    }

    fn bundle_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.folder_for(name);
        path.is_dir().then_some(path)
    }

    fn install(&self, source: &Path) -> Result<PathBuf, HostError> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .and_then(|folder| self.package_name(&folder).map(str::to_string))
            .filter(|_| source.is_dir())
            .ok_or_else(|| HostError::NotAPackage(source.to_path_buf()))?;

        let target = self.folder_for(&name);
        if target.exists() {
            return Err(HostError::AlreadyInstalled(name));
        }

        let staging = self.stage(&name, source)?;
        if let Err(e) = fs::rename(&staging, &target) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }

        info!("[BUNDLE] Installed {} at {}", name, target.display());
        Ok(target)
    }

    fn replace(&self, name: &str, source: &Path) -> Result<PathBuf, HostError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(HostError::NotAPackage(source.to_path_buf()));
        }
        if !source.is_dir() {
            return Err(HostError::NotAPackage(source.to_path_buf()));
        }

        let target = self.folder_for(name);
        let staging = self.stage(name, source)?;

        let backup = self.hidden_folder(name, "previous");
        let had_previous = target.exists();
        if had_previous {
            if let Err(e) = move_aside(&target, &backup) {
                let _ = fs::remove_dir_all(&staging);
                return Err(e.into());
            }
        }

        if let Err(e) = fs::rename(&staging, &target) {
            if had_previous {
                if let Err(restore) = fs::rename(&backup, &target) {
                    warn!("[BUNDLE] Failed to restore {}: {}", name, restore);
                }
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&backup) {
                warn!("[BUNDLE] Failed to remove {}: {}", backup.display(), e);
            }
        }

        info!("[BUNDLE] Replaced {} at {}", name, target.display());
        Ok(target)
    }

    fn deinstall(&self, name: &str) -> Result<(), HostError> {
        let path = self
            .bundle_path(name)
            .ok_or_else(|| HostError::NotInstalled(name.to_string()))?;
        fs::remove_dir_all(&path)?;
        info!("[BUNDLE] Removed {}", name);
        Ok(())
    }
}

/// Renames `path` to `backup`, dropping any stale backup first.
fn move_aside(path: &Path, backup: &Path) -> io::Result<()> {
    if backup.exists() {
        fs::remove_dir_all(backup)?;
    }
    fs::rename(path, backup)
}

/// Recursively copies a directory.
fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SUFFIX: &str = ".roboFontExt";

    fn make_package(dir: &Path, folder: &str) -> PathBuf {
        let path = dir.join(folder);
        fs::create_dir_all(path.join("lib")).unwrap();
        fs::write(path.join("info.plist"), "<plist/>").unwrap();
        fs::write(path.join("lib/main.py"), "print('hi')").unwrap();
        path
    }

    #[test]
    fn test_list_installed() {
        let dir = TempDir::new().unwrap();
        make_package(dir.path(), "B.roboFontExt");
        make_package(dir.path(), "A.roboFontExt");
        make_package(dir.path(), "NotAPackage");
        make_package(dir.path(), ".A.roboFontExt.staging");
        fs::write(dir.path().join("C.roboFontExt"), "file").unwrap();

        let host = DirectoryBundleHost::new(dir.path(), SUFFIX);
        assert_eq!(host.list_installed().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_list_missing_root() {
        let dir = TempDir::new().unwrap();
        let host = DirectoryBundleHost::new(dir.path().join("absent"), SUFFIX);
        assert!(host.list_installed().unwrap().is_empty());
    }

    #[test]
    fn test_install_and_deinstall() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let package = make_package(src.path(), "MyPkg.roboFontExt");
        let host = DirectoryBundleHost::new(dst.path().join("ext"), SUFFIX);

        let installed = host.install(&package).unwrap();

        assert_eq!(installed, dst.path().join("ext/MyPkg.roboFontExt"));
        assert!(installed.join("lib/main.py").is_file());
        assert!(!dst.path().join("ext/.MyPkg.roboFontExt.staging").exists());
        assert_eq!(host.bundle_path("MyPkg"), Some(installed.clone()));

        host.deinstall("MyPkg").unwrap();
        assert!(!installed.exists());
        assert!(host.bundle_path("MyPkg").is_none());
    }

    #[test]
    fn test_install_refuses_existing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let package = make_package(src.path(), "MyPkg.roboFontExt");
        let host = DirectoryBundleHost::new(dst.path(), SUFFIX);

        host.install(&package).unwrap();
        assert!(matches!(
            host.install(&package),
            Err(HostError::AlreadyInstalled(name)) if name == "MyPkg"
        ));
    }

    #[test]
    fn test_install_rejects_non_package() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let folder = make_package(src.path(), "plain");
        let host = DirectoryBundleHost::new(dst.path(), SUFFIX);

        assert!(matches!(host.install(&folder), Err(HostError::NotAPackage(_))));
        assert!(matches!(
            host.install(&src.path().join("Missing.roboFontExt")),
            Err(HostError::NotAPackage(_))
        ));
    }

    #[test]
    fn test_replace_swaps_installed_package() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let host = DirectoryBundleHost::new(dst.path(), SUFFIX);
        host.install(&make_package(src.path(), "MyPkg.roboFontExt")).unwrap();

        let fresh = make_package(src.path(), "checkout");
        fs::write(fresh.join("NEW"), "2").unwrap();

        let installed = host.replace("MyPkg", &fresh).unwrap();

        assert_eq!(installed, dst.path().join("MyPkg.roboFontExt"));
        assert!(installed.join("NEW").is_file());
        assert_eq!(host.list_installed().unwrap(), vec!["MyPkg"]);
        assert!(!dst.path().join(".MyPkg.roboFontExt.previous").exists());
        assert!(!dst.path().join(".MyPkg.roboFontExt.staging").exists());
    }

    #[test]
    fn test_replace_without_installed_package() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let host = DirectoryBundleHost::new(dst.path().join("ext"), SUFFIX);

        let installed = host.replace("MyPkg", &make_package(src.path(), "MyPkg")).unwrap();
        assert!(installed.join("lib/main.py").is_file());
    }

    #[test]
    fn test_failed_replace_keeps_installed_package() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let host = DirectoryBundleHost::new(dst.path(), SUFFIX);
        let installed = host.install(&make_package(src.path(), "MyPkg.roboFontExt")).unwrap();

        assert!(matches!(
            host.replace("MyPkg", &src.path().join("missing")),
            Err(HostError::NotAPackage(_))
        ));
        assert!(matches!(
            host.replace("../escape", &src.path().join("MyPkg.roboFontExt")),
            Err(HostError::NotAPackage(_))
        ));
        assert!(installed.join("lib/main.py").is_file());
        assert_eq!(host.list_installed().unwrap(), vec!["MyPkg"]);
    }

    #[test]
    fn test_deinstall_missing() {
        let dir = TempDir::new().unwrap();
        let host = DirectoryBundleHost::new(dir.path(), SUFFIX);
        assert!(matches!(
            host.deinstall("Nope"),
            Err(HostError::NotInstalled(_))
        ));
    }
}
