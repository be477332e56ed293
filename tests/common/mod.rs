//! Shared fixtures for integration tests.
//!
//! [`FakeHost`] serves tags, raw files and archives from memory and counts
//! every network call it receives.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use extkeeper::bundle::DirectoryBundleHost;
use extkeeper::descriptor::PlistDescriptorReader;
use extkeeper::events::{EventSink, NullSink};
use extkeeper::package::PackageContext;
use extkeeper::repository::{RemoteError, RemoteOptions, RepoId, RepositoryHost, Tag};
use extkeeper::storage::Storage;
use zip::write::SimpleFileOptions;

pub const SUFFIX: &str = ".roboFontExt";
pub const ARCHIVE_HOST: &str = "https://archive.test";

/// In-memory repository host.
#[derive(Default)]
pub struct FakeHost {
    tags: Mutex<HashMap<String, Vec<Tag>>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    archives: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers tags for `repo`; each tag's archive lives at
    /// [`FakeHost::tag_url`].
    pub fn set_tags(&self, repo: &str, names: &[&str]) {
        let tags = names
            .iter()
            .map(|name| Tag {
                name: (*name).to_string(),
                zip_url: Self::tag_url(repo, name),
            })
            .collect();
        self.tags.lock().unwrap().insert(repo.to_string(), tags);
    }

    pub fn tag_url(repo: &str, tag: &str) -> String {
        format!("{}/{}/zipball/{}", ARCHIVE_HOST, repo, tag)
    }

    pub fn branch_url(repo: &str, branch: &str) -> String {
        format!("{}/{}/archive/{}.zip", ARCHIVE_HOST, repo, branch)
    }

    pub fn put_file(&self, repo: &str, branch: &str, path: &str, body: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(format!("{}:{}/{}", repo, branch, path), body.as_bytes().to_vec());
    }

    pub fn put_archive(&self, url: &str, bytes: Vec<u8>) {
        self.archives.lock().unwrap().insert(url.to_string(), bytes);
    }

    /// Makes every subsequent call fail as unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of network calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, url: &str) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn not_found(url: &str) -> RemoteError {
        RemoteError::Unreachable {
            url: url.to_string(),
            reason: "HTTP 404 Not Found".to_string(),
        }
    }
}

impl RepositoryHost for FakeHost {
    fn list_tags(&self, repo: &RepoId) -> Result<Vec<Tag>, RemoteError> {
        let key = repo.to_string();
        self.enter(&key)?;
        Ok(self.tags.lock().unwrap().get(&key).cloned().unwrap_or_default())
    }

    fn fetch_file(&self, repo: &RepoId, branch: &str, path: &str) -> Result<Vec<u8>, RemoteError> {
        let key = format!("{}:{}/{}", repo, branch, path);
        self.enter(&key)?;
        self.files
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(&key))
    }

    fn branch_archive_url(&self, repo: &RepoId, branch: &str) -> String {
        Self::branch_url(&repo.to_string(), branch)
    }

    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64, RemoteError> {
        self.enter(url)?;
        let bytes = self
            .archives
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Self::not_found(url))?;
        dest.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// XML property list with string values.
pub fn plist(entries: &[(&str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(k, v)| format!("<key>{}</key><string>{}</string>", k, v))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0"><dict>{}</dict></plist>"#,
        body
    )
}

/// Zip archive holding `files` (path, contents).
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Installs `<name>.roboFontExt` with an `info.plist` under `root`.
pub fn install_package(root: &Path, name: &str, version: &str, repository: Option<&str>) -> PathBuf {
    let dir = root.join(format!("{}{}", name, SUFFIX));
    fs::create_dir_all(&dir).unwrap();
    let mut entries = vec![("version", version)];
    if let Some(repository) = repository {
        entries.push(("repository", repository));
    }
    fs::write(dir.join("info.plist"), plist(&entries)).unwrap();
    dir
}

/// Workspace with extension, scratch and storage locations.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().unwrap(),
        }
    }

    pub fn extensions(&self) -> PathBuf {
        self.dir.path().join("extensions")
    }

    pub fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    pub fn storage_path(&self) -> PathBuf {
        self.dir.path().join("storage.json")
    }

    pub fn options(&self) -> RemoteOptions {
        RemoteOptions {
            default_branch: "master".to_string(),
            package_suffix: SUFFIX.to_string(),
            scratch_root: self.scratch(),
        }
    }

    pub fn context(
        &self,
        host: Arc<FakeHost>,
        storage: Arc<dyn Storage>,
        events: Option<Arc<dyn EventSink>>,
    ) -> PackageContext {
        PackageContext {
            bundles: Arc::new(DirectoryBundleHost::new(self.extensions(), SUFFIX)),
            repositories: host,
            storage,
            descriptors: Arc::new(PlistDescriptorReader),
            events: events.unwrap_or_else(|| Arc::new(NullSink)),
            options: self.options(),
        }
    }
}
