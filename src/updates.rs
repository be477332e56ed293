//! Batch update checks.
//!
//! [`UpdateChecker`] finds installed packages with a newer remote version.
//! A live fetch queries every eligible package's remote and records the
//! packages needing an update in storage. Within the cache window the
//! recorded result is replayed without network access.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::package::{LocalPackage, PackageContext, PackageError};
use crate::storage::StorageError;

/// Storage key of the last successful live fetch (unix seconds).
pub const LAST_CHECKED_KEY: &str = "last_checked_at";

/// Storage key of the `{name: remote version}` map of pending updates.
pub const CACHE_KEY: &str = "cache";

/// Where the packages of a report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckSource {
    /// Remotes were queried.
    Live,
    /// Replayed from the cache.
    Cache,
    /// The live fetch failed; no packages are reported.
    Unreachable,
}

/// Result of one check.
#[derive(Debug)]
pub struct CheckReport {
    /// Packages with a newer remote version.
    pub packages: Vec<LocalPackage>,
    /// Origin of the result.
    pub source: CheckSource,
}

impl CheckReport {
    fn unreachable() -> Self {
        Self {
            packages: Vec::new(),
            source: CheckSource::Unreachable,
        }
    }

    /// Returns true if the check could not reach the remotes.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        self.source == CheckSource::Unreachable
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Names of the reported packages.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(LocalPackage::name).collect()
    }
}

/// Checks all installed packages for updates.
#[derive(Debug)]
pub struct UpdateChecker {
    ctx: PackageContext,
    cache_window: Duration,
    unreachable: bool,
}

impl UpdateChecker {
    /// Creates a checker re-fetching at most once per `cache_window`.
    #[must_use]
    pub fn new(ctx: PackageContext, cache_window: Duration) -> Self {
        Self {
            ctx,
            cache_window,
            unreachable: false,
        }
    }

    /// Returns true if the last check could not reach the remotes.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    /// Time of the last successful live fetch.
    #[must_use]
    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        let value = self.ctx.storage.get(LAST_CHECKED_KEY)?;
        let secs = value.as_f64()?;
        Utc.timestamp_opt(secs.trunc() as i64, 0).single()
    }

    /// Returns true if a live fetch succeeded within the cache window before
    /// `now`. A timestamp in the future does not count as recent.
    #[must_use]
    pub fn checked_recently(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_checked() else {
            return false;
        };
        match (now - last).to_std() {
            Ok(elapsed) => elapsed < self.cache_window,
            Err(_) => false,
        }
    }

    /// Checks for updates as of the current time.
    pub fn check_all(&mut self, force: bool, patch_only: bool) -> CheckReport {
        self.check_all_at(Utc::now(), force, patch_only)
    }

    /// Checks for updates as of `now`.
    ///
    /// Fetches live when `force` is set or the cache window has elapsed,
    /// otherwise replays the cache. With `patch_only`, only updates keeping
    /// the local major and minor version are reported.
    pub fn check_all_at(&mut self, now: DateTime<Utc>, force: bool, patch_only: bool) -> CheckReport {
        self.unreachable = false;

        let mut report = if force || !self.checked_recently(now) {
            info!("[UPDATES] Fetching updates (force={})", force);
            match self.fetch_updates(now) {
                Ok(packages) => CheckReport {
                    packages,
                    source: CheckSource::Live,
                },
                Err(e) => {
                    warn!("[UPDATES] Update check failed: {}", e);
                    self.unreachable = true;
                    CheckReport::unreachable()
                }
            }
        } else {
            debug!("[UPDATES] Checked recently, using cache");
            CheckReport {
                packages: self.cached_updates(),
                source: CheckSource::Cache,
            }
        };

        if patch_only {
            report.packages.retain(LocalPackage::is_patch_update);
        }

        info!(
            "[UPDATES] {} update(s) from {:?}",
            report.packages.len(),
            report.source
        );
        report
    }

    /// Queries every eligible package. Any failure aborts the whole fetch
    /// and leaves storage untouched.
    fn fetch_updates(&self, now: DateTime<Utc>) -> Result<Vec<LocalPackage>, PackageError> {
        let names = self.ctx.bundles.list_installed()?;
        let mut updates = Vec::new();

        for name in names {
            let mut package = LocalPackage::new(self.ctx.clone(), &name)?;
            if !package.may_update() {
                debug!("[UPDATES] Skipping {}", name);
                continue;
            }
            match package.is_current_version() {
                Ok(true) => {}
                Ok(false) => updates.push(package),
                Err(e) => {
                    warn!("[UPDATES] Checking {} failed: {}", name, e);
                    return Err(e);
                }
            }
        }

        self.store_cache(&updates, now)?;
        Ok(updates)
    }

    /// Replaces the cache with `updates` and stamps the fetch time in one
    /// write.
    fn store_cache(&self, updates: &[LocalPackage], now: DateTime<Utc>) -> Result<(), StorageError> {
        let cache: Map<String, Value> = updates
            .iter()
            .map(|p| {
                let version = p.remote_version().map_or(Value::Null, Value::from);
                (p.name().to_string(), version)
            })
            .collect();

        self.ctx.storage.set_many(vec![
            (CACHE_KEY.to_string(), Value::Object(cache)),
            (LAST_CHECKED_KEY.to_string(), Value::from(now.timestamp())),
        ])
    }

    /// Rebuilds the last live result from storage, keeping packages that
    /// are still configured.
    fn cached_updates(&self) -> Vec<LocalPackage> {
        let Some(Value::Object(cache)) = self.ctx.storage.get(CACHE_KEY) else {
            return Vec::new();
        };

        let mut packages = Vec::new();
        for (name, version) in cache {
            let mut package = match LocalPackage::new(self.ctx.clone(), &name) {
                Ok(package) => package,
                Err(e) => {
                    warn!("[UPDATES] Dropping cached {}: {}", name, e);
                    continue;
                }
            };
            let Some(remote) = package.remote_mut() else {
                continue;
            };
            remote.set_cached_version(version.as_str().map(str::to_string));
            packages.push(package);
        }
        packages
    }

    /// Updates every package of `report`, returning one result per package.
    /// Packages updated successfully are removed from the cache.
    pub fn update_all(&self, report: &mut CheckReport) -> Vec<(String, Result<(), PackageError>)> {
        let mut results = Vec::new();
        let mut done = Vec::new();

        for package in &mut report.packages {
            let name = package.name().to_string();
            let result = package.update(None).map(|_| ());
            if let Err(e) = &result {
                warn!("[UPDATES] Updating {} failed: {}", name, e);
            } else {
                done.push(name.clone());
            }
            results.push((name, result));
        }

        if !done.is_empty() {
            if let Some(Value::Object(mut cache)) = self.ctx.storage.get(CACHE_KEY) {
                cache.retain(|name, _| !done.contains(name));
                if let Err(e) = self.ctx.storage.set(CACHE_KEY, Value::Object(cache)) {
                    warn!("[UPDATES] Failed to prune cache: {}", e);
                }
            }
        }
        results
    }
}
