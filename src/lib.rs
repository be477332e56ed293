//! extkeeper
//!
//! Keeps installed extensions up to date with the repositories they are
//! published from.
//!
//! # Architecture
//!
//! - **Version**: dotted version parsing and ordering
//! - **Repository**: latest-version resolution, archive download and
//!   package folder lookup
//! - **Package**: one installed package, its descriptor and its remote
//! - **Updates**: batch checks with a time-windowed cache
//!
//! # Usage
//!
//! ```no_run
//! use extkeeper::config::Settings;
//! use extkeeper::package::PackageContext;
//! use extkeeper::updates::UpdateChecker;
//!
//! let settings = Settings::load().expect("Failed to load settings");
//! let ctx = PackageContext::from_settings(&settings).expect("Failed to set up");
//! let mut checker = UpdateChecker::new(ctx, settings.cache_window);
//! let report = checker.check_all(false, false);
//! for package in &report.packages {
//!     println!("{} -> {:?}", package.name(), package.remote_version());
//! }
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod bundle;
pub mod config;
pub mod descriptor;
pub mod events;
pub mod logging;
pub mod package;
pub mod registry;
pub mod repository;
pub mod storage;
pub mod updates;
pub mod version;

// Re-export main types
pub use bundle::{BundleHost, DirectoryBundleHost};
pub use config::Settings;
pub use package::{LocalPackage, PackageContext, PackageError};
pub use repository::{RemoteError, RemoteRepository};
pub use updates::{CheckReport, CheckSource, UpdateChecker};
pub use version::{Version, VersionError};

/// Current crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
