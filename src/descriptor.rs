//! Package descriptor parsing.
//!
//! Every package carries an `info.plist` property list declaring at least
//! its version and, optionally, the repository it is published from and the
//! subpath of the package folder inside that repository.

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use plist::{Dictionary, Value};
use thiserror::Error;

/// Descriptor file name inside a package folder.
pub const DESCRIPTOR_FILE: &str = "info.plist";

/// Keys holding the source repository, in lookup order.
pub const REPOSITORY_KEYS: [&str; 2] = ["com.robofontmechanic.repository", "repository"];

/// Key holding the package subpath inside the repository.
pub const EXTENSION_PATH_KEY: &str = "extensionPath";

/// Errors raised while reading a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The property list could not be parsed.
    #[error("Invalid property list: {0}")]
    Plist(#[from] plist::Error),

    /// The property list root is not a dictionary.
    #[error("Descriptor root is not a dictionary")]
    NotADictionary,
}

/// Contents of a package descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    /// Declared package name.
    pub name: Option<String>,
    /// Declared version string.
    pub version: Option<String>,
    /// Source repository in `owner/name` form.
    pub repository: Option<String>,
    /// Package folder location inside the repository.
    pub extension_path: Option<String>,
}

impl Descriptor {
    /// Parses a descriptor from property list bytes (XML or binary).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let value = Value::from_reader(Cursor::new(bytes))?;
        let dictionary = value
            .into_dictionary()
            .ok_or(DescriptorError::NotADictionary)?;
        Ok(Self::from_dictionary(&dictionary))
    }

    /// Builds a descriptor from a parsed dictionary. Absent or empty keys
    /// yield `None`.
    #[must_use]
    pub fn from_dictionary(dictionary: &Dictionary) -> Self {
        Self {
            name: string_value(dictionary, "name"),
            version: string_value(dictionary, "version"),
            repository: REPOSITORY_KEYS
                .iter()
                .find_map(|key| string_value(dictionary, key)),
            extension_path: string_value(dictionary, EXTENSION_PATH_KEY),
        }
    }

    /// Returns true if a source repository is declared.
    #[must_use]
    pub fn has_repository(&self) -> bool {
        self.repository.is_some()
    }
}

/// Reads a string-like value. Numbers are rendered as text since some
/// descriptors store versions as reals.
fn string_value(dictionary: &Dictionary, key: &str) -> Option<String> {
    let text = match dictionary.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Reads the descriptor of an installed or extracted package.
pub trait DescriptorReader: Send + Sync {
    /// Returns the descriptor of the package at `package_path`, or `None`
    /// if the package has none.
    fn read_descriptor(&self, package_path: &Path) -> Result<Option<Descriptor>, DescriptorError>;
}

/// Reads `<package>/info.plist`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlistDescriptorReader;

impl DescriptorReader for PlistDescriptorReader {
    fn read_descriptor(&self, package_path: &Path) -> Result<Option<Descriptor>, DescriptorError> {
        let path = package_path.join(DESCRIPTOR_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Descriptor::from_bytes(&bytes).map(Some)
    }
}
