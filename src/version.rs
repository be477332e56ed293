//! Dotted version parsing and ordering.
//!
//! Versions are sequences of non-negative integers separated by dots.
//! Missing trailing components compare as zero, so `1.2` equals `1.2.0`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The input is empty or contains a non-numeric component.
    #[error("Invalid version format: '{input}'")]
    InvalidFormat {
        /// The rejected input.
        input: String,
    },
}

/// A parsed dotted version such as `1.10.2`.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    /// Parses a dotted version string.
    ///
    /// Empty input, empty components and non-numeric components fail.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidFormat {
            input: input.to_string(),
        };

        if input.is_empty() {
            return Err(invalid());
        }

        let components = input
            .split('.')
            .map(|segment| {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                segment.parse::<u64>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { components })
    }

    /// Parses a tag name, which may carry a single leading `v` or `V`
    /// (`v1.2.0`).
    pub fn parse_tag(name: &str) -> Result<Self, VersionError> {
        let body = name
            .strip_prefix('v')
            .or_else(|| name.strip_prefix('V'))
            .unwrap_or(name);
        Self::parse(body).map_err(|_| VersionError::InvalidFormat {
            input: name.to_string(),
        })
    }

    /// Returns the parsed components.
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Returns the component at `index`, or zero when absent.
    #[must_use]
    pub fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }

    /// Major component.
    #[must_use]
    pub fn major(&self) -> u64 {
        self.component(0)
    }

    /// Minor component.
    #[must_use]
    pub fn minor(&self) -> u64 {
        self.component(1)
    }

    /// Patch component.
    #[must_use]
    pub fn patch(&self) -> u64 {
        self.component(2)
    }

    /// Returns true if `newer` differs from `self` only by a greater patch
    /// level: major and minor are equal and `newer` is strictly greater.
    #[must_use]
    pub fn is_patch_update(&self, newer: &Version) -> bool {
        newer.major() == self.major() && newer.minor() == self.minor() && newer > self
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .components
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{}", text)
    }
}

/// Compares two version strings.
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_components() {
        let version = Version::parse("1.10.2").unwrap();
        assert_eq!(version.components(), &[1, 10, 2]);
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 10);
        assert_eq!(version.patch(), 2);
    }

    #[test]
    fn test_parse_is_strict() {
        for input in ["v2.0", "V2.0", " 3 ", "3 "] {
            assert!(Version::parse(input).is_err(), "expected failure for {:?}", input);
        }
    }

    #[test]
    fn test_parse_tag_strips_one_v() {
        assert_eq!(Version::parse_tag("v2.0").unwrap().components(), &[2, 0]);
        assert_eq!(Version::parse_tag("V1").unwrap().components(), &[1]);
        assert_eq!(Version::parse_tag("1.4").unwrap().components(), &[1, 4]);
        assert!(matches!(
            Version::parse_tag("vv1"),
            Err(VersionError::InvalidFormat { input }) if input == "vv1"
        ));
        assert!(Version::parse_tag("v").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "v", "1.a.2", "1..2", "1.2.", ".1", "1.2-beta", "-1", "latest"] {
            assert!(
                matches!(Version::parse(input), Err(VersionError::InvalidFormat { .. })),
                "expected failure for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_zero_padding_equality() {
        assert_eq!(compare("1.2", "1.2.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("1", "1.0.0.0").unwrap(), Ordering::Equal);
        assert_eq!(Version::parse("1.2").unwrap(), Version::parse("1.2.0").unwrap());
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        assert_eq!(compare("1.10.0", "1.9.0").unwrap(), Ordering::Greater);
        assert_eq!(compare("0.9.0", "1.5.0").unwrap(), Ordering::Less);
        assert_eq!(compare("1.2.1", "1.2").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_compare_propagates_errors() {
        assert!(compare("1.0", "x").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Version::parse("1.02.3").unwrap().to_string(), "1.2.3");
    }

    #[test]
    fn test_is_patch_update() {
        let local = Version::parse("1.2.3").unwrap();
        assert!(local.is_patch_update(&Version::parse("1.2.4").unwrap()));
        assert!(!local.is_patch_update(&Version::parse("1.3.0").unwrap()));
        assert!(!local.is_patch_update(&Version::parse("2.2.4").unwrap()));
        assert!(!local.is_patch_update(&Version::parse("1.2.3").unwrap()));
        assert!(!local.is_patch_update(&Version::parse("1.2.2").unwrap()));
    }

    fn version_strategy() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(0u64..20, 1..5)
    }

    fn render(components: &[u64]) -> String {
        components
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    proptest! {
        #[test]
        fn prop_trailing_zeros_are_equal(base in version_strategy(), zeros in 0usize..4) {
            let mut padded = base.clone();
            padded.extend(std::iter::repeat_n(0, zeros));
            let a = Version::parse(&render(&base)).unwrap();
            let b = Version::parse(&render(&padded)).unwrap();
            prop_assert_eq!(a.cmp(&b), Ordering::Equal);
        }

        #[test]
        fn prop_antisymmetric(a in version_strategy(), b in version_strategy()) {
            let a = Version::parse(&render(&a)).unwrap();
            let b = Version::parse(&render(&b)).unwrap();
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        #[test]
        fn prop_transitive(a in version_strategy(), b in version_strategy(), c in version_strategy()) {
            let a = Version::parse(&render(&a)).unwrap();
            let b = Version::parse(&render(&b)).unwrap();
            let c = Version::parse(&render(&c)).unwrap();
            if a <= b && b <= c {
                prop_assert!(a <= c);
            }
        }
    }
}
