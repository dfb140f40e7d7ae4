//! Version model
//!
//! Versions are dot (or underscore) separated items with optional
//! pre-release and build suffixes:
//! - `1.2.3` - numeric items compare as integers (`10 > 9`)
//! - `1.2.a` - alphabetic items compare lexically
//! - `1.2` vs `1.a` - numeric items sort before alphanumeric ones
//! - `1.2-beta.1` - pre-release, sorts before `1.2`
//! - `1.2+build.5` - build metadata
//!
//! Trailing zero items do not take part in comparison or hashing, so
//! `1.0 == 1.0.0`, while the original text is kept for display.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A single version item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionItem {
    Number(u64),
    Text(String),
}

impl VersionItem {
    fn parse(item: &str) -> Self {
        if !item.is_empty() && item.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = item.parse::<u64>() {
                return Self::Number(number);
            }
        }
        Self::Text(item.to_string())
    }

    fn is_zero(&self) -> bool {
        matches!(self, Self::Number(0))
    }
}

impl Ord for VersionItem {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            // Numbers sort before text
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for VersionItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

fn split_items(part: &str) -> Vec<VersionItem> {
    if part.is_empty() {
        return Vec::new();
    }
    part.split(['.', '_']).map(VersionItem::parse).collect()
}

/// Items with trailing zeros removed
fn significant(items: &[VersionItem]) -> &[VersionItem] {
    let len = items
        .iter()
        .rposition(|item| !item.is_zero())
        .map_or(0, |pos| pos + 1);
    &items[..len]
}

/// A package version
///
/// Parsing never fails: anything that is not made of recognizable
/// items becomes an opaque text item that still orders deterministically.
#[derive(Debug, Clone)]
pub struct Version {
    value: String,
    main: Vec<VersionItem>,
    pre: Option<Vec<VersionItem>>,
    build: Option<Vec<VersionItem>>,
}

impl Version {
    /// Parse a version string
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let (rest, build) = match value.split_once('+') {
            Some((rest, build)) => (rest, Some(split_items(build))),
            None => (value, None),
        };
        let (main, pre) = match rest.split_once('-') {
            Some((main, pre)) => (main, Some(split_items(pre))),
            None => (rest, None),
        };

        Self {
            value: value.to_string(),
            main: split_items(main),
            pre,
            build,
        }
    }

    /// Original text of the version
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Main items, before any pre-release or build suffix
    #[must_use]
    pub fn main(&self) -> &[VersionItem] {
        &self.main
    }

    /// Whether this is a pre-release version
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Item at `index`, treating missing items as zero
    #[must_use]
    pub fn item(&self, index: usize) -> VersionItem {
        self.main
            .get(index)
            .cloned()
            .unwrap_or(VersionItem::Number(0))
    }

    /// Whether the leading item is a numeric zero (or missing)
    #[must_use]
    pub fn is_major_zero(&self) -> bool {
        self.item(0).is_zero()
    }

    /// `1.Y.Z` projection used by `major_mode`
    #[must_use]
    pub fn major_mode(&self) -> String {
        format!("{}.Y.Z", self.item(0))
    }

    /// `1.2.Z` projection used by `minor_mode`
    #[must_use]
    pub fn minor_mode(&self) -> String {
        format!("{}.{}.Z", self.item(0), self.item(1))
    }

    /// `1.2.3` projection used by `patch_mode`
    #[must_use]
    pub fn patch_mode(&self) -> String {
        format!("{}.{}.{}", self.item(0), self.item(1), self.item(2))
    }

    /// Semver-style projection: major only, unless the major is zero
    #[must_use]
    pub fn semver_mode(&self) -> String {
        if self.is_major_zero() {
            self.value.clone()
        } else {
            self.major_mode()
        }
    }

    /// Lowest version above every version sharing the items up to `index`
    ///
    /// The item at `index` is bumped, everything after it dropped, and the
    /// result carries an empty pre-release marker so it also sorts below
    /// the pre-releases of the bumped version. Returns `None` when the item
    /// at `index` is not numeric.
    #[must_use]
    pub fn upper_bound(&self, index: usize) -> Option<Self> {
        let mut items: Vec<u64> = Vec::with_capacity(index + 1);
        for i in 0..=index {
            match self.item(i) {
                VersionItem::Number(n) => items.push(n),
                VersionItem::Text(_) => return None,
            }
        }
        let last = items.last_mut()?;
        *last = last.checked_add(1)?;
        let text = items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        Some(Self::parse(&format!("{text}-")))
    }

    /// The same version carrying an empty pre-release marker
    ///
    /// This is the lowest possible version sharing these main items.
    #[must_use]
    pub fn lowest_prerelease(&self) -> Self {
        if self.pre.is_some() {
            return self.clone();
        }
        Self {
            value: format!("{}-", self.value),
            main: self.main.clone(),
            pre: Some(Vec::new()),
            build: None,
        }
    }

    fn compare_pre(a: Option<&Vec<VersionItem>>, b: Option<&Vec<VersionItem>>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            // A release sorts after any of its pre-releases
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => significant(a).cmp(significant(b)),
        }
    }

    fn compare_build(a: Option<&Vec<VersionItem>>, b: Option<&Vec<VersionItem>>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => significant(a).cmp(significant(b)),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        significant(&self.main)
            .cmp(significant(&other.main))
            .then_with(|| Self::compare_pre(self.pre.as_ref(), other.pre.as_ref()))
            .then_with(|| Self::compare_build(self.build.as_ref(), other.build.as_ref()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        significant(&self.main).hash(state);
        self.pre.as_deref().map(significant).hash(state);
        self.build.as_deref().map(significant).hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for Version {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    #[test]
    fn test_numeric_items_compare_as_integers() {
        assert!(v("10") > v("9"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("1.2.3") < v("1.2.10"));
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0.0.0"));
        assert_eq!(v("1.0").to_string(), "1.0");
        assert_eq!(v("1.0.0").to_string(), "1.0.0");
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("1.0-beta") < v("1.0"));
        assert!(v("1.0-alpha") < v("1.0-beta"));
        assert!(v("1.0-") < v("1.0-alpha"));
        assert!(v("0.9") < v("1.0-alpha"));
    }

    #[test]
    fn test_alpha_and_mixed_items() {
        assert!(v("1.a") < v("1.b"));
        assert!(v("1.2") < v("1.2.a"));
        assert!(v("1.10") < v("1.9a"));
        assert!(v("1.99") < v("1.1a"));
    }

    #[test]
    fn test_unparseable_is_opaque() {
        let latest = v("latest");
        assert_eq!(latest.main(), &[VersionItem::Text("latest".into())]);
        assert!(v("latest") > v("beta"));
    }

    #[test]
    fn test_underscore_separator() {
        assert_eq!(v("1_2_3"), v("1.2.3"));
    }

    #[test]
    fn test_mode_projections() {
        let version = v("1.2.3");
        assert_eq!(version.major_mode(), "1.Y.Z");
        assert_eq!(version.minor_mode(), "1.2.Z");
        assert_eq!(version.patch_mode(), "1.2.3");
        assert_eq!(v("1").minor_mode(), "1.0.Z");
        assert_eq!(v("0.3.1").semver_mode(), "0.3.1");
        assert_eq!(v("2.3.1").semver_mode(), "2.Y.Z");
    }

    #[test]
    fn test_upper_bound() {
        let bound = v("1.2.3").upper_bound(1).unwrap();
        assert_eq!(bound.to_string(), "1.3-");
        assert!(bound < v("1.3-alpha"));
        assert!(bound > v("1.2.99"));
        assert_eq!(v("1").upper_bound(1).unwrap().to_string(), "1.1-");
        assert!(v("1.a").upper_bound(1).is_none());
    }

    #[test]
    fn test_build_metadata() {
        assert!(v("1.0+1") > v("1.0"));
        assert!(v("1.0+2") > v("1.0+1"));
        assert_ne!(v("1.0+1"), v("1.0"));
    }
}
