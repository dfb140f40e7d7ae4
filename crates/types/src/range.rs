//! Version range parsing and matching
//!
//! Range expressions are written inside brackets in requirements
//! (`zlib/[>=1.2 <2]`) and support:
//! - `>=1.2`, `>1.2`, `<=2.0`, `<2.0` - bounds
//! - `=1.2.3`, `==1.2.3`, bare `1.2.3` - exact version
//! - `!=1.5` - exclude version
//! - `~1.2` - same minor (`>=1.2 <1.3-`)
//! - `^1.2` - same first non-zero item (`>=1.2 <2-`)
//! - `*` or empty - any version
//! - `a || b` - alternatives
//! - `include_prerelease` - allow pre-release candidates
//!
//! Conditions inside an alternative are separated by spaces or commas.

use crate::Version;
use kiln_errors::VersionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const INCLUDE_PRERELEASE: &str = "include_prerelease";

/// A single version condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Exact(Version),
    GreaterEqual(Version),
    LessEqual(Version),
    Greater(Version),
    Less(Version),
    NotEqual(Version),
}

impl Condition {
    /// Check if a version satisfies this condition
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Exact(v) => version == v,
            Self::GreaterEqual(v) => version >= v,
            Self::LessEqual(v) => version <= v,
            Self::Greater(v) => version > v,
            Self::Less(v) => version < v,
            Self::NotEqual(v) => version != v,
        }
    }

    /// Parse one condition token into one or two conditions
    fn parse(token: &str, input: &str) -> Result<Vec<Self>, VersionError> {
        let invalid = |reason: &str| VersionError::InvalidRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (op, rest) = [">=", "<=", "==", "!=", ">", "<", "=", "~", "^"]
            .iter()
            .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
            .unwrap_or(("", token));

        if rest.is_empty() {
            return Err(invalid(&format!("operator '{op}' has no version")));
        }
        if let Some(bad) = rest
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+')))
        {
            return Err(invalid(&format!("unexpected character '{bad}' in '{token}'")));
        }

        let version = Version::parse(rest);
        let conditions = match op {
            ">=" => vec![Self::GreaterEqual(version)],
            ">" => vec![Self::Greater(version)],
            "<=" => vec![Self::LessEqual(version)],
            // `<2.0` also rejects the pre-releases of 2.0
            "<" => vec![Self::Less(version.lowest_prerelease())],
            "!=" => vec![Self::NotEqual(version)],
            "~" => {
                let index = usize::from(version.main().len() > 1);
                let upper = version.upper_bound(index).ok_or_else(|| {
                    invalid(&format!("cannot derive an upper bound for '{token}'"))
                })?;
                vec![Self::GreaterEqual(version), Self::Less(upper)]
            }
            "^" => {
                let main = version.main();
                let index = main
                    .iter()
                    .position(|item| *item != crate::VersionItem::Number(0))
                    .unwrap_or(main.len().saturating_sub(1));
                let upper = version.upper_bound(index).ok_or_else(|| {
                    invalid(&format!("cannot derive an upper bound for '{token}'"))
                })?;
                vec![Self::GreaterEqual(version), Self::Less(upper)]
            }
            _ => vec![Self::Exact(version)],
        };
        Ok(conditions)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "={v}"),
            Self::GreaterEqual(v) => write!(f, ">={v}"),
            Self::LessEqual(v) => write!(f, "<={v}"),
            Self::Greater(v) => write!(f, ">{v}"),
            Self::Less(v) => write!(f, "<{v}"),
            Self::NotEqual(v) => write!(f, "!={v}"),
        }
    }
}

/// Conditions that must all hold; empty means any version
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    fn matches(&self, version: &Version) -> bool {
        self.conditions.iter().all(|c| c.matches(version))
    }

    /// Whether some version can satisfy every condition
    fn is_satisfiable(&self) -> bool {
        if let Some(exact) = self.conditions.iter().find_map(|c| match c {
            Condition::Exact(v) => Some(v),
            _ => None,
        }) {
            return self.matches(exact);
        }

        let mut lower: Option<(&Version, bool)> = None;
        let mut upper: Option<(&Version, bool)> = None;
        for condition in &self.conditions {
            match condition {
                Condition::GreaterEqual(v) | Condition::Greater(v) => {
                    let inclusive = matches!(condition, Condition::GreaterEqual(_));
                    let tighter = match lower {
                        None => true,
                        Some((current, current_inclusive)) => {
                            v > current || (v == current && current_inclusive && !inclusive)
                        }
                    };
                    if tighter {
                        lower = Some((v, inclusive));
                    }
                }
                Condition::LessEqual(v) | Condition::Less(v) => {
                    let inclusive = matches!(condition, Condition::LessEqual(_));
                    let tighter = match upper {
                        None => true,
                        Some((current, current_inclusive)) => {
                            v < current || (v == current && current_inclusive && !inclusive)
                        }
                    };
                    if tighter {
                        upper = Some((v, inclusive));
                    }
                }
                Condition::Exact(_) | Condition::NotEqual(_) => {}
            }
        }

        match (lower, upper) {
            (Some((low, low_inclusive)), Some((high, high_inclusive))) => {
                if low < high {
                    true
                } else if low == high && low_inclusive && high_inclusive {
                    // A single admissible version must not be excluded
                    !self
                        .conditions
                        .iter()
                        .any(|c| matches!(c, Condition::NotEqual(v) if v == low))
                } else {
                    false
                }
            }
            _ => true,
        }
    }
}

impl fmt::Display for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "*");
        }
        let parts: Vec<_> = self.conditions.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// A version range: alternatives of condition sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    expression: String,
    alternatives: Vec<ConditionSet>,
    include_prerelease: bool,
}

impl VersionRange {
    /// Parse a range expression, with or without surrounding brackets
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidRange` for unbalanced brackets,
    /// dangling operators, empty alternatives or unexpected characters.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = |reason: &str| VersionError::InvalidRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let expression = match (trimmed.strip_prefix('['), trimmed.strip_suffix(']')) {
            (Some(_), Some(_)) if trimmed.len() >= 2 => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(invalid("unbalanced brackets")),
        };
        if expression.contains(['[', ']']) {
            return Err(invalid("nested brackets"));
        }

        let raw_alternatives: Vec<&str> = expression.split("||").collect();
        let mut alternatives = Vec::with_capacity(raw_alternatives.len());
        let mut include_prerelease = false;

        for raw in &raw_alternatives {
            let tokens: Vec<&str> = raw
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .collect();

            if tokens.is_empty() && raw_alternatives.len() > 1 {
                return Err(invalid("empty alternative"));
            }

            let mut set = ConditionSet::default();
            let mut iter = tokens.into_iter();
            while let Some(token) = iter.next() {
                if token == INCLUDE_PRERELEASE {
                    include_prerelease = true;
                    continue;
                }
                if token == "*" {
                    continue;
                }
                // `>= 1.2` is written with a space between operator and version
                let token = if token.chars().all(|c| "<>=!~^".contains(c)) {
                    let version = iter
                        .next()
                        .ok_or_else(|| invalid(&format!("operator '{token}' has no version")))?;
                    format!("{token}{version}")
                } else {
                    token.to_string()
                };
                set.conditions.extend(Condition::parse(&token, input)?);
            }
            alternatives.push(set);
        }

        Ok(Self {
            expression: expression.trim().to_string(),
            alternatives,
            include_prerelease,
        })
    }

    /// Range matching every version
    #[must_use]
    pub fn any() -> Self {
        Self {
            expression: String::new(),
            alternatives: vec![ConditionSet::default()],
            include_prerelease: false,
        }
    }

    /// Check whether a version is inside the range
    ///
    /// Pre-release versions only match when the range carries
    /// `include_prerelease` or the caller allows pre-releases globally.
    #[must_use]
    pub fn contains(&self, version: &Version, resolve_prereleases: bool) -> bool {
        if version.is_prerelease() && !(self.include_prerelease || resolve_prereleases) {
            return false;
        }
        self.alternatives.iter().any(|set| set.matches(version))
    }

    /// Pick the highest candidate inside the range
    #[must_use]
    pub fn select<'a, I>(&self, candidates: I, resolve_prereleases: bool) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates
            .into_iter()
            .filter(|v| self.contains(v, resolve_prereleases))
            .max()
    }

    /// Range satisfied by versions inside both ranges, if any can exist
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let mut alternatives = Vec::new();
        for left in &self.alternatives {
            for right in &other.alternatives {
                let mut conditions = left.conditions.clone();
                conditions.extend(right.conditions.iter().cloned());
                let set = ConditionSet { conditions };
                if set.is_satisfiable() {
                    alternatives.push(set);
                }
            }
        }
        if alternatives.is_empty() {
            return None;
        }

        let include_prerelease = self.include_prerelease && other.include_prerelease;
        let mut expression = alternatives
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" || ");
        if include_prerelease {
            expression.push_str(", include_prerelease");
        }
        Some(Self {
            expression,
            alternatives,
            include_prerelease,
        })
    }

    /// Whether the range matches every version
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.alternatives.iter().any(|set| set.conditions.is_empty())
    }

    /// The expression text, without brackets
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.expression)
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn test_bounds() {
        let r = range("[>=1.2 <2.0]");
        assert!(!r.contains(&v("1.1.9"), false));
        assert!(r.contains(&v("1.2"), false));
        assert!(r.contains(&v("1.9.9"), false));
        assert!(!r.contains(&v("2.0"), false));
    }

    #[test]
    fn test_comma_and_operator_spacing() {
        let r = range(">= 1.0, < 1.5");
        assert!(r.contains(&v("1.4"), false));
        assert!(!r.contains(&v("1.5"), false));
    }

    #[test]
    fn test_tilde_and_caret() {
        let tilde = range("[~1.2]");
        assert!(tilde.contains(&v("1.2.9"), false));
        assert!(!tilde.contains(&v("1.3"), false));

        let caret = range("[^1.2]");
        assert!(caret.contains(&v("1.9"), false));
        assert!(!caret.contains(&v("2.0"), false));

        let caret_zero = range("[^0.3.1]");
        assert!(caret_zero.contains(&v("0.3.5"), false));
        assert!(!caret_zero.contains(&v("0.4.0"), false));
    }

    #[test]
    fn test_alternatives() {
        let r = range("[<1.0 || >=2.0]");
        assert!(r.contains(&v("0.9"), false));
        assert!(!r.contains(&v("1.5"), false));
        assert!(r.contains(&v("2.1"), false));
    }

    #[test]
    fn test_prereleases() {
        let r = range("[>=1.0 <2.0]");
        assert!(!r.contains(&v("1.5-beta"), false));
        assert!(r.contains(&v("1.5-beta"), true));
        // The upper bound also excludes pre-releases of the bound itself
        assert!(!r.contains(&v("2.0-beta"), true));

        let r = range("[>=1.0 <2.0, include_prerelease]");
        assert!(r.contains(&v("1.5-beta"), false));
    }

    #[test]
    fn test_any() {
        assert!(range("[*]").contains(&v("7.1"), false));
        assert!(range("[]").contains(&v("0.1"), false));
        assert!(range("[]").is_any());
    }

    #[test]
    fn test_exact_forms() {
        assert!(range("[1.2.3]").contains(&v("1.2.3"), false));
        assert!(range("[=1.2.3]").contains(&v("1.2.3"), false));
        assert!(range("[==1.2.3]").contains(&v("1.2.3.0"), false));
        assert!(!range("[!=1.2.3]").contains(&v("1.2.3"), false));
    }

    #[test]
    fn test_malformed() {
        assert!(VersionRange::parse("[>=1.0").is_err());
        assert!(VersionRange::parse(">=1.0]").is_err());
        assert!(VersionRange::parse("[>=]").is_err());
        assert!(VersionRange::parse("[>>1.0]").is_err());
        assert!(VersionRange::parse("[1.0 || ]").is_err());
        assert!(VersionRange::parse("[>=1.0 <]").is_err());
    }

    #[test]
    fn test_select_highest() {
        let candidates = [v("1.0"), v("1.5"), v("2.0"), v("1.6-rc1")];
        let r = range("[>=1.0 <2.0]");
        assert_eq!(r.select(&candidates, false), Some(&v("1.5")));
        assert_eq!(r.select(&candidates, true), Some(&v("1.6-rc1")));
        assert_eq!(range("[>3]").select(&candidates, false), None);
    }

    #[test]
    fn test_intersection() {
        let a = range("[>=1.0 <2.0]");
        let b = range("[>=1.5]");
        let both = a.intersection(&b).unwrap();
        assert!(both.contains(&v("1.7"), false));
        assert!(!both.contains(&v("1.2"), false));

        let disjoint = range("[>=3.0]");
        assert!(a.intersection(&disjoint).is_none());

        let point = range("[<=1.0]").intersection(&range("[>=1.0]")).unwrap();
        assert!(point.contains(&v("1.0"), false));
        assert!(range("[<1.0]").intersection(&range("[>=1.0]")).is_none());
    }

    #[test]
    fn test_display_keeps_expression() {
        assert_eq!(range("[>=1.0 <2]").to_string(), "[>=1.0 <2]");
        assert_eq!(range(">=1.0").to_string(), "[>=1.0]");
    }
}
