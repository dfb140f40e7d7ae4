//! The editable snapshot a package id is computed from

use crate::config::ResolvedConfig;
use crate::requirements::{DependencyKind, RequirementInfo, RequirementsInfo};
use kiln_hash::digest_hex;
use kiln_types::{Conf, OptionValues, PackageId, Settings};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt::{Display, Write as _};

/// Package id of an info with nothing in it
pub const EMPTY_PACKAGE_ID: &str = kiln_hash::EMPTY_HEX;

/// Whether a conf key is selected by one whitelist entry
///
/// Entries match exactly, or as a prefix when they end in `*`.
#[must_use]
pub fn conf_key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

/// Keep only whitelisted conf entries
#[must_use]
pub fn filter_conf(conf: &Conf) -> Conf {
    let whitelist = conf.package_id_confs();
    let mut selected = Conf::new();
    for (key, value) in conf.iter() {
        if whitelist.iter().any(|pattern| conf_key_matches(pattern, key)) {
            selected.set(key, value.clone());
        }
    }
    selected
}

/// Escape line breaks and backslashes, and `=` in keys, so that one
/// `key=value` line can never read as two
fn escape(text: &str, key: bool) -> Cow<'_, str> {
    let special = |c: char| matches!(c, '\\' | '\n' | '\r') || (key && c == '=');
    if !text.contains(special) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '=' if key => escaped.push_str("\\="),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

fn entry_line(key: &str, value: &impl Display) -> String {
    format!("{}={}", escape(key, true), escape(&value.to_string(), false))
}

/// Mutable package id builder
///
/// Seeded from a [`ResolvedConfig`] and the node's dependencies, then
/// handed to the recipe's `package_id` hook, which may drop or remap
/// entries. Discarded after hashing except as a report copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageIdInfo {
    pub settings: Settings,
    pub options: OptionValues,
    pub requires: RequirementsInfo,
    pub build_requires: RequirementsInfo,
    pub python_requires: RequirementsInfo,
    pub conf: Conf,
    #[serde(skip_serializing_if = "Option::is_none")]
    invalid: Option<String>,
}

impl PackageIdInfo {
    /// Start from a copy of the resolved settings and options
    #[must_use]
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            settings: config.settings().clone(),
            options: config.options().clone(),
            ..Self::default()
        }
    }

    /// Add one dependency to the list of its kind
    pub fn add_dependency(&mut self, kind: DependencyKind, info: RequirementInfo) {
        match kind {
            DependencyKind::Requires => self.requires.insert(info),
            DependencyKind::BuildRequires => self.build_requires.insert(info),
            DependencyKind::PythonRequires => self.python_requires.insert(info),
        }
    }

    /// Drop everything, as header-only packages do
    pub fn clear(&mut self) {
        self.settings = Settings::new();
        self.options = OptionValues::new();
        self.requires.clear();
        self.build_requires.clear();
        self.python_requires.clear();
        self.conf = Conf::new();
    }

    /// Mark the configuration as unsupported by the recipe
    pub fn invalidate(&mut self, reason: impl Into<String>) {
        self.invalid = Some(reason.into());
    }

    #[must_use]
    pub fn invalid_reason(&self) -> Option<&str> {
        self.invalid.as_deref()
    }

    /// Canonical text form
    ///
    /// Sections appear in a fixed order with sorted entries; empty sections
    /// are omitted, so an empty info renders as the empty string.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let mut section = |name: &str, lines: Vec<String>| {
            if lines.is_empty() {
                return;
            }
            let _ = writeln!(out, "[{name}]");
            for line in lines {
                let _ = writeln!(out, "{line}");
            }
        };

        section(
            "settings",
            self.settings.iter().map(|(k, v)| entry_line(k, &v)).collect(),
        );
        section(
            "options",
            self.options.iter().map(|(k, v)| entry_line(k, &v)).collect(),
        );
        section("requires", self.requires.lines());
        section("build_requires", self.build_requires.lines());
        section("python_requires", self.python_requires.lines());
        section(
            "conf",
            self.conf.iter().map(|(k, v)| entry_line(k, &v)).collect(),
        );
        out
    }

    /// BLAKE3 of the canonical text
    #[must_use]
    pub fn package_id(&self) -> PackageId {
        PackageId::new(digest_hex(&self.serialize()))
    }
}
