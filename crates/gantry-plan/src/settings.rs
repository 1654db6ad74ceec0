// gantry: Build task planning and ordering engine.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! Evaluated build settings.
//!
//! Build setting evaluation itself (macro expansion, conditional settings,
//! inheritance between levels) happens outside of the planner. What arrives
//! here is the flat, already-evaluated scope of one configured target, which
//! the planner only ever reads through the typed helpers of
//! [`SettingsScope`].

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Names of the settings the planner knows about.
pub mod names {
    pub const EAGER_COMPILATION_DISABLE: &str = "EAGER_COMPILATION_DISABLE";
    pub const EAGER_COMPILATION_REQUIRE: &str = "EAGER_COMPILATION_REQUIRE";
    pub const EAGER_LINKING: &str = "EAGER_LINKING";
    pub const EAGER_LINKING_REQUIRE: &str = "EAGER_LINKING_REQUIRE";
    pub const DEPLOYMENT_LOCATION: &str = "DEPLOYMENT_LOCATION";

    pub const PRODUCT_NAME: &str = "PRODUCT_NAME";
    pub const TARGET_BUILD_DIR: &str = "TARGET_BUILD_DIR";
    pub const BUILD_DIR: &str = "BUILD_DIR";
    pub const OBJROOT: &str = "OBJROOT";
    pub const SYMROOT: &str = "SYMROOT";

    pub const USE_HEADERMAP: &str = "USE_HEADERMAP";
    pub const HEADERMAP_FILE_FOR_OWN_TARGET_HEADERS: &str = "HEADERMAP_FILE_FOR_OWN_TARGET_HEADERS";
    pub const HEADERMAP_FILE_FOR_ALL_TARGET_HEADERS: &str = "HEADERMAP_FILE_FOR_ALL_TARGET_HEADERS";
    pub const HEADERMAP_FILE_FOR_GENERATED_FILES: &str = "HEADERMAP_FILE_FOR_GENERATED_FILES";

    pub const DEFINES_MODULE: &str = "DEFINES_MODULE";
    pub const MODULEMAP_FILE: &str = "MODULEMAP_FILE";

    pub const CODE_SIGNING_ALLOWED: &str = "CODE_SIGNING_ALLOWED";
    pub const CODE_SIGN_IDENTITY: &str = "CODE_SIGN_IDENTITY";

    pub const CC: &str = "CC";
    pub const LD: &str = "LD";

    /// The value a boolean setting takes when it is not set at all.
    pub fn default_bool(name: &str) -> bool {
        matches!(name, EAGER_LINKING | USE_HEADERMAP)
    }
}

/// A single evaluated setting value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    String(String),
    List(Vec<String>),
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::String(value.to_owned())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::String(value)
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(value: Vec<String>) -> Self {
        SettingValue::List(value)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "YES" | "yes" | "Yes" | "true" | "TRUE" | "1" => Some(true),
        "NO" | "no" | "No" | "false" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

/// Read-only access to the evaluated settings of one configured target.
pub trait SettingsScope: Send + Sync {
    fn lookup(&self, name: &str) -> Option<&SettingValue>;

    /// Evaluates a boolean setting, falling back to [`names::default_bool`]
    /// when it is unset or unparsable.
    fn evaluate_bool(&self, name: &str) -> bool {
        let parsed = match self.lookup(name) {
            Some(SettingValue::Bool(b)) => Some(*b),
            Some(SettingValue::String(s)) => parse_bool(s),
            Some(SettingValue::List(l)) => l.first().and_then(|s| parse_bool(s)),
            None => None,
        };
        parsed.unwrap_or_else(|| names::default_bool(name))
    }

    /// The raw value of a boolean setting that is set to something other
    /// than a boolean. Empty values count as unset.
    fn unparsable_bool(&self, name: &str) -> Option<String> {
        let raw = match self.lookup(name)? {
            SettingValue::Bool(_) => return None,
            SettingValue::String(s) => s.clone(),
            SettingValue::List(l) => l.first().cloned().unwrap_or_default(),
        };
        (!raw.trim().is_empty() && parse_bool(&raw).is_none()).then_some(raw)
    }

    /// Evaluates a setting as a string. Lists are joined by spaces, and
    /// unset settings evaluate to the empty string.
    fn evaluate_string(&self, name: &str) -> String {
        match self.lookup(name) {
            Some(SettingValue::Bool(true)) => "YES".into(),
            Some(SettingValue::Bool(false)) => "NO".into(),
            Some(SettingValue::String(s)) => s.clone(),
            Some(SettingValue::List(l)) => l.join(" "),
            None => String::new(),
        }
    }

    /// Evaluates a setting as a path. Empty values are `None`.
    fn evaluate_path(&self, name: &str) -> Option<PathBuf> {
        let s = self.evaluate_string(name);
        if s.is_empty() {
            None
        } else {
            Some(PathBuf::from(s))
        }
    }
}

/// The flat setting table of one configured target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildSettings {
    values: IndexMap<String, SettingValue>,
}

impl BuildSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Layers `overrides` on top of `self`, returning the merged table.
    pub fn layered(&self, overrides: &BuildSettings) -> BuildSettings {
        let mut merged = self.clone();
        for (k, v) in &overrides.values {
            merged.values.insert(k.clone(), v.clone());
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SettingsScope for BuildSettings {
    fn lookup(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_accept_build_setting_spellings() {
        let s = BuildSettings::new()
            .with("A", "YES")
            .with("B", "NO")
            .with("C", true)
            .with("D", "garbage");
        assert!(s.evaluate_bool("A"));
        assert!(!s.evaluate_bool("B"));
        assert!(s.evaluate_bool("C"));
        assert!(!s.evaluate_bool("D"));
    }

    #[test]
    fn unset_booleans_use_defaults() {
        let s = BuildSettings::new();
        assert!(s.evaluate_bool(names::EAGER_LINKING));
        assert!(s.evaluate_bool(names::USE_HEADERMAP));
        assert!(!s.evaluate_bool(names::EAGER_COMPILATION_DISABLE));
        assert!(!s.evaluate_bool(names::DEPLOYMENT_LOCATION));
    }

    #[test]
    fn layering_overrides() {
        let base = BuildSettings::new()
            .with(names::PRODUCT_NAME, "Base")
            .with(names::OBJROOT, "/tmp/obj");
        let over = BuildSettings::new().with(names::PRODUCT_NAME, "Over");
        let merged = base.layered(&over);
        assert_eq!(merged.evaluate_string(names::PRODUCT_NAME), "Over");
        assert_eq!(
            merged.evaluate_path(names::OBJROOT),
            Some(PathBuf::from("/tmp/obj"))
        );
        assert_eq!(merged.evaluate_path(names::SYMROOT), None);
    }

    #[test]
    fn lists_and_strings() {
        let s = BuildSettings::new()
            .with("L", vec!["a".to_string(), "b".to_string()])
            .with("S", "x  y");
        assert_eq!(s.evaluate_string("L"), "a b");
        assert_eq!(s.evaluate_string("S"), "x  y");
    }

    #[test]
    fn unparsable_booleans_are_reported() {
        let s = BuildSettings::new()
            .with("A", "Y")
            .with("B", "YES")
            .with("C", "")
            .with("D", true);
        assert_eq!(s.unparsable_bool("A").as_deref(), Some("Y"));
        assert!(!s.evaluate_bool("A"));
        assert_eq!(s.unparsable_bool("B"), None);
        assert_eq!(s.unparsable_bool("C"), None);
        assert_eq!(s.unparsable_bool("D"), None);
        assert_eq!(s.unparsable_bool("unset"), None);
    }
}
