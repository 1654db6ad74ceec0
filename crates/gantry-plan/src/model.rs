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

//! The declarative target model consumed by the planner.
//!
//! Everything in here is already resolved: settings are evaluated per
//! configured target, dependencies are platform-filtered, and the target
//! order is total. The planner never mutates these values.

use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

slotmap::new_key_type! {
    /// An unique identifier pointing to a configured target within one
    /// planning operation.
    pub struct TargetId;
}

/// The broad kind of a target, which decides what kind of tasks it may
/// receive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    /// A target with build phases, built by the planner's own producers.
    #[default]
    Standard,
    /// A target with no product of its own, grouping other targets.
    Aggregate,
    /// A target built by an external build tool.
    External,
    /// A target whose product is supplied prebuilt by a package.
    Packaged,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductType {
    Application,
    Framework,
    DynamicLibrary,
    #[default]
    StaticLibrary,
    Tool,
    UnitTestBundle,
    /// No product at all, e.g. aggregate targets.
    None,
}

impl ProductType {
    /// Whether the product is loaded dynamically by its clients, so that a
    /// text stub can stand in for it when linking eagerly.
    pub fn is_dynamic(self) -> bool {
        matches!(self, ProductType::Framework | ProductType::DynamicLibrary)
    }

    /// Whether the product is a bundle directory rather than a single file.
    pub fn is_wrapper(self) -> bool {
        matches!(
            self,
            ProductType::Application | ProductType::Framework | ProductType::UnitTestBundle
        )
    }

    pub fn has_binary(self) -> bool {
        !matches!(self, ProductType::None)
    }

    pub fn can_be_signed(self) -> bool {
        !matches!(self, ProductType::None | ProductType::StaticLibrary)
    }
}

/// A single build phase of a declared target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BuildPhase {
    Headers {
        #[serde(default)]
        public: Vec<PathBuf>,
        #[serde(default)]
        private: Vec<PathBuf>,
        /// Headers visible only to the project, never copied.
        #[serde(default)]
        project: Vec<PathBuf>,
    },
    Sources {
        files: Vec<PathBuf>,
    },
    CopyFiles {
        /// Destination folder, relative to the product wrapper (or to the
        /// target build directory for plain products).
        #[serde(default)]
        destination: PathBuf,
        files: Vec<PathBuf>,
    },
    ShellScript {
        name: String,
        script: String,
        #[serde(default)]
        inputs: Vec<PathBuf>,
        #[serde(default)]
        outputs: Vec<PathBuf>,
    },
}

/// A target as declared by the project, shared by all of its configured
/// variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub target_type: TargetType,
    pub product_type: ProductType,
    pub phases: Vec<BuildPhase>,
    /// Files produced by processing xcframeworks this target consumes.
    pub xcframework_outputs: Vec<PathBuf>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Target {
            name: name.into(),
            target_type: TargetType::Standard,
            product_type: ProductType::StaticLibrary,
            phases: vec![],
            xcframework_outputs: vec![],
        }
    }
}

/// A target plus its resolved build parameters.
///
/// Many configured targets may share a declared [`Target`] but differ in
/// configuration or platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfiguredTarget {
    pub target: Arc<Target>,
    pub configuration: String,
    pub platform: String,
}

impl ConfiguredTarget {
    pub fn new(
        target: Arc<Target>,
        configuration: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        ConfiguredTarget {
            target,
            configuration: configuration.into(),
            platform: platform.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    pub fn target_type(&self) -> TargetType {
        self.target.target_type
    }

    pub fn product_type(&self) -> ProductType {
        self.target.product_type
    }

    /// A stable, human-readable identifier, unique per configured target.
    pub fn guid(&self) -> String {
        format!(
            "{}:{}:{}",
            self.target.name, self.configuration, self.platform
        )
    }
}

/// A resolved edge from a target to one of its immediate dependencies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTargetDependency {
    pub target: TargetId,
    /// Whether the dependency was discovered implicitly (e.g. through a
    /// linked product) rather than declared.
    pub implicit: bool,
    /// Platforms this edge applies to. Empty means all platforms. Edges
    /// excluded by their filter never reach the planner.
    pub platform_filters: Vec<String>,
}

impl ResolvedTargetDependency {
    pub fn explicit(target: TargetId) -> Self {
        ResolvedTargetDependency {
            target,
            implicit: false,
            platform_filters: vec![],
        }
    }

    /// Whether this edge applies when building for `platform`.
    pub fn applies_to(&self, platform: &str) -> bool {
        self.platform_filters.is_empty() || self.platform_filters.iter().any(|p| p == platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_includes_configuration_and_platform() {
        let target = Arc::new(Target::new("Core"));
        let debug = ConfiguredTarget::new(target.clone(), "Debug", "macos");
        let release = ConfiguredTarget::new(target, "Release", "macos");
        assert_eq!(debug.guid(), "Core:Debug:macos");
        assert_ne!(debug.guid(), release.guid());
    }

    #[test]
    fn platform_filters() {
        let mut dep = ResolvedTargetDependency::explicit(TargetId::default());
        assert!(dep.applies_to("ios"));
        dep.platform_filters = vec!["macos".into()];
        assert!(dep.applies_to("macos"));
        assert!(!dep.applies_to("ios"));
    }
}
