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

//! Product and intermediate path calculation for configured targets.

use std::path::{Path, PathBuf};

use crate::{
    model::{ConfiguredTarget, ProductType},
    settings::{SettingsScope, names},
};

/// The build directory used when `BUILD_DIR` is unset.
const DEFAULT_BUILD_DIR: &str = "build";
/// The directory intermediates go to when `OBJROOT` is unset, relative to
/// the build directory.
const DEFAULT_OBJ_DIR: &str = "obj";

/// Paths of one configured target, derived from its evaluated settings.
///
/// The layout is:
///
/// - products: `<TARGET_BUILD_DIR>/<product>`, where `TARGET_BUILD_DIR`
///   defaults to `<BUILD_DIR>/<configuration>-<platform>`
/// - intermediates: `<OBJROOT>/<name>.build/<configuration>-<platform>/`
pub struct TargetLayout<'a> {
    target: &'a ConfiguredTarget,
    settings: &'a dyn SettingsScope,
}

impl<'a> TargetLayout<'a> {
    pub fn new(target: &'a ConfiguredTarget, settings: &'a dyn SettingsScope) -> Self {
        TargetLayout { target, settings }
    }

    fn variant_dir_name(&self) -> String {
        format!("{}-{}", self.target.configuration, self.target.platform)
    }

    pub fn product_name(&self) -> String {
        let name = self.settings.evaluate_string(names::PRODUCT_NAME);
        if name.is_empty() {
            self.target.name().to_owned()
        } else {
            name
        }
    }

    pub fn build_dir(&self) -> PathBuf {
        self.settings
            .evaluate_path(names::BUILD_DIR)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_DIR))
    }

    pub fn obj_root(&self) -> PathBuf {
        self.settings
            .evaluate_path(names::OBJROOT)
            .unwrap_or_else(|| self.build_dir().join(DEFAULT_OBJ_DIR))
    }

    pub fn target_build_dir(&self) -> PathBuf {
        self.settings
            .evaluate_path(names::TARGET_BUILD_DIR)
            .unwrap_or_else(|| self.build_dir().join(self.variant_dir_name()))
    }

    /// The directory holding this target's intermediates.
    pub fn object_dir(&self) -> PathBuf {
        let mut dir = self.obj_root();
        dir.push(format!("{}.build", self.target.name()));
        dir.push(self.variant_dir_name());
        dir
    }

    /// The directory holding the index preparation markers.
    pub fn index_prep_dir(&self) -> PathBuf {
        let mut dir = self.obj_root();
        dir.push("index-prep");
        dir.push(self.target.guid());
        dir
    }

    fn product_file_name(&self) -> String {
        let name = self.product_name();
        match self.target.product_type() {
            ProductType::Application => format!("{name}.app"),
            ProductType::Framework => format!("{name}.framework"),
            ProductType::DynamicLibrary => format!("lib{name}.dylib"),
            ProductType::StaticLibrary => format!("lib{name}.a"),
            ProductType::Tool | ProductType::None => name,
            ProductType::UnitTestBundle => format!("{name}.xctest"),
        }
    }

    /// The product, a wrapper directory for bundles.
    pub fn product_path(&self) -> PathBuf {
        self.target_build_dir().join(self.product_file_name())
    }

    /// The linked binary. Same as [`Self::product_path`] for plain products.
    pub fn binary_path(&self) -> PathBuf {
        let product = self.product_path();
        let name = self.product_name();
        match self.target.product_type() {
            ProductType::Framework => product.join(name),
            ProductType::Application | ProductType::UnitTestBundle => {
                product.join("Contents").join("MacOS").join(name)
            }
            _ => product,
        }
    }

    /// The text stub standing in for a dynamic binary when linking eagerly.
    pub fn text_stub_path(&self) -> PathBuf {
        self.object_dir().join(format!("{}.tbd", self.product_name()))
    }

    pub fn object_file(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.object_dir().join("Objects").join(format!("{stem}.o"))
    }

    /// The emitted module description of a target defining a module.
    pub fn module_file(&self) -> PathBuf {
        self.object_dir()
            .join(format!("{}.swiftmodule", self.product_name()))
    }

    fn include_dir(&self) -> PathBuf {
        self.target_build_dir()
            .join("include")
            .join(self.product_name())
    }

    pub fn public_headers_dir(&self) -> PathBuf {
        match self.target.product_type() {
            ProductType::Framework => self.product_path().join("Headers"),
            _ => self.include_dir(),
        }
    }

    pub fn private_headers_dir(&self) -> PathBuf {
        match self.target.product_type() {
            ProductType::Framework => self.product_path().join("PrivateHeaders"),
            _ => self.include_dir().join("Private"),
        }
    }

    pub fn modules_dir(&self) -> PathBuf {
        match self.target.product_type() {
            ProductType::Framework => self.product_path().join("Modules"),
            _ => self.include_dir(),
        }
    }

    /// Where copy-files phases put their files.
    pub fn copy_destination_dir(&self, destination: &Path) -> PathBuf {
        let base = if self.target.product_type().is_wrapper() {
            self.product_path()
        } else {
            self.target_build_dir()
        };
        base.join(destination)
    }

    fn headermap_path(&self, setting: &str, suffix: &str) -> PathBuf {
        self.settings.evaluate_path(setting).unwrap_or_else(|| {
            self.object_dir()
                .join(format!("{}-{}.hmap", self.product_name(), suffix))
        })
    }

    pub fn own_target_headermap(&self) -> PathBuf {
        self.headermap_path(names::HEADERMAP_FILE_FOR_OWN_TARGET_HEADERS, "own-target-headers")
    }

    pub fn all_target_headermap(&self) -> PathBuf {
        self.headermap_path(names::HEADERMAP_FILE_FOR_ALL_TARGET_HEADERS, "all-target-headers")
    }

    pub fn generated_files_headermap(&self) -> PathBuf {
        self.headermap_path(names::HEADERMAP_FILE_FOR_GENERATED_FILES, "generated-files")
    }

    /// The marker written once the product has been signed.
    pub fn signature_marker(&self) -> PathBuf {
        self.object_dir().join(format!("{}.signature", self.product_name()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{model::Target, settings::BuildSettings};

    fn configured(name: &str, product_type: ProductType) -> ConfiguredTarget {
        let mut t = Target::new(name);
        t.product_type = product_type;
        ConfiguredTarget::new(Arc::new(t), "Debug", "macos")
    }

    #[test]
    fn defaults() {
        let t = configured("Core", ProductType::StaticLibrary);
        let s = BuildSettings::new();
        let layout = TargetLayout::new(&t, &s);
        assert_eq!(layout.product_path(), Path::new("build/Debug-macos/libCore.a"));
        assert_eq!(layout.binary_path(), layout.product_path());
        assert_eq!(
            layout.object_dir(),
            Path::new("build/obj/Core.build/Debug-macos")
        );
        assert_eq!(
            layout.object_file(Path::new("src/a.c")),
            Path::new("build/obj/Core.build/Debug-macos/Objects/a.o")
        );
        assert_eq!(
            layout.public_headers_dir(),
            Path::new("build/Debug-macos/include/Core")
        );
    }

    #[test]
    fn framework_layout_honours_settings() {
        let t = configured("UI", ProductType::Framework);
        let s = BuildSettings::new()
            .with(names::PRODUCT_NAME, "UIKitty")
            .with(names::TARGET_BUILD_DIR, "/out/Products")
            .with(names::OBJROOT, "/out/Intermediates");
        let layout = TargetLayout::new(&t, &s);
        assert_eq!(
            layout.product_path(),
            Path::new("/out/Products/UIKitty.framework")
        );
        assert_eq!(
            layout.binary_path(),
            Path::new("/out/Products/UIKitty.framework/UIKitty")
        );
        assert_eq!(
            layout.modules_dir(),
            Path::new("/out/Products/UIKitty.framework/Modules")
        );
        assert_eq!(
            layout.index_prep_dir(),
            Path::new("/out/Intermediates/index-prep/UI:Debug:macos")
        );
        assert_eq!(
            layout.text_stub_path(),
            Path::new("/out/Intermediates/UI.build/Debug-macos/UIKitty.tbd")
        );
    }
}
