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

//! Eager compilation and eager linking decisions.
//!
//! Both are computed once per target before any producer runs and stored
//! in the target's planning context. They are plain functions of their
//! inputs and never consult any other state.

use crate::{
    diagnostics::Diagnostic,
    settings::{SettingsScope, names},
};

/// Everything the eager policies look at.
pub struct EagerPolicyInputs<'a> {
    pub target_name: &'a str,
    pub settings: &'a dyn SettingsScope,
    pub targets_build_in_parallel: bool,
    /// The target producing the nearest product enclosing this target's
    /// product, when it uses `DEPLOYMENT_LOCATION`.
    pub enclosing_target: Option<&'a str>,
}

/// The resolved eager policy of one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct EagerPolicy {
    pub allow_compilation: bool,
    pub allow_linking: bool,
}

pub fn compute_eager_compilation_policy(inputs: &EagerPolicyInputs) -> (bool, Vec<Diagnostic>) {
    let name = inputs.target_name;
    let requires = inputs
        .settings
        .evaluate_bool(names::EAGER_COMPILATION_REQUIRE);
    let mut diags = vec![];

    if !inputs.targets_build_in_parallel {
        if requires {
            diags.push(Diagnostic::warning(
                Some(name),
                format!(
                    "target '{name}' requires eager compilation, but parallel target builds are disabled, which prevent eager compilation"
                ),
            ));
        }
        return (false, diags);
    }

    if inputs
        .settings
        .evaluate_bool(names::EAGER_COMPILATION_DISABLE)
    {
        if requires {
            diags.push(Diagnostic::warning(
                Some(name),
                format!("target '{name}' has both required and disabled eager compilation"),
            ));
        }
        return (false, diags);
    }

    // A product built inside another target's product would race with
    // the signing of that enclosing product.
    if inputs.settings.evaluate_bool(names::DEPLOYMENT_LOCATION)
        && let Some(enclosing) = inputs.enclosing_target
    {
        if requires {
            diags.push(Diagnostic::warning(
                Some(name),
                format!(
                    "target '{name}' requires eager compilation, but DEPLOYMENT_LOCATION is set and the build directory of '{enclosing}' encloses the build directory of '{name}'."
                ),
            ));
        }
        return (false, diags);
    }

    (true, diags)
}

/// Eager linking needs eager compilation, so the already computed
/// compilation decision is passed in.
pub fn compute_eager_linking_policy(
    inputs: &EagerPolicyInputs,
    allow_compilation: bool,
) -> (bool, Vec<Diagnostic>) {
    let name = inputs.target_name;
    let requires = inputs.settings.evaluate_bool(names::EAGER_LINKING_REQUIRE);
    let mut diags = vec![];

    if !allow_compilation {
        if requires {
            diags.push(Diagnostic::warning(
                Some(name),
                format!("target '{name}' requires eager linking, but eager compilation is disabled"),
            ));
        }
        return (false, diags);
    }

    if !inputs.settings.evaluate_bool(names::EAGER_LINKING) {
        if requires {
            diags.push(Diagnostic::warning(
                Some(name),
                format!("target '{name}' has both required and disabled eager linking"),
            ));
        }
        return (false, diags);
    }

    (true, diags)
}

/// Settings whose values decide the policies.
const POLICY_SETTINGS: [&str; 5] = [
    names::EAGER_COMPILATION_DISABLE,
    names::EAGER_COMPILATION_REQUIRE,
    names::EAGER_LINKING,
    names::EAGER_LINKING_REQUIRE,
    names::DEPLOYMENT_LOCATION,
];

/// Computes both policies, compilation first.
pub fn compute_eager_policy(inputs: &EagerPolicyInputs) -> (EagerPolicy, Vec<Diagnostic>) {
    let name = inputs.target_name;
    let mut diags: Vec<Diagnostic> = POLICY_SETTINGS
        .iter()
        .filter_map(|&setting| {
            let raw = inputs.settings.unparsable_bool(setting)?;
            let fallback = if names::default_bool(setting) { "YES" } else { "NO" };
            Some(Diagnostic::warning(
                Some(name),
                format!("target '{name}' sets {setting} to '{raw}', which is not a boolean; using {fallback}"),
            ))
        })
        .collect();
    let (allow_compilation, compile_diags) = compute_eager_compilation_policy(inputs);
    diags.extend(compile_diags);
    let (allow_linking, link_diags) = compute_eager_linking_policy(inputs, allow_compilation);
    diags.extend(link_diags);
    (
        EagerPolicy {
            allow_compilation,
            allow_linking,
        },
        diags,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diagnostics::Severity, settings::BuildSettings};

    fn inputs<'a>(settings: &'a BuildSettings, parallel: bool) -> EagerPolicyInputs<'a> {
        EagerPolicyInputs {
            target_name: "X",
            settings,
            targets_build_in_parallel: parallel,
            enclosing_target: None,
        }
    }

    #[test]
    fn default_is_eager() {
        let s = BuildSettings::new();
        let (policy, diags) = compute_eager_policy(&inputs(&s, true));
        assert!(policy.allow_compilation);
        assert!(policy.allow_linking);
        assert!(diags.is_empty());
    }

    #[test]
    fn serial_builds_disable_eager_compilation() {
        let s = BuildSettings::new().with(names::EAGER_COMPILATION_REQUIRE, true);
        let (policy, diags) = compute_eager_policy(&inputs(&s, false));
        assert_eq!(policy, EagerPolicy::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].message,
            "target 'X' requires eager compilation, but parallel target builds are disabled, which prevent eager compilation"
        );
    }

    #[test]
    fn serial_builds_without_requirement_are_silent() {
        let s = BuildSettings::new();
        let (policy, diags) = compute_eager_policy(&inputs(&s, false));
        assert!(!policy.allow_compilation);
        assert!(diags.is_empty());
    }

    #[test]
    fn unparsable_setting_warns_and_uses_the_default() {
        let s = BuildSettings::new().with(names::EAGER_COMPILATION_DISABLE, "Y");
        let (policy, diags) = compute_eager_policy(&inputs(&s, true));
        assert!(policy.allow_compilation);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(
            diags[0].message,
            "target 'X' sets EAGER_COMPILATION_DISABLE to 'Y', which is not a boolean; using NO"
        );
    }

    #[test]
    fn contradiction_warns() {
        let s = BuildSettings::new()
            .with(names::EAGER_COMPILATION_REQUIRE, "YES")
            .with(names::EAGER_COMPILATION_DISABLE, "YES");
        let (allowed, diags) = compute_eager_compilation_policy(&inputs(&s, true));
        assert!(!allowed);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(
            diags[0].message,
            "target 'X' has both required and disabled eager compilation"
        );
    }

    #[test]
    fn enclosing_product_disables_eager_compilation() {
        let s = BuildSettings::new()
            .with(names::DEPLOYMENT_LOCATION, true)
            .with(names::EAGER_COMPILATION_REQUIRE, true);
        let mut i = inputs(&s, true);
        i.enclosing_target = Some("App");
        let (allowed, diags) = compute_eager_compilation_policy(&i);
        assert!(!allowed);
        assert_eq!(
            diags[0].message,
            "target 'X' requires eager compilation, but DEPLOYMENT_LOCATION is set and the build directory of 'App' encloses the build directory of 'X'."
        );

        // Without an enclosing product the deployment location is harmless.
        i.enclosing_target = None;
        assert!(compute_eager_compilation_policy(&i).0);
    }

    #[test]
    fn eager_linking_requires_eager_compilation() {
        let s = BuildSettings::new()
            .with(names::EAGER_COMPILATION_DISABLE, true)
            .with(names::EAGER_LINKING_REQUIRE, true);
        let (policy, diags) = compute_eager_policy(&inputs(&s, true));
        assert!(!policy.allow_linking);
        assert_eq!(
            diags[0].message,
            "target 'X' requires eager linking, but eager compilation is disabled"
        );
    }

    #[test]
    fn eager_linking_opt_out() {
        let s = BuildSettings::new()
            .with(names::EAGER_LINKING, "NO")
            .with(names::EAGER_LINKING_REQUIRE, "YES");
        let (policy, diags) = compute_eager_policy(&inputs(&s, true));
        assert!(policy.allow_compilation);
        assert!(!policy.allow_linking);
        assert_eq!(
            diags[0].message,
            "target 'X' has both required and disabled eager linking"
        );
    }
}
