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

//! The whole-build container the ordering engine walks.
//!
//! A [`GlobalProductPlan`] is built once per planning operation from a
//! resolved [`TargetGraph`]. It creates the [`TargetTaskInfo`] of every
//! target up front, so that producers of any target may reference the gate
//! nodes of their dependencies without waiting for them. After construction
//! the only mutable part is the node registry.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexSet;
use slotmap::{SecondaryMap, SlotMap};
use tracing::{Level, instrument};

use crate::{
    diagnostics::Diagnostic,
    layout::TargetLayout,
    model::{ConfiguredTarget, ResolvedTargetDependency, Target, TargetId, TargetType},
    node::{NodeId, NodeRegistry},
    policy::{EagerPolicy, EagerPolicyInputs, compute_eager_policy},
    settings::{BuildSettings, SettingsScope, names},
    target_info::TargetTaskInfo,
};

/// Whole-build configuration of one planning operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanRequest {
    /// Whether independent targets may build concurrently. When false,
    /// every target is also ordered after its predecessor in build order.
    pub targets_build_in_parallel: bool,
    /// Plan for the index (no-codegen) arena.
    pub index_build: bool,
    /// Emit a stale file removal task for every target.
    pub remove_stale_files: bool,
    /// Settings naming directories that must exist before any target
    /// starts building.
    pub build_directory_settings: Vec<String>,
}

impl Default for PlanRequest {
    fn default() -> Self {
        PlanRequest {
            targets_build_in_parallel: true,
            index_build: false,
            remove_stale_files: false,
            build_directory_settings: vec![names::OBJROOT.into(), names::SYMROOT.into()],
        }
    }
}

/// A resolved target dependency graph.
///
/// The graph is assumed to be acyclic, save for the hosting relationship,
/// and its dependency edges already platform-filtered.
#[derive(Debug, Default)]
pub struct TargetGraph {
    targets: SlotMap<TargetId, ConfiguredTarget>,
    settings: SecondaryMap<TargetId, Arc<BuildSettings>>,
    order: Vec<TargetId>,
    dependencies: SecondaryMap<TargetId, Vec<ResolvedTargetDependency>>,
    hosts: SecondaryMap<TargetId, TargetId>,
}

impl TargetGraph {
    pub fn builder() -> TargetGraphBuilder {
        TargetGraphBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn order(&self) -> &[TargetId] {
        &self.order
    }

    pub fn target(&self, id: TargetId) -> &ConfiguredTarget {
        &self.targets[id]
    }
}

/// Incrementally assembles a [`TargetGraph`].
///
/// Targets enter the build order in insertion order unless an explicit
/// order is given to [`TargetGraphBuilder::finish_with_order`].
#[derive(Debug, Default)]
pub struct TargetGraphBuilder {
    graph: TargetGraph,
}

/// The configuration and platform targets get from [`TargetGraphBuilder::target`].
pub const DEFAULT_CONFIGURATION: &str = "Debug";
pub const DEFAULT_PLATFORM: &str = "macos";

impl TargetGraphBuilder {
    /// Adds a plain standard target without settings.
    pub fn target(&mut self, name: &str) -> TargetId {
        self.target_with(
            Target::new(name),
            DEFAULT_CONFIGURATION,
            DEFAULT_PLATFORM,
            BuildSettings::new(),
        )
    }

    pub fn target_with(
        &mut self,
        target: Target,
        configuration: &str,
        platform: &str,
        settings: BuildSettings,
    ) -> TargetId {
        self.add_configured(
            ConfiguredTarget::new(Arc::new(target), configuration, platform),
            settings,
        )
    }

    pub fn add_configured(&mut self, target: ConfiguredTarget, settings: BuildSettings) -> TargetId {
        let id = self.graph.targets.insert(target);
        self.graph.settings.insert(id, Arc::new(settings));
        self.graph.dependencies.insert(id, vec![]);
        self.graph.order.push(id);
        id
    }

    /// Makes `from` depend on `to`.
    pub fn depend(&mut self, from: TargetId, to: TargetId) -> &mut Self {
        self.dependency(from, ResolvedTargetDependency::explicit(to))
    }

    /// Adds a dependency edge of `from`. Edges whose platform filter
    /// excludes the platform of `from` are dropped.
    pub fn dependency(&mut self, from: TargetId, dep: ResolvedTargetDependency) -> &mut Self {
        let platform = &self.graph.targets[from].platform;
        if !dep.applies_to(platform) {
            log::debug!(
                "dropping dependency of {} on {} excluded on {}",
                self.graph.targets[from].name(),
                self.graph.targets[dep.target].name(),
                platform
            );
            return self;
        }
        let deps = self
            .graph
            .dependencies
            .get_mut(from)
            .expect("Dependency source should be added first");
        if !deps.iter().any(|d| d.target == dep.target) {
            deps.push(dep);
        }
        self
    }

    /// Declares that the product of `hosted` is embedded into the product
    /// of `host`.
    pub fn host(&mut self, hosted: TargetId, host: TargetId) -> &mut Self {
        assert_ne!(hosted, host, "A target cannot host itself");
        self.graph.hosts.insert(hosted, host);
        self
    }

    pub fn finish(self) -> TargetGraph {
        self.graph
    }

    /// Finish with an explicit build order. The order must contain every
    /// added target exactly once.
    pub fn finish_with_order(mut self, order: Vec<TargetId>) -> TargetGraph {
        assert_eq!(
            order.len(),
            self.graph.targets.len(),
            "Build order should list every target"
        );
        self.graph.order = order;
        self.graph
    }
}

/// The read-only, fully resolved graph of one planning operation, plus the
/// gate nodes of every target.
#[derive(Debug)]
pub struct GlobalProductPlan {
    request: PlanRequest,
    targets: SlotMap<TargetId, ConfiguredTarget>,
    settings: SecondaryMap<TargetId, Arc<BuildSettings>>,
    all_targets: Vec<TargetId>,
    positions: SecondaryMap<TargetId, usize>,
    dependencies: SecondaryMap<TargetId, Vec<ResolvedTargetDependency>>,
    host_for: SecondaryMap<TargetId, TargetId>,
    hosted_by: SecondaryMap<TargetId, Vec<TargetId>>,
    task_infos: SecondaryMap<TargetId, TargetTaskInfo>,
    nearest_enclosing: SecondaryMap<TargetId, TargetId>,
    nodes: NodeRegistry,
}

impl GlobalProductPlan {
    #[instrument(level = Level::DEBUG, skip_all, fields(targets = graph.len()))]
    pub fn new(graph: TargetGraph, request: PlanRequest) -> Self {
        let TargetGraph {
            targets,
            settings,
            order,
            dependencies,
            hosts,
        } = graph;

        let mut positions = SecondaryMap::new();
        for (i, &t) in order.iter().enumerate() {
            positions.insert(t, i);
        }

        // Hosted lists follow build order.
        let mut hosted_by: SecondaryMap<TargetId, Vec<TargetId>> = SecondaryMap::new();
        for &t in &order {
            if let Some(&host) = hosts.get(t)
                && let Some(entry) = hosted_by.entry(host)
            {
                entry.or_default().push(t);
            }
        }

        let nodes = NodeRegistry::new();
        let mut task_infos = SecondaryMap::new();
        for &t in &order {
            let target = &targets[t];
            let index_prep_dir = request
                .index_build
                .then(|| TargetLayout::new(target, settings[t].as_ref()).index_prep_dir());
            task_infos.insert(
                t,
                TargetTaskInfo::new(&target.guid(), &nodes, index_prep_dir.as_deref()),
            );
        }

        let nearest_enclosing = compute_nearest_enclosing_products(&targets, &settings, &order);

        GlobalProductPlan {
            request,
            targets,
            settings,
            all_targets: order,
            positions,
            dependencies,
            host_for: hosts,
            hosted_by,
            task_infos,
            nearest_enclosing,
            nodes,
        }
    }

    pub fn request(&self) -> &PlanRequest {
        &self.request
    }

    pub fn targets_build_in_parallel(&self) -> bool {
        self.request.targets_build_in_parallel
    }

    /// Every target in the stable, total build order.
    pub fn all_targets(&self) -> &[TargetId] {
        &self.all_targets
    }

    pub fn target(&self, id: TargetId) -> &ConfiguredTarget {
        &self.targets[id]
    }

    pub fn find_target(&self, name: &str) -> Option<TargetId> {
        self.all_targets
            .iter()
            .copied()
            .find(|&t| self.targets[t].name() == name)
    }

    pub fn settings(&self, id: TargetId) -> &BuildSettings {
        &self.settings[id]
    }

    pub fn layout(&self, id: TargetId) -> TargetLayout<'_> {
        TargetLayout::new(&self.targets[id], self.settings[id].as_ref())
    }

    /// Position of the target in [`Self::all_targets`].
    pub fn position(&self, id: TargetId) -> usize {
        self.positions[id]
    }

    /// Immediate dependencies of the target, already platform-filtered.
    pub fn resolved_dependencies(&self, id: TargetId) -> &[ResolvedTargetDependency] {
        self.dependencies.get(id).map_or(&[], |d| d.as_slice())
    }

    pub fn host_target(&self, id: TargetId) -> Option<TargetId> {
        self.host_for.get(id).copied()
    }

    /// Targets hosted by `id`, in build order.
    pub fn hosted_targets(&self, id: TargetId) -> &[TargetId] {
        self.hosted_by.get(id).map_or(&[], |h| h.as_slice())
    }

    pub fn target_task_info(&self, id: TargetId) -> &TargetTaskInfo {
        self.task_infos
            .get(id)
            .expect("Every planned target should have its task info")
    }

    /// The target producing the nearest product that encloses the product
    /// of `id`, for targets building into a deployment location.
    pub fn nearest_enclosing_target(&self, id: TargetId) -> Option<TargetId> {
        self.nearest_enclosing.get(id).copied()
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    /// The distinct directories the target needs created before starting,
    /// normalized so that spellings of the same directory compare equal.
    pub fn build_directories(&self, id: TargetId) -> Vec<PathBuf> {
        let settings = &self.settings[id];
        let dirs: IndexSet<PathBuf> = self
            .request
            .build_directory_settings
            .iter()
            .filter_map(|name| settings.evaluate_path(name))
            .map(|dir| normalize_directory(&dir))
            .collect();
        dirs.into_iter().collect()
    }

    pub fn create_build_directory_node(&self, dir: &Path) -> NodeId {
        self.nodes.virtual_node(format!(
            "CreateBuildDirectory-{}",
            normalize_directory(dir).display()
        ))
    }

    /// The node produced by the stale file removal task of the target.
    pub fn stale_file_removal_node(&self, id: TargetId) -> Option<NodeId> {
        self.request.remove_stale_files.then(|| {
            self.nodes
                .virtual_node(format!("StaleFileRemoval-{}", self.targets[id].guid()))
        })
    }

    /// Inputs every start gate of the target waits on besides its
    /// dependencies.
    pub fn start_prerequisites(&self, id: TargetId) -> Vec<NodeId> {
        let mut inputs = vec![];
        inputs.extend(self.stale_file_removal_node(id));
        let target = &self.targets[id];
        if target.target_type() == TargetType::Standard {
            for dir in self.build_directories(id) {
                inputs.push(self.create_build_directory_node(&dir));
            }
            for out in &target.target.xcframework_outputs {
                inputs.push(self.nodes.path_node(out));
            }
        }
        inputs
    }

    pub fn compute_eager_policy(&self, id: TargetId) -> (EagerPolicy, Vec<Diagnostic>) {
        let enclosing = self
            .nearest_enclosing_target(id)
            .map(|t| self.targets[t].name());
        compute_eager_policy(&EagerPolicyInputs {
            target_name: self.targets[id].name(),
            settings: self.settings[id].as_ref(),
            targets_build_in_parallel: self.request.targets_build_in_parallel,
            enclosing_target: enclosing,
        })
    }
}

fn compute_nearest_enclosing_products(
    targets: &SlotMap<TargetId, ConfiguredTarget>,
    settings: &SecondaryMap<TargetId, Arc<BuildSettings>>,
    order: &[TargetId],
) -> SecondaryMap<TargetId, TargetId> {
    let products: Vec<(TargetId, PathBuf)> = order
        .iter()
        .filter(|&&t| targets[t].product_type().has_binary())
        .map(|&t| (t, TargetLayout::new(&targets[t], settings[t].as_ref()).product_path()))
        .collect();

    let mut result = SecondaryMap::new();
    for (t, path) in &products {
        let t = *t;
        if !settings[t].evaluate_bool(names::DEPLOYMENT_LOCATION) {
            continue;
        }
        let mut best: Option<(TargetId, usize)> = None;
        for (other, other_path) in &products {
            let other = *other;
            if other == t || other_path == path || !path.starts_with(other_path) {
                continue;
            }
            let depth = other_path.components().count();
            if best.is_none_or(|(_, d)| depth > d) {
                best = Some((other, depth));
            }
        }
        if let Some((enclosing, _)) = best {
            log::debug!(
                "product of {} is enclosed by the product of {}",
                targets[t].name(),
                targets[enclosing].name()
            );
            result.insert(t, enclosing);
        }
    }
    result
}

/// Rebuilds `dir` from its components, dropping trailing separators and
/// `.` segments. `..` is kept since it may cross a symlink.
fn normalize_directory(dir: &Path) -> PathBuf {
    dir.components().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProductType;

    #[test]
    fn hosted_lists_follow_build_order() {
        let mut b = TargetGraph::builder();
        let app = b.target("App");
        let ext2 = b.target("Ext2");
        let ext1 = b.target("Ext1");
        b.host(ext1, app).host(ext2, app);
        let plan = GlobalProductPlan::new(b.finish(), PlanRequest::default());
        assert_eq!(plan.hosted_targets(app), &[ext2, ext1]);
        assert_eq!(plan.host_target(ext1), Some(app));
        assert!(!plan.hosted_targets(app).is_empty());
        assert!(plan.hosted_targets(ext1).is_empty());
        assert_eq!(plan.position(ext1), 2);
    }

    #[test]
    fn platform_filtered_edges_are_dropped() {
        let mut b = TargetGraph::builder();
        let a = b.target("A");
        let c = b.target("C");
        b.dependency(
            c,
            ResolvedTargetDependency {
                target: a,
                implicit: false,
                platform_filters: vec!["ios".into()],
            },
        );
        let plan = GlobalProductPlan::new(b.finish(), PlanRequest::default());
        assert!(plan.resolved_dependencies(c).is_empty());
    }

    #[test]
    fn build_directory_spellings_share_a_node() {
        let mut b = TargetGraph::builder();
        let a = b.target_with(
            Target::new("A"),
            "Debug",
            "macos",
            BuildSettings::new()
                .with(names::OBJROOT, "/out/")
                .with(names::SYMROOT, "/out/./sym"),
        );
        let plan = GlobalProductPlan::new(b.finish(), PlanRequest::default());
        assert_eq!(
            plan.build_directories(a),
            vec![PathBuf::from("/out"), PathBuf::from("/out/sym")]
        );
        assert_eq!(
            plan.create_build_directory_node(Path::new("/out/")),
            plan.create_build_directory_node(Path::new("/out"))
        );
    }

    #[test]
    fn build_directories_are_deduplicated() {
        let mut b = TargetGraph::builder();
        let a = b.target_with(
            Target::new("A"),
            "Debug",
            "macos",
            BuildSettings::new()
                .with(names::OBJROOT, "/out")
                .with(names::SYMROOT, "/out"),
        );
        let plan = GlobalProductPlan::new(b.finish(), PlanRequest::default());
        assert_eq!(plan.build_directories(a), vec![PathBuf::from("/out")]);
        assert_eq!(plan.start_prerequisites(a).len(), 1);
    }

    #[test]
    fn non_standard_targets_skip_prerequisites() {
        let mut b = TargetGraph::builder();
        let mut agg = Target::new("All");
        agg.target_type = TargetType::Aggregate;
        agg.xcframework_outputs = vec!["/x/Lib.framework".into()];
        let id = b.target_with(
            agg,
            "Debug",
            "macos",
            BuildSettings::new().with(names::OBJROOT, "/out"),
        );
        let request = PlanRequest {
            remove_stale_files: true,
            ..Default::default()
        };
        let plan = GlobalProductPlan::new(b.finish(), request);
        let prereqs = plan.start_prerequisites(id);
        assert_eq!(prereqs.len(), 1);
        assert_eq!(
            plan.nodes().snapshot().name(prereqs[0]),
            "<StaleFileRemoval-All:Debug:macos>"
        );
    }

    #[test]
    fn nearest_enclosing_product_is_deepest() {
        let mut b = TargetGraph::builder();
        let mut app = Target::new("App");
        app.product_type = ProductType::Application;
        let app = b.target_with(
            app,
            "Debug",
            "macos",
            BuildSettings::new().with(names::TARGET_BUILD_DIR, "/p"),
        );
        let mut fw = Target::new("Fw");
        fw.product_type = ProductType::Framework;
        let fw = b.target_with(
            fw,
            "Debug",
            "macos",
            BuildSettings::new().with(names::TARGET_BUILD_DIR, "/p/App.app/Contents/Frameworks"),
        );
        let mut plugin = Target::new("Plugin");
        plugin.product_type = ProductType::Tool;
        let plugin = b.target_with(
            plugin,
            "Debug",
            "macos",
            BuildSettings::new()
                .with(names::DEPLOYMENT_LOCATION, true)
                .with(
                    names::TARGET_BUILD_DIR,
                    "/p/App.app/Contents/Frameworks/Fw.framework/Helpers",
                ),
        );
        let plan = GlobalProductPlan::new(b.finish(), PlanRequest::default());
        assert_eq!(plan.nearest_enclosing_target(plugin), Some(fw));
        // Only targets using a deployment location are considered.
        assert_eq!(plan.nearest_enclosing_target(fw), None);
        assert_eq!(plan.nearest_enclosing_target(app), None);

        let (policy, _) = plan.compute_eager_policy(plugin);
        assert!(!policy.allow_compilation);
    }
}
