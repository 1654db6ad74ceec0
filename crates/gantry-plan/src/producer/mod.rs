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

//! The task producer protocol.
//!
//! A [`TaskProducer`] turns one concern of a target (its headers, its
//! sources, its signature...) into planned tasks. Producers are run per
//! target in a fixed sequence, and the [`phased::PhaseSequencer`] slots the
//! tasks of each one into the target's phase order.
//!
//! Producers needing to see the outputs of every target (e.g. a header map
//! of all headers in the build) return [`DeferredWork`] items instead of
//! tasks. Those run after the first pass completed for all targets, against
//! a read-only [`GlobalOutputs`] snapshot.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    diagnostics::DiagnosticSink,
    global_plan::GlobalProductPlan,
    layout::TargetLayout,
    model::{ConfiguredTarget, TargetId},
    node::{NodeId, NodeRegistry},
    policy::EagerPolicy,
    settings::BuildSettings,
    target_info::TargetTaskInfo,
    task::{PlannedTask, TaskBuilder, TaskOrderingOptions},
};

pub mod code_sign;
pub mod copy_files;
pub mod headermap;
pub mod headers;
pub mod module_map;
pub mod phased;
pub mod shell_script;
pub mod sources;

pub use code_sign::CodeSignTaskProducer;
pub use copy_files::CopyFilesTaskProducer;
pub use headermap::HeadermapTaskProducer;
pub use headers::HeadersTaskProducer;
pub use module_map::ModuleMapTaskProducer;
pub use shell_script::ShellScriptTaskProducer;
pub use sources::SourcesTaskProducer;

/// Everything a producer may look at while planning one target.
pub struct TaskProducerContext<'a> {
    pub plan: &'a GlobalProductPlan,
    pub target: TargetId,
    pub policy: EagerPolicy,
    pub diagnostics: &'a DiagnosticSink,
    pub cancel: &'a CancellationToken,
}

impl<'a> TaskProducerContext<'a> {
    pub fn configured_target(&self) -> &'a ConfiguredTarget {
        self.plan.target(self.target)
    }

    pub fn target_name(&self) -> &'a str {
        self.configured_target().name()
    }

    pub fn settings(&self) -> &'a BuildSettings {
        self.plan.settings(self.target)
    }

    pub fn layout(&self) -> TargetLayout<'a> {
        self.plan.layout(self.target)
    }

    pub fn task_info(&self) -> &'a TargetTaskInfo {
        self.plan.target_task_info(self.target)
    }

    pub fn nodes(&self) -> &'a NodeRegistry {
        self.plan.nodes()
    }

    pub fn path_node(&self, path: impl AsRef<Path>) -> NodeId {
        self.nodes().path_node(path)
    }

    pub fn virtual_node(&self, name: impl Into<String>) -> NodeId {
        self.nodes().virtual_node(name)
    }

    /// Starts a task of this target.
    pub fn task<I, S>(&self, rule_info: I) -> TaskBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaskBuilder::new(rule_info).for_target(self.target)
    }

    pub fn build(&self, builder: TaskBuilder) -> PlannedTask {
        builder.build(self.nodes())
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.diagnostics.warning(Some(self.target_name()), message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.diagnostics.error(Some(self.target_name()), message);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Work a producer postpones until every target finished its first pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeferredWork {
    /// Write a header map of the headers of every target.
    AllTargetHeadersHeadermap { path: PathBuf },
    /// Write a header map of the headers generated by any target.
    GeneratedFilesHeadermap { path: PathBuf },
}

/// The result of a producer's first pass over a target.
#[derive(Debug, Default)]
pub struct ProducerOutput {
    pub tasks: Vec<PlannedTask>,
    pub deferred: Vec<DeferredWork>,
    /// Source files this producer generates, visible to deferred work.
    pub generated_files: Vec<PathBuf>,
    /// Headers this producer makes available to other targets.
    pub headers: Vec<PathBuf>,
    /// Extra nodes the phase barrier of this producer waits on.
    pub must_follow: Vec<NodeId>,
}

impl ProducerOutput {
    pub fn with_tasks(tasks: Vec<PlannedTask>) -> Self {
        ProducerOutput {
            tasks,
            ..Default::default()
        }
    }
}

/// What one target contributed during the first pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetOutputs {
    pub headers: Vec<PathBuf>,
    pub generated_files: Vec<PathBuf>,
}

/// A read-only snapshot of what every target contributed during the first
/// pass, in build order.
#[derive(Debug, Default)]
pub struct GlobalOutputs {
    targets: Vec<(TargetId, TargetOutputs)>,
}

impl GlobalOutputs {
    pub fn new(targets: Vec<(TargetId, TargetOutputs)>) -> Self {
        GlobalOutputs { targets }
    }

    pub fn all_headers(&self) -> impl Iterator<Item = &Path> {
        self.targets
            .iter()
            .flat_map(|(_, o)| o.headers.iter().map(PathBuf::as_path))
    }

    pub fn generated_files(&self) -> impl Iterator<Item = &Path> {
        self.targets
            .iter()
            .flat_map(|(_, o)| o.generated_files.iter().map(PathBuf::as_path))
    }
}

/// A unit producing the tasks of one concern of a target.
#[async_trait]
pub trait TaskProducer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ordering options added to every task of this producer.
    fn default_ordering(&self) -> TaskOrderingOptions {
        TaskOrderingOptions::empty()
    }

    /// Plans the tasks of the target in `ctx`. Problems are reported
    /// through the context's diagnostics, and the producer returns whatever
    /// tasks it could still plan.
    async fn generate_tasks(&self, ctx: &TaskProducerContext<'_>) -> ProducerOutput;

    /// Runs a deferred work item this producer returned earlier.
    async fn run_deferred(
        &self,
        _ctx: &TaskProducerContext<'_>,
        _work: &DeferredWork,
        _outputs: &GlobalOutputs,
    ) -> Vec<PlannedTask> {
        vec![]
    }
}

/// The producers every standard target runs, in phase order.
pub fn default_producers() -> Vec<Arc<dyn TaskProducer>> {
    vec![
        Arc::new(HeadermapTaskProducer),
        Arc::new(HeadersTaskProducer),
        Arc::new(ModuleMapTaskProducer),
        // Scripts may generate sources, so they come first.
        Arc::new(ShellScriptTaskProducer),
        Arc::new(SourcesTaskProducer),
        Arc::new(CopyFilesTaskProducer),
        Arc::new(CodeSignTaskProducer),
    ]
}

/// Files with these extensions are headers.
pub(crate) fn is_header(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("h" | "hh" | "hpp" | "hxx" | "inc")
    )
}
