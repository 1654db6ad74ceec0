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

//! The planning driver.
//!
//! Planning runs in two passes. The first pass creates the start gates of
//! every target and runs its producers, targets being planned concurrently.
//! Once every target finished, deferred work runs against a snapshot of
//! what all targets produced. Finally the exit gates of every target are
//! derived from its tasks and the whole set is assembled into a
//! [`PlannedGraph`].
//!
//! A cancelled planning operation returns [`PlanError::Cancelled`] and
//! drops every task planned so far.

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use futures::future::join_all;
use indexmap::IndexSet;
use log::{debug, info};
use tokio_util::sync::CancellationToken;
use tracing::{Level, instrument};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink, Severity},
    global_plan::GlobalProductPlan,
    graph::{GraphError, PlannedGraph},
    model::{TargetId, TargetType},
    node::NodeId,
    order::{TargetOrderTaskProducer, create_exit_gates},
    policy::EagerPolicy,
    producer::{
        DeferredWork, GlobalOutputs, TargetOutputs, TaskProducer, TaskProducerContext,
        default_producers,
        phased::{PhaseSequencer, inject_ordering},
    },
    task::{PlannedTask, TaskBuilder},
};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("planning was cancelled")]
    Cancelled,

    #[error("planned graph is invalid")]
    InvalidGraph(#[from] GraphError),
}

/// The result of a successful planning operation.
///
/// Diagnostics of error severity do not make planning fail: the graph is
/// still returned, and callers decide whether to build it.
#[derive(Debug)]
pub struct PlanOutcome {
    pub graph: PlannedGraph,
    pub diagnostics: Vec<Diagnostic>,
    pub policies: Vec<(TargetId, EagerPolicy)>,
}

impl PlanOutcome {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn policy(&self, target: TargetId) -> Option<EagerPolicy> {
        self.policies
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, p)| *p)
    }
}

/// What the first pass over one target produced.
struct TargetPass {
    tasks: Vec<PlannedTask>,
    /// Deferred work, with the index of the producer that asked for it.
    deferred: Vec<(usize, DeferredWork)>,
    outputs: TargetOutputs,
    last_barrier: NodeId,
}

/// Runs a sequence of producers over every target of a plan.
pub struct Planner {
    producers: Vec<Arc<dyn TaskProducer>>,
}

impl Default for Planner {
    fn default() -> Self {
        Planner::new(default_producers())
    }
}

impl Planner {
    /// The producers run per target in the given order.
    pub fn new(producers: Vec<Arc<dyn TaskProducer>>) -> Self {
        Planner { producers }
    }

    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn plan(
        &self,
        plan: &GlobalProductPlan,
        cancel: &CancellationToken,
    ) -> Result<PlanOutcome, PlanError> {
        let targets = plan.all_targets();
        let global_sink = DiagnosticSink::new();
        let sinks: Vec<DiagnosticSink> = targets.iter().map(|_| DiagnosticSink::new()).collect();

        let policies: Vec<EagerPolicy> = targets
            .iter()
            .zip(&sinks)
            .map(|(&t, sink)| {
                let (policy, diags) = plan.compute_eager_policy(t);
                sink.extend(diags);
                debug!("{}: {:?}", plan.target(t).name(), policy);
                policy
            })
            .collect();

        let prerequisites = prerequisite_tasks(plan);

        let contexts: Vec<TaskProducerContext<'_>> = targets
            .iter()
            .enumerate()
            .map(|(i, &target)| TaskProducerContext {
                plan,
                target,
                policy: policies[i],
                diagnostics: &sinks[i],
                cancel,
            })
            .collect();

        let passes: Vec<TargetPass> =
            join_all(contexts.iter().map(|ctx| self.first_pass(ctx))).await;
        if cancel.is_cancelled() {
            return Err(PlanError::Cancelled);
        }

        // The one synchronization point between targets.
        let outputs = GlobalOutputs::new(
            targets
                .iter()
                .zip(&passes)
                .map(|(&t, pass)| (t, pass.outputs.clone()))
                .collect(),
        );
        let deferred: Vec<Vec<PlannedTask>> = join_all(
            contexts
                .iter()
                .zip(&passes)
                .map(|(ctx, pass)| self.deferred_pass(ctx, pass, &outputs)),
        )
        .await;
        if cancel.is_cancelled() {
            return Err(PlanError::Cancelled);
        }

        let mut first: Vec<PlannedTask> = prerequisites;
        let mut later: Vec<PlannedTask> = vec![];
        for ((&target, pass), deferred) in targets.iter().zip(passes).zip(deferred) {
            let all: Vec<PlannedTask> = pass.tasks.iter().chain(&deferred).cloned().collect();
            let exits = create_exit_gates(plan, target, &all);
            first.extend(pass.tasks);
            first.extend(exits);
            later.extend(deferred);
        }
        first.extend(later);

        let mut tasks = dedup_tasks(first, &global_sink);
        resolve_must_precede(&mut tasks);

        let graph = PlannedGraph::new(tasks, plan.nodes().snapshot());
        graph.check()?;
        info!(
            "planned {} tasks over {} nodes for {} targets",
            graph.len(),
            graph.nodes().len(),
            targets.len()
        );

        let mut diagnostics = global_sink.into_inner();
        for sink in sinks {
            diagnostics.extend(sink.into_inner());
        }
        Ok(PlanOutcome {
            graph,
            diagnostics,
            policies: targets.iter().copied().zip(policies).collect(),
        })
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(target = ctx.target_name()))]
    async fn first_pass(&self, ctx: &TaskProducerContext<'_>) -> TargetPass {
        let plan = ctx.plan;
        let mut tasks = TargetOrderTaskProducer::new(plan, ctx.target, ctx.policy).generate_tasks();
        let mut sequencer = PhaseSequencer::new(plan, ctx.target);
        let mut deferred = vec![];
        let mut outputs = TargetOutputs::default();

        for (index, producer) in self.producers.iter().enumerate() {
            // Producers of other targets may run in between.
            tokio::task::yield_now().await;
            if ctx.is_cancelled() {
                debug!("{}: cancelled before {}", ctx.target_name(), producer.name());
                break;
            }
            let out = producer.generate_tasks(ctx).await;
            debug!(
                "{}: {} planned {} tasks",
                ctx.target_name(),
                producer.name(),
                out.tasks.len()
            );
            sequencer.add_phase(
                producer.name(),
                producer.default_ordering(),
                out.tasks,
                &out.must_follow,
            );
            deferred.extend(out.deferred.into_iter().map(|w| (index, w)));
            outputs.headers.extend(out.headers);
            outputs.generated_files.extend(out.generated_files);
        }

        let last_barrier = sequencer.current_barrier();
        tasks.extend(sequencer.finish());
        TargetPass {
            tasks,
            deferred,
            outputs,
            last_barrier,
        }
    }

    async fn deferred_pass(
        &self,
        ctx: &TaskProducerContext<'_>,
        pass: &TargetPass,
        outputs: &GlobalOutputs,
    ) -> Vec<PlannedTask> {
        let info = ctx.task_info();
        let mut tasks = vec![];
        for (index, work) in &pass.deferred {
            if ctx.is_cancelled() {
                break;
            }
            let producer = &self.producers[*index];
            let mut produced = producer.run_deferred(ctx, work, outputs).await;
            for task in &mut produced {
                inject_ordering(info, pass.last_barrier, task, producer.default_ordering());
            }
            tasks.extend(produced);
        }
        tasks
    }
}

/// Tasks shared by the whole build: stale file removal of every target and
/// the creation of build directories, once per directory.
fn prerequisite_tasks(plan: &GlobalProductPlan) -> Vec<PlannedTask> {
    let nodes = plan.nodes();
    let mut tasks = vec![];
    let mut dirs: IndexSet<PathBuf> = IndexSet::new();
    for &target in plan.all_targets() {
        let configured = plan.target(target);
        if let Some(node) = plan.stale_file_removal_node(target) {
            tasks.push(
                TaskBuilder::new(["StaleFileRemoval".to_string(), configured.guid()])
                    .for_target(target)
                    .ordering_output(node)
                    .description(format!("Remove stale files of {}", configured.name()))
                    .build(nodes),
            );
        }
        if configured.target_type() == TargetType::Standard {
            dirs.extend(plan.build_directories(target));
        }
    }
    for dir in dirs {
        let display = dir.display().to_string();
        tasks.push(
            TaskBuilder::new(["CreateBuildDirectory".to_string(), display.clone()])
                .ordering_output(plan.create_build_directory_node(&dir))
                .command(["mkdir".to_string(), "-p".to_string(), display.clone()])
                .description(format!("Create build directory {display}"))
                .build(nodes),
        );
    }
    tasks
}

/// Drops tasks planned twice under the same identifier, keeping the first.
fn dedup_tasks(tasks: Vec<PlannedTask>, sink: &DiagnosticSink) -> Vec<PlannedTask> {
    let mut seen = HashSet::with_capacity(tasks.len());
    tasks
        .into_iter()
        .filter(|t| {
            let fresh = seen.insert(t.id.clone());
            if !fresh {
                sink.error(None, format!("task '{}' is planned more than once", t.id));
            }
            fresh
        })
        .collect()
}

/// Orders every task named in a `must_precede` list after the outputs of
/// the task naming it.
fn resolve_must_precede(tasks: &mut [PlannedTask]) {
    let edges: Vec<(crate::task::TaskId, Vec<NodeId>)> = tasks
        .iter()
        .flat_map(|t| {
            let outputs: Vec<NodeId> = t.all_outputs().collect();
            t.must_precede
                .iter()
                .map(move |succ| (succ.clone(), outputs.clone()))
        })
        .collect();
    for (succ, outputs) in edges {
        let task = tasks
            .iter_mut()
            .find(|t| t.id == succ)
            .unwrap_or_else(|| panic!("must_precede names unknown task {succ}"));
        for node in outputs {
            task.add_ordering_input(node);
        }
    }
}
