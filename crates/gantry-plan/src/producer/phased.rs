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

//! Phase barriers between the producers of a target.
//!
//! Producers of a target run in a declared sequence. Before the tasks of a
//! producer are accepted, a barrier gate is inserted whose inputs are the
//! previous barrier, the tasks of the previous phase and any extra nodes the
//! producer asked to follow. Tasks are then anchored according to their
//! ordering options:
//!
//! - `ignore-phase-ordering`: nothing, the task brings its own ordering
//! - `immediate`: the target's start-immediate node
//! - `compilation` or `compilation-requirement`: the start-compiling node
//! - `linking` or `linking-requirement`: the start-linking node
//! - `scanning`: the start-scanning node
//! - anything else: the barrier of the producer's phase
//!
//! Every task that does not opt out of phase ordering, or start
//! immediately, also holds back the barrier of the next phase.

use crate::{
    global_plan::GlobalProductPlan,
    model::TargetId,
    node::NodeId,
    target_info::TargetTaskInfo,
    task::{PlannedTask, TaskBuilder, TaskOrderingOptions},
};

/// Adds to `task` the ordering input its options ask for, after merging
/// `default` into them. `barrier` is the node of the task's phase.
pub fn inject_ordering(
    info: &TargetTaskInfo,
    barrier: NodeId,
    task: &mut PlannedTask,
    default: TaskOrderingOptions,
) {
    use TaskOrderingOptions as O;

    task.ordering |= default;
    let options = task.ordering;
    let anchor = if options.contains(O::IGNORE_PHASE_ORDERING) {
        None
    } else if options.contains(O::IMMEDIATE) {
        Some(info.start_immediate)
    } else if options.intersects(O::COMPILATION | O::COMPILATION_REQUIREMENT) {
        Some(info.start_compiling)
    } else if options.intersects(O::LINKING | O::LINKING_REQUIREMENT) {
        Some(info.start_linking)
    } else if options.contains(O::SCANNING) {
        Some(info.start_scanning)
    } else {
        Some(barrier)
    };
    if let Some(anchor) = anchor {
        task.add_ordering_input(anchor);
    }
}

/// Whether the task holds back the barrier of the next phase.
fn holds_next_phase(task: &PlannedTask) -> bool {
    !task
        .ordering
        .intersects(TaskOrderingOptions::IGNORE_PHASE_ORDERING | TaskOrderingOptions::IMMEDIATE)
}

/// Sequences the producers of one target.
pub struct PhaseSequencer<'a> {
    plan: &'a GlobalProductPlan,
    target: TargetId,
    guid: String,
    barrier: NodeId,
    pending: Vec<NodeId>,
    phase: usize,
    tasks: Vec<PlannedTask>,
}

impl<'a> PhaseSequencer<'a> {
    pub fn new(plan: &'a GlobalProductPlan, target: TargetId) -> Self {
        PhaseSequencer {
            plan,
            target,
            guid: plan.target(target).guid(),
            barrier: plan.target_task_info(target).start,
            pending: vec![],
            phase: 0,
            tasks: vec![],
        }
    }

    /// The node tasks of the most recent phase are ordered after.
    pub fn current_barrier(&self) -> NodeId {
        self.barrier
    }

    /// Accepts the tasks of the next producer. A producer with neither
    /// tasks nor extra ordering does not get a barrier.
    pub fn add_phase(
        &mut self,
        producer: &str,
        default: TaskOrderingOptions,
        mut tasks: Vec<PlannedTask>,
        must_follow: &[NodeId],
    ) {
        if tasks.is_empty() && must_follow.is_empty() {
            return;
        }
        let nodes = self.plan.nodes();
        let name = format!("phase{}-{}-{}", self.phase, producer, self.guid);
        let output = nodes.virtual_node(name.clone());
        let barrier = TaskBuilder::gate(name, output)
            .for_target(self.target)
            .ordering_input(self.barrier)
            .ordering_inputs(self.pending.drain(..))
            .ordering_inputs(must_follow.iter().copied())
            .build(nodes);
        log::trace!("{} waits on {} nodes", barrier.id, barrier.ordering_inputs.len());
        self.tasks.push(barrier);
        self.barrier = output;
        self.phase += 1;

        let info = self.plan.target_task_info(self.target);
        for task in &mut tasks {
            inject_ordering(info, output, task, default);
            if holds_next_phase(task) {
                self.pending.extend(task.all_outputs());
            }
        }
        self.tasks.extend(tasks);
    }

    /// The barriers and ordered tasks, in phase order.
    pub fn finish(self) -> Vec<PlannedTask> {
        self.tasks
    }
}
