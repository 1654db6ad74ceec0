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

//! Gate tasks ordering the tasks of a target against its dependencies.
//!
//! Every target gets five start gates, each fanning one exit node of every
//! immediate dependency into one of the target's own start nodes:
//!
//! | gate            | waits on, per dependency                                  |
//! |-----------------|-----------------------------------------------------------|
//! | begin           | end (unsigned-product-ready if the dependency is the host) |
//! | start-compiling | modules-ready when eager, end otherwise                   |
//! | start-linking   | linker-inputs-ready when eager, end otherwise             |
//! | start-scanning  | scan-inputs-ready                                         |
//! | start-immediate | nothing when eager, end otherwise                         |
//!
//! A dependency which opted out of eager compilation always contributes its
//! end node to the compiling and linking gates. When targets are built
//! serially, each gate also waits on the matching exit node of the previous
//! target, see [`previous_target_for_serial_build`].
//!
//! Once the producers of a target have run, its exit gates are created from
//! the ordering options of its tasks, see [`create_exit_gates`].

use tracing::{Level, instrument};

use crate::{
    global_plan::GlobalProductPlan,
    model::TargetId,
    node::NodeId,
    policy::EagerPolicy,
    settings::{SettingsScope, names},
    target_info::GATE_KINDS,
    task::{PlannedTask, TaskBuilder, TaskOrderingOptions},
};

/// Which exit node of a dependency a start gate waits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DependencyExit {
    End,
    ModulesReady,
    LinkerInputsReady,
    ScanInputsReady,
    /// The gate waits on no dependency at all.
    Nothing,
}

/// Rule name of the auxiliary file tasks marking index preparation.
pub const INDEX_PREP_RULE: &str = "WriteAuxiliaryFile";

/// Creates the start gates of one target.
pub struct TargetOrderTaskProducer<'a> {
    plan: &'a GlobalProductPlan,
    target: TargetId,
    policy: EagerPolicy,
}

impl<'a> TargetOrderTaskProducer<'a> {
    pub fn new(plan: &'a GlobalProductPlan, target: TargetId, policy: EagerPolicy) -> Self {
        TargetOrderTaskProducer {
            plan,
            target,
            policy,
        }
    }

    #[instrument(level = Level::DEBUG, skip(self), fields(target = self.plan.target(self.target).name()))]
    pub fn generate_tasks(&self) -> Vec<PlannedTask> {
        let info = self.plan.target_task_info(self.target);
        let compile_exit = if self.policy.allow_compilation {
            DependencyExit::ModulesReady
        } else {
            DependencyExit::End
        };
        let link_exit = if self.policy.allow_linking {
            DependencyExit::LinkerInputsReady
        } else {
            DependencyExit::End
        };
        let immediate_exit = if self.policy.allow_compilation {
            DependencyExit::Nothing
        } else {
            DependencyExit::End
        };

        let mut tasks = vec![
            self.create_start_task(GATE_KINDS[0], DependencyExit::End, info.start),
            self.create_start_task(GATE_KINDS[2], compile_exit, info.start_compiling),
            self.create_start_task(GATE_KINDS[3], link_exit, info.start_linking),
            self.create_start_task(
                GATE_KINDS[4],
                DependencyExit::ScanInputsReady,
                info.start_scanning,
            ),
            self.create_start_task(GATE_KINDS[8], immediate_exit, info.start_immediate),
        ];
        tasks.extend(self.index_prep_tasks());
        tasks
    }

    /// Marker files of an index build. Module content is ready once the
    /// modules of the target are, and pre-compilation preparation is done
    /// before the target starts compiling.
    fn index_prep_tasks(&self) -> Vec<PlannedTask> {
        let info = self.plan.target_task_info(self.target);
        let nodes = self.plan.nodes();
        let name = |n: NodeId| nodes.kind(n).to_string();
        let mut tasks = vec![];
        if let Some(node) = info.module_content_index_prep {
            tasks.push(
                TaskBuilder::new([INDEX_PREP_RULE.to_string(), name(node)])
                    .for_target(self.target)
                    .output(node)
                    .ordering_input(info.modules_ready)
                    .contents("")
                    .ordering(TaskOrderingOptions::IGNORE_PHASE_ORDERING)
                    .prepares_for_indexing(true)
                    .build(nodes),
            );
        }
        if let Some(node) = info.pre_compilation_index_prep {
            tasks.push(
                TaskBuilder::new([INDEX_PREP_RULE.to_string(), name(node)])
                    .for_target(self.target)
                    .output(node)
                    .ordering_input(info.start_compiling)
                    .contents("")
                    .ordering(TaskOrderingOptions::IGNORE_PHASE_ORDERING)
                    .prepares_for_indexing(true)
                    .build(nodes),
            );
        }
        tasks
    }

    /// The exit node of `dependency` for `exit`, as seen from this target.
    fn lookup(&self, dependency: TargetId, exit: DependencyExit) -> Option<NodeId> {
        let info = self.plan.target_task_info(dependency);
        let eager_disabled = || {
            self.plan
                .settings(dependency)
                .evaluate_bool(names::EAGER_COMPILATION_DISABLE)
        };
        match exit {
            DependencyExit::End => Some(self.exit_node(dependency)),
            DependencyExit::ModulesReady if eager_disabled() => Some(info.end),
            DependencyExit::ModulesReady => Some(info.modules_ready),
            DependencyExit::LinkerInputsReady if eager_disabled() => Some(info.end),
            DependencyExit::LinkerInputsReady => Some(info.linker_inputs_ready),
            DependencyExit::ScanInputsReady => Some(info.scan_inputs_ready),
            DependencyExit::Nothing => None,
        }
    }

    /// The end node of `dependency`, or its unsigned-product-ready node when
    /// it hosts this target. A hosted target may then start before its host
    /// is signed.
    fn exit_node(&self, dependency: TargetId) -> NodeId {
        let info = self.plan.target_task_info(dependency);
        if self.plan.host_target(self.target) == Some(dependency) {
            info.unsigned_product_ready
        } else {
            info.end
        }
    }

    fn inputs_for_dependencies(&self, exit: DependencyExit) -> Vec<NodeId> {
        let mut inputs: Vec<NodeId> = self
            .plan
            .resolved_dependencies(self.target)
            .iter()
            .filter(|d| d.target != self.target)
            .filter_map(|d| self.lookup(d.target, exit))
            .collect();

        if !self.plan.targets_build_in_parallel()
            && let Some(previous) = previous_target_for_serial_build(self.plan, self.target)
            && let Some(node) = self.lookup(previous, exit)
        {
            inputs.push(node);
        }
        inputs
    }

    fn create_start_task(&self, kind: &str, exit: DependencyExit, output: NodeId) -> PlannedTask {
        let mut inputs = self.inputs_for_dependencies(exit);
        inputs.extend(self.plan.start_prerequisites(self.target));

        let guid = self.plan.target(self.target).guid();
        TaskBuilder::gate(format!("{kind}-{guid}"), output)
            .for_target(self.target)
            .ordering_inputs(inputs)
            .target_dependencies(dependency_targets(self.plan, self.target))
            .build(self.plan.nodes())
    }
}

/// The target `target` is ordered after when targets build serially.
///
/// A hosted target follows the target hosted just before it by the same
/// host, since hosted targets are built interleaved with their host. Any
/// other target follows the closest earlier target that is neither hosted
/// nor hosting a target ordered after `target`; both would otherwise form
/// a cycle through the hosting relationship.
pub fn previous_target_for_serial_build(
    plan: &GlobalProductPlan,
    target: TargetId,
) -> Option<TargetId> {
    if let Some(host) = plan.host_target(target) {
        let hosted = plan.hosted_targets(host);
        let index = hosted.iter().position(|&t| t == target)?;
        return index.checked_sub(1).map(|i| hosted[i]);
    }

    let pos = plan.position(target);
    let previous = plan.all_targets()[..pos]
        .iter()
        .rev()
        .copied()
        .find(|&prev| {
            plan.host_target(prev).is_none()
                && !plan
                    .hosted_targets(prev)
                    .iter()
                    .any(|&h| plan.position(h) > pos)
        });
    debug_assert!(previous.is_none_or(|p| plan.position(p) < pos));
    previous
}

/// The targets `target` depends on, recorded on each of its gates.
fn dependency_targets(plan: &GlobalProductPlan, target: TargetId) -> Vec<TargetId> {
    plan.resolved_dependencies(target)
        .iter()
        .map(|d| d.target)
        .filter(|&t| t != target)
        .collect()
}

/// Creates the exit gates of `target` from the tasks it was planned with.
///
/// `tasks` must contain every task of the target except the exit gates
/// themselves.
pub fn create_exit_gates(
    plan: &GlobalProductPlan,
    target: TargetId,
    tasks: &[PlannedTask],
) -> Vec<PlannedTask> {
    let info = plan.target_task_info(target);
    let guid = plan.target(target).guid();
    let nodes = plan.nodes();

    let outputs_tagged = |options: TaskOrderingOptions| -> Vec<NodeId> {
        tasks
            .iter()
            .filter(|t| t.ordering.intersects(options))
            .flat_map(|t| t.all_outputs())
            .collect()
    };
    let gate = |kind: &str, output: NodeId, inputs: Vec<NodeId>| {
        TaskBuilder::gate(format!("{kind}-{guid}"), output)
            .for_target(target)
            .ordering_inputs(inputs)
            .target_dependencies(dependency_targets(plan, target))
            .build(nodes)
    };

    let modules_ready = gate(
        GATE_KINDS[5],
        info.modules_ready,
        std::iter::once(info.start_compiling)
            .chain(outputs_tagged(TaskOrderingOptions::COMPILATION_REQUIREMENT))
            .collect(),
    );
    let linker_inputs_ready = gate(
        GATE_KINDS[6],
        info.linker_inputs_ready,
        std::iter::once(info.start_linking)
            .chain(outputs_tagged(TaskOrderingOptions::LINKING_REQUIREMENT))
            .collect(),
    );
    let scan_inputs_ready = gate(
        GATE_KINDS[7],
        info.scan_inputs_ready,
        std::iter::once(info.start_scanning)
            .chain(outputs_tagged(
                TaskOrderingOptions::COMPILATION_REQUIREMENT
                    | TaskOrderingOptions::SCANNING_REQUIREMENT,
            ))
            .collect(),
    );
    let unsigned_product_ready = gate(
        GATE_KINDS[9],
        info.unsigned_product_ready,
        [info.start, info.modules_ready, info.linker_inputs_ready]
            .into_iter()
            .chain(outputs_tagged(
                TaskOrderingOptions::UNSIGNED_PRODUCT_REQUIREMENT,
            ))
            .collect(),
    );
    // Hosted products are embedded before the host gets signed.
    let will_sign = gate(
        GATE_KINDS[10],
        info.will_sign,
        std::iter::once(info.unsigned_product_ready)
            .chain(
                plan.hosted_targets(target)
                    .iter()
                    .map(|&h| plan.target_task_info(h).end),
            )
            .collect(),
    );
    let end = gate(
        GATE_KINDS[1],
        info.end,
        [info.start, info.will_sign, info.scan_inputs_ready]
            .into_iter()
            .chain(tasks.iter().flat_map(|t| t.all_outputs()))
            .filter(|&n| n != info.end)
            .collect(),
    );

    vec![
        end,
        modules_ready,
        linker_inputs_ready,
        scan_inputs_ready,
        unsigned_product_ready,
        will_sign,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_plan::{PlanRequest, TargetGraph};

    fn serial() -> PlanRequest {
        PlanRequest {
            targets_build_in_parallel: false,
            ..Default::default()
        }
    }

    #[test]
    fn serial_predecessor_skips_hosted_targets() {
        let mut b = TargetGraph::builder();
        let app = b.target("App");
        let ext = b.target("Ext");
        let lib = b.target("Lib");
        b.host(ext, app);
        let plan = GlobalProductPlan::new(b.finish(), serial());
        assert_eq!(previous_target_for_serial_build(&plan, app), None);
        // Ext is first among the targets hosted by App.
        assert_eq!(previous_target_for_serial_build(&plan, ext), None);
        assert_eq!(previous_target_for_serial_build(&plan, lib), Some(app));
    }

    #[test]
    fn serial_predecessor_skips_hosts_with_later_hosted_targets() {
        let mut b = TargetGraph::builder();
        let base = b.target("Base");
        let app = b.target("App");
        let lib = b.target("Lib");
        let ext1 = b.target("Ext1");
        let ext2 = b.target("Ext2");
        b.host(ext1, app).host(ext2, app);
        let plan = GlobalProductPlan::new(b.finish(), serial());
        // App hosts Ext1, which comes after Lib.
        assert_eq!(previous_target_for_serial_build(&plan, lib), Some(base));
        assert_eq!(previous_target_for_serial_build(&plan, ext2), Some(ext1));
        assert_eq!(previous_target_for_serial_build(&plan, ext1), None);
    }

    #[test]
    fn start_gates_carry_prerequisites() {
        let mut b = TargetGraph::builder();
        let a = b.target("A");
        let request = PlanRequest {
            remove_stale_files: true,
            ..Default::default()
        };
        let plan = GlobalProductPlan::new(b.finish(), request);
        let (policy, _) = plan.compute_eager_policy(a);
        let tasks = TargetOrderTaskProducer::new(&plan, a, policy).generate_tasks();
        assert_eq!(tasks.len(), 5);
        let stale = plan.stale_file_removal_node(a).expect("enabled");
        for t in &tasks {
            assert!(t.is_gate);
            assert_eq!(t.ordering_inputs, vec![stale]);
        }
    }

    #[test]
    fn exit_gates_follow_ordering_options() {
        let mut b = TargetGraph::builder();
        let a = b.target("A");
        let plan = GlobalProductPlan::new(b.finish(), PlanRequest::default());
        let nodes = plan.nodes();
        let header = nodes.path_node("/out/include/A/a.h");
        let lib = nodes.path_node("/out/libA.a");
        let tasks = vec![
            TaskBuilder::new(["Copy", "/out/include/A/a.h"])
                .output(header)
                .ordering(TaskOrderingOptions::COMPILATION_REQUIREMENT)
                .build(nodes),
            TaskBuilder::new(["Libtool", "/out/libA.a"])
                .output(lib)
                .ordering(
                    TaskOrderingOptions::LINKING
                        | TaskOrderingOptions::UNSIGNED_PRODUCT_REQUIREMENT,
                )
                .build(nodes),
        ];
        let gates = create_exit_gates(&plan, a, &tasks);
        let info = plan.target_task_info(a);
        let by_output = |n: NodeId| {
            gates
                .iter()
                .find(|g| g.ordering_outputs == vec![n])
                .expect("gate should exist")
        };
        assert_eq!(
            by_output(info.modules_ready).ordering_inputs,
            vec![info.start_compiling, header]
        );
        assert_eq!(
            by_output(info.scan_inputs_ready).ordering_inputs,
            vec![info.start_scanning, header]
        );
        assert_eq!(
            by_output(info.linker_inputs_ready).ordering_inputs,
            vec![info.start_linking]
        );
        assert_eq!(
            by_output(info.unsigned_product_ready).ordering_inputs,
            vec![info.start, info.modules_ready, info.linker_inputs_ready, lib]
        );
        assert_eq!(
            by_output(info.end).ordering_inputs,
            vec![info.start, info.will_sign, info.scan_inputs_ready, header, lib]
        );
    }
}
