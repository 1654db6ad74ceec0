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

//! Planned tasks and their ordering metadata.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::{
    model::TargetId,
    node::{NodeId, NodeRegistry},
};

bitflags! {
    /// Ordering categories a task is tagged with. They decide which of its
    /// target's gate nodes the task waits on, and which gate nodes wait on
    /// the task.
    ///
    /// A task with no options is ordered strictly within its producer's
    /// phase slot.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TaskOrderingOptions: u16 {
        /// Start as early as possible, after the target's start-immediate node.
        const IMMEDIATE = 1 << 0;
        /// Compiles sources; waits for the start-compiling node.
        const COMPILATION = 1 << 1;
        /// Must finish before dependents consider this target's modules ready.
        const COMPILATION_REQUIREMENT = 1 << 2;
        /// Links; waits for the start-linking node.
        const LINKING = 1 << 3;
        /// Must finish before dependents consider linker inputs ready.
        const LINKING_REQUIREMENT = 1 << 4;
        /// Must finish before the unsigned product is considered ready.
        const UNSIGNED_PRODUCT_REQUIREMENT = 1 << 5;
        /// Scans sources for dependencies; waits for the start-scanning node.
        const SCANNING = 1 << 6;
        /// Must finish before dependents may scan.
        const SCANNING_REQUIREMENT = 1 << 7;
        /// Bypass phase barriers. The task carries its own ordering inputs.
        const IGNORE_PHASE_ORDERING = 1 << 8;
    }
}

impl TaskOrderingOptions {
    /// Lowercase names of the set flags, for dumps and logs.
    pub fn flag_names(self) -> Vec<&'static str> {
        self.iter_names()
            .map(|(name, _)| match name {
                "IMMEDIATE" => "immediate",
                "COMPILATION" => "compilation",
                "COMPILATION_REQUIREMENT" => "compilation-requirement",
                "LINKING" => "linking",
                "LINKING_REQUIREMENT" => "linking-requirement",
                "UNSIGNED_PRODUCT_REQUIREMENT" => "unsigned-product-requirement",
                "SCANNING" => "scanning",
                "SCANNING_REQUIREMENT" => "scanning-requirement",
                "IGNORE_PHASE_ORDERING" => "ignore-phase-ordering",
                _ => "unknown",
            })
            .collect()
    }
}

/// The identifier of a planned task, unique within one planning operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Arc<str>);

impl TaskId {
    pub fn new(s: impl AsRef<str>) -> Self {
        TaskId(Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A concrete unit of work (or a zero-work gate) in the planned graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedTask {
    pub id: TaskId,
    /// Rule name followed by its identifying arguments, used for display
    /// and signatures.
    pub rule_info: Vec<String>,
    pub target: Option<TargetId>,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
    /// Nodes the task must run after, without consuming them.
    pub ordering_inputs: Vec<NodeId>,
    /// Nodes the task produces only for ordering purposes.
    pub ordering_outputs: Vec<NodeId>,
    pub command: Option<Vec<String>>,
    pub description: Option<String>,
    /// Contents of an auxiliary file written by the build system itself.
    pub contents: Option<String>,
    pub ordering: TaskOrderingOptions,
    /// Tasks this task must run before.
    pub must_precede: Vec<TaskId>,
    pub is_gate: bool,
    pub prepares_for_indexing: bool,
    /// For gates, the resolved dependencies of their target.
    pub target_dependencies: Vec<TargetId>,
}

impl PlannedTask {
    pub fn rule_name(&self) -> &str {
        self.rule_info.first().map_or("", |s| s.as_str())
    }

    /// Every node the task waits on.
    pub fn all_inputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs
            .iter()
            .chain(self.ordering_inputs.iter())
            .copied()
    }

    /// Every node the task produces.
    pub fn all_outputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.outputs
            .iter()
            .chain(self.ordering_outputs.iter())
            .copied()
    }

    pub(crate) fn add_ordering_input(&mut self, node: NodeId) {
        if !self.inputs.contains(&node) && !self.ordering_inputs.contains(&node) {
            self.ordering_inputs.push(node);
        }
    }
}

/// Builder for [`PlannedTask`]s.
#[derive(Debug, Default)]
pub struct TaskBuilder {
    rule_info: Vec<String>,
    target: Option<TargetId>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    ordering_inputs: Vec<NodeId>,
    ordering_outputs: Vec<NodeId>,
    command: Option<Vec<String>>,
    description: Option<String>,
    contents: Option<String>,
    ordering: TaskOrderingOptions,
    must_precede: Vec<TaskId>,
    is_gate: bool,
    prepares_for_indexing: bool,
    target_dependencies: Vec<TargetId>,
}

impl TaskBuilder {
    pub fn new<I, S>(rule_info: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaskBuilder {
            rule_info: rule_info.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// A zero-work task fanning `inputs` into the single node `output`.
    pub fn gate(name: impl Into<String>, output: NodeId) -> Self {
        let mut b = TaskBuilder::new(["Gate".to_string(), name.into()]);
        b.is_gate = true;
        b.ordering_outputs.push(output);
        b
    }

    pub fn for_target(mut self, target: TargetId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn input(mut self, node: NodeId) -> Self {
        self.inputs.push(node);
        self
    }

    pub fn inputs(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.inputs.extend(nodes);
        self
    }

    pub fn output(mut self, node: NodeId) -> Self {
        self.outputs.push(node);
        self
    }

    pub fn outputs(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.outputs.extend(nodes);
        self
    }

    pub fn ordering_input(mut self, node: NodeId) -> Self {
        self.ordering_inputs.push(node);
        self
    }

    pub fn ordering_inputs(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.ordering_inputs.extend(nodes);
        self
    }

    pub fn ordering_output(mut self, node: NodeId) -> Self {
        self.ordering_outputs.push(node);
        self
    }

    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn contents(mut self, contents: impl Into<String>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    pub fn ordering(mut self, options: TaskOrderingOptions) -> Self {
        self.ordering |= options;
        self
    }

    pub fn must_precede(mut self, task: TaskId) -> Self {
        self.must_precede.push(task);
        self
    }

    pub fn prepares_for_indexing(mut self, value: bool) -> Self {
        self.prepares_for_indexing = value;
        self
    }

    pub fn target_dependencies(mut self, targets: impl IntoIterator<Item = TargetId>) -> Self {
        self.target_dependencies.extend(targets);
        self
    }

    /// Finish the task. Input and output lists are deduplicated keeping
    /// their first occurrence, and a task without any output receives a
    /// virtual completion node so that others can be ordered after it.
    pub fn build(self, nodes: &NodeRegistry) -> PlannedTask {
        let id = TaskId::new(self.rule_info.join(" "));
        let mut task = PlannedTask {
            id,
            rule_info: self.rule_info,
            target: self.target,
            inputs: dedup(self.inputs),
            outputs: dedup(self.outputs),
            ordering_inputs: dedup(self.ordering_inputs),
            ordering_outputs: dedup(self.ordering_outputs),
            command: self.command,
            description: self.description,
            contents: self.contents,
            ordering: self.ordering,
            must_precede: self.must_precede,
            is_gate: self.is_gate,
            prepares_for_indexing: self.prepares_for_indexing,
            target_dependencies: self.target_dependencies,
        };
        task.ordering_inputs.retain(|n| !task.inputs.contains(n));
        if task.outputs.is_empty() && task.ordering_outputs.is_empty() {
            let done = nodes.virtual_node(format!("{}-done", task.id));
            task.ordering_outputs.push(done);
        }
        task
    }
}

fn dedup(nodes: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = std::collections::HashSet::with_capacity(nodes.len());
    nodes.into_iter().filter(|n| seen.insert(*n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_has_single_virtual_output() {
        let nodes = NodeRegistry::new();
        let out = nodes.virtual_node("out");
        let a = nodes.virtual_node("a");
        let gate = TaskBuilder::gate("g", out)
            .ordering_inputs([a, a])
            .build(&nodes);
        assert!(gate.is_gate);
        assert_eq!(gate.rule_name(), "Gate");
        assert_eq!(gate.all_outputs().collect::<Vec<_>>(), vec![out]);
        assert_eq!(gate.ordering_inputs, vec![a]);
        assert!(gate.command.is_none());
    }

    #[test]
    fn outputless_task_gets_completion_node() {
        let nodes = NodeRegistry::new();
        let task = TaskBuilder::new(["PhaseScriptExecution", "Lint"]).build(&nodes);
        assert!(task.outputs.is_empty());
        assert_eq!(task.ordering_outputs.len(), 1);
        let table = nodes.snapshot();
        assert_eq!(
            table.name(task.ordering_outputs[0]),
            "<PhaseScriptExecution Lint-done>"
        );
    }

    #[test]
    fn ordering_inputs_do_not_repeat_inputs() {
        let nodes = NodeRegistry::new();
        let a = nodes.path_node("/a");
        let task = TaskBuilder::new(["Copy", "/b", "/a"])
            .input(a)
            .ordering_input(a)
            .output(nodes.path_node("/b"))
            .build(&nodes);
        assert!(task.ordering_inputs.is_empty());
    }

    #[test]
    fn option_names() {
        let o = TaskOrderingOptions::IMMEDIATE | TaskOrderingOptions::IGNORE_PHASE_ORDERING;
        assert_eq!(o.flag_names(), vec!["immediate", "ignore-phase-ordering"]);
        assert!(TaskOrderingOptions::empty().flag_names().is_empty());
    }
}
