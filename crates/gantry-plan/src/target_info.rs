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

//! The gate nodes of a configured target.

use std::path::Path;

use crate::node::{NodeId, NodeRegistry};

/// The fixed bundle of virtual nodes marking the build progress of one
/// configured target. Other targets only ever order themselves against
/// these nodes, never against the target's own tasks.
///
/// Created once per target when the global plan is built, never mutated
/// afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetTaskInfo {
    pub start: NodeId,
    pub end: NodeId,
    pub start_compiling: NodeId,
    pub start_linking: NodeId,
    pub start_scanning: NodeId,
    pub modules_ready: NodeId,
    pub linker_inputs_ready: NodeId,
    pub scan_inputs_ready: NodeId,
    pub start_immediate: NodeId,
    pub unsigned_product_ready: NodeId,
    pub will_sign: NodeId,
    /// Present only for index builds.
    pub pre_compilation_index_prep: Option<NodeId>,
    /// Present only for index builds.
    pub module_content_index_prep: Option<NodeId>,
}

/// The kinds of gate nodes, in the order they are created.
pub const GATE_KINDS: [&str; 11] = [
    "target-begin",
    "target-end",
    "target-begin-compiling",
    "target-begin-linking",
    "target-begin-scanning",
    "target-modules-ready",
    "target-linker-inputs-ready",
    "target-scan-inputs-ready",
    "target-begin-immediate",
    "target-unsigned-product-ready",
    "target-will-sign",
];

impl TargetTaskInfo {
    /// Creates the nodes of the target identified by `guid`.
    ///
    /// `index_prep_dir` is the directory holding the index preparation
    /// markers; pass it only when planning an index build.
    pub fn new(guid: &str, nodes: &NodeRegistry, index_prep_dir: Option<&Path>) -> Self {
        let gate = |kind: &str| nodes.virtual_node(format!("{kind}-{guid}"));
        TargetTaskInfo {
            start: gate(GATE_KINDS[0]),
            end: gate(GATE_KINDS[1]),
            start_compiling: gate(GATE_KINDS[2]),
            start_linking: gate(GATE_KINDS[3]),
            start_scanning: gate(GATE_KINDS[4]),
            modules_ready: gate(GATE_KINDS[5]),
            linker_inputs_ready: gate(GATE_KINDS[6]),
            scan_inputs_ready: gate(GATE_KINDS[7]),
            start_immediate: gate(GATE_KINDS[8]),
            unsigned_product_ready: gate(GATE_KINDS[9]),
            will_sign: gate(GATE_KINDS[10]),
            pre_compilation_index_prep: index_prep_dir
                .map(|dir| nodes.path_node(dir.join("pre-compilation"))),
            module_content_index_prep: index_prep_dir
                .map(|dir| nodes.path_node(dir.join("module-content"))),
        }
    }

    /// All non-optional gate nodes, in [`GATE_KINDS`] order.
    pub fn gate_nodes(&self) -> [NodeId; 11] {
        [
            self.start,
            self.end,
            self.start_compiling,
            self.start_linking,
            self.start_scanning,
            self.modules_ready,
            self.linker_inputs_ready,
            self.scan_inputs_ready,
            self.start_immediate,
            self.unsigned_product_ready,
            self.will_sign,
        ]
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.gate_nodes().contains(&node)
            || self.pre_compilation_index_prep == Some(node)
            || self.module_content_index_prep == Some(node)
    }
}
