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

#![allow(dead_code)]

use gantry_plan::{
    global_plan::{GlobalProductPlan, PlanRequest},
    node::NodeId,
    planner::{PlanOutcome, Planner},
    task::PlannedTask,
};
use tokio_util::sync::CancellationToken;

/// Runs the default planner to completion on a fresh runtime.
pub fn plan(plan: &GlobalProductPlan) -> PlanOutcome {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime");
    rt.block_on(Planner::default().plan(plan, &CancellationToken::new()))
        .expect("Planning should succeed")
}

pub fn serial() -> PlanRequest {
    PlanRequest {
        targets_build_in_parallel: false,
        ..Default::default()
    }
}

pub fn names(outcome: &PlanOutcome, nodes: &[NodeId]) -> Vec<String> {
    nodes
        .iter()
        .map(|&n| outcome.graph.nodes().name(n))
        .collect()
}

/// The gate task producing `node`.
pub fn gate(outcome: &PlanOutcome, node: NodeId) -> &PlannedTask {
    outcome
        .graph
        .gate_for(node)
        .expect("Every gate node should have its gate task")
}

/// The ordering inputs of the gate producing `node`, by name.
pub fn gate_inputs(outcome: &PlanOutcome, node: NodeId) -> Vec<String> {
    names(outcome, &gate(outcome, node).ordering_inputs)
}

/// The display name of the gate node `kind` of the target named `target`.
pub fn gate_node(kind: &str, target: &str) -> String {
    format!("<{kind}-{target}:Debug:macos>")
}

pub fn task<'a>(outcome: &'a PlanOutcome, id: &str) -> &'a PlannedTask {
    outcome
        .graph
        .tasks()
        .iter()
        .find(|t| t.id.as_str() == id)
        .unwrap_or_else(|| panic!("no task {id}"))
}
