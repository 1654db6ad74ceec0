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

//! Debug dump of a planned graph, for tests.

use std::{
    io::{BufRead, Write},
    sync::LazyLock,
};

use anyhow::Context;

use crate::{global_plan::GlobalProductPlan, graph::PlannedGraph, node::NodeId};

pub const ENV_VAR: &str = "GANTRY_TEST_DUMP_PLAN";
static PLAN_DUMP_OUTPUT: LazyLock<Option<String>> = LazyLock::new(|| std::env::var(ENV_VAR).ok());

/// The in-memory format for dumping a planned graph
#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct PlanDump {
    pub tasks: Vec<PlanDumpTask>,
}

impl PlanDump {
    pub fn from_graph(plan: &GlobalProductPlan, graph: &PlannedGraph) -> Self {
        let nodes = graph.nodes();
        let names = |ids: &[NodeId]| -> Vec<String> { ids.iter().map(|&n| nodes.name(n)).collect() };
        let tasks = graph
            .tasks()
            .iter()
            .map(|task| PlanDumpTask {
                id: task.id.to_string(),
                rule: task.rule_name().to_string(),
                target: task.target.map(|t| plan.target(t).name().to_string()),
                gate: task.is_gate,
                command: task.command.clone(),
                inputs: names(&task.inputs),
                ordering_inputs: names(&task.ordering_inputs),
                outputs: names(&task.outputs),
                ordering_outputs: names(&task.ordering_outputs),
                ordering: task
                    .ordering
                    .flag_names()
                    .into_iter()
                    .map(String::from)
                    .collect(),
                target_dependencies: task
                    .target_dependencies
                    .iter()
                    .map(|&t| plan.target(t).name().to_string())
                    .collect(),
            })
            .collect();
        PlanDump { tasks }
    }

    /// Dump the plan to the given output, in JSONL format
    pub fn dump_to(&self, out: impl Write) -> anyhow::Result<()> {
        let mut writer = std::io::BufWriter::new(out);
        for task in &self.tasks {
            serde_json::to_writer(&mut writer, task)?;
            writeln!(&mut writer)?;
        }
        Ok(())
    }

    /// Read a plan dump from the given input, in JSONL format.
    pub fn read_from(input: impl std::io::Read) -> anyhow::Result<PlanDump> {
        let reader = std::io::BufReader::new(input);
        let mut tasks = vec![];
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            tasks.push(serde_json::from_str(&line)?);
        }
        Ok(PlanDump { tasks })
    }
}

/// One task in the plan dump
#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct PlanDumpTask {
    pub id: String,
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub gate: bool,
    pub command: Option<Vec<String>>,
    pub inputs: Vec<String>,
    pub ordering_inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub ordering_outputs: Vec<String>,
    pub ordering: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_dependencies: Vec<String>,
}

/// Writes the plan to the file named by [`ENV_VAR`], if set.
pub fn try_debug_dump_plan_to_file(
    plan: &GlobalProductPlan,
    graph: &PlannedGraph,
) -> anyhow::Result<()> {
    let Some(out_file) = PLAN_DUMP_OUTPUT.as_deref() else {
        return Ok(());
    };

    let file = std::fs::File::create(out_file)
        .with_context(|| format!("failed to create plan dump `{}`", out_file))?;
    PlanDump::from_graph(plan, graph)
        .dump_to(file)
        .with_context(|| format!("failed to dump plan to `{}`", out_file))
}
