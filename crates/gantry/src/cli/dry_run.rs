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

use anyhow::Context;
use gantry_plan::{
    graph::PlannedGraph,
    lower::{command_line, lower_planned_graph},
};

use super::{PlanFlags, UniversalFlags, plan_project, print_diagnostics};

/// Print the commands of the planned build without running them
#[derive(Debug, clap::Parser)]
pub struct DryRunSubcommand {
    #[clap(flatten)]
    pub flags: PlanFlags,

    /// Also write the auxiliary files computed while planning
    #[clap(long)]
    pub write_auxiliary_files: bool,
}

pub fn run_dry_run(cli: &UniversalFlags, cmd: &DryRunSubcommand) -> anyhow::Result<i32> {
    let (_plan, outcome) = plan_project(&cmd.flags)?;
    print_diagnostics(cli, &outcome.diagnostics);
    if outcome.has_errors() {
        return Ok(1);
    }

    let lowered = lower_planned_graph(&outcome.graph).context("failed to lower the plan")?;
    if cmd.write_auxiliary_files {
        for (path, contents) in &lowered.auxiliary_files {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create `{}`", parent.display()))?;
            }
            std::fs::write(path, contents)
                .with_context(|| format!("failed to write `{}`", path.display()))?;
        }
    }

    for line in build_commands(&outcome.graph)? {
        println!("{}", line);
    }
    Ok(0)
}

/// The commands of the planned build, every one after those it depends on.
fn build_commands(graph: &PlannedGraph) -> anyhow::Result<Vec<String>> {
    let mut commands = vec![];
    for task in graph.execution_order() {
        if let Some(line) = command_line(task)? {
            commands.push(line);
        }
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use gantry_plan::{
        global_plan::{GlobalProductPlan, PlanRequest},
        planner::Planner,
        project::ProjectDescription,
    };
    use tokio_util::sync::CancellationToken;

    use super::*;

    const PROJECT: &str = r#"{
        "targets": [
            {
                "name": "Lib",
                "product": "static-library",
                "phases": [{ "kind": "sources", "files": ["/src/lib.c"] }]
            },
            {
                "name": "Tool",
                "product": "tool",
                "dependencies": ["Lib"],
                "phases": [{ "kind": "sources", "files": ["/src/main.c"] }]
            }
        ]
    }"#;

    #[test]
    fn commands_follow_dependencies() {
        let graph = ProjectDescription::parse(PROJECT)
            .unwrap()
            .into_target_graph()
            .unwrap();
        let plan = GlobalProductPlan::new(graph, PlanRequest::default());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let outcome = runtime
            .block_on(Planner::default().plan(&plan, &CancellationToken::new()))
            .unwrap();

        let commands = build_commands(&outcome.graph).unwrap();
        let position = |needle: &str| {
            commands
                .iter()
                .position(|c| c.contains(needle))
                .unwrap_or_else(|| panic!("no command mentions {needle}: {commands:#?}"))
        };
        assert!(position("lib.c") < position("libLib.a"));
        assert!(position("main.c") < position("-o build/Debug-macos/Tool"));
    }
}
