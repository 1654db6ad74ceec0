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

//! Custom shell script phases.

use async_trait::async_trait;

use super::{ProducerOutput, TaskProducer, TaskProducerContext, is_header};
use crate::model::BuildPhase;

pub struct ShellScriptTaskProducer;

#[async_trait]
impl TaskProducer for ShellScriptTaskProducer {
    fn name(&self) -> &'static str {
        "shell-script"
    }

    async fn generate_tasks(&self, ctx: &TaskProducerContext<'_>) -> ProducerOutput {
        let object_dir = ctx.layout().object_dir();
        let mut output = ProducerOutput::default();
        let phases = ctx
            .configured_target()
            .target
            .phases
            .iter()
            .enumerate();
        for (index, phase) in phases {
            let BuildPhase::ShellScript {
                name,
                script,
                inputs,
                outputs,
            } = phase
            else {
                continue;
            };
            if outputs.is_empty() {
                ctx.warning(format!(
                    "Run script build phase '{name}' will be run during every build because it does not specify any outputs."
                ));
            }
            let script_path = object_dir.join(format!("Script-{index}.sh"));
            let task = ctx
                .task([
                    "PhaseScriptExecution".to_string(),
                    name.clone(),
                    script_path.display().to_string(),
                ])
                .inputs(inputs.iter().map(|p| ctx.path_node(p)))
                .outputs(outputs.iter().map(|p| ctx.path_node(p)))
                .command(["/bin/sh".to_string(), "-c".to_string(), script.clone()])
                .description(format!("Run script {name}"));
            output.tasks.push(ctx.build(task));
            output.generated_files.extend(
                outputs
                    .iter()
                    .filter(|p| is_header(p))
                    .cloned(),
            );
        }
        output
    }
}
