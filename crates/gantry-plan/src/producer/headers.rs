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

//! Copies public and private headers into the product.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ProducerOutput, TaskProducer, TaskProducerContext};
use crate::{
    model::{BuildPhase, Target},
    task::{TaskId, TaskBuilder, TaskOrderingOptions},
};

pub struct HeadersTaskProducer;

/// Name of the gate completing the header copies of the target `guid`.
fn completion_gate_name(guid: &str) -> String {
    format!("copy-headers-completion-{guid}")
}

/// Identifier of the gate completing the header copies of the target
/// `guid`. Tasks that must run before the headers are considered copied
/// name it in their `must_precede` list.
pub fn copy_headers_gate_id(guid: &str) -> TaskId {
    TaskId::new(format!("Gate {}", completion_gate_name(guid)))
}

/// Whether the target copies any header, and so has a completion gate.
pub fn copies_headers(target: &Target) -> bool {
    target.phases.iter().any(|phase| match phase {
        BuildPhase::Headers {
            public, private, ..
        } => !public.is_empty() || !private.is_empty(),
        _ => false,
    })
}

fn file_name(path: &Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_default()
}

#[async_trait]
impl TaskProducer for HeadersTaskProducer {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn default_ordering(&self) -> TaskOrderingOptions {
        TaskOrderingOptions::COMPILATION_REQUIREMENT
    }

    async fn generate_tasks(&self, ctx: &TaskProducerContext<'_>) -> ProducerOutput {
        let configured = ctx.configured_target();
        if !copies_headers(&configured.target) {
            return ProducerOutput::default();
        }
        let layout = ctx.layout();
        let public_dir = layout.public_headers_dir();
        let private_dir = layout.private_headers_dir();

        let mut output = ProducerOutput::default();
        let mut copied = vec![];
        for phase in &configured.target.phases {
            let BuildPhase::Headers {
                public, private, ..
            } = phase
            else {
                continue;
            };
            let visible = public
                .iter()
                .map(|h| (h, &public_dir))
                .chain(private.iter().map(|h| (h, &private_dir)));
            for (header, dir) in visible {
                let dest = dir.join(file_name(header));
                if copied.contains(&dest) {
                    ctx.warning(format!(
                        "multiple headers are copied to '{}', ignoring '{}'",
                        dest.display(),
                        header.display()
                    ));
                    continue;
                }
                let task = ctx
                    .task([
                        "CpHeader".to_string(),
                        dest.display().to_string(),
                        header.display().to_string(),
                    ])
                    .input(ctx.path_node(header))
                    .output(ctx.path_node(&dest))
                    .command([
                        "cp".to_string(),
                        header.display().to_string(),
                        dest.display().to_string(),
                    ])
                    .description(format!("Copy {}", header.display()));
                output.tasks.push(ctx.build(task));
                copied.push(dest);
            }
        }

        let guid = configured.guid();
        let gate_output = ctx.virtual_node(completion_gate_name(&guid));
        let gate = TaskBuilder::gate(completion_gate_name(&guid), gate_output)
            .for_target(ctx.target)
            .ordering_inputs(
                output
                    .tasks
                    .iter()
                    .flat_map(|t| t.outputs.clone())
                    .collect::<Vec<_>>(),
            );
        output.tasks.push(ctx.build(gate));
        output.headers = copied;
        output
    }
}
