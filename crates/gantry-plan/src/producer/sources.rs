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

//! Compiles and links the sources of a target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ProducerOutput, TaskProducer, TaskProducerContext, is_header};
use crate::{
    model::{BuildPhase, ProductType},
    settings::{SettingsScope, names},
    task::{PlannedTask, TaskOrderingOptions},
};

pub struct SourcesTaskProducer;

const COMPILABLE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "m", "mm", "s", "swift"];

fn is_compilable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| COMPILABLE_EXTENSIONS.contains(&e))
}

/// Splits a tool setting into argv, falling back to `default` when it is
/// unset or cannot be parsed.
fn tool_command(ctx: &TaskProducerContext<'_>, setting: &str, default: &str) -> Vec<String> {
    let value = ctx.settings().evaluate_string(setting);
    if value.trim().is_empty() {
        return vec![default.to_string()];
    }
    match shlex::split(&value) {
        Some(argv) if !argv.is_empty() => argv,
        _ => {
            ctx.error(format!(
                "cannot parse {setting} '{value}', using '{default}' instead"
            ));
            vec![default.to_string()]
        }
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Source files of the target generated by its own script phases.
fn script_outputs(ctx: &TaskProducerContext<'_>) -> Vec<PathBuf> {
    ctx.configured_target()
        .target
        .phases
        .iter()
        .flat_map(|p| match p {
            BuildPhase::ShellScript { outputs, .. } => outputs.clone(),
            _ => vec![],
        })
        .collect()
}

impl SourcesTaskProducer {
    fn compile_task(
        &self,
        ctx: &TaskProducerContext<'_>,
        cc: &[String],
        source: &Path,
        object: &Path,
    ) -> PlannedTask {
        let rule = if source.extension().is_some_and(|e| e == "swift") {
            "CompileSwift"
        } else {
            "CompileC"
        };
        let mut command = cc.to_vec();
        command.extend([
            "-c".to_string(),
            display(source),
            "-o".to_string(),
            display(object),
        ]);
        ctx.build(
            ctx.task([rule.to_string(), display(object), display(source)])
                .input(ctx.path_node(source))
                .output(ctx.path_node(object))
                .command(command)
                .description(format!("Compile {}", display(source)))
                .ordering(TaskOrderingOptions::COMPILATION),
        )
    }

    fn link_task(
        &self,
        ctx: &TaskProducerContext<'_>,
        objects: &[PathBuf],
    ) -> Option<PlannedTask> {
        let configured = ctx.configured_target();
        let product_type = configured.product_type();
        if !product_type.has_binary() {
            return None;
        }
        let layout = ctx.layout();
        let binary = layout.binary_path();
        let (rule, mut command) = match product_type {
            ProductType::StaticLibrary => (
                "Libtool",
                vec!["libtool".to_string(), "-static".to_string()],
            ),
            _ => {
                let mut ld = tool_command(ctx, names::LD, "cc");
                if product_type.is_dynamic() {
                    ld.push("-dynamiclib".to_string());
                }
                ("Ld", ld)
            }
        };
        command.extend(objects.iter().map(|o| display(o)));
        command.extend(["-o".to_string(), display(&binary)]);

        let task = ctx
            .task([rule.to_string(), display(&binary)])
            .inputs(objects.iter().map(|o| ctx.path_node(o)))
            .output(ctx.path_node(&binary))
            .command(command)
            .description(format!("Link {}", layout.product_name()))
            .ordering(TaskOrderingOptions::LINKING | TaskOrderingOptions::UNSIGNED_PRODUCT_REQUIREMENT);
        Some(ctx.build(task))
    }

    /// A text stub of a dynamic product, letting dependents link before the
    /// product itself is linked.
    fn text_stub_task(&self, ctx: &TaskProducerContext<'_>, sources: &[PathBuf]) -> PlannedTask {
        let layout = ctx.layout();
        let stub = layout.text_stub_path();
        let mut command = vec!["tapi".to_string(), "stubify".to_string()];
        command.extend(sources.iter().map(|s| display(s)));
        command.extend(["-o".to_string(), display(&stub)]);
        ctx.build(
            ctx.task(["GenerateTAPI".to_string(), display(&stub)])
                .inputs(sources.iter().map(|s| ctx.path_node(s)))
                .output(ctx.path_node(&stub))
                .command(command)
                .description(format!("Generate text stub {}", display(&stub)))
                .ordering(
                    TaskOrderingOptions::LINKING
                        | TaskOrderingOptions::LINKING_REQUIREMENT
                        | TaskOrderingOptions::UNSIGNED_PRODUCT_REQUIREMENT,
                ),
        )
    }

    fn emit_module_task(&self, ctx: &TaskProducerContext<'_>, sources: &[PathBuf]) -> PlannedTask {
        let module = ctx.layout().module_file();
        let mut command = tool_command(ctx, names::CC, "cc");
        command.push("-emit-module".to_string());
        command.extend(sources.iter().map(|s| display(s)));
        command.extend(["-o".to_string(), display(&module)]);
        ctx.build(
            ctx.task(["EmitModule".to_string(), display(&module)])
                .inputs(sources.iter().map(|s| ctx.path_node(s)))
                .output(ctx.path_node(&module))
                .command(command)
                .description(format!("Emit module {}", display(&module)))
                .ordering(
                    TaskOrderingOptions::COMPILATION | TaskOrderingOptions::COMPILATION_REQUIREMENT,
                ),
        )
    }
}

#[async_trait]
impl TaskProducer for SourcesTaskProducer {
    fn name(&self) -> &'static str {
        "sources"
    }

    async fn generate_tasks(&self, ctx: &TaskProducerContext<'_>) -> ProducerOutput {
        let configured = ctx.configured_target();
        let sources: Vec<PathBuf> = configured
            .target
            .phases
            .iter()
            .flat_map(|p| match p {
                BuildPhase::Sources { files } => files.clone(),
                _ => vec![],
            })
            .collect();
        if sources.is_empty() {
            return ProducerOutput::default();
        }

        let layout = ctx.layout();
        let cc = tool_command(ctx, names::CC, "cc");
        let mut output = ProducerOutput::default();
        let mut objects = vec![];
        let mut compiled = vec![];
        for source in &sources {
            if !is_compilable(source) {
                if !is_header(source) {
                    log::debug!(
                        "{}: skipping {} in sources",
                        configured.name(),
                        source.display()
                    );
                }
                continue;
            }
            let object = layout.object_file(source);
            if objects.contains(&object) {
                ctx.error(format!(
                    "multiple sources compile to '{}', ignoring '{}'",
                    object.display(),
                    source.display()
                ));
                continue;
            }
            output
                .tasks
                .push(self.compile_task(ctx, &cc, source, &object));
            objects.push(object);
            compiled.push(source.clone());
        }

        if ctx.settings().evaluate_bool(names::DEFINES_MODULE) && !compiled.is_empty() {
            output.tasks.push(self.emit_module_task(ctx, &compiled));
        }
        if !objects.is_empty() {
            output.tasks.extend(self.link_task(ctx, &objects));
            if configured.product_type().is_dynamic() && ctx.policy.allow_linking {
                output.tasks.push(self.text_stub_task(ctx, &compiled));
            }
        }

        let generated = script_outputs(ctx);
        output.generated_files = sources
            .iter()
            .filter(|s| generated.contains(s))
            .cloned()
            .collect();
        output
    }
}
