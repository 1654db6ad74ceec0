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

//! Header maps, letting the compiler find headers by name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{
    DeferredWork, GlobalOutputs, ProducerOutput, TaskProducer, TaskProducerContext, is_header,
};
use crate::{
    model::{BuildPhase, TargetType},
    settings::{SettingsScope, names},
    task::{PlannedTask, TaskOrderingOptions},
};

pub const WRITE_AUXILIARY_FILE_RULE: &str = "WriteAuxiliaryFile";

pub struct HeadermapTaskProducer;

impl HeadermapTaskProducer {
    fn write_headermap<'p>(
        &self,
        ctx: &TaskProducerContext<'_>,
        path: &Path,
        headers: impl IntoIterator<Item = &'p Path>,
    ) -> Option<PlannedTask> {
        let contents = match headermap_contents(ctx, path, headers) {
            Ok(contents) => contents,
            Err(e) => {
                ctx.error(format!(
                    "failed to write header map '{}': {}",
                    path.display(),
                    e
                ));
                return None;
            }
        };
        let task = ctx
            .task([
                WRITE_AUXILIARY_FILE_RULE.to_string(),
                path.display().to_string(),
            ])
            .output(ctx.path_node(path))
            .ordering_input(ctx.task_info().start_immediate)
            .contents(contents)
            .description(format!("Write {}", path.display()))
            .ordering(self.default_ordering());
        Some(ctx.build(task))
    }
}

/// Maps the file name of every header to its path. The first header of a
/// given name wins, later ones are reported.
fn headermap_contents<'p>(
    ctx: &TaskProducerContext<'_>,
    path: &Path,
    headers: impl IntoIterator<Item = &'p Path>,
) -> serde_json::Result<String> {
    let mut map: IndexMap<String, String> = IndexMap::new();
    for header in headers {
        let Some(name) = header.file_name() else {
            continue;
        };
        let name = name.to_string_lossy().into_owned();
        let value = header.display().to_string();
        match map.get(&name) {
            Some(existing) if *existing != value => ctx.warning(format!(
                "header map '{}' has conflicting entries for '{}', using '{}'",
                path.display(),
                name,
                existing
            )),
            Some(_) => {}
            None => {
                map.insert(name, value);
            }
        }
    }
    serde_json::to_string_pretty(&map)
}

fn own_headers(ctx: &TaskProducerContext<'_>) -> Vec<PathBuf> {
    ctx.configured_target()
        .target
        .phases
        .iter()
        .flat_map(|phase| match phase {
            BuildPhase::Headers {
                public,
                private,
                project,
            } => public
                .iter()
                .chain(private)
                .chain(project)
                .cloned()
                .collect::<Vec<_>>(),
            BuildPhase::Sources { files } => files.iter().filter(|f| is_header(f)).cloned().collect(),
            _ => vec![],
        })
        .collect()
}

fn has_sources(ctx: &TaskProducerContext<'_>) -> bool {
    ctx.configured_target()
        .target
        .phases
        .iter()
        .any(|p| matches!(p, BuildPhase::Sources { .. }))
}

#[async_trait]
impl TaskProducer for HeadermapTaskProducer {
    fn name(&self) -> &'static str {
        "headermap"
    }

    fn default_ordering(&self) -> TaskOrderingOptions {
        TaskOrderingOptions::IMMEDIATE | TaskOrderingOptions::IGNORE_PHASE_ORDERING
    }

    async fn generate_tasks(&self, ctx: &TaskProducerContext<'_>) -> ProducerOutput {
        if ctx.configured_target().target_type() != TargetType::Standard
            || !ctx.settings().evaluate_bool(names::USE_HEADERMAP)
            || !has_sources(ctx)
        {
            return ProducerOutput::default();
        }

        let layout = ctx.layout();
        let headers = own_headers(ctx);
        let mut output = ProducerOutput::default();
        output.tasks.extend(self.write_headermap(
            ctx,
            &layout.own_target_headermap(),
            headers.iter().map(PathBuf::as_path),
        ));
        output.deferred = vec![
            DeferredWork::AllTargetHeadersHeadermap {
                path: layout.all_target_headermap(),
            },
            DeferredWork::GeneratedFilesHeadermap {
                path: layout.generated_files_headermap(),
            },
        ];
        output
    }

    async fn run_deferred(
        &self,
        ctx: &TaskProducerContext<'_>,
        work: &DeferredWork,
        outputs: &GlobalOutputs,
    ) -> Vec<PlannedTask> {
        let task = match work {
            DeferredWork::AllTargetHeadersHeadermap { path } => {
                self.write_headermap(ctx, path, outputs.all_headers())
            }
            DeferredWork::GeneratedFilesHeadermap { path } => self.write_headermap(
                ctx,
                path,
                outputs.generated_files().filter(|f| is_header(f)),
            ),
        };
        task.into_iter().collect()
    }
}
