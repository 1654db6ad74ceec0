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

use async_trait::async_trait;

use super::{ProducerOutput, TaskProducer, TaskProducerContext};
use crate::{model::BuildPhase, task::TaskOrderingOptions};

/// Copies the files of copy-files phases into the product.
pub struct CopyFilesTaskProducer;

#[async_trait]
impl TaskProducer for CopyFilesTaskProducer {
    fn name(&self) -> &'static str {
        "copy-files"
    }

    fn default_ordering(&self) -> TaskOrderingOptions {
        TaskOrderingOptions::UNSIGNED_PRODUCT_REQUIREMENT
    }

    async fn generate_tasks(&self, ctx: &TaskProducerContext<'_>) -> ProducerOutput {
        let layout = ctx.layout();
        let mut tasks = vec![];
        for phase in &ctx.configured_target().target.phases {
            let BuildPhase::CopyFiles { destination, files } = phase else {
                continue;
            };
            let dir = layout.copy_destination_dir(destination);
            for file in files {
                let Some(name) = file.file_name() else {
                    ctx.warning(format!("cannot copy '{}'", file.display()));
                    continue;
                };
                let dest = dir.join(name);
                let task = ctx
                    .task([
                        "Copy".to_string(),
                        dest.display().to_string(),
                        file.display().to_string(),
                    ])
                    .input(ctx.path_node(file))
                    .output(ctx.path_node(&dest))
                    .command([
                        "cp".to_string(),
                        "-R".to_string(),
                        file.display().to_string(),
                        dest.display().to_string(),
                    ])
                    .description(format!("Copy {}", file.display()));
                tasks.push(ctx.build(task));
            }
        }
        ProducerOutput::with_tasks(tasks)
    }
}
