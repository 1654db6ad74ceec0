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

//! Installs the module map of targets defining a module.

use async_trait::async_trait;

use super::{
    ProducerOutput, TaskProducer, TaskProducerContext,
    headers::{copies_headers, copy_headers_gate_id},
};
use crate::{
    settings::{SettingsScope, names},
    task::TaskOrderingOptions,
};

pub struct ModuleMapTaskProducer;

#[async_trait]
impl TaskProducer for ModuleMapTaskProducer {
    fn name(&self) -> &'static str {
        "module-map"
    }

    fn default_ordering(&self) -> TaskOrderingOptions {
        TaskOrderingOptions::COMPILATION_REQUIREMENT
    }

    async fn generate_tasks(&self, ctx: &TaskProducerContext<'_>) -> ProducerOutput {
        let settings = ctx.settings();
        if !settings.evaluate_bool(names::DEFINES_MODULE) {
            return ProducerOutput::default();
        }
        let Some(source) = settings.evaluate_path(names::MODULEMAP_FILE) else {
            return ProducerOutput::default();
        };

        let dest = ctx.layout().modules_dir().join("module.modulemap");
        let mut task = ctx
            .task([
                "Copy".to_string(),
                dest.display().to_string(),
                source.display().to_string(),
            ])
            .input(ctx.path_node(&source))
            .output(ctx.path_node(&dest))
            .command([
                "cp".to_string(),
                source.display().to_string(),
                dest.display().to_string(),
            ])
            .description(format!("Copy module map {}", source.display()));
        // Headers only count as copied once their module map is in place.
        let configured = ctx.configured_target();
        if copies_headers(&configured.target) {
            task = task.must_precede(copy_headers_gate_id(&configured.guid()));
        }
        ProducerOutput::with_tasks(vec![ctx.build(task)])
    }
}
