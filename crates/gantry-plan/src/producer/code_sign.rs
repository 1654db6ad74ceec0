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
use crate::{
    model::TargetType,
    settings::{SettingsScope, names},
    task::TaskOrderingOptions,
};

/// Signs the product once everything it embeds is in place.
///
/// The signing task is ordered after the target's will-sign node, which in
/// turn waits on the products of every hosted target.
pub struct CodeSignTaskProducer;

#[async_trait]
impl TaskProducer for CodeSignTaskProducer {
    fn name(&self) -> &'static str {
        "code-sign"
    }

    fn default_ordering(&self) -> TaskOrderingOptions {
        TaskOrderingOptions::IGNORE_PHASE_ORDERING
    }

    async fn generate_tasks(&self, ctx: &TaskProducerContext<'_>) -> ProducerOutput {
        let configured = ctx.configured_target();
        if configured.target_type() != TargetType::Standard
            || !configured.product_type().can_be_signed()
            || !ctx.settings().evaluate_bool(names::CODE_SIGNING_ALLOWED)
        {
            return ProducerOutput::default();
        }
        let layout = ctx.layout();
        let product = layout.product_path();
        let identity = ctx.settings().evaluate_string(names::CODE_SIGN_IDENTITY);
        let identity = if identity.is_empty() {
            "-".to_string()
        } else {
            identity
        };
        let task = ctx
            .task(["CodeSign".to_string(), product.display().to_string()])
            .ordering_input(ctx.task_info().will_sign)
            .output(ctx.path_node(layout.signature_marker()))
            .command([
                "codesign".to_string(),
                "--force".to_string(),
                "--sign".to_string(),
                identity,
                product.display().to_string(),
            ])
            .description(format!("Sign {}", product.display()));
        ProducerOutput::with_tasks(vec![ctx.build(task)])
    }
}
