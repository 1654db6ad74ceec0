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

use std::path::PathBuf;

use anyhow::Context;
use gantry_plan::dump::{PlanDump, try_debug_dump_plan_to_file};

use super::{PlanFlags, UniversalFlags, plan_project, print_diagnostics};

/// Print the planned task graph as JSON lines
#[derive(Debug, clap::Parser)]
pub struct GraphSubcommand {
    #[clap(flatten)]
    pub flags: PlanFlags,

    /// Write the graph to a file instead of stdout
    #[clap(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run_graph(cli: &UniversalFlags, cmd: &GraphSubcommand) -> anyhow::Result<i32> {
    let (plan, outcome) = plan_project(&cmd.flags)?;
    print_diagnostics(cli, &outcome.diagnostics);

    let dump = PlanDump::from_graph(&plan, &outcome.graph);
    match &cmd.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create `{}`", path.display()))?;
            dump.dump_to(std::io::BufWriter::new(file))?;
        }
        None => dump.dump_to(std::io::stdout().lock())?,
    }
    try_debug_dump_plan_to_file(&plan, &outcome.graph)?;

    Ok(if outcome.has_errors() { 1 } else { 0 })
}
