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

use colored::Colorize;
use gantry_plan::diagnostics::Severity;

use super::{PlanFlags, UniversalFlags, plan_project, print_diagnostics};

/// Plan a project and report its diagnostics
#[derive(Debug, clap::Parser)]
pub struct PlanSubcommand {
    #[clap(flatten)]
    pub flags: PlanFlags,

    /// Print the eager policy chosen for every target
    #[clap(long)]
    pub policies: bool,
}

pub fn run_plan(cli: &UniversalFlags, cmd: &PlanSubcommand) -> anyhow::Result<i32> {
    let (plan, outcome) = plan_project(&cmd.flags)?;
    print_diagnostics(cli, &outcome.diagnostics);

    if cmd.policies || cli.verbose {
        for &(target, policy) in &outcome.policies {
            println!(
                "{}: eager compilation {}, eager linking {}",
                plan.target(target).name(),
                enabled(policy.allow_compilation),
                enabled(policy.allow_linking),
            );
        }
    }

    let errors = outcome
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = outcome.diagnostics.len() - errors;
    if !cli.quiet {
        let summary = format!(
            "Planned {} tasks for {} targets, {} errors, {} warnings",
            outcome.graph.len(),
            plan.all_targets().len(),
            errors,
            warnings
        );
        if errors > 0 {
            println!("{}", summary.red());
        } else {
            println!("{}", summary);
        }
    }

    Ok(if outcome.has_errors() { 1 } else { 0 })
}

fn enabled(value: bool) -> &'static str {
    if value { "enabled" } else { "disabled" }
}
