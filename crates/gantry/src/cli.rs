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

pub mod dry_run;
pub mod graph;
pub mod plan;

pub use dry_run::*;
pub use graph::*;
pub use plan::*;

use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use gantry_plan::{
    diagnostics::{Diagnostic, Severity},
    global_plan::{GlobalProductPlan, PlanRequest},
    planner::{PlanOutcome, Planner},
    project::ProjectDescription,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, clap::Parser)]
#[clap(name = "gantry", about = "Plans the tasks of a build and their ordering.")]
pub struct GantryCli {
    #[clap(subcommand)]
    pub subcommand: GantrySubcommands,

    #[clap(flatten)]
    pub flags: UniversalFlags,
}

#[derive(Debug, clap::Parser)]
pub enum GantrySubcommands {
    Plan(PlanSubcommand),
    Graph(GraphSubcommand),
    DryRun(DryRunSubcommand),
}

#[derive(Debug, clap::Parser, Clone)]
pub struct UniversalFlags {
    /// Suppress output
    #[clap(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Increase verbosity
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Trace the execution of the program
    #[clap(long, global = true)]
    pub trace: bool,
}

/// Flags shared by every subcommand that plans a project.
#[derive(Debug, clap::Parser, Clone)]
pub struct PlanFlags {
    /// The JSON project description
    #[clap(long, short = 'p', default_value = "gantry.json")]
    pub project: PathBuf,

    /// Build targets one after another instead of in parallel
    #[clap(long)]
    pub serial: bool,

    /// Plan for the index arena instead of a regular build
    #[clap(long)]
    pub index_build: bool,

    /// Remove stale files of every target before building it
    #[clap(long)]
    pub remove_stale_files: bool,
}

impl PlanFlags {
    fn request(&self) -> PlanRequest {
        PlanRequest {
            targets_build_in_parallel: !self.serial,
            index_build: self.index_build,
            remove_stale_files: self.remove_stale_files,
            ..Default::default()
        }
    }
}

/// Loads the project and plans it. Ctrl-C cancels planning.
pub(crate) fn plan_project(flags: &PlanFlags) -> anyhow::Result<(GlobalProductPlan, PlanOutcome)> {
    let project = ProjectDescription::load(&flags.project)
        .with_context(|| format!("failed to load `{}`", flags.project.display()))?;
    let graph = project
        .into_target_graph()
        .context("invalid project description")?;
    log::debug!(
        "loaded {} targets from {}",
        graph.len(),
        flags.project.display()
    );
    let plan = GlobalProductPlan::new(graph, flags.request());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;
    let cancel = CancellationToken::new();
    let outcome = runtime.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        Planner::default().plan(&plan, &cancel).await
    });
    let outcome = outcome.context("failed to plan the build")?;
    Ok((plan, outcome))
}

pub(crate) fn print_diagnostics(flags: &UniversalFlags, diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        if flags.quiet && diag.severity == Severity::Warning {
            continue;
        }
        let label = match diag.severity {
            Severity::Warning => "warning".yellow().bold(),
            Severity::Error => "error".red().bold(),
        };
        match &diag.target {
            Some(target) => eprintln!("{} ({}): {}", label, target.bold(), diag.message),
            None => eprintln!("{}: {}", label, diag.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use gantry_plan::target_info::GATE_KINDS;

    use super::*;

    #[test]
    fn verify_cli() {
        GantryCli::command().debug_assert();
    }

    #[test]
    fn serial_flag_disables_parallel_targets() {
        let cli = <GantryCli as clap::Parser>::parse_from([
            "gantry",
            "plan",
            "--project",
            "p.json",
            "--serial",
            "--remove-stale-files",
        ]);
        let GantrySubcommands::Plan(plan) = cli.subcommand else {
            panic!("expected the plan subcommand");
        };
        let request = plan.flags.request();
        assert!(!request.targets_build_in_parallel);
        assert!(request.remove_stale_files);
        assert!(!request.index_build);
        assert_eq!(plan.flags.project, PathBuf::from("p.json"));
    }

    #[test]
    fn plans_a_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("gantry.json");
        std::fs::write(
            &project,
            r#"{ "targets": [{ "name": "A", "phases": [{ "kind": "sources", "files": ["/a.c"] }] }] }"#,
        )
        .unwrap();
        let flags = PlanFlags {
            project,
            serial: false,
            index_build: false,
            remove_stale_files: false,
        };
        let (plan, outcome) = plan_project(&flags).unwrap();
        assert_eq!(plan.all_targets().len(), 1);
        assert!(!outcome.has_errors());
        let end_gate = format!("Gate {}-A:Debug:macos", GATE_KINDS[1]);
        assert!(
            outcome
                .graph
                .tasks()
                .iter()
                .any(|t| t.id.as_str() == end_gate),
            "no task {end_gate}"
        );
    }

    #[test]
    fn missing_project_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let flags = PlanFlags {
            project: dir.path().join("missing.json"),
            serial: false,
            index_build: false,
            remove_stale_files: false,
        };
        let err = plan_project(&flags).unwrap_err();
        assert!(format!("{err:?}").contains("missing.json"));
    }
}
