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

//! Lowering of a planned graph into an [`n2`] build graph.
//!
//! Every planned task becomes one n2 build. Inputs are explicit inputs,
//! ordering inputs are order-only inputs, and both kinds of outputs are
//! explicit outputs. Gates and tasks without a command become phony builds.
//! Auxiliary files are not written here: their contents are returned so
//! that the caller writes them before running the build.

use std::{path::PathBuf, rc::Rc};

use log::{debug, info};
use n2::graph::{Build, BuildIns, BuildOuts, FileId, FileLoc, Graph as N2Graph};
use tracing::{Level, instrument};

use crate::{
    graph::PlannedGraph,
    node::{NodeId, NodeTable},
    task::{PlannedTask, TaskId},
};

#[derive(thiserror::Error, Debug)]
pub enum LoweringError {
    #[error(
        "An error was reported by n2 (the build graph executor), \
        when lowering task '{task}'"
    )]
    N2 {
        task: TaskId,
        source: anyhow::Error,
    },

    #[error("the command of task '{task}' cannot be quoted for a shell")]
    InvalidCommand {
        task: TaskId,
        source: shlex::QuoteError,
    },
}

pub struct LoweringResult {
    /// The lowered n2 build graph.
    pub build_graph: N2Graph,
    /// Files whose contents were computed while planning.
    pub auxiliary_files: Vec<(PathBuf, String)>,
    /// The n2 file of each node that is not a gate, in node order.
    pub artifacts: Vec<FileId>,
}

/// Lowers a [`PlannedGraph`] into a n2 [Build Graph](n2::graph::Graph).
#[instrument(level = Level::DEBUG, skip_all, fields(tasks = graph.len()))]
pub fn lower_planned_graph(graph: &PlannedGraph) -> Result<LoweringResult, LoweringError> {
    info!("Starting lowering of {} planned tasks", graph.len());
    let mut ctx = LowerContext {
        nodes: graph.nodes(),
        files: vec![None; graph.nodes().len()],
        build_graph: N2Graph::default(),
    };

    let mut auxiliary_files = vec![];
    for task in graph.tasks() {
        ctx.lower_task(task)?;
        if let Some(contents) = &task.contents {
            for out in &task.outputs {
                if let Some(path) = ctx.nodes.get(*out).path() {
                    auxiliary_files.push((path.to_path_buf(), contents.clone()));
                }
            }
        }
    }

    let mut artifacts = vec![];
    for task in graph.tasks().iter().filter(|t| !t.is_gate) {
        for out in &task.outputs {
            if let Some(file) = ctx.files[out.index()] {
                artifacts.push(file);
            }
        }
    }

    info!("Lowering completed successfully");
    Ok(LoweringResult {
        build_graph: ctx.build_graph,
        auxiliary_files,
        artifacts,
    })
}

struct LowerContext<'a> {
    nodes: &'a NodeTable,
    /// n2 file of each node, registered on first use.
    files: Vec<Option<FileId>>,
    build_graph: N2Graph,
}

impl LowerContext<'_> {
    fn file(&mut self, node: NodeId) -> FileId {
        if let Some(id) = self.files[node.index()] {
            return id;
        }
        let id = self
            .build_graph
            .files
            .id_from_canonical(self.nodes.name(node));
        self.files[node.index()] = Some(id);
        id
    }

    fn lower_task(&mut self, task: &PlannedTask) -> Result<(), LoweringError> {
        let mut ins: Vec<FileId> = task.inputs.iter().map(|&n| self.file(n)).collect();
        let explicit = ins.len();
        ins.extend(task.ordering_inputs.iter().map(|&n| self.file(n)));
        let order_only = ins.len() - explicit;
        let ins = BuildIns {
            ids: ins,
            explicit,
            implicit: 0,
            order_only,
        };

        let outs: Vec<FileId> = task.all_outputs().map(|n| self.file(n)).collect();
        let outs = BuildOuts {
            explicit: outs.len(),
            ids: outs,
        };

        let mut build = Build::new(task_fileloc(task), ins, outs);
        build.cmdline = command_line(task)?;
        build.desc = task.description.clone();

        debug!(
            "lowered: {}\n into {:?};\n ins: {};\n outs: {}",
            task.id,
            build.cmdline,
            build.ins.ids.len(),
            build.outs.ids.len()
        );
        self.build_graph
            .add_build(build)
            .map_err(|e| LoweringError::N2 {
                task: task.id.clone(),
                source: e,
            })
    }
}

/// The shell command line of a task, if it runs one.
pub fn command_line(task: &PlannedTask) -> Result<Option<String>, LoweringError> {
    if task.is_gate {
        return Ok(None);
    }
    let Some(command) = &task.command else {
        return Ok(None);
    };
    shlex::try_join(command.iter().map(|x| x.as_str()))
        .map(Some)
        .map_err(|e| LoweringError::InvalidCommand {
            task: task.id.clone(),
            source: e,
        })
}

/// A dummy [`FileLoc`] naming the rule of a task.
fn task_fileloc(task: &PlannedTask) -> FileLoc {
    FileLoc {
        filename: Rc::new(PathBuf::from(task.rule_name())),
        line: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{node::NodeRegistry, task::TaskBuilder};

    #[test]
    fn lowers_gates_to_phony_builds() {
        let reg = NodeRegistry::new();
        let start = reg.virtual_node("target-begin-A");
        let obj = reg.path_node("/obj/a.o");
        let src = reg.path_node("/src/a.c");
        let gate = TaskBuilder::gate("target-begin-A", start).build(&reg);
        let compile = TaskBuilder::new(["CompileC", "/obj/a.o", "/src/a.c"])
            .input(src)
            .output(obj)
            .ordering_input(start)
            .command(["cc", "-c", "/src/a.c", "-o", "/obj/a.o"])
            .build(&reg);
        let graph = PlannedGraph::new(vec![gate, compile], reg.snapshot());

        let lowered = lower_planned_graph(&graph).expect("lowering");
        let g = &lowered.build_graph;
        let builds: Vec<_> = g.builds.all_ids().map(|id| &g.builds[id]).collect();
        assert_eq!(builds.len(), 2);
        assert!(builds[0].cmdline.is_none());
        assert_eq!(
            builds[1].cmdline.as_deref(),
            Some("cc -c /src/a.c -o /obj/a.o")
        );
        assert_eq!(builds[1].ins.explicit, 1);
        assert_eq!(builds[1].ins.order_only, 1);
        assert_eq!(lowered.artifacts.len(), 1);
    }

    #[test]
    fn nul_in_a_command_is_an_error() {
        let reg = NodeRegistry::new();
        let obj = reg.path_node("/obj/a.o");
        let compile = TaskBuilder::new(["CompileC", "/obj/a.o"])
            .output(obj)
            .command(["cc", "-c", "/src/a\0.c", "-o", "/obj/a.o"])
            .build(&reg);
        let graph = PlannedGraph::new(vec![compile], reg.snapshot());
        let err = lower_planned_graph(&graph).err().expect("nul byte");
        assert!(
            matches!(&err, LoweringError::InvalidCommand { task, .. } if task.as_str() == "CompileC /obj/a.o"),
            "{err}"
        );
    }

    #[test]
    fn collects_auxiliary_files() {
        let reg = NodeRegistry::new();
        let out = reg.path_node("/obj/A-own-target-headers.hmap");
        let task = TaskBuilder::new(["WriteAuxiliaryFile", "/obj/A-own-target-headers.hmap"])
            .output(out)
            .contents("{}")
            .build(&reg);
        let graph = PlannedGraph::new(vec![task], reg.snapshot());
        let lowered = lower_planned_graph(&graph).expect("lowering");
        assert_eq!(
            lowered.auxiliary_files,
            vec![(
                PathBuf::from("/obj/A-own-target-headers.hmap"),
                "{}".to_string()
            )]
        );
    }
}
