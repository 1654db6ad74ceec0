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

//! The planned task graph handed to the execution engine.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::{Control, DfsEvent},
};

use crate::{
    model::TargetId,
    node::{NodeId, NodeKind, NodeTable},
    task::{PlannedTask, TaskId},
};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node '{node}' is produced by both '{first}' and '{second}'")]
    MultipleProducers {
        node: String,
        first: TaskId,
        second: TaskId,
    },

    #[error("task '{task}' waits on '{node}', which no task produces")]
    MissingProducer { node: String, task: TaskId },

    #[error("planned tasks form a cycle: {}", .0.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(" -> "))]
    Cycle(Vec<TaskId>),
}

/// Every task of one planning operation, plus the nodes they refer to.
///
/// Tasks are in a deterministic order: targets in build order, the tasks of
/// a target in creation order, and deferred tasks after every first-pass
/// task.
#[derive(Debug, Default)]
pub struct PlannedGraph {
    tasks: Vec<PlannedTask>,
    nodes: NodeTable,
    by_id: HashMap<TaskId, usize>,
    producers: HashMap<NodeId, usize>,
}

impl PlannedGraph {
    /// Builds the graph. Task identifiers must be unique.
    pub fn new(tasks: Vec<PlannedTask>, nodes: NodeTable) -> Self {
        let mut by_id = HashMap::with_capacity(tasks.len());
        let mut producers = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            let prev = by_id.insert(task.id.clone(), i);
            assert!(prev.is_none(), "Duplicate task id {}", task.id);
            for out in task.all_outputs() {
                producers.entry(out).or_insert(i);
            }
        }
        PlannedGraph {
            tasks,
            nodes,
            by_id,
            producers,
        }
    }

    pub fn tasks(&self) -> &[PlannedTask] {
        &self.tasks
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: &TaskId) -> Option<&PlannedTask> {
        self.by_id.get(id).map(|&i| &self.tasks[i])
    }

    pub fn tasks_of(&self, target: TargetId) -> impl Iterator<Item = &PlannedTask> {
        self.tasks
            .iter()
            .filter(move |t| t.target == Some(target))
    }

    /// The first task producing `node`, if any.
    pub fn producer_of(&self, node: NodeId) -> Option<&PlannedTask> {
        self.producers.get(&node).map(|&i| &self.tasks[i])
    }

    /// The gate task whose output is `node`.
    pub fn gate_for(&self, node: NodeId) -> Option<&PlannedTask> {
        self.producer_of(node).filter(|t| t.is_gate)
    }

    /// Tasks ordered so that producers come before the tasks waiting on
    /// them. Among ready tasks the earliest planned goes first, so the order
    /// is stable. Tasks on a cycle are left out.
    pub fn execution_order(&self) -> Vec<&PlannedTask> {
        let mut waiting_on = vec![0usize; self.tasks.len()];
        let mut dependents: Vec<Vec<usize>> = vec![vec![]; self.tasks.len()];
        for (i, task) in self.tasks.iter().enumerate() {
            for input in task.all_inputs() {
                if let Some(&producer) = self.producers.get(&input)
                    && producer != i
                {
                    dependents[producer].push(i);
                    waiting_on[i] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = waiting_on
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(&self.tasks[i]);
            for &d in &dependents[i] {
                waiting_on[d] -= 1;
                if waiting_on[d] == 0 {
                    ready.push(Reverse(d));
                }
            }
        }
        order
    }

    /// Checks that every node has a single producer, that every virtual
    /// node a task waits on is produced, and that the tasks are acyclic.
    pub fn check(&self) -> Result<(), GraphError> {
        let mut seen: HashMap<NodeId, usize> = HashMap::new();
        for (i, task) in self.tasks.iter().enumerate() {
            for out in task.all_outputs() {
                if let Some(&first) = seen.get(&out) {
                    return Err(GraphError::MultipleProducers {
                        node: self.nodes.name(out),
                        first: self.tasks[first].id.clone(),
                        second: task.id.clone(),
                    });
                }
                seen.insert(out, i);
            }
        }

        for task in &self.tasks {
            for input in task.all_inputs() {
                if matches!(self.nodes.get(input), NodeKind::Virtual(_))
                    && !seen.contains_key(&input)
                {
                    return Err(GraphError::MissingProducer {
                        node: self.nodes.name(input),
                        task: task.id.clone(),
                    });
                }
            }
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(self.tasks.len(), 0);
        let indices: Vec<NodeIndex> = (0..self.tasks.len()).map(|i| graph.add_node(i)).collect();
        for (i, task) in self.tasks.iter().enumerate() {
            for input in task.all_inputs() {
                if let Some(&producer) = self.producers.get(&input) {
                    graph.add_edge(indices[producer], indices[i], ());
                }
            }
        }
        match petgraph::algo::toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let cycle = get_example_cycle(&graph, cycle.node_id());
                Err(GraphError::Cycle(
                    cycle
                        .into_iter()
                        .map(|n| self.tasks[graph[n]].id.clone())
                        .collect(),
                ))
            }
        }
    }
}

/// Finds a cycle through `n`, which must be part of one.
pub(crate) fn get_example_cycle<N>(m: &DiGraph<N, ()>, n: NodeIndex) -> Vec<NodeIndex> {
    // the parent of each node in the spanning tree
    let mut spanning_tree = vec![NodeIndex::default(); m.node_count()];
    let res = petgraph::visit::depth_first_search(m, [n], |ev| match ev {
        DfsEvent::TreeEdge(parent, n) => {
            spanning_tree[n.index()] = parent;
            Control::Continue
        }
        DfsEvent::BackEdge(u, v) if v == n => Control::Break(u),
        _ => Control::Continue,
    });
    let res = res.break_value().expect("The cycle should be found");
    let mut cycle = vec![n];
    let mut curr_node = res;
    loop {
        cycle.push(curr_node);
        if curr_node == n {
            break;
        }
        curr_node = spanning_tree[curr_node.index()];
    }
    cycle.reverse();
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{node::NodeRegistry, task::TaskBuilder};

    #[test]
    fn detects_cycles() {
        let reg = NodeRegistry::new();
        let a = reg.virtual_node("a");
        let b = reg.virtual_node("b");
        let t1 = TaskBuilder::gate("one", a).ordering_input(b).build(&reg);
        let t2 = TaskBuilder::gate("two", b).ordering_input(a).build(&reg);
        let graph = PlannedGraph::new(vec![t1, t2], reg.snapshot());
        let err = graph.check().expect_err("cycle");
        assert!(matches!(err, GraphError::Cycle(ref c) if c.len() == 3));
    }

    #[test]
    fn detects_multiple_producers() {
        let reg = NodeRegistry::new();
        let out = reg.path_node("/out");
        let t1 = TaskBuilder::new(["A"]).output(out).build(&reg);
        let t2 = TaskBuilder::new(["B"]).output(out).build(&reg);
        let graph = PlannedGraph::new(vec![t1, t2], reg.snapshot());
        assert_eq!(
            graph.check().expect_err("conflict").to_string(),
            "node '/out' is produced by both 'A' and 'B'"
        );
        assert_eq!(graph.producer_of(out).map(|t| t.id.as_str()), Some("A"));
    }

    #[test]
    fn detects_unproduced_virtual_inputs() {
        let reg = NodeRegistry::new();
        let out = reg.virtual_node("out");
        let dir = reg.virtual_node("CreateBuildDirectory-/out/");
        let source = reg.path_node("/src/a.c");
        let t = TaskBuilder::gate("one", out)
            .ordering_input(dir)
            .input(source)
            .build(&reg);
        let graph = PlannedGraph::new(vec![t], reg.snapshot());
        assert_eq!(
            graph.check().expect_err("dangling").to_string(),
            "task 'Gate one' waits on '<CreateBuildDirectory-/out/>', which no task produces"
        );
    }

    #[test]
    fn execution_order_puts_producers_first() {
        let reg = NodeRegistry::new();
        let obj = reg.path_node("/obj/a.o");
        let start = reg.virtual_node("start");
        let link = TaskBuilder::new(["Ld", "/bin/a"])
            .input(obj)
            .output(reg.path_node("/bin/a"))
            .build(&reg);
        let compile = TaskBuilder::new(["CompileC", "/obj/a.o"])
            .output(obj)
            .ordering_input(start)
            .build(&reg);
        let gate = TaskBuilder::gate("start", start).build(&reg);
        let other = TaskBuilder::new(["Touch", "/x"])
            .output(reg.path_node("/x"))
            .build(&reg);
        let graph = PlannedGraph::new(vec![link, compile, gate, other], reg.snapshot());
        let ids: Vec<_> = graph
            .execution_order()
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["Gate start", "CompileC /obj/a.o", "Ld /bin/a", "Touch /x"]);
    }

    #[test]
    fn acyclic_graph_passes() {
        let reg = NodeRegistry::new();
        let a = reg.virtual_node("a");
        let b = reg.virtual_node("b");
        let t1 = TaskBuilder::gate("one", a).build(&reg);
        let t2 = TaskBuilder::gate("two", b).ordering_input(a).build(&reg);
        let graph = PlannedGraph::new(vec![t1, t2], reg.snapshot());
        graph.check().expect("acyclic");
        assert_eq!(graph.gate_for(b).map(|t| t.id.as_str()), Some("Gate two"));
    }
}
