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

/*!
    Gantry plans the tasks of a build and the ordering between them.

    Given a resolved set of configured targets, their settings and their
    dependency edges, the planner produces a graph of concrete tasks
    (copying headers, compiling, linking, signing...) whose inputs and
    outputs encode every ordering constraint of the build. The graph is
    then lowered to [`n2`] for execution.

    Ordering between targets goes through *gates*: zero-work tasks that each
    target exposes at fixed points of its build ([`target_info`]). A target
    waits on a specific gate of each dependency rather than on its end,
    which lets compilation and linking of dependents start eagerly once the
    modules and linker inputs they need exist ([`policy`]).

    The rough steps of planning are:

    1. Load the project description into a [`global_plan::TargetGraph`]
        ([`project`]).
    2. Build the [`global_plan::GlobalProductPlan`], which allocates the gate
        nodes of every target up front.
    3. Run the planner ([`planner`]): start gates ([`order`]), then the task
        producers of every target ([`producer`]), then deferred work, then
        the exit gates.
    4. Lower the resulting [`graph::PlannedGraph`] to n2 ([`lower`]).
*/

#![warn(clippy::unwrap_used)] // We prefer clear panic messages

pub mod diagnostics;
pub mod dump;
pub mod global_plan;
pub mod graph;
pub mod layout;
pub mod lower;
pub mod model;
pub mod node;
pub mod order;
pub mod planner;
pub mod policy;
pub mod producer;
pub mod project;
pub mod settings;
pub mod target_info;
pub mod task;
