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

//! Loading of JSON project descriptions into a [`TargetGraph`].
//!
//! A project description declares targets by name. Loading resolves every
//! reference, drops dependency edges excluded by their platform filter,
//! rejects cycles, and computes the build order: dependencies first, ties
//! broken by declaration order.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::{
    global_plan::{DEFAULT_CONFIGURATION, DEFAULT_PLATFORM, TargetGraph},
    graph::get_example_cycle,
    model::{BuildPhase, ProductType, ResolvedTargetDependency, Target, TargetId, TargetType},
    settings::BuildSettings,
};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("failed to read project description {}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse project description")]
    Json(#[from] serde_json::Error),

    #[error("target '{0}' is declared more than once")]
    DuplicateTarget(String),

    #[error("target '{target}' depends on unknown target '{dependency}'")]
    UnknownDependency { target: String, dependency: String },

    #[error("target '{target}' is hosted by unknown target '{host}'")]
    UnknownHost { target: String, host: String },

    #[error("target '{0}' cannot host itself")]
    SelfHosted(String),

    #[error("build order names unknown target '{0}'")]
    UnknownOrderEntry(String),

    #[error("build order must list every target exactly once")]
    IncompleteOrder,

    #[error("build order puts '{target}' before its dependency '{dependency}'")]
    OrderViolatesDependency { target: String, dependency: String },

    #[error("dependency cycle found: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectDescription {
    #[serde(default = "default_configuration")]
    pub configuration: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Settings every target inherits.
    #[serde(default)]
    pub settings: BuildSettings,
    pub targets: Vec<TargetDescription>,
    /// An explicit build order, by target name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
}

fn default_configuration() -> String {
    DEFAULT_CONFIGURATION.into()
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetDescription {
    pub name: String,
    #[serde(rename = "type", default)]
    pub target_type: TargetType,
    #[serde(rename = "product", default)]
    pub product_type: ProductType,
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub settings: BuildSettings,
    #[serde(default)]
    pub dependencies: Vec<DependencyDescription>,
    /// The target whose product embeds this one.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub phases: Vec<BuildPhase>,
    #[serde(default)]
    pub xcframework_outputs: Vec<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyDescription {
    Name(String),
    Detailed {
        target: String,
        #[serde(default)]
        implicit: bool,
        #[serde(default)]
        platform_filters: Vec<String>,
    },
}

impl DependencyDescription {
    fn target(&self) -> &str {
        match self {
            DependencyDescription::Name(name) => name,
            DependencyDescription::Detailed { target, .. } => target,
        }
    }
}

impl ProjectDescription {
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ProjectError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Resolves the description into a target graph.
    pub fn into_target_graph(self) -> Result<TargetGraph, ProjectError> {
        let mut index: IndexMap<String, usize> = IndexMap::new();
        for (i, t) in self.targets.iter().enumerate() {
            if index.insert(t.name.clone(), i).is_some() {
                return Err(ProjectError::DuplicateTarget(t.name.clone()));
            }
        }

        // Resolve every reference before touching the builder.
        let mut edges: Vec<Vec<(usize, ResolvedDependency)>> = Vec::with_capacity(self.targets.len());
        let mut hosts: Vec<Option<usize>> = Vec::with_capacity(self.targets.len());
        for t in &self.targets {
            let platform = t.platform.as_deref().unwrap_or(&self.platform);
            let mut deps = vec![];
            for dep in &t.dependencies {
                let Some(&to) = index.get(dep.target()) else {
                    return Err(ProjectError::UnknownDependency {
                        target: t.name.clone(),
                        dependency: dep.target().to_string(),
                    });
                };
                let (implicit, platform_filters) = match dep {
                    DependencyDescription::Name(_) => (false, vec![]),
                    DependencyDescription::Detailed {
                        implicit,
                        platform_filters,
                        ..
                    } => (*implicit, platform_filters.clone()),
                };
                if !platform_filters.is_empty() && !platform_filters.iter().any(|p| p == platform)
                {
                    debug!(
                        "{}: dependency on {} excluded on {}",
                        t.name,
                        dep.target(),
                        platform
                    );
                    continue;
                }
                deps.push((
                    to,
                    ResolvedDependency {
                        implicit,
                        platform_filters,
                    },
                ));
            }
            edges.push(deps);

            let host = match &t.host {
                None => None,
                Some(host) if *host == t.name => {
                    return Err(ProjectError::SelfHosted(t.name.clone()));
                }
                Some(host) => match index.get(host) {
                    Some(&h) => Some(h),
                    None => {
                        return Err(ProjectError::UnknownHost {
                            target: t.name.clone(),
                            host: host.clone(),
                        });
                    }
                },
            };
            hosts.push(host);
        }

        check_acyclic(&self.targets, &edges)?;
        let order = match &self.order {
            Some(order) => explicit_order(order, &index, &edges, &self.targets)?,
            None => dependency_order(&edges),
        };

        let mut builder = TargetGraph::builder();
        let mut ids: Vec<TargetId> = Vec::with_capacity(self.targets.len());
        for t in &self.targets {
            let configuration = t.configuration.as_deref().unwrap_or(&self.configuration);
            let platform = t.platform.as_deref().unwrap_or(&self.platform);
            let target = Target {
                name: t.name.clone(),
                target_type: t.target_type,
                product_type: t.product_type,
                phases: t.phases.clone(),
                xcframework_outputs: t.xcframework_outputs.clone(),
            };
            let settings = self.settings.layered(&t.settings);
            ids.push(builder.target_with(target, configuration, platform, settings));
        }
        for (from, deps) in edges.into_iter().enumerate() {
            for (to, dep) in deps {
                builder.dependency(
                    ids[from],
                    ResolvedTargetDependency {
                        target: ids[to],
                        implicit: dep.implicit,
                        platform_filters: dep.platform_filters,
                    },
                );
            }
        }
        for (hosted, host) in hosts.into_iter().enumerate() {
            if let Some(host) = host {
                builder.host(ids[hosted], ids[host]);
            }
        }
        Ok(builder.finish_with_order(order.into_iter().map(|i| ids[i]).collect()))
    }
}

struct ResolvedDependency {
    implicit: bool,
    platform_filters: Vec<String>,
}

fn check_acyclic(
    targets: &[TargetDescription],
    edges: &[Vec<(usize, ResolvedDependency)>],
) -> Result<(), ProjectError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(targets.len(), 0);
    let nodes: Vec<NodeIndex> = (0..targets.len()).map(|i| graph.add_node(i)).collect();
    for (from, deps) in edges.iter().enumerate() {
        for (to, _) in deps {
            graph.add_edge(nodes[from], nodes[*to], ());
        }
    }
    match petgraph::algo::toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => {
            let cycle = get_example_cycle(&graph, cycle.node_id());
            Err(ProjectError::Cycle(
                cycle
                    .into_iter()
                    .map(|n| targets[graph[n]].name.clone())
                    .collect(),
            ))
        }
    }
}

/// Resolves a user supplied build order. Every target must appear once, and
/// after all of its dependencies.
fn explicit_order(
    order: &[String],
    index: &IndexMap<String, usize>,
    edges: &[Vec<(usize, ResolvedDependency)>],
    targets: &[TargetDescription],
) -> Result<Vec<usize>, ProjectError> {
    let mut seen = vec![false; index.len()];
    let mut resolved = Vec::with_capacity(order.len());
    for name in order {
        let Some(&i) = index.get(name) else {
            return Err(ProjectError::UnknownOrderEntry(name.clone()));
        };
        if std::mem::replace(&mut seen[i], true) {
            return Err(ProjectError::IncompleteOrder);
        }
        resolved.push(i);
    }
    if resolved.len() != index.len() {
        return Err(ProjectError::IncompleteOrder);
    }
    let mut position = vec![0; resolved.len()];
    for (pos, &i) in resolved.iter().enumerate() {
        position[i] = pos;
    }
    for (from, deps) in edges.iter().enumerate() {
        if let Some((to, _)) = deps.iter().find(|(to, _)| position[*to] > position[from]) {
            return Err(ProjectError::OrderViolatesDependency {
                target: targets[from].name.clone(),
                dependency: targets[*to].name.clone(),
            });
        }
    }
    Ok(resolved)
}

/// Post-order over the dependency edges, starting from each target in
/// declaration order. The graph must be acyclic.
fn dependency_order(edges: &[Vec<(usize, ResolvedDependency)>]) -> Vec<usize> {
    let mut visited = vec![false; edges.len()];
    let mut order = Vec::with_capacity(edges.len());
    for root in 0..edges.len() {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        // (target, index of the next dependency to visit)
        let mut stack = vec![(root, 0)];
        while let Some((node, next)) = stack.last_mut() {
            if let Some((dep, _)) = edges[*node].get(*next) {
                *next += 1;
                if !visited[*dep] {
                    visited[*dep] = true;
                    stack.push((*dep, 0));
                }
            } else {
                order.push(*node);
                stack.pop();
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(graph: &TargetGraph) -> Vec<&str> {
        graph
            .order()
            .iter()
            .map(|&t| graph.target(t).name())
            .collect()
    }

    #[test]
    fn orders_dependencies_first() {
        let project = ProjectDescription::parse(
            r#"{
                "targets": [
                    { "name": "App", "product": "application", "dependencies": ["Kit", "Util"] },
                    { "name": "Kit", "product": "framework", "dependencies": ["Util"] },
                    { "name": "Util" }
                ]
            }"#,
        )
        .expect("parse");
        let graph = project.into_target_graph().expect("resolve");
        assert_eq!(names(&graph), ["Util", "Kit", "App"]);
    }

    #[test]
    fn drops_filtered_dependencies() {
        let project = ProjectDescription::parse(
            r#"{
                "platform": "macos",
                "targets": [
                    { "name": "A", "dependencies": [{ "target": "B", "platform_filters": ["ios"] }] },
                    { "name": "B" }
                ]
            }"#,
        )
        .expect("parse");
        let graph = project.into_target_graph().expect("resolve");
        let a = graph.order()[0];
        assert_eq!(graph.target(a).name(), "A");
    }

    #[test]
    fn rejects_cycles() {
        let project = ProjectDescription::parse(
            r#"{
                "targets": [
                    { "name": "A", "dependencies": ["B"] },
                    { "name": "B", "dependencies": ["A"] }
                ]
            }"#,
        )
        .expect("parse");
        let err = project.into_target_graph().expect_err("cycle");
        assert!(matches!(err, ProjectError::Cycle(ref c) if c.len() == 3 && c[0] == c[2]));
    }

    #[test]
    fn rejects_unknown_references() {
        let project = ProjectDescription::parse(
            r#"{ "targets": [ { "name": "A", "dependencies": ["Missing"] } ] }"#,
        )
        .expect("parse");
        assert_eq!(
            project.into_target_graph().expect_err("unknown").to_string(),
            "target 'A' depends on unknown target 'Missing'"
        );

        let project = ProjectDescription::parse(
            r#"{ "targets": [ { "name": "A", "host": "A" } ] }"#,
        )
        .expect("parse");
        assert!(matches!(
            project.into_target_graph(),
            Err(ProjectError::SelfHosted(_))
        ));
    }

    #[test]
    fn explicit_order_must_be_complete() {
        let project = ProjectDescription::parse(
            r#"{ "targets": [ { "name": "A" }, { "name": "B" } ], "order": ["B"] }"#,
        )
        .expect("parse");
        assert!(matches!(
            project.into_target_graph(),
            Err(ProjectError::IncompleteOrder)
        ));
    }

    #[test]
    fn explicit_order_must_follow_dependencies() {
        let project = ProjectDescription::parse(
            r#"{
                "targets": [ { "name": "A" }, { "name": "B", "dependencies": ["A"] } ],
                "order": ["B", "A"]
            }"#,
        )
        .expect("parse");
        match project.into_target_graph() {
            Err(ProjectError::OrderViolatesDependency { target, dependency }) => {
                assert_eq!(target, "B");
                assert_eq!(dependency, "A");
            }
            other => panic!("unexpected result: {:?}", other.map(|g| g.len())),
        }

        let project = ProjectDescription::parse(
            r#"{
                "targets": [ { "name": "A" }, { "name": "B", "dependencies": ["A"] }, { "name": "C" } ],
                "order": ["C", "A", "B"]
            }"#,
        )
        .expect("parse");
        let graph = project.into_target_graph().expect("valid order");
        assert_eq!(names(&graph), vec!["C", "A", "B"]);
    }

    #[test]
    fn project_settings_sit_beneath_target_settings() {
        use crate::settings::SettingsScope;

        let project = ProjectDescription::parse(
            r#"{
                "settings": { "PRODUCT_NAME": "Base", "OBJROOT": "/obj" },
                "targets": [ { "name": "A", "settings": { "PRODUCT_NAME": "Custom" } } ]
            }"#,
        )
        .expect("parse");
        let graph = project.into_target_graph().expect("resolve");
        let plan = crate::global_plan::GlobalProductPlan::new(graph, Default::default());
        let a = plan.all_targets()[0];
        assert_eq!(plan.settings(a).evaluate_string("PRODUCT_NAME"), "Custom");
        assert_eq!(plan.settings(a).evaluate_string("OBJROOT"), "/obj");
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("project.json");
        std::fs::write(&path, r#"{ "targets": [ { "name": "A" } ] }"#).expect("write");
        let project = ProjectDescription::load(&path).expect("load");
        assert_eq!(project.targets.len(), 1);

        let missing = dir.path().join("missing.json");
        let err = ProjectDescription::load(&missing).expect_err("missing file");
        assert!(matches!(err, ProjectError::Io { ref path, .. } if *path == missing));
    }
}
