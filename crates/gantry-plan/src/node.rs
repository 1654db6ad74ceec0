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

//! Planned nodes: the things tasks consume and produce.
//!
//! Nodes are interned in a [`NodeRegistry`] shared by the whole planning
//! operation, so asking twice for the same path, virtual name or directory
//! tree yields the same [`NodeId`]. Gate fan-in relies on this.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use indexmap::IndexSet;

/// Handle of an interned node. Only meaningful together with the registry
/// (or [`NodeTable`]) that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The identity of a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A concrete file system path.
    Path(PathBuf),
    /// A named marker with no disk representation.
    Virtual(String),
    /// A directory subtree treated as a single dependency unit.
    DirectoryTree {
        root: PathBuf,
        excluding: Vec<String>,
    },
}

impl NodeKind {
    pub fn is_virtual(&self) -> bool {
        matches!(self, NodeKind::Virtual(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            NodeKind::Path(p) => Some(p),
            NodeKind::DirectoryTree { root, .. } => Some(root),
            NodeKind::Virtual(_) => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Path(p) => write!(f, "{}", p.display()),
            NodeKind::Virtual(name) => write!(f, "<{}>", name),
            NodeKind::DirectoryTree { root, excluding } if excluding.is_empty() => {
                write!(f, "{}/", root.display())
            }
            NodeKind::DirectoryTree { root, excluding } => {
                write!(f, "{}/ (excluding {})", root.display(), excluding.join(", "))
            }
        }
    }
}

/// The global, lock-protected node registry of one planning operation.
///
/// Producers of different targets may run concurrently, so interning goes
/// through a mutex. The critical section is a single hash lookup.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    table: Mutex<IndexSet<NodeKind>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, kind: NodeKind) -> NodeId {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let (index, _) = table.insert_full(kind);
        NodeId(index as u32)
    }

    pub fn path_node(&self, path: impl AsRef<Path>) -> NodeId {
        self.intern(NodeKind::Path(path.as_ref().to_path_buf()))
    }

    pub fn virtual_node(&self, name: impl Into<String>) -> NodeId {
        self.intern(NodeKind::Virtual(name.into()))
    }

    pub fn directory_tree_node(
        &self,
        root: impl AsRef<Path>,
        excluding: impl IntoIterator<Item = impl Into<String>>,
    ) -> NodeId {
        let mut excluding: Vec<String> = excluding.into_iter().map(Into::into).collect();
        // The exclusion list is a set, keep the identity independent of order
        excluding.sort();
        excluding.dedup();
        self.intern(NodeKind::DirectoryTree {
            root: root.as_ref().to_path_buf(),
            excluding,
        })
    }

    /// Returns the identity of a node previously interned here.
    pub fn kind(&self, id: NodeId) -> NodeKind {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .get_index(id.index())
            .cloned()
            .expect("Node id should come from this registry")
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze the current contents into an immutable table.
    pub fn snapshot(&self) -> NodeTable {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        NodeTable {
            nodes: table.clone(),
        }
    }
}

/// An immutable copy of a [`NodeRegistry`], handed out with the final graph.
#[derive(Clone, Debug, Default)]
pub struct NodeTable {
    nodes: IndexSet<NodeKind>,
}

impl NodeTable {
    pub fn get(&self, id: NodeId) -> &NodeKind {
        self.nodes
            .get_index(id.index())
            .expect("Node id should come from the registry of this plan")
    }

    pub fn find(&self, kind: &NodeKind) -> Option<NodeId> {
        self.nodes.get_index_of(kind).map(|i| NodeId(i as u32))
    }

    pub fn name(&self, id: NodeId) -> String {
        self.get(id).to_string()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeKind)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, k)| (NodeId(i as u32), k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_identity_same_node() {
        let reg = NodeRegistry::new();
        let a = reg.virtual_node("target-begin-A");
        let b = reg.virtual_node(String::from("target-begin-A"));
        assert_eq!(a, b);

        let p1 = reg.path_node("/tmp/out/a.o");
        let p2 = reg.path_node(PathBuf::from("/tmp/out/a.o"));
        assert_eq!(p1, p2);
        assert_ne!(a, p1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn virtual_and_path_with_same_text_differ() {
        let reg = NodeRegistry::new();
        assert_ne!(reg.virtual_node("x"), reg.path_node("x"));
    }

    #[test]
    fn directory_tree_exclusions_are_a_set() {
        let reg = NodeRegistry::new();
        let a = reg.directory_tree_node("/p/Headers", ["b", "a"]);
        let b = reg.directory_tree_node("/p/Headers", ["a", "b", "a"]);
        assert_eq!(a, b);
        let c = reg.directory_tree_node("/p/Headers", Vec::<String>::new());
        assert_ne!(a, c);
    }

    #[test]
    fn concurrent_interning_is_consistent() {
        let reg = NodeRegistry::new();
        let ids: Vec<Vec<NodeId>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        (0..50)
                            .map(|i| reg.virtual_node(format!("n{i}")))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread should not panic"))
                .collect()
        });
        for other in &ids[1..] {
            assert_eq!(&ids[0], other);
        }
        assert_eq!(reg.len(), 50);
    }

    #[test]
    fn snapshot_names() {
        let reg = NodeRegistry::new();
        let v = reg.virtual_node("gate");
        let p = reg.path_node("/a/b");
        let table = reg.snapshot();
        assert_eq!(table.name(v), "<gate>");
        assert_eq!(table.name(p), "/a/b");
        assert_eq!(table.find(&NodeKind::Virtual("gate".into())), Some(v));
    }
}
