use std::collections::{HashMap, HashSet};

use crate::record::{AuditRecord, Pid};

/// A process in the reconstructed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNode {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub children: Vec<Pid>,
    /// The parent is the CI runner itself: this process is an action
    /// boundary.
    pub is_direct_child_of_runner: bool,
}

impl ProcessNode {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            parent: None,
            children: Vec::new(),
            is_direct_child_of_runner: false,
        }
    }
}

/// Process ancestry for one audit run, indexed by pid.
///
/// Nodes are keyed by pid alone, so a pid recycled within the run is
/// conflated with its earlier owner. A pid reported under a second parent
/// keeps the first one.
#[derive(Debug, Clone)]
pub struct ProcessTree {
    runner_pid: Pid,
    nodes: HashMap<Pid, ProcessNode>,
}

impl ProcessTree {
    /// Build the tree from `(parent_pid, pid)` tuples in any order.
    pub fn build(runner_pid: Pid, tuples: impl IntoIterator<Item = (Pid, Pid)>) -> Self {
        let mut tree = Self {
            runner_pid,
            nodes: HashMap::new(),
        };
        for (ppid, pid) in tuples {
            tree.link(ppid, pid);
        }
        tree
    }

    /// Build the tree from exec records, rooted by the synthetic
    /// `(runner_pid, tool_pid)` tuple.
    pub fn from_records(runner_pid: Pid, tool_pid: Pid, records: &[AuditRecord]) -> Self {
        let edges = records.iter().filter_map(AuditRecord::exec_edge);
        Self::build(runner_pid, std::iter::once((runner_pid, tool_pid)).chain(edges))
    }

    fn link(&mut self, ppid: Pid, pid: Pid) {
        if ppid == pid {
            tracing::warn!(pid, "process reported as its own parent; ignoring");
            return;
        }

        self.nodes.entry(ppid).or_insert_with(|| ProcessNode::new(ppid));
        let is_boundary = ppid == self.runner_pid;
        let node = self.nodes.entry(pid).or_insert_with(|| ProcessNode::new(pid));

        match node.parent {
            Some(existing) if existing == ppid => return,
            Some(existing) => {
                tracing::warn!(
                    pid,
                    kept_parent = existing,
                    ignored_parent = ppid,
                    "pid seen under two parents (pid reuse?); keeping the first"
                );
                return;
            }
            None => {
                node.parent = Some(ppid);
                node.is_direct_child_of_runner = is_boundary;
            }
        }

        if let Some(parent) = self.nodes.get_mut(&ppid) {
            parent.children.push(pid);
        }
    }

    pub fn runner_pid(&self) -> Pid {
        self.runner_pid
    }

    pub fn node(&self, pid: Pid) -> Option<&ProcessNode> {
        self.nodes.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The outermost boundary process on the chain from `pid` to the root,
    /// `pid` itself included. `None` when no boundary is on the chain or the
    /// pid is unknown.
    pub fn nearest_boundary_ancestor(&self, pid: Pid) -> Option<Pid> {
        let mut visited = HashSet::new();
        let mut current = Some(pid);
        let mut outermost = None;

        while let Some(pid) = current {
            if !visited.insert(pid) {
                tracing::warn!(pid, "cycle in process ancestry; stopping walk");
                break;
            }
            let Some(node) = self.nodes.get(&pid) else {
                break;
            };
            if node.is_direct_child_of_runner {
                outermost = Some(pid);
            }
            current = node.parent;
        }

        outermost
    }
}
