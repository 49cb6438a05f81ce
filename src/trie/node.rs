//! Hash-trie nodes
//!
//! A trie is immutable once written. Branches have exactly `fan_out` slots;
//! a leaf names a page of its segment by index.

use serde::{Deserialize, Serialize};

use crate::errors::{ChronoError, ChronoResult};

use super::bucketer::{Bucketer, Path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// One slot per bucket; `None` where no rows hash under that bucket
    Branch(Vec<Option<Node>>),
    /// A page of rows sorted by iid, then system_from descending
    Leaf { page_idx: usize },
}

impl Node {
    pub fn leaf(page_idx: usize) -> Self {
        Node::Leaf { page_idx }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Child in `bucket`; `None` for leaves and absent children
    pub fn child(&self, bucket: usize) -> Option<&Node> {
        match self {
            Node::Branch(children) => children.get(bucket).and_then(Option::as_ref),
            Node::Leaf { .. } => None,
        }
    }
}

/// Root of a segment's trie plus the bucket width it was written with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTrie {
    root: Option<Node>,
    bucketer: Bucketer,
}

impl HashTrie {
    pub fn new(root: Option<Node>, bucketer: Bucketer) -> Self {
        Self { root, bucketer }
    }

    pub fn empty(bucketer: Bucketer) -> Self {
        Self::new(None, bucketer)
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    pub fn bucketer(&self) -> Bucketer {
        self.bucketer
    }

    /// Every leaf with its path, in ascending path order
    pub fn leaves(&self) -> Vec<(Path, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(Path, &Node)> = Vec::new();
        if let Some(root) = &self.root {
            stack.push((Vec::new(), root));
        }

        while let Some((path, node)) = stack.pop() {
            match node {
                Node::Leaf { page_idx } => out.push((path, *page_idx)),
                Node::Branch(children) => {
                    for (bucket, child) in children.iter().enumerate().rev() {
                        if let Some(child) = child {
                            stack.push((Bucketer::conj_path(&path, bucket as u8), child));
                        }
                    }
                }
            }
        }

        out
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Deepest leaf level; 0 for an empty trie or a lone root leaf
    pub fn depth(&self) -> usize {
        self.leaves()
            .iter()
            .map(|(path, _)| path.len())
            .max()
            .unwrap_or(0)
    }

    /// Flattens into a post-order node table. Children precede their parent,
    /// so every branch entry refers only to earlier indices.
    pub fn to_table(&self) -> (Vec<NodeEntry>, Option<usize>) {
        let mut table = Vec::new();
        let root = self.root.as_ref().map(|root| flatten(root, &mut table));
        (table, root)
    }

    /// Rebuilds a trie from a post-order node table.
    pub fn from_table(
        table: &[NodeEntry],
        root: Option<usize>,
        bucketer: Bucketer,
        page_count: usize,
    ) -> ChronoResult<Self> {
        let root = match root {
            None => None,
            Some(idx) => rebuild(table, idx, 0, &bucketer, page_count)?,
        };
        Ok(Self::new(root, bucketer))
    }
}

/// One entry of a persisted node table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeEntry {
    Null,
    Branch { children: Vec<usize> },
    Leaf { page: usize },
}

fn flatten(node: &Node, table: &mut Vec<NodeEntry>) -> usize {
    let entry = match node {
        Node::Leaf { page_idx } => NodeEntry::Leaf { page: *page_idx },
        Node::Branch(children) => {
            let children = children
                .iter()
                .map(|child| match child {
                    Some(child) => flatten(child, table),
                    None => {
                        table.push(NodeEntry::Null);
                        table.len() - 1
                    }
                })
                .collect();
            NodeEntry::Branch { children }
        }
    };
    table.push(entry);
    table.len() - 1
}

fn rebuild(
    table: &[NodeEntry],
    idx: usize,
    depth: usize,
    bucketer: &Bucketer,
    page_count: usize,
) -> ChronoResult<Option<Node>> {
    let fan_out = bucketer.fan_out();
    let entry = table
        .get(idx)
        .ok_or_else(|| ChronoError::corruption(format!("node index {} out of range", idx)))?;

    match entry {
        NodeEntry::Null => Ok(None),
        NodeEntry::Leaf { page } => {
            if *page >= page_count {
                return Err(ChronoError::corruption(format!(
                    "leaf refers to page {} of {}",
                    page, page_count
                )));
            }
            Ok(Some(Node::leaf(*page)))
        }
        NodeEntry::Branch { children } => {
            // a branch at the last level would need bits past the iid
            if depth >= bucketer.max_depth() {
                return Err(ChronoError::corruption(format!(
                    "branch at node {} sits at depth {}, past the maximum of {}",
                    idx,
                    depth,
                    bucketer.max_depth()
                )));
            }
            if children.len() != fan_out {
                return Err(ChronoError::corruption(format!(
                    "branch at node {} has {} children, expected {}",
                    idx,
                    children.len(),
                    fan_out
                )));
            }
            // post-order: a child can only precede its parent, which also
            // rules out cycles
            if let Some(bad) = children.iter().find(|&&child| child >= idx) {
                return Err(ChronoError::corruption(format!(
                    "branch at node {} refers forward to node {}",
                    idx, bad
                )));
            }
            let children = children
                .iter()
                .map(|&child| rebuild(table, child, depth + 1, bucketer, page_count))
                .collect::<ChronoResult<Vec<_>>>()?;
            Ok(Some(Node::Branch(children)))
        }
    }
}
