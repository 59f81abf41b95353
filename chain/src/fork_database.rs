//! In-memory tree of candidate blocks within the irreversibility window.
//!
//! Nodes live in an arena keyed by block id; parent links are id values, so
//! there is no ownership between nodes. The head is the node with the
//! greatest block number, ties broken by smallest id. The fork database
//! never touches the object store.

use crate::error::ChainError;
use models::{BlockId, SignedBlock};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct ForkNode {
    pub block: SignedBlock,
    pub id: BlockId,
    pub parent_id: BlockId,
    pub block_num: u32,
    /// Set once the block has been applied on the current branch.
    pub in_current_branch: bool,
}

/// Branches returned by `fetch_branch_from`: block ids tip-first, each chain
/// ending on a child of the least common ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPair {
    pub from_first: Vec<BlockId>,
    pub from_second: Vec<BlockId>,
}

#[derive(Default)]
pub struct ForkDatabase {
    nodes: HashMap<BlockId, ForkNode>,
    by_num: BTreeMap<u32, HashSet<BlockId>>,
    head: Option<BlockId>,
}

impl ForkDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &BlockId) -> Option<&ForkNode> {
        self.nodes.get(id)
    }

    pub fn head(&self) -> Option<&ForkNode> {
        self.head.as_ref().and_then(|id| self.nodes.get(id))
    }

    /// Seed the tree with an already-applied block (the replay head), which
    /// becomes the root every later block must descend from.
    pub fn set_root(&mut self, block: SignedBlock) -> Result<(), ChainError> {
        let id = block.id()?;
        let node = ForkNode {
            parent_id: block.header.parent_id,
            block_num: block.block_num(),
            block,
            id,
            in_current_branch: true,
        };
        self.index(node);
        self.head = Some(id);
        Ok(())
    }

    /// Insert a block and return the id of the resulting best head.
    ///
    /// The parent must already be tracked, or the block must directly extend
    /// the applied chain head (first insertion, or re-extension after pops).
    pub fn add(&mut self, block: SignedBlock, chain_head: &BlockId) -> Result<BlockId, ChainError> {
        let id = block.id()?;
        let parent_id = block.header.parent_id;
        if !self.nodes.contains_key(&parent_id) && parent_id != *chain_head {
            return Err(ChainError::UnknownParent(parent_id));
        }
        let node = ForkNode {
            parent_id,
            block_num: block.block_num(),
            block,
            id,
            in_current_branch: false,
        };
        self.index(node);
        self.update_head(id);
        self.head.ok_or_else(|| {
            ChainError::ContainerInconsistency("fork head missing after insertion".into())
        })
    }

    fn index(&mut self, node: ForkNode) {
        self.by_num.entry(node.block_num).or_default().insert(node.id);
        self.nodes.insert(node.id, node);
    }

    fn update_head(&mut self, candidate: BlockId) {
        let candidate_num = self.nodes[&candidate].block_num;
        let better = match self.head {
            None => true,
            Some(head) => {
                let head_num = self.nodes[&head].block_num;
                candidate_num > head_num || (candidate_num == head_num && candidate < head)
            }
        };
        if better {
            self.head = Some(candidate);
        }
    }

    fn recompute_head(&mut self) {
        self.head = None;
        let candidates: Vec<BlockId> = self.nodes.keys().copied().collect();
        for id in candidates {
            self.update_head(id);
        }
    }

    pub fn set_in_current_branch(&mut self, id: &BlockId, value: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.in_current_branch = value;
        }
    }

    /// Rewind the head pointer past a popped block. The popped node stays in
    /// the tree; only the head moves, and only if it pointed at the popped
    /// block.
    pub fn pop_head(&mut self, popped: &BlockId) {
        if self.head == Some(*popped) {
            self.head = self
                .nodes
                .get(popped)
                .map(|node| node.parent_id)
                .filter(|parent| self.nodes.contains_key(parent));
        }
    }

    /// Id of the current-branch block with the given number, if tracked.
    pub fn current_branch_id(&self, block_num: u32) -> Option<BlockId> {
        self.by_num.get(&block_num).and_then(|ids| {
            ids.iter()
                .find(|id| self.nodes[*id].in_current_branch)
                .copied()
        })
    }

    /// Remove a block and its whole subtree.
    pub fn remove_subtree(&mut self, id: &BlockId) {
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            let children: Vec<BlockId> = self
                .nodes
                .values()
                .filter(|node| node.parent_id == current)
                .map(|node| node.id)
                .collect();
            stack.extend(children);
            if let Some(node) = self.nodes.remove(&current) {
                if let Some(ids) = self.by_num.get_mut(&node.block_num) {
                    ids.remove(&current);
                    if ids.is_empty() {
                        self.by_num.remove(&node.block_num);
                    }
                }
            }
        }
        if self.head.map_or(false, |head| !self.nodes.contains_key(&head)) {
            self.recompute_head();
        }
    }

    /// Drop every node with a number strictly below `block_num`. The
    /// freshly-irreversible block stays as the tree root.
    pub fn prune(&mut self, block_num: u32) {
        let stale: Vec<BlockId> = self
            .by_num
            .range(..block_num)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        for id in stale {
            if let Some(node) = self.nodes.remove(&id) {
                if let Some(ids) = self.by_num.get_mut(&node.block_num) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.by_num.remove(&node.block_num);
                    }
                }
            }
        }
        if self.head.map_or(false, |head| !self.nodes.contains_key(&head)) {
            self.recompute_head();
        }
    }

    /// Walk two tips down to their least common ancestor. Returns both
    /// chains tip-first, excluding the ancestor itself.
    pub fn fetch_branch_from(
        &self,
        first: &BlockId,
        second: &BlockId,
    ) -> Result<BranchPair, ChainError> {
        let mut first_node = self
            .nodes
            .get(first)
            .ok_or_else(|| ChainError::ContainerInconsistency(format!("missing fork node {}", first)))?;
        let mut second_node = self
            .nodes
            .get(second)
            .ok_or_else(|| ChainError::ContainerInconsistency(format!("missing fork node {}", second)))?;

        let mut from_first = Vec::new();
        let mut from_second = Vec::new();

        while first_node.block_num > second_node.block_num {
            from_first.push(first_node.id);
            first_node = self.parent_of(first_node)?;
        }
        while second_node.block_num > first_node.block_num {
            from_second.push(second_node.id);
            second_node = self.parent_of(second_node)?;
        }
        while first_node.id != second_node.id {
            from_first.push(first_node.id);
            from_second.push(second_node.id);
            first_node = self.parent_of(first_node)?;
            second_node = self.parent_of(second_node)?;
        }
        Ok(BranchPair {
            from_first,
            from_second,
        })
    }

    fn parent_of(&self, node: &ForkNode) -> Result<&ForkNode, ChainError> {
        self.nodes.get(&node.parent_id).ok_or_else(|| {
            ChainError::ContainerInconsistency(format!(
                "fork node {} has no parent in the tree",
                node.id
            ))
        })
    }
}
