//! Versioned object database.
//!
//! Holds the typed chain-state tables and a stack of nested undo sessions.
//! Every mutation made while a session is open records the prior value into
//! the innermost session; `undo` replays those records backwards, `squash`
//! merges the innermost session into its parent, and `commit` forgets undo
//! history at and below a revision, making those changes irreversible.
//! Mutations made with no open session are permanent (genesis bootstrap).

mod error;

pub use error::StateDbError;

use models::{
    AccountName, AccountObject, BlockId, DynamicGlobalPropertyObject, GlobalPropertyObject,
    ProducerObject, SignedTransaction, TransactionId, TypeName, TypeSchema,
};
use std::collections::{HashMap, VecDeque};
use time::UTime;

/// Session revisions. The chain controller aligns block-session revisions
/// with block numbers.
pub type Revision = u64;

enum UndoOp {
    Account(AccountName, Option<AccountObject>),
    Producer(AccountName, Option<ProducerObject>),
    Schema((AccountName, TypeName), Option<TypeSchema>),
    RecentTransaction(TransactionId, Option<SignedTransaction>),
    BlockSummary(u16, Option<BlockId>),
    Global(GlobalPropertyObject),
    Dynamic(DynamicGlobalPropertyObject),
}

struct UndoState {
    revision: Revision,
    ops: Vec<UndoOp>,
}

#[derive(Default)]
pub struct StateDb {
    accounts: HashMap<AccountName, AccountObject>,
    producers: HashMap<AccountName, ProducerObject>,
    schemas: HashMap<(AccountName, TypeName), TypeSchema>,
    recent_transactions: HashMap<TransactionId, SignedTransaction>,
    block_summaries: HashMap<u16, BlockId>,
    global: GlobalPropertyObject,
    dynamic: DynamicGlobalPropertyObject,
    undo_stack: VecDeque<UndoState>,
    revision: Revision,
}

impl StateDb {
    pub fn new() -> Self {
        Self::default()
    }

    // -- sessions ----------------------------------------------------------

    /// Open a nested undo session. Its revision is the parent's plus one.
    pub fn start_session(&mut self) -> Revision {
        self.revision += 1;
        self.undo_stack.push_back(UndoState {
            revision: self.revision,
            ops: Vec::new(),
        });
        self.revision
    }

    /// Revision of the innermost open session, or of the last committed
    /// state when no session is open.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Re-anchor the revision counter, so that future session revisions line
    /// up with block numbers after a replay. Only legal with no open session.
    pub fn set_revision(&mut self, revision: Revision) -> Result<(), StateDbError> {
        if !self.undo_stack.is_empty() {
            return Err(StateDbError::NoActiveSession);
        }
        self.revision = revision;
        Ok(())
    }

    pub fn session_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// True when at least one session can still be undone.
    pub fn undo_history_available(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Roll back the innermost session.
    pub fn undo(&mut self) -> Result<(), StateDbError> {
        let state = self
            .undo_stack
            .pop_back()
            .ok_or(StateDbError::NoActiveSession)?;
        for op in state.ops.into_iter().rev() {
            self.revert(op);
        }
        self.revision = state.revision - 1;
        Ok(())
    }

    /// Merge the innermost session into its parent. The parent keeps its own
    /// prior values: an object the parent already recorded keeps the older
    /// record, so undoing the parent restores pre-parent state.
    pub fn squash(&mut self) -> Result<(), StateDbError> {
        if self.undo_stack.len() < 2 {
            return Err(StateDbError::NothingToSquashInto);
        }
        let state = self
            .undo_stack
            .pop_back()
            .ok_or(StateDbError::NoActiveSession)?;
        let parent = self
            .undo_stack
            .back_mut()
            .ok_or(StateDbError::NoActiveSession)?;
        parent.ops.extend(state.ops);
        self.revision = state.revision - 1;
        Ok(())
    }

    /// Discard undo history for all sessions with revision <= `revision`,
    /// making their changes irreversible. Open outer sessions are untouched.
    pub fn commit(&mut self, revision: Revision) {
        while self
            .undo_stack
            .front()
            .map_or(false, |state| state.revision <= revision)
        {
            self.undo_stack.pop_front();
        }
    }

    fn record(&mut self, op: UndoOp) {
        if let Some(state) = self.undo_stack.back_mut() {
            state.ops.push(op);
        }
    }

    fn revert(&mut self, op: UndoOp) {
        match op {
            UndoOp::Account(name, Some(prev)) => {
                self.accounts.insert(name, prev);
            }
            UndoOp::Account(name, None) => {
                self.accounts.remove(&name);
            }
            UndoOp::Producer(name, Some(prev)) => {
                self.producers.insert(name, prev);
            }
            UndoOp::Producer(name, None) => {
                self.producers.remove(&name);
            }
            UndoOp::Schema(key, Some(prev)) => {
                self.schemas.insert(key, prev);
            }
            UndoOp::Schema(key, None) => {
                self.schemas.remove(&key);
            }
            UndoOp::RecentTransaction(id, Some(prev)) => {
                self.recent_transactions.insert(id, prev);
            }
            UndoOp::RecentTransaction(id, None) => {
                self.recent_transactions.remove(&id);
            }
            UndoOp::BlockSummary(index, Some(prev)) => {
                self.block_summaries.insert(index, prev);
            }
            UndoOp::BlockSummary(index, None) => {
                self.block_summaries.remove(&index);
            }
            UndoOp::Global(prev) => {
                self.global = prev;
            }
            UndoOp::Dynamic(prev) => {
                self.dynamic = prev;
            }
        }
    }

    // -- accounts ----------------------------------------------------------

    pub fn account(&self, name: &AccountName) -> Option<&AccountObject> {
        self.accounts.get(name)
    }

    pub fn put_account(&mut self, account: AccountObject) {
        let prev = self.accounts.insert(account.name.clone(), account.clone());
        self.record(UndoOp::Account(account.name, prev));
    }

    // -- producers ---------------------------------------------------------

    pub fn producer(&self, name: &AccountName) -> Option<&ProducerObject> {
        self.producers.get(name)
    }

    pub fn put_producer(&mut self, producer: ProducerObject) {
        let prev = self
            .producers
            .insert(producer.owner.clone(), producer.clone());
        self.record(UndoOp::Producer(producer.owner, prev));
    }

    pub fn producers(&self) -> impl Iterator<Item = &ProducerObject> {
        self.producers.values()
    }

    // -- type schemas ------------------------------------------------------

    pub fn type_schema(&self, scope: &AccountName, name: &TypeName) -> Option<&TypeSchema> {
        self.schemas.get(&(scope.clone(), name.clone()))
    }

    pub fn put_type_schema(&mut self, scope: AccountName, schema: TypeSchema) {
        let key = (scope, schema.name.clone());
        let prev = self.schemas.insert(key.clone(), schema);
        self.record(UndoOp::Schema(key, prev));
    }

    // -- recent transactions (uniqueness window) ---------------------------

    pub fn recent_transaction(&self, id: &TransactionId) -> Option<&SignedTransaction> {
        self.recent_transactions.get(id)
    }

    pub fn insert_recent_transaction(&mut self, id: TransactionId, trx: SignedTransaction) {
        let prev = self.recent_transactions.insert(id, trx);
        self.record(UndoOp::RecentTransaction(id, prev));
    }

    pub fn remove_recent_transaction(&mut self, id: &TransactionId) {
        if let Some(prev) = self.recent_transactions.remove(id) {
            self.record(UndoOp::RecentTransaction(*id, Some(prev)));
        }
    }

    /// Ids of recent transactions whose expiration is <= `now`.
    pub fn expired_transactions(&self, now: UTime) -> Vec<TransactionId> {
        self.recent_transactions
            .iter()
            .filter(|(_, trx)| trx.expiration <= now)
            .map(|(id, _)| *id)
            .collect()
    }

    // -- block summaries (TAPoS ring) --------------------------------------

    pub fn block_summary(&self, index: u16) -> Option<BlockId> {
        self.block_summaries.get(&index).copied()
    }

    pub fn put_block_summary(&mut self, index: u16, id: BlockId) {
        let prev = self.block_summaries.insert(index, id);
        self.record(UndoOp::BlockSummary(index, prev));
    }

    // -- global singletons -------------------------------------------------

    pub fn global(&self) -> &GlobalPropertyObject {
        &self.global
    }

    pub fn put_global(&mut self, global: GlobalPropertyObject) {
        let prev = std::mem::replace(&mut self.global, global);
        self.record(UndoOp::Global(prev));
    }

    pub fn dynamic(&self) -> &DynamicGlobalPropertyObject {
        &self.dynamic
    }

    pub fn put_dynamic(&mut self, dynamic: DynamicGlobalPropertyObject) {
        let prev = std::mem::replace(&mut self.dynamic, dynamic);
        self.record(UndoOp::Dynamic(prev));
    }
}
