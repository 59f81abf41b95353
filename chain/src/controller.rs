//! The chain controller: block/transaction ingestion, fork choice and
//! reorganization, block generation, and head-state queries.
//!
//! Single-writer: callers serialize all mutating operations externally.
//! Every mutation runs inside nested state-database sessions, so any error
//! rolls the affected transaction or block back completely.

use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::fork_database::ForkDatabase;
use crate::handlers::{
    ApplyContext, ApplyHandler, HandlerRegistry, MessageValidateContext, MessageValidateHandler,
    PreconditionContext, PreconditionValidateHandler,
};
use crate::initializer::{ChainInitializer, InitContext};
use crate::schedule::{shuffled_round, top_voted_producers};
use crate::signal::Signal;
use crate::timeslots;
use crate::validation::{self, AuthorityChecker};
use crypto::hash::Hash;
use crypto::signature::{PrivateKey, SignatureEngine};
use models::{
    transaction_merkle_root, AccountName, BlockHeader, BlockId, DynamicGlobalPropertyObject,
    GlobalPropertyObject, Message, ProducerObject, SerializeCompact, SignedBlock,
    SignedTransaction, TransactionId, TypeName, TypeSchema,
};
use statedb::StateDb;
use storage::BlockLog;
use std::collections::{BTreeMap, HashSet, VecDeque};
use time::UTime;
use tracing::{debug, info, warn};

/// Longest base-schema chain followed when checking message payloads.
const MAX_TYPE_DEPTH: usize = 16;

pub struct ChainController {
    cfg: ChainConfig,
    db: StateDb,
    fork_db: ForkDatabase,
    block_log: BlockLog,
    registry: HandlerRegistry,
    engine: SignatureEngine,

    pending_transactions: VecDeque<SignedTransaction>,
    popped_transactions: Vec<SignedTransaction>,
    pending_session_open: bool,

    producing: bool,
    skip_flags: u32,
    checkpoints: BTreeMap<u32, BlockId>,

    applied_block: Signal<SignedBlock>,
    on_pending_transaction: Signal<SignedTransaction>,
}

impl ChainController {
    /// Boot a controller: run the initializer against an empty state, then
    /// replay whatever the block log already holds.
    pub fn new(
        cfg: ChainConfig,
        block_log: BlockLog,
        initializer: &dyn ChainInitializer,
    ) -> Result<Self, ChainError> {
        let mut controller = ChainController {
            cfg,
            db: StateDb::new(),
            fork_db: ForkDatabase::new(),
            block_log,
            registry: HandlerRegistry::new(),
            engine: SignatureEngine::new(),
            pending_transactions: VecDeque::new(),
            popped_transactions: Vec::new(),
            pending_session_open: false,
            producing: false,
            skip_flags: validation::SKIP_NOTHING,
            checkpoints: BTreeMap::new(),
            applied_block: Signal::new(),
            on_pending_transaction: Signal::new(),
        };
        controller.initialize_chain(initializer)?;
        controller.replay()?;
        Ok(controller)
    }

    fn initialize_chain(&mut self, initializer: &dyn ChainInitializer) -> Result<(), ChainError> {
        let genesis_time = initializer
            .chain_start_time()
            .aligned_down(self.cfg.block_interval)?;
        let messages = {
            let mut ctx = InitContext {
                db: &mut self.db,
                registry: &mut self.registry,
            };
            initializer.prepare_database(&mut ctx)?
        };
        let start_producers = initializer.chain_start_producers();
        for name in start_producers.iter() {
            if self.db.producer(name).is_none() {
                return Err(ChainError::ContainerInconsistency(format!(
                    "initializer did not create producer {}",
                    name
                )));
            }
        }

        self.db.put_global(GlobalPropertyObject {
            configuration: initializer.chain_start_configuration(),
            active_producers: start_producers,
        });
        let dynamic = DynamicGlobalPropertyObject {
            head_block_time: genesis_time,
            ..Default::default()
        };
        self.db.put_dynamic(dynamic);
        // let early transactions reference the empty chain
        self.db.put_block_summary(0, BlockId::zero());

        for message in messages {
            self.apply_bootstrap_message(&message)?;
        }
        info!(
            genesis_time = %genesis_time,
            producers = self.db.global().active_producers.len(),
            "chain state initialized"
        );
        Ok(())
    }

    /// Bootstrap messages run before block 1 with no validation and no undo
    /// session; they are part of genesis.
    fn apply_bootstrap_message(&mut self, message: &Message) -> Result<(), ChainError> {
        let handler = self
            .registry
            .apply_handler(&message.recipient, &message.scope, &message.type_name)
            .ok_or_else(|| ChainError::HandlerMissing {
                contract: message.recipient.clone(),
                scope: message.scope.clone(),
                action: message.type_name.clone(),
            })?;
        let mut ctx = ApplyContext {
            db: &mut self.db,
            message,
            block_num: 0,
            transaction_id: TransactionId::from_bytes(&Hash::zero().to_bytes()),
            skip_asserts: false,
        };
        handler(&mut ctx)
    }

    /// Linearly re-apply the block log with the known-good-history skip set,
    /// then resume fork-tracked operation at the log head.
    fn replay(&mut self) -> Result<(), ChainError> {
        let last = match self.block_log.last_block_num()? {
            Some(last) => last,
            None => return Ok(()),
        };
        info!("replaying {} blocks from the block log", last);
        for num in 1..=last {
            let block = self.block_log.read_block(num)?.ok_or_else(|| {
                ChainError::ContainerInconsistency(format!(
                    "block {} missing from the block log",
                    num
                ))
            })?;
            self.with_skip_flags(validation::REPLAY_SKIP_FLAGS, |c| {
                c.apply_block_inner(&block)
            })?;
        }
        // everything in the log is irreversible by construction
        let mut dynamic = self.db.dynamic().clone();
        dynamic.last_irreversible_block_num = last;
        self.db.put_dynamic(dynamic);
        self.db.set_revision(last as u64)?;
        let head = self.block_log.read_block(last)?.ok_or_else(|| {
            ChainError::ContainerInconsistency("replayed head vanished from the block log".into())
        })?;
        self.fork_db.set_root(head)?;
        Ok(())
    }

    // -- scoped modifiers --------------------------------------------------

    /// Run `f` with the given validation skip bits, restoring the previous
    /// bits on every exit path.
    pub fn with_skip_flags<R>(&mut self, flags: u32, f: impl FnOnce(&mut Self) -> R) -> R {
        struct Guard<'a> {
            ctrl: &'a mut ChainController,
            old: u32,
        }
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.ctrl.skip_flags = self.old;
            }
        }
        let old = self.skip_flags;
        self.skip_flags = flags;
        let mut guard = Guard { ctrl: self, old };
        f(&mut *guard.ctrl)
    }

    /// Run `f` with the producing bit set, restoring it on every exit path.
    pub fn with_producing<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        struct Guard<'a> {
            ctrl: &'a mut ChainController,
            old: bool,
        }
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.ctrl.producing = self.old;
            }
        }
        let old = self.producing;
        self.producing = true;
        let mut guard = Guard { ctrl: self, old };
        f(&mut *guard.ctrl)
    }

    /// Run `f` with the pending state stashed away. On exit the stashed
    /// transactions (plus any recovered from popped blocks) are re-submitted
    /// best-effort; those that no longer validate are dropped.
    pub fn without_pending_transactions<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        struct Guard<'a> {
            ctrl: &'a mut ChainController,
            saved: VecDeque<SignedTransaction>,
        }
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                let popped = std::mem::take(&mut self.ctrl.popped_transactions);
                let saved = std::mem::take(&mut self.saved);
                for trx in popped.into_iter().chain(saved) {
                    let id = trx.id();
                    if let Err(err) = self.ctrl.push_transaction(trx, validation::SKIP_NOTHING) {
                        debug!(?id, %err, "pending transaction dropped on re-submission");
                    }
                }
            }
        }
        let saved = std::mem::take(&mut self.pending_transactions);
        if let Err(err) = self.close_pending_session() {
            warn!(%err, "could not close the pending session");
        }
        let mut guard = Guard { ctrl: self, saved };
        f(&mut *guard.ctrl)
    }

    pub fn is_producing(&self) -> bool {
        self.producing
    }

    // -- transactions ------------------------------------------------------

    /// Validate and provisionally apply a transaction on top of the pending
    /// state. On success it is queued for the next generated block and the
    /// pending signal fires.
    pub fn push_transaction(
        &mut self,
        trx: SignedTransaction,
        skip: u32,
    ) -> Result<(), ChainError> {
        self.with_skip_flags(skip, |c| c._push_transaction(trx))
    }

    fn _push_transaction(&mut self, trx: SignedTransaction) -> Result<(), ChainError> {
        if !self.pending_session_open {
            self.db.start_session();
            self.pending_session_open = true;
        }
        self.db.start_session();
        match self._apply_transaction(&trx) {
            Ok(()) => {
                self.db.squash()?;
                self.pending_transactions.push_back(trx.clone());
                self.on_pending_transaction.emit(&trx);
                Ok(())
            }
            Err(err) => {
                self.db.undo()?;
                Err(err)
            }
        }
    }

    /// Apply a transaction in its own nested session without touching the
    /// pending queue.
    pub fn apply_transaction(
        &mut self,
        trx: &SignedTransaction,
        skip: u32,
    ) -> Result<(), ChainError> {
        self.with_skip_flags(skip, |c| {
            let revision = c.db.start_session();
            match c._apply_transaction(trx) {
                Ok(()) => {
                    if c.db.session_depth() > 1 {
                        c.db.squash()?;
                    } else {
                        // no outer session: the changes become permanent
                        c.db.commit(revision);
                    }
                    Ok(())
                }
                Err(err) => {
                    c.db.undo()?;
                    Err(err)
                }
            }
        })
    }

    fn _apply_transaction(&mut self, trx: &SignedTransaction) -> Result<(), ChainError> {
        self.validate_transaction(trx)?;
        let id = trx.id()?;
        for message in trx.messages.iter() {
            self.apply_message(message, &id)?;
        }
        if !self.skipping(validation::SKIP_TRANSACTION_DUPE_CHECK) {
            self.db.insert_recent_transaction(id, trx.clone());
        }
        Ok(())
    }

    fn apply_message(&mut self, message: &Message, id: &TransactionId) -> Result<(), ChainError> {
        let skip_asserts = self.skipping(validation::SKIP_ASSERT_EVALUATION);
        let block_num = self.db.dynamic().head_block_num;
        if let Some(handler) =
            self.registry
                .apply_handler(&message.recipient, &message.scope, &message.type_name)
        {
            let mut ctx = ApplyContext {
                db: &mut self.db,
                message,
                block_num,
                transaction_id: *id,
                skip_asserts,
            };
            handler(&mut ctx)?;
        }
        Ok(())
    }

    /// The staged validation pipeline. Read-only: the only state it touches
    /// is the signature-recovery cache local to this call.
    pub fn validate_transaction(&self, trx: &SignedTransaction) -> Result<(), ChainError> {
        if !self.skipping(validation::SKIP_TAPOS_CHECK) {
            self.validate_expiration(trx)?;
        }
        if !self.skipping(validation::SKIP_TRANSACTION_DUPE_CHECK) {
            self.validate_uniqueness(trx)?;
        }
        if !self.skipping(validation::SKIP_TAPOS_CHECK) {
            self.validate_tapos(trx)?;
        }
        self.validate_referenced_accounts(trx)?;
        self.validate_message_types(trx)?;
        if !self.skipping(validation::SKIP_TRANSACTION_SIGNATURES)
            && !self.skipping(validation::SKIP_AUTHORITY_CHECK)
            && !self.before_last_checkpoint()
        {
            self.validate_authority(trx)?;
        }
        self.validate_message_handlers(trx)?;
        Ok(())
    }

    fn validate_expiration(&self, trx: &SignedTransaction) -> Result<(), ChainError> {
        let now = self.db.dynamic().head_block_time;
        let lifetime: UTime =
            (self.db.global().configuration.max_transaction_lifetime as u64).into();
        if trx.expiration < now || trx.expiration > now.checked_add(lifetime)? {
            return Err(ChainError::ExpiredTransaction(trx.id()?));
        }
        Ok(())
    }

    fn validate_uniqueness(&self, trx: &SignedTransaction) -> Result<(), ChainError> {
        let id = trx.id()?;
        if self.db.recent_transaction(&id).is_some() {
            return Err(ChainError::DuplicateTransaction(id));
        }
        Ok(())
    }

    fn validate_tapos(&self, trx: &SignedTransaction) -> Result<(), ChainError> {
        let summary = self
            .db
            .block_summary(trx.ref_block_num)
            .ok_or(ChainError::TaposMismatch(trx.id()?))?;
        if summary.ref_prefix() != trx.ref_block_prefix {
            return Err(ChainError::TaposMismatch(trx.id()?));
        }
        Ok(())
    }

    fn validate_referenced_accounts(&self, trx: &SignedTransaction) -> Result<(), ChainError> {
        for message in trx.messages.iter() {
            for account in message.referenced_accounts() {
                validation::require_account(&self.db, account)?;
            }
        }
        Ok(())
    }

    fn validate_message_types(&self, trx: &SignedTransaction) -> Result<(), ChainError> {
        for message in trx.messages.iter() {
            // resolve the base chain, base-most first
            let mut chain = Vec::new();
            let mut scope = message.scope.clone();
            let mut name = message.type_name.clone();
            loop {
                if chain.len() >= MAX_TYPE_DEPTH {
                    return Err(ChainError::UnknownMessageType(
                        message.type_name.clone(),
                        "base chain too deep".into(),
                    ));
                }
                let schema = self.db.type_schema(&scope, &name).ok_or_else(|| {
                    ChainError::UnknownMessageType(name.clone(), "not registered".into())
                })?;
                let base = schema.base.clone();
                let base_scope = schema.base_scope.clone().unwrap_or_else(|| scope.clone());
                chain.push(schema);
                match base {
                    Some(base_name) => {
                        name = base_name;
                        scope = base_scope;
                    }
                    None => break,
                }
            }
            let mut cursor = 0usize;
            for schema in chain.iter().rev() {
                cursor = schema
                    .consume_fields(&message.payload, cursor)
                    .map_err(|err| {
                        ChainError::UnknownMessageType(
                            message.type_name.clone(),
                            err.to_string(),
                        )
                    })?;
            }
            if cursor != message.payload.len() {
                return Err(ChainError::UnknownMessageType(
                    message.type_name.clone(),
                    "payload has trailing bytes".into(),
                ));
            }
        }
        Ok(())
    }

    fn validate_authority(&self, trx: &SignedTransaction) -> Result<(), ChainError> {
        let digest = trx.digest()?;
        let mut signer_keys = HashSet::new();
        for signature in trx.signatures.iter() {
            let key = self
                .engine
                .recover(&digest, signature)
                .map_err(|err| ChainError::BadSignature(err.to_string()))?;
            signer_keys.insert(key);
        }
        let checker = AuthorityChecker::new(&self.db, &signer_keys, self.cfg.max_authority_depth);
        for message in trx.messages.iter() {
            for level in message.authorization.iter() {
                checker.satisfies(level)?;
            }
        }
        Ok(())
    }

    fn validate_message_handlers(&self, trx: &SignedTransaction) -> Result<(), ChainError> {
        let skip_asserts = self.skipping(validation::SKIP_ASSERT_EVALUATION);
        let transaction_id = trx.id()?;
        for message in trx.messages.iter() {
            if !self
                .registry
                .is_dispatchable(&message.recipient, &message.scope, &message.type_name)
            {
                return Err(ChainError::HandlerMissing {
                    contract: message.recipient.clone(),
                    scope: message.scope.clone(),
                    action: message.type_name.clone(),
                });
            }
            if !self.skipping(validation::SKIP_VALIDATE) {
                if let Some(handler) = self.registry.validate_handler(
                    &message.recipient,
                    &message.scope,
                    &message.type_name,
                ) {
                    let ctx = MessageValidateContext {
                        message,
                        transaction: trx,
                        skip_asserts,
                    };
                    handler(&ctx)?;
                }
            }
            if let Some(handler) = self.registry.precondition_handler(
                &message.recipient,
                &message.scope,
                &message.type_name,
            ) {
                let ctx = PreconditionContext {
                    db: &self.db,
                    message,
                    transaction_id,
                    skip_asserts,
                };
                handler(&ctx)?;
            }
        }
        Ok(())
    }

    // -- blocks ------------------------------------------------------------

    /// Ingest a candidate block. Returns false if the block was already
    /// known or was stored on a losing fork without becoming head.
    pub fn push_block(&mut self, block: SignedBlock, skip: u32) -> Result<bool, ChainError> {
        self.with_skip_flags(skip, |c| {
            c.without_pending_transactions(|c| c._push_block(block))
        })
    }

    fn _push_block(&mut self, block: SignedBlock) -> Result<bool, ChainError> {
        if self.skipping(validation::SKIP_FORK_DB) {
            self.apply_and_archive(&block)?;
            return Ok(true);
        }

        let id = block.id()?;
        if self.is_known_block(&id)? {
            debug!(%id, "ignoring known block");
            return Ok(false);
        }
        let head_id = self.head_block_id();
        let new_head_id = self.fork_db.add(block.clone(), &head_id)?;

        if new_head_id == id && block.header.parent_id == head_id {
            // fast path: the new block extends the current branch
            match self.apply_and_archive(&block) {
                Ok(()) => {
                    self.fork_db.set_in_current_branch(&id, true);
                    Ok(true)
                }
                Err(err) => {
                    self.fork_db.remove_subtree(&id);
                    Err(err)
                }
            }
        } else if new_head_id != head_id {
            self.switch_forks(new_head_id)
        } else {
            debug!(%id, "block stored on a minority fork");
            Ok(false)
        }
    }

    fn switch_forks(&mut self, new_head_id: BlockId) -> Result<bool, ChainError> {
        let old_head_id = self.head_block_id();
        info!(%old_head_id, %new_head_id, "switching forks");
        let branches = self.fork_db.fetch_branch_from(&new_head_id, &old_head_id)?;
        let lca_id = match branches.from_first.last() {
            Some(last) => {
                self.fork_db
                    .get(last)
                    .ok_or_else(|| {
                        ChainError::ContainerInconsistency("fork branch node vanished".into())
                    })?
                    .parent_id
            }
            None => {
                return Err(ChainError::ContainerInconsistency(
                    "new head has no branch of its own".into(),
                ))
            }
        };

        while self.head_block_id() != lca_id {
            self.pop_block()?;
        }

        for id in branches.from_first.iter().rev() {
            let block = self
                .fork_db
                .get(id)
                .map(|node| node.block.clone())
                .ok_or_else(|| {
                    ChainError::ContainerInconsistency("fork branch node vanished".into())
                })?;
            if let Err(err) = self.apply_and_archive(&block) {
                warn!(%id, %err, "block failed during reorganization");
                // drop the offending block and everything that built on it
                self.fork_db.remove_subtree(id);
                // rewind the partially-applied fork
                while self.head_block_id() != lca_id {
                    self.pop_block()?;
                }
                // restore the original branch
                for orig in branches.from_second.iter().rev() {
                    let block = self
                        .fork_db
                        .get(orig)
                        .map(|node| node.block.clone())
                        .ok_or_else(|| {
                            ChainError::ContainerInconsistency(
                                "original branch node vanished".into(),
                            )
                        })?;
                    self.apply_and_archive(&block)?;
                    self.fork_db.set_in_current_branch(orig, true);
                }
                return Err(ChainError::ReorgFailure(format!("block {}: {}", id, err)));
            }
            self.fork_db.set_in_current_branch(id, true);
        }
        Ok(true)
    }

    /// Apply a block inside its own session, keep the session on the undo
    /// stack, then archive anything that just became irreversible and emit
    /// the applied-block signal.
    fn apply_and_archive(&mut self, block: &SignedBlock) -> Result<(), ChainError> {
        let prev_lib = self.db.dynamic().last_irreversible_block_num;
        self.db.start_session();
        if let Err(err) = self.apply_block_inner(block) {
            self.db.undo()?;
            return Err(err);
        }
        let new_lib = self.db.dynamic().last_irreversible_block_num;
        if new_lib > prev_lib {
            if let Err(err) = self.archive_irreversible(prev_lib, new_lib, block) {
                self.db.undo()?;
                return Err(err);
            }
            self.db.commit(new_lib as u64);
            self.fork_db.prune(new_lib);
        }
        self.applied_block.emit(block);
        Ok(())
    }

    fn archive_irreversible(
        &mut self,
        prev_lib: u32,
        new_lib: u32,
        applying: &SignedBlock,
    ) -> Result<(), ChainError> {
        let log_last = self.block_log.last_block_num()?.unwrap_or(0);
        debug!(prev_lib, new_lib, "advancing the last irreversible block");
        for num in (prev_lib + 1)..=new_lib {
            if num <= log_last {
                continue;
            }
            let block = if num == applying.block_num() {
                applying.clone()
            } else {
                let id = self.fork_db.current_branch_id(num).ok_or_else(|| {
                    ChainError::ContainerInconsistency(format!(
                        "irreversible block {} is not on the current branch",
                        num
                    ))
                })?;
                self.fork_db
                    .get(&id)
                    .map(|node| node.block.clone())
                    .ok_or_else(|| {
                        ChainError::ContainerInconsistency(format!(
                            "irreversible block {} vanished from the fork database",
                            num
                        ))
                    })?
            };
            self.block_log.append(&block)?;
        }
        Ok(())
    }

    fn apply_block_inner(&mut self, block: &SignedBlock) -> Result<(), ChainError> {
        let id = block.id()?;
        let block_num = block.block_num();

        if let Some(expected) = self.checkpoints.get(&block_num) {
            if *expected != id {
                return Err(ChainError::CheckpointMismatch {
                    block_num,
                    expected: *expected,
                    got: id,
                });
            }
        }
        // blocks we generate ourselves were already built under the soft cap
        if !self.skipping(validation::SKIP_BLOCK_SIZE_CHECK) && !self.producing {
            let size = block.to_bytes_compact()?.len();
            let max = self.db.global().configuration.max_block_size as usize;
            if size > max {
                return Err(ChainError::InvalidBlockHeader(format!(
                    "block size {} exceeds the {} byte limit",
                    size, max
                )));
            }
        }

        let (signing_producer, slot_num) = self.validate_block_header(block, &id)?;
        self.create_block_summary(block_num, id);
        self.update_global_dynamic_data(block, &id, slot_num)?;

        for trx in block.transactions.iter() {
            self.db.start_session();
            match self._apply_transaction(trx) {
                Ok(()) => self.db.squash()?,
                Err(err) => {
                    self.db.undo()?;
                    return Err(err);
                }
            }
        }

        self.update_signing_producer(&signing_producer.owner, block_num)?;
        self.update_last_irreversible_block()?;
        self.clear_expired_transactions()?;

        if block_num % self.cfg.producers_per_round == 0 {
            self.update_producer_schedule(block, &id)?;
            self.update_blockchain_configuration()?;
        }
        debug!(%id, block_num, "block applied");
        Ok(())
    }

    fn validate_block_header(
        &self,
        block: &SignedBlock,
        id: &BlockId,
    ) -> Result<(ProducerObject, u32), ChainError> {
        let dynamic = self.db.dynamic();
        if block.header.parent_id != dynamic.head_block_id {
            return Err(ChainError::UnknownParent(block.header.parent_id));
        }
        if block.header.timestamp <= dynamic.head_block_time {
            return Err(ChainError::BadTimestamp(block.header.timestamp));
        }
        if block
            .header
            .timestamp
            .checked_rem_time(self.cfg.block_interval)?
            != UTime::default()
        {
            return Err(ChainError::BadTimestamp(block.header.timestamp));
        }
        let slot_num = timeslots::get_slot_at_time(
            self.cfg.block_interval,
            dynamic.head_block_time,
            block.header.timestamp,
        )?;
        if slot_num == 0 {
            return Err(ChainError::BadTimestamp(block.header.timestamp));
        }

        if !self.skipping(validation::SKIP_PRODUCER_SCHEDULE_CHECK) {
            let scheduled = self.get_scheduled_producer(slot_num)?;
            if scheduled != block.header.producer {
                return Err(ChainError::WrongProducer {
                    expected: scheduled,
                    got: block.header.producer.clone(),
                });
            }
        }
        let producer = self
            .db
            .producer(&block.header.producer)
            .cloned()
            .ok_or_else(|| ChainError::UnknownAccount(block.header.producer.clone()))?;

        if !self.skipping(validation::SKIP_PRODUCER_SIGNATURE) && !self.before_last_checkpoint() {
            let digest = block.header.digest()?;
            let recovered = self
                .engine
                .recover(&digest, &block.header.producer_signature)
                .map_err(|err| ChainError::BadSignature(err.to_string()))?;
            if recovered != producer.signing_key {
                return Err(ChainError::BadSignature(format!(
                    "block {} was not signed by the key of {}",
                    id, producer.owner
                )));
            }
        }

        if !self.skipping(validation::SKIP_MERKLE_CHECK) {
            let ids = block.transaction_ids()?;
            if transaction_merkle_root(&ids) != block.header.transaction_mroot {
                return Err(ChainError::MerkleMismatch(*id));
            }
        }

        if block.block_num() % self.cfg.producers_per_round != 0
            && !block.header.producer_changes.is_empty()
        {
            return Err(ChainError::InvalidBlockHeader(
                "producer changes announced outside a round boundary".into(),
            ));
        }
        Ok((producer, slot_num))
    }

    fn create_block_summary(&mut self, block_num: u32, id: BlockId) {
        let index = (block_num % models::BLOCK_SUMMARY_RING_SIZE as u32) as u16;
        self.db.put_block_summary(index, id);
    }

    fn update_global_dynamic_data(
        &mut self,
        block: &SignedBlock,
        id: &BlockId,
        slot_num: u32,
    ) -> Result<(), ChainError> {
        // charge skipped slots to the producers that missed them
        for missed_slot in 1..slot_num {
            let name = self.get_scheduled_producer(missed_slot)?;
            if name.is_null() || name == block.header.producer {
                continue;
            }
            if let Some(mut producer) = self.db.producer(&name).cloned() {
                producer.total_missed += 1;
                self.db.put_producer(producer);
            }
        }

        let mut dynamic = self.db.dynamic().clone();
        dynamic.current_absolute_slot += slot_num as u64;
        dynamic.recent_slots_filled = if slot_num < 128 {
            (dynamic.recent_slots_filled << slot_num) | 1
        } else {
            1
        };
        dynamic.head_block_num = block.block_num();
        dynamic.head_block_id = *id;
        dynamic.head_block_time = block.header.timestamp;
        dynamic.current_producer = block.header.producer.clone();
        self.db.put_dynamic(dynamic);
        Ok(())
    }

    fn update_signing_producer(
        &mut self,
        owner: &AccountName,
        block_num: u32,
    ) -> Result<(), ChainError> {
        let mut producer = self
            .db
            .producer(owner)
            .cloned()
            .ok_or_else(|| ChainError::UnknownAccount(owner.clone()))?;
        producer.last_produced_block_num = block_num;
        producer.last_absolute_slot = self.db.dynamic().current_absolute_slot;
        self.db.put_producer(producer);
        Ok(())
    }

    /// A block is irreversible once 2/3+1 of the active producers have
    /// produced at or above its number. With fewer producers confirmed, the
    /// mark stays where it is.
    fn update_last_irreversible_block(&mut self) -> Result<(), ChainError> {
        let required = self.cfg.irreversibility_threshold();
        let mut produced: Vec<u32> = self
            .db
            .global()
            .active_producers
            .iter()
            .filter_map(|name| self.db.producer(name))
            .map(|producer| producer.last_produced_block_num)
            .filter(|num| *num > 0)
            .collect();
        if produced.len() < required {
            return Ok(());
        }
        produced.sort_unstable_by(|a, b| b.cmp(a));
        let candidate = produced[required - 1];
        let mut dynamic = self.db.dynamic().clone();
        if candidate > dynamic.last_irreversible_block_num {
            dynamic.last_irreversible_block_num = candidate;
            self.db.put_dynamic(dynamic);
        }
        Ok(())
    }

    fn clear_expired_transactions(&mut self) -> Result<(), ChainError> {
        let now = self.db.dynamic().head_block_time;
        let expired = self.db.expired_transactions(now);
        if !expired.is_empty() {
            debug!(count = expired.len(), "clearing expired transactions");
        }
        for id in expired {
            self.db.remove_recent_transaction(&id);
        }
        Ok(())
    }

    /// Round boundary: recompute the active set from producer votes and
    /// shuffle it with a seed derived from the id of the round's last block.
    fn update_producer_schedule(
        &mut self,
        block: &SignedBlock,
        id: &BlockId,
    ) -> Result<(), ChainError> {
        let candidates =
            top_voted_producers(&self.db, self.cfg.producers_per_round as usize);
        let seed = Hash::hash(&id.to_bytes());
        let new_round = shuffled_round(&seed, candidates);
        if !block.header.producer_changes.is_empty()
            && block.header.producer_changes != new_round
        {
            return Err(ChainError::InvalidBlockHeader(
                "announced producer changes do not match the computed schedule".into(),
            ));
        }
        let mut global = self.db.global().clone();
        if global.active_producers != new_round {
            debug!("active producer round changed");
        }
        global.active_producers = new_round;
        self.db.put_global(global);
        Ok(())
    }

    fn update_blockchain_configuration(&mut self) -> Result<(), ChainError> {
        let votes: Vec<_> = self
            .db
            .global()
            .active_producers
            .iter()
            .filter_map(|name| self.db.producer(name))
            .map(|producer| producer.configuration)
            .collect();
        if let Some(median) = models::BlockchainConfiguration::median(&votes) {
            let mut global = self.db.global().clone();
            if global.configuration != median {
                info!("blockchain configuration updated to the median of producer votes");
            }
            global.configuration = median;
            self.db.put_global(global);
        }
        Ok(())
    }

    // -- block generation --------------------------------------------------

    /// Build, sign and apply a block at `when` from the pending queue.
    /// Transactions that fail to apply are skipped, not fatal.
    pub fn generate_block(
        &mut self,
        when: UTime,
        producer: &AccountName,
        signing_key: &PrivateKey,
        skip: u32,
    ) -> Result<SignedBlock, ChainError> {
        self.with_skip_flags(skip, |c| {
            c.with_producing(|c| c._generate_block(when, producer, signing_key))
        })
    }

    fn _generate_block(
        &mut self,
        when: UTime,
        producer_name: &AccountName,
        signing_key: &PrivateKey,
    ) -> Result<SignedBlock, ChainError> {
        if !self.skipping(validation::SKIP_PRODUCER_SCHEDULE_CHECK) {
            let slot_num = self.get_slot_at_time(when)?;
            if slot_num == 0 || self.get_slot_time(slot_num)? != when {
                return Err(ChainError::BadTimestamp(when));
            }
            let scheduled = self.get_scheduled_producer(slot_num)?;
            if &scheduled != producer_name {
                return Err(ChainError::WrongProducer {
                    expected: scheduled,
                    got: producer_name.clone(),
                });
            }
        }
        let producer = self
            .db
            .producer(producer_name)
            .cloned()
            .ok_or_else(|| ChainError::UnknownAccount(producer_name.clone()))?;
        if !self.skipping(validation::SKIP_PRODUCER_SIGNATURE) {
            let public_key = self.engine.derive_public_key(signing_key);
            if public_key != producer.signing_key {
                return Err(ChainError::BadSignature(format!(
                    "signing key does not belong to producer {}",
                    producer_name
                )));
            }
        }

        // trial-apply the pending queue to pick the transactions that fit
        self.close_pending_session()?;
        let target_size = self.db.global().configuration.target_block_size as usize;
        let queue: Vec<SignedTransaction> = self.pending_transactions.iter().cloned().collect();
        self.db.start_session();
        let mut included = Vec::new();
        let mut total_size = 0usize;
        for trx in queue {
            let size = trx.to_bytes_compact()?.len();
            if !self.skipping(validation::SKIP_BLOCK_SIZE_CHECK)
                && total_size + size > target_size
            {
                debug!("candidate block is full, postponing remaining transactions");
                continue;
            }
            self.db.start_session();
            match self._apply_transaction(&trx) {
                Ok(()) => {
                    self.db.squash()?;
                    total_size += size;
                    included.push(trx);
                }
                Err(err) => {
                    self.db.undo()?;
                    debug!(%err, "pending transaction left out of the generated block");
                }
            }
        }
        self.db.undo()?;

        let ids: Vec<TransactionId> = included
            .iter()
            .map(|trx| trx.id())
            .collect::<Result<_, _>>()?;
        let mut header = BlockHeader {
            parent_id: self.head_block_id(),
            timestamp: when,
            producer: producer_name.clone(),
            transaction_mroot: transaction_merkle_root(&ids),
            producer_changes: Vec::new(),
            producer_signature: self.engine.sign(&Hash::zero(), signing_key)?,
        };
        let digest = header.digest()?;
        header.producer_signature = self.engine.sign(&digest, signing_key)?;
        let block = SignedBlock {
            header,
            transactions: included,
        };

        // the generated block goes through the exact same path as a block
        // received from the network
        self.without_pending_transactions(|c| c._push_block(block.clone()))?;
        info!(
            block_num = block.block_num(),
            transactions = block.transactions.len(),
            producer = %producer_name,
            "block generated"
        );
        Ok(block)
    }

    // -- pop / pending -----------------------------------------------------

    /// Roll back the head block. Its transactions are queued for
    /// best-effort re-submission.
    pub fn pop_block(&mut self) -> Result<(), ChainError> {
        let dynamic = self.db.dynamic();
        let head_num = dynamic.head_block_num;
        let head_id = dynamic.head_block_id;
        if head_num <= dynamic.last_irreversible_block_num {
            return Err(ChainError::IrreversibleViolation(format!(
                "cannot pop irreversible block {}",
                head_num
            )));
        }
        self.close_pending_session()?;
        if !self.db.undo_history_available()
            && !self.skipping(validation::SKIP_UNDO_HISTORY_CHECK)
        {
            return Err(ChainError::IrreversibleViolation(
                "no undo history for the head block".into(),
            ));
        }
        let popped = self
            .fork_db
            .get(&head_id)
            .map(|node| node.block.clone())
            .ok_or_else(|| {
                ChainError::ContainerInconsistency(format!(
                    "head block {} missing from the fork database",
                    head_id
                ))
            })?;
        self.fork_db.set_in_current_branch(&head_id, false);
        self.fork_db.pop_head(&head_id);
        self.db.undo()?;
        self.popped_transactions.extend(popped.transactions);
        debug!(%head_id, "popped block");
        Ok(())
    }

    /// Drop the pending queue and its provisional state.
    pub fn clear_pending(&mut self) {
        self.pending_transactions.clear();
        if let Err(err) = self.close_pending_session() {
            warn!(%err, "could not close the pending session");
        }
    }

    fn close_pending_session(&mut self) -> Result<(), ChainError> {
        if self.pending_session_open {
            self.db.undo()?;
            self.pending_session_open = false;
        }
        Ok(())
    }

    fn skipping(&self, bit: u32) -> bool {
        self.skip_flags & bit != 0
    }

    // -- checkpoints -------------------------------------------------------

    pub fn add_checkpoints(&mut self, checkpoints: BTreeMap<u32, BlockId>) {
        self.checkpoints.extend(checkpoints);
    }

    pub fn get_checkpoints(&self) -> &BTreeMap<u32, BlockId> {
        &self.checkpoints
    }

    /// True while the head is below the highest configured checkpoint;
    /// signature checks are waived for that prefix.
    pub fn before_last_checkpoint(&self) -> bool {
        match self.checkpoints.keys().next_back() {
            Some(last) => self.db.dynamic().head_block_num < *last,
            None => false,
        }
    }

    // -- registration ------------------------------------------------------

    /// Record a message-payload schema under `scope`. A schema without an
    /// explicit base scope resolves its base in the registering scope.
    pub fn register_type(&mut self, scope: AccountName, schema: TypeSchema) {
        self.db.put_type_schema(scope, schema);
    }

    pub fn set_validate_handler(
        &mut self,
        contract: AccountName,
        scope: AccountName,
        action: TypeName,
        handler: MessageValidateHandler,
    ) {
        self.registry
            .set_validate_handler(contract, scope, action, handler);
    }

    pub fn set_precondition_validate_handler(
        &mut self,
        contract: AccountName,
        scope: AccountName,
        action: TypeName,
        handler: PreconditionValidateHandler,
    ) {
        self.registry
            .set_precondition_validate_handler(contract, scope, action, handler);
    }

    pub fn set_apply_handler(
        &mut self,
        contract: AccountName,
        scope: AccountName,
        action: TypeName,
        handler: ApplyHandler,
    ) {
        self.registry.set_apply_handler(contract, scope, action, handler);
    }

    pub fn subscribe_applied_block(&mut self, slot: impl Fn(&SignedBlock) + Send + Sync + 'static) {
        self.applied_block.connect(slot);
    }

    pub fn subscribe_pending_transaction(
        &mut self,
        slot: impl Fn(&SignedTransaction) + Send + Sync + 'static,
    ) {
        self.on_pending_transaction.connect(slot);
    }

    // -- queries -----------------------------------------------------------

    pub fn head_block_num(&self) -> u32 {
        self.db.dynamic().head_block_num
    }

    pub fn head_block_id(&self) -> BlockId {
        self.db.dynamic().head_block_id
    }

    pub fn head_block_time(&self) -> UTime {
        self.db.dynamic().head_block_time
    }

    pub fn head_block_producer(&self) -> AccountName {
        self.db.dynamic().current_producer.clone()
    }

    pub fn last_irreversible_block_num(&self) -> u32 {
        self.db.dynamic().last_irreversible_block_num
    }

    pub fn block_interval(&self) -> UTime {
        self.cfg.block_interval
    }

    pub fn get_global_properties(&self) -> &GlobalPropertyObject {
        self.db.global()
    }

    pub fn get_dynamic_global_properties(&self) -> &DynamicGlobalPropertyObject {
        self.db.dynamic()
    }

    pub fn get_producer(&self, owner: &AccountName) -> Result<&ProducerObject, ChainError> {
        self.db
            .producer(owner)
            .ok_or_else(|| ChainError::UnknownAccount(owner.clone()))
    }

    /// Share of the last 128 slots that were filled, in hundredths of a
    /// percent.
    pub fn producer_participation_rate(&self) -> u32 {
        self.db.dynamic().participation_rate()
    }

    pub fn is_known_block(&self, id: &BlockId) -> Result<bool, ChainError> {
        if self.fork_db.contains(id) {
            return Ok(true);
        }
        Ok(self
            .block_log
            .read_block(id.block_num())?
            .map_or(false, |block| {
                block.id().map_or(false, |log_id| log_id == *id)
            }))
    }

    pub fn is_known_transaction(&self, id: &TransactionId) -> bool {
        self.db.recent_transaction(id).is_some()
    }

    pub fn get_recent_transaction(&self, id: &TransactionId) -> Option<&SignedTransaction> {
        self.db.recent_transaction(id)
    }

    /// Id of the current-branch block with the given number.
    pub fn get_block_id_for_num(&self, block_num: u32) -> Result<Option<BlockId>, ChainError> {
        if block_num == 0 {
            return Ok(Some(BlockId::zero()));
        }
        if let Some(id) = self.fork_db.current_branch_id(block_num) {
            return Ok(Some(id));
        }
        Ok(self
            .block_log
            .read_block(block_num)?
            .map(|block| block.id())
            .transpose()?)
    }

    pub fn fetch_block_by_id(&self, id: &BlockId) -> Result<Option<SignedBlock>, ChainError> {
        if let Some(node) = self.fork_db.get(id) {
            return Ok(Some(node.block.clone()));
        }
        match self.block_log.read_block(id.block_num())? {
            Some(block) if block.id()? == *id => Ok(Some(block)),
            _ => Ok(None),
        }
    }

    pub fn fetch_block_by_number(&self, block_num: u32) -> Result<Option<SignedBlock>, ChainError> {
        match self.get_block_id_for_num(block_num)? {
            Some(id) if block_num > 0 => self.fetch_block_by_id(&id),
            _ => Ok(None),
        }
    }

    /// Ids from the given fork tip down to (and including) the block where
    /// it joins the current branch.
    pub fn get_block_ids_on_fork(&self, head_of_fork: &BlockId) -> Result<Vec<BlockId>, ChainError> {
        let branches = self
            .fork_db
            .fetch_branch_from(head_of_fork, &self.head_block_id())?;
        let mut ids = branches.from_first;
        match ids.last() {
            Some(last) => {
                let fork_point = self
                    .fork_db
                    .get(last)
                    .ok_or_else(|| {
                        ChainError::ContainerInconsistency("fork branch node vanished".into())
                    })?
                    .parent_id;
                ids.push(fork_point);
            }
            None => ids.push(*head_of_fork),
        }
        Ok(ids)
    }

    pub fn pending_transactions(&self) -> &VecDeque<SignedTransaction> {
        &self.pending_transactions
    }

    // -- slots -------------------------------------------------------------

    /// Producer scheduled for a future relative slot; slot 0 maps to the
    /// null producer.
    pub fn get_scheduled_producer(&self, slot_num: u32) -> Result<AccountName, ChainError> {
        if slot_num == 0 {
            return Ok(AccountName::null());
        }
        let global = self.db.global();
        if global.active_producers.is_empty() {
            return Ok(AccountName::null());
        }
        let index = (self.db.dynamic().current_absolute_slot + slot_num as u64 - 1)
            % global.active_producers.len() as u64;
        Ok(global.active_producers[index as usize].clone())
    }

    pub fn get_slot_time(&self, slot_num: u32) -> Result<UTime, ChainError> {
        timeslots::get_slot_time(
            self.cfg.block_interval,
            self.db.dynamic().head_block_time,
            slot_num,
        )
    }

    pub fn get_slot_at_time(&self, when: UTime) -> Result<u32, ChainError> {
        timeslots::get_slot_at_time(
            self.cfg.block_interval,
            self.db.dynamic().head_block_time,
            when,
        )
    }
}
