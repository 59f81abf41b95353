//! Pluggable message handlers, dispatched by `(contract, scope, action)`.
//!
//! The contract is the message recipient. A handler registered under the
//! wildcard contract (`Name::wildcard()`) catches messages whose contract
//! has no handler of its own.

use crate::error::ChainError;
use models::{AccountName, Message, SignedTransaction, TransactionId, TypeName};
use statedb::StateDb;
use std::collections::HashMap;

/// Stateless structural check of a message.
pub struct MessageValidateContext<'a> {
    pub message: &'a Message,
    pub transaction: &'a SignedTransaction,
    pub(crate) skip_asserts: bool,
}

/// Read-only check against current database state.
pub struct PreconditionContext<'a> {
    pub db: &'a StateDb,
    pub message: &'a Message,
    pub transaction_id: TransactionId,
    pub(crate) skip_asserts: bool,
}

/// Mutating application of a message.
pub struct ApplyContext<'a> {
    pub db: &'a mut StateDb,
    pub message: &'a Message,
    pub block_num: u32,
    pub transaction_id: TransactionId,
    pub(crate) skip_asserts: bool,
}

macro_rules! context_assert {
    ($name:ident) => {
        impl $name<'_> {
            /// Handler-level assertion; disabled by the assert-evaluation
            /// skip bit during trusted replay.
            pub fn chain_assert(&self, condition: bool, message: &str) -> Result<(), ChainError> {
                if !condition && !self.skip_asserts {
                    return Err(ChainError::HandlerAssert(message.to_string()));
                }
                Ok(())
            }
        }
    };
}

context_assert!(MessageValidateContext);
context_assert!(PreconditionContext);
context_assert!(ApplyContext);

pub type MessageValidateHandler =
    Box<dyn Fn(&MessageValidateContext) -> Result<(), ChainError> + Send + Sync>;
pub type PreconditionValidateHandler =
    Box<dyn Fn(&PreconditionContext) -> Result<(), ChainError> + Send + Sync>;
pub type ApplyHandler = Box<dyn Fn(&mut ApplyContext) -> Result<(), ChainError> + Send + Sync>;

type HandlerKey = (AccountName, TypeName);

/// Three parallel maps of handlers, nested contract-first. Registration
/// replaces any prior handler for the key.
#[derive(Default)]
pub struct HandlerRegistry {
    validate: HashMap<AccountName, HashMap<HandlerKey, MessageValidateHandler>>,
    precondition: HashMap<AccountName, HashMap<HandlerKey, PreconditionValidateHandler>>,
    apply: HashMap<AccountName, HashMap<HandlerKey, ApplyHandler>>,
}

fn find_handler<'a, H>(
    map: &'a HashMap<AccountName, HashMap<HandlerKey, H>>,
    contract: &AccountName,
    scope: &AccountName,
    action: &TypeName,
) -> Option<&'a H> {
    let key = (scope.clone(), action.clone());
    map.get(contract)
        .and_then(|inner| inner.get(&key))
        .or_else(|| {
            map.get(&AccountName::wildcard())
                .and_then(|inner| inner.get(&key))
        })
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_validate_handler(
        &mut self,
        contract: AccountName,
        scope: AccountName,
        action: TypeName,
        handler: MessageValidateHandler,
    ) {
        self.validate
            .entry(contract)
            .or_default()
            .insert((scope, action), handler);
    }

    pub fn set_precondition_validate_handler(
        &mut self,
        contract: AccountName,
        scope: AccountName,
        action: TypeName,
        handler: PreconditionValidateHandler,
    ) {
        self.precondition
            .entry(contract)
            .or_default()
            .insert((scope, action), handler);
    }

    pub fn set_apply_handler(
        &mut self,
        contract: AccountName,
        scope: AccountName,
        action: TypeName,
        handler: ApplyHandler,
    ) {
        self.apply
            .entry(contract)
            .or_default()
            .insert((scope, action), handler);
    }

    pub fn validate_handler(
        &self,
        contract: &AccountName,
        scope: &AccountName,
        action: &TypeName,
    ) -> Option<&MessageValidateHandler> {
        find_handler(&self.validate, contract, scope, action)
    }

    pub fn precondition_handler(
        &self,
        contract: &AccountName,
        scope: &AccountName,
        action: &TypeName,
    ) -> Option<&PreconditionValidateHandler> {
        find_handler(&self.precondition, contract, scope, action)
    }

    pub fn apply_handler(
        &self,
        contract: &AccountName,
        scope: &AccountName,
        action: &TypeName,
    ) -> Option<&ApplyHandler> {
        find_handler(&self.apply, contract, scope, action)
    }

    /// A message is dispatchable if any of its three handlers resolves.
    pub fn is_dispatchable(
        &self,
        contract: &AccountName,
        scope: &AccountName,
        action: &TypeName,
    ) -> bool {
        self.validate_handler(contract, scope, action).is_some()
            || self.precondition_handler(contract, scope, action).is_some()
            || self.apply_handler(contract, scope, action).is_some()
    }
}
