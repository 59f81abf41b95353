use crate::error::ChainError;
use crate::handlers::HandlerRegistry;
use models::{AccountName, BlockchainConfiguration, Message};
use statedb::StateDb;
use time::UTime;

/// What `ChainInitializer::prepare_database` gets to work with: the bare
/// state database and the handler registry, before any block exists.
pub struct InitContext<'a> {
    pub db: &'a mut StateDb,
    pub registry: &'a mut HandlerRegistry,
}

/// Boots an empty chain: seeds accounts, producers, handlers and type
/// schemas, and supplies the genesis parameters the controller itself does
/// not know.
pub trait ChainInitializer {
    /// Create the objects and handlers that must exist before the first
    /// block, returning bootstrap messages applied before block 1. The
    /// initial producer accounts and their producer objects must be created
    /// here.
    fn prepare_database(&self, ctx: &mut InitContext) -> Result<Vec<Message>, ChainError>;

    /// Genesis timestamp; aligned down to the block interval by the
    /// controller.
    fn chain_start_time(&self) -> UTime;

    fn chain_start_configuration(&self) -> BlockchainConfiguration;

    /// First round of producers, in schedule order.
    fn chain_start_producers(&self) -> Vec<AccountName>;
}
