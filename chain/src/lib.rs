mod config;
mod controller;
mod error;
mod fork_database;
mod handlers;
mod initializer;
mod schedule;
mod signal;
mod timeslots;
pub mod validation;

pub use config::ChainConfig;
pub use controller::ChainController;
pub use error::ChainError;
pub use fork_database::{ForkDatabase, ForkNode};
pub use handlers::{
    ApplyContext, ApplyHandler, HandlerRegistry, MessageValidateContext, MessageValidateHandler,
    PreconditionContext, PreconditionValidateHandler,
};
pub use initializer::{ChainInitializer, InitContext};
pub use schedule::{shuffled_round, top_voted_producers};
pub use signal::Signal;
pub use timeslots::{get_slot_at_time, get_slot_time};

#[cfg(test)]
mod tests;
