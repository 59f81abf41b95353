use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateDbError {
    #[error("no active undo session")]
    NoActiveSession,
    #[error("cannot squash the bottom undo session")]
    NothingToSquashInto,
}
