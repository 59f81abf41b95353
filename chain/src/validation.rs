//! Validation skip bits and the authority checker.
//!
//! The skip bits accelerate replay of known-good history and trusted local
//! operations; `SKIP_NOTHING` is the default for anything from the network.

use crate::error::ChainError;
use crypto::signature::PublicKey;
use models::{AccountName, Authority, PermissionLevel};
use statedb::StateDb;
use std::collections::HashSet;

pub const SKIP_NOTHING: u32 = 0;
/// Don't verify the producer signature on a block (reindex).
pub const SKIP_PRODUCER_SIGNATURE: u32 = 1 << 0;
/// Don't recover or verify transaction signatures (non-producer nodes).
pub const SKIP_TRANSACTION_SIGNATURES: u32 = 1 << 1;
/// Don't consult the recent-transaction index (reindex).
pub const SKIP_TRANSACTION_DUPE_CHECK: u32 = 1 << 2;
/// Bypass the fork database entirely (linear replay).
pub const SKIP_FORK_DB: u32 = 1 << 3;
/// Accept oversize locally-generated blocks.
pub const SKIP_BLOCK_SIZE_CHECK: u32 = 1 << 4;
/// Skip the TAPoS reference check; also disables the expiration check.
pub const SKIP_TAPOS_CHECK: u32 = 1 << 5;
/// Skip the permission/threshold check.
pub const SKIP_AUTHORITY_CHECK: u32 = 1 << 6;
/// Skip the transaction merkle root check.
pub const SKIP_MERKLE_CHECK: u32 = 1 << 7;
/// Disable in-handler assertions.
pub const SKIP_ASSERT_EVALUATION: u32 = 1 << 8;
/// Allow mutations outside the undo window.
pub const SKIP_UNDO_HISTORY_CHECK: u32 = 1 << 9;
/// Accept a block from an unscheduled producer.
pub const SKIP_PRODUCER_SCHEDULE_CHECK: u32 = 1 << 10;
/// Skip the per-message validate handler (history before a checkpoint).
pub const SKIP_VALIDATE: u32 = 1 << 11;

/// Everything that is safe to skip when re-applying history this node has
/// already validated.
pub const REPLAY_SKIP_FLAGS: u32 = SKIP_PRODUCER_SIGNATURE
    | SKIP_TRANSACTION_SIGNATURES
    | SKIP_TRANSACTION_DUPE_CHECK
    | SKIP_FORK_DB
    | SKIP_TAPOS_CHECK
    | SKIP_AUTHORITY_CHECK
    | SKIP_MERKLE_CHECK
    | SKIP_PRODUCER_SCHEDULE_CHECK
    | SKIP_VALIDATE;

/// Checks weighted-threshold authorities against the keys recovered from a
/// transaction's signatures. Recovery happens once per transaction; the
/// resulting key set is this struct.
pub struct AuthorityChecker<'a> {
    db: &'a StateDb,
    signer_keys: &'a HashSet<PublicKey>,
    max_depth: u32,
}

impl<'a> AuthorityChecker<'a> {
    pub fn new(db: &'a StateDb, signer_keys: &'a HashSet<PublicKey>, max_depth: u32) -> Self {
        AuthorityChecker {
            db,
            signer_keys,
            max_depth,
        }
    }

    /// Check a message authorization entry.
    pub fn satisfies(&self, level: &PermissionLevel) -> Result<(), ChainError> {
        let account = self
            .db
            .account(&level.account)
            .ok_or_else(|| ChainError::UnknownAccount(level.account.clone()))?;
        let authority = account
            .authority(&level.permission)
            .ok_or_else(|| ChainError::AuthorityInsufficient(level.account.clone()))?;
        if self.authority_weight(authority, 0) >= authority.threshold as u64 {
            Ok(())
        } else {
            Err(ChainError::AuthorityInsufficient(level.account.clone()))
        }
    }

    fn authority_weight(&self, authority: &Authority, depth: u32) -> u64 {
        let mut total: u64 = 0;
        for entry in authority.keys.iter() {
            if self.signer_keys.contains(&entry.key) {
                total += entry.weight as u64;
            }
        }
        if depth < self.max_depth {
            for entry in authority.accounts.iter() {
                if let Some(delegate) = self.delegated_authority(&entry.permission) {
                    if self.authority_weight(delegate, depth + 1) >= delegate.threshold as u64 {
                        total += entry.weight as u64;
                    }
                }
            }
        }
        total
    }

    fn delegated_authority(&self, level: &PermissionLevel) -> Option<&'a Authority> {
        self.db
            .account(&level.account)
            .and_then(|account| account.authority(&level.permission))
    }
}

/// True if `name` exists as an account; error otherwise.
pub fn require_account(db: &StateDb, name: &AccountName) -> Result<(), ChainError> {
    if db.account(name).is_none() {
        return Err(ChainError::UnknownAccount(name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::signature::SignatureEngine;
    use models::{AccountObject, AccountWeight, KeyWeight};

    fn account_with_authority(name: &str, authority: Authority) -> AccountObject {
        AccountObject {
            name: name.into(),
            owner_authority: authority.clone(),
            active_authority: authority,
            creation_date: 0.into(),
        }
    }

    #[test]
    fn test_single_key_authority() {
        let engine = SignatureEngine::new();
        let key = engine.derive_public_key(&crypto::generate_random_private_key());
        let other = engine.derive_public_key(&crypto::generate_random_private_key());

        let mut db = StateDb::new();
        db.put_account(account_with_authority("alice", Authority::with_key(key)));

        let mut signers = HashSet::new();
        signers.insert(key);
        let checker = AuthorityChecker::new(&db, &signers, 6);
        checker
            .satisfies(&PermissionLevel::active("alice".into()))
            .unwrap();

        let mut wrong_signers = HashSet::new();
        wrong_signers.insert(other);
        let checker = AuthorityChecker::new(&db, &wrong_signers, 6);
        assert!(matches!(
            checker.satisfies(&PermissionLevel::active("alice".into())),
            Err(ChainError::AuthorityInsufficient(_))
        ));
    }

    #[test]
    fn test_threshold_needs_enough_weight() {
        let engine = SignatureEngine::new();
        let key_a = engine.derive_public_key(&crypto::generate_random_private_key());
        let key_b = engine.derive_public_key(&crypto::generate_random_private_key());
        let authority = Authority {
            threshold: 2,
            keys: vec![
                KeyWeight {
                    key: key_a,
                    weight: 1,
                },
                KeyWeight {
                    key: key_b,
                    weight: 1,
                },
            ],
            accounts: Vec::new(),
        };

        let mut db = StateDb::new();
        db.put_account(account_with_authority("multi", authority));

        let mut one_signer = HashSet::new();
        one_signer.insert(key_a);
        let checker = AuthorityChecker::new(&db, &one_signer, 6);
        assert!(checker
            .satisfies(&PermissionLevel::active("multi".into()))
            .is_err());

        let mut both = HashSet::new();
        both.insert(key_a);
        both.insert(key_b);
        let checker = AuthorityChecker::new(&db, &both, 6);
        checker
            .satisfies(&PermissionLevel::active("multi".into()))
            .unwrap();
    }

    #[test]
    fn test_delegated_account_authority() {
        let engine = SignatureEngine::new();
        let delegate_key = engine.derive_public_key(&crypto::generate_random_private_key());

        let mut db = StateDb::new();
        db.put_account(account_with_authority(
            "delegate",
            Authority::with_key(delegate_key),
        ));
        db.put_account(account_with_authority(
            "parent",
            Authority {
                threshold: 1,
                keys: Vec::new(),
                accounts: vec![AccountWeight {
                    permission: PermissionLevel::active("delegate".into()),
                    weight: 1,
                }],
            },
        ));

        let mut signers = HashSet::new();
        signers.insert(delegate_key);
        let checker = AuthorityChecker::new(&db, &signers, 6);
        checker
            .satisfies(&PermissionLevel::active("parent".into()))
            .unwrap();

        // with zero recursion depth the delegation is not followed
        let checker = AuthorityChecker::new(&db, &signers, 0);
        assert!(checker
            .satisfies(&PermissionLevel::active("parent".into()))
            .is_err());
    }
}
