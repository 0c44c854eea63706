use thiserror::Error;

/// Chain-level rules checked when a block or a whole chain is offered
/// for adoption. Split out so callers can react to specific violations
/// (a stale tip means "request a chain snapshot", not "bad peer").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuleKind {
    #[error("previous hash does not match the chain tip")]
    StaleTip,
    #[error("difficulty does not match the mandated difficulty")]
    WrongDifficulty,
    #[error("coinbase amount does not match the mandated reward")]
    WrongReward,
    #[error("candidate chain has no more cumulative work than the current chain")]
    NotHeavier,
}

/// Every failure the engine can report. Validation failures are returned,
/// never panicked; malformed peer input must not crash the node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("chain rule violation: {0}")]
    ChainRuleViolation(RuleKind),

    #[error("candidate chain shares no common block with the current chain")]
    IncompatibleChain,

    #[error("sender balance does not cover amount plus fee")]
    InsufficientBalance,

    #[error("transaction already in the mempool")]
    DuplicateTransaction,
}
