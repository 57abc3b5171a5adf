/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The error type surfaced by every fallible operation of the block ingestion pipeline.
//!
//! Errors are grouped (loosely) into structural, consensus, transaction, account, time/height, gas, VM,
//! and storage kinds. Only [`ChainError::FutureBlock`] is "soft": the
//! [ingestion service](crate::service::ChainService) converts it into a queue-and-succeed instead of
//! rejecting the block.

use crate::{storage::pluggables::KVGetError, trie::TrieError};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /* ↓↓↓ Structural ↓↓↓ */
    #[error("chain or block is nil")]
    ChainOrBlockNil,
    #[error("pre block is nil")]
    PreBlockIsNil,
    #[error("pre block hash does not match block.pre_hash")]
    PreBlockHashNotMatch,
    #[error("genesis block is missing")]
    NoGenesis,
    #[error("block not found")]
    BlockNotFound,
    #[error("invalid block number")]
    InvalidBlockNum,
    #[error("invalid block version")]
    InvalidBlockVersion,
    #[error("block is larger than the maximum block size")]
    BlockSizeTooLarge,

    /* ↓↓↓ Consensus ↓↓↓ */
    #[error("block difficulty does not match the retargeted difficulty")]
    InvalidDiff,
    #[error("block hash does not satisfy its difficulty")]
    InvalidHashDiff,
    #[error("invalid coinbase")]
    InvalidCoinBase,
    #[error("seed does not match VRF proof")]
    SeedNotMatch,
    #[error("the first block after genesis carries verifications")]
    FirstBlockHaveVerifications,
    #[error("empty vote list")]
    EmptyVoteList,
    #[error("the same signer appears twice in a vote list")]
    SameVoteSignerInVotes,
    #[error("vote is for a different block hash")]
    InvalidBlockHashInVotes,
    #[error("vote signer is not a current verifier")]
    NotCurrentVerifier,
    #[error("verification root does not match")]
    VerificationRootNotMatch,
    #[error("register root does not match")]
    RegisterRootNotMatch,
    #[error("interlinks do not match the parent block")]
    InterlinkRootNotMatch,
    #[error("not enough votes for block")]
    BlockVotesNotEnough,
    #[error("invalid first vote in special block")]
    InvalidFirstVoteInSpecialBlock,
    #[error("no verifiers available for slot {slot}")]
    NoVerifiersForSlot { slot: u64 },

    /* ↓↓↓ Transactions ↓↓↓ */
    #[error("transaction root does not match")]
    TxRootNotMatch,
    #[error("special block carries transactions")]
    TxInSpecialBlock,
    #[error("invalid transaction type")]
    InvalidTxType,
    #[error("transaction type is not supported")]
    TxNotSupported,
    #[error("transaction nonce does not match sender nonce")]
    TxNonceNotMatch,
    #[error("sender balance is not enough")]
    TxSenderBalanceNotEnough,
    #[error("sender stake is not enough")]
    TxSenderStakeNotEnough,
    #[error("transaction gas limit is not enough")]
    TxGasLimitNotEnough,
    #[error("intrinsic gas exceeds the transaction gas limit")]
    TxGasUsedIsOverGasLimit,
    #[error("stake amount is below the minimum pledge value")]
    TxDelegatesNotEnough,
    #[error("send a register (stake) transaction first")]
    SendRegisterTxFirst,
    #[error("send a cancel transaction first")]
    SendCancelTxFirst,
    #[error("evidence submitted outside of the allowed window")]
    InvalidEvidenceTime,
    #[error("evidence votes do not conflict")]
    EvidenceVoteNotConflict,
    #[error("transaction target address does not match")]
    TxTargetAddressNotMatch,
    #[error("un-stake submitted before the cancel cooldown elapsed")]
    InvalidUnStakeTime,
    #[error("transaction sender or receiver is empty")]
    TxSenderOrReceiverEmpty,
    #[error("receiver does not exist")]
    ReceiverNotExist,
    #[error("invalid evidence target")]
    InvalidEvidenceTarget,
    #[error("invalid stake receiver")]
    InvalidStakeReceiver,
    #[error("contract action is prohibited: {action}")]
    ProhibitedFunction { action: String },

    /* ↓↓↓ Accounts ↓↓↓ */
    #[error("account does not exist")]
    AccountNotExist,
    #[error("balance would become negative")]
    BalanceNegative,
    #[error("contract does not exist")]
    ContractNotExist,
    #[error("invalid contract data: {reason}")]
    InvalidContractData { reason: String },
    #[error("account created twice without an intervening delete")]
    JournalDoubleCreate,
    #[error("account deleted twice without an intervening create")]
    JournalDoubleDelete,
    #[error("state root does not match")]
    StateRootNotMatch,

    /* ↓↓↓ Time and height ↓↓↓ */
    #[error("block height is too low")]
    BlockHeightTooLow,
    #[error("normal block height is too low")]
    NormalBlockHeightTooLow,
    #[error("future block")]
    FutureBlock,
    #[error("future block too far away")]
    FutureBlockTooFarAway,
    #[error("invalid block timestamp")]
    InvalidBlockTimeStamp,

    /* ↓↓↓ Gas ↓↓↓ */
    #[error("invalid header gas limit")]
    InvalidHeaderGasLimit,
    #[error("header gas limit not enough")]
    HeaderGasLimitNotEnough,
    #[error("invalid header gas used")]
    InvalidHeaderGasUsed,
    #[error("header gas used over ranging")]
    HeaderGasUsedOverRanging,
    #[error("invalid gas used")]
    InvalidGasUsed,
    #[error("receipt root does not match")]
    ReceiptRootNotMatch,
    #[error("gas limit reached")]
    GasLimitReached,
    #[error("out of gas")]
    OutOfGas,
    #[error("insufficient balance to pay for gas")]
    InsufficientBalanceForGas,

    /* ↓↓↓ VM ↓↓↓ */
    #[error("execution reverted")]
    ExecutionReverted,
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,
    #[error("contract address collision")]
    ContractAddressCollision,
    #[error("max call depth exceeded")]
    Depth,

    /* ↓↓↓ Already known ↓↓↓ */
    #[error("already have this block")]
    AlreadyHaveThisBlock,

    /* ↓↓↓ Cryptography and encoding ↓↓↓ */
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid VRF proof")]
    InvalidVrfProof,
    #[error("invalid address")]
    InvalidAddress,
    #[error("failed to decode {what}")]
    Decode {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    /* ↓↓↓ Storage ↓↓↓ */
    #[error("trie error: {0}")]
    Trie(#[from] TrieError),
    #[error("kv store error: {0}")]
    KVGet(#[from] KVGetError),
}

impl ChainError {
    /// Whether the error is the soft `FutureBlock` kind that callers should treat as "queue for later"
    /// instead of as a rejection.
    pub fn is_soft(&self) -> bool {
        matches!(self, ChainError::FutureBlock)
    }
}
