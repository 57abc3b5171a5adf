/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Verifier votes and evidence of conflicting votes.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    address::{Address, AddressType},
    crypto_primitives::{keccak256, Keypair, SignatureRecord},
    data_types::{encode, CryptoHash},
};
use crate::errors::ChainError;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, BorshSerialize, BorshDeserialize)]
pub enum VoteType {
    PreVote,
    Vote,
    /// Cast by a verifier boot node on a special block.
    VerifierBootVote,
}

/// The part of a vote that is signed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct VoteMessage {
    pub height: u64,
    pub round: u64,
    pub block_hash: CryptoHash,
    pub vote_type: VoteType,
}

impl VoteMessage {
    pub fn hash(&self) -> CryptoHash {
        keccak256(&encode(self))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub message: VoteMessage,
    pub witness: Address,
    pub signature: SignatureRecord,
}

impl Vote {
    /// Sign `message` with `keypair`. The witness is the normal address of `keypair`.
    pub fn new(message: VoteMessage, keypair: &Keypair) -> Vote {
        Vote {
            message,
            witness: Address::from_public_key(AddressType::Normal, &keypair.public.to_bytes()),
            signature: SignatureRecord::sign(keypair, &message.hash()),
        }
    }

    pub fn height(&self) -> u64 {
        self.message.height
    }

    pub fn round(&self) -> u64 {
        self.message.round
    }

    pub fn block_hash(&self) -> CryptoHash {
        self.message.block_hash
    }

    pub fn vote_type(&self) -> VoteType {
        self.message.vote_type
    }

    /// Verify the signature and return the address that produced it, which must equal the witness.
    pub fn signer(&self) -> Result<Address, ChainError> {
        let signer = self
            .signature
            .recover(&self.message.hash(), AddressType::Normal)?;
        if signer != self.witness {
            return Err(ChainError::InvalidSignature);
        }
        Ok(signer)
    }

    pub fn hash(&self) -> CryptoHash {
        keccak256(&encode(self))
    }
}

/// The payload (`extra_data`) of an evidence transaction: two votes that the accused signed for the
/// same height and round but for different blocks.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct EvidenceProof {
    pub first: Vote,
    pub second: Vote,
}

impl EvidenceProof {
    pub fn decode(bytes: &[u8]) -> Result<EvidenceProof, ChainError> {
        EvidenceProof::deserialize(&mut &*bytes).map_err(|source| ChainError::Decode {
            what: "evidence proof",
            source,
        })
    }

    /// Check that the two votes were both signed by `accused` and genuinely conflict.
    pub fn validate(&self, accused: &Address) -> Result<(), ChainError> {
        let first_signer = self.first.signer()?;
        let second_signer = self.second.signer()?;
        if first_signer != second_signer || &first_signer != accused {
            return Err(ChainError::TxTargetAddressNotMatch);
        }

        let (a, b) = (&self.first.message, &self.second.message);
        if a.height != b.height
            || a.round != b.round
            || a.vote_type != b.vote_type
            || a.block_hash == b.block_hash
        {
            return Err(ChainError::EvidenceVoteNotConflict);
        }
        Ok(())
    }
}
