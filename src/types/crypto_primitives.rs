/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide three categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: Keccak-256, provided by the [`sha3`] crate.
//! 2. **Digital Signatures**: sr25519 Schnorr signatures, provided by the [`schnorrkel`] crate.
//! 3. **Verifiable Random Functions**: the sr25519 VRF, also provided by [`schnorrkel`].
//!
//! Every participant holds a single sr25519 keypair. The same key signs transactions and votes, and
//! produces the VRF output that becomes the `seed` of the blocks it mines.

use borsh::{BorshDeserialize, BorshSerialize};
use schnorrkel::{
    signing_context,
    vrf::{VRFPreOut, VRFProof},
    ExpansionMode, MiniSecretKey,
};
use sha3::{Digest, Keccak256};

use super::{
    address::{Address, AddressType},
    data_types::CryptoHash,
};
use crate::errors::ChainError;

// re-exports below.
pub use schnorrkel::{Keypair, PublicKey, SecretKey, Signature, SignatureError};

/// Signing context for transaction and vote signatures.
pub const SIGNING_CONTEXT: &[u8] = b"powbft-signature";

/// Signing context for the block seed VRF.
pub const VRF_CONTEXT: &[u8] = b"powbft-seed-vrf";

/// Length in bytes of a serialized VRF proof.
pub const VRF_PROOF_LENGTH: usize = 64;

/// Compute the Keccak-256 digest of `bytes`.
pub fn keccak256(bytes: &[u8]) -> CryptoHash {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    CryptoHash::new(hasher.finalize().into())
}

/// Deterministically expand a 32-byte seed into a keypair.
pub fn keypair_from_seed(seed: &[u8; 32]) -> Result<Keypair, ChainError> {
    let mini = MiniSecretKey::from_bytes(seed).map_err(|_| ChainError::InvalidSignature)?;
    Ok(mini.expand_to_keypair(ExpansionMode::Uniform))
}

/// Generate a fresh keypair from the operating system's randomness source.
pub fn generate_keypair() -> Keypair {
    Keypair::generate_with(rand_core::OsRng)
}

/// An sr25519 signature together with the public key that produced it.
///
/// Because sr25519 signatures are not recoverable, the signer's public key travels with the signature.
/// "Recovering" a signer means verifying the signature under the carried key, and then deriving an
/// [`Address`] from that key.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct SignatureRecord {
    public_key: [u8; 32],
    signature: [u8; 64],
}

impl SignatureRecord {
    /// Sign `message` with `keypair`.
    pub fn sign(keypair: &Keypair, message: &CryptoHash) -> SignatureRecord {
        let context = signing_context(SIGNING_CONTEXT);
        let signature = keypair.sign(context.bytes(&message.bytes()));
        SignatureRecord {
            public_key: keypair.public.to_bytes(),
            signature: signature.to_bytes(),
        }
    }

    /// A record that carries no key and no signature. Never verifies.
    pub const fn empty() -> SignatureRecord {
        SignatureRecord {
            public_key: [0u8; 32],
            signature: [0u8; 64],
        }
    }

    pub const fn public_key(&self) -> [u8; 32] {
        self.public_key
    }

    /// Verify that the carried key signed `message`, returning that key on success.
    pub fn verify(&self, message: &CryptoHash) -> Result<PublicKey, ChainError> {
        let public_key =
            PublicKey::from_bytes(&self.public_key).map_err(|_| ChainError::InvalidSignature)?;
        let signature =
            Signature::from_bytes(&self.signature).map_err(|_| ChainError::InvalidSignature)?;
        public_key
            .verify(signing_context(SIGNING_CONTEXT).bytes(&message.bytes()), &signature)
            .map_err(|_| ChainError::InvalidSignature)?;
        Ok(public_key)
    }

    /// Verify the signature over `message` and derive the signer's address of type `address_type`.
    pub fn recover(
        &self,
        message: &CryptoHash,
        address_type: AddressType,
    ) -> Result<Address, ChainError> {
        let public_key = self.verify(message)?;
        Ok(Address::from_public_key(address_type, &public_key.to_bytes()))
    }
}

/// Produce a VRF output (which becomes a block's `seed`) and proof over `input` (the parent's seed).
pub fn vrf_prove(keypair: &Keypair, input: &CryptoHash) -> (CryptoHash, Vec<u8>) {
    let context = signing_context(VRF_CONTEXT);
    let (in_out, proof, _) = keypair.vrf_sign(context.bytes(&input.bytes()));
    (
        CryptoHash::new(in_out.to_preout().0),
        proof.to_bytes().to_vec(),
    )
}

/// Check that `seed` and `proof` are the VRF output and proof of the key `public_key` over `input`.
pub fn vrf_verify(
    public_key: &[u8],
    input: &CryptoHash,
    seed: &CryptoHash,
    proof: &[u8],
) -> Result<(), ChainError> {
    let public_key = PublicKey::from_bytes(public_key).map_err(|_| ChainError::InvalidVrfProof)?;
    let pre_out = VRFPreOut(seed.bytes());
    let proof = VRFProof::from_bytes(proof).map_err(|_| ChainError::InvalidVrfProof)?;
    public_key
        .vrf_verify(
            signing_context(VRF_CONTEXT).bytes(&input.bytes()),
            &pre_out,
            &proof,
        )
        .map(|_| ())
        .map_err(|_| ChainError::SeedNotMatch)
}
