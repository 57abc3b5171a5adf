/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Signed transactions and the chain-bound [`Signer`].

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    address::{Address, AddressType},
    crypto_primitives::{keccak256, Keypair, SignatureRecord},
    data_types::{encode, Amount, CryptoHash},
};
use crate::errors::ChainError;

/// The signed-over part of a transaction.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct TxData {
    pub nonce: u64,
    pub to: Address,
    pub amount: Amount,
    pub gas_price: Amount,
    pub gas_limit: u64,
    pub extra_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub data: TxData,
    pub signature: SignatureRecord,
}

impl Transaction {
    /// The transaction id: the hash of its canonical encoding, signature included.
    pub fn hash(&self) -> CryptoHash {
        keccak256(&encode(self))
    }

    /// The type of a transaction is the type of its destination address.
    pub fn tx_type(&self) -> Option<AddressType> {
        self.data.to.address_type()
    }

    pub fn nonce(&self) -> u64 {
        self.data.nonce
    }

    pub fn to(&self) -> &Address {
        &self.data.to
    }

    pub fn amount(&self) -> &Amount {
        &self.data.amount
    }

    pub fn gas_price(&self) -> &Amount {
        &self.data.gas_price
    }

    pub fn gas_limit(&self) -> u64 {
        self.data.gas_limit
    }

    pub fn extra_data(&self) -> &[u8] {
        &self.data.extra_data
    }

    /// `gas_limit * gas_price`, the most this transaction can spend on gas.
    pub fn max_fee(&self) -> Amount {
        &self.data.gas_price * self.data.gas_limit
    }

    pub fn size(&self) -> usize {
        encode(self).len()
    }
}

/// Recovers transaction senders and signs transaction data for one specific chain.
///
/// Signatures are made over `keccak256(borsh((chain_id, tx_data)))`, so a transaction signed for one
/// chain never validates on another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signer {
    chain_id: u64,
}

impl Signer {
    pub fn new(chain_id: u64) -> Signer {
        Signer { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The message that signatures over `data` sign.
    pub fn signing_hash(&self, data: &TxData) -> CryptoHash {
        keccak256(&encode(&(self.chain_id, data)))
    }

    /// Verify the signature of `tx` and return the normal address of its signer.
    pub fn sender(&self, tx: &Transaction) -> Result<Address, ChainError> {
        tx.signature
            .recover(&self.signing_hash(&tx.data), AddressType::Normal)
    }

    pub fn sign(&self, data: TxData, keypair: &Keypair) -> Transaction {
        let signature = SignatureRecord::sign(keypair, &self.signing_hash(&data));
        Transaction { data, signature }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::crypto_primitives::keypair_from_seed;

    fn sample_data() -> TxData {
        TxData {
            nonce: 0,
            to: Address::from_public_key(AddressType::Normal, &[2u8; 32]),
            amount: Amount::from(10u64),
            gas_price: Amount::from(1u64),
            gas_limit: 21_000,
            extra_data: vec![],
        }
    }

    #[test]
    fn sender_is_the_signing_key_address() {
        let keypair = keypair_from_seed(&[1u8; 32]).unwrap();
        let signer = Signer::new(1);
        let tx = signer.sign(sample_data(), &keypair);
        assert_eq!(
            signer.sender(&tx).unwrap(),
            Address::from_public_key(AddressType::Normal, &keypair.public.to_bytes())
        );
    }

    #[test]
    fn signature_is_bound_to_the_chain_id() {
        let keypair = keypair_from_seed(&[1u8; 32]).unwrap();
        let tx = Signer::new(1).sign(sample_data(), &keypair);
        assert!(Signer::new(2).sender(&tx).is_err());
    }
}
