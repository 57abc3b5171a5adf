/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! 22-byte typed account addresses.
//!
//! An address is a 2-byte big-endian type tag followed by a 20-byte body. For addresses derived from a
//! public key, the body is the last 20 bytes of `keccak256(public_key)`. The type tag of a transaction's
//! `to` address decides how the transaction is processed (see
//! [`BlockProcessor`](crate::processor::BlockProcessor)).

use std::fmt::{self, Debug, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::crypto_primitives::keccak256;
use crate::errors::ChainError;

pub const ADDRESS_LENGTH: usize = 22;
pub const ADDRESS_TYPE_LENGTH: usize = 2;

/// The kind of account an [`Address`] refers to, encoded in its first two bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AddressType {
    Normal,
    Cross,
    Stake,
    Cancel,
    UnStake,
    Evidence,
    Erc20,
    EarlyReward,
    Contract,
    ContractCreate,
    ContractCall,
}

impl AddressType {
    pub const fn tag(&self) -> u16 {
        match self {
            AddressType::Normal => 0x0000,
            AddressType::Cross => 0x0001,
            AddressType::Stake => 0x0002,
            AddressType::Cancel => 0x0003,
            AddressType::UnStake => 0x0004,
            AddressType::Evidence => 0x0005,
            AddressType::Erc20 => 0x0010,
            AddressType::EarlyReward => 0x0011,
            AddressType::Contract => 0x0012,
            AddressType::ContractCreate => 0x0014,
            AddressType::ContractCall => 0x0015,
        }
    }

    pub const fn from_tag(tag: u16) -> Option<AddressType> {
        match tag {
            0x0000 => Some(AddressType::Normal),
            0x0001 => Some(AddressType::Cross),
            0x0002 => Some(AddressType::Stake),
            0x0003 => Some(AddressType::Cancel),
            0x0004 => Some(AddressType::UnStake),
            0x0005 => Some(AddressType::Evidence),
            0x0010 => Some(AddressType::Erc20),
            0x0011 => Some(AddressType::EarlyReward),
            0x0012 => Some(AddressType::Contract),
            0x0014 => Some(AddressType::ContractCreate),
            0x0015 => Some(AddressType::ContractCall),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// The all-zero address, used as "no address".
    pub const fn empty() -> Self {
        Self([0u8; ADDRESS_LENGTH])
    }

    pub const fn bytes(&self) -> [u8; ADDRESS_LENGTH] {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Build an address from a type tag and a 20-byte body.
    pub fn from_parts(address_type: AddressType, body: &[u8; 20]) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[..ADDRESS_TYPE_LENGTH].copy_from_slice(&address_type.tag().to_be_bytes());
        bytes[ADDRESS_TYPE_LENGTH..].copy_from_slice(body);
        Self(bytes)
    }

    /// Derive the address of type `address_type` that belongs to `public_key`.
    pub fn from_public_key(address_type: AddressType, public_key: &[u8]) -> Self {
        let digest = keccak256(public_key).bytes();
        let mut body = [0u8; 20];
        body.copy_from_slice(&digest[12..]);
        Self::from_parts(address_type, &body)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChainError> {
        <[u8; ADDRESS_LENGTH]>::try_from(bytes)
            .map(Self)
            .map_err(|_| ChainError::InvalidAddress)
    }

    pub fn tag(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// The decoded type of this address, or `None` if its tag is unknown.
    pub fn address_type(&self) -> Option<AddressType> {
        AddressType::from_tag(self.tag())
    }

    pub fn body(&self) -> [u8; 20] {
        let mut body = [0u8; 20];
        body.copy_from_slice(&self.0[ADDRESS_TYPE_LENGTH..]);
        body
    }

    /// The address with the same body as this one but a different type tag. Used e.g. to go from an
    /// evidence address to the normal address of the accused.
    pub fn with_type(&self, address_type: AddressType) -> Self {
        Self::from_parts(address_type, &self.body())
    }

    /// Whether the body of this address is all zeroes (the "create" form of contract addresses).
    pub fn has_empty_body(&self) -> bool {
        self.0[ADDRESS_TYPE_LENGTH..].iter().all(|byte| *byte == 0)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::str::FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| ChainError::InvalidAddress)?;
        Address::from_slice(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(|_| de::Error::custom("invalid address"))
    }
}
