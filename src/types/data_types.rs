/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    io::{Read, Write},
    ops::{Add, Mul},
    str::FromStr,
};

use borsh::{BorshDeserialize, BorshSerialize};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// 32-byte cryptographic hash.
///
/// Within this crate all `CryptoHash`-es are Keccak-256 digests produced by
/// [`keccak256`](super::crypto_primitives::keccak256). The all-zero hash denotes "absent" or
/// "uninitialised" (e.g., the root of an empty trie, or the `data_root` of a non-contract account).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero `CryptoHash`.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Build a `CryptoHash` out of a byte slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Arbitrary-precision, non-negative amount of tokens.
///
/// Balances, stakes, gas prices, and rewards are all `Amount`s. Subtraction is only available in its
/// [checked](Self::checked_sub) form, so that callers are forced to decide what an underflow means (in
/// the account state engine it becomes `BalanceNegative`).
///
/// # Encoding
///
/// - Borsh: the big-endian magnitude bytes, length-prefixed like a `Vec<u8>`.
/// - Serde: a decimal string, so that JSON-KV flattening of contract objects never loses precision.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(int: BigUint) -> Self {
        Self(int)
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Get a reference to the inner `BigUint` of this `Amount`.
    pub fn int(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_sub(&self, rhs: &Amount) -> Option<Amount> {
        if self.0 >= rhs.0 {
            Some(Amount(&self.0 - &rhs.0))
        } else {
            None
        }
    }

    /// Lossy conversion used by floating point reputation formulas.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::MAX)
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }
}

impl From<u64> for Amount {
    fn from(int: u64) -> Self {
        Self(BigUint::from(int))
    }
}

impl From<u128> for Amount {
    fn from(int: u128) -> Self {
        Self(BigUint::from(int))
    }
}

impl Add<&Amount> for &Amount {
    type Output = Amount;
    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Mul<u64> for &Amount {
    type Output = Amount;
    fn mul(self, rhs: u64) -> Amount {
        Amount(&self.0 * BigUint::from(rhs))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for Amount {
    type Err = num_bigint::ParseBigIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigUint::from_str(s).map(Self)
    }
}

impl BorshSerialize for Amount {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        BorshSerialize::serialize(&self.0.to_bytes_be(), writer)
    }
}

impl BorshDeserialize for Amount {
    fn deserialize_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let bytes = Vec::<u8>::deserialize_reader(reader)?;
        Ok(Amount(BigUint::from_bytes_be(&bytes)))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(de::Error::custom)
    }
}

/// Proof-of-work nonce of a block header. A zero nonce together with a zero difficulty marks a
/// [special block](super::block::Header::is_special).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct BlockNonce([u8; 8]);

impl BlockNonce {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn from_u64(int: u64) -> Self {
        Self(int.to_be_bytes())
    }

    pub const fn bytes(&self) -> [u8; 8] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }
}

impl Debug for BlockNonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u64::from_be_bytes(self.0))
    }
}

/// Serialize `value` into its canonical Borsh encoding.
pub fn encode<T: BorshSerialize>(value: &T) -> Vec<u8> {
    // Safety: Borsh serialization into a `Vec<u8>` only fails if the writer fails, and a `Vec` never does.
    value.try_to_vec().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_borsh_is_big_endian_magnitude() {
        let amount = Amount::from(0x0102u64);
        let bytes = encode(&amount);
        assert_eq!(bytes, vec![2, 0, 0, 0, 1, 2]);
        assert_eq!(<Amount as BorshDeserialize>::deserialize(&mut bytes.as_slice()).unwrap(), amount);
    }

    #[test]
    fn amount_checked_sub_refuses_underflow() {
        let small = Amount::from(3u64);
        let big = Amount::from(5u64);
        assert_eq!(big.checked_sub(&small), Some(Amount::from(2u64)));
        assert_eq!(small.checked_sub(&big), None);
    }

    #[test]
    fn amount_serde_uses_decimal_strings() {
        let amount = Amount::from_str("999999999999999999999999999999").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"999999999999999999999999999999\"");
        assert_eq!(serde_json::from_str::<Amount>(&json).unwrap(), amount);
    }
}
