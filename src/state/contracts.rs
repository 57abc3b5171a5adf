/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Schemas of the built-in contracts, stored in account storage through JSON-KV flattening.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    errors::ChainError,
    json_kv::{self, JsonKvError},
    types::{
        address::{Address, AddressType},
        data_types::Amount,
    },
};

/// A typed contract object, keyed in the account state by the address of the contract. The schema of
/// the object is determined by the address type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ContractObject {
    Erc20(Erc20Token),
    EarlyReward(EarlyReward),
}

impl ContractObject {
    pub fn from_kv(
        address: &Address,
        kv: &BTreeMap<String, String>,
    ) -> Result<ContractObject, ChainError> {
        match address.address_type() {
            Some(AddressType::Erc20) => Ok(ContractObject::Erc20(json_kv::from_kv(kv)?)),
            Some(AddressType::EarlyReward) => {
                Ok(ContractObject::EarlyReward(json_kv::from_kv(kv)?))
            }
            _ => Err(ChainError::InvalidContractData {
                reason: format!("{} is not a built-in contract address", address),
            }),
        }
    }
}

impl Serialize for ContractObject {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContractObject::Erc20(token) => token.serialize(serializer),
            ContractObject::EarlyReward(contract) => contract.serialize(serializer),
        }
    }
}

/// A fungible token with ERC20 semantics. Balances and allowances are keyed by the hex form of
/// addresses.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Erc20Token {
    pub owner: Address,
    pub token_name: String,
    pub token_decimals: u32,
    pub token_symbol: String,
    pub token_total_supply: Amount,
    #[serde(default)]
    pub balances: BTreeMap<String, Amount>,
    #[serde(default)]
    pub allowed: BTreeMap<String, BTreeMap<String, Amount>>,
}

impl Erc20Token {
    /// Mint `total_supply` tokens to `owner`.
    pub fn new(
        owner: Address,
        token_name: String,
        token_decimals: u32,
        token_symbol: String,
        token_total_supply: Amount,
    ) -> Result<Erc20Token, ChainError> {
        let invalid = |reason: &str| ChainError::InvalidContractData {
            reason: reason.to_string(),
        };
        if owner.is_empty() {
            return Err(invalid("token owner is empty"));
        }
        if token_name.is_empty() {
            return Err(invalid("token name is empty"));
        }
        if token_total_supply.is_zero() {
            return Err(invalid("token total supply must be positive"));
        }

        let mut balances = BTreeMap::new();
        balances.insert(owner.to_string(), token_total_supply.clone());
        Ok(Erc20Token {
            owner,
            token_name,
            token_decimals,
            token_symbol,
            token_total_supply,
            balances,
            allowed: BTreeMap::new(),
        })
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.balances
            .get(&address.to_string())
            .cloned()
            .unwrap_or_default()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowed
            .get(&owner.to_string())
            .and_then(|spenders| spenders.get(&spender.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, value: &Amount) -> Result<(), ChainError> {
        if value.is_zero() {
            return Err(ChainError::InvalidContractData {
                reason: "transfer value must be positive".to_string(),
            });
        }
        let remaining = self
            .balance_of(from)
            .checked_sub(value)
            .ok_or_else(|| ChainError::InvalidContractData {
                reason: "token balance is not enough".to_string(),
            })?;
        let received = &self.balance_of(to) + value;
        self.balances.insert(from.to_string(), remaining);
        self.balances.insert(to.to_string(), received);
        Ok(())
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, value: Amount) {
        self.allowed
            .entry(owner.to_string())
            .or_default()
            .insert(spender.to_string(), value);
    }

    /// Move `value` tokens of `from` to `to` on behalf of `spender`, consuming allowance.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        value: &Amount,
    ) -> Result<(), ChainError> {
        let allowance = self
            .allowance(from, spender)
            .checked_sub(value)
            .ok_or_else(|| ChainError::InvalidContractData {
                reason: "token allowance is not enough".to_string(),
            })?;
        self.transfer(from, to, value)?;
        self.approve(from, spender, allowance);
        Ok(())
    }
}

/// The early-reward token: an ERC20 token minted by the foundation, redeemable for coins.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct EarlyReward {
    pub erc_20: Erc20Token,
    /// Coins still needed to redeem every outstanding token.
    pub need_coin: Amount,
    /// Tokens already redeemed for coins.
    pub change_to_coin_token: Amount,
    #[serde(default)]
    pub exchange_rate: Vec<u64>,
}

impl EarlyReward {
    /// Actions that only the chain itself may perform on the early-reward contract.
    pub const PROHIBITED_ACTIONS: [&'static str; 3] =
        ["create", "reward_mine_master", "reward_verifier"];
}

/// A call to a built-in contract, carried JSON-encoded in a transaction's `extra_data` as
/// `{"action": ..., "params": {...}}`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum ContractCall {
    Create {
        token_name: String,
        token_decimals: u32,
        token_symbol: String,
        token_total_supply: Amount,
    },
    Transfer {
        to: Address,
        value: Amount,
    },
    Approve {
        spender: Address,
        value: Amount,
    },
    TransferFrom {
        from: Address,
        to: Address,
        value: Amount,
    },
}

impl ContractCall {
    /// The action name of a JSON-encoded call, read without committing to a schema.
    pub fn action_name(extra_data: &[u8]) -> Result<String, ChainError> {
        let value: serde_json::Value =
            serde_json::from_slice(extra_data).map_err(JsonKvError::from)?;
        value
            .get("action")
            .and_then(|action| action.as_str())
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidContractData {
                reason: "contract call has no action".to_string(),
            })
    }

    pub fn decode(extra_data: &[u8]) -> Result<ContractCall, ChainError> {
        Ok(serde_json::from_slice(extra_data).map_err(JsonKvError::from)?)
    }

    pub fn encode(&self) -> Vec<u8> {
        // Safety: every field of a call serializes to JSON infallibly.
        serde_json::to_vec(self).expect("contract call serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::address::AddressType;

    fn address(byte: u8) -> Address {
        Address::from_parts(AddressType::Normal, &[byte; 20])
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let mut token = Erc20Token::new(
            address(1),
            "token".to_string(),
            0,
            "TKN".to_string(),
            Amount::from(100u64),
        )
        .unwrap();
        token.approve(&address(1), &address(2), Amount::from(30u64));
        token
            .transfer_from(&address(2), &address(1), &address(3), &Amount::from(20u64))
            .unwrap();

        assert_eq!(token.balance_of(&address(1)), Amount::from(80u64));
        assert_eq!(token.balance_of(&address(3)), Amount::from(20u64));
        assert_eq!(token.allowance(&address(1), &address(2)), Amount::from(10u64));
        assert!(token
            .transfer_from(&address(2), &address(1), &address(3), &Amount::from(20u64))
            .is_err());
    }

    #[test]
    fn calls_use_action_and_params() {
        let call = ContractCall::Transfer {
            to: address(9),
            value: Amount::from(5u64),
        };
        let bytes = call.encode();
        assert_eq!(ContractCall::action_name(&bytes).unwrap(), "transfer");
        assert_eq!(ContractCall::decode(&bytes).unwrap(), call);
    }

    #[test]
    fn token_flattens_into_storage_paths() {
        let token = Erc20Token::new(
            address(1),
            "token".to_string(),
            2,
            "TKN".to_string(),
            Amount::from(7u64),
        )
        .unwrap();
        let kv = json_kv::to_kv(&token).unwrap();
        assert_eq!(
            kv.get(&format!("balances.{}", address(1))),
            Some(&"\"7\"".to_string())
        );
        let object = ContractObject::from_kv(
            &Address::from_parts(AddressType::Erc20, &[5; 20]),
            &kv,
        )
        .unwrap();
        assert_eq!(object, ContractObject::Erc20(token));
    }
}
