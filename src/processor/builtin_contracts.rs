/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Calls into the built-in ERC20 and early-reward contracts.
//!
//! The call is read from the transaction's `extra_data` as a [`ContractCall`], and applied to the typed
//! contract object stored at the transaction's `to` address.

use crate::{
    errors::ChainError,
    state::{AccountStateDB, ContractCall, ContractObject, EarlyReward, Erc20Token},
    trie::NodeSource,
    types::{address::Address, transaction::Transaction},
};

/// Apply the contract call in `tx` on behalf of `sender`. `early_reward` selects the early-reward
/// contract, which refuses the actions only the chain itself may perform.
pub fn process<S: NodeSource + Clone>(
    state: &mut AccountStateDB<S>,
    sender: &Address,
    tx: &Transaction,
    early_reward: bool,
) -> Result<(), ChainError> {
    if early_reward {
        let action = ContractCall::action_name(tx.extra_data())?;
        if EarlyReward::PROHIBITED_ACTIONS.contains(&action.as_str()) {
            return Err(ChainError::ProhibitedFunction { action });
        }
    }

    let target = tx.to();
    match ContractCall::decode(tx.extra_data())? {
        ContractCall::Create {
            token_name,
            token_decimals,
            token_symbol,
            token_total_supply,
        } => {
            if target.has_empty_body() || state.contract_exists(target)? {
                return Err(ChainError::InvalidContractData {
                    reason: format!("cannot create a contract at {}", target),
                });
            }
            let token = Erc20Token::new(
                *sender,
                token_name,
                token_decimals,
                token_symbol,
                token_total_supply,
            )?;
            if state.is_empty_account(target)? {
                state.new_account_state(target)?;
            }
            log::debug!("created token contract at {}", target);
            state.put_contract(target, ContractObject::Erc20(token))
        }
        call => {
            let mut contract = state.get_contract(target)?;
            let token = match &mut contract {
                ContractObject::Erc20(token) => token,
                ContractObject::EarlyReward(early) => &mut early.erc_20,
            };
            apply(token, sender, call)?;
            state.put_contract(target, contract)
        }
    }
}

fn apply(token: &mut Erc20Token, caller: &Address, call: ContractCall) -> Result<(), ChainError> {
    match call {
        ContractCall::Transfer { to, value } => token.transfer(caller, &to, &value),
        ContractCall::Approve { spender, value } => {
            token.approve(caller, &spender, value);
            Ok(())
        }
        ContractCall::TransferFrom { from, to, value } => {
            token.transfer_from(caller, &from, &to, &value)
        }
        ContractCall::Create { .. } => Err(ChainError::InvalidContractData {
            reason: "contract already exists".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::StateParams,
        trie::Detached,
        types::{
            address::AddressType,
            crypto_primitives::SignatureRecord,
            data_types::{Amount, CryptoHash},
            transaction::TxData,
        },
    };

    fn call_tx(to: Address, call: &ContractCall) -> Transaction {
        Transaction {
            data: TxData {
                nonce: 0,
                to,
                amount: Amount::zero(),
                gas_price: Amount::from(1u64),
                gas_limit: 100_000,
                extra_data: call.encode(),
            },
            signature: SignatureRecord::empty(),
        }
    }

    fn normal(byte: u8) -> Address {
        Address::from_parts(AddressType::Normal, &[byte; 20])
    }

    #[test]
    fn create_then_transfer_tokens() {
        let mut state =
            AccountStateDB::new(Detached, CryptoHash::zero(), StateParams::default()).unwrap();
        let alice = normal(0xa1);
        let bob = normal(0xb0);
        let token = Address::from_parts(AddressType::Erc20, &[0x77; 20]);

        let create = ContractCall::Create {
            token_name: "Gold".to_string(),
            token_decimals: 2,
            token_symbol: "GLD".to_string(),
            token_total_supply: Amount::from(1_000u64),
        };
        process(&mut state, &alice, &call_tx(token, &create), false).unwrap();
        assert!(process(&mut state, &alice, &call_tx(token, &create), false).is_err());

        let transfer = ContractCall::Transfer {
            to: bob,
            value: Amount::from(300u64),
        };
        process(&mut state, &alice, &call_tx(token, &transfer), false).unwrap();
        match state.get_contract(&token).unwrap() {
            ContractObject::Erc20(token) => {
                assert_eq!(token.balance_of(&alice), Amount::from(700u64));
                assert_eq!(token.balance_of(&bob), Amount::from(300u64));
            }
            other => panic!("unexpected contract {:?}", other),
        }
    }

    #[test]
    fn early_reward_refuses_prohibited_actions() {
        let mut state =
            AccountStateDB::new(Detached, CryptoHash::zero(), StateParams::default()).unwrap();
        let contract = Address::from_parts(AddressType::EarlyReward, &[0x11; 20]);
        let create = ContractCall::Create {
            token_name: "Early".to_string(),
            token_decimals: 0,
            token_symbol: "ER".to_string(),
            token_total_supply: Amount::from(10u64),
        };
        assert!(matches!(
            process(&mut state, &normal(1), &call_tx(contract, &create), true),
            Err(ChainError::ProhibitedFunction { action }) if action == "create"
        ));
    }
}
