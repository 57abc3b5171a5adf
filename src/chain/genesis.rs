/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The genesis block and the initial state it commits to.

use typed_builder::TypedBuilder;

use crate::{
    config::ChainConfig,
    errors::ChainError,
    register_db::RegisterDB,
    state::{AccountStateDB, ContractObject},
    storage::{pluggables::WriteBatch, write_batch::ChainWriteBatch},
    trie::NodeSource,
    types::{
        address::Address,
        block::{Block, Body, Header},
        crypto_primitives::keccak256,
        data_types::{Amount, BlockNonce, CryptoHash},
        derive_sha::derive_sha,
        difficulty::{Difficulty, IGNORED_DIFFICULTY},
        receipt::{Bloom, Receipt},
        transaction::Transaction,
        vote::Vote,
    },
};

/// Gas limit of the genesis block unless overridden.
pub const DEFAULT_GENESIS_GAS_LIMIT: u64 = 3_360_000_000;

/// An account that exists from block 0 on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: Amount,
    pub stake: Amount,
}

impl GenesisAccount {
    pub fn new(address: Address, balance: Amount) -> GenesisAccount {
        GenesisAccount {
            address,
            balance,
            stake: Amount::zero(),
        }
    }

    pub fn with_stake(mut self, stake: Amount) -> GenesisAccount {
        self.stake = stake;
        self
    }
}

#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Genesis]. Every parameter is optional.
"))]
pub struct Genesis {
    #[builder(default = 0, setter(doc = "Set the timestamp of the genesis block, in nanoseconds since the Unix epoch. Optional."))]
    pub timestamp: u64,
    #[builder(default, setter(doc = "Set the accounts, balances, and stakes that exist at block 0. Optional."))]
    pub accounts: Vec<GenesisAccount>,
    #[builder(default, setter(doc = "Set the candidate verifiers registered at block 0. Optional."))]
    pub registered: Vec<Address>,
    #[builder(default = IGNORED_DIFFICULTY, setter(doc = "Set the difficulty of the genesis block. Must not be zero. Optional."))]
    pub difficulty: Difficulty,
    #[builder(default = DEFAULT_GENESIS_GAS_LIMIT, setter(doc = "Set the gas limit of the genesis block. Optional."))]
    pub gas_limit: u64,
    #[builder(default, setter(doc = "Set extra data. Its hash is the seed of the genesis block. Optional."))]
    pub extra: Vec<u8>,
    #[builder(default, setter(doc = "Set the built-in contracts deployed at block 0. Optional."))]
    pub contracts: Vec<(Address, ContractObject)>,
}

impl Default for Genesis {
    fn default() -> Self {
        Genesis::builder().build()
    }
}

impl Genesis {
    /// Commit the genesis state and register into `wb`, write block 0 as the canonical head into `wb`, and
    /// return block 0.
    ///
    /// Besides the listed accounts, every verifier boot node and default verifier in `config` gets an
    /// account, so that verifier bookkeeping can credit them from block 1 on.
    pub fn apply<S: NodeSource + Clone, W: WriteBatch>(
        &self,
        config: &ChainConfig,
        source: S,
        wb: &mut ChainWriteBatch<W>,
    ) -> Result<Block, ChainError> {
        if self.difficulty.is_zero() {
            return Err(ChainError::InvalidDiff);
        }

        let mut state = AccountStateDB::new(source.clone(), CryptoHash::zero(), config.state_params())?;
        for account in &self.accounts {
            if state.is_empty_account(&account.address)? {
                state.new_account_state(&account.address)?;
            }
            state.add_balance(&account.address, &account.balance)?;
            if !account.stake.is_zero() {
                state.add_stake(&account.address, &account.stake)?;
            }
        }
        for address in config
            .verifier_boot_nodes
            .iter()
            .chain(config.default_verifiers.iter())
        {
            if state.is_empty_account(address)? {
                state.new_account_state(address)?;
            }
        }
        for (address, contract) in &self.contracts {
            if state.is_empty_account(address)? {
                state.new_account_state(address)?;
            }
            state.put_contract(address, contract.clone())?;
        }
        let state_root = state.commit(wb)?;

        let mut register = RegisterDB::new(source, CryptoHash::zero(), config.slot_size)?;
        register.prepare()?;
        for address in &self.registered {
            register.save_register_data(address)?;
        }
        let register_root = register.commit(wb);

        let body = Body::default();
        let header = Header {
            version: config.version,
            number: 0,
            pre_hash: CryptoHash::zero(),
            seed: keccak256(&self.extra),
            proof: vec![],
            miner_pubkey: vec![],
            timestamp: self.timestamp,
            coinbase: Address::empty(),
            difficulty: self.difficulty,
            nonce: BlockNonce::default(),
            state_root,
            register_root,
            tx_root: derive_sha::<Transaction>(&[]),
            receipt_root: derive_sha::<Receipt>(&[]),
            verification_root: derive_sha::<Vote>(&[]),
            bloom_log: Bloom::empty(),
            gas_limit: self.gas_limit,
            gas_used: 0,
            interlink_root: derive_sha(&body.interlinks),
        };
        let block = Block::new(header, body, vec![]);

        wb.set_block(&block);
        wb.set_receipts(&block.hash(), &[]);
        wb.set_canonical_hash(0, &block.hash());
        wb.set_head(&block.hash());
        Ok(block)
    }
}
