//! Keys, genesis, and block production for tests.
//!
//! Blocks are produced against the chain they will be saved to: state, register, and receipt
//! commitments are computed by running the same block processor and register DB the service validates
//! with, so a block built here is valid unless a test deliberately breaks it.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use schnorrkel::{ExpansionMode, Keypair, MiniSecretKey};

use powbft_rs::{
    chain::{CachedChainState, ChainReadView, Genesis, GenesisAccount},
    config::ChainConfig,
    economy_model::FixedRewardModel,
    errors::ChainError,
    processor::{intrinsic_gas, BlockProcessor},
    service::{ChainService, ChainServiceSpec},
    storage::pluggables::KVStore,
    types::{
        address::{Address, AddressType},
        block::{Block, Body, Header},
        crypto_primitives::{keccak256, vrf_prove},
        data_types::{encode, Amount, BlockNonce, CryptoHash},
        derive_sha::derive_sha,
        difficulty::{Difficulty, IGNORED_DIFFICULTY},
        receipt::{create_bloom, Bloom},
        transaction::{Transaction, TxData},
        vote::{EvidenceProof, Vote, VoteMessage, VoteType},
    },
    vm::{CreatePayload, DisabledVm, Vm},
};

use super::{mem_db::MemDB, mock_pool::MockPool};

pub(crate) const INITIAL_BALANCE: u64 = 1_000_000_000;
pub(crate) const GENESIS_GAS_LIMIT: u64 = 10_240_000;
pub(crate) const BLOCK_REWARD: u64 = 1_000;

pub(crate) fn keypair(seed: u8) -> Keypair {
    MiniSecretKey::from_bytes(&[seed; 32])
        .unwrap()
        .expand_to_keypair(ExpansionMode::Uniform)
}

pub(crate) fn address(keypair: &Keypair) -> Address {
    Address::from_public_key(AddressType::Normal, &keypair.public.to_bytes())
}

pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

/// What to put in a block besides what follows from its parent.
#[derive(Default)]
pub(crate) struct Draft {
    pub(crate) txs: Vec<Transaction>,
    pub(crate) special: bool,
    pub(crate) timestamp: Option<u64>,
    pub(crate) gas_limit: Option<u64>,
    /// Difficulty of a normal block. Defaults to the difficulty used when validation is off.
    pub(crate) difficulty: Option<Difficulty>,
}

pub(crate) struct TestChain {
    pub(crate) config: ChainConfig,
    pub(crate) genesis: Genesis,
    pub(crate) boot: Keypair,
    pub(crate) miner: Keypair,
    pub(crate) default_verifiers: Vec<Keypair>,
    pub(crate) users: Vec<Keypair>,
    /// Runs contract transactions, both for the services a test starts and for the blocks it builds.
    pub(crate) vm: Arc<dyn Vm>,
}

impl TestChain {
    /// A chain with one boot node, one miner, four default verifiers, and four funded users. Slots are long
    /// enough that the default verifiers verify every block a test produces.
    pub(crate) fn new() -> TestChain {
        let boot = keypair(1);
        let miner = keypair(2);
        let default_verifiers: Vec<Keypair> = (10..14).map(keypair).collect();
        let users: Vec<Keypair> = (20..24).map(keypair).collect();

        let config = ChainConfig::builder()
            .chain_id(7)
            .slot_size(100)
            .verifier_number(4)
            .verifier_boot_nodes(vec![address(&boot)])
            .default_verifiers(default_verifiers.iter().map(address).collect())
            .ignore_difficulty_validation(true)
            .future_block_tick(Duration::from_millis(100))
            .build();
        let genesis = Genesis::builder()
            .gas_limit(GENESIS_GAS_LIMIT)
            .extra(b"powbft test chain".to_vec())
            .accounts(
                users
                    .iter()
                    .map(|user| GenesisAccount::new(address(user), Amount::from(INITIAL_BALANCE)))
                    .collect(),
            )
            .build();

        TestChain {
            config,
            genesis,
            boot,
            miner,
            default_verifiers,
            users,
            vm: Arc::new(DisabledVm),
        }
    }

    pub(crate) fn with_config(mut self, configure: impl FnOnce(&mut ChainConfig)) -> TestChain {
        configure(&mut self.config);
        self
    }

    pub(crate) fn with_genesis(mut self, configure: impl FnOnce(&mut Genesis)) -> TestChain {
        configure(&mut self.genesis);
        self
    }

    pub(crate) fn with_vm(mut self, vm: impl Vm + 'static) -> TestChain {
        self.vm = Arc::new(vm);
        self
    }

    pub(crate) fn economy_model(&self) -> FixedRewardModel {
        FixedRewardModel::new(Amount::from(BLOCK_REWARD), 80, self.config.verifier_number)
    }

    /// Start a service over `kv_store` with no event handlers.
    pub(crate) fn start(&self, kv_store: MemDB, tx_pool: MockPool) -> ChainService<MemDB> {
        ChainServiceSpec::builder()
            .kv_store(kv_store)
            .config(self.config.clone())
            .genesis(self.genesis.clone())
            .tx_pool(tx_pool)
            .economy_model(self.economy_model())
            .vm(self.vm.clone())
            .build()
            .start()
            .unwrap()
    }

    pub(crate) fn user(&self, index: usize) -> Address {
        address(&self.users[index])
    }

    fn keypair_of(&self, owner: &Address) -> &Keypair {
        std::iter::once(&self.boot)
            .chain(std::iter::once(&self.miner))
            .chain(self.default_verifiers.iter())
            .chain(self.users.iter())
            .find(|keypair| address(keypair) == *owner)
            .unwrap_or_else(|| panic!("no test key for {}", owner))
    }

    /* ↓↓↓ Transactions ↓↓↓ */

    /// A transaction from `from` to `to` with exactly the intrinsic gas it needs, at gas price 1.
    pub(crate) fn tx(
        &self,
        from: &Keypair,
        nonce: u64,
        to: Address,
        amount: u64,
        extra_data: Vec<u8>,
    ) -> Transaction {
        let data = TxData {
            nonce,
            to,
            amount: Amount::from(amount),
            gas_price: Amount::from(1u64),
            gas_limit: intrinsic_gas(&self.config, &extra_data, false).unwrap(),
            extra_data,
        };
        self.config.signer().sign(data, from)
    }

    pub(crate) fn transfer(&self, from: &Keypair, nonce: u64, to: Address, amount: u64) -> Transaction {
        self.tx(from, nonce, to, amount, vec![])
    }

    /// A transaction of type `tx_type` from `from` to its own address of that type.
    pub(crate) fn verifier_tx(
        &self,
        from: &Keypair,
        nonce: u64,
        tx_type: AddressType,
        amount: u64,
    ) -> Transaction {
        self.tx(from, nonce, address(from).with_type(tx_type), amount, vec![])
    }

    /// A contract transaction from `from` to `to` with `gas` on top of the intrinsic gas, at gas price 1.
    pub(crate) fn contract_tx(
        &self,
        from: &Keypair,
        nonce: u64,
        to: Address,
        extra_data: Vec<u8>,
        gas: u64,
    ) -> Transaction {
        let creation = to.address_type() == Some(AddressType::ContractCreate);
        let data = TxData {
            nonce,
            to,
            amount: Amount::zero(),
            gas_price: Amount::from(1u64),
            gas_limit: intrinsic_gas(&self.config, &extra_data, creation).unwrap() + gas,
            extra_data,
        };
        self.config.signer().sign(data, from)
    }

    pub(crate) fn create_contract_tx(
        &self,
        from: &Keypair,
        nonce: u64,
        payload: &CreatePayload,
        gas: u64,
    ) -> Transaction {
        let to = address(from).with_type(AddressType::ContractCreate);
        self.contract_tx(from, nonce, to, encode(payload), gas)
    }

    pub(crate) fn call_contract_tx(
        &self,
        from: &Keypair,
        nonce: u64,
        contract: &Address,
        input: Vec<u8>,
        gas: u64,
    ) -> Transaction {
        let to = contract.with_type(AddressType::ContractCall);
        self.contract_tx(from, nonce, to, input, gas)
    }

    /// Evidence that `accused` signed two different blocks at `height`.
    pub(crate) fn evidence_tx(
        &self,
        from: &Keypair,
        nonce: u64,
        accused: &Keypair,
        height: u64,
    ) -> Transaction {
        let vote_for = |block_hash: CryptoHash| {
            Vote::new(
                VoteMessage {
                    height,
                    round: 0,
                    block_hash,
                    vote_type: VoteType::Vote,
                },
                accused,
            )
        };
        let proof = EvidenceProof {
            first: vote_for(keccak256(b"one block")),
            second: vote_for(keccak256(b"another block")),
        };
        self.tx(
            from,
            nonce,
            address(accused).with_type(AddressType::Evidence),
            0,
            encode(&proof),
        )
    }

    /* ↓↓↓ Blocks ↓↓↓ */

    pub(crate) fn next_block<K: KVStore>(
        &self,
        chain: &CachedChainState<K>,
        parent: &Block,
        txs: Vec<Transaction>,
    ) -> Block {
        self.build(
            chain,
            parent,
            Draft {
                txs,
                ..Draft::default()
            },
        )
    }

    pub(crate) fn special_block<K: KVStore>(
        &self,
        chain: &CachedChainState<K>,
        parent: &Block,
    ) -> Block {
        self.build(
            chain,
            parent,
            Draft {
                special: true,
                ..Draft::default()
            },
        )
    }

    /// Build the child of `parent` described by `draft`. `parent` must be stored in `chain`.
    pub(crate) fn build<K: KVStore>(
        &self,
        chain: &CachedChainState<K>,
        parent: &Block,
        draft: Draft,
    ) -> Block {
        let miner = if draft.special {
            &self.boot
        } else {
            &self.miner
        };
        let verifications = if parent.number() == 0 {
            vec![]
        } else {
            self.commit_votes(chain, parent)
        };
        let (seed, proof) = vrf_prove(miner, &parent.header.seed);
        let body = Body {
            interlinks: parent.child_interlinks(draft.special),
            transactions: draft.txs,
        };
        let (difficulty, nonce) = if draft.special {
            (Difficulty::zero(), BlockNonce::default())
        } else {
            (
                draft.difficulty.unwrap_or(IGNORED_DIFFICULTY),
                BlockNonce::from_u64(parent.number() + 1),
            )
        };

        let header = Header {
            version: self.config.version,
            number: parent.number() + 1,
            pre_hash: parent.hash(),
            seed,
            proof,
            miner_pubkey: miner.public.to_bytes().to_vec(),
            timestamp: draft.timestamp.unwrap_or_else(now_nanos),
            coinbase: address(miner),
            difficulty,
            nonce,
            state_root: CryptoHash::zero(),
            register_root: CryptoHash::zero(),
            tx_root: derive_sha(&body.transactions),
            receipt_root: CryptoHash::zero(),
            verification_root: derive_sha(&verifications),
            bloom_log: Bloom::empty(),
            gas_limit: draft.gas_limit.unwrap_or(parent.header.gas_limit),
            gas_used: 0,
            interlink_root: derive_sha(&body.interlinks),
        };
        let mut block = Block::new(header, body, verifications);
        // A block that does not replay is left without commitments. Tests use such blocks to check that
        // the service rejects them before replaying.
        if let Err(err) = self.commit_to_replay(chain, parent, &mut block) {
            log::debug!("block {} does not replay: {}", block.number(), err);
        }
        block
    }

    /// Fill in the state, register, receipt, and gas commitments of `block` by replaying it on `parent`.
    fn commit_to_replay<K: KVStore>(
        &self,
        chain: &CachedChainState<K>,
        parent: &Block,
        block: &mut Block,
    ) -> Result<(), ChainError> {
        let mut processor =
            BlockProcessor::fork(chain.kv_store().clone(), parent.header.state_root, chain.config())?;
        processor.process(block, chain, &self.economy_model(), &*self.vm)?;
        block.header.state_root = processor.finalise()?;
        let receipts = processor.receipts();
        block.header.receipt_root = derive_sha(receipts);
        block.header.bloom_log = create_bloom(receipts);
        block.header.gas_used = receipts
            .last()
            .map(|receipt| receipt.cumulative_gas_used)
            .unwrap_or(0);

        let mut register = chain.build_register_processor(parent.header.register_root)?;
        register.process(block, &self.config.signer(), Some(parent))?;
        block.header.register_root = register.finalise();
        Ok(())
    }

    /// The votes that commit `block`: a boot vote for a special block, or a vote from every verifier of its
    /// slot for a normal block. The parent of `block` must be stored in `chain`.
    pub(crate) fn commit_votes<K: KVStore>(
        &self,
        chain: &CachedChainState<K>,
        block: &Block,
    ) -> Vec<Vote> {
        let message = |vote_type| VoteMessage {
            height: block.number(),
            round: 0,
            block_hash: block.hash(),
            vote_type,
        };
        if block.is_special() {
            return vec![Vote::new(message(VoteType::VerifierBootVote), &self.boot)];
        }

        let slot = chain.get_slot(block).unwrap();
        chain
            .get_verifiers(slot)
            .unwrap()
            .iter()
            .map(|verifier| Vote::new(message(VoteType::Vote), self.keypair_of(verifier)))
            .collect()
    }
}

/// Set the nonce of `block` to the first one whose hash meets its difficulty, or with `meets_target` false,
/// the first one whose hash misses it.
pub(crate) fn seal(mut block: Block, meets_target: bool) -> Block {
    for nonce in 1.. {
        block.header.nonce = BlockNonce::from_u64(nonce);
        if block.header.difficulty.is_satisfied_by(&block.hash()).unwrap() == meets_target {
            return block;
        }
    }
    unreachable!("no nonce left to try")
}
