#![allow(dead_code)]

pub(crate) mod chain_builder;

pub(crate) mod logging;

pub(crate) mod mem_db;

pub(crate) mod mock_pool;

pub(crate) mod storage_vm;
