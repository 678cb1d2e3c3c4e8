//! A single-node proof-of-work ledger.
//!
//! - [`blockchain`] - keys, signatures, transactions, blocks and the ledger
//! - [`miner`] - periodic background mining
//! - [`config`] - configuration file and defaults
//! - [`api`] - REST endpoints over a shared [`blockchain::Ledger`]

#![forbid(unsafe_code)]

pub mod api;
pub mod blockchain;
pub mod config;
pub mod miner;
