//! Transport adapters
//!
//! Two interchangeable channels to the AI service behind the
//! [`Transport`](lucie_core::traits::Transport) trait: a binary RPC channel
//! over TCP (primary) and an HTTP channel (fallback).

mod rest;
mod rpc;

pub use rest::RestTransport;
pub use rpc::RpcTransport;
