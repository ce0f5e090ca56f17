//! Per-call execution context and the result an `Interpreter::execute` run
//! produces.

use crate::config::EvmConfig;
use shared_types::{Address, Hash, U256};

/// How the current call frame was entered; distinguishes `CALLCODE` and
/// `DELEGATECALL`'s "borrowed" storage/identity semantics from a normal call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
}

impl CallKind {
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self, Self::StaticCall)
    }

    #[must_use]
    pub fn is_create(&self) -> bool {
        matches!(self, Self::Create | Self::Create2)
    }
}

/// Block-level environment values visible to opcodes (`COINBASE`, `NUMBER`, ...).
#[derive(Clone, Debug)]
pub struct BlockEnvironment {
    pub beneficiary: Address,
    pub number: u64,
    pub timestamp: u64,
    pub difficulty: U256,
    pub gas_limit: u64,
    pub chain_id: u64,
}

/// Everything a single `Interpreter` run needs to know about the call it
/// is executing, independent of the EVM's own stack/memory/pc state.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub kind: CallKind,
    /// `ADDRESS`: the account whose code/storage is executing.
    pub address: Address,
    /// `CALLER`.
    pub caller: Address,
    /// `ORIGIN`: the externally-owned account that started the transaction.
    pub origin: Address,
    /// `CALLVALUE`.
    pub value: U256,
    /// `CALLDATA*`.
    pub input: Vec<u8>,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub depth: u16,
    pub is_static: bool,
    pub block: BlockEnvironment,
    pub config: EvmConfig,
}

/// The outcome of running an `Interpreter` to completion.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Vec<u8>,
    pub gas_used: u64,
    pub gas_refund: u64,
    pub logs: Vec<Log>,
    /// Set only on an explicit `REVERT`; `None` on a clean `STOP`/`RETURN`
    /// or on any other abnormal termination.
    pub revert_reason: Option<Vec<u8>>,
    /// Addresses scheduled for deletion by `SELFDESTRUCT` during this call
    /// (and any sub-calls that terminated normally).
    pub self_destructs: Vec<(Address, Address)>,
    /// The address of a newly created contract, for `CREATE`/`CREATE2` frames.
    pub created_address: Option<Address>,
}

/// A single EVM log entry, as produced by `LOG0..LOG4`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
}

impl From<Log> for shared_types::Log {
    fn from(log: Log) -> Self {
        shared_types::Log {
            address: log.address,
            topics: log.topics,
            data: log.data,
        }
    }
}
