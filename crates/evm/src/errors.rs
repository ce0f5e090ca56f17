//! Error types for bytecode execution, gas accounting, and precompiles.

use shared_types::Address;
use thiserror::Error;

/// Errors that can occur during EVM execution.
#[derive(Debug, Error, Clone)]
pub enum VmError {
    #[error("out of gas")]
    OutOfGas,

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("invalid opcode: 0x{0:02X}")]
    InvalidOpcode(u8),

    #[error("invalid jump destination: {0}")]
    InvalidJump(usize),

    #[error("call depth exceeded: {depth} > {max}")]
    CallDepthExceeded { depth: u16, max: u16 },

    #[error("code size exceeded: {size} > {max} bytes")]
    CodeSizeExceeded { size: usize, max: usize },

    #[error("init code size exceeded: {size} > {max} bytes")]
    InitCodeSizeExceeded { size: usize, max: usize },

    #[error("write operation in static context")]
    WriteInStaticContext,

    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("revert")]
    Revert(Vec<u8>),

    #[error("memory access out of bounds: offset {offset}, size {size}")]
    MemoryOutOfBounds { offset: usize, size: usize },

    #[error("memory limit exceeded: {requested} > {max} bytes")]
    MemoryLimitExceeded { requested: usize, max: usize },

    #[error("contract already exists at address: {0:?}")]
    ContractAlreadyExists(Address),

    #[error("invalid contract creation: code is empty")]
    InvalidContractCreation,

    #[error("code starts with 0xEF byte (reserved for EOF)")]
    InvalidCodePrefix,

    #[error("precompile error: {0}")]
    Precompile(#[from] PrecompileError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VmError {
    /// Returns true if execution may continue reading return data (i.e. is a revert).
    #[must_use]
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Revert(_))
    }

    /// Returns true if this error consumes all remaining gas.
    #[must_use]
    pub fn consumes_all_gas(&self) -> bool {
        !matches!(self, Self::Revert(_))
    }
}

/// Errors from world-state access through the EVM's state port.
#[derive(Debug, Error, Clone)]
pub enum StateError {
    #[error("account not found: {0:?}")]
    NotFound(Address),

    #[error("invalid state root")]
    InvalidStateRoot,

    #[error("underlying store error: {0}")]
    Store(String),
}

/// Errors from precompiled contract execution.
#[derive(Debug, Error, Clone)]
pub enum PrecompileError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("precompile out of gas")]
    OutOfGas,
}
