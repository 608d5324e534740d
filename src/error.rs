//! Error types shared across the simulator.
//!
//! Every program-level failure carries the source position of the offending
//! construct so a frontend can point back into the model text. There is no
//! in-run recovery: an error terminates the replicate that raised it, and
//! the replicate driver reports it while the remaining replicates continue.

use thiserror::Error;

pub type SimResult<T> = Result<T, SimulationError>;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    /// A rate expression evaluated to a non-positive value while its action
    /// was being admitted as a candidate.
    #[error("bad rate at line {line}, column {column}: rates must be positive, got {value}")]
    BadRate { line: u32, column: u32, value: f64 },

    /// The inverse-CDF sweep failed to select a candidate even though the
    /// candidate count is positive. Indicates rate bookkeeping drift.
    #[error(
        "selection sweep failed: draw {draw} not covered with {candidates_left} candidates and rate sum {rate_sum}"
    )]
    SelectionFailure {
        draw: f64,
        rate_sum: f64,
        candidates_left: usize,
    },

    /// Process-reference unfolding blew its depth bound, which means the
    /// model recurses without an action or a false gate in between.
    #[error("unfolding of process '{name}' exceeded {depth} levels")]
    UnfoldDepth { name: String, depth: usize },

    #[error("failed to build the replicate worker pool: {0}")]
    ThreadPool(String),

    #[error("trace writer thread panicked")]
    WriterThread,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse program: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to parse run configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Failures raised by the expression evaluator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("undefined variable '{name}' at line {line}, column {column}")]
    UndefinedVariable { name: String, line: u32, column: u32 },

    #[error("type mismatch at line {line}, column {column}: {message}")]
    TypeMismatch {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("division by zero at line {line}, column {column}")]
    DivisionByZero { line: u32, column: u32 },

    #[error("malformed expression at line {line}, column {column}: {message}")]
    Malformed {
        message: String,
        line: u32,
        column: u32,
    },
}

/// Structural problems in a parsed program, reported before simulation.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("process '{0}' is not defined")]
    UnknownProcess(String),

    #[error(
        "process '{name}' expects {expected} parameters but {given} were supplied at line {line}, column {column}"
    )]
    ArityMismatch {
        name: String,
        expected: usize,
        given: usize,
        line: u32,
        column: u32,
    },

    #[error("gate at line {line}, column {column} must guard exactly one continuation")]
    MalformedGate { line: u32, column: u32 },

    #[error("parallel composition at line {line}, column {column} must have exactly two branches")]
    MalformedParallel { line: u32, column: u32 },

    #[error("choice at line {line}, column {column} must have exactly two branches")]
    MalformedChoice { line: u32, column: u32 },

    #[error("prefix at line {line}, column {column} must have at most one continuation")]
    MalformedPrefix { line: u32, column: u32 },

    #[error("handshake at line {line}, column {column} must carry exactly one value")]
    HandshakeArity { line: u32, column: u32 },

    #[error("check at line {line}, column {column} cannot bind a variable")]
    CheckBindsVariable { line: u32, column: u32 },
}
