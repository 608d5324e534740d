//! # Syntax Module - Parse-Tree Data Model
//!
//! This module defines the parse-node model consumed by the simulation
//! engine. Programs arrive from an external parser frontend as a JSON
//! document mapping process names to parse trees, together with an initial
//! system of processes and a global environment.
//!
//! ## Key Concepts
//!
//! ### Shared immutable trees
//! A [`ProcessDefinition`] owns its parse tree; running process instances
//! hold `Arc` references to subtrees of it. Spawning a continuation or a
//! residual never copies nodes, it only bumps reference counts.
//!
//! ### Opaque expressions
//! Expressions are postfix token streams ([`Expr`]). The engine never
//! interprets them directly; it hands them to the evaluator in
//! [`crate::eval`] together with the current environment.
//!
//! ### Finalization
//! [`Program::finalize`] rebuilds every definition tree once at load time,
//! stamping each node with the name of the definition it belongs to. The
//! trace writer uses that stamp to recover the owning definition and its
//! formal parameter list from any fired action node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ProgramError;
use crate::eval::{GlobalVariables, ParameterValues};

pub mod tests;

/// One token of an expression stream, with its source position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl Token {
    pub fn new(text: impl Into<String>, line: u32, column: u32) -> Self {
        Token {
            text: text.into(),
            line,
            column,
        }
    }
}

/// A postfix (RPN) token stream, opaque to everything but the evaluator.
pub type Expr = Vec<Token>;

/// The kind of a parse node.
///
/// Prefix kinds (`Action`, `Send`, `Receive`) carry at most one child, the
/// continuation; a prefix without a child terminates its process. `Gate`
/// guards exactly one child, `Parallel` and `Choice` have exactly two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockKind {
    /// A named action with a rate expression.
    Action { name: String, rate: Expr },
    /// A message send. `handshake` selects rendezvous semantics; otherwise
    /// the send is a beacon launch, or a beacon kill when `kill` is set.
    Send {
        channel: String,
        handshake: bool,
        #[serde(default)]
        kill: bool,
        payload: Vec<Expr>,
        rate: Expr,
    },
    /// A message receive. `check` queries beacon existence without binding;
    /// `binding` names the local variable receiving the matched value.
    Receive {
        channel: String,
        handshake: bool,
        #[serde(default)]
        check: bool,
        #[serde(default)]
        binding: Option<String>,
        pattern: Vec<Expr>,
        rate: Expr,
    },
    /// A guarded continuation.
    Gate { condition: Expr },
    /// A reference to another process definition with actual parameters.
    Call { name: String, args: Vec<Expr> },
    /// Parallel composition of the two children.
    Parallel,
    /// Stochastic choice between the two children.
    Choice,
}

/// One parse node. Children are shared immutable views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    #[serde(default)]
    pub token: Token,
    /// Name of the process definition this node belongs to, stamped by
    /// [`Program::finalize`].
    #[serde(default)]
    pub defined_in: String,
    #[serde(default)]
    pub children: Vec<Arc<Block>>,
}

impl Block {
    pub fn new(kind: BlockKind, token: Token, children: Vec<Arc<Block>>) -> Self {
        Block {
            kind,
            token,
            defined_in: String::new(),
            children,
        }
    }

    /// A prefix with no continuation terminates its process when fired.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A named process definition: formal parameters and a parse tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    #[serde(default)]
    pub formals: Vec<String>,
    pub tree: Arc<Block>,
}

/// One entry of the initial system, with its bound parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialProcess {
    pub name: String,
    #[serde(default)]
    pub params: ParameterValues,
}

/// A complete parsed program: definitions, the initial system, and the
/// read-only global environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub definitions: BTreeMap<String, ProcessDefinition>,
    pub initial: Vec<InitialProcess>,
    #[serde(default)]
    pub globals: GlobalVariables,
}

impl Program {
    /// Stamps every node of every definition tree with the name of the
    /// definition it belongs to. Call once after deserialization.
    pub fn finalize(&mut self) {
        for (name, def) in self.definitions.iter_mut() {
            def.tree = stamp(&def.tree, name);
        }
    }

    /// Checks structural well-formedness: references resolve, actual
    /// parameter counts match formals, gates are unary, parallels and
    /// choices are binary, prefixes carry at most one continuation,
    /// handshakes carry exactly one value, and a check never binds a
    /// variable.
    pub fn validate(&self) -> Result<(), ProgramError> {
        for def in self.definitions.values() {
            self.validate_node(&def.tree)?;
        }
        for init in &self.initial {
            if !self.definitions.contains_key(&init.name) {
                return Err(ProgramError::UnknownProcess(init.name.clone()));
            }
        }
        Ok(())
    }

    fn validate_node(&self, node: &Block) -> Result<(), ProgramError> {
        let line = node.token.line;
        let column = node.token.column;
        match &node.kind {
            BlockKind::Action { .. } => {
                if node.children.len() > 1 {
                    return Err(ProgramError::MalformedPrefix { line, column });
                }
            }
            BlockKind::Send {
                handshake, payload, ..
            } => {
                if node.children.len() > 1 {
                    return Err(ProgramError::MalformedPrefix { line, column });
                }
                if *handshake && payload.len() != 1 {
                    return Err(ProgramError::HandshakeArity { line, column });
                }
            }
            BlockKind::Receive {
                handshake,
                check,
                binding,
                pattern,
                ..
            } => {
                if node.children.len() > 1 {
                    return Err(ProgramError::MalformedPrefix { line, column });
                }
                if *handshake && pattern.len() != 1 {
                    return Err(ProgramError::HandshakeArity { line, column });
                }
                if *check && binding.is_some() {
                    return Err(ProgramError::CheckBindsVariable { line, column });
                }
            }
            BlockKind::Gate { .. } => {
                if node.children.len() != 1 {
                    return Err(ProgramError::MalformedGate { line, column });
                }
            }
            BlockKind::Call { name, args } => {
                let def = self
                    .definitions
                    .get(name)
                    .ok_or_else(|| ProgramError::UnknownProcess(name.clone()))?;
                if def.formals.len() != args.len() {
                    return Err(ProgramError::ArityMismatch {
                        name: name.clone(),
                        expected: def.formals.len(),
                        given: args.len(),
                        line,
                        column,
                    });
                }
            }
            BlockKind::Parallel => {
                if node.children.len() != 2 {
                    return Err(ProgramError::MalformedParallel { line, column });
                }
            }
            BlockKind::Choice => {
                if node.children.len() != 2 {
                    return Err(ProgramError::MalformedChoice { line, column });
                }
            }
        }
        for child in &node.children {
            self.validate_node(child)?;
        }
        Ok(())
    }
}

fn stamp(node: &Arc<Block>, def_name: &str) -> Arc<Block> {
    Arc::new(Block {
        kind: node.kind.clone(),
        token: node.token.clone(),
        defined_in: def_name.to_string(),
        children: node.children.iter().map(|c| stamp(c, def_name)).collect(),
    })
}
