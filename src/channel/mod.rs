//! # Channel Module - Transition Candidates and Channel Semantics
//!
//! A [`Candidate`] captures one potentially-firable action discovered while
//! walking a process tree: the action node, the environment in effect at
//! discovery, the owning process, the residual siblings that come alive if
//! it fires, its rate, and the evaluated payload or receive pattern.
//!
//! Candidates for plain actions live in the engine's non-message map.
//! Message candidates are handed to a channel and owned by it from then on:
//! [`beacon::BeaconChannel`] for asynchronous persistent-tuple channels,
//! [`handshake::HandshakeChannel`] for synchronous rendezvous. A candidate
//! belongs to exactly one collection at a time.

use std::sync::Arc;

use crate::eval::{LocalVariables, ParameterValues};
use crate::syntax::Block;
use crate::system::{ProcessId, ProcessInstance};

pub mod beacon;
pub mod handshake;
pub mod tests;

/// Stable identity of a candidate, used to track handshake pairings across
/// recomputations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateId(pub u64);

/// Evaluated payload or pattern of a message candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternEval {
    /// Plain actions carry no payload.
    None,
    /// The tuple a send emits. Handshake sends carry exactly one component.
    Value(Vec<i64>),
    /// A receive pattern: per dimension, a disjunction of inclusive bounds.
    Bounds(Vec<Vec<(i64, i64)>>),
}

impl PatternEval {
    /// Bounds matching: every dimension must have a pair enclosing the
    /// corresponding tuple component.
    pub fn contains(&self, tuple: &[i64]) -> bool {
        match self {
            PatternEval::Bounds(bounds) => {
                bounds.len() == tuple.len()
                    && bounds.iter().zip(tuple).all(|(pairs, component)| {
                        pairs.iter().any(|(lo, hi)| lo <= component && component <= hi)
                    })
            }
            _ => false,
        }
    }
}

/// One potentially-firable transition.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: CandidateId,
    /// The action node this candidate would fire.
    pub action: Arc<Block>,
    /// Channel name after parameter substitution; `None` for plain actions.
    pub channel: Option<String>,
    /// Parameter environment at discovery.
    pub params: ParameterValues,
    /// Local variables at discovery.
    pub locals: LocalVariables,
    /// The process instance this candidate belongs to.
    pub owner: ProcessId,
    /// Residual siblings that become live processes if this fires.
    pub residuals: Vec<ProcessInstance>,
    pub rate: f64,
    pub pattern: PatternEval,
    /// Database tuples currently matching `pattern`. Materialized only for
    /// active binding receives, where it holds the singleton to bind at
    /// fire time; refreshed on every reclassification.
    pub matched: Vec<Vec<i64>>,
}

impl Candidate {
    /// True when firing this candidate should bind a local variable.
    pub fn binds_variable(&self) -> Option<&str> {
        match &self.action.kind {
            crate::syntax::BlockKind::Receive {
                binding: Some(name),
                ..
            } => Some(name.as_str()),
            _ => None,
        }
    }

    /// True when the action is a pure existence check, which never binds.
    pub fn is_check(&self) -> bool {
        matches!(
            &self.action.kind,
            crate::syntax::BlockKind::Receive { check: true, .. }
        )
    }
}

/// One interval of the shared inverse-CDF sweep. Advances the running
/// cumulative by `rate` unless `draw` falls inside this candidate's
/// normalized interval.
pub(crate) fn interval_hit(running: &mut f64, rate: f64, draw: f64, total: f64) -> bool {
    let lower = *running / total;
    let upper = (*running + rate) / total;
    if draw > lower && draw <= upper {
        true
    } else {
        *running += rate;
        false
    }
}
