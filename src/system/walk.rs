//! Candidate discovery: the recursive walk from a process root down to its
//! action-producing leaves.

use std::sync::Arc;

use crate::channel::beacon::BeaconChannel;
use crate::channel::handshake::HandshakeChannel;
use crate::channel::{Candidate, PatternEval};
use crate::error::{SimResult, SimulationError};
use crate::eval::{self, LocalVariables, ParameterValues};
use crate::syntax::{Block, BlockKind};
use crate::system::{ProcessId, ProcessInstance, System};

/// Bound on process-reference unfolding. A model that recurses this deep
/// without an action or a false gate in between is unguarded.
const MAX_UNFOLD_DEPTH: usize = 512;

impl System {
    /// Walks a subtree, collecting every enabled transition candidate for
    /// `owner` under the current parameters and residual list.
    ///
    /// Residuals accumulate on the way down: entering one branch of a
    /// parallel records the other branch as the snapshot that survives if a
    /// candidate from this branch fires.
    pub(crate) fn gather(
        &mut self,
        owner: ProcessId,
        node: &Arc<Block>,
        residuals: &[ProcessInstance],
        params: &ParameterValues,
        locals: &LocalVariables,
        depth: usize,
    ) -> SimResult<()> {
        match &node.kind {
            BlockKind::Action { rate, .. } => {
                let rate = eval::eval_double(rate, params, &self.globals, locals)?;
                if rate <= 0.0 {
                    return Err(SimulationError::BadRate {
                        line: node.token.line,
                        column: node.token.column,
                        value: rate,
                    });
                }
                let cand = Candidate {
                    id: self.next_candidate_id(),
                    action: node.clone(),
                    channel: None,
                    params: params.clone(),
                    locals: locals.clone(),
                    owner,
                    residuals: residuals.to_vec(),
                    rate,
                    pattern: PatternEval::None,
                    matched: Vec::new(),
                };
                self.non_msg.entry(owner).or_default().push(cand);
                self.candidates_left += 1;
                self.rate_sum += rate;
            }
            BlockKind::Send {
                channel,
                handshake,
                payload,
                rate,
                ..
            } => {
                let channel_name = substitute_channel_name(channel, params);
                if *handshake {
                    let rate = eval::eval_double(rate, params, &self.globals, locals)?;
                    if rate <= 0.0 {
                        return Err(SimulationError::BadRate {
                            line: node.token.line,
                            column: node.token.column,
                            value: rate,
                        });
                    }
                    let value = eval::eval_int(&payload[0], params, &self.globals, locals)?;
                    let cand = Candidate {
                        id: self.next_candidate_id(),
                        action: node.clone(),
                        channel: Some(channel_name.clone()),
                        params: params.clone(),
                        locals: locals.clone(),
                        owner,
                        residuals: residuals.to_vec(),
                        rate,
                        pattern: PatternEval::Value(vec![value]),
                        matched: Vec::new(),
                    };
                    self.handshakes
                        .entry(channel_name.clone())
                        .or_insert_with(|| HandshakeChannel::new(channel_name))
                        .add_send_candidate(cand);
                } else {
                    let id = self.next_candidate_id();
                    let chan = self
                        .beacons
                        .entry(channel_name.clone())
                        .or_insert_with(|| BeaconChannel::new(channel_name, self.globals.clone()));
                    chan.add_candidate(
                        node,
                        owner,
                        id,
                        residuals.to_vec(),
                        params,
                        locals,
                        &mut self.candidates_left,
                        &mut self.rate_sum,
                    )?;
                }
            }
            BlockKind::Receive {
                channel,
                handshake,
                pattern,
                ..
            } => {
                let channel_name = substitute_channel_name(channel, params);
                if *handshake {
                    let bounds = eval::eval_set(&pattern[0], params, &self.globals, locals)?;
                    let cand = Candidate {
                        id: self.next_candidate_id(),
                        action: node.clone(),
                        channel: Some(channel_name.clone()),
                        params: params.clone(),
                        locals: locals.clone(),
                        owner,
                        residuals: residuals.to_vec(),
                        // The receive side of a rendezvous carries no rate.
                        rate: 0.0,
                        pattern: PatternEval::Bounds(vec![bounds]),
                        matched: Vec::new(),
                    };
                    self.handshakes
                        .entry(channel_name.clone())
                        .or_insert_with(|| HandshakeChannel::new(channel_name))
                        .add_receive_candidate(cand);
                } else {
                    let id = self.next_candidate_id();
                    let chan = self
                        .beacons
                        .entry(channel_name.clone())
                        .or_insert_with(|| BeaconChannel::new(channel_name, self.globals.clone()));
                    chan.add_candidate(
                        node,
                        owner,
                        id,
                        residuals.to_vec(),
                        params,
                        locals,
                        &mut self.candidates_left,
                        &mut self.rate_sum,
                    )?;
                }
            }
            BlockKind::Gate { condition } => {
                if eval::eval_condition(condition, params, &self.globals, locals)? {
                    self.gather(owner, &node.children[0], residuals, params, locals, depth)?;
                }
            }
            BlockKind::Call { name, args } => {
                if depth >= MAX_UNFOLD_DEPTH {
                    return Err(SimulationError::UnfoldDepth {
                        name: name.clone(),
                        depth,
                    });
                }
                let def = self
                    .defs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| crate::error::ProgramError::UnknownProcess(name.clone()))?;
                // Bind actuals to formals, choosing each carrier type from
                // the expression itself. Formals not named keep their
                // caller-side values.
                let mut callee_params = params.clone();
                for (formal, actual) in def.formals.iter().zip(args) {
                    if eval::cast_to_double(actual, params, &self.globals) {
                        let value = eval::eval_double(actual, params, &self.globals, locals)?;
                        callee_params.set_real(formal, value);
                    } else {
                        let value = eval::eval_int(actual, params, &self.globals, locals)?;
                        callee_params.set_int(formal, value);
                    }
                }
                self.gather(owner, &def.tree, residuals, &callee_params, locals, depth + 1)?;
            }
            BlockKind::Parallel => {
                let left = &node.children[0];
                let right = &node.children[1];

                let mut for_left = residuals.to_vec();
                for_left.push(ProcessInstance {
                    root: right.clone(),
                    params: params.clone(),
                    locals: locals.clone(),
                });
                self.gather(owner, left, &for_left, params, locals, depth)?;

                let mut for_right = residuals.to_vec();
                for_right.push(ProcessInstance {
                    root: left.clone(),
                    params: params.clone(),
                    locals: locals.clone(),
                });
                self.gather(owner, right, &for_right, params, locals, depth)?;
            }
            BlockKind::Choice => {
                for child in &node.children {
                    self.gather(owner, child, residuals, params, locals, depth)?;
                }
            }
        }
        Ok(())
    }
}

/// A channel name equal to a parameter bound to an integer is reinterpreted
/// as that integer's decimal form. Computed once at discovery.
fn substitute_channel_name(channel: &str, params: &ParameterValues) -> String {
    match params.int_values.get(channel) {
        Some(value) => value.to_string(),
        None => channel.to_string(),
    }
}
