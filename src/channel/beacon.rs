//! Beacon channels: asynchronous, persistent, shared-memory-like.
//!
//! A beacon channel keeps a database of emitted integer tuples, keyed by
//! arity with duplicates collapsed. Launches insert tuples, kills remove
//! them, and receives match patterns against the stored tuples without
//! consuming them. Receive candidates are classified as *active* (their
//! pattern currently matches and they contribute rate) or *potential*
//! (no match, zero contribution); every transition reclassifies.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::channel::{Candidate, CandidateId, PatternEval, interval_hit};
use crate::error::{SimResult, SimulationError};
use crate::eval::{self, GlobalVariables, LocalVariables, ParameterValues};
use crate::syntax::{Block, BlockKind};
use crate::system::{ProcessId, ProcessInstance};

/// The store of currently-held tuples, arity by arity.
#[derive(Debug, Clone, Default)]
pub struct BeaconDatabase {
    arity_to_entries: BTreeMap<usize, BTreeSet<Vec<i64>>>,
}

impl BeaconDatabase {
    pub fn push(&mut self, tuple: Vec<i64>) {
        self.arity_to_entries
            .entry(tuple.len())
            .or_default()
            .insert(tuple);
    }

    /// Removing an absent tuple is a no-op.
    pub fn pop(&mut self, tuple: &[i64]) {
        if let Some(entries) = self.arity_to_entries.get_mut(&tuple.len()) {
            entries.remove(tuple);
        }
    }

    pub fn contains(&self, tuple: &[i64]) -> bool {
        self.arity_to_entries
            .get(&tuple.len())
            .is_some_and(|entries| entries.contains(tuple))
    }

    /// Every stored tuple satisfying the per-dimension bounds.
    pub fn matches(&self, bounds: &[Vec<(i64, i64)>]) -> Vec<Vec<i64>> {
        let Some(entries) = self.arity_to_entries.get(&bounds.len()) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|tuple| between_bounds(bounds, tuple))
            .cloned()
            .collect()
    }

    /// True when at least one stored tuple satisfies the bounds, without
    /// materializing the matches.
    pub fn any_match(&self, bounds: &[Vec<(i64, i64)>]) -> bool {
        self.arity_to_entries
            .get(&bounds.len())
            .is_some_and(|entries| entries.iter().any(|tuple| between_bounds(bounds, tuple)))
    }

    pub fn len(&self) -> usize {
        self.arity_to_entries.values().map(|e| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn between_bounds(bounds: &[Vec<(i64, i64)>], tuple: &[i64]) -> bool {
    bounds.iter().zip(tuple).all(|(pairs, component)| {
        pairs.iter().any(|(lo, hi)| lo <= component && component <= hi)
    })
}

/// One named beacon channel with its database and candidate lists.
#[derive(Debug)]
pub struct BeaconChannel {
    name: String,
    globals: GlobalVariables,
    database: BeaconDatabase,
    potential: BTreeMap<ProcessId, Vec<Candidate>>,
    active: BTreeMap<ProcessId, Vec<Candidate>>,
    sends: BTreeMap<ProcessId, Vec<Candidate>>,
}

impl BeaconChannel {
    pub fn new(name: String, globals: GlobalVariables) -> Self {
        BeaconChannel {
            name,
            globals,
            database: BeaconDatabase::default(),
            potential: BTreeMap::new(),
            active: BTreeMap::new(),
            sends: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &BeaconDatabase {
        &self.database
    }

    /// Evaluates and admits a message action on this channel.
    ///
    /// Launches and kills are always active once admitted; a kill whose
    /// tuple is not currently stored is not admitted at all. Receives and
    /// checks are active iff the database matches right now, where a
    /// binding receive additionally requires the match to be a singleton.
    #[allow(clippy::too_many_arguments)]
    pub fn add_candidate(
        &mut self,
        block: &Arc<Block>,
        owner: ProcessId,
        id: CandidateId,
        residuals: Vec<ProcessInstance>,
        params: &ParameterValues,
        locals: &LocalVariables,
        candidates_left: &mut usize,
        rate_sum: &mut f64,
    ) -> SimResult<()> {
        match &block.kind {
            BlockKind::Send {
                kill,
                payload,
                rate,
                ..
            } => {
                let rate = eval::eval_double(rate, params, &self.globals, locals)?;
                if rate <= 0.0 {
                    return Err(SimulationError::BadRate {
                        line: block.token.line,
                        column: block.token.column,
                        value: rate,
                    });
                }
                let tuple = payload
                    .iter()
                    .map(|e| eval::eval_int(e, params, &self.globals, locals))
                    .collect::<Result<Vec<_>, _>>()?;
                if *kill && !self.database.contains(&tuple) {
                    // Nothing to remove: the kill is not firable.
                    return Ok(());
                }
                let cand = Candidate {
                    id,
                    action: block.clone(),
                    channel: Some(self.name.clone()),
                    params: params.clone(),
                    locals: locals.clone(),
                    owner,
                    residuals,
                    rate,
                    pattern: PatternEval::Value(tuple),
                    matched: Vec::new(),
                };
                self.sends.entry(owner).or_default().push(cand);
                *candidates_left += 1;
                *rate_sum += rate;
            }
            BlockKind::Receive { pattern, rate, .. } => {
                let rate = eval::eval_double(rate, params, &self.globals, locals)?;
                if rate <= 0.0 {
                    return Err(SimulationError::BadRate {
                        line: block.token.line,
                        column: block.token.column,
                        value: rate,
                    });
                }
                let bounds = pattern
                    .iter()
                    .map(|e| eval::eval_set(e, params, &self.globals, locals))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut cand = Candidate {
                    id,
                    action: block.clone(),
                    channel: Some(self.name.clone()),
                    params: params.clone(),
                    locals: locals.clone(),
                    owner,
                    residuals,
                    rate,
                    pattern: PatternEval::Bounds(bounds),
                    matched: Vec::new(),
                };
                let (firable, matched) = classify(&cand, &self.database);
                if firable {
                    cand.matched = matched;
                    *candidates_left += 1;
                    *rate_sum += cand.rate;
                    self.active.entry(owner).or_default().push(cand);
                } else {
                    self.potential.entry(owner).or_default().push(cand);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Reclassifies every receive against the current database: promotes
    /// matchable potentials, demotes unmatchable actives, and refreshes the
    /// match sets of the actives that stay.
    pub fn update_candidates(&mut self, candidates_left: &mut usize, rate_sum: &mut f64) {
        let potential = std::mem::take(&mut self.potential);
        for (owner, list) in potential {
            for mut cand in list {
                let (firable, matched) = classify(&cand, &self.database);
                if firable {
                    cand.matched = matched;
                    *candidates_left += 1;
                    *rate_sum += cand.rate;
                    self.active.entry(owner).or_default().push(cand);
                } else {
                    self.potential.entry(owner).or_default().push(cand);
                }
            }
        }

        let active = std::mem::take(&mut self.active);
        for (owner, list) in active {
            for mut cand in list {
                let (firable, matched) = classify(&cand, &self.database);
                if firable {
                    cand.matched = matched;
                    self.active.entry(owner).or_default().push(cand);
                } else {
                    cand.matched = Vec::new();
                    *candidates_left -= 1;
                    *rate_sum -= cand.rate;
                    self.potential.entry(owner).or_default().push(cand);
                }
            }
        }
    }

    /// Inverse-CDF sweep over sends, then active receives.
    pub fn pick_candidate(&self, running: &mut f64, draw: f64, total: f64) -> Option<Candidate> {
        for list in self.sends.values() {
            for cand in list {
                if interval_hit(running, cand.rate, draw, total) {
                    return Some(cand.clone());
                }
            }
        }
        for list in self.active.values() {
            for cand in list {
                if interval_hit(running, cand.rate, draw, total) {
                    return Some(cand.clone());
                }
            }
        }
        None
    }

    /// Drops every candidate owned by a process, folding the decrements.
    pub fn clean_process(
        &mut self,
        owner: ProcessId,
        candidates_left: &mut usize,
        rate_sum: &mut f64,
    ) {
        if let Some(list) = self.sends.remove(&owner) {
            for cand in list {
                *candidates_left -= 1;
                *rate_sum -= cand.rate;
            }
        }
        if let Some(list) = self.active.remove(&owner) {
            for cand in list {
                *candidates_left -= 1;
                *rate_sum -= cand.rate;
            }
        }
        self.potential.remove(&owner);
    }

    /// Firing effect of a send: a launch inserts its tuple, a kill removes
    /// it. Receives and checks leave the database untouched.
    pub fn apply_send(&mut self, cand: &Candidate) {
        if let (BlockKind::Send { kill, .. }, PatternEval::Value(tuple)) =
            (&cand.action.kind, &cand.pattern)
        {
            if *kill {
                self.database.pop(tuple);
            } else {
                self.database.push(tuple.clone());
            }
        }
    }

    /// From-scratch (count, rate) contribution of this channel.
    pub fn totals(&self) -> (usize, f64) {
        let mut count = 0;
        let mut rate = 0.0;
        for list in self.sends.values().chain(self.active.values()) {
            for cand in list {
                count += 1;
                rate += cand.rate;
            }
        }
        (count, rate)
    }

    pub fn active_count(&self) -> usize {
        self.active.values().map(|l| l.len()).sum()
    }

    pub fn potential_count(&self) -> usize {
        self.potential.values().map(|l| l.len()).sum()
    }
}

/// Firability of a receive against the current database. A check needs at
/// least one matching tuple and never binds; a binding receive is firable
/// only while exactly one tuple matches, and carries that match for binding
/// at fire time; a plain receive needs at least one match.
fn classify(cand: &Candidate, database: &BeaconDatabase) -> (bool, Vec<Vec<i64>>) {
    let PatternEval::Bounds(bounds) = &cand.pattern else {
        return (false, Vec::new());
    };
    if cand.is_check() {
        (database.any_match(bounds), Vec::new())
    } else if cand.binds_variable().is_some() {
        let matched = database.matches(bounds);
        (matched.len() == 1, matched)
    } else {
        (database.any_match(bounds), Vec::new())
    }
}
