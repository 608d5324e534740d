//! # System Module - Gillespie Engine and Replicate Driver
//!
//! A [`System`] owns one simulation run: the live process instances, the
//! non-message candidate map, the beacon and handshake channels, the
//! running rate sum and candidate count, the clock, and the trace buffer.
//!
//! ## Step anatomy
//!
//! Each transition draws an exponential waiting time at the current total
//! rate, then selects the transition by a single inverse-CDF sweep whose
//! running cumulative is shared across the non-message candidates, the
//! beacon channels, and the handshake channels, in that fixed order. Firing
//! materializes residual siblings, builds the continuation instance, binds
//! received values, serializes the transition, retires the owning
//! instance(s), and rediscovers candidates for everything that was added.
//!
//! ## Replicates
//!
//! [`simulate_system`] runs independent replicates on a bounded worker
//! pool. Each replicate owns its `System`, its RNG, and its channels;
//! finished traces stream over an mpsc channel to a dedicated writer
//! thread, which separates replicates with a `>=======` marker line.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use crate::channel::beacon::BeaconChannel;
use crate::channel::handshake::{HandshakeChannel, HandshakePairing};
use crate::channel::{Candidate, CandidateId, interval_hit};
use crate::error::{SimResult, SimulationError};
use crate::eval::{GlobalVariables, LocalVariables, ParameterValues};
use crate::syntax::{Block, BlockKind, ProcessDefinition, Program};

pub mod walk;

/// Stable identity of a live process instance, distinct from structural
/// equality of its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

/// One running process: a continuation cursor into a shared definition
/// tree, the parameter values in effect, and the local variables.
///
/// The same shape doubles as the lightweight residual snapshot carried by
/// candidates; a snapshot only becomes a registered instance if its
/// candidate wins.
#[derive(Debug, Clone)]
pub struct ProcessInstance {
    pub root: Arc<Block>,
    pub params: ParameterValues,
    pub locals: LocalVariables,
}

/// The transition selected by one sweep.
enum Winner {
    Single(Candidate),
    Pair(HandshakePairing),
}

/// Per-run bounds and seeding for the replicate driver.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub replicates: usize,
    pub threads: usize,
    pub max_transitions: u64,
    pub max_duration: f64,
    /// Base seed; replicate `i` seeds from `seed + i`. Without one, each
    /// replicate seeds from the operating system.
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            replicates: 1,
            threads: 4,
            max_transitions: u64::MAX,
            max_duration: f64::INFINITY,
            seed: None,
        }
    }
}

/// One simulation run over a parsed program.
pub struct System {
    defs: BTreeMap<String, ProcessDefinition>,
    globals: GlobalVariables,
    processes: BTreeMap<ProcessId, ProcessInstance>,
    non_msg: BTreeMap<ProcessId, Vec<Candidate>>,
    beacons: BTreeMap<String, BeaconChannel>,
    handshakes: BTreeMap<String, HandshakeChannel>,
    rate_sum: f64,
    candidates_left: usize,
    total_time: f64,
    transitions_taken: u64,
    max_transitions: u64,
    max_duration: f64,
    next_process: u64,
    next_candidate: u64,
    rng: StdRng,
    trace: String,
}

impl System {
    /// Builds a run from a program: registers the initial instances
    /// (splitting parallel roots so no live instance is rooted at a
    /// parallel), discovers their candidates, and folds the initial
    /// handshake pairings.
    pub fn new(
        program: &Program,
        max_transitions: u64,
        max_duration: f64,
        rng: StdRng,
    ) -> SimResult<Self> {
        program.validate()?;
        let mut system = System {
            defs: program.definitions.clone(),
            globals: program.globals.clone(),
            processes: BTreeMap::new(),
            non_msg: BTreeMap::new(),
            beacons: BTreeMap::new(),
            handshakes: BTreeMap::new(),
            rate_sum: 0.0,
            candidates_left: 0,
            total_time: 0.0,
            transitions_taken: 0,
            max_transitions,
            max_duration,
            next_process: 0,
            next_candidate: 0,
            rng,
            trace: String::new(),
        };

        let mut to_add = Vec::new();
        for init in &program.initial {
            let def = system
                .defs
                .get(&init.name)
                .ok_or_else(|| crate::error::ProgramError::UnknownProcess(init.name.clone()))?;
            to_add.push(ProcessInstance {
                root: def.tree.clone(),
                params: init.params.clone(),
                locals: LocalVariables::new(),
            });
        }
        system.admit_all(to_add)?;
        Ok(system)
    }

    pub fn rate_sum(&self) -> f64 {
        self.rate_sum
    }

    pub fn candidates_left(&self) -> usize {
        self.candidates_left
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn transitions_taken(&self) -> u64 {
        self.transitions_taken
    }

    /// The trace emitted so far.
    pub fn trace(&self) -> &str {
        &self.trace
    }

    pub fn into_trace(self) -> String {
        self.trace
    }

    /// Roots of the live process instances, for invariant inspection.
    pub fn process_roots(&self) -> impl Iterator<Item = &Arc<Block>> {
        self.processes.values().map(|p| &p.root)
    }

    pub fn live_processes(&self) -> usize {
        self.processes.len()
    }

    /// From-scratch audit of the candidate count and rate sum across every
    /// collection. The tracked counters must agree with this at all times.
    pub fn recount(&self) -> (usize, f64) {
        let mut count = 0;
        let mut rate = 0.0;
        for list in self.non_msg.values() {
            for cand in list {
                count += 1;
                rate += cand.rate;
            }
        }
        for chan in self.beacons.values() {
            let (c, r) = chan.totals();
            count += c;
            rate += r;
        }
        for chan in self.handshakes.values() {
            let (c, r) = chan.totals();
            count += c;
            rate += r;
        }
        (count, rate)
    }

    /// Runs the Gillespie loop until the candidate pool drains, the
    /// transition bound is hit, or simulated time passes its bound.
    pub fn simulate(&mut self) -> SimResult<()> {
        while self.candidates_left > 0
            && self.transitions_taken < self.max_transitions
            && self.total_time <= self.max_duration
        {
            if !self.step()? {
                break;
            }
        }
        Ok(())
    }

    /// Performs one transition. Returns false when the system is exhausted
    /// (a clean deadlock), an error when selection fails despite a positive
    /// candidate count.
    pub fn step(&mut self) -> SimResult<bool> {
        if self.candidates_left == 0 {
            return Ok(false);
        }
        let Ok(waiting_time) = Exp::new(self.rate_sum) else {
            // Rate exhausted by floating-point drift; treat as deadlock.
            return Ok(false);
        };
        self.total_time += waiting_time.sample(&mut self.rng);
        let draw: f64 = self.rng.random();

        let mut running = 0.0;
        let winner = 'sweep: {
            for list in self.non_msg.values() {
                for cand in list {
                    if interval_hit(&mut running, cand.rate, draw, self.rate_sum) {
                        break 'sweep Winner::Single(cand.clone());
                    }
                }
            }
            for chan in self.beacons.values() {
                if let Some(cand) = chan.pick_candidate(&mut running, draw, self.rate_sum) {
                    break 'sweep Winner::Single(cand);
                }
            }
            for chan in self.handshakes.values() {
                if let Some(pairing) = chan.pick_pairing(&mut running, draw, self.rate_sum) {
                    break 'sweep Winner::Pair(pairing);
                }
            }
            return Err(SimulationError::SelectionFailure {
                draw,
                rate_sum: self.rate_sum,
                candidates_left: self.candidates_left,
            });
        };

        self.fire(winner)?;
        self.transitions_taken += 1;
        Ok(true)
    }

    fn fire(&mut self, winner: Winner) -> SimResult<()> {
        match winner {
            Winner::Single(cand) => {
                let mut to_add = cand.residuals.clone();
                if let Some(mut cont) = continuation_of(&cand) {
                    if let Some(var) = cand.binds_variable() {
                        // Classification guarantees the singleton.
                        if let [tuple] = cand.matched.as_slice() {
                            cont.locals.insert(var.to_string(), tuple[0]);
                        }
                    }
                    to_add.push(cont);
                }
                self.write_transition(self.total_time, &cand);
                if let BlockKind::Send {
                    handshake: false, ..
                } = &cand.action.kind
                    && let Some(name) = &cand.channel
                    && let Some(chan) = self.beacons.get_mut(name)
                {
                    chan.apply_send(&cand);
                }
                self.remove_owner(cand.owner);
                self.admit_all(to_add)?;
            }
            Winner::Pair(pairing) => {
                let mut to_add = pairing.send.residuals.clone();
                if let Some(cont) = continuation_of(&pairing.send) {
                    to_add.push(cont);
                }
                to_add.extend(pairing.recv.residuals.clone());
                if let Some(mut cont) = continuation_of(&pairing.recv) {
                    if let Some(var) = pairing.recv.binds_variable() {
                        cont.locals.insert(var.to_string(), pairing.value);
                    }
                    to_add.push(cont);
                }
                self.write_transition(self.total_time, &pairing.send);
                self.write_transition(self.total_time, &pairing.recv);
                self.remove_owner(pairing.send.owner);
                self.remove_owner(pairing.recv.owner);
                self.admit_all(to_add)?;
            }
        }
        Ok(())
    }

    /// Retires an instance: clears its non-message candidates, cleans it
    /// out of every channel, then reclassifies every beacon channel against
    /// the possibly-changed database.
    fn remove_owner(&mut self, owner: ProcessId) {
        if let Some(list) = self.non_msg.remove(&owner) {
            for cand in list {
                self.candidates_left -= 1;
                self.rate_sum -= cand.rate;
            }
        }
        for chan in self.beacons.values_mut() {
            chan.clean_process(owner, &mut self.candidates_left, &mut self.rate_sum);
        }
        for chan in self.handshakes.values_mut() {
            let (removed, rate_delta) = chan.clean_process(owner);
            self.candidates_left -= removed;
            self.rate_sum -= rate_delta;
        }
        for chan in self.beacons.values_mut() {
            chan.update_candidates(&mut self.candidates_left, &mut self.rate_sum);
        }
        self.processes.remove(&owner);
    }

    /// Splits parallel roots, registers every resulting instance, walks it
    /// for candidates, and folds the fresh handshake pairings.
    fn admit_all(&mut self, to_add: Vec<ProcessInstance>) -> SimResult<()> {
        let mut flat = Vec::new();
        for inst in to_add {
            split_on_parallel(inst, &mut flat);
        }
        for inst in flat {
            self.admit(inst)?;
        }
        self.refresh_handshakes();
        Ok(())
    }

    fn admit(&mut self, inst: ProcessInstance) -> SimResult<()> {
        let root = inst.root.clone();
        let params = inst.params.clone();
        let locals = inst.locals.clone();
        let id = ProcessId(self.next_process);
        self.next_process += 1;
        self.processes.insert(id, inst);
        self.gather(id, &root, &[], &params, &locals, 0)
    }

    fn refresh_handshakes(&mut self) {
        for chan in self.handshakes.values_mut() {
            let (added, rate_delta) = chan.update_pairings();
            self.candidates_left += added;
            self.rate_sum += rate_delta;
        }
    }

    pub(crate) fn next_candidate_id(&mut self) -> CandidateId {
        let id = CandidateId(self.next_candidate);
        self.next_candidate += 1;
        id
    }

    /// Serializes one transition: time, action or channel name, owning
    /// definition, then the owning definition's formals with their values.
    fn write_transition(&mut self, time: f64, cand: &Candidate) {
        let name = match &cand.action.kind {
            BlockKind::Action { name, .. } => name,
            BlockKind::Send { channel, .. } => channel,
            BlockKind::Receive { channel, .. } => channel,
            _ => return,
        };
        let _ = write!(self.trace, "{}\t{}\t{}", time, name, cand.action.defined_in);
        if let Some(def) = self.defs.get(&cand.action.defined_in) {
            for formal in &def.formals {
                if let Some(v) = cand.params.int_values.get(formal) {
                    let _ = write!(self.trace, "\t{}\t{}", formal, v);
                } else if let Some(v) = cand.params.real_values.get(formal) {
                    let _ = write!(self.trace, "\t{}\t{}", formal, v);
                }
            }
        }
        self.trace.push('\n');
    }
}

/// The continuation instance for a fired candidate: the single child of the
/// fired action, carrying the candidate's environment. A leaf action has no
/// continuation and its owner simply dies.
fn continuation_of(cand: &Candidate) -> Option<ProcessInstance> {
    let child = cand.action.children.first()?;
    Some(ProcessInstance {
        root: child.clone(),
        params: cand.params.clone(),
        locals: cand.locals.clone(),
    })
}

/// Recursively splits an instance rooted at a parallel into instances
/// rooted at its non-parallel descendants, sharing the environment.
fn split_on_parallel(inst: ProcessInstance, out: &mut Vec<ProcessInstance>) {
    if matches!(inst.root.kind, BlockKind::Parallel) {
        for child in inst.root.children.iter() {
            split_on_parallel(
                ProcessInstance {
                    root: child.clone(),
                    params: inst.params.clone(),
                    locals: inst.locals.clone(),
                },
                out,
            );
        }
    } else {
        out.push(inst);
    }
}

/// Runs independent replicates of a program on a bounded worker pool and
/// streams each finished trace to `output`, preceded by a `>=======`
/// marker line. Replicate failures are logged and reported after the
/// remaining replicates complete.
pub fn simulate_system(program: &Program, options: &RunOptions, output: &Path) -> SimResult<()> {
    program.validate()?;
    let workers = options.threads.min(options.replicates).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| SimulationError::ThreadPool(e.to_string()))?;

    let file = File::create(output)?;
    let (tx, rx) = mpsc::channel::<SimResult<String>>();

    let writer = thread::spawn(move || -> SimResult<()> {
        let mut out = BufWriter::new(file);
        let mut first_error = None;
        for result in rx {
            match result {
                Ok(trace) => {
                    writeln!(out, ">=======")?;
                    out.write_all(trace.as_bytes())?;
                }
                Err(e) => {
                    log::error!("replicate failed: {e}");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        out.flush()?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    pool.install(|| {
        (0..options.replicates)
            .into_par_iter()
            .for_each_with(tx, |tx, index| {
                let rng = match options.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                    None => StdRng::from_os_rng(),
                };
                let result = System::new(program, options.max_transitions, options.max_duration, rng)
                    .and_then(|mut system| {
                        system.simulate()?;
                        log::info!(
                            "replicate {index} finished: {} transitions in {} time units",
                            system.transitions_taken(),
                            system.total_time()
                        );
                        Ok(system.into_trace())
                    });
                let _ = tx.send(result);
            });
    });

    match writer.join() {
        Ok(result) => result,
        Err(_) => Err(SimulationError::WriterThread),
    }
}
