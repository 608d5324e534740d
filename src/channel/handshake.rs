//! Handshake channels: synchronous rendezvous.
//!
//! A handshake channel matches send candidates with receive candidates on
//! the same name. A pairing is valid iff the two owners are distinct
//! processes and the sent value lies inside the receive pattern. A pairing
//! contributes the send rate only; rendezvous is not the product of two
//! independent rates, the receive side is passive selection.

use std::collections::{BTreeMap, BTreeSet};

use crate::channel::{Candidate, CandidateId, PatternEval, interval_hit};
use crate::system::ProcessId;

/// One matched send/receive pair with its resolved value.
#[derive(Debug, Clone)]
pub struct HandshakePairing {
    pub send: Candidate,
    pub recv: Candidate,
    /// The value carried across: the send payload, guaranteed to lie in the
    /// receive pattern.
    pub value: i64,
}

/// One named handshake channel.
#[derive(Debug, Default)]
pub struct HandshakeChannel {
    name: String,
    sends: BTreeMap<ProcessId, Vec<Candidate>>,
    receives: BTreeMap<ProcessId, Vec<Candidate>>,
    pairings: Vec<HandshakePairing>,
    paired: BTreeSet<(CandidateId, CandidateId)>,
}

impl HandshakeChannel {
    pub fn new(name: String) -> Self {
        HandshakeChannel {
            name,
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admits a send candidate. Its pattern is the single-component tuple
    /// being sent and its rate is positive; both are established by the
    /// walker before the hand-off.
    pub fn add_send_candidate(&mut self, cand: Candidate) {
        debug_assert!(matches!(&cand.pattern, PatternEval::Value(t) if t.len() == 1));
        debug_assert!(cand.rate > 0.0);
        self.sends.entry(cand.owner).or_default().push(cand);
    }

    /// Admits a receive candidate carrying its admissible value bounds.
    pub fn add_receive_candidate(&mut self, cand: Candidate) {
        debug_assert!(matches!(&cand.pattern, PatternEval::Bounds(_)));
        self.receives.entry(cand.owner).or_default().push(cand);
    }

    /// Recomputes the matching and returns the number and rate sum of the
    /// pairings newly formed since the previous call (deltas, not
    /// absolutes).
    pub fn update_pairings(&mut self) -> (usize, f64) {
        let mut fresh = Vec::new();
        let mut added = 0;
        let mut rate_delta = 0.0;

        for (send_owner, send_list) in &self.sends {
            for send in send_list {
                let PatternEval::Value(tuple) = &send.pattern else {
                    continue;
                };
                let value = tuple[0];
                for (recv_owner, recv_list) in &self.receives {
                    if recv_owner == send_owner {
                        continue;
                    }
                    for recv in recv_list {
                        if self.paired.contains(&(send.id, recv.id)) {
                            continue;
                        }
                        if recv.pattern.contains(&[value]) {
                            fresh.push(HandshakePairing {
                                send: send.clone(),
                                recv: recv.clone(),
                                value,
                            });
                            added += 1;
                            rate_delta += send.rate;
                        }
                    }
                }
            }
        }

        for pairing in &fresh {
            self.paired.insert((pairing.send.id, pairing.recv.id));
        }
        self.pairings.extend(fresh);
        (added, rate_delta)
    }

    /// Inverse-CDF sweep over the current pairings, in formation order.
    pub fn pick_pairing(
        &self,
        running: &mut f64,
        draw: f64,
        total: f64,
    ) -> Option<HandshakePairing> {
        for pairing in &self.pairings {
            if interval_hit(running, pairing.send.rate, draw, total) {
                return Some(pairing.clone());
            }
        }
        None
    }

    /// Drops every candidate owned by a process along with the pairings it
    /// participates in; returns the pairing count and rate decrements.
    pub fn clean_process(&mut self, owner: ProcessId) -> (usize, f64) {
        self.sends.remove(&owner);
        self.receives.remove(&owner);

        let (dead, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pairings)
            .into_iter()
            .partition(|p| p.send.owner == owner || p.recv.owner == owner);
        self.pairings = alive;

        let mut removed = 0;
        let mut rate_delta = 0.0;
        for pairing in dead {
            self.paired.remove(&(pairing.send.id, pairing.recv.id));
            removed += 1;
            rate_delta += pairing.send.rate;
        }
        (removed, rate_delta)
    }

    pub fn pairings(&self) -> &[HandshakePairing] {
        &self.pairings
    }

    /// From-scratch (count, rate) contribution: pairings only, at the send
    /// rate. Unmatched sends and receives contribute nothing.
    pub fn totals(&self) -> (usize, f64) {
        (
            self.pairings.len(),
            self.pairings.iter().map(|p| p.send.rate).sum(),
        )
    }
}
