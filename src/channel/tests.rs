#[cfg(test)]
mod units {
    use crate::channel::beacon::{BeaconChannel, BeaconDatabase};
    use crate::channel::handshake::HandshakeChannel;
    use crate::channel::{Candidate, CandidateId, PatternEval};
    use crate::eval::{GlobalVariables, LocalVariables, ParameterValues};
    use crate::syntax::{Block, BlockKind, Token};
    use crate::system::ProcessId;
    use std::sync::Arc;

    fn tok(text: &str) -> Token {
        Token::new(text, 1, 1)
    }

    fn expr(text: &str) -> Vec<Token> {
        text.split_whitespace().map(tok).collect()
    }

    fn send_block(channel: &str, kill: bool, payload: &[&str], rate: &str) -> Arc<Block> {
        Arc::new(Block::new(
            BlockKind::Send {
                channel: channel.to_string(),
                handshake: false,
                kill,
                payload: payload.iter().map(|p| expr(p)).collect(),
                rate: expr(rate),
            },
            tok(channel),
            vec![],
        ))
    }

    fn receive_block(
        channel: &str,
        check: bool,
        binding: Option<&str>,
        pattern: &[&str],
        rate: &str,
    ) -> Arc<Block> {
        Arc::new(Block::new(
            BlockKind::Receive {
                channel: channel.to_string(),
                handshake: false,
                check,
                binding: binding.map(|b| b.to_string()),
                pattern: pattern.iter().map(|p| expr(p)).collect(),
                rate: expr(rate),
            },
            tok(channel),
            vec![],
        ))
    }

    fn handshake_candidate(id: u64, owner: u64, pattern: PatternEval, rate: f64) -> Candidate {
        let action = Arc::new(Block::new(
            BlockKind::Send {
                channel: "c".to_string(),
                handshake: true,
                kill: false,
                payload: vec![expr("0")],
                rate: expr("1.0"),
            },
            tok("c"),
            vec![],
        ));
        Candidate {
            id: CandidateId(id),
            action,
            channel: Some("c".to_string()),
            params: ParameterValues::default(),
            locals: LocalVariables::new(),
            owner: ProcessId(owner),
            residuals: vec![],
            rate,
            pattern,
            matched: vec![],
        }
    }

    fn beacon() -> (BeaconChannel, usize, f64) {
        (
            BeaconChannel::new("c".to_string(), GlobalVariables::default()),
            0,
            0.0,
        )
    }

    fn env() -> (ParameterValues, LocalVariables) {
        (ParameterValues::default(), LocalVariables::new())
    }

    #[test]
    fn database_collapses_duplicates() {
        let mut db = BeaconDatabase::default();
        db.push(vec![7]);
        db.push(vec![7]);
        db.push(vec![1, 2]);
        assert_eq!(db.len(), 2);
        assert!(db.contains(&[7]));

        db.pop(&[7]);
        assert!(!db.contains(&[7]));
        // Removing an absent tuple is a no-op.
        db.pop(&[7]);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn database_matches_per_dimension_bounds() {
        let mut db = BeaconDatabase::default();
        db.push(vec![3, 20]);
        db.push(vec![5, 25]);
        db.push(vec![9, 20]);

        // Each dimension is a disjunction of inclusive ranges.
        let bounds = vec![vec![(0, 4), (9, 9)], vec![(20, 20)]];
        let hits = db.matches(&bounds);
        assert_eq!(hits, vec![vec![3, 20], vec![9, 20]]);
        assert!(db.any_match(&bounds));
        assert!(!db.any_match(&[vec![(6, 8)], vec![(20, 25)]]));

        // Arity mismatch never matches.
        assert!(db.matches(&[vec![(0, 100)]]).is_empty());
        assert!(!db.any_match(&[vec![(0, 100)]]));
    }

    #[test]
    fn pattern_contains_checks_every_dimension() {
        let pattern = PatternEval::Bounds(vec![vec![(0, 4), (8, 9)], vec![(1, 1)]]);
        assert!(pattern.contains(&[8, 1]));
        assert!(!pattern.contains(&[5, 1]));
        assert!(!pattern.contains(&[8, 2]));
        assert!(!pattern.contains(&[8]));
    }

    #[test]
    fn unmatched_receive_is_potential_and_contributes_nothing() {
        let (mut chan, mut left, mut rate) = beacon();
        let (params, locals) = env();
        let block = receive_block("c", false, None, &["0 10 .."], "1.0");
        chan.add_candidate(
            &block,
            ProcessId(0),
            CandidateId(0),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();

        assert_eq!(left, 0);
        assert_eq!(rate, 0.0);
        assert_eq!(chan.potential_count(), 1);
        assert_eq!(chan.active_count(), 0);
    }

    #[test]
    fn launch_promotes_matching_potential_receive() {
        let (mut chan, mut left, mut rate) = beacon();
        let (params, locals) = env();

        let recv = receive_block("c", false, None, &["5 10 .."], "2.0");
        chan.add_candidate(
            &recv,
            ProcessId(0),
            CandidateId(0),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();

        let launch = send_block("c", false, &["7"], "3.0");
        chan.add_candidate(
            &launch,
            ProcessId(1),
            CandidateId(1),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        assert_eq!(left, 1);
        assert_eq!(rate, 3.0);

        // Fire the launch and reclassify.
        let cand = chan.pick_candidate(&mut 0.0, 0.5, 3.0).unwrap();
        chan.apply_send(&cand);
        chan.clean_process(ProcessId(1), &mut left, &mut rate);
        chan.update_candidates(&mut left, &mut rate);

        assert_eq!(chan.active_count(), 1);
        assert_eq!(left, 1);
        assert_eq!(rate, 2.0);
    }

    #[test]
    fn killing_the_last_match_demotes_the_receive() {
        let (mut chan, mut left, mut rate) = beacon();
        let (params, locals) = env();

        let launch = send_block("c", false, &["7"], "1.0");
        let cand_launch = {
            chan.add_candidate(
                &launch,
                ProcessId(0),
                CandidateId(0),
                vec![],
                &params,
                &locals,
                &mut left,
                &mut rate,
            )
            .unwrap();
            chan.pick_candidate(&mut 0.0, 0.5, 1.0).unwrap()
        };
        chan.apply_send(&cand_launch);
        chan.clean_process(ProcessId(0), &mut left, &mut rate);

        let recv = receive_block("c", false, None, &["0 10 .."], "2.0");
        chan.add_candidate(
            &recv,
            ProcessId(1),
            CandidateId(1),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        assert_eq!(chan.active_count(), 1);
        assert_eq!(left, 1);

        // A kill on the stored tuple is admitted and firable.
        let kill = send_block("c", true, &["7"], "1.5");
        chan.add_candidate(
            &kill,
            ProcessId(2),
            CandidateId(2),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        assert_eq!(left, 2);

        // Sends sweep before active receives, so a small draw lands on the
        // kill: its interval is (0, 1.5/3.5].
        let mut running = 0.0;
        let cand_kill = chan.pick_candidate(&mut running, 0.2, rate).unwrap();
        chan.apply_send(&cand_kill);
        chan.clean_process(ProcessId(2), &mut left, &mut rate);
        chan.update_candidates(&mut left, &mut rate);

        assert_eq!(chan.active_count(), 0);
        assert_eq!(chan.potential_count(), 1);
        assert_eq!(left, 0);
        assert!(rate.abs() < 1e-12);
        assert!(chan.database().is_empty());
    }

    #[test]
    fn kill_without_a_stored_tuple_is_not_admitted() {
        let (mut chan, mut left, mut rate) = beacon();
        let (params, locals) = env();
        let kill = send_block("c", true, &["7"], "1.0");
        chan.add_candidate(
            &kill,
            ProcessId(0),
            CandidateId(0),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        assert_eq!(left, 0);
        assert_eq!(rate, 0.0);
        assert!(chan.pick_candidate(&mut 0.0, 0.5, 1.0).is_none());
    }

    #[test]
    fn binding_receive_requires_a_singleton_match() {
        let (mut chan, mut left, mut rate) = beacon();
        let (params, locals) = env();

        for (i, value) in ["3", "8"].iter().enumerate() {
            let launch = send_block("c", false, &[value], "1.0");
            chan.add_candidate(
                &launch,
                ProcessId(i as u64),
                CandidateId(i as u64),
                vec![],
                &params,
                &locals,
                &mut left,
                &mut rate,
            )
            .unwrap();
        }
        let mut running = 0.0;
        let first = chan.pick_candidate(&mut running, 0.25, rate).unwrap();
        chan.apply_send(&first);
        let mut running = 0.0;
        let second = chan.pick_candidate(&mut running, 0.75, rate).unwrap();
        chan.apply_send(&second);
        chan.clean_process(ProcessId(0), &mut left, &mut rate);
        chan.clean_process(ProcessId(1), &mut left, &mut rate);
        assert_eq!(chan.database().len(), 2);

        // Two stored tuples match: the binding receive must stay potential.
        let ambiguous = receive_block("c", false, Some("x"), &["0 10 .."], "1.0");
        chan.add_candidate(
            &ambiguous,
            ProcessId(2),
            CandidateId(2),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        assert_eq!(chan.active_count(), 0);
        assert_eq!(chan.potential_count(), 1);
        assert_eq!(left, 0);

        // A pattern matching exactly one tuple is active, and the match is
        // recorded for binding at fire time.
        let singleton = receive_block("c", false, Some("x"), &["0 5 .."], "1.0");
        chan.add_candidate(
            &singleton,
            ProcessId(3),
            CandidateId(3),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        assert_eq!(chan.active_count(), 1);
        assert_eq!(left, 1);
        let picked = chan.pick_candidate(&mut 0.0, 0.5, rate).unwrap();
        assert_eq!(picked.matched, vec![vec![3]]);
    }

    #[test]
    fn check_does_not_consume_the_tuple() {
        let (mut chan, mut left, mut rate) = beacon();
        let (params, locals) = env();

        let launch = send_block("c", false, &["7"], "1.0");
        chan.add_candidate(
            &launch,
            ProcessId(0),
            CandidateId(0),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        let cand = chan.pick_candidate(&mut 0.0, 0.5, 1.0).unwrap();
        chan.apply_send(&cand);
        chan.clean_process(ProcessId(0), &mut left, &mut rate);

        let check = receive_block("c", true, None, &["5 10 .."], "1.0");
        chan.add_candidate(
            &check,
            ProcessId(1),
            CandidateId(1),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        assert_eq!(chan.active_count(), 1);

        // Firing a check leaves the database untouched.
        let picked = chan.pick_candidate(&mut 0.0, 0.5, rate).unwrap();
        chan.apply_send(&picked);
        assert!(chan.database().contains(&[7]));
    }

    #[test]
    fn beacon_totals_track_counters() {
        let (mut chan, mut left, mut rate) = beacon();
        let (params, locals) = env();
        let launch = send_block("c", false, &["1"], "2.5");
        chan.add_candidate(
            &launch,
            ProcessId(0),
            CandidateId(0),
            vec![],
            &params,
            &locals,
            &mut left,
            &mut rate,
        )
        .unwrap();
        let (count, total) = chan.totals();
        assert_eq!(count, left);
        assert!((total - rate).abs() < 1e-12);
    }

    #[test]
    fn handshake_pairs_only_disjoint_owners_within_bounds() {
        let mut chan = HandshakeChannel::new("c".to_string());
        chan.add_send_candidate(handshake_candidate(
            0,
            0,
            PatternEval::Value(vec![5]),
            2.0,
        ));
        // Same owner: never paired.
        chan.add_receive_candidate(handshake_candidate(
            1,
            0,
            PatternEval::Bounds(vec![vec![(0, 10)]]),
            0.0,
        ));
        // Different owner but the value is outside the pattern.
        chan.add_receive_candidate(handshake_candidate(
            2,
            1,
            PatternEval::Bounds(vec![vec![(6, 10)]]),
            0.0,
        ));
        // Different owner, value inside the pattern.
        chan.add_receive_candidate(handshake_candidate(
            3,
            2,
            PatternEval::Bounds(vec![vec![(0, 10)]]),
            0.0,
        ));

        let (added, rate_delta) = chan.update_pairings();
        assert_eq!(added, 1);
        assert_eq!(rate_delta, 2.0);
        assert_eq!(chan.pairings().len(), 1);
        assert_eq!(chan.pairings()[0].value, 5);
        assert_eq!(chan.pairings()[0].recv.owner, ProcessId(2));

        // Deltas, not absolutes: an unchanged channel reports nothing new.
        assert_eq!(chan.update_pairings(), (0, 0.0));
    }

    #[test]
    fn handshake_clean_removes_pairings_and_reports_deltas() {
        let mut chan = HandshakeChannel::new("c".to_string());
        chan.add_send_candidate(handshake_candidate(
            0,
            0,
            PatternEval::Value(vec![5]),
            2.0,
        ));
        chan.add_receive_candidate(handshake_candidate(
            1,
            1,
            PatternEval::Bounds(vec![vec![(0, 10)]]),
            0.0,
        ));
        chan.update_pairings();

        let (removed, rate_delta) = chan.clean_process(ProcessId(1));
        assert_eq!(removed, 1);
        assert_eq!(rate_delta, 2.0);
        assert!(chan.pairings().is_empty());
        assert_eq!(chan.totals(), (0, 0.0));
    }

    #[test]
    fn handshake_pick_walks_the_cumulative_intervals() {
        let mut chan = HandshakeChannel::new("c".to_string());
        chan.add_send_candidate(handshake_candidate(
            0,
            0,
            PatternEval::Value(vec![1]),
            1.0,
        ));
        chan.add_send_candidate(handshake_candidate(
            1,
            1,
            PatternEval::Value(vec![2]),
            3.0,
        ));
        chan.add_receive_candidate(handshake_candidate(
            2,
            2,
            PatternEval::Bounds(vec![vec![(0, 10)]]),
            0.0,
        ));
        let (added, total) = chan.update_pairings();
        assert_eq!(added, 2);

        let mut running = 0.0;
        let first = chan.pick_pairing(&mut running, 0.2, total).unwrap();
        assert_eq!(first.value, 1);

        let mut running = 0.0;
        let second = chan.pick_pairing(&mut running, 0.9, total).unwrap();
        assert_eq!(second.value, 2);

        // The running total advances past unpicked pairings.
        let mut running = 0.0;
        assert!(chan.pick_pairing(&mut running, 2.0, total).is_none());
        assert_eq!(running, total);
    }
}
