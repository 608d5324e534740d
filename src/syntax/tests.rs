#[cfg(test)]
mod units {
    use crate::error::ProgramError;
    use crate::syntax::{Block, BlockKind, InitialProcess, Program, ProcessDefinition, Token};
    use std::sync::Arc;

    fn tok(text: &str) -> Token {
        Token::new(text, 1, 1)
    }

    fn expr(text: &str) -> Vec<Token> {
        text.split_whitespace().map(tok).collect()
    }

    fn action(name: &str, rate: &str, children: Vec<Arc<Block>>) -> Arc<Block> {
        Arc::new(Block::new(
            BlockKind::Action {
                name: name.to_string(),
                rate: expr(rate),
            },
            tok(name),
            children,
        ))
    }

    fn receive(check: bool, binding: Option<&str>) -> Arc<Block> {
        Arc::new(Block::new(
            BlockKind::Receive {
                channel: "c".to_string(),
                handshake: false,
                check,
                binding: binding.map(|b| b.to_string()),
                pattern: vec![expr("0 10 ..")],
                rate: expr("1.0"),
            },
            tok("c"),
            vec![],
        ))
    }

    fn program_with(name: &str, tree: Arc<Block>) -> Program {
        let mut program = Program::default();
        program.definitions.insert(
            name.to_string(),
            ProcessDefinition {
                formals: vec![],
                tree,
            },
        );
        program.initial.push(InitialProcess {
            name: name.to_string(),
            params: Default::default(),
        });
        program
    }

    #[test]
    fn finalize_stamps_owning_definition_on_every_node() {
        let tree = action("a", "1.0", vec![action("b", "2.0", vec![])]);
        let mut program = program_with("P", tree);
        program.finalize();

        let root = &program.definitions["P"].tree;
        assert_eq!(root.defined_in, "P");
        assert_eq!(root.children[0].defined_in, "P");
    }

    #[test]
    fn validate_accepts_a_wellformed_program() {
        let tree = action("a", "1.0", vec![]);
        let mut program = program_with("P", tree);
        program.finalize();
        assert!(program.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_initial_process() {
        let mut program = program_with("P", action("a", "1.0", vec![]));
        program.initial.push(InitialProcess {
            name: "Q".to_string(),
            params: Default::default(),
        });
        assert!(matches!(
            program.validate(),
            Err(ProgramError::UnknownProcess(name)) if name == "Q"
        ));
    }

    #[test]
    fn validate_rejects_unary_parallel() {
        let tree = Arc::new(Block::new(
            BlockKind::Parallel,
            tok("|"),
            vec![action("a", "1.0", vec![])],
        ));
        let program = program_with("P", tree);
        assert!(matches!(
            program.validate(),
            Err(ProgramError::MalformedParallel { .. })
        ));
    }

    #[test]
    fn validate_rejects_a_binding_check() {
        let program = program_with("P", receive(true, Some("x")));
        assert!(matches!(
            program.validate(),
            Err(ProgramError::CheckBindsVariable { .. })
        ));
        // The two flags are fine on their own.
        assert!(program_with("Q", receive(true, None)).validate().is_ok());
        assert!(program_with("R", receive(false, Some("x"))).validate().is_ok());
    }

    #[test]
    fn validate_rejects_call_arity_mismatch() {
        let call = Arc::new(Block::new(
            BlockKind::Call {
                name: "P".to_string(),
                args: vec![expr("1")],
            },
            tok("P"),
            vec![],
        ));
        let mut program = program_with("P", action("a", "1.0", vec![]));
        program.definitions.insert(
            "Q".to_string(),
            ProcessDefinition {
                formals: vec![],
                tree: call,
            },
        );
        assert!(matches!(
            program.validate(),
            Err(ProgramError::ArityMismatch { expected: 0, given: 1, .. })
        ));
    }

    #[test]
    fn program_round_trips_through_json() {
        let tree = action("a", "1.0", vec![action("b", "0.5", vec![])]);
        let mut program = program_with("P", tree);
        program.finalize();

        let text = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&text).unwrap();
        assert_eq!(back.definitions.len(), 1);
        assert_eq!(back.initial[0].name, "P");
        assert!(matches!(
            back.definitions["P"].tree.kind,
            BlockKind::Action { .. }
        ));
    }
}
