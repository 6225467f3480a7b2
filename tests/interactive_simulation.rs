// Drives whole debug sessions the way an operator would: start a run, wait
// for it to pause, issue commands and inspect the published state.

use std::thread;
use std::time::Duration;

use script_debugger::config::DebuggerConfig;
use script_debugger::debugger::{
    Breakpoint, Command, Debugger, EvaluationKind, FocusRange, Location, Phase, SessionHandle,
};
use script_debugger::error::{DebugError, ProtocolError};
use script_debugger::parser::MAIN_UNIT;

#[cfg(test)]
mod interactive_tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn start(source: &str) -> (Debugger, SessionHandle) {
        start_with(DebuggerConfig::default(), source)
    }

    fn start_with(config: DebuggerConfig, source: &str) -> (Debugger, SessionHandle) {
        let mut debugger = Debugger::new(config);
        let session = debugger.start_run(source, None).expect("run should start");
        (debugger, session)
    }

    fn settle(session: &SessionHandle) -> Phase {
        session
            .wait_until_settled(TIMEOUT)
            .expect("session should settle")
    }

    fn command(session: &SessionHandle, command: Command) -> Phase {
        session.send_command(command).expect("command should be accepted");
        settle(session)
    }

    fn local(session: &SessionHandle, name: &str) -> Option<String> {
        session.status().variables.locals.get(name).cloned()
    }

    #[test]
    fn test_stop_on_entry() {
        let (_debugger, session) = start("x = 1\ny = 2\n");
        assert_eq!(settle(&session), Phase::Paused);
        let status = session.status();
        assert!(status.running);
        assert_eq!(status.current_line, Some(1));
        assert_eq!(status.frames.len(), 1);
        assert_eq!(status.frames[0].function, "<module>");
        assert_eq!(status.history_size, 1);
    }

    #[test]
    fn test_counter_visits_breakpoint_five_times() {
        let source = "count = 0\nwhile count < 5\n  print(count)\n  count += 1\nend\n";
        let (_debugger, session) = start(source);
        assert_eq!(settle(&session), Phase::Paused);
        session.set_breakpoint(3, None);

        for expected in 0..5 {
            assert_eq!(command(&session, Command::Continue), Phase::Paused);
            assert_eq!(session.status().current_line, Some(3));
            assert_eq!(local(&session, "count"), Some(expected.to_string()));
        }

        assert_eq!(command(&session, Command::Continue), Phase::Terminated);
        let status = session.status();
        assert!(!status.running);
        assert_eq!(status.output, "0\n1\n2\n3\n4\n");
        assert_eq!(status.exception, None);
    }

    #[test]
    fn test_conditional_breakpoint_pauses_once() {
        let source = "hits = 0\nfor count in range(10)\n  hits += 1\nend\n";
        let (_debugger, session) = start(source);
        settle(&session);
        session.set_breakpoints(vec![
            Breakpoint::new(Location::new(MAIN_UNIT, 3)).with_condition("count == 3")
        ]);

        assert_eq!(command(&session, Command::Continue), Phase::Paused);
        assert_eq!(local(&session, "count").as_deref(), Some("3"));
        assert_eq!(local(&session, "hits").as_deref(), Some("3"));
        assert_eq!(command(&session, Command::Continue), Phase::Terminated);
        assert_eq!(session.steps().len(), 2);
    }

    #[test]
    fn test_failing_condition_pauses_anyway() {
        let (_debugger, session) = start("a = 1\nb = 2\n");
        settle(&session);
        session.set_breakpoint(2, Some("undefined_name > 0".into()));
        assert_eq!(command(&session, Command::Continue), Phase::Paused);
        assert_eq!(session.status().current_line, Some(2));
    }

    #[test]
    fn test_each_step_advances_one_line_event() {
        let (_debugger, session) = start("x = 1\ny = 2\nz = 3\n");
        settle(&session);
        assert_eq!(command(&session, Command::Step), Phase::Paused);
        assert_eq!(session.status().current_line, Some(2));
        assert_eq!(command(&session, Command::Step), Phase::Paused);
        assert_eq!(session.status().current_line, Some(3));
        assert_eq!(command(&session, Command::Step), Phase::Terminated);
        let lines: Vec<_> = session.steps().iter().map(|s| s.line).collect();
        assert_eq!(lines, [1, 2, 3]);
    }

    const HELPER: &str = "def helper(n)\n  doubled = n * 2\n  return doubled\nend\na = helper(1)\nb = helper(a)\nprint(b)\n";

    #[test]
    fn test_step_into_enters_the_callee() {
        let (_debugger, session) = start(HELPER);
        settle(&session);
        command(&session, Command::Step);
        assert_eq!(session.status().current_line, Some(5));
        command(&session, Command::Step);
        let status = session.status();
        assert_eq!(status.current_line, Some(2));
        assert_eq!(status.frames.len(), 2);
        assert_eq!(status.frames[0].function, "helper");
        assert_eq!(status.frames[1].line, 5);
        assert_eq!(session.steps().last().map(|s| s.call_depth), Some(1));
    }

    #[test]
    fn test_step_over_skips_the_callee() {
        let (_debugger, session) = start(HELPER);
        settle(&session);
        command(&session, Command::Step);
        assert_eq!(command(&session, Command::StepOver), Phase::Paused);
        let status = session.status();
        assert_eq!(status.current_line, Some(6));
        assert_eq!(status.frames.len(), 1);
        assert_eq!(local(&session, "a").as_deref(), Some("2"));
    }

    #[test]
    fn test_breakpoint_in_callee_beats_step_over() {
        let (_debugger, session) = start(HELPER);
        settle(&session);
        command(&session, Command::Step);
        session.set_breakpoint(2, None);
        assert_eq!(command(&session, Command::StepOver), Phase::Paused);
        let status = session.status();
        assert_eq!(status.current_line, Some(2));
        assert_eq!(status.frames[0].function, "helper");

        // Stepping over inside the callee stays at its depth.
        command(&session, Command::StepOver);
        assert_eq!(session.status().current_line, Some(3));
        session.clear_breakpoint(2);
        assert_eq!(command(&session, Command::Continue), Phase::Terminated);
        assert_eq!(session.status().output, "4\n");
    }

    #[test]
    fn test_rewind_restores_previous_states() {
        let (_debugger, session) = start("x = 1\nx = 2\nx = 3\n");
        settle(&session);
        command(&session, Command::Step);
        command(&session, Command::Step);
        assert_eq!(session.status().history_cursor, Some(2));

        assert_eq!(command(&session, Command::Rewind), Phase::Paused);
        let status = session.status();
        assert_eq!(status.current_line, Some(2));
        assert_eq!(status.history_cursor, Some(1));
        assert_eq!(status.variables.locals.get("x").map(String::as_str), Some("1"));

        command(&session, Command::Rewind);
        for _ in 0..3 {
            assert_eq!(command(&session, Command::Rewind), Phase::Paused);
            let status = session.status();
            assert_eq!(status.current_line, Some(1));
            assert_eq!(status.history_cursor, Some(0));
            assert_eq!(status.history_size, 3);
        }
        assert_eq!(
            session.current_state().and_then(|s| s.current_line),
            Some(1)
        );

        // Resuming continues from the live position, not the rewound one.
        assert_eq!(command(&session, Command::Step), Phase::Terminated);
    }

    #[test]
    fn test_rewind_without_history_is_a_no_op() {
        let mut debugger = Debugger::default();
        let session = debugger
            .start_run("a = 1\nb = 2\n", Some(FocusRange::new(10, 20)))
            .unwrap();
        settle(&session);
        assert_eq!(command(&session, Command::Rewind), Phase::Paused);
        let status = session.status();
        assert_eq!(status.history_size, 0);
        assert_eq!(status.history_cursor, None);
        assert_eq!(status.current_line, Some(1));
    }

    #[test]
    fn test_history_capacity_bounds_size() {
        let config = DebuggerConfig {
            history_capacity: 3,
            ..DebuggerConfig::default()
        };
        let (_debugger, session) = start_with(config, "a = 1\nb = 2\nc = 3\nd = 4\ne = 5\n");
        for captures in 1..=5 {
            assert_eq!(settle(&session), Phase::Paused);
            assert_eq!(session.status().history_size, captures.min(3));
            session.send_command(Command::Step).unwrap();
        }
        assert_eq!(settle(&session), Phase::Terminated);
    }

    #[test]
    fn test_focus_range_limits_capture() {
        let mut debugger = Debugger::default();
        let session = debugger
            .start_run("a = 1\nb = 2\nc = 3\nd = 4\n", Some(FocusRange::new(3, 2)))
            .unwrap();
        while settle(&session) == Phase::Paused {
            session.send_command(Command::Step).unwrap();
        }
        assert_eq!(session.status().history_size, 2);
        assert_eq!(session.steps().len(), 4);
    }

    #[test]
    fn test_evaluate_reports_side_effects_on_a_copy() {
        let (_debugger, session) = start("def f(x)\n  y = x\n  return y\nend\nf(5)\n");
        settle(&session);
        command(&session, Command::Step);
        command(&session, Command::Step);
        assert_eq!(session.status().current_line, Some(2));

        let evaluation = session.evaluate("x = x + 1").unwrap();
        assert_eq!(evaluation.kind, EvaluationKind::Statement);
        assert_eq!(evaluation.result, None);
        assert_eq!(evaluation.notes(), ["Modified local variable: x"]);

        let evaluation = session.evaluate("x * 10").unwrap();
        assert_eq!(evaluation.kind, EvaluationKind::Expression);
        assert_eq!(evaluation.result.as_deref(), Some("50"));

        let evaluation = session.evaluate("print('side'); missing").unwrap();
        assert_eq!(evaluation.kind, EvaluationKind::Error);
        assert_eq!(evaluation.output, "side\n");
        assert_eq!(session.status().output, "");

        command(&session, Command::Continue);
        assert_eq!(session.evaluate("x"), Err(ProtocolError::NotPaused));
    }

    #[test]
    fn test_terminate_while_paused() {
        let (_debugger, session) = start("while true\n  x = 1\nend\n");
        settle(&session);
        assert_eq!(command(&session, Command::Terminate), Phase::Terminated);
        assert_eq!(
            session.send_command(Command::Step),
            Err(ProtocolError::NotRunning)
        );
        assert_eq!(
            session.send_command(Command::Terminate),
            Err(ProtocolError::NotRunning)
        );
    }

    #[test]
    fn test_terminate_while_running() {
        let config = DebuggerConfig {
            stop_on_entry: false,
            ..DebuggerConfig::default()
        };
        let (_debugger, session) = start_with(config, "n = 0\nwhile true\n  n += 1\nend\n");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(session.phase(), Phase::Running);
        assert_eq!(
            session.send_command(Command::Continue),
            Err(ProtocolError::NotPaused)
        );
        assert_eq!(session.evaluate("n"), Err(ProtocolError::NotPaused));
        assert_eq!(command(&session, Command::Terminate), Phase::Terminated);
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let (_debugger, session) = start("x = 1\n");
        settle(&session);
        assert_eq!(
            session.send("jump"),
            Err(ProtocolError::UnknownCommand("jump".into()))
        );
        assert_eq!(session.phase(), Phase::Paused);
        assert_eq!(session.send("quit"), Ok(()));
        assert_eq!(settle(&session), Phase::Terminated);
    }

    #[test]
    fn test_runtime_error_is_recorded() {
        let config = DebuggerConfig {
            stop_on_entry: false,
            ..DebuggerConfig::default()
        };
        let (_debugger, session) = start_with(config, "x = 1\nprint(x)\ny = x / 0\n");
        assert_eq!(settle(&session), Phase::Terminated);
        let status = session.status();
        assert_eq!(status.exception.as_deref(), Some("ZeroDivisionError: division by zero"));
        assert_eq!(status.output, "1\n");
    }

    #[test]
    fn test_new_run_replaces_the_session() {
        let (mut debugger, first) = start("x = 1\n");
        settle(&first);
        let second = debugger.start_run("y = 2\n", None).unwrap();
        assert_eq!(first.phase(), Phase::Terminated);
        assert_eq!(settle(&second), Phase::Paused);
        assert_ne!(first.id(), second.id());
        assert_eq!(debugger.session().unwrap().id(), second.id());
    }

    #[test]
    fn test_parse_error_keeps_the_old_session() {
        let (mut debugger, session) = start("x = 1\n");
        settle(&session);
        let err = debugger.start_run("x = = 1\n", None).unwrap_err();
        assert!(matches!(err, DebugError::Parse(_)));
        assert_eq!(session.phase(), Phase::Paused);
        assert_eq!(debugger.session().unwrap().id(), session.id());
    }

    #[test]
    fn test_deeply_nested_input_fails_as_a_value() {
        let (mut debugger, session) = start("x = 1\n");
        settle(&session);
        let deep = format!("y = {}1{}\n", "(".repeat(5_000), ")".repeat(5_000));
        let err = debugger.start_run(&deep, None).unwrap_err();
        assert!(matches!(err, DebugError::Parse(_)));

        let evaluation = session.evaluate(&deep).unwrap();
        assert!(evaluation
            .error
            .as_deref()
            .is_some_and(|e| e.contains("too many nested levels")));
        assert_eq!(session.phase(), Phase::Paused);
    }

    #[test]
    fn test_no_session_before_first_run() {
        let debugger = Debugger::default();
        assert!(matches!(debugger.session(), Err(DebugError::NoSession)));
    }

    #[test]
    fn test_breakpoints_armed_before_start() {
        let config = DebuggerConfig {
            stop_on_entry: false,
            ..DebuggerConfig::default()
        };
        let mut debugger = Debugger::new(config);
        let session = debugger
            .start_run_with_breakpoints(
                "a = 1\nb = 2\nc = 3\n",
                None,
                vec![Breakpoint::new(Location::new(MAIN_UNIT, 2))],
            )
            .unwrap();
        assert_eq!(settle(&session), Phase::Paused);
        assert_eq!(session.status().current_line, Some(2));
        let listing = session.breakpoints();
        assert_eq!(listing[MAIN_UNIT][&2].condition, None);
    }

    #[test]
    fn test_visualization_and_profile() {
        let config = DebuggerConfig {
            stop_on_entry: false,
            ..DebuggerConfig::default()
        };
        let source = "def sq(n)\n  return n * n\nend\ntotal = 0\nfor i in range(3)\n  total += sq(i)\nend\n";
        let (_debugger, session) = start_with(config, source);
        assert_eq!(settle(&session), Phase::Terminated);

        let visualization = session.visualization();
        assert_eq!(
            visualization.flowchart,
            "flowchart TB\nstart[No execution steps yet]"
        );
        assert!(visualization.call_graph.contains("module --> sq"));

        let profile = session.profile();
        assert_eq!(profile.functions["sq"].calls, 3);
        assert_eq!(profile.functions["sq"].line, 1);
    }

    #[test]
    fn test_status_round_trips_through_json() {
        let (_debugger, session) = start("items = [1, 'two']\ncount = len(items)\n");
        settle(&session);
        command(&session, Command::Step);
        let status = session.status();
        let json = serde_json::to_string(&status).unwrap();
        let restored: script_debugger::debugger::Status = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, status);
        assert_eq!(status.variables.locals["items"], "[1, 'two']");
    }
}
