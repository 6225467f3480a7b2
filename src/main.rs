use std::error::Error;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use script_debugger::config::DebuggerConfig;
use script_debugger::debugger::{Command, Debugger, FocusRange, Phase, SessionHandle};
use tracing::info;

const SETTLE_POLL: Duration = Duration::from_millis(500);

const HELP: &str = "Commands: (s)tep, (n)ext/step-over, (c)ontinue, (r)ewind, (q)uit, \
b <line> [\"cond\"], d <line>, bl, p <expr>, vars, stack, status, viz, profile";

struct Options {
    script: PathBuf,
    config: Option<PathBuf>,
    focus: Option<FocusRange>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut script = None;
    let mut config = None;
    let mut focus = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(args.next().ok_or("--config needs a path")?.into());
            }
            "--focus" => {
                let range = args.next().ok_or("--focus needs <first>:<last>")?;
                focus = Some(parse_focus(&range)?);
            }
            other if other.starts_with("--") => return Err(format!("unknown option {other}")),
            other => script = Some(PathBuf::from(other)),
        }
    }
    Ok(Options {
        script: script.ok_or("usage: script-debugger [--config <path>] [--focus a:b] <script>")?,
        config,
        focus,
    })
}

fn parse_focus(text: &str) -> Result<FocusRange, String> {
    let (first, last) = text
        .split_once(':')
        .ok_or_else(|| format!("invalid focus range '{text}'"))?;
    let first = first.trim().parse().map_err(|_| format!("invalid line '{first}'"))?;
    let last = last.trim().parse().map_err(|_| format!("invalid line '{last}'"))?;
    Ok(FocusRange::new(first, last))
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = parse_args(std::env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => DebuggerConfig::load(path)?,
        None => DebuggerConfig::default(),
    };
    let source = fs::read_to_string(&options.script)?;
    info!(script = %options.script.display(), "starting interactive mode");

    let mut debugger = Debugger::new(config);
    let session = debugger.start_run(&source, options.focus)?;
    run_console(&session)?;
    debugger.shutdown()?;
    Ok(())
}

fn run_console(session: &SessionHandle) -> io::Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut printed = 0;

    loop {
        let Some(phase) = session.wait_until_settled(SETTLE_POLL) else {
            continue;
        };
        let status = session.status();
        print_output(&status.output, &mut printed)?;

        if phase == Phase::Terminated {
            match &status.exception {
                Some(exception) => eprintln!("\nProgram raised {exception}"),
                None => eprintln!("\nProgram finished"),
            }
            return Ok(());
        }

        if let Some(line) = status.current_line {
            let function = status.frames.first().map_or("<module>", |f| f.function.as_str());
            eprintln!("\nStopped at line {line} in {function}");
            eprintln!("    {}", session.unit().line(line).unwrap_or_default().trim());
        }

        'prompt: loop {
            eprint!("> ");
            io::stderr().flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                let _ = session.send_command(Command::Terminate);
                break 'prompt;
            }
            let line = line.trim();
            let Some(words) = shlex::split(line) else {
                eprintln!("Invalid quoting");
                continue;
            };

            let command = match words.first().map(String::as_str) {
                None | Some("s" | "step") => Command::Step,
                Some("n" | "next" | "step-over") => Command::StepOver,
                Some("c" | "continue") => Command::Continue,
                Some("r" | "rewind" | "back") => Command::Rewind,
                Some("q" | "quit") => Command::Terminate,
                Some("b") => {
                    match words.get(1).and_then(|n| n.parse::<usize>().ok()) {
                        Some(target) => session.set_breakpoint(target, words.get(2).cloned()),
                        None => eprintln!("Invalid line number"),
                    }
                    continue;
                }
                Some("d") => {
                    match words.get(1).and_then(|n| n.parse::<usize>().ok()) {
                        Some(target) if session.clear_breakpoint(target) => {
                            eprintln!("Breakpoint removed from line {target}")
                        }
                        Some(target) => eprintln!("No breakpoint at line {target}"),
                        None => eprintln!("Invalid line number"),
                    }
                    continue;
                }
                Some("bl") => {
                    print_json(&session.breakpoints());
                    continue;
                }
                Some("p") => {
                    let text = line.strip_prefix('p').unwrap_or_default().trim();
                    match session.evaluate(text) {
                        Ok(evaluation) => {
                            if !evaluation.output.is_empty() {
                                eprint!("{}", evaluation.output);
                            }
                            if let Some(result) = &evaluation.result {
                                eprintln!("{result}");
                            }
                            if let Some(error) = &evaluation.error {
                                eprintln!("error: {error}");
                            }
                            for note in evaluation.notes() {
                                eprintln!("  ({note})");
                            }
                        }
                        Err(err) => eprintln!("{err}"),
                    }
                    continue;
                }
                Some("vars") => {
                    let status = session.status();
                    for (name, value) in &status.variables.locals {
                        eprintln!("  {name} = {value}");
                    }
                    continue;
                }
                Some("stack") => {
                    let status = session.status();
                    for (depth, frame) in status.frames.iter().enumerate() {
                        eprintln!("  #{depth}: {} at line {}", frame.function, frame.line);
                    }
                    continue;
                }
                Some("status") => {
                    print_json(&session.status());
                    continue;
                }
                Some("viz") => {
                    let visualization = session.visualization();
                    eprintln!("{}\n\n{}", visualization.flowchart, visualization.call_graph);
                    continue;
                }
                Some("profile") => {
                    print_json(&session.profile());
                    continue;
                }
                Some("h" | "help") => {
                    eprintln!("{HELP}");
                    continue;
                }
                Some(other) => {
                    eprintln!("Unknown command: {other}");
                    continue;
                }
            };

            match session.send_command(command) {
                Ok(()) => break 'prompt,
                Err(err) => eprintln!("{err}"),
            }
        }
    }
}

fn print_output(output: &str, printed: &mut usize) -> io::Result<()> {
    if let Some(fresh) = output.get(*printed..) {
        let mut stdout = io::stdout().lock();
        stdout.write_all(fresh.as_bytes())?;
        stdout.flush()?;
    }
    *printed = output.len();
    Ok(())
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => eprintln!("{json}"),
        Err(err) => eprintln!("failed to render: {err}"),
    }
}
