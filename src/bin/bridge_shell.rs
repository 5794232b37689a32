//! UIBridge shell
//!
//! Drives one execution context by hand: record commands, run timers, play
//! the host by draining and acknowledging. Reads a script file when given
//! one, otherwise starts an interactive prompt.

use regex::Regex;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing_subscriber::EnvFilter;
use uibridge::jobs::{JobHandle, TimerId};
use uibridge::{
    flush_channel, BridgeError, Command, CommandBatch, ContextId, ContextManager, FlushReceiver,
    HostBridge, NativeHandle, NativeObject, NativeValue, NullEngine, ScriptError, TargetId,
};

const HELP: &str = "\
commands:
  create <tag>                 create an element, prints its target id
  text <data>                  create a text node
  set <id> <key> <value>       setProperty
  style <id> <key> <value>     setStyle
  remove <id>                  removeNode
  dispose <id>                 disposeEventTarget and queue the native release
  timeout <ms> | interval <ms> schedule a timer that sets a property on node 0
  cancel <timer>               clear a timer
  tick <ms>                    advance the clock and run due timers
  drain                        host: drain and print the pending batch
  ack                          host: acknowledge the drained batch
  flush                        drain then ack
  teardown                     destroy the context
  stats                        print counters
  help | quit";

/// Log records from the library go through the `log` bridge of the subscriber
fn init_logging(verbosity: usize) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("UIBRIDGE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    // Only fails if a global subscriber is already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Host that prints what it applies
struct PrintHost;

impl HostBridge for PrintHost {
    fn apply(&mut self, context_id: ContextId, batch: &CommandBatch) {
        print_batch(context_id, batch);
    }

    fn invoke(
        &mut self,
        _context_id: ContextId,
        _target: TargetId,
        method: &str,
        _args: &[NativeValue],
    ) -> Result<NativeValue, ScriptError> {
        Err(ScriptError::new(format!("{}: no host methods in the shell", method)))
    }
}

fn print_batch(context_id: ContextId, batch: &CommandBatch) {
    if batch.is_empty() {
        println!("(empty batch)");
        return;
    }
    let mut out = String::new();
    for (offset, command) in batch.iter().enumerate() {
        let _ = writeln!(
            out,
            "{} #{:<4} {}",
            context_id,
            batch.first_seq() + offset as u64,
            command
        );
    }
    print!("{}", out);
}

struct Shell {
    manager: ContextManager,
    flush_requests: FlushReceiver,
    context: ContextId,
    nodes: BTreeMap<TargetId, NativeHandle>,
    line: Regex,
}

impl Shell {
    fn new() -> Result<Self, String> {
        let line = Regex::new(r"^\s*(\w+)(?:\s+(.*?))?\s*$").map_err(|e| e.to_string())?;
        let (signal, flush_requests) = flush_channel();
        let manager = ContextManager::new(signal);
        let context = manager
            .create(NullEngine::boxed())
            .map_err(|e: BridgeError| e.to_string())?;
        Ok(Shell {
            manager,
            flush_requests,
            context,
            nodes: BTreeMap::new(),
            line,
        })
    }

    /// Run one line; returns false on `quit`
    fn execute(&mut self, input: &str) -> bool {
        let Some(caps) = self.line.captures(input) else {
            return true;
        };
        let command = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());
        let args: Vec<&str> = rest.split_whitespace().collect();

        let result = match command {
            "quit" | "exit" => return false,
            "help" => {
                println!("{}", HELP);
                Ok(())
            }
            _ => self.dispatch(command, rest, &args),
        };
        if let Err(err) = result {
            println!("error: {}", err);
        }
        self.report_flush_requests();
        true
    }

    fn dispatch(&mut self, command: &str, rest: &str, args: &[&str]) -> Result<(), String> {
        let id = self.context;
        match (command, args) {
            ("create", [tag]) => {
                let tag = tag.to_string();
                let (target, native) = self
                    .manager
                    .with_context(id, |ctx| ctx.create_element(&tag))
                    .map_err(|e| e.to_string())?;
                self.nodes.insert(target, native);
                println!("node {} ({})", target, native);
            }
            ("text", [_, ..]) => {
                let data = rest.to_string();
                let (target, native) = self
                    .manager
                    .with_context(id, |ctx| {
                        let native = ctx.create_native(NativeObject::text(data.as_str()))?;
                        let target = ctx.allocate_target_id();
                        ctx.append_command(Command::create_text_node(target, &data, native))?;
                        Ok((target, native))
                    })
                    .map_err(|e| e.to_string())?;
                self.nodes.insert(target, native);
                println!("node {} ({})", target, native);
            }
            ("set" | "style", [target, key, value @ ..]) if !value.is_empty() => {
                let target = parse_target(target)?;
                let value = value.join(" ");
                let cmd = if command == "set" {
                    Command::set_property(target, key, &value)
                } else {
                    Command::set_style(target, key, &value)
                };
                self.append(cmd)?;
            }
            ("remove", [target]) => {
                let target = parse_target(target)?;
                self.append(Command::remove_node(target))?;
            }
            ("dispose", [target]) => {
                let target = parse_target(target)?;
                let native = self
                    .nodes
                    .remove(&target)
                    .ok_or_else(|| format!("no node {}", target))?;
                self.manager
                    .with_context(id, |ctx| ctx.dispose_event_target(target, native))
                    .map_err(|e| e.to_string())?;
            }
            ("timeout" | "interval", [ms]) => {
                let ms = parse_number(ms)?;
                let repeating = command == "interval";
                let timer = self
                    .manager
                    .with_context(id, |ctx| {
                        let mut runs = 0u64;
                        ctx.schedule_timer(
                            ms,
                            repeating,
                            Box::new(move |ctx| {
                                runs += 1;
                                let value = runs.to_string();
                                ctx.append_command(Command::set_property(0, "timer", &value))?;
                                Ok(())
                            }),
                        )
                    })
                    .map_err(|e| e.to_string())?;
                println!("{}", timer);
            }
            ("cancel", [timer]) => {
                let timer = TimerId::from_raw(parse_number(timer)?);
                let cancelled = self
                    .manager
                    .with_context(id, |ctx| Ok(ctx.clear_timer(timer)))
                    .map_err(|e| e.to_string())?;
                println!("{}", if cancelled { "cancelled" } else { "no such timer" });
            }
            ("tick", [ms]) => {
                let ms = parse_number(ms)?;
                let ran = self
                    .manager
                    .with_context(id, |ctx| {
                        let now = ctx.now_ms() + ms;
                        ctx.run_due_timers(now)
                    })
                    .map_err(|e| e.to_string())?;
                println!("{} timer(s) fired", ran);
            }
            ("drain", []) => {
                let batch = self.manager.drain(id);
                print_batch(id, &batch);
            }
            ("ack", []) => {
                let report = self.manager.acknowledge(id).map_err(|e| e.to_string())?;
                println!("released {} native(s)", report.released);
            }
            ("flush", []) => {
                let report = self
                    .manager
                    .flush(id, &mut PrintHost)
                    .map_err(|e| e.to_string())?;
                println!("released {} native(s)", report.released);
            }
            ("teardown", []) => {
                let report = self
                    .manager
                    .destroy(id, &mut PrintHost)
                    .map_err(|e| e.to_string())?;
                self.nodes.clear();
                println!("{:#?}", report);
            }
            ("stats", []) => {
                let stats = self
                    .manager
                    .with_context(id, |ctx| Ok(ctx.stats()))
                    .map_err(|e| e.to_string())?;
                println!("{} {:#?}", id, stats);
            }
            _ => return Err(format!("bad command `{}`, try `help`", command)),
        }
        Ok(())
    }

    fn append(&self, command: Command) -> Result<(), String> {
        self.manager
            .with_context(self.context, |ctx| ctx.append_command(command))
            .map(|seq| println!("#{}", seq))
            .map_err(|e| e.to_string())
    }

    fn report_flush_requests(&self) {
        for request in self.flush_requests.pending() {
            println!(
                "flush requested for {}{}",
                request.context_id,
                if request.dedicated { " (dedicated)" } else { "" }
            );
        }
    }
}

fn parse_target(text: &str) -> Result<TargetId, String> {
    text.parse().map_err(|_| format!("bad node id `{}`", text))
}

fn parse_number(text: &str) -> Result<u64, String> {
    text.parse().map_err(|_| format!("bad number `{}`", text))
}

fn main() {
    let mut verbosity = 0;
    let mut script = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-v" => verbosity += 1,
            "-vv" => verbosity += 2,
            _ => script = Some(arg),
        }
    }
    init_logging(verbosity);

    let mut shell = match Shell::new() {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match script {
        Some(filename) => run_file(&mut shell, &filename),
        None => run_repl(&mut shell),
    }
}

fn run_file(shell: &mut Shell, filename: &str) {
    let source = match std::fs::read_to_string(filename) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", filename, e);
            std::process::exit(1);
        }
    };

    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        println!("> {}", line);
        if !shell.execute(line) {
            break;
        }
    }
}

fn run_repl(shell: &mut Shell) {
    println!("UIBridge shell, context {}", shell.context);
    println!("Type `help` for commands, Ctrl+D to exit.\n");

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error starting line editor: {}", e);
            std::process::exit(1);
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                if !shell.execute(&line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                log::error!("reading input: {}", e);
                break;
            }
        }
    }
}
