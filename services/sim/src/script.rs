//! Interpretation of `sh -c` scripts.
//!
//! The simulator runs nothing. It reads a handful of commands out of the
//! script to decide how a task or instance behaves: `sleep S` delays,
//! `exit N` and `false` fail, `echo` produces output. Anything else is
//! treated as a command that succeeds immediately.

use std::time::Duration;

use converge_events::RunAction;

/// What running a script would do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutcome {
    /// Exit status of an explicit `exit`/`false`; `None` if the script never exits on its own.
    pub exit_status: Option<i32>,

    /// Total time spent in `sleep` before the exit (or forever after, for instances).
    /// Saturates at `Duration::MAX`.
    pub sleep: Duration,

    /// Words of the first `echo`, quotes removed.
    pub output: Option<String>,
}

impl ScriptOutcome {
    /// Interpret a run action. Non-shell actions succeed immediately.
    pub fn of(action: &RunAction) -> Self {
        action.script().map(Self::parse).unwrap_or_default()
    }

    pub fn parse(script: &str) -> Self {
        let mut outcome = ScriptOutcome::default();

        for command in split_commands(script) {
            let mut words = command.split_whitespace();
            let Some(program) = words.next() else {
                continue;
            };
            match program {
                "exit" => {
                    let status = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
                    outcome.exit_status = Some(status);
                    break;
                }
                "false" => {
                    outcome.exit_status = Some(1);
                    break;
                }
                "sleep" => {
                    let secs = words
                        .next()
                        .and_then(|w| w.parse::<f64>().ok())
                        .filter(|s| s.is_finite() && *s >= 0.0)
                        .unwrap_or(0.0);
                    let slept = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
                    outcome.sleep = outcome.sleep.saturating_add(slept);
                }
                "echo" if outcome.output.is_none() => {
                    let text: Vec<&str> = words.take_while(|w| !w.starts_with('>')).collect();
                    outcome.output = Some(text.join(" ").replace(['"', '\''], ""));
                }
                _ => {}
            }
        }

        outcome
    }

    /// Exit status for a task: scripts that never exit explicitly succeed.
    pub fn task_status(&self) -> i32 {
        self.exit_status.unwrap_or(0)
    }

    /// Returns true if an instance running this script would exit and crash.
    pub fn crashes(&self) -> bool {
        self.exit_status.is_some()
    }
}

/// Split on `;`, `&&`, `||` and newlines.
fn split_commands(script: &str) -> impl Iterator<Item = &str> {
    script
        .split(['\n', ';'])
        .flat_map(|part| part.split("&&"))
        .flat_map(|part| part.split("||"))
        .map(str::trim)
        .filter(|part| !part.is_empty())
}
