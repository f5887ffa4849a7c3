use std::collections::VecDeque;
use std::ffi::OsString;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::command::{CommandOutput, CommandRunner};
use crate::error::ToolError;

#[derive(Clone)]
enum Scripted {
    Output(CommandOutput),
    Timeout,
}

struct Rule {
    program: String,
    /// Only matches invocations carrying this exact argument.
    arg: Option<String>,
    responses: VecDeque<Scripted>,
}

/// `CommandRunner` returning canned output.
///
/// Responses for a rule are consumed in order; the last one repeats.
/// Rules with an argument filter win over program-only rules.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    rules: Arc<Mutex<Vec<Rule>>>,
    invocations: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, program: &str, output: CommandOutput) {
        self.push(program, None, Scripted::Output(output));
    }

    /// Responds only to invocations of `program` that include `arg`.
    pub fn respond_to(&self, program: &str, arg: &str, output: CommandOutput) {
        self.push(program, Some(arg), Scripted::Output(output));
    }

    pub fn time_out(&self, program: &str) {
        self.push(program, None, Scripted::Timeout);
    }

    fn push(&self, program: &str, arg: Option<&str>, response: Scripted) {
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| r.program == program && r.arg.as_deref() == arg)
        {
            rule.responses.push_back(response);
            return;
        }
        rules.push(Rule {
            program: program.to_string(),
            arg: arg.map(str::to_string),
            responses: VecDeque::from([response]),
        });
    }

    /// Every invocation so far as `program arg1 arg2 ...`.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self, program: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.split(' ').next() == Some(program))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ToolError> {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let mut line = program.to_string();
        for arg in &args {
            line.push(' ');
            line.push_str(arg);
        }
        self.invocations.lock().unwrap().push(line.clone());

        let response = {
            let mut rules = self.rules.lock().unwrap();
            let index = rules
                .iter()
                .position(|r| {
                    r.program == program
                        && r.arg.as_ref().map(|a| args.contains(a)).unwrap_or(false)
                })
                .or_else(|| {
                    rules
                        .iter()
                        .position(|r| r.program == program && r.arg.is_none())
                });
            match index {
                Some(index) => {
                    let responses = &mut rules[index].responses;
                    if responses.len() > 1 {
                        responses.pop_front()
                    } else {
                        responses.front().cloned()
                    }
                }
                None => None,
            }
        };

        match response {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Timeout) => Err(ToolError::Timeout {
                program: program.to_string(),
                seconds: 0,
            }),
            None => Err(ToolError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted response for: {}", line),
                ),
            }),
        }
    }
}
