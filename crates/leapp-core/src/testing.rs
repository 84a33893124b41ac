use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;

use crate::{CommandOutput, CommandRunner};

type Matcher = Box<dyn Fn(&[String]) -> bool>;

enum Response {
    Output(CommandOutput),
    SpawnError,
}

#[derive(Default)]
pub struct ScriptedRunner {
    calls: RefCell<Vec<Vec<String>>>,
    rules: Vec<(Matcher, Response)>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_when<F>(mut self, matcher: F, exit_code: i32, stderr: &str) -> Self
    where
        F: Fn(&[String]) -> bool + 'static,
    {
        self.rules.push((
            Box::new(matcher),
            Response::Output(CommandOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
        ));
        self
    }

    pub fn stdout_when<F>(mut self, matcher: F, stdout: &str) -> Self
    where
        F: Fn(&[String]) -> bool + 'static,
    {
        self.rules.push((
            Box::new(matcher),
            Response::Output(CommandOutput {
                exit_code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        ));
        self
    }

    pub fn missing_binary_when<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + 'static,
    {
        self.rules.push((Box::new(matcher), Response::SpawnError));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .filter(|argv| argv.first().is_some_and(|first| first == program))
            .cloned()
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn execute(&self, argv: &[String], _env: &BTreeMap<String, String>) -> io::Result<CommandOutput> {
        self.calls.borrow_mut().push(argv.to_vec());
        for (matcher, response) in &self.rules {
            if matcher(argv) {
                return match response {
                    Response::Output(output) => Ok(output.clone()),
                    Response::SpawnError => Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        "No such file or directory",
                    )),
                };
            }
        }
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

pub fn argv_contains(argv: &[String], needle: &str) -> bool {
    argv.iter().any(|part| part == needle)
}
