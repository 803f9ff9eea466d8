//! Shared harness for the CLI smoke tests: spawns the built `imgr` binary
//! and captures the exchange in an assertable form.

use std::process::Command;

use serde_json::Value;

pub struct CmdResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Parse stdout as a single JSON document.
    pub fn stdout_json(&self) -> Value {
        serde_json::from_str(self.stdout.trim())
            .unwrap_or_else(|e| panic!("stdout is not valid JSON ({e})\n{}", self.transcript()))
    }

    /// Full exchange, for assertion failure messages.
    pub fn transcript(&self) -> String {
        format!(
            "exit code: {:?}\n--- stdout ---\n{}--- stderr ---\n{}",
            self.code, self.stdout, self.stderr
        )
    }
}

pub fn imgr(args: &[&str]) -> CmdResult {
    imgr_with_env(args, &[])
}

pub fn imgr_with_env(args: &[&str], envs: &[(&str, &str)]) -> CmdResult {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_imgr"));
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = cmd.output().expect("spawn imgr");
    CmdResult {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
