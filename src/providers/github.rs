//! GitHub Actions runner protocol.
//!
//! Inputs arrive as `INPUT_<NAME>` environment variables. Everything going
//! back to the runner is either a workflow command printed to stdout
//! (`::add-mask::`, `::error::`) or a heredoc block appended to the files
//! named by `GITHUB_ENV` and `GITHUB_OUTPUT`.

use crate::runner::{ExportSink, InputSource};
use crate::{ActionError, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

const ENV_FILE: &str = "GITHUB_ENV";
const OUTPUT_FILE: &str = "GITHUB_OUTPUT";

/// The GitHub Actions runner, seen from inside a step.
pub struct GithubRunner {
    vars: HashMap<String, String>,
    env_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    stdout: Mutex<Box<dyn Write + Send>>,
}

impl GithubRunner {
    /// Snapshots the process environment and writes commands to stdout.
    pub fn from_env() -> Self {
        Self::new(std::env::vars().collect(), Box::new(std::io::stdout()))
    }

    /// Creates a runner over an explicit environment and command stream.
    pub fn new(vars: HashMap<String, String>, stdout: Box<dyn Write + Send>) -> Self {
        let file = |name: &str| {
            vars.get(name)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
        };
        let env_file = file(ENV_FILE);
        let output_file = file(OUTPUT_FILE);

        Self {
            vars,
            env_file,
            output_file,
            stdout: Mutex::new(stdout),
        }
    }

    fn issue(&self, command: &str, properties: &[(&str, &str)], message: &str) -> Result<()> {
        let line = format_command(command, properties, message);
        let mut stdout = self.stdout.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }
}

fn input_variable(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

/// Renders `::command key=value,...::message`.
pub fn format_command(command: &str, properties: &[(&str, &str)], message: &str) -> String {
    let mut line = format!("::{command}");
    if !properties.is_empty() {
        line.push(' ');
        let rendered: Vec<String> = properties
            .iter()
            .map(|(key, value)| format!("{key}={}", escape_property(value)))
            .collect();
        line.push_str(&rendered.join(","));
    }
    line.push_str("::");
    line.push_str(&escape_data(message));
    line
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

/// Renders a `NAME<<delimiter` heredoc block for a file command.
///
/// # Errors
///
/// Fails if the delimiter occurs in the name or the value.
fn heredoc(name: &str, value: &str, delimiter: &str) -> Result<String> {
    if name.contains(delimiter) {
        return Err(ActionError::Other(anyhow::anyhow!(
            "Unexpected input: name should not contain the delimiter \"{delimiter}\""
        )));
    }
    if value.contains(delimiter) {
        return Err(ActionError::Other(anyhow::anyhow!(
            "Unexpected input: value should not contain the delimiter \"{delimiter}\""
        )));
    }
    Ok(format!("{name}<<{delimiter}\n{value}\n{delimiter}\n"))
}

fn append_file_command(path: &Path, name: &str, value: &str) -> Result<()> {
    let delimiter = format!("ghadelimiter_{}", Uuid::new_v4());
    let block = heredoc(name, value, &delimiter)?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(block.as_bytes())?;
    Ok(())
}

impl InputSource for GithubRunner {
    fn input(&self, name: &str) -> Option<String> {
        self.env(&input_variable(name))
    }

    fn env(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

impl ExportSink for GithubRunner {
    fn set_secret(&self, value: &str) -> Result<()> {
        self.issue("add-mask", &[], value)
    }

    fn export_variable(&self, name: &str, value: &str) -> Result<()> {
        match self.env_file {
            Some(ref path) => append_file_command(path, name, value),
            None => self.issue("set-env", &[("name", name)], value),
        }
    }

    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        match self.output_file {
            Some(ref path) => append_file_command(path, name, value),
            None => self.issue("set-output", &[("name", name)], value),
        }
    }

    fn set_failed(&self, message: &str) {
        let _ = self.issue("error", &[], message);
    }

    fn error_detail(&self, detail: &str) {
        let mut stdout = self.stdout.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(stdout, "{detail}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn runner(vars: &[(&str, &str)]) -> (GithubRunner, Captured) {
        let captured = Captured::default();
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        (GithubRunner::new(vars, Box::new(captured.clone())), captured)
    }

    #[test]
    fn test_inputs_are_read_from_env() {
        let (runner, _) = runner(&[
            ("INPUT_AWS-REGION", " us-east-1 "),
            ("INPUT_ROLE-TO-ASSUME", ""),
            ("INPUT_MY_INPUT", "spaced"),
        ]);

        assert_eq!(runner.input("aws-region").as_deref(), Some("us-east-1"));
        assert_eq!(runner.input("role-to-assume"), None);
        assert_eq!(runner.input("my input").as_deref(), Some("spaced"));
        assert_eq!(runner.input("aws-session-token"), None);
    }

    #[test]
    fn test_mask_and_fail_commands() {
        let (runner, captured) = runner(&[]);

        runner.set_secret("line1\nline2%").unwrap();
        runner.set_failed("Region is not valid: $AWS_REGION");

        assert_eq!(
            captured.text(),
            "::add-mask::line1%0Aline2%25\n::error::Region is not valid: $AWS_REGION\n"
        );
    }

    #[test]
    fn test_legacy_commands_without_files() {
        let (runner, captured) = runner(&[]);

        runner.export_variable("AWS_REGION", "us-east-1").unwrap();
        runner.set_output("aws-account-id", "123456789012").unwrap();

        assert_eq!(
            captured.text(),
            "::set-env name=AWS_REGION::us-east-1\n::set-output name=aws-account-id::123456789012\n"
        );
    }

    #[test]
    fn test_property_escaping() {
        assert_eq!(
            format_command("set-env", &[("name", "a:b,c")], "v"),
            "::set-env name=a%3Ab%2Cc::v"
        );
    }

    #[test]
    fn test_file_commands() {
        let dir = tempdir().unwrap();
        let env_file = dir.path().join("env");
        let output_file = dir.path().join("output");
        let (runner, captured) = runner(&[
            ("GITHUB_ENV", env_file.to_str().unwrap()),
            ("GITHUB_OUTPUT", output_file.to_str().unwrap()),
        ]);

        runner.export_variable("AWS_REGION", "us-east-1").unwrap();
        runner.export_variable("AWS_SESSION_TOKEN", "").unwrap();
        runner.set_output("aws-account-id", "123456789012").unwrap();

        let env = std::fs::read_to_string(&env_file).unwrap();
        let lines: Vec<&str> = env.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("AWS_REGION<<ghadelimiter_"));
        assert_eq!(lines[1], "us-east-1");
        assert_eq!(lines[2], &lines[0]["AWS_REGION<<".len()..]);
        assert!(lines[3].starts_with("AWS_SESSION_TOKEN<<ghadelimiter_"));
        assert_eq!(lines[4], "");

        let output = std::fs::read_to_string(&output_file).unwrap();
        assert!(output.starts_with("aws-account-id<<ghadelimiter_"));
        assert!(output.contains("\n123456789012\n"));

        assert_eq!(captured.text(), "");
    }

    #[test]
    fn test_delimiter_collision() {
        let err = heredoc("NAME", "x ghadelimiter_1 y", "ghadelimiter_1").unwrap_err();
        assert!(err
            .to_string()
            .contains("value should not contain the delimiter"));

        let err = heredoc("ghadelimiter_1", "x", "ghadelimiter_1").unwrap_err();
        assert!(err
            .to_string()
            .contains("name should not contain the delimiter"));
    }
}
