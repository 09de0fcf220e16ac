//! Publishing credentials to the job environment.
//!
//! An [`ExportRecord`] is the full, ordered list of what one credential set
//! writes to the runner. Applying it registers every sensitive value for
//! masking before the first publish call, so no secret can reach the job log
//! unmasked regardless of how entries share values.

use crate::credentials::CredentialSet;
use crate::runner::ExportSink;
use crate::Result;
use tracing::debug;

/// Environment variables published to later steps.
pub mod vars {
    pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
    pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
    pub const REGION: &str = "AWS_REGION";
    pub const DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
}

/// Step output carrying the final account id.
pub const ACCOUNT_ID_OUTPUT: &str = "aws-account-id";

/// Where an entry is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Environment variable for subsequent steps
    Variable,
    /// Step output
    Output,
}

/// One value to publish.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub destination: Destination,
    pub name: &'static str,
    pub value: String,
    /// Masked before anything in the record is published
    pub sensitive: bool,
}

impl ExportEntry {
    fn variable(name: &'static str, value: impl Into<String>, sensitive: bool) -> Self {
        Self {
            destination: Destination::Variable,
            name,
            value: value.into(),
            sensitive,
        }
    }

    fn output(name: &'static str, value: impl Into<String>, sensitive: bool) -> Self {
        Self {
            destination: Destination::Output,
            name,
            value: value.into(),
            sensitive,
        }
    }
}

impl std::fmt::Debug for ExportEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value: &str = if self.sensitive {
            "** redacted **"
        } else {
            &self.value
        };
        f.debug_struct("ExportEntry")
            .field("destination", &self.destination)
            .field("name", &self.name)
            .field("value", &value)
            .field("sensitive", &self.sensitive)
            .finish()
    }
}

/// Ordered export plan for one credential set.
///
/// Built once and consumed by [`ExportRecord::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportRecord {
    entries: Vec<ExportEntry>,
}

impl ExportRecord {
    /// Plan for the base phase.
    ///
    /// Region variables come first and are never masked. Credentials, when
    /// present, follow. A base set without a session token publishes an empty
    /// token only when `clear_stale_token` is set (an old `AWS_SESSION_TOKEN`
    /// is visible to the job). The account id output is last.
    pub fn base(
        region: &str,
        credentials: Option<&CredentialSet>,
        account_id: Option<&str>,
        clear_stale_token: bool,
        mask_account_id: bool,
    ) -> Self {
        let mut entries = vec![
            ExportEntry::variable(vars::DEFAULT_REGION, region, false),
            ExportEntry::variable(vars::REGION, region, false),
        ];

        if let Some(credentials) = credentials {
            push_credentials(&mut entries, credentials, clear_stale_token);
        }

        if let Some(account_id) = account_id {
            entries.push(ExportEntry::output(
                ACCOUNT_ID_OUTPUT,
                account_id,
                mask_account_id,
            ));
        }

        Self { entries }
    }

    /// Plan for the role phase.
    ///
    /// The session token is always published, as an empty string when the
    /// role credentials have none, so a stale base token never survives.
    pub fn role(credentials: &CredentialSet, account_id: &str, mask_account_id: bool) -> Self {
        let mut entries = Vec::with_capacity(4);
        push_credentials(&mut entries, credentials, true);
        entries.push(ExportEntry::output(
            ACCOUNT_ID_OUTPUT,
            account_id,
            mask_account_id,
        ));
        Self { entries }
    }

    pub fn entries(&self) -> &[ExportEntry] {
        &self.entries
    }

    /// Masks every non-empty sensitive value, then publishes every entry.
    ///
    /// # Errors
    ///
    /// Returns the first sink error. Entries after the failure are not
    /// published.
    pub fn apply(self, sink: &dyn ExportSink) -> Result<()> {
        for entry in &self.entries {
            if entry.sensitive && !entry.value.is_empty() {
                sink.set_secret(&entry.value)?;
            }
        }

        for entry in &self.entries {
            debug!(name = entry.name, destination = ?entry.destination, "Publishing");
            match entry.destination {
                Destination::Variable => sink.export_variable(entry.name, &entry.value)?,
                Destination::Output => sink.set_output(entry.name, &entry.value)?,
            }
        }

        Ok(())
    }
}

fn push_credentials(
    entries: &mut Vec<ExportEntry>,
    credentials: &CredentialSet,
    clear_token: bool,
) {
    entries.push(ExportEntry::variable(
        vars::ACCESS_KEY_ID,
        credentials.access_key_id.as_str(),
        true,
    ));
    entries.push(ExportEntry::variable(
        vars::SECRET_ACCESS_KEY,
        credentials.secret_access_key.as_str(),
        true,
    ));

    let session_token = match credentials.session_token {
        Some(ref token) => ExportEntry::variable(vars::SESSION_TOKEN, token.as_str(), true),
        None if clear_token => ExportEntry::variable(vars::SESSION_TOKEN, "", false),
        None => return,
    };
    entries.push(session_token);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Mask(String),
        Var(String, String),
        Out(String, String),
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Call>>);

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, f: fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|c| f(c)).count()
        }

        fn record(&self, call: Call) -> Result<()> {
            self.0.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl ExportSink for Recorder {
        fn set_secret(&self, value: &str) -> Result<()> {
            self.record(Call::Mask(value.to_string()))
        }

        fn export_variable(&self, name: &str, value: &str) -> Result<()> {
            self.record(Call::Var(name.to_string(), value.to_string()))
        }

        fn set_output(&self, name: &str, value: &str) -> Result<()> {
            self.record(Call::Out(name.to_string(), value.to_string()))
        }

        fn set_failed(&self, _message: &str) {}

        fn error_detail(&self, _detail: &str) {}
    }

    const REGION: &str = "us-east-1";
    const ACCOUNT: &str = "123456789012";

    fn assert_masked_before_published(calls: &[Call]) {
        for (i, call) in calls.iter().enumerate() {
            let value = match call {
                Call::Var(_, v) | Call::Out(_, v) => v,
                Call::Mask(_) => continue,
            };
            let masked_later = calls[i..].iter().any(|c| *c == Call::Mask(value.clone()));
            let masked_before = calls[..i].iter().any(|c| *c == Call::Mask(value.clone()));
            assert!(!masked_later || masked_before, "{value} published before masking");
        }
    }

    #[test]
    fn test_static_triple() {
        let creds = CredentialSet::new("AKID", "SECRET", Some("TOKEN".to_string()));
        let sink = Recorder::default();

        let record = ExportRecord::base(REGION, Some(&creds), Some(ACCOUNT), false, true);
        record.apply(&sink).unwrap();

        let calls = sink.calls();
        assert_eq!(sink.count(|c| matches!(c, Call::Mask(_))), 4);
        assert_eq!(sink.count(|c| matches!(c, Call::Var(..))), 5);
        assert_eq!(sink.count(|c| matches!(c, Call::Out(..))), 1);
        assert_eq!(
            calls[4..7],
            [
                Call::Var("AWS_DEFAULT_REGION".into(), "us-east-1".into()),
                Call::Var("AWS_REGION".into(), "us-east-1".into()),
                Call::Var("AWS_ACCESS_KEY_ID".into(), "AKID".into()),
            ]
        );
        assert_masked_before_published(&calls);
    }

    #[test]
    fn test_stale_token_is_cleared() {
        let creds = CredentialSet::new("AKID", "SECRET", None);

        let without = ExportRecord::base("us-east-1", Some(&creds), None, false, true);
        assert_eq!(without.entries().len(), 4);

        let with = ExportRecord::base("us-east-1", Some(&creds), None, true, true);
        let last = with.entries().last().unwrap();
        assert_eq!(last.name, vars::SESSION_TOKEN);
        assert_eq!(last.value, "");
        assert!(!last.sensitive);
    }

    #[test]
    fn test_ambient_only() {
        let sink = Recorder::default();

        ExportRecord::base("eu-west-1", None, Some("123456789012"), false, true)
            .apply(&sink)
            .unwrap();

        assert_eq!(
            sink.calls(),
            [
                Call::Mask("123456789012".into()),
                Call::Var("AWS_DEFAULT_REGION".into(), "eu-west-1".into()),
                Call::Var("AWS_REGION".into(), "eu-west-1".into()),
                Call::Out("aws-account-id".into(), "123456789012".into()),
            ]
        );
    }

    #[test]
    fn test_account_masking_can_be_disabled() {
        let creds = CredentialSet::new("AKID", "SECRET", None);
        let sink = Recorder::default();

        let record = ExportRecord::base(REGION, Some(&creds), Some(ACCOUNT), false, false);
        record.apply(&sink).unwrap();

        assert_eq!(sink.count(|c| matches!(c, Call::Mask(_))), 2);
        assert!(!sink.calls().contains(&Call::Mask(ACCOUNT.into())));
    }

    #[test]
    fn test_two_phase_role_export() {
        let base = CredentialSet::new("AKID", "SECRET", None);
        let role = CredentialSet::new("ROLE-KEY", "ROLE-SECRET", Some("ROLE-TOKEN".into()));
        let sink = Recorder::default();

        let record = ExportRecord::base(REGION, Some(&base), Some(ACCOUNT), false, true);
        record.apply(&sink).unwrap();
        ExportRecord::role(&role, "111111111111", true)
            .apply(&sink)
            .unwrap();

        let calls = sink.calls();
        assert_eq!(sink.count(|c| matches!(c, Call::Mask(_))), 7);
        assert_eq!(sink.count(|c| matches!(c, Call::Var(..))), 7);
        let outputs: Vec<&str> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Out(_, v) => Some(v.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(outputs, [ACCOUNT, "111111111111"]);
        assert_masked_before_published(&calls);
    }

    #[test]
    fn test_role_without_token_publishes_empty() {
        let role = CredentialSet::new("ROLE-KEY", "ROLE-SECRET", None);
        let record = ExportRecord::role(&role, "111111111111", true);

        let token = &record.entries()[2];
        assert_eq!(token.name, vars::SESSION_TOKEN);
        assert_eq!(token.value, "");
    }

    #[test]
    fn test_debug_redacts_sensitive_values() {
        let creds = CredentialSet::new("AKIDVISIBLE", "SECRETVISIBLE", None);
        let record = ExportRecord::base("us-east-1", Some(&creds), None, false, true);

        let rendered = format!("{record:?}");
        assert!(!rendered.contains("VISIBLE"));
        assert!(rendered.contains("us-east-1"));
    }
}
