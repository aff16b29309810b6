//! Apply the pre-create hooks to a batch of import users.
//!
//! Input is either a JSON array of user records or one record per line.
//! A failing user is reported and left out of the result; the rest of the
//! batch is still processed.

use dllp_core::import_hook::{run_pre_create, ImportUser, InitialisationError, UserHook};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Invalid import user list: {0}")]
    InvalidArray(#[source] serde_json::Error),

    #[error("Invalid import user on line {line}: {source}")]
    InvalidLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A user the hooks rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position of the user in the input, starting at 0.
    pub index: usize,
    pub name: Option<String>,
    pub error: InitialisationError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub users: Vec<ImportUser>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Parse a JSON array or JSON lines into import users.
pub fn parse_users(input: &str) -> Result<Vec<ImportUser>, BatchError> {
    if input.trim_start().starts_with('[') {
        return serde_json::from_str(input).map_err(BatchError::InvalidArray);
    }

    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| BatchError::InvalidLine {
                line: i + 1,
                source,
            })
        })
        .collect()
}

/// Run `hooks` on every user.
pub async fn run_batch(hooks: &[&dyn UserHook], users: Vec<ImportUser>) -> BatchReport {
    let mut report = BatchReport::default();
    for (index, mut user) in users.into_iter().enumerate() {
        match run_pre_create(hooks, &mut user).await {
            Ok(()) => report.users.push(user),
            Err(error) => {
                tracing::error!(index, name = ?user.name, %error, "Import user rejected");
                report.failures.push(BatchFailure {
                    index,
                    name: user.name,
                    error,
                });
            }
        }
    }
    tracing::info!(
        succeeded = report.users.len(),
        failed = report.failures.len(),
        "Import batch finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use dllp_core::import_hook::DllpAutomation;
    use dllp_core::registry::ConfigRegistry;
    use serde_json::json;

    fn hook() -> DllpAutomation {
        DllpAutomation::new(ConfigRegistry::from_pairs([
            ("DLLP/gym1/users/lehrer/ox/enabled", "true"),
            ("DLLP/gym1/users/lehrer/ox/context", "10"),
            ("DLLP/gym1/users/lehrer/ox/quota", "2048"),
        ]))
    }

    #[test]
    fn parses_array_and_lines() {
        let array = r#"[{"school": "gym1", "roles": ["teacher"]}, {"school": "gym2"}]"#;
        assert_eq!(parse_users(array).unwrap().len(), 2);

        let lines = "{\"school\": \"gym1\"}\n\n{\"school\": \"gym2\", \"record_uid\": \"42\"}\n";
        let users = parse_users(lines).unwrap();
        assert_eq!(users[1].school, "gym2");
        assert_eq!(users[1].extra["record_uid"], "42");
    }

    #[test]
    fn bad_line_reports_line_number() {
        let err = parse_users("{\"school\": \"a\"}\nnot json\n").unwrap_err();
        assert_matches!(err, BatchError::InvalidLine { line: 2, .. });
    }

    #[tokio::test]
    async fn failing_user_does_not_stop_batch() {
        let users = parse_users(
            r#"[
                {"name": "nomail", "school": "gym1", "roles": ["teacher"]},
                {"name": "jdoe", "school": "gym1", "roles": ["teacher"], "email": "jdoe@dllp.schule"}
            ]"#,
        )
        .unwrap();
        let hook = hook();

        let report = run_batch(&[&hook], users).await;

        assert!(!report.succeeded());
        assert_eq!(
            report.failures,
            [BatchFailure {
                index: 0,
                name: Some("nomail".into()),
                error: InitialisationError::EmailMissing,
            }]
        );
        assert_eq!(report.users.len(), 1);
        assert_eq!(
            serde_json::Value::Object(report.users[0].udm_properties.clone()),
            json!({"mailUserQuota": 2048, "isOxUser": true, "oxContext": 10})
        );
    }
}
