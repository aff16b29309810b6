//! [`DirectoryService`] backed by the `udm` and `univention-ldapsearch`
//! command-line tools.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dllp_core::ldap_filter::eq_filter;
use tokio::process::Command;

use crate::command::run_command;
use crate::{DirectoryError, DirectoryService, DirectoryUser, UserChanges};

pub const DEFAULT_UDM_BIN: &str = "udm";
pub const DEFAULT_LDAPSEARCH_BIN: &str = "univention-ldapsearch";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// UDM module holding user accounts.
const USER_MODULE: &str = "users/user";

/// Placeholder UDM prints for properties without a value.
const UDM_EMPTY_VALUE: &str = "None";

/// Runs the UCS command-line tools as subprocesses.
#[derive(Debug, Clone)]
pub struct UdmCli {
    udm_bin: String,
    ldapsearch_bin: String,
    timeout: Duration,
}

impl Default for UdmCli {
    fn default() -> Self {
        Self::new(
            DEFAULT_UDM_BIN.to_string(),
            DEFAULT_LDAPSEARCH_BIN.to_string(),
            DEFAULT_COMMAND_TIMEOUT,
        )
    }
}

impl UdmCli {
    pub fn new(udm_bin: String, ldapsearch_bin: String, timeout: Duration) -> Self {
        Self {
            udm_bin,
            ldapsearch_bin,
            timeout,
        }
    }
}

#[async_trait]
impl DirectoryService for UdmCli {
    async fn find_users_by_uid(&self, uid: &str) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let filter = eq_filter("uid", uid);
        let mut cmd = Command::new(&self.udm_bin);
        cmd.args([USER_MODULE, "list", "--filter", filter.as_str()]);

        let output = run_command(&self.udm_bin, &mut cmd, self.timeout).await?;
        let users = parse_udm_list(&output.stdout);
        tracing::debug!(
            %filter,
            found = users.len(),
            duration_ms = output.duration_ms,
            "Looked up directory users"
        );
        Ok(users)
    }

    async fn entry_uuid(&self, dn: &str) -> Result<String, DirectoryError> {
        let mut cmd = Command::new(&self.ldapsearch_bin);
        cmd.args(["-LLL", "-b", dn, "-s", "base", "entryUUID"]);

        let output = run_command(&self.ldapsearch_bin, &mut cmd, self.timeout).await?;
        ldif_attribute(&output.stdout, "entryUUID").ok_or_else(|| DirectoryError::MissingEntryUuid {
            dn: dn.to_string(),
        })
    }

    async fn modify_user(&self, dn: &str, changes: &UserChanges) -> Result<(), DirectoryError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut cmd = Command::new(&self.udm_bin);
        cmd.args([USER_MODULE, "modify", "--dn", dn]);
        for (property, value) in &changes.set {
            cmd.arg("--set").arg(format!("{property}={value}"));
        }
        for (property, value) in &changes.append {
            cmd.arg("--append").arg(format!("{property}={value}"));
        }

        let output = run_command(&self.udm_bin, &mut cmd, self.timeout).await?;

        // udm reports some failures on stdout with a zero exit status.
        if let Some(message) = output.stdout.lines().find_map(|l| l.strip_prefix("E: ")) {
            return Err(DirectoryError::Rejected {
                dn: dn.to_string(),
                message: message.trim().to_string(),
            });
        }

        if !output.stderr.trim().is_empty() {
            tracing::warn!(dn, stderr = %output.stderr.trim(), "udm reported warnings");
        }
        tracing::info!(
            dn,
            set = changes.set.len(),
            append = changes.append.len(),
            duration_ms = output.duration_ms,
            "Modified directory user"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Parse the output of `udm <module> list`.
///
/// Each object starts with a `DN: ` line followed by indented
/// `property: value` lines; multi-valued properties repeat the line.
/// Values printed as `None` are treated as unset.
pub fn parse_udm_list(stdout: &str) -> Vec<DirectoryUser> {
    let mut users = Vec::new();
    let mut current: Option<DirectoryUser> = None;

    for line in stdout.lines() {
        if let Some(dn) = line.strip_prefix("DN: ") {
            if let Some(user) = current.take() {
                users.push(user);
            }
            current = Some(DirectoryUser {
                dn: dn.trim().to_string(),
                properties: BTreeMap::new(),
            });
            continue;
        }

        let Some(user) = current.as_mut() else {
            continue;
        };
        if !line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((property, value)) = line.trim_start().split_once(": ") else {
            continue;
        };
        if value == UDM_EMPTY_VALUE || value.is_empty() {
            continue;
        }
        user.properties
            .entry(property.to_string())
            .or_default()
            .push(value.to_string());
    }

    if let Some(user) = current {
        users.push(user);
    }
    users
}

/// First value of `attribute` in LDIF output (folded lines joined).
///
/// Attribute names compare case-insensitively. Base64 values (`attr::`)
/// are not decoded and are skipped.
pub fn ldif_attribute(ldif: &str, attribute: &str) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ldif.lines() {
        if let Some(rest) = raw.strip_prefix(' ') {
            if let Some(previous) = lines.last_mut() {
                previous.push_str(rest);
                continue;
            }
        }
        lines.push(raw.to_string());
    }

    lines.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.eq_ignore_ascii_case(attribute) || value.starts_with(':') {
            return None;
        }
        Some(value.trim().to_string())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
