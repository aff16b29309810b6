//! Link an existing directory user to an existing Azure AD account.
//!
//! The cloud account is looked up by principal name, the directory user by
//! `uid`. In modify mode the directory user receives the link data of the
//! connection and the cloud account receives the directory entry's
//! immutable id. Changes are applied in that order and never rolled back.

use std::fmt;
use std::path::Path;

use clap::Parser;
use dllp_core::office365::{
    immutable_id, AzureLink, Office365Data, DEFAULT_CONNECTION_ALIAS, PROP_CONNECTION_ALIAS,
    PROP_MAIL_PRIMARY_ADDRESS, PROP_OFFICE365_DATA, PROP_OFFICE365_ENABLED,
};
use dllp_core::CoreError;
use dllp_directory::{DirectoryError, DirectoryService, UserChanges};
use dllp_graph::{AzureAccount, GraphError, GraphUsers};
use serde_json::json;

use crate::config::ConfigError;

/// Value UDM expects for an enabled boolean property.
const UDM_TRUE: &str = "1";

/// Printed for a mail address that is not set, as the UCS tools do.
const UNSET: &str = "None";

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Connect an existing UCS user to an existing Azure AD user.
///
/// Requires a connection set up by the Office 365 wizard. If the UCS
/// account has no mailPrimaryAddress, --set-mail can be used.
#[derive(Parser, Debug, Clone)]
#[command(name = "dllp-connect-user", version)]
pub struct ConnectArgs {
    /// Modify users, default: dry-run
    #[arg(short, long)]
    pub modify: bool,

    /// Also activate the user for Office 365; the listener then syncs the object immediately
    #[arg(short, long)]
    pub activate: bool,

    /// The Azure username (UPN, userPrincipalName)
    #[arg(short = 'p', long)]
    pub upn: String,

    /// The LDAP username (uid)
    #[arg(short, long)]
    pub uid: String,

    /// The initialized AD connection the user is activated for
    #[arg(short = 'c', long, default_value = DEFAULT_CONNECTION_ALIAS)]
    pub adconnection: String,

    /// Also set the mailPrimaryAddress at the user
    #[arg(long = "set-mail", alias = "set_mail")]
    pub set_mail: bool,

    /// Mail domain for the mailPrimaryAddress; has to be configured in udm mail/domain
    #[arg(long)]
    pub maildomain: Option<String>,

    /// Use the uid as mailPrimaryAddress localpart
    #[arg(long = "mail-localpart-from-uid", alias = "mail_localpart_from_uid")]
    pub mail_localpart_from_uid: bool,

    /// Use the UPN localpart as mailPrimaryAddress localpart (keeps the Azure account name)
    #[arg(long = "mail-localpart-from-upn", alias = "mail_localpart_from_upn")]
    pub mail_localpart_from_upn: bool,
}

impl ConnectArgs {
    /// Check the mail options and build the request.
    ///
    /// Mail options are only validated together with `--set-mail`; the
    /// error string is meant for a usage message.
    pub fn into_request(self) -> Result<ConnectRequest, String> {
        let mail = if self.set_mail {
            let localpart = match (self.mail_localpart_from_uid, self.mail_localpart_from_upn) {
                (true, true) => {
                    return Err("Only one of --mail-localpart-from-uid and \
                                --mail-localpart-from-upn may be selected"
                        .to_string())
                }
                (false, false) => {
                    return Err("One of --mail-localpart-from-uid and \
                                --mail-localpart-from-upn has to be selected"
                        .to_string())
                }
                (true, false) => LocalpartSource::Uid,
                (false, true) => LocalpartSource::Upn,
            };
            let domain = self
                .maildomain
                .filter(|d| !d.is_empty())
                .ok_or_else(|| "--maildomain has to be given".to_string())?;
            Some(MailSetting { localpart, domain })
        } else {
            None
        };

        Ok(ConnectRequest {
            uid: self.uid,
            upn: self.upn,
            alias: self.adconnection,
            modify: self.modify,
            activate: self.activate,
            mail,
        })
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalpartSource {
    Uid,
    Upn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSetting {
    pub localpart: LocalpartSource,
    pub domain: String,
}

/// One validated linking job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub uid: String,
    pub upn: String,
    pub alias: String,
    pub modify: bool,
    pub activate: bool,
    pub mail: Option<MailSetting>,
}

impl ConnectRequest {
    /// The mailPrimaryAddress to set, if mail setting was requested.
    pub fn mail_address(&self) -> Option<String> {
        let mail = self.mail.as_ref()?;
        let localpart = match mail.localpart {
            LocalpartSource::Uid => self.uid.as_str(),
            LocalpartSource::Upn => self
                .upn
                .rsplit_once('@')
                .map_or(self.upn.as_str(), |(local, _)| local),
        };
        Some(format!("{localpart}@{}", mail.domain))
    }
}

// ---------------------------------------------------------------------------
// Outcome and errors
// ---------------------------------------------------------------------------

/// Result of a successful run. `Display` gives the line printed to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    DryRun {
        uid: String,
        object_id: String,
        entry_uuid: String,
    },
    Modified {
        uid: String,
        object_id: String,
        mail: Option<String>,
        entry_uuid: String,
    },
}

impl fmt::Display for ConnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun {
                uid,
                object_id,
                entry_uuid,
            } => write!(
                f,
                "Would update LDAP user {uid}; objectid={object_id}, \
                 and azure user entryuuid is {entry_uuid}"
            ),
            Self::Modified {
                uid,
                object_id,
                mail,
                entry_uuid,
            } => write!(
                f,
                "Modified: LDAP user {uid}; azure objectid={object_id}; \
                 ucs mail={}, and ldap entryuuid is {entry_uuid}",
                mail.as_deref().unwrap_or(UNSET)
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connection {alias} not initialized")]
    NotInitialized { alias: String },

    #[error("Error while querying Azure user: {0}")]
    CloudLookup(#[source] GraphError),

    #[error("Could not find user with uid={uid} in UDM/LDAP")]
    UserNotFound { uid: String },

    #[error("Error while querying LDAP user: {0}")]
    DirectoryLookup(#[source] DirectoryError),

    #[error("Error while modifying LDAP user: {0}")]
    DirectoryModify(#[source] DirectoryError),

    #[error("Error while modifying LDAP user: {0}")]
    Office365Data(#[source] CoreError),

    #[error("Error while connecting users: {0}")]
    CloudModify(#[source] GraphError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl ConnectError {
    /// Process exit status reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UserNotFound { .. } | Self::DirectoryLookup(_) => 1,
            Self::CloudLookup(_) => 2,
            Self::DirectoryModify(_) | Self::Office365Data(_) => 3,
            Self::CloudModify(_) => 4,
            Self::NotInitialized { .. } => 5,
            Self::Config(_) | Self::HttpClient(_) => 6,
        }
    }
}

// ---------------------------------------------------------------------------
// Linking
// ---------------------------------------------------------------------------

/// Load the credentials of connection `alias`.
pub fn load_connection(root: &Path, alias: &str) -> Result<AzureAccount, ConnectError> {
    AzureAccount::load(root, alias).map_err(|e| {
        tracing::warn!(alias, error = %e, "Azure AD connection unusable");
        ConnectError::NotInitialized {
            alias: alias.to_string(),
        }
    })
}

/// Run the linking steps for `request` against the given services.
pub async fn connect_user<G, D>(
    graph: &G,
    directory: &D,
    request: &ConnectRequest,
) -> Result<ConnectOutcome, ConnectError>
where
    G: GraphUsers + ?Sized,
    D: DirectoryService + ?Sized,
{
    let cloud_user = graph
        .get_user(&request.upn, &["id"])
        .await
        .map_err(ConnectError::CloudLookup)?;
    let object_id = cloud_user
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            ConnectError::CloudLookup(GraphError::UnexpectedResponse(format!(
                "user {} has no id",
                request.upn
            )))
        })?
        .to_string();
    tracing::info!(upn = %request.upn, %object_id, "Found Azure AD user");

    let mut users = directory
        .find_users_by_uid(&request.uid)
        .await
        .map_err(ConnectError::DirectoryLookup)?;
    if users.len() != 1 {
        tracing::debug!(uid = %request.uid, matches = users.len(), "Directory lookup not unique");
        return Err(ConnectError::UserNotFound {
            uid: request.uid.clone(),
        });
    }
    let user = users.remove(0);
    let entry_uuid = directory
        .entry_uuid(&user.dn)
        .await
        .map_err(ConnectError::DirectoryLookup)?;

    if !request.modify {
        return Ok(ConnectOutcome::DryRun {
            uid: request.uid.clone(),
            object_id,
            entry_uuid,
        });
    }

    let mut data = match user.first(PROP_OFFICE365_DATA) {
        Some(encoded) => Office365Data::from_ldap(encoded).map_err(ConnectError::Office365Data)?,
        None => Office365Data::default(),
    };
    data.set_link(
        &request.alias,
        &AzureLink {
            user_principal_name: request.upn.clone(),
            object_id: object_id.clone(),
        },
    );

    let mut changes = UserChanges::default()
        .set(
            PROP_OFFICE365_DATA,
            data.to_ldap_string().map_err(ConnectError::Office365Data)?,
        )
        .append(PROP_CONNECTION_ALIAS, request.alias.as_str());
    if let Some(address) = request.mail_address() {
        changes = changes.set(PROP_MAIL_PRIMARY_ADDRESS, address);
    }
    if request.activate {
        changes = changes.set(PROP_OFFICE365_ENABLED, UDM_TRUE);
    }

    directory
        .modify_user(&user.dn, &changes)
        .await
        .map_err(ConnectError::DirectoryModify)?;

    graph
        .modify_user(
            &object_id,
            &json!({ "onPremisesImmutableId": immutable_id(&entry_uuid) }),
        )
        .await
        .map_err(ConnectError::CloudModify)?;

    let mail = changes
        .value_of(PROP_MAIL_PRIMARY_ADDRESS)
        .or_else(|| user.first(PROP_MAIL_PRIMARY_ADDRESS))
        .map(str::to_string);

    Ok(ConnectOutcome::Modified {
        uid: request.uid.clone(),
        object_id,
        mail,
        entry_uuid,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use dllp_directory::DirectoryUser;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const ENTRY_UUID: &str = "0d5f7c2a-1b2c-4d5e-8f90-123456789abc";

    // -- fakes --------------------------------------------------------------

    #[derive(Default)]
    struct FakeGraph {
        missing: bool,
        fail_modify: bool,
        patches: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl GraphUsers for FakeGraph {
        async fn get_user(&self, upn: &str, select: &[&str]) -> Result<Value, GraphError> {
            assert_eq!(select, ["id"]);
            if self.missing {
                return Err(GraphError::Api {
                    status: 404,
                    code: "Request_ResourceNotFound".into(),
                    message: format!("{upn} does not exist"),
                });
            }
            Ok(json!({ "id": "obj-1" }))
        }

        async fn modify_user(&self, id: &str, patch: &Value) -> Result<(), GraphError> {
            if self.fail_modify {
                return Err(GraphError::Api {
                    status: 403,
                    code: "Authorization_RequestDenied".into(),
                    message: "denied".into(),
                });
            }
            self.patches.lock().unwrap().push((id.to_string(), patch.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDirectory {
        users: Vec<DirectoryUser>,
        modifications: Mutex<Vec<(String, UserChanges)>>,
    }

    impl FakeDirectory {
        fn with_user(properties: &[(&str, &str)]) -> Self {
            let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (k, v) in properties {
                map.entry(k.to_string()).or_default().push(v.to_string());
            }
            Self {
                users: vec![DirectoryUser {
                    dn: "uid=jdoe,cn=users,dc=school,dc=test".into(),
                    properties: map,
                }],
                ..Default::default()
            }
        }

        fn modifications(&self) -> Vec<(String, UserChanges)> {
            self.modifications.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectoryService for FakeDirectory {
        async fn find_users_by_uid(&self, _uid: &str) -> Result<Vec<DirectoryUser>, DirectoryError> {
            Ok(self.users.clone())
        }

        async fn entry_uuid(&self, _dn: &str) -> Result<String, DirectoryError> {
            Ok(ENTRY_UUID.to_string())
        }

        async fn modify_user(&self, dn: &str, changes: &UserChanges) -> Result<(), DirectoryError> {
            self.modifications
                .lock()
                .unwrap()
                .push((dn.to_string(), changes.clone()));
            Ok(())
        }
    }

    fn request(modify: bool) -> ConnectRequest {
        ConnectRequest {
            uid: "jdoe".into(),
            upn: "john.doe@dllp.onmicrosoft.com".into(),
            alias: "defaultADconnection".into(),
            modify,
            activate: false,
            mail: None,
        }
    }

    // -- arguments ------------------------------------------------------------

    #[test]
    fn args_default_to_dry_run_on_default_connection() {
        let args = ConnectArgs::try_parse_from(["dllp-connect-user", "-u", "jdoe", "-p", "j@x"]).unwrap();
        let req = args.into_request().unwrap();
        assert!(!req.modify);
        assert_eq!(req.alias, "defaultADconnection");
        assert_eq!(req.mail, None);
    }

    #[test]
    fn args_accept_underscore_spellings() {
        let args = ConnectArgs::try_parse_from([
            "dllp-connect-user",
            "-m",
            "-u",
            "jdoe",
            "-p",
            "j@x",
            "--set_mail",
            "--mail_localpart_from_upn",
            "--maildomain",
            "dllp.schule",
        ])
        .unwrap();
        let req = args.into_request().unwrap();
        assert_eq!(req.mail_address().as_deref(), Some("j@dllp.schule"));
    }

    #[test]
    fn set_mail_requires_exactly_one_localpart_source() {
        let both = ConnectArgs::try_parse_from([
            "x", "-u", "a", "-p", "b", "--set-mail", "--maildomain", "d",
            "--mail-localpart-from-uid", "--mail-localpart-from-upn",
        ])
        .unwrap();
        assert!(both.into_request().unwrap_err().starts_with("Only one"));

        let none = ConnectArgs::try_parse_from(["x", "-u", "a", "-p", "b", "--set-mail", "--maildomain", "d"])
            .unwrap();
        assert!(none.into_request().unwrap_err().starts_with("One of"));
    }

    #[test]
    fn set_mail_requires_domain() {
        let args = ConnectArgs::try_parse_from([
            "x", "-u", "a", "-p", "b", "--set-mail", "--mail-localpart-from-uid",
        ])
        .unwrap();
        assert_eq!(args.into_request().unwrap_err(), "--maildomain has to be given");
    }

    #[test]
    fn mail_flags_without_set_mail_are_ignored() {
        let args = ConnectArgs::try_parse_from([
            "x", "-u", "a", "-p", "b", "--mail-localpart-from-uid", "--mail-localpart-from-upn",
        ])
        .unwrap();
        assert_eq!(args.into_request().unwrap().mail, None);
    }

    #[test]
    fn upn_localpart_uses_last_at_sign() {
        let mut req = request(true);
        req.upn = "odd@name@tenant.onmicrosoft.com".into();
        req.mail = Some(MailSetting {
            localpart: LocalpartSource::Upn,
            domain: "dllp.schule".into(),
        });
        assert_eq!(req.mail_address().as_deref(), Some("odd@name@dllp.schule"));
    }

    // -- linking ----------------------------------------------------------------

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let graph = FakeGraph::default();
        let directory = FakeDirectory::with_user(&[]);

        let outcome = connect_user(&graph, &directory, &request(false)).await.unwrap();

        assert_eq!(
            outcome.to_string(),
            format!("Would update LDAP user jdoe; objectid=obj-1, and azure user entryuuid is {ENTRY_UUID}")
        );
        assert!(directory.modifications().is_empty());
        assert!(graph.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cloud_lookup_failure_exits_2_before_directory_access() {
        let graph = FakeGraph {
            missing: true,
            ..Default::default()
        };
        let directory = FakeDirectory::default();

        let err = connect_user(&graph, &directory, &request(true)).await.unwrap_err();
        assert_matches!(err, ConnectError::CloudLookup(_));
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("Error while querying Azure user: "));
    }

    #[test]
    fn configuration_errors_have_their_own_exit_code() {
        let err = ConnectError::from(ConfigError {
            var: "DLLP_HTTP_TIMEOUT_SECS",
            expected: "number of seconds",
            value: "soon".into(),
        });
        assert_eq!(err.exit_code(), 6);
        assert!(err.to_string().starts_with("Invalid configuration: DLLP_HTTP_TIMEOUT_SECS"));
    }

    #[tokio::test]
    async fn missing_directory_user_exits_1_without_writes() {
        let graph = FakeGraph::default();
        let directory = FakeDirectory::default();

        let err = connect_user(&graph, &directory, &request(true)).await.unwrap_err();
        assert_eq!(err.to_string(), "Could not find user with uid=jdoe in UDM/LDAP");
        assert_eq!(err.exit_code(), 1);
        assert!(directory.modifications().is_empty());
        assert!(graph.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn modify_links_both_sides() {
        let graph = FakeGraph::default();
        let directory = FakeDirectory::with_user(&[(PROP_MAIL_PRIMARY_ADDRESS, "jdoe@old.test")]);
        let mut req = request(true);
        req.activate = true;

        let outcome = connect_user(&graph, &directory, &req).await.unwrap();

        let mods = directory.modifications();
        assert_eq!(mods.len(), 1);
        let changes = &mods[0].1;
        let data = Office365Data::from_ldap(changes.value_of(PROP_OFFICE365_DATA).unwrap()).unwrap();
        assert_eq!(
            data.link("defaultADconnection"),
            Some(AzureLink {
                user_principal_name: "john.doe@dllp.onmicrosoft.com".into(),
                object_id: "obj-1".into(),
            })
        );
        assert_eq!(
            changes.append,
            [(PROP_CONNECTION_ALIAS.to_string(), "defaultADconnection".to_string())]
        );
        assert_eq!(changes.value_of(PROP_OFFICE365_ENABLED), Some("1"));
        assert_eq!(changes.value_of(PROP_MAIL_PRIMARY_ADDRESS), None);

        let patches = graph.patches.lock().unwrap();
        assert_eq!(
            patches[0],
            (
                "obj-1".to_string(),
                json!({ "onPremisesImmutableId": immutable_id(ENTRY_UUID) })
            )
        );
        assert_eq!(
            outcome.to_string(),
            format!(
                "Modified: LDAP user jdoe; azure objectid=obj-1; ucs mail=jdoe@old.test, \
                 and ldap entryuuid is {ENTRY_UUID}"
            )
        );
    }

    #[tokio::test]
    async fn modify_keeps_links_of_other_connections() {
        let mut existing = Office365Data::default();
        existing.set_link(
            "schoolAD",
            &AzureLink {
                user_principal_name: "jdoe@school.test".into(),
                object_id: "obj-0".into(),
            },
        );
        let encoded = existing.to_ldap_string().unwrap();
        let graph = FakeGraph::default();
        let directory = FakeDirectory::with_user(&[(PROP_OFFICE365_DATA, encoded.as_str())]);

        connect_user(&graph, &directory, &request(true)).await.unwrap();

        let changes = &directory.modifications()[0].1;
        let data = Office365Data::from_ldap(changes.value_of(PROP_OFFICE365_DATA).unwrap()).unwrap();
        assert_eq!(
            data.aliases().collect::<Vec<_>>(),
            ["defaultADconnection", "schoolAD"]
        );
    }

    #[tokio::test]
    async fn set_mail_uses_uid_localpart() {
        let graph = FakeGraph::default();
        let directory = FakeDirectory::with_user(&[]);
        let mut req = request(true);
        req.mail = Some(MailSetting {
            localpart: LocalpartSource::Uid,
            domain: "dllp.schule".into(),
        });

        let outcome = connect_user(&graph, &directory, &req).await.unwrap();

        assert_eq!(
            directory.modifications()[0].1.value_of(PROP_MAIL_PRIMARY_ADDRESS),
            Some("jdoe@dllp.schule")
        );
        assert_matches!(outcome, ConnectOutcome::Modified { mail: Some(ref m), .. } if m == "jdoe@dllp.schule");
    }

    #[tokio::test]
    async fn unset_mail_prints_none() {
        let graph = FakeGraph::default();
        let directory = FakeDirectory::with_user(&[]);

        let outcome = connect_user(&graph, &directory, &request(true)).await.unwrap();
        assert!(outcome.to_string().contains("ucs mail=None,"));
    }

    #[tokio::test]
    async fn cloud_modify_failure_exits_4_after_directory_change() {
        let graph = FakeGraph {
            fail_modify: true,
            ..Default::default()
        };
        let directory = FakeDirectory::with_user(&[]);

        let err = connect_user(&graph, &directory, &request(true)).await.unwrap_err();

        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().starts_with("Error while connecting users: "));
        assert_eq!(directory.modifications().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_office365_data_exits_3_without_writes() {
        let graph = FakeGraph::default();
        let directory = FakeDirectory::with_user(&[(PROP_OFFICE365_DATA, "!!not base64!!")]);

        let err = connect_user(&graph, &directory, &request(true)).await.unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert!(directory.modifications().is_empty());
    }

    #[test]
    fn unusable_connection_exits_5() {
        let root = tempfile::tempdir().unwrap();
        let err = load_connection(root.path(), "schoolAD").unwrap_err();
        assert_eq!(err.to_string(), "connection schoolAD not initialized");
        assert_eq!(err.exit_code(), 5);
    }
}
