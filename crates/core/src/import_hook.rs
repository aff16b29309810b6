//! UCS@school import hook deriving mail, OX and Office 365 settings from UCR.
//!
//! Before a user is created the import pipeline calls every registered
//! [`UserHook`]. [`DllpAutomation`] maps the user's first role to the
//! German role token used in the UCR key space, reads the per-school and
//! per-role settings below `DLLP/{school}/users/{role}/`, checks them for
//! consistency and writes the matching UDM properties onto the user.
//!
//! A failed check raises [`InitialisationError`], which aborts the import
//! of that one user only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::office365::{PROP_CONNECTION_ALIAS, PROP_OFFICE365_ENABLED};
use crate::registry::ConfigRegistry;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Root of the UCR key space read by the hook.
pub const UCR_PREFIX: &str = "DLLP";

/// Priority of [`DllpAutomation`] at the `pre_create` hook point.
pub const PRE_CREATE_PRIORITY: i32 = 100;

/// The only value that switches a feature on. Compared exactly.
pub const ENABLED_VALUE: &str = "true";

pub const PROP_MAIL_USER_QUOTA: &str = "mailUserQuota";
pub const PROP_IS_OX_USER: &str = "isOxUser";
pub const PROP_OX_CONTEXT: &str = "oxContext";

/// Role names of the import pipeline and their UCR key tokens.
const ROLE_TRANSLATION: [(&str, &str); 3] = [
    ("student", "schueler"),
    ("teacher", "lehrer"),
    ("staff", "mitarbeiter"),
];

// ---------------------------------------------------------------------------
// ImportUser
// ---------------------------------------------------------------------------

/// The part of an import-pipeline user record the hook reads and writes.
///
/// Fields the hook does not know about are carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub school: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub udm_properties: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// InitialisationError
// ---------------------------------------------------------------------------

/// Raised when a user cannot be prepared for creation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitialisationError {
    #[error("DLLP - User has no role")]
    MissingRole,

    #[error("DLLP - OX or MS enabled, but email address missing")]
    EmailMissing,

    #[error("DLLP - OX enabled, but no ox context is set")]
    OxContextMissing,

    #[error("DLLP - MS365 enabled, but no connection alias is set")]
    ConnectionAliasMissing,

    #[error("DLLP - {key} is not an integer: {value:?}")]
    InvalidNumber { key: String, value: String },
}

// ---------------------------------------------------------------------------
// UserHook
// ---------------------------------------------------------------------------

/// A hook invoked by the import pipeline before a user is created.
#[async_trait]
pub trait UserHook: Send + Sync {
    fn name(&self) -> &str;

    /// Hooks with a higher priority run first.
    fn priority(&self) -> i32;

    async fn pre_create(&self, user: &mut ImportUser) -> Result<(), InitialisationError>;
}

/// Run every hook's `pre_create` on `user`, highest priority first,
/// stopping at the first error.
pub async fn run_pre_create(
    hooks: &[&dyn UserHook],
    user: &mut ImportUser,
) -> Result<(), InitialisationError> {
    let mut ordered: Vec<&dyn UserHook> = hooks.to_vec();
    ordered.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    for hook in ordered {
        tracing::debug!(hook = hook.name(), user = ?user.name, "Running pre_create hook");
        hook.pre_create(user).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// UCR key token for a pipeline role; unknown roles pass through.
pub fn role_token(role: &str) -> &str {
    ROLE_TRANSLATION
        .iter()
        .find(|(from, _)| *from == role)
        .map(|(_, to)| *to)
        .unwrap_or(role)
}

/// Full UCR key for a setting of `role` at `school`.
pub fn settings_key(school: &str, role: &str, setting: &str) -> String {
    format!("{UCR_PREFIX}/{school}/users/{role}/{setting}")
}

/// Raw UCR values for one (school, role) pair. `None` means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSettings {
    pub quota: Option<String>,
    pub ox_enabled: Option<String>,
    pub ox_context: Option<String>,
    pub ms_enabled: Option<String>,
    pub connection_alias: Option<String>,
}

impl RoleSettings {
    pub fn read(registry: &ConfigRegistry, school: &str, role: &str) -> Self {
        let get = |setting: &str| {
            let value = registry
                .get(&settings_key(school, role, setting))
                .map(str::to_string);
            tracing::info!(setting, value = ?value, "DLLP - Read setting");
            value
        };
        Self {
            quota: get("ox/quota"),
            ox_enabled: get("ox/enabled"),
            ox_context: get("ox/context"),
            ms_enabled: get("ms365/enabled"),
            connection_alias: get("ms365/connection_alias"),
        }
    }

    pub fn ox_enabled(&self) -> bool {
        self.ox_enabled.as_deref() == Some(ENABLED_VALUE)
    }

    pub fn ms365_enabled(&self) -> bool {
        self.ms_enabled.as_deref() == Some(ENABLED_VALUE)
    }

    /// Check that every enabled feature has what it depends on.
    pub fn validate(&self, email: Option<&str>) -> Result<(), InitialisationError> {
        if (self.ox_enabled() || self.ms365_enabled()) && email.is_none() {
            return Err(InitialisationError::EmailMissing);
        }
        if self.ox_enabled() && self.ox_context.is_none() {
            return Err(InitialisationError::OxContextMissing);
        }
        if self.ms365_enabled() && self.connection_alias.is_none() {
            return Err(InitialisationError::ConnectionAliasMissing);
        }
        Ok(())
    }

    /// Write the UDM properties for every value that is set.
    ///
    /// Numbers are parsed before anything is written, so a bad value
    /// leaves `properties` untouched.
    pub fn apply(&self, properties: &mut Map<String, Value>) -> Result<(), InitialisationError> {
        let quota = parse_number(PROP_MAIL_USER_QUOTA, self.quota.as_deref())?;
        let context = parse_number(PROP_OX_CONTEXT, self.ox_context.as_deref())?;

        if let Some(quota) = quota {
            properties.insert(PROP_MAIL_USER_QUOTA.into(), Value::from(quota));
        }
        if self.ox_enabled() {
            properties.insert(PROP_IS_OX_USER.into(), Value::Bool(true));
        }
        if let Some(context) = context {
            properties.insert(PROP_OX_CONTEXT.into(), Value::from(context));
        }
        if self.ms365_enabled() {
            properties.insert(PROP_OFFICE365_ENABLED.into(), Value::Bool(true));
        }
        if let Some(alias) = &self.connection_alias {
            properties.insert(
                PROP_CONNECTION_ALIAS.into(),
                Value::Array(vec![Value::String(alias.clone())]),
            );
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: Option<&str>) -> Result<Option<i64>, InitialisationError> {
    value
        .map(|v| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| InitialisationError::InvalidNumber {
                    key: key.to_string(),
                    value: v.to_string(),
                })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// DllpAutomation
// ---------------------------------------------------------------------------

/// Applies the DLLP per-school, per-role settings at `pre_create`.
pub struct DllpAutomation {
    registry: ConfigRegistry,
}

impl DllpAutomation {
    pub fn new(registry: ConfigRegistry) -> Self {
        Self { registry }
    }

    pub fn set_props(&self, user: &mut ImportUser) -> Result<(), InitialisationError> {
        tracing::info!(school = %user.school, "DLLP - User belongs to school");

        let role = user
            .roles
            .first()
            .ok_or(InitialisationError::MissingRole)?;
        let role = role_token(role);
        tracing::info!(role, "DLLP - User belongs to role");

        let settings = RoleSettings::read(&self.registry, &user.school, role);
        settings.validate(user.email.as_deref())?;
        settings.apply(&mut user.udm_properties)?;

        tracing::info!("DLLP - Hook finished successfully");
        Ok(())
    }
}

#[async_trait]
impl UserHook for DllpAutomation {
    fn name(&self) -> &str {
        "DLLPAutomation"
    }

    fn priority(&self) -> i32 {
        PRE_CREATE_PRIORITY
    }

    async fn pre_create(&self, user: &mut ImportUser) -> Result<(), InitialisationError> {
        self.set_props(user)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
