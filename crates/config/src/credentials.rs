// Carrier account credentials
//
// Resolved in order:
// 1. Command-line flag
// 2. Environment variable (PFLOW_CARRIER_USER / PFLOW_CARRIER_PASSWORD)
// 3. [carrier] section of the config file
//
// Each field is resolved on its own, so a password from the environment can
// pair with a user from the file.

use std::env;

use crate::settings::{CarrierSettings, ConfigError};

pub const USER_ENV: &str = "PFLOW_CARRIER_USER";
pub const PASSWORD_ENV: &str = "PFLOW_CARRIER_PASSWORD";

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Flag,
    Environment,
    ConfigFile,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Flag => "flag",
            CredentialSource::Environment => "environment",
            CredentialSource::ConfigFile => "config file",
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub user_source: CredentialSource,
    pub password_source: CredentialSource,
}

// Keep the password out of logs and panics.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("user_source", &self.user_source)
            .field("password_source", &self.password_source)
            .finish()
    }
}

pub fn resolve_credentials(
    carrier: &CarrierSettings,
    flag_user: Option<&str>,
    flag_password: Option<&str>,
) -> Result<Credentials, ConfigError> {
    resolve_with(carrier, flag_user, flag_password, |name| env::var(name).ok())
}

fn resolve_with(
    carrier: &CarrierSettings,
    flag_user: Option<&str>,
    flag_password: Option<&str>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Credentials, ConfigError> {
    let (user, user_source) = pick(flag_user, env_lookup(USER_ENV), carrier.user.as_deref())
        .ok_or(ConfigError::MissingCredential("user"))?;
    let (password, password_source) =
        pick(flag_password, env_lookup(PASSWORD_ENV), carrier.password.as_deref())
            .ok_or(ConfigError::MissingCredential("password"))?;

    Ok(Credentials { user, password, user_source, password_source })
}

fn pick(
    flag: Option<&str>,
    env_value: Option<String>,
    file: Option<&str>,
) -> Option<(String, CredentialSource)> {
    let non_empty = |s: &str| !s.trim().is_empty();

    if let Some(v) = flag.filter(|v| non_empty(*v)) {
        return Some((v.to_string(), CredentialSource::Flag));
    }
    if let Some(v) = env_value.filter(|v| non_empty(v.as_str())) {
        return Some((v, CredentialSource::Environment));
    }
    file.filter(|v| non_empty(*v))
        .map(|v| (v.to_string(), CredentialSource::ConfigFile))
}
