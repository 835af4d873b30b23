//! Database models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::schema::SENTINEL_ID;

/// A tenant: one communication group, or the service sentinel row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Server {
    /// Group id, or [`SENTINEL_ID`] for the service itself.
    pub id: String,
    /// Language code (e.g., "en", "fr")
    pub lang: String,
    /// Lifetime usage counter.
    pub count: i64,
    /// False once the tenant has been deactivated.
    pub active: bool,
    /// "on" or "off".
    pub embedstyle: String,
    /// "on" or "off".
    pub bot2botstyle: String,
    pub webhookid: Option<String>,
    pub webhooktoken: Option<String>,
    pub webhookactive: bool,
}

impl Server {
    /// Whether this is the reserved row representing the service.
    pub fn is_sentinel(&self) -> bool {
        self.id == SENTINEL_ID
    }

    /// Parsed embed style, if the stored value is recognized.
    pub fn embed_style(&self) -> Option<Toggle> {
        self.embedstyle.parse().ok()
    }

    /// Parsed bot-to-bot style, if the stored value is recognized.
    pub fn bot2bot_style(&self) -> Option<Toggle> {
        self.bot2botstyle.parse().ok()
    }
}

/// A directed, language-tagged relay edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Task {
    /// Serialized [`OriginId`] of the source.
    pub origin: String,
    /// Destination id, or the literal "me".
    pub dest: String,
    /// Where replies are posted.
    pub reply: String,
    /// Tenant whose configuration governs this edge.
    pub server: String,
    pub active: bool,
    #[sqlx(rename = "LangTo")]
    pub lang_to: String,
    #[sqlx(rename = "LangFrom")]
    pub lang_from: String,
}

impl Task {
    /// The typed origin of this edge.
    pub fn origin_id(&self) -> OriginId {
        OriginId::parse(&self.origin)
    }
}

/// Where relayed content comes from.
///
/// Stored as the bare id for groups and `@`-prefixed for direct users.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OriginId {
    /// A group channel.
    Group(String),
    /// A direct conversation with a single user.
    User(String),
}

impl OriginId {
    /// Prefix that marks a user origin in its stored form.
    pub const USER_PREFIX: char = '@';

    pub fn group(id: impl Into<String>) -> Self {
        OriginId::Group(id.into())
    }

    pub fn user(id: impl Into<String>) -> Self {
        OriginId::User(id.into())
    }

    /// Parse the stored form back into a typed id.
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix(Self::USER_PREFIX) {
            Some(user) => OriginId::User(user.to_string()),
            None => OriginId::Group(key.to_string()),
        }
    }

    /// The stored form.
    pub fn to_key(&self) -> String {
        self.to_string()
    }

    /// The id without any prefix.
    pub fn id(&self) -> &str {
        match self {
            OriginId::Group(id) | OriginId::User(id) => id,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, OriginId::User(_))
    }

    /// `LIKE` pattern matching every stored user origin.
    pub(crate) fn user_pattern() -> String {
        format!("{}%", Self::USER_PREFIX)
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginId::Group(id) => write!(f, "{}", id),
            OriginId::User(id) => write!(f, "{}{}", Self::USER_PREFIX, id),
        }
    }
}

impl From<&str> for OriginId {
    fn from(key: &str) -> Self {
        OriginId::parse(key)
    }
}

/// An on/off tenant style switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    /// The stored value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Toggle::On => "on",
            Toggle::Off => "off",
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Toggle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on" => Ok(Toggle::On),
            "off" => Ok(Toggle::Off),
            other => Err(format!("expected 'on' or 'off', got '{}'", other)),
        }
    }
}

/// Outcome of a fan-out task upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    /// Destinations written successfully.
    pub written: usize,
    /// Destinations whose write failed.
    pub failed: usize,
}

/// What [`Database::initialize`](crate::Database::initialize) changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitReport {
    /// Columns added to the servers table.
    pub columns_added: Vec<String>,
    /// Tenant rows created for previously unseen groups.
    pub tenants_created: usize,
}

/// Fleet-wide summary. Sentinel row excluded from tenant figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FleetStats {
    /// Sum of usage counters over all tenants.
    pub total_count: i64,
    pub total_servers: i64,
    pub active_servers: i64,
    /// Language of the sentinel row, if it exists.
    pub bot_lang: Option<String>,
    /// Distinct origins among active tasks.
    pub active_tasks: i64,
    /// Distinct user origins among active tasks.
    pub active_user_tasks: i64,
}

/// Per-tenant summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TenantStats {
    pub count: i64,
    pub lang: String,
    /// Distinct origins among active tasks owned by this tenant.
    pub active_tasks: i64,
    /// Distinct user origins among active tasks owned by this tenant.
    pub active_user_tasks: i64,
    pub embedstyle: String,
    pub bot2botstyle: String,
    pub webhookactive: bool,
    pub webhookid: Option<String>,
    pub webhooktoken: Option<String>,
}
