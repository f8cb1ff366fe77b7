//! User types

use crate::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authorization role of a principal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Member => write!(f, "member"),
        }
    }
}

/// Identity provider that vouches for a federated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    Google,
    Github,
    Microsoft,
    Other(String),
}

const OTHER_PREFIX: &str = "other:";

/// Parses the stored form written by `From<Provider> for String`. Known
/// names match case-insensitively; anything else is kept as `Other`.
impl From<String> for Provider {
    fn from(s: String) -> Self {
        if let Some(name) = s.strip_prefix(OTHER_PREFIX) {
            return Provider::Other(name.to_string());
        }
        match s.to_ascii_lowercase().as_str() {
            "google" => Provider::Google,
            "github" => Provider::Github,
            "microsoft" => Provider::Microsoft,
            _ => Provider::Other(s),
        }
    }
}

/// `Other` names are stored with an `other:` prefix so they never read
/// back as a known provider.
impl From<Provider> for String {
    fn from(p: Provider) -> Self {
        match p {
            Provider::Other(name) => format!("{}{}", OTHER_PREFIX, name),
            known => known.to_string(),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Google => write!(f, "google"),
            Provider::Github => write!(f, "github"),
            Provider::Microsoft => write!(f, "microsoft"),
            Provider::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A principal the portal can authenticate, whatever its account shape.
pub trait Principal {
    /// Stable identifier used by sessions to refer back to the account.
    fn principal_id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn email(&self) -> Option<&str>;
    fn role(&self) -> Role;

    fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }
}

/// Account authenticated with a locally stored password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    username: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    /// Key for the linked external API, if the user configured one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalUser {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            role,
            api_key: None,
            email: None,
            display_name: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl LocalUser {
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Principal for LocalUser {
    fn principal_id(&self) -> &str {
        &self.username
    }

    fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    fn role(&self) -> Role {
        self.role
    }
}

/// Account whose identity is asserted by an external provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedUser {
    id: String,
    pub email: String,
    pub name: String,
    pub provider: Provider,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FederatedUser {
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        provider: Provider,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            provider,
            created_at: now,
            updated_at: now,
        }
    }
}

impl FederatedUser {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Principal for FederatedUser {
    fn principal_id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn email(&self) -> Option<&str> {
        Some(&self.email)
    }

    fn role(&self) -> Role {
        Role::Member
    }
}

/// User account record, tagged by account shape.
///
/// Serialized as a flat object with a `kind` field (`local` or `federated`)
/// next to the variant's own fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum User {
    Local(LocalUser),
    Federated(FederatedUser),
}

impl User {
    pub fn kind(&self) -> &'static str {
        match self {
            User::Local(_) => "local",
            User::Federated(_) => "federated",
        }
    }

    pub fn as_local(&self) -> Option<&LocalUser> {
        match self {
            User::Local(user) => Some(user),
            User::Federated(_) => None,
        }
    }

    pub fn as_federated(&self) -> Option<&FederatedUser> {
        match self {
            User::Federated(user) => Some(user),
            User::Local(_) => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            User::Local(user) => user.created_at,
            User::Federated(user) => user.created_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            User::Local(user) => user.updated_at,
            User::Federated(user) => user.updated_at,
        }
    }

    /// Mark the account as changed (profile or credential update)
    pub fn touch(&mut self) {
        let now = Utc::now();
        match self {
            User::Local(user) => user.updated_at = now,
            User::Federated(user) => user.updated_at = now,
        }
    }
}

impl From<LocalUser> for User {
    fn from(user: LocalUser) -> Self {
        User::Local(user)
    }
}

impl From<FederatedUser> for User {
    fn from(user: FederatedUser) -> Self {
        User::Federated(user)
    }
}

impl Principal for User {
    fn principal_id(&self) -> &str {
        match self {
            User::Local(user) => user.principal_id(),
            User::Federated(user) => user.principal_id(),
        }
    }

    fn display_name(&self) -> &str {
        match self {
            User::Local(user) => user.display_name(),
            User::Federated(user) => user.display_name(),
        }
    }

    fn email(&self) -> Option<&str> {
        match self {
            User::Local(user) => user.email(),
            User::Federated(user) => user.email(),
        }
    }

    fn role(&self) -> Role {
        match self {
            User::Local(user) => user.role(),
            User::Federated(user) => user.role(),
        }
    }
}

impl Record for User {
    const COLLECTION: &'static str = "users";
    const INDEXES: &'static [&'static str] = &["email", "kind"];

    fn key(&self) -> &str {
        self.principal_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_user_round_trip_keeps_omitted_fields() {
        let user = User::from(LocalUser::new("alice", "$argon2id$hash", Role::Admin));

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["kind"], "local");
        assert_eq!(json["username"], "alice");
        assert!(json.get("api_key").is_none());
        assert!(json.get("email").is_none());

        let decoded: User = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_federated_user_key_and_principal() {
        let user = User::from(FederatedUser::new(
            "u1",
            "a@x.com",
            "Ada",
            Provider::Github,
        ));

        assert_eq!(user.key(), "u1");
        assert_eq!(user.kind(), "federated");
        assert_eq!(user.email(), Some("a@x.com"));
        assert_eq!(user.display_name(), "Ada");
        assert!(!user.is_admin());

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["provider"], "github");
        let decoded: User = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_local_user_display_name_falls_back_to_username() {
        let mut local = LocalUser::new("bob", "hash", Role::Member);
        assert_eq!(local.display_name(), "bob");

        local.display_name = Some("Bobby".to_string());
        assert_eq!(local.display_name(), "Bobby");
        assert_eq!(User::from(local).key(), "bob");
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(Provider::from("GitHub".to_string()), Provider::Github);
        assert_eq!(
            Provider::from("keycloak".to_string()),
            Provider::Other("keycloak".to_string())
        );
        assert_eq!(String::from(Provider::Other("keycloak".into())), "other:keycloak");
        assert_eq!(Provider::Other("keycloak".into()).to_string(), "keycloak");
    }

    #[test]
    fn test_other_provider_named_like_known_one_round_trips() {
        for provider in [
            Provider::Other("GitHub".to_string()),
            Provider::Other("other:nested".to_string()),
            Provider::Other(String::new()),
            Provider::Microsoft,
        ] {
            let user = User::from(FederatedUser::new("u1", "a@x.com", "Ada", provider.clone()));
            let decoded: User = serde_json::from_value(serde_json::to_value(&user).unwrap()).unwrap();

            assert_eq!(decoded, user);
            assert_eq!(decoded.as_federated().unwrap().provider, provider);
        }
    }

    #[test]
    fn test_keys_are_read_through_accessors() {
        let local = LocalUser::new("dave", "hash", Role::Member);
        assert_eq!(local.username(), "dave");
        assert_eq!(User::from(local).key(), "dave");

        let federated = FederatedUser::new("f-1", "e@x.com", "Eve", Provider::Google);
        assert_eq!(federated.id(), "f-1");
        assert_eq!(User::from(federated).key(), "f-1");
    }

    #[test]
    fn test_touch_moves_updated_at_only() {
        let mut user = User::from(LocalUser::new("carol", "hash", Role::Member));
        let created = user.created_at();
        std::thread::sleep(std::time::Duration::from_millis(2));

        user.touch();

        assert_eq!(user.created_at(), created);
        assert!(user.updated_at() > created);
    }
}
