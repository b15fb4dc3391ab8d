use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    models::{lenient_string, normalize_ids},
    ClientError, ClientResult,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Reviewer,
    /// Any role this client does not know about. Never privileged.
    #[serde(other)]
    Other,
}

impl Role {
    /// Whether this role belongs in the admin session
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Reviewer)
    }
}

/// The regular user's session, persisted under [UserSession::STORAGE_KEY]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub token: String,
}

/// The admin or reviewer session, persisted under [AdminSession::STORAGE_KEY]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    pub role: Role,
    pub token: String,
    #[serde(default = "yes")]
    pub is_admin: bool,
}

fn yes() -> bool {
    true
}

impl UserSession {
    pub const STORAGE_KEY: &'static str = "user";

    /// Fields a profile response is allowed to overwrite
    const MERGEABLE_FIELDS: [&'static str; 7] = [
        "name",
        "firstName",
        "lastName",
        "email",
        "phone",
        "dateOfBirth",
        "profilePicture",
    ];

    fn from_account(account: Map<String, Value>, token: String) -> ClientResult<Self> {
        let mut account = account;
        account.insert("token".to_string(), Value::String(token));

        fill_display_name(&mut account);
        Ok(serde_json::from_value(Value::Object(account))?)
    }

    /// Returns a copy with the fields present in `patch` applied.
    /// The token, id, and role are never taken from a patch.
    pub fn merged(&self, patch: &Value) -> ClientResult<Self> {
        let mut patch = patch.clone();
        normalize_ids(&mut patch);

        let patch = match account_object(patch) {
            Some(patch) => patch,
            None => return Ok(self.clone()),
        };

        let mut current = match serde_json::to_value(self)? {
            Value::Object(current) => current,
            _ => return Ok(self.clone()),
        };

        for key in Self::MERGEABLE_FIELDS {
            if let Some(value) = patch.get(key) {
                current.insert(key.to_string(), value.clone());
            }
        }

        Ok(serde_json::from_value(Value::Object(current))?)
    }
}

impl AdminSession {
    pub const STORAGE_KEY: &'static str = "adminUser";

    fn from_account(account: Map<String, Value>, token: String) -> ClientResult<Self> {
        let mut account = account;
        account.insert("token".to_string(), Value::String(token));
        account.insert("isAdmin".to_string(), Value::Bool(true));

        fill_display_name(&mut account);
        Ok(serde_json::from_value(Value::Object(account))?)
    }
}

/// An authenticated account as returned by login or signup, before it is assigned a bucket
#[derive(Debug, Clone)]
pub struct AuthPayload {
    pub token: String,
    pub role: Role,
    account: Map<String, Value>,
}

impl AuthPayload {
    /// Accepts `{ token, user }`, a token inside `user`, or the account at the top level
    pub fn parse(body: Value) -> ClientResult<Self> {
        let mut body = body;
        normalize_ids(&mut body);

        let mut root = match body {
            Value::Object(root) => root,
            _ => return Err(ClientError::Parse("expected an account".to_string())),
        };

        let top_level_token = take_string(&mut root, "token");

        let mut account = match root.remove("user") {
            Some(Value::Object(user)) => user,
            _ => root,
        };

        let token = take_string(&mut account, "token")
            .or(top_level_token)
            .ok_or_else(|| ClientError::Parse("response has no token".to_string()))?;

        if !matches!(account.get("id"), Some(Value::String(_))) {
            return Err(ClientError::Parse("response has no account id".to_string()));
        }

        let role = account
            .get("role")
            .filter(|r| !r.is_null())
            .cloned()
            .map(serde_json::from_value::<Role>)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            token,
            role,
            account,
        })
    }

    /// Accepts the account as a regular session, failing for privileged roles
    pub fn into_user_session(self) -> ClientResult<UserSession> {
        if self.role.is_privileged() {
            return Err(ClientError::AdminAccount);
        }

        UserSession::from_account(self.account, self.token)
    }

    /// Accepts the account as an admin session, failing for anything but admin or reviewer
    pub fn into_admin_session(self) -> ClientResult<AdminSession> {
        if !self.role.is_privileged() {
            return Err(ClientError::NotAdmin);
        }

        AdminSession::from_account(self.account, self.token)
    }
}

/// The profile payload inside a response body
fn account_object(body: Value) -> Option<Map<String, Value>> {
    match body {
        Value::Object(mut root) => match root.remove("user") {
            Some(Value::Object(user)) => Some(user),
            _ => Some(root),
        },
        _ => None,
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Some accounts only carry first and last names
fn fill_display_name(account: &mut Map<String, Value>) {
    let has_name = account
        .get("name")
        .and_then(Value::as_str)
        .map(|n| !n.trim().is_empty())
        .unwrap_or_default();

    if has_name {
        return;
    }

    let parts: Vec<&str> = ["firstName", "lastName"]
        .iter()
        .filter_map(|k| account.get(*k).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .collect();

    if !parts.is_empty() {
        let name = parts.join(" ");
        account.insert("name".to_string(), Value::String(name));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_payload_shapes() {
        let nested = AuthPayload::parse(json!({
            "token": "t1",
            "user": { "_id": "u1", "name": "Ada", "email": "ada@example.com" }
        }))
        .unwrap();

        let inner_token = AuthPayload::parse(json!({
            "user": { "_id": "u1", "token": "t2", "role": "reviewer" }
        }))
        .unwrap();

        let flat = AuthPayload::parse(json!({
            "_id": "u1", "token": "t3", "firstName": "Ada", "lastName": "Lovelace"
        }))
        .unwrap();

        assert_eq!(nested.token, "t1");
        assert_eq!(nested.role, Role::User);
        assert_eq!(inner_token.token, "t2");
        assert_eq!(inner_token.role, Role::Reviewer);

        let session = flat.into_user_session().unwrap();
        assert_eq!(session.id, "u1");
        assert_eq!(session.name, "Ada Lovelace");
        assert_eq!(session.token, "t3");
    }

    #[test]
    fn test_missing_token_is_a_parse_error() {
        let result = AuthPayload::parse(json!({ "user": { "_id": "u1" } }));
        assert!(matches!(result, Err(ClientError::Parse(_))));
    }

    #[test]
    fn test_buckets_reject_the_wrong_role() {
        let admin = AuthPayload::parse(json!({
            "token": "t", "user": { "_id": "a1", "role": "admin" }
        }))
        .unwrap();

        let user = AuthPayload::parse(json!({
            "token": "t", "user": { "_id": "u1", "role": "user" }
        }))
        .unwrap();

        let unknown = AuthPayload::parse(json!({
            "token": "t", "user": { "_id": "u2", "role": "superuser" }
        }))
        .unwrap();

        assert_eq!(admin.clone().into_user_session(), Err(ClientError::AdminAccount));
        assert!(admin.into_admin_session().unwrap().is_admin);
        assert_eq!(user.into_admin_session(), Err(ClientError::NotAdmin));
        assert_eq!(unknown.role, Role::Other);
        assert_eq!(unknown.into_admin_session(), Err(ClientError::NotAdmin));
    }

    #[test]
    fn test_merge_preserves_token_and_role() {
        let session = UserSession {
            id: "u1".into(),
            name: "Ada".into(),
            first_name: None,
            last_name: None,
            email: "ada@example.com".into(),
            phone: Some("555".into()),
            date_of_birth: None,
            profile_picture: None,
            role: Role::User,
            token: "secret".into(),
        };

        let merged = session
            .merged(&json!({
                "user": {
                    "_id": "u1",
                    "name": "Ada L.",
                    "profilePicture": "https://cdn.example/ada.png",
                    "role": "admin",
                    "token": "other"
                }
            }))
            .unwrap();

        assert_eq!(merged.name, "Ada L.");
        assert_eq!(merged.profile_picture.as_deref(), Some("https://cdn.example/ada.png"));
        assert_eq!(merged.phone.as_deref(), Some("555"));
        assert_eq!(merged.token, "secret");
        assert_eq!(merged.role, Role::User);
    }
}
