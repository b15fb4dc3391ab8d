//! The regular and admin sessions, and every authenticated request made on their behalf.
//!
//! The two sessions are independent buckets. Each is persisted under its own key, and a
//! rejected token only ever ends the session it belonged to. The regular token doubles as the
//! default authorization of the [Api], the admin token is attached to each admin request.

mod data;
mod storage;

pub use data::*;
pub use storage::*;

use crossbeam::atomic::AtomicCell;
use log::{info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::{
    api::object, util, Api, ApiRequest, AuthScope, ClientError, ClientResult, FileUpload,
    MultipartForm,
};

/// Profile fields to change. Absent fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
}

impl ProfilePatch {
    fn validate(&self) -> ClientResult<()> {
        if let Some(name) = &self.name {
            util::validate_name(name)?;
        }

        if let Some(email) = &self.email {
            util::validate_email(email)?;
        }

        Ok(())
    }

    fn to_json(&self) -> Value {
        object([
            ("name", self.name.clone().map(Value::from)),
            ("firstName", self.first_name.clone().map(Value::from)),
            ("lastName", self.last_name.clone().map(Value::from)),
            ("email", self.email.clone().map(Value::from)),
            ("phone", self.phone.clone().map(Value::from)),
            ("dateOfBirth", self.date_of_birth.clone().map(Value::from)),
        ])
    }
}

pub struct SessionStore {
    api: Api,
    storage: Box<dyn Storage>,
    user: RwLock<Option<UserSession>>,
    admin: RwLock<Option<AdminSession>>,
    /// Bumped whenever the regular session starts or ends
    user_generation: AtomicCell<u64>,
}

impl SessionStore {
    pub fn new<S>(api: Api, storage: S) -> Self
    where
        S: Storage,
    {
        Self {
            api,
            storage: Box::new(storage),
            user: Default::default(),
            admin: Default::default(),
            user_generation: AtomicCell::new(0),
        }
    }

    /// Loads both persisted sessions.
    ///
    /// A blob that cannot be read, or whose role contradicts its bucket, is discarded.
    pub async fn init(&self) -> ClientResult<()> {
        let user = self
            .load::<UserSession>(UserSession::STORAGE_KEY, |s| !s.role.is_privileged())
            .await?;

        let admin = self
            .load::<AdminSession>(AdminSession::STORAGE_KEY, |s| s.role.is_privileged())
            .await?;

        if let Some(user) = &user {
            info!("Restored session for {}", user.email);
        }

        if let Some(admin) = &admin {
            info!("Restored admin session for {}", admin.email);
        }

        self.api.set_default_bearer(user.as_ref().map(|u| u.token.clone()));
        *self.user.write() = user;
        *self.admin.write() = admin;
        self.user_generation.fetch_add(1);

        Ok(())
    }

    async fn load<T>(&self, key: &str, belongs: impl Fn(&T) -> bool) -> ClientResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let raw = match self.storage.get_item(key).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let session = match serde_json::from_str::<T>(&raw) {
            Ok(session) if belongs(&session) => Some(session),
            Ok(_) => {
                warn!("Discarding persisted {} with a role that does not belong there", key);
                None
            }
            Err(e) => {
                warn!("Discarding unreadable persisted {}: {}", key, e);
                None
            }
        };

        if session.is_none() {
            self.storage.remove_item(key).await?;
        }

        Ok(session)
    }

    /// Logs in a regular user. Admin and reviewer accounts are turned away.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<UserSession> {
        util::validate_email(email)?;
        util::validate_password(password)?;

        let payload = self.authenticate(email, password).await?;
        let session = payload.into_user_session()?;

        self.install_user(session.clone()).await?;
        info!("Logged in as {}", session.email);

        Ok(session)
    }

    /// Creates a regular account and logs into it
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> ClientResult<UserSession> {
        util::validate_name(name)?;
        util::validate_email(email)?;
        util::validate_new_password(password)?;

        let request = ApiRequest::post("/auth/signup").json(json!({
            "name": name.trim(),
            "email": email.trim(),
            "password": password,
        }));

        let body = self.api.execute(request).await?.into_result(AuthScope::User)?;
        let session = AuthPayload::parse(body)?.into_user_session()?;

        self.install_user(session.clone()).await?;
        info!("Signed up as {}", session.email);

        Ok(session)
    }

    /// Logs in an admin or reviewer, leaving the regular session alone
    pub async fn admin_login(&self, email: &str, password: &str) -> ClientResult<AdminSession> {
        util::validate_email(email)?;
        util::validate_password(password)?;

        let payload = self.authenticate(email, password).await?;
        let session = payload.into_admin_session()?;

        let blob = serde_json::to_string(&session)?;
        self.storage
            .set_item(AdminSession::STORAGE_KEY, blob)
            .await?;

        *self.admin.write() = Some(session.clone());
        info!("Logged in as {} ({:?})", session.email, session.role);

        Ok(session)
    }

    async fn authenticate(&self, email: &str, password: &str) -> ClientResult<AuthPayload> {
        let request = ApiRequest::post("/auth/login").json(json!({
            "email": email.trim(),
            "password": password,
        }));

        let response = self.api.execute(request).await?;

        if matches!(response.status, 400 | 401 | 404) {
            return Err(ClientError::InvalidCredentials);
        }

        AuthPayload::parse(response.into_result(AuthScope::User)?)
    }

    async fn install_user(&self, session: UserSession) -> ClientResult<()> {
        let blob = serde_json::to_string(&session)?;
        self.storage.set_item(UserSession::STORAGE_KEY, blob).await?;

        self.api.set_default_bearer(Some(session.token.clone()));
        *self.user.write() = Some(session);
        self.user_generation.fetch_add(1);

        Ok(())
    }

    /// Ends the regular session. The server is told on a best effort basis.
    pub async fn logout(&self) {
        if let Some(token) = self.token() {
            let request = ApiRequest::post("/auth/logout").bearer(Some(token));

            if let Err(e) = self.api.execute(request).await {
                warn!("Remote logout failed: {}", e);
            }
        }

        self.clear_user().await;
        info!("Logged out");
    }

    /// Ends the admin session without touching the regular one
    pub async fn admin_logout(&self) {
        if let Some(token) = self.admin_token() {
            let request = ApiRequest::post("/auth/logout").bearer(Some(token));

            if let Err(e) = self.api.execute(request).await {
                warn!("Remote admin logout failed: {}", e);
            }
        }

        self.clear_admin().await;
        info!("Logged out of the admin session");
    }

    async fn clear_user(&self) {
        self.user.write().take();
        self.api.set_default_bearer(None);
        self.user_generation.fetch_add(1);

        if let Err(e) = self.storage.remove_item(UserSession::STORAGE_KEY).await {
            warn!("Could not remove persisted session: {}", e);
        }
    }

    async fn clear_admin(&self) {
        self.admin.write().take();

        if let Err(e) = self.storage.remove_item(AdminSession::STORAGE_KEY).await {
            warn!("Could not remove persisted admin session: {}", e);
        }
    }

    pub fn token(&self) -> Option<String> {
        self.user.read().as_ref().map(|s| s.token.clone())
    }

    pub fn admin_token(&self) -> Option<String> {
        self.admin.read().as_ref().map(|s| s.token.clone())
    }

    /// Identifies the current regular session. Data fetched under another generation belongs
    /// to a session that has since ended or been replaced.
    pub fn user_generation(&self) -> u64 {
        self.user_generation.load()
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.read().is_some()
    }

    pub fn is_admin_logged_in(&self) -> bool {
        self.admin.read().is_some()
    }

    pub fn user(&self) -> Option<UserSession> {
        self.user.read().clone()
    }

    pub fn admin(&self) -> Option<AdminSession> {
        self.admin.read().clone()
    }

    pub async fn fetch_profile(&self) -> ClientResult<UserSession> {
        let body = self.user_request(ApiRequest::get("/auth/profile")).await?;
        self.merge_profile(&body).await
    }

    pub async fn update_user_profile(&self, patch: ProfilePatch) -> ClientResult<UserSession> {
        patch.validate()?;

        let request = ApiRequest::put("/auth/profile").json(patch.to_json());
        let body = self.user_request(request).await?;

        self.merge_profile(&body).await
    }

    pub async fn update_profile_picture(&self, file: FileUpload) -> ClientResult<UserSession> {
        let form = MultipartForm::default().file("profilePicture", file);
        let request = ApiRequest::post("/auth/profile/picture").multipart(form);
        let body = self.user_request(request).await?;

        self.merge_profile(&body).await
    }

    pub async fn remove_profile_picture(&self) -> ClientResult<UserSession> {
        let body = self
            .user_request(ApiRequest::delete("/auth/profile/picture"))
            .await?;

        let mut patch = match body {
            Value::Object(mut root) => match root.remove("user") {
                Some(Value::Object(user)) => user,
                _ => root,
            },
            _ => Map::new(),
        };

        patch.entry("profilePicture").or_insert(Value::Null);
        self.merge_profile(&Value::Object(patch)).await
    }

    /// Applies a profile response to the session and persists the result
    async fn merge_profile(&self, body: &Value) -> ClientResult<UserSession> {
        let current = self.user().ok_or(ClientError::NotLoggedIn)?;
        let merged = current.merged(body)?;

        let blob = serde_json::to_string(&merged)?;
        self.storage.set_item(UserSession::STORAGE_KEY, blob).await?;

        let mut user = self.user.write();

        // A logout may have happened while the blob was written
        match user.as_ref() {
            Some(session) if session.token == merged.token => {
                *user = Some(merged.clone());
                Ok(merged)
            }
            _ => Err(ClientError::NotLoggedIn),
        }
    }

    pub async fn change_password(&self, current: &str, new: &str) -> ClientResult<()> {
        util::validate_password(current)?;
        util::validate_new_password(new)?;

        let request = ApiRequest::post("/auth/change-password").json(json!({
            "currentPassword": current,
            "newPassword": new,
        }));

        self.user_request(request).await?;
        info!("Password changed");

        Ok(())
    }

    /// Deletes the account on the server, then ends the session locally
    pub async fn delete_account(&self, password: Option<&str>) -> ClientResult<()> {
        let request = ApiRequest::delete("/auth/account")
            .json(object([("password", password.map(Value::from))]));

        self.user_request(request).await?;
        self.clear_user().await;
        info!("Account deleted");

        Ok(())
    }

    /// Sends a request with the regular token attached when there is one
    pub async fn request(&self, request: ApiRequest) -> ClientResult<Value> {
        let token = self.api.default_bearer();
        let response = self.api.execute_with_default(request).await?;

        match response.into_result(AuthScope::User) {
            Err(ClientError::Unauthorized(scope)) => match token {
                Some(token) => {
                    self.invalidate(scope, &token).await;
                    Err(ClientError::Unauthorized(scope))
                }
                None => Err(ClientError::NotLoggedIn),
            },
            result => result,
        }
    }

    /// Sends a request that requires the regular session
    pub async fn user_request(&self, request: ApiRequest) -> ClientResult<Value> {
        if !self.is_logged_in() {
            return Err(ClientError::NotLoggedIn);
        }

        self.request(request).await
    }

    /// Sends a request with the admin token attached
    pub async fn admin_request(&self, request: ApiRequest) -> ClientResult<Value> {
        let token = self.admin_token().ok_or(ClientError::AdminNotLoggedIn)?;

        let request = request.bearer(Some(token.clone()));
        let response = self.api.execute(request).await?;

        match response.into_result(AuthScope::Admin) {
            Err(ClientError::Unauthorized(scope)) => {
                self.invalidate(scope, &token).await;
                Err(ClientError::Unauthorized(scope))
            }
            result => result,
        }
    }

    /// Ends the session that owns `token`, unless it was already replaced
    async fn invalidate(&self, scope: AuthScope, token: &str) {
        match scope {
            AuthScope::User => {
                if self.token().as_deref() == Some(token) {
                    warn!("Session token was rejected, logging out");
                    self.clear_user().await;
                }
            }
            AuthScope::Admin => {
                if self.admin_token().as_deref() == Some(token) {
                    warn!("Admin token was rejected, logging out of the admin session");
                    self.clear_admin().await;
                }
            }
        }
    }
}
