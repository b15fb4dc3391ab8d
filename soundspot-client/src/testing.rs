//! An in-memory soundspot API for tests.
//!
//! Responses use `_id` like the real backend does, so every test also goes through id
//! normalization.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::Notify;

use crate::{ApiRequest, ApiResponse, Method, RequestBody, Transport, TransportError};

#[derive(Default)]
struct State {
    accounts: Vec<Account>,
    tokens: HashMap<String, String>,
    soundspots: Vec<Value>,
    audio_items: Vec<Value>,
    reviews: Vec<Value>,
    favorites: Vec<Value>,
    plans: Vec<Value>,
    subscriptions: HashMap<String, Value>,
    payment_methods: Vec<Value>,
    requests: Vec<ApiRequest>,
    next_id: usize,
    offline: bool,
    signup_role: Option<String>,
    auto_approve: bool,
    held_path: Option<String>,
}

#[derive(Clone)]
struct Account {
    id: String,
    name: String,
    email: String,
    password: String,
    role: String,
    phone: Option<String>,
    profile_picture: Option<String>,
}

impl Account {
    fn to_json(&self) -> Value {
        json!({
            "_id": self.id,
            "name": self.name,
            "email": self.email,
            "role": self.role,
            "phone": self.phone,
            "profilePicture": self.profile_picture,
        })
    }
}

pub struct MockApi {
    state: Mutex<State>,
    release: Notify,
}

type Reply = (u16, Value);

fn ok(body: Value) -> Reply {
    (200, body)
}

fn created(body: Value) -> Reply {
    (201, body)
}

fn fail(status: u16, message: &str) -> Reply {
    (status, json!({ "message": message }))
}

fn id_of(value: &Value) -> &str {
    value.get("_id").and_then(Value::as_str).unwrap_or_default()
}

fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

impl MockApi {
    /// A server with a regular user, an admin, and a reviewer, all using the password `hunter22`
    pub fn new() -> Arc<Self> {
        let api = Self {
            state: Default::default(),
            release: Notify::new(),
        };

        {
            let mut state = api.state.lock();

            for (id, name, email, role) in [
                ("u1", "Ada", "ada@example.com", "user"),
                ("u2", "Grace", "grace.h@example.com", "user"),
                ("a1", "Root", "root@example.com", "admin"),
                ("r1", "Rita", "rita@example.com", "reviewer"),
            ] {
                state.accounts.push(Account {
                    id: id.to_string(),
                    name: name.to_string(),
                    email: email.to_string(),
                    password: "hunter22".to_string(),
                    role: role.to_string(),
                    phone: None,
                    profile_picture: None,
                });
            }

            state.plans = vec![
                json!({
                    "_id": "p1",
                    "name": "Explorer",
                    "price": 4.99,
                    "interval": "month",
                    "features": ["All tours"],
                }),
                json!({ "_id": "p2", "name": "Voyager", "price": 49.99, "interval": "year" }),
            ];

            state.payment_methods = vec![
                json!({
                    "_id": "pm1",
                    "brand": "visa",
                    "last4": "4242",
                    "expMonth": 4,
                    "expYear": 2030,
                    "isDefault": true,
                }),
                json!({
                    "_id": "pm2",
                    "brand": "mastercard",
                    "last4": "4444",
                    "expMonth": 9,
                    "expYear": 2029,
                    "isDefault": false,
                }),
            ];
        }

        Arc::new(api)
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Makes signup return accounts with this role
    pub fn set_signup_role(&self, role: &str) {
        self.state.lock().signup_role = Some(role.to_string());
    }

    /// Approves new soundspots immediately
    pub fn set_auto_approve(&self, auto_approve: bool) {
        self.state.lock().auto_approve = auto_approve;
    }

    /// Requests to `path` wait until [MockApi::release] is called
    pub fn hold(&self, path: &str) {
        self.state.lock().held_path = Some(path.to_string());
    }

    pub fn release(&self) {
        self.state.lock().held_path = None;
        self.release.notify_waiters();
    }

    /// Invalidates a token, as if it expired
    pub fn revoke(&self, token: &str) {
        self.state.lock().tokens.remove(token);
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// How many requests hit this path with this method
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn last_bearer(&self) -> Option<String> {
        self.state
            .lock()
            .requests
            .last()
            .and_then(|r| r.bearer.clone())
    }

    pub fn last_request(&self) -> Option<ApiRequest> {
        self.state.lock().requests.last().cloned()
    }

    pub fn add_soundspot(&self, id: &str, name: &str, status: &str, creator: &str) {
        self.state.lock().soundspots.push(json!({
            "_id": id,
            "name": name,
            "location": { "type": "Point", "coordinates": [4.9, 52.37] },
            "status": status,
            "creator": { "_id": creator, "name": "Someone" },
            "termsAccepted": true,
            "createdAt": "2026-01-01T10:00:00Z",
        }));
    }

    pub fn add_audio_item(
        &self,
        id: &str,
        title: &str,
        soundspot: &str,
        status: &str,
        creator: &str,
    ) {
        self.state.lock().audio_items.push(json!({
            "_id": id,
            "title": title,
            "audioUrl": format!("https://cdn.example/{}.mp3", id),
            "soundspot": { "_id": soundspot },
            "creator": creator,
            "status": status,
            "playCount": 0,
            "averageRating": 0,
            "totalReviews": 0,
            "ratingDistribution": { "1": 0, "2": 0, "3": 0, "4": 0, "5": 0 },
        }));
    }

    fn held(&self, path: &str) -> bool {
        self.state.lock().held_path.as_deref() == Some(path)
    }

    fn respond(&self, request: &ApiRequest) -> Reply {
        let mut state = self.state.lock();
        state.requests.push(request.clone());

        let body = match &request.body {
            RequestBody::Json(body) => body.clone(),
            RequestBody::Multipart(form) => {
                let mut map: Map<String, Value> = form
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();

                for (key, file) in &form.files {
                    map.insert(key.clone(), Value::String(file.file_name.clone()));
                }

                Value::Object(map)
            }
            RequestBody::Empty => Value::Null,
        };

        let caller = request
            .bearer
            .as_ref()
            .and_then(|t| state.tokens.get(t))
            .and_then(|id| state.accounts.iter().find(|a| &a.id == id))
            .cloned();

        let segments: Vec<&str> = request
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        route(&mut state, request.method, &segments, &body, caller)
    }
}

fn route(
    state: &mut State,
    method: Method,
    segments: &[&str],
    body: &Value,
    caller: Option<Account>,
) -> Reply {
    use Method::*;

    let require_user = || caller.clone().ok_or_else(|| fail(401, "Unauthorized"));
    let require_admin = || match &caller {
        Some(a) if a.role == "admin" || a.role == "reviewer" => Ok(a.clone()),
        Some(_) => Err(fail(403, "Admin access required")),
        None => Err(fail(401, "Unauthorized")),
    };

    macro_rules! user {
        () => {
            match require_user() {
                Ok(user) => user,
                Err(reply) => return reply,
            }
        };
    }

    macro_rules! admin {
        () => {
            match require_admin() {
                Ok(admin) => admin,
                Err(reply) => return reply,
            }
        };
    }

    match (method, segments) {
        (Post, ["auth", "login"]) => {
            let email = str_field(body, "email").unwrap_or_default();
            let password = str_field(body, "password").unwrap_or_default();

            let account = state
                .accounts
                .iter()
                .find(|a| a.email == email && a.password == password)
                .cloned();

            match account {
                Some(account) => {
                    let token = issue_token(state, &account.id);
                    ok(json!({ "token": token, "user": account.to_json() }))
                }
                None => fail(401, "Invalid credentials"),
            }
        }
        (Post, ["auth", "signup"]) => {
            let email = str_field(body, "email").unwrap_or_default().to_string();

            if state.accounts.iter().any(|a| a.email == email) {
                return fail(400, "Email already registered");
            }

            let id = next_id(state, "u");
            let account = Account {
                id: id.clone(),
                name: str_field(body, "name").unwrap_or_default().to_string(),
                email,
                password: str_field(body, "password").unwrap_or_default().to_string(),
                role: state.signup_role.clone().unwrap_or_else(|| "user".to_string()),
                phone: None,
                profile_picture: None,
            };

            state.accounts.push(account.clone());
            let token = issue_token(state, &id);

            created(json!({ "token": token, "user": account.to_json() }))
        }
        (Post, ["auth", "logout"]) => ok(json!({ "message": "Logged out" })),
        (Get, ["auth", "profile"]) => ok(json!({ "user": user!().to_json() })),
        (Put, ["auth", "profile"]) => {
            let user = user!();
            let account = update_account(state, &user.id, |a| {
                if let Some(name) = str_field(body, "name") {
                    a.name = name.to_string();
                }
                if let Some(phone) = str_field(body, "phone") {
                    a.phone = Some(phone.to_string());
                }
            });

            ok(json!({ "user": account }))
        }
        (Post, ["auth", "profile", "picture"]) => {
            let user = user!();
            let file = str_field(body, "profilePicture").unwrap_or("upload").to_string();
            let account = update_account(state, &user.id, |a| {
                a.profile_picture = Some(format!("https://cdn.example/avatars/{}", file));
            });

            ok(json!({ "user": account }))
        }
        (Delete, ["auth", "profile", "picture"]) => {
            let user = user!();
            update_account(state, &user.id, |a| a.profile_picture = None);

            ok(json!({ "message": "Profile picture removed" }))
        }
        (Post, ["auth", "change-password"]) => {
            let user = user!();

            if str_field(body, "currentPassword") != Some(user.password.as_str()) {
                return fail(400, "Current password is incorrect");
            }

            let new = str_field(body, "newPassword").unwrap_or_default().to_string();
            update_account(state, &user.id, |a| a.password = new);

            ok(json!({ "message": "Password changed" }))
        }
        (Delete, ["auth", "account"]) => {
            let user = user!();
            state.accounts.retain(|a| a.id != user.id);
            state.tokens.retain(|_, id| *id != user.id);

            ok(json!({ "message": "Account deleted" }))
        }

        (Get, ["soundspots"]) => {
            let spots: Vec<Value> = state
                .soundspots
                .iter()
                .filter(|s| s["status"] == "approved")
                .cloned()
                .collect();

            ok(json!({ "soundspots": spots }))
        }
        (Get, ["soundspots", "pending"]) => {
            admin!();
            let spots: Vec<Value> = state
                .soundspots
                .iter()
                .filter(|s| s["status"] == "pending")
                .cloned()
                .collect();

            ok(Value::Array(spots))
        }
        (Post, ["soundspots", "review"]) => {
            let admin = admin!();
            let id = str_field(body, "soundspotId").unwrap_or_default();
            let approved = body["approved"].as_bool().unwrap_or_default();

            match state.soundspots.iter_mut().find(|s| id_of(s) == id) {
                Some(spot) if spot["status"] == "pending" => {
                    spot["status"] = json!(if approved { "approved" } else { "rejected" });
                    spot["reviewedBy"] = json!(admin.id);
                    spot["reviewNotes"] = body["notes"].clone();

                    ok(json!({ "soundspot": spot.clone() }))
                }
                Some(_) => fail(400, "Soundspot has already been reviewed"),
                None => fail(404, "Soundspot not found"),
            }
        }
        (Get, ["spots", "my-spots"]) => {
            let user = user!();
            let spots: Vec<Value> = state
                .soundspots
                .iter()
                .filter(|s| s["creator"]["_id"] == user.id.as_str())
                .cloned()
                .collect();

            ok(json!({ "data": spots }))
        }
        (Post, ["soundspot"]) => {
            let user = user!();
            let id = next_id(state, "s");
            let status = if state.auto_approve { "approved" } else { "pending" };

            let spot = json!({
                "_id": id,
                "name": body["name"],
                "latitude": body["latitude"],
                "longitude": body["longitude"],
                "script": body["script"],
                "description": body["description"],
                "audioUrl": str_field(body, "audio").map(|f| format!("https://cdn.example/{}", f)),
                "status": status,
                "creator": user.id,
                "termsAccepted": true,
            });

            state.soundspots.push(spot.clone());
            created(json!({ "soundspot": spot }))
        }
        (Get, ["soundspot", id]) => match state.soundspots.iter().find(|s| id_of(s) == *id) {
            Some(spot) => ok(json!({ "soundspot": spot })),
            None => fail(404, "Soundspot not found"),
        },
        (Delete, ["soundspot", id]) => {
            let user = user!();
            let is_admin = user.role == "admin" || user.role == "reviewer";

            let position = state.soundspots.iter().position(|s| {
                let owned = s["creator"] == user.id.as_str()
                    || s["creator"]["_id"] == user.id.as_str();

                id_of(s) == *id && (is_admin || owned)
            });

            match position {
                Some(index) => {
                    state.soundspots.remove(index);
                    ok(json!({ "message": "Soundspot deleted" }))
                }
                None => fail(404, "Soundspot not found"),
            }
        }

        (Get, ["audio-items"]) => ok(json!({ "audioItems": approved_items(state, |_| true) })),
        (Get, ["audio-items", "new-stories"]) => {
            let mut items = approved_items(state, |_| true);
            items.reverse();
            ok(json!({ "audioItems": items }))
        }
        (Get, ["audio-items", "best-reviewed"]) => {
            let mut items = approved_items(state, |_| true);
            items.sort_by(|a, b| {
                let a = a["averageRating"].as_f64().unwrap_or_default();
                let b = b["averageRating"].as_f64().unwrap_or_default();
                b.total_cmp(&a)
            });
            ok(Value::Array(items))
        }
        (Get, ["audio-items", "by-soundspot", id]) => {
            let items = approved_items(state, |i| {
                i["soundspot"]["_id"] == *id || i["soundspot"] == *id
            });
            ok(json!({ "audioItems": items }))
        }
        (Get, ["audio-items", "my-items"]) => {
            let user = user!();
            let items: Vec<Value> = state
                .audio_items
                .iter()
                .filter(|i| i["creator"] == user.id.as_str())
                .cloned()
                .collect();

            ok(json!({ "audioItems": items }))
        }
        (Get, ["audio-items", "pending"]) => {
            admin!();
            let items: Vec<Value> = state
                .audio_items
                .iter()
                .filter(|i| i["status"] == "pending")
                .cloned()
                .collect();

            ok(json!({ "audioItems": items }))
        }
        (Post, ["audio-items", "review"]) => {
            admin!();
            let id = str_field(body, "audioItemId").unwrap_or_default();
            let approved = body["approved"].as_bool().unwrap_or_default();

            match state.audio_items.iter_mut().find(|i| id_of(i) == id) {
                Some(item) if item["status"] == "pending" => {
                    item["status"] = json!(if approved { "approved" } else { "rejected" });
                    ok(json!({ "audioItem": item.clone() }))
                }
                Some(_) => fail(400, "Audio item has already been reviewed"),
                None => fail(404, "Audio item not found"),
            }
        }
        (Post, ["audio-items", "reviews", id, "helpful"]) => {
            user!();
            match state.reviews.iter_mut().find(|r| id_of(r) == *id) {
                Some(review) => {
                    let count = review["helpfulCount"].as_u64().unwrap_or_default() + 1;
                    review["helpfulCount"] = json!(count);
                    ok(json!({ "helpfulCount": count }))
                }
                None => fail(404, "Review not found"),
            }
        }
        (Post, ["audio-items"]) => {
            let user = user!();

            if str_field(body, "audio").is_none() {
                return fail(400, "Audio file is required");
            }

            let id = next_id(state, "i");
            let item = json!({
                "_id": id,
                "title": body["title"],
                "description": body["description"],
                "category": body["category"],
                "audioUrl": format!(
                    "https://cdn.example/{}",
                    str_field(body, "audio").unwrap_or_default()
                ),
                "soundspot": body["soundspot"],
                "creator": user.id,
                "status": "pending",
            });

            state.audio_items.push(item.clone());
            created(json!({ "audioItem": item }))
        }
        (Get, ["audio-items", id]) => match state.audio_items.iter().find(|i| id_of(i) == *id) {
            Some(item) => ok(json!({ "audioItem": item })),
            None => fail(404, "Audio item not found"),
        },
        (Put, ["audio-items", id]) => {
            let user = user!();
            match state
                .audio_items
                .iter_mut()
                .find(|i| id_of(i) == *id && i["creator"] == user.id.as_str())
            {
                Some(item) => {
                    for key in ["title", "description", "category"] {
                        if let Some(value) = body.get(key) {
                            item[key] = value.clone();
                        }
                    }
                    ok(json!({ "audioItem": item.clone() }))
                }
                None => fail(404, "Audio item not found"),
            }
        }
        (Delete, ["audio-items", id]) => {
            let user = user!();
            let before = state.audio_items.len();
            state
                .audio_items
                .retain(|i| !(id_of(i) == *id && i["creator"] == user.id.as_str()));

            if state.audio_items.len() == before {
                return fail(404, "Audio item not found");
            }

            ok(json!({ "message": "Audio item deleted" }))
        }
        (Get, ["audio-items", id, "reviews"]) => {
            let reviews: Vec<Value> = state
                .reviews
                .iter()
                .filter(|r| r["audioItem"] == *id)
                .cloned()
                .collect();

            ok(json!({ "reviews": reviews }))
        }
        (Post, ["audio-items", id, "reviews"]) => {
            let user = user!();
            let rating = body["rating"].as_u64().unwrap_or_default();

            if !(1..=5).contains(&rating) {
                return fail(400, "Rating must be between 1 and 5");
            }

            let review_id = next_id(state, "r");
            let review = json!({
                "_id": review_id,
                "audioItem": id,
                "user": { "_id": user.id, "name": user.name },
                "rating": rating,
                "comment": body["comment"],
                "helpfulCount": 0,
            });
            state.reviews.push(review.clone());

            let ratings: Vec<u64> = state
                .reviews
                .iter()
                .filter(|r| r["audioItem"] == *id)
                .filter_map(|r| r["rating"].as_u64())
                .collect();

            if let Some(item) = state.audio_items.iter_mut().find(|i| id_of(i) == *id) {
                let total = ratings.len() as u64;
                let average = ratings.iter().sum::<u64>() as f64 / total as f64;
                let mut distribution = [0u64; 5];
                for rating in &ratings {
                    distribution[(*rating - 1) as usize] += 1;
                }

                item["totalReviews"] = json!(total);
                item["averageRating"] = json!(average);
                item["ratingDistribution"] = json!(distribution);
            }

            created(json!({ "review": review }))
        }
        (Post, ["audio-items", id, "play"]) => {
            match state.audio_items.iter_mut().find(|i| id_of(i) == *id) {
                Some(item) => {
                    let count = item["playCount"].as_u64().unwrap_or_default() + 1;
                    item["playCount"] = json!(count);
                    ok(json!({ "playCount": count }))
                }
                None => fail(404, "Audio item not found"),
            }
        }

        (Get, ["user", "favorites"]) => {
            let user = user!();
            let favorites: Vec<Value> = state
                .favorites
                .iter()
                .filter(|f| f["user"] == user.id.as_str())
                .cloned()
                .collect();

            ok(json!({ "favorites": favorites }))
        }
        (Post, ["user", "favorites"]) => {
            let user = user!();
            let item_id = body["itemId"].clone();
            let item_type = body["itemType"].clone();

            let exists = state.favorites.iter().any(|f| {
                f["user"] == user.id.as_str()
                    && f["itemId"] == item_id
                    && f["itemType"] == item_type
            });

            if exists {
                return fail(400, "Already in favorites");
            }

            let id = next_id(state, "f");
            let favorite = json!({
                "_id": id,
                "itemId": item_id,
                "itemType": item_type,
                "user": user.id,
                "createdAt": "2026-02-01T08:00:00Z",
            });

            state.favorites.push(favorite.clone());
            created(json!({ "favorite": favorite }))
        }
        (Delete, ["user", "favorites", id]) => {
            let user = user!();
            let before = state.favorites.len();
            state
                .favorites
                .retain(|f| !(id_of(f) == *id && f["user"] == user.id.as_str()));

            if state.favorites.len() == before {
                return fail(404, "Favorite not found");
            }

            ok(json!({ "message": "Removed from favorites" }))
        }

        (Get, ["subscriptions", "plans"]) => ok(json!({ "plans": state.plans })),
        (Get, ["subscriptions", "current"]) => {
            let user = user!();
            ok(json!({ "subscription": state.subscriptions.get(&user.id) }))
        }
        (Get, ["subscriptions", "check-access"]) => {
            let user = user!();
            let has_access = state.subscriptions.contains_key(&user.id);

            ok(json!({
                "hasAccess": has_access,
                "reason": if has_access { Value::Null } else { json!("No active subscription") },
            }))
        }
        (Post, ["subscriptions", "create-payment-intent"]) => {
            user!();
            let plan_id = str_field(body, "planId").unwrap_or_default();

            match state.plans.iter().find(|p| id_of(p) == plan_id) {
                Some(plan) => ok(json!({
                    "clientSecret": format!("pi_{}_secret", plan_id),
                    "paymentIntentId": format!("pi_{}", plan_id),
                    "amount": plan["price"],
                    "currency": "usd",
                })),
                None => fail(404, "Plan not found"),
            }
        }
        (Post, ["subscriptions", "confirm-payment"])
        | (Post, ["subscriptions", "subscribe-with-saved-card"]) => {
            let user = user!();
            let plan_id = str_field(body, "planId").unwrap_or_default().to_string();

            let plan = match state.plans.iter().find(|p| id_of(p) == plan_id) {
                Some(plan) => plan.clone(),
                None => return fail(404, "Plan not found"),
            };

            let id = next_id(state, "sub");
            let subscription = json!({
                "_id": id,
                "plan": plan,
                "status": "active",
                "currentPeriodEnd": "2026-12-01T00:00:00Z",
                "cancelAtPeriodEnd": false,
            });

            state.subscriptions.insert(user.id, subscription.clone());
            ok(json!({ "subscription": subscription }))
        }

        (Get, ["payment", "methods"]) => {
            user!();
            ok(json!({ "paymentMethods": state.payment_methods }))
        }
        (Put, ["payment", "methods", id, "default"]) => {
            user!();

            if !state.payment_methods.iter().any(|m| id_of(m) == *id) {
                return fail(404, "Payment method not found");
            }

            for method in state.payment_methods.iter_mut() {
                let is_default = id_of(method) == *id;
                method["isDefault"] = json!(is_default);
            }

            ok(json!({ "message": "Default payment method updated" }))
        }
        (Delete, ["payment", "methods", id]) => {
            user!();
            state.payment_methods.retain(|m| id_of(m) != *id);
            ok(json!({ "message": "Payment method removed" }))
        }

        _ => fail(404, "Route not found"),
    }
}

fn next_id(state: &mut State, prefix: &str) -> String {
    state.next_id += 1;
    format!("{}-new-{}", prefix, state.next_id)
}

fn issue_token(state: &mut State, account_id: &str) -> String {
    state.next_id += 1;
    let token = format!("token-{}-{}", account_id, state.next_id);
    state.tokens.insert(token.clone(), account_id.to_string());
    token
}

fn update_account(state: &mut State, id: &str, f: impl FnOnce(&mut Account)) -> Value {
    match state.accounts.iter_mut().find(|a| a.id == id) {
        Some(account) => {
            f(account);
            account.to_json()
        }
        None => Value::Null,
    }
}

fn approved_items(state: &State, filter: impl Fn(&Value) -> bool) -> Vec<Value> {
    state
        .audio_items
        .iter()
        .filter(|i| i["status"] == "approved" && filter(i))
        .cloned()
        .collect()
}

#[async_trait]
impl Transport for Arc<MockApi> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        if self.state.lock().offline {
            return Err(TransportError::Network("connection refused".to_string()));
        }

        if self.held(&request.path) {
            let released = self.release.notified();
            tokio::pin!(released);

            // Re-check after registering, in case release already happened
            if self.held(&request.path) {
                released.await;
            }
        }

        let (status, body) = self.respond(&request);
        Ok(ApiResponse { status, body })
    }
}
