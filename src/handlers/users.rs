use axum::{
    extract::{Path, State},
    Json,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::AppState;

use super::AppError;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "viewer".into()
}

/// In-process user table standing in for a real store.
#[derive(Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    pub fn get(&self, id: &str) -> Option<User> {
        self.users.read().get(id).cloned()
    }

    pub fn insert(&self, user: User) {
        self.users.write().insert(user.id.clone(), user);
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }
}

// ─── GET /api/users/:id ──────────────────────────────────────────

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    state.statsd.add_request_tags([format!("user:{id}")]);

    // Simulated storage latency, reported as its own timing.
    let mut timer = state
        .statsd
        .timer("users.lookup.time", state.statsd.get_request_tags(), 1.0);
    let user = timer
        .time_async(async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            state.users.get(&id)
        })
        .await;

    match user {
        Some(user) => {
            state.statsd.incr("users.lookup.hit", 1, &[]);
            Ok(Json(user))
        }
        None => {
            state.statsd.incr("users.lookup.miss", 1, &[]);
            Err(AppError::NotFound(format!("user '{id}' not found")))
        }
    }
}

// ─── POST /api/users ─────────────────────────────────────────────

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, AppError> {
    if !req.email.contains('@') {
        return Err(AppError::BadRequest(format!(
            "invalid email '{}'",
            req.email
        )));
    }

    let user = User {
        id: format!("usr_{}", &uuid::Uuid::new_v4().to_string()[..8]),
        name: req.name,
        email: req.email,
        role: req.role,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    state.statsd.add_request_tags([format!("role:{}", user.role)]);
    state.users.insert(user.clone());
    state
        .statsd
        .gauge("users.total", state.users.len() as f64, &[]);

    Ok(Json(user))
}
