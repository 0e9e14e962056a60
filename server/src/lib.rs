pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod migrations;
pub mod models;
pub mod recurrence;
pub mod revenue;
pub mod roles;
pub mod routes;
pub mod store;
pub mod users;

use std::sync::Arc;

use roles::RoleCoordinator;
use store::ClinicStore;
use users::UserManager;

/// Shared handler state. Cloned per request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ClinicStore>,
    pub roles: Arc<RoleCoordinator>,
    pub users: Arc<UserManager>,
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, session_ttl: chrono::Duration, password_iterations: u32) -> Self
    where
        S: ClinicStore + 'static,
    {
        let roles = Arc::new(RoleCoordinator::new(store.clone(), store.clone()));
        let users = UserManager::new(store.clone(), roles.clone(), password_iterations);
        Self {
            store,
            roles,
            users: Arc::new(users),
            session_ttl,
        }
    }
}
