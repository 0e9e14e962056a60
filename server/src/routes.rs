use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{appointments, auth, patients, revenue, users};
use crate::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/me", get(auth::me))
        .route(
            "/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route(
            "/patients/:id",
            get(patients::get_patient)
                .put(patients::update_patient)
                .patch(patients::patch_patient)
                .delete(patients::delete_patient),
        )
        .route(
            "/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route("/appointments/calendar", get(appointments::calendar))
        .route(
            "/appointments/:id",
            get(appointments::get_appointment)
                .put(appointments::update_appointment)
                .delete(appointments::delete_appointment),
        )
        .route(
            "/revenue",
            get(revenue::list_revenue).post(revenue::create_revenue),
        )
        .route("/revenue/summary", get(revenue::summary))
        .route(
            "/revenue/:id",
            put(revenue::update_revenue).delete(revenue::delete_revenue),
        )
        .route("/update-role", put(users::update_role))
        .route("/delete-user/:user_id", delete(users::delete_user))
        .route("/invite-user", post(users::invite_user))
        .route("/users", get(users::list_users))
        .route("/log-audit", post(users::log_audit))
        .route("/audit-log", get(users::audit_log));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
