use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::load_balancer::BackendStats;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub algorithm: &'static str,
    pub backends: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        algorithm: state.algorithm.token(),
        backends: state.registry.len(),
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStats>> {
    Json(state.registry.stats())
}
