use std::sync::Arc;

use crate::{
    config::Config,
    services::{firebase::FirebaseVerifier, mailer::Mailer, razorpay::RazorpayClient},
};
use axum::extract::FromRef;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub mailer: Arc<dyn Mailer>,
    /// Present only when Razorpay credentials are configured.
    pub razorpay: Option<Arc<RazorpayClient>>,
    /// Present only when a Firebase project id is configured.
    pub firebase: Option<Arc<FirebaseVerifier>>,
}

impl AppState {
    /// Builds the integrations described by `config` around an existing pool.
    pub fn new(pool: PgPool, config: Config) -> Self {
        let mailer = crate::services::mailer::from_config(&config);
        let razorpay = config
            .razorpay
            .clone()
            .map(|rp| Arc::new(RazorpayClient::new(rp)));
        let firebase = config
            .firebase_project_id
            .clone()
            .map(|project_id| Arc::new(FirebaseVerifier::new(project_id)));

        Self {
            pool,
            config,
            mailer,
            razorpay,
            firebase,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Mailer> {
    fn from_ref(state: &AppState) -> Self {
        state.mailer.clone()
    }
}
