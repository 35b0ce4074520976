use std::sync::Arc;

use medinsight_core::{Config, SharedClock};
use medinsight_crypto::RecordCipher;

use crate::access::AccessEngine;
use crate::auth::JwtManager;
use crate::notify::Notifier;
use crate::otp::OtpEngine;
use crate::storage::MedDatabase;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: MedDatabase,
    pub jwt: Arc<JwtManager>,
    pub otp: OtpEngine,
    pub access: AccessEngine,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Wire both engines onto one database, clock and notifier.
    pub fn new(
        db: MedDatabase,
        clock: SharedClock,
        config: &Config,
        cipher: Arc<RecordCipher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let jwt = Arc::new(JwtManager::new(
            config.auth.jwt_secret.as_bytes(),
            config.auth.access_ttl_secs,
        ));
        let otp = OtpEngine::new(db.clone(), clock.clone(), config.otp);
        let access = AccessEngine::new(
            db.clone(),
            clock,
            config.access,
            cipher,
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            notifier.clone(),
        );

        Self {
            db,
            jwt,
            otp,
            access,
            notifier,
        }
    }
}
