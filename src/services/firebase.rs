// src/services/firebase.rs

use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::AppError;

/// Google's signing keys for Firebase ID tokens, in JWK form.
const JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Google rotates the keys every few hours; refetch after this long.
const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

/// Identity asserted by a verified Firebase ID token.
#[derive(Debug, Clone)]
pub struct GoogleIdentity {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct FirebaseVerifier {
    http: reqwest::Client,
    project_id: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            project_id,
            cache: RwLock::new(None),
        }
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AppError> {
        let keys = self
            .http
            .get(JWKS_URL)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::InternalServerError(format!("Failed to fetch Google keys: {}", e)))?
            .json::<JwkSet>()
            .await
            .map_err(|e| AppError::InternalServerError(format!("Invalid Google key set: {}", e)))?;
        Ok(keys)
    }

    /// Returns the decoding key for `kid`, refreshing the cache when it is
    /// stale or does not know the key.
    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AppError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < KEY_CACHE_TTL {
                    if let Some(jwk) = cached.keys.find(kid) {
                        return DecodingKey::from_jwk(jwk)
                            .map_err(|e| AppError::InternalServerError(e.to_string()));
                    }
                }
            }
        }

        let keys = self.fetch_keys().await?;
        let key = keys
            .find(kid)
            .ok_or_else(|| AppError::AuthError("Unknown signing key".to_string()))
            .and_then(|jwk| {
                DecodingKey::from_jwk(jwk).map_err(|e| AppError::InternalServerError(e.to_string()))
            });

        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        key
    }

    /// Verifies an ID token minted by Firebase Authentication for this project.
    pub async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AppError> {
        let header = decode_header(id_token)
            .map_err(|_| AppError::AuthError("Invalid Google token".to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(AppError::AuthError("Invalid Google token".to_string()));
        }
        let kid = header
            .kid
            .ok_or_else(|| AppError::AuthError("Invalid Google token".to_string()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);

        let claims = decode::<FirebaseClaims>(id_token, &key, &validation)
            .map_err(|e| {
                tracing::warn!("Rejected Google token: {}", e);
                AppError::AuthError("Invalid Google token".to_string())
            })?
            .claims;

        let email = claims
            .email
            .filter(|_| claims.email_verified)
            .ok_or_else(|| AppError::AuthError("Google account email is not verified".to_string()))?;

        Ok(GoogleIdentity {
            uid: claims.sub,
            email,
            name: claims.name,
            picture: claims.picture,
        })
    }
}
