// src/services/google_oauth.rs
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// This matches the format of a JSON service account file
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    pub r#type: String,
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub auth_provider_x509_cert_url: String,
    pub client_x509_cert_url: String,
}

/// The claims needed for Google OAuth
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn from_response(resp: TokenResponse) -> Self {
        AccessToken {
            token: resp.access_token,
            expires_at: Utc::now() + Duration::seconds(resp.expires_in),
        }
    }

    /// Usable for at least another minute.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::minutes(1) > now
    }
}

pub fn read_service_account(path: &str) -> Result<ServiceAccountKey> {
    let json_bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&json_bytes)?)
}

/// Sign a JWT with the service account key and exchange it for a bearer token
pub async fn fetch_access_token_from_file(
    client: &Client,
    service_account_json_path: &str,
    scope: &str,
) -> Result<AccessToken> {
    let key = read_service_account(service_account_json_path)?;

    let iat = Utc::now();
    let exp = iat + Duration::minutes(59);
    let claims = Claims {
        iss: key.client_email.clone(),
        scope: scope.to_string(),
        aud: key.token_uri.clone(),
        exp: exp.timestamp(),
        iat: iat.timestamp(),
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    let jwt = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)?;

    #[derive(Debug, Serialize)]
    struct TokenRequest<'a> {
        grant_type: &'a str,
        assertion: &'a str,
    }
    let req_body = TokenRequest {
        grant_type: "urn:ietf:params:oauth:grant-type:jwt-bearer",
        assertion: &jwt,
    };

    let resp = client
        .post(&key.token_uri)
        .json(&req_body)
        .send()
        .await?
        .error_for_status()?
        .json::<TokenResponse>()
        .await?;

    Ok(AccessToken::from_response(resp))
}

/// Ask the GCE/Cloud Functions metadata server for the runtime service account's token
pub async fn fetch_access_token_from_metadata(client: &Client) -> Result<AccessToken> {
    let resp = client
        .get(METADATA_TOKEN_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await?
        .error_for_status()?
        .json::<TokenResponse>()
        .await?;

    Ok(AccessToken::from_response(resp))
}

#[derive(Debug, Clone)]
pub enum TokenSource {
    ServiceAccountFile(String),
    MetadataServer,
}

/// Hands out bearer tokens, reusing one until it is about to expire.
pub struct TokenProvider {
    source: TokenSource,
    client: Client,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(source: TokenSource) -> Self {
        TokenProvider {
            source,
            client: Client::new(),
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        debug!("Requesting new access token via {:?}", self.source);
        let token = match &self.source {
            TokenSource::ServiceAccountFile(path) => {
                fetch_access_token_from_file(&self.client, path, BIGQUERY_SCOPE).await?
            }
            TokenSource::MetadataServer => fetch_access_token_from_metadata(&self.client).await?,
        };
        if token.token.is_empty() {
            return Err(anyhow!("token endpoint returned an empty access token"));
        }
        info!("Obtained access token valid until {}", token.expires_at);

        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}
