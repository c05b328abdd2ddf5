//! Backend API client with bearer-token caching and 401 recovery.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::BackendConfig;
use crate::error::BackendError;

const LOGIN_PATH: &str = "/user/login";
const BATCH_CONFIRM_PATH: &str = "/file/confirmUploadRawFile";
const INCREMENTAL_CONFIRM_PATH: &str = "/file/confirmIncrementalUploadFile";
const CREDENTIALS_PATH: &str = "/file/getS3Credentials";
const GENERATE_KEY_PATH: &str = "/file/generateUniqueKey";

/// Resource type sent with credential requests: access to a patient folder.
const PATIENT_FOLDER_RESOURCE_TYPE: i32 = 2;

#[derive(Debug, Default)]
struct Session {
    jwt_token: Option<String>,
    hospital_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "jwtToken")]
    jwt_token: String,
    #[serde(rename = "userInfo")]
    user_info: LoginUserInfo,
}

#[derive(Debug, Deserialize)]
struct LoginUserInfo {
    #[serde(rename = "hospitalId")]
    hospital_id: String,
}

/// Client for the medsignal backend API.
///
/// Thread-safe: the cached session token sits behind a mutex and all
/// methods take `&self`.
pub struct ApiClient {
    http: Client,
    config: BackendConfig,
    session: Mutex<Session>,
}

impl ApiClient {
    /// Create a client from the given configuration.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http: Client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            config,
            session: Mutex::new(Session::default()),
        })
    }

    /// Log in and cache the bearer token and hospital id.
    pub async fn login(&self) -> Result<(), BackendError> {
        let payload = json!({
            "userMessage": { "email": self.config.account },
            "password": self.config.password,
        });
        let value: Value = self
            .http_request(Method::POST, LOGIN_PATH, Some(&payload), None)
            .await?;

        let parsed: LoginResponse =
            serde_json::from_value(value).map_err(|e| BackendError::InvalidResponse {
                message: format!("login response missing fields: {}", e),
            })?;

        let mut session = self.session.lock().unwrap();
        session.jwt_token = Some(parsed.jwt_token);
        session.hospital_id = Some(parsed.user_info.hospital_id);
        log::info!("backend login succeeded for {}", self.config.account);
        Ok(())
    }

    /// The hospital id from the last successful login, if any.
    pub fn hospital_id(&self) -> Option<String> {
        self.session.lock().unwrap().hospital_id.clone()
    }

    /// Confirm a completed batch upload.
    /// Returns `{successUploads: [...], failedUploads: [...]}`.
    pub async fn confirm_upload_raw_file(&self, payload: &Value) -> Result<Value, BackendError> {
        self.request_with_token(Method::POST, BATCH_CONFIRM_PATH, Some(payload))
            .await
    }

    /// Confirm a single incrementally-appended file.
    /// Returns `{status: {code, message}}`.
    pub async fn confirm_incremental_upload_file(
        &self,
        payload: &Value,
    ) -> Result<Value, BackendError> {
        self.request_with_token(Method::POST, INCREMENTAL_CONFIRM_PATH, Some(payload))
            .await
    }

    /// Fetch temporary object-store credentials for a tenant.
    pub async fn get_s3_credentials(&self, tenant_id: &str) -> Result<Value, BackendError> {
        let payload = json!({
            "keyId": tenant_id,
            "resourceType": PATIENT_FOLDER_RESOURCE_TYPE,
        });
        self.request_with_token(Method::POST, CREDENTIALS_PATH, Some(&payload))
            .await
    }

    /// Reserve `quantity` unique data ids from the backend.
    pub async fn generate_unique_data_id(&self, quantity: u32) -> Result<Value, BackendError> {
        if quantity == 0 {
            return Err(BackendError::InvalidConfig {
                message: "quantity must be > 0".to_string(),
            });
        }
        let path: String = format!("{}/{}", GENERATE_KEY_PATH, quantity);
        self.request_with_token(Method::GET, &path, None).await
    }

    /// Perform an authenticated request, re-logging in on token expiry and
    /// retrying transient failures with exponential backoff.
    pub async fn request_with_token(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Value, BackendError> {
        let mut attempt: u32 = 0;
        loop {
            let token: String = self.bearer_token().await?;
            match self
                .http_request(method.clone(), path, payload, Some(&token))
                .await
            {
                Ok(value) => return Ok(value),
                Err(BackendError::Unauthorized) => {
                    // Token expiry is recovered by the bounded re-login
                    // alone; it does not consume the request-retry budget.
                    log::warn!("backend token rejected for {}, re-login", path);
                    self.clear_token();
                    self.login_with_retries().await?;
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.config.max_request_retries {
                        return Err(err);
                    }
                    let delay = backoff_delay(self.config.retry_backoff_unit, attempt);
                    log::warn!(
                        "backend request {} failed (attempt {}): {}, retrying in {:?}",
                        path,
                        attempt,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Current bearer token, logging in first if none is cached.
    async fn bearer_token(&self) -> Result<String, BackendError> {
        if let Some(token) = self.session.lock().unwrap().jwt_token.clone() {
            return Ok(token);
        }
        self.login().await?;
        self.session
            .lock()
            .unwrap()
            .jwt_token
            .clone()
            .ok_or_else(|| BackendError::LoginFailed {
                message: "login did not produce a token".to_string(),
            })
    }

    fn clear_token(&self) {
        self.session.lock().unwrap().jwt_token = None;
    }

    async fn login_with_retries(&self) -> Result<(), BackendError> {
        let mut attempt: u32 = 0;
        loop {
            match self.login().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.config.max_login_retries {
                        return Err(BackendError::LoginFailed {
                            message: err.to_string(),
                        });
                    }
                    let delay = backoff_delay(self.config.retry_backoff_unit, attempt);
                    log::warn!("login attempt {} failed: {}, retrying in {:?}", attempt, err, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn http_request(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Value, BackendError> {
        let url: String = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let mut request = self
            .http
            .request(method, &url)
            .header("Accept", "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request.send().await?;
        let status: StatusCode = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized);
        }

        let body: String = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse {
                message: format!("invalid JSON response: {} (raw: {})", e, body),
            })?;
        Ok(unwrap_data(value))
    }
}

/// Backoff before retry `attempt`: `(1 << attempt) * unit`.
fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    unit * (1u32 << attempt.min(16))
}

/// If the response carries a `data` field, return that field; otherwise the
/// whole document.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
