//! TTLock open-platform client.
//!
//! Every endpoint is a form-encoded POST. Success is `errcode == 0` (or no
//! errcode at all for the OAuth and list endpoints); anything else is mapped
//! onto [`LockApiError`] so the engine can classify it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockwarden_core::config::TtlockConfig;
use lockwarden_core::error::{LockwardenError, Result};
use lockwarden_core::traits::{AccessToken, LockApi, LockApiError, LockInfo};
use lockwarden_core::types::LockStatus;
use md5::{Digest, Md5};
use serde_json::Value;

/// Codes the platform uses for bad or expired credentials.
const AUTH_ERRCODES: [i64; 5] = [10003, 10004, 10007, 10011, 80000];

/// Gateway busy; the lock did not execute the command.
pub const ERRCODE_GATEWAY_BUSY: i64 = -3037;

/// HTTP client for one TTLock account.
pub struct TtlockClient {
    api_base: String,
    client_id: String,
    client_secret: String,
    username: String,
    /// MD5 hex of the account password, as the OAuth endpoint expects it.
    password_md5: String,
    client: reqwest::Client,
}

impl TtlockClient {
    pub fn from_config(config: &TtlockConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LockwardenError::Lock(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            username: config.username.clone(),
            password_md5: md5_hex(&config.password),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// POST a form and decode the JSON body.
    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> std::result::Result<Value, LockApiError> {
        let url = self.url(path);
        let resp = self
            .client
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LockApiError::Auth(format!("HTTP {status} from {path}")));
        }

        let text = resp.text().await.map_err(|e| classify_transport(&e))?;
        tracing::debug!("TTLock {path} → {status}: {text}");

        if !status.is_success() {
            return Err(LockApiError::Network(format!("HTTP {status} from {path}")));
        }

        serde_json::from_str(&text)
            .map_err(|e| LockApiError::Malformed(format!("{path}: {e}")))
    }

    fn lock_form(&self, token: &AccessToken, lock_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("clientId", self.client_id.clone()),
            ("accessToken", token.value.clone()),
            ("lockId", lock_id.to_string()),
            ("date", now_millis()),
        ]
    }
}

#[async_trait]
impl LockApi for TtlockClient {
    async fn authenticate(&self) -> std::result::Result<AccessToken, LockApiError> {
        if self.client_id.is_empty() || self.username.is_empty() {
            return Err(LockApiError::Auth("TTLock credentials are not configured".into()));
        }
        let form = [
            ("username", self.username.clone()),
            ("password", self.password_md5.clone()),
            ("clientId", self.client_id.clone()),
            ("clientSecret", self.client_secret.clone()),
        ];
        let json = self.post_form("/oauth2/token", &form).await?;
        let token = parse_token(&json, Utc::now())?;
        tracing::info!("🔑 TTLock token acquired (expires {})", token.expires_at);
        Ok(token)
    }

    async fn list_locks(&self, token: &AccessToken) -> std::result::Result<Vec<LockInfo>, LockApiError> {
        let form = [
            ("clientId", self.client_id.clone()),
            ("accessToken", token.value.clone()),
            ("pageNo", "1".to_string()),
            ("pageSize", "20".to_string()),
            ("date", now_millis()),
        ];
        let json = self.post_form("/v3/lock/list", &form).await?;
        parse_lock_list(&json)
    }

    async fn unlock(&self, token: &AccessToken, lock_id: &str) -> std::result::Result<(), LockApiError> {
        let json = self.post_form("/v3/lock/unlock", &self.lock_form(token, lock_id)).await?;
        check_errcode(&json)
    }

    async fn lock(&self, token: &AccessToken, lock_id: &str) -> std::result::Result<(), LockApiError> {
        let json = self.post_form("/v3/lock/lock", &self.lock_form(token, lock_id)).await?;
        check_errcode(&json)
    }

    async fn status(&self, token: &AccessToken, lock_id: &str) -> std::result::Result<LockStatus, LockApiError> {
        let form = self.lock_form(token, lock_id);
        let state = self.post_form("/v3/lock/queryStatus", &form).await?;
        check_errcode(&state)?;

        // Battery is a separate call; a failure there only loses that half.
        let battery = match self.post_form("/v3/lock/detail", &form).await {
            Ok(detail) => check_errcode(&detail).ok().and_then(|_| parse_battery(&detail)),
            Err(e) => {
                tracing::debug!("TTLock lock detail unavailable: {e}");
                None
            }
        };

        Ok(LockStatus {
            locked: parse_locked(&state),
            battery_pct: battery,
        })
    }
}

/// Lowercase hex MD5, the password format the OAuth endpoint expects.
pub fn md5_hex(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn now_millis() -> String {
    Utc::now().timestamp_millis().to_string()
}

fn classify_transport(err: &reqwest::Error) -> LockApiError {
    if err.is_timeout() {
        LockApiError::Timeout
    } else if err.is_decode() {
        LockApiError::Malformed(err.to_string())
    } else {
        LockApiError::Network(err.to_string())
    }
}

fn errcode(json: &Value) -> Option<i64> {
    json.get("errcode").and_then(Value::as_i64)
}

fn errmsg(json: &Value) -> String {
    json.get("errmsg")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string()
}

fn code_to_error(code: i64, message: String) -> LockApiError {
    if AUTH_ERRCODES.contains(&code) {
        LockApiError::Auth(format!("{message} (code {code})"))
    } else {
        LockApiError::Rejected { code, message }
    }
}

/// Command endpoints report success only as an explicit `errcode: 0`.
pub fn check_errcode(json: &Value) -> std::result::Result<(), LockApiError> {
    match errcode(json) {
        Some(0) => Ok(()),
        Some(code) => Err(code_to_error(code, errmsg(json))),
        None => Err(LockApiError::Malformed(format!("response without errcode: {json}"))),
    }
}

/// Decode `/oauth2/token`. Any errcode here means the credentials were refused.
pub fn parse_token(json: &Value, now: DateTime<Utc>) -> std::result::Result<AccessToken, LockApiError> {
    if let Some(token) = json.get("access_token").and_then(Value::as_str)
        && !token.is_empty()
    {
        let expires_in = json.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);
        return Ok(AccessToken {
            value: token.to_string(),
            expires_at: now + chrono::Duration::seconds(expires_in.max(0)),
        });
    }
    match errcode(json) {
        Some(code) => Err(LockApiError::Auth(format!("{} (code {code})", errmsg(json)))),
        None => Err(LockApiError::Malformed("token response without access_token".into())),
    }
}

/// Decode `/v3/lock/list`. A missing errcode with a `list` is a success.
pub fn parse_lock_list(json: &Value) -> std::result::Result<Vec<LockInfo>, LockApiError> {
    if let Some(code) = errcode(json)
        && code != 0
    {
        return Err(code_to_error(code, errmsg(json)));
    }
    let Some(list) = json.get("list").and_then(Value::as_array) else {
        return Err(LockApiError::Malformed("lock list without `list`".into()));
    };

    Ok(list
        .iter()
        .filter_map(|entry| {
            let lock_id = match entry.get("lockId")? {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return None,
            };
            Some(LockInfo {
                lock_id,
                name: entry.get("lockName").and_then(Value::as_str).map(String::from),
                alias: entry.get("lockAlias").and_then(Value::as_str).map(String::from),
                battery_pct: parse_battery(entry),
            })
        })
        .collect())
}

/// `lockStatus`: 1 locked, 2 unlocked, anything else unknown.
pub fn parse_locked(json: &Value) -> Option<bool> {
    match json.get("lockStatus").and_then(Value::as_i64) {
        Some(1) => Some(true),
        Some(2) => Some(false),
        _ => None,
    }
}

pub fn parse_battery(json: &Value) -> Option<u8> {
    json.get("electricQuantity")
        .and_then(Value::as_i64)
        .filter(|pct| (0..=100).contains(pct))
        .map(|pct| pct as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("password"), "5f4dcc3b5aa765d61d8327deb882cf99");
    }

    #[test]
    fn test_parse_token() {
        let now = Utc::now();
        let token = parse_token(&json!({"access_token": "tok", "expires_in": 7776000}), now).unwrap();
        assert_eq!(token.value, "tok");
        assert_eq!(token.expires_at, now + chrono::Duration::seconds(7776000));

        let err = parse_token(&json!({"errcode": 10007, "errmsg": "invalid password"}), now).unwrap_err();
        assert!(matches!(err, LockApiError::Auth(_)));

        let err = parse_token(&json!({}), now).unwrap_err();
        assert!(matches!(err, LockApiError::Malformed(_)));
    }

    #[test]
    fn test_check_errcode_classification() {
        assert!(check_errcode(&json!({"errcode": 0, "errmsg": "none error message"})).is_ok());

        let busy = check_errcode(&json!({"errcode": ERRCODE_GATEWAY_BUSY, "errmsg": "gateway busy"}));
        assert_eq!(
            busy,
            Err(LockApiError::Rejected {
                code: -3037,
                message: "gateway busy".into()
            })
        );

        let expired = check_errcode(&json!({"errcode": 10004, "errmsg": "invalid grant"}));
        assert!(matches!(expired, Err(LockApiError::Auth(_))));

        assert!(matches!(
            check_errcode(&json!({"lockStatus": 1})),
            Err(LockApiError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_lock_list() {
        let json = json!({
            "list": [
                {"lockId": 3306841, "lockName": "S31_a1b2", "lockAlias": "Front door", "electricQuantity": 87},
                {"lockId": "42", "lockName": "Back"},
                {"lockName": "no id"}
            ],
            "pageNo": 1,
            "pageSize": 20,
            "total": 3
        });
        let locks = parse_lock_list(&json).unwrap();
        assert_eq!(locks.len(), 2);
        assert_eq!(locks[0].lock_id, "3306841");
        assert_eq!(locks[0].alias.as_deref(), Some("Front door"));
        assert_eq!(locks[0].battery_pct, Some(87));
        assert_eq!(locks[1].lock_id, "42");
        assert_eq!(locks[1].battery_pct, None);

        let err = parse_lock_list(&json!({"errcode": 10003, "errmsg": "invalid token"})).unwrap_err();
        assert!(matches!(err, LockApiError::Auth(_)));
    }

    #[test]
    fn test_parse_status_fields() {
        assert_eq!(parse_locked(&json!({"errcode": 0, "lockStatus": 1})), Some(true));
        assert_eq!(parse_locked(&json!({"errcode": 0, "lockStatus": 2})), Some(false));
        assert_eq!(parse_locked(&json!({"errcode": 0, "lockStatus": 0})), None);
        assert_eq!(parse_battery(&json!({"electricQuantity": 64})), Some(64));
        assert_eq!(parse_battery(&json!({"electricQuantity": -1})), None);
    }

    #[tokio::test]
    async fn test_authenticate_without_credentials() {
        let client = TtlockClient::from_config(&TtlockConfig::default()).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, LockApiError::Auth(_)));
    }
}
