use std::env;
use std::fs;
use std::path::PathBuf;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct ApiToken {
    value: String,
}

impl ApiToken {
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Resolves the API token: `DOCCHAT_API_TOKEN` wins, otherwise a token is
/// generated once and persisted next to the database so local clients can
/// pick it up.
pub fn init_api_token(paths: &AppPaths) -> ApiToken {
    if let Ok(token) = env::var("DOCCHAT_API_TOKEN") {
        if !token.trim().is_empty() {
            return ApiToken { value: token };
        }
    }

    let token_path = api_token_path(paths);
    if let Ok(existing) = fs::read_to_string(&token_path) {
        let existing = existing.trim().to_string();
        if !existing.is_empty() {
            return ApiToken { value: existing };
        }
    }

    let token = format!("{}{}", Uuid::new_v4(), Uuid::new_v4());
    if let Err(err) = fs::write(&token_path, &token) {
        tracing::warn!("Failed to persist API token: {}", err);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(&token_path) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            let _ = fs::set_permissions(&token_path, perms);
        }
    }

    ApiToken { value: token }
}

pub fn require_api_key(headers: &HeaderMap, token: &ApiToken) -> Result<(), ApiError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if provided.is_empty() || provided != token.value() {
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}

fn api_token_path(paths: &AppPaths) -> PathBuf {
    paths.user_data_dir.join(".api_token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn token() -> ApiToken {
        ApiToken {
            value: "secret".to_string(),
        }
    }

    #[test]
    fn missing_header_is_rejected() {
        let headers = HeaderMap::new();
        assert!(require_api_key(&headers, &token()).is_err());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("nope"));
        assert!(require_api_key(&headers, &token()).is_err());
    }

    #[test]
    fn matching_key_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        assert!(require_api_key(&headers, &token()).is_ok());
    }
}
