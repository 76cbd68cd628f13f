// src/utils/cookie.rs

use axum::http::{HeaderValue, header::InvalidHeaderValue};

use crate::config::{AUTH_COOKIE, Config};

/// Finds `name` in a `Cookie` request header.
pub fn read_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(token: &str, config: &Config) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax",
        AUTH_COOKIE, token, config.jwt_expiration
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// `Set-Cookie` value that expires the session cookie.
pub fn clear_session_cookie(config: &Config) -> HeaderValue {
    let secure = if config.cookie_secure { "; Secure" } else { "" };
    let cookie = format!(
        "{}=; HttpOnly; Path=/; Max-Age=0; SameSite=Lax{}",
        AUTH_COOKIE, secure
    );
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static("token=; Max-Age=0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_named_cookie_among_others() {
        let header = "a=1; token=xyz; b=2";
        assert_eq!(read_cookie(header, "token").as_deref(), Some("xyz"));
        assert_eq!(read_cookie(header, "missing"), None);
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        assert_eq!(read_cookie("token=", "token"), None);
    }

    #[test]
    fn session_cookie_is_http_only_and_secure_when_configured() {
        let mut config = Config::for_tests("postgres://unused", "s");
        config.cookie_secure = true;
        let value = session_cookie("abc", &config).unwrap();
        let text = value.to_str().unwrap();
        assert!(text.starts_with("token=abc;"));
        assert!(text.contains("HttpOnly"));
        assert!(text.ends_with("; Secure"));
    }
}
