use serde_json::Value;

pub const API_TOKEN_ENV: &str = "DOORAY_API_TOKEN";

/// Resolves the process credential: an explicit override wins, otherwise the
/// environment. One token per process lifetime; a missing token is reported
/// to the caller, which treats it as fatal at startup.
pub fn resolve_token(explicit: Option<String>) -> Result<String, String> {
    if let Some(token) = explicit {
        if !token.trim().is_empty() {
            return Ok(token);
        }
    }
    match std::env::var(API_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(format!(
            "No API token found. Set {API_TOKEN_ENV} or pass --token."
        )),
    }
}

/// Pulls a filename out of a Content-Disposition header, preferring the
/// RFC 5987 `filename*` form (percent-encoded, optional charset prefix)
/// over the plain quoted form.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("filename*=") {
            let rest = rest.trim_matches('"');
            let encoded = rest.split_once("''").map_or(rest, |(_, enc)| enc);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        }
    }
    for part in header.split(';') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("filename=") {
            let name = rest.trim().trim_matches('"');
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
