use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

fn first_cap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("static regex"))
}

fn all_cap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"))
}

/// Convert an identifier-style name (`RestrictedModel`, `HTTPRequest`) into
/// its lowercase snake_case form (`restricted_model`, `http_request`).
pub fn camel_to_snake(name: &str) -> String {
    let s1 = first_cap_re().replace_all(name, "${1}_${2}");
    all_cap_re().replace_all(&s1, "${1}_${2}").to_lowercase()
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}
