use regex::Regex;
use lazy_static::lazy_static;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,4}").unwrap();
}

pub fn mask_pii(input: &str) -> String {
    EMAIL_REGEX.replace_all(input, "***@***.***").to_string()
}

/// True when the whole string is a single email address.
pub fn is_email(input: &str) -> bool {
    EMAIL_REGEX
        .find(input)
        .map(|m| m.start() == 0 && m.end() == input.len())
        .unwrap_or(false)
}
