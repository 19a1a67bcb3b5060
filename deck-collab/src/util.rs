use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use regex::Regex;

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9._-]{2,20}$").unwrap();
    static ref COMMUNITY_URL_REGEX: Regex = Regex::new(r"^[A-Za-z0-9-]{2,25}$").unwrap();
}

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Returns the lowercased username, or None if it's invalid
pub fn normalize_username(username: &str) -> Option<String> {
    USERNAME_REGEX
        .is_match(username)
        .then(|| username.to_lowercase())
}

/// Returns the lowercased community url, or None if it's invalid
pub fn normalize_community_url(url: &str) -> Option<String> {
    COMMUNITY_URL_REGEX.is_match(url).then(|| url.to_lowercase())
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 100 && email.contains('@')
}

/// Returns true if the amount of characters in `value` is within `min..=max`
pub fn length_within(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.chars().count())
}

/// Truncates `value` to at most `max` bytes without splitting a character
pub fn truncate_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }

    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }

    &value[..end]
}
