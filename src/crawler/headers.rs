use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER, USER_AGENT,
};

/// Pool of realistic User-Agent strings for rotation
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

/// Pick a user agent from the rotation pool
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}

fn insert_common(headers: &mut HeaderMap, user_agent: &str, referer: &str) {
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(REFERER, value);
    }
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("pl-PL,pl;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
}

/// Headers for full page loads (booking page, form submission)
///
/// # Examples
///
/// ```
/// use slotwatch::crawler::headers::build_page_headers;
///
/// let headers = build_page_headers("Mozilla/5.0", "https://example.org/booking/");
/// assert!(headers.contains_key("referer"));
/// ```
pub fn build_page_headers(user_agent: &str, referer: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_common(&mut headers, user_agent, referer);

    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );

    headers
}

/// Headers for the per-date AJAX probe
///
/// The probe endpoint only answers form-encoded XHR requests.
pub fn build_probe_headers(user_agent: &str, referer: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_common(&mut headers, user_agent, referer);

    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html, */*; q=0.01"),
    );
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
    );

    headers
}
