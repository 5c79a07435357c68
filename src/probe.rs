//! Classify candidate course pages as active or not

use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::net::{FetchedPage, HttpClient};

/// Substring of the generic search page that missing courses redirect to
pub const GENERIC_SEARCH_SUBSTRING: &str = "/course-search/";

static ACTIVE_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Start:\s*(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s+\d{4}",
    )
    .unwrap()
});

/// Candidate detail page URL for a course code ("S001") and year
pub fn candidate_url(base_url: &str, s_code: &str, year: i32) -> String {
    format!("{}/{}/{}/", base_url.trim_end_matches('/'), s_code, year)
}

/// The course-code and year tokens: the last two path segments of a candidate URL
fn url_tokens(url: &str) -> Option<(&str, &str)> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let year = segments.next()?;
    let s_code = segments.next()?;
    Some((s_code, year))
}

/// Decide whether a fetched page is a real course page for the requested URL
pub fn is_active_candidate(requested_url: &str, final_url: &str, status: StatusCode, body: &str) -> bool {
    if !status.is_success() {
        return false;
    }

    if final_url.contains(GENERIC_SEARCH_SUBSTRING) && !requested_url.contains(GENERIC_SEARCH_SUBSTRING) {
        debug!("{} redirected to the generic search page", requested_url);
        return false;
    }

    let Some((s_code, year)) = url_tokens(requested_url) else {
        return false;
    };
    if !(final_url.contains(s_code) && final_url.contains(year)) {
        debug!("Final URL {} lost {}/{}", final_url, s_code, year);
        return false;
    }

    ACTIVE_CONTENT_RE.is_match(body)
}

/// Fetch a candidate and return the page only if it is active. Never fails.
pub fn probe(client: &HttpClient, url: &str) -> Option<FetchedPage> {
    match client.get(url) {
        Ok(page) if is_active_candidate(url, &page.final_url, page.status, &page.body) => Some(page),
        Ok(_) => None,
        Err(e) => {
            warn!("{:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::test_server::{fast_client, response, serve};
    use std::net::TcpListener;

    const BASE: &str = "https://www.mfri.org/course/msfs/FIRE/101";
    const ACTIVE_BODY: &str = "<p class=\"intro\">Start: March 3, 2025<br>End: March 10, 2025</p>";

    #[test]
    fn test_candidate_url() {
        assert_eq!(
            candidate_url(BASE, "S001", 2025),
            "https://www.mfri.org/course/msfs/FIRE/101/S001/2025/"
        );
    }

    #[test]
    fn test_active_page() {
        let url = candidate_url(BASE, "S001", 2025);
        assert!(is_active_candidate(&url, &url, StatusCode::OK, ACTIVE_BODY));
    }

    #[test]
    fn test_missing_start_marker_is_inactive() {
        let url = candidate_url(BASE, "S001", 2025);
        let body = "<p>Start: TBA</p>";
        assert!(!is_active_candidate(&url, &url, StatusCode::OK, body));
        assert!(!is_active_candidate(&url, &url, StatusCode::NOT_FOUND, body));
    }

    #[test]
    fn test_error_status_is_inactive() {
        let url = candidate_url(BASE, "S001", 2025);
        assert!(!is_active_candidate(&url, &url, StatusCode::INTERNAL_SERVER_ERROR, ACTIVE_BODY));
    }

    #[test]
    fn test_redirect_losing_tokens_is_inactive() {
        let url = candidate_url(BASE, "S001", 2025);
        let other_year = "https://www.mfri.org/course/msfs/FIRE/101/S001/2024/";
        let other_code = "https://www.mfri.org/course/msfs/FIRE/101/S002/2025/";
        assert!(!is_active_candidate(&url, other_year, StatusCode::OK, ACTIVE_BODY));
        assert!(!is_active_candidate(&url, other_code, StatusCode::OK, ACTIVE_BODY));

        let moved = "https://www.mfri.org/programs/msfs/FIRE/101/S001/2025/";
        assert!(is_active_candidate(&url, moved, StatusCode::OK, ACTIVE_BODY));
    }

    #[test]
    fn test_redirect_to_search_is_inactive() {
        let url = candidate_url(BASE, "S001", 2025);
        let search = "https://www.mfri.org/course-search/?q=S001&y=2025";
        assert!(!is_active_candidate(&url, search, StatusCode::OK, ACTIVE_BODY));
    }

    #[test]
    fn test_refused_connection_is_inactive() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let url = candidate_url(&format!("http://{}/course", addr), "S001", 2025);
        assert!(probe(&fast_client(), &url).is_none());
    }

    #[test]
    fn test_probe_returns_active_page() {
        let (addr, _) = serve(|path, _| match path {
            "/course/S001/2025/" => response("200 OK", ACTIVE_BODY),
            _ => response("200 OK", "<p>Start: TBA</p>"),
        });
        let base = format!("http://{}/course", addr);

        let page = probe(&fast_client(), &candidate_url(&base, "S001", 2025)).unwrap();
        assert!(page.body.contains("March 3, 2025"));
        assert!(probe(&fast_client(), &candidate_url(&base, "S002", 2025)).is_none());
    }
}
