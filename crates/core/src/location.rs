//! Document URL helpers
//!
//! The browser reports absolute URLs; everything downstream works on the
//! decoded path component.

use percent_encoding::percent_decode_str;
use url::Url;

/// Extract the percent-decoded path of a document URL
///
/// Accepts absolute URLs (`http://host:port/css/a.css?v=2`) as well as bare
/// absolute paths (`/css/a.css`). Query and fragment are dropped.
pub fn document_path(document_url: &str) -> Option<String> {
    let raw = match Url::parse(document_url) {
        Ok(url) => url.path().to_string(),
        Err(_) if document_url.starts_with('/') => document_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
        Err(_) => return None,
    };

    Some(percent_decode_str(&raw).decode_utf8_lossy().into_owned())
}

/// Last non-empty path segment, used to match stylesheets by file name
pub fn filename_hint(document_url: &str) -> Option<String> {
    let path = document_path(document_url)?;
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Check if `entry_url` lives under the directory of `page_url`
///
/// Reloading `http://h/app/index.html` covers every stylesheet below
/// `http://h/app/` on the same origin.
pub fn is_under(entry_url: &str, page_url: &str) -> bool {
    match (Url::parse(entry_url), Url::parse(page_url)) {
        (Ok(entry), Ok(page)) => {
            if entry.origin() != page.origin() {
                return false;
            }
            entry.path().starts_with(directory_of(page.path()))
        }
        // Non-URL inputs fall back to comparing paths
        _ => match (document_path(entry_url), document_path(page_url)) {
            (Some(entry), Some(page)) => entry.starts_with(directory_of(&page)),
            _ => entry_url == page_url,
        },
    }
}

fn directory_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_path() {
        assert_eq!(
            document_path("http://localhost:8080/css/main.css?v=3#x").as_deref(),
            Some("/css/main.css")
        );
        assert_eq!(
            document_path("http://localhost/my%20styles/a.css").as_deref(),
            Some("/my styles/a.css")
        );
        assert_eq!(document_path("/css/a.css?x=1").as_deref(), Some("/css/a.css"));
        assert_eq!(document_path("not a url"), None);
    }

    #[test]
    fn test_filename_hint() {
        assert_eq!(
            filename_hint("http://localhost/css/main.css").as_deref(),
            Some("main.css")
        );
        assert_eq!(filename_hint("http://localhost/css/").as_deref(), Some("css"));
        assert_eq!(filename_hint("http://localhost/"), None);
    }

    #[test]
    fn test_is_under() {
        let page = "http://localhost:8080/app/index.html";
        assert!(is_under("http://localhost:8080/app/css/main.css", page));
        assert!(is_under("http://localhost:8080/app/index.html", page));
        assert!(!is_under("http://localhost:8080/other/main.css", page));
        assert!(!is_under("http://example.com/app/css/main.css", page));

        // Root page covers the whole origin
        assert!(is_under("http://localhost:8080/x/y.css", "http://localhost:8080/"));
    }
}
