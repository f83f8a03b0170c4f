//! Resolution of stored media references to retrievable URLs.
//!
//! Upload handling belongs to the external media service; the core only
//! turns the opaque references it holds (avatar references in particular)
//! into URLs a client can fetch.

/// Joins stored media references onto a configured base URL.
#[derive(Debug, Clone)]
pub struct MediaService {
    base_url: String,
}

impl MediaService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Resolve a reference to a URL.  References that are already absolute
    /// pass through untouched.
    pub fn resolve(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_string();
        }
        format!("{}/{}", self.base_url, reference.trim_start_matches('/'))
    }

    /// Convenience for optional references.
    pub fn resolve_opt(&self, reference: Option<&str>) -> Option<String> {
        reference.map(|r| self.resolve(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_references_are_joined() {
        let media = MediaService::new("http://localhost:8080/media/");
        assert_eq!(
            media.resolve("avatars/ada.png"),
            "http://localhost:8080/media/avatars/ada.png"
        );
        assert_eq!(
            media.resolve("/avatars/ada.png"),
            "http://localhost:8080/media/avatars/ada.png"
        );
    }

    #[test]
    fn absolute_references_pass_through() {
        let media = MediaService::new("http://localhost:8080/media");
        assert_eq!(
            media.resolve("https://cdn.example.com/ada.png"),
            "https://cdn.example.com/ada.png"
        );
    }

    #[test]
    fn optional_references() {
        let media = MediaService::new("http://localhost:8080/media");
        assert_eq!(media.resolve_opt(None), None);
        assert!(media.resolve_opt(Some("x.png")).is_some());
    }
}
