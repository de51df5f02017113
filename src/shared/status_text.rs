use hyper::StatusCode;

/// Canonical reason phrase for `status`, empty when the code has none.
///
/// hyper does not surface the reason phrase sent on the wire, so the
/// registered phrase stands in for it.
pub fn status_text(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(status_text(200), "OK");
        assert_eq!(status_text(404), "Not Found");
        assert_eq!(status_text(418), "I'm a teapot");
        assert_eq!(status_text(503), "Service Unavailable");
    }

    #[test]
    fn test_unregistered_codes_are_empty() {
        assert_eq!(status_text(599), "");
        assert_eq!(status_text(299), "");
        assert_eq!(status_text(1000), "");
    }
}
