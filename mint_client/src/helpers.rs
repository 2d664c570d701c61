/// Joins a mint base URL and a path, tolerating a trailing slash on the base and a leading slash on the path.
pub fn mint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Normalises a mint base URL so that it always ends in exactly one slash. Trusted mint lists and deposit records
/// compare URLs in this form.
pub fn normalize_base_url(base: &str) -> String {
    format!("{}/", base.trim().trim_end_matches('/'))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn joins_urls() {
        assert_eq!(mint_url("https://mint.test/", "/transfers/ABC"), "https://mint.test/transfers/ABC");
        assert_eq!(mint_url("https://mint.test", "keys"), "https://mint.test/keys");
    }

    #[test]
    fn normalises_base_urls() {
        assert_eq!(normalize_base_url("https://mint.test"), "https://mint.test/");
        assert_eq!(normalize_base_url(" https://mint.test// "), "https://mint.test/");
    }
}
