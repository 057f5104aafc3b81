use super::DiscoveryConfig;

impl DiscoveryConfig {
    /// Apply `APIGEE_*` environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    ///
    /// Unparseable numeric values are ignored and the existing value is kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let strings: [(&str, &mut String); 11] = [
            ("APIGEE_ORGANIZATION", &mut self.organization),
            ("APIGEE_URL", &mut self.url),
            ("APIGEE_API_VERSION", &mut self.api_version),
            ("APIGEE_DATA_URL", &mut self.data_url),
            ("APIGEE_AUTH_USERNAME", &mut self.auth.username),
            ("APIGEE_AUTH_PASSWORD", &mut self.auth.password),
            ("APIGEE_AUTH_TOKEN_URL", &mut self.auth.token_url),
            ("APIGEE_FILTER", &mut self.filter),
            ("APIGEE_SPEC_FILTER", &mut self.spec_filter),
            ("APIGEE_DEVELOPER_ID", &mut self.developer_id),
            ("APIGEE_AUTH_CLIENT_ID", &mut self.auth.client_id),
        ];
        for (key, slot) in strings {
            if let Some(v) = lookup(key) {
                *slot = v;
            }
        }

        let intervals: [(&str, &mut u64); 5] = [
            ("APIGEE_INTERVAL_PROXY", &mut self.intervals.proxy_seconds),
            ("APIGEE_INTERVAL_SPEC", &mut self.intervals.spec_seconds),
            ("APIGEE_INTERVAL_PRODUCT", &mut self.intervals.product_seconds),
            ("APIGEE_INTERVAL_PORTAL", &mut self.intervals.portal_seconds),
            ("APIGEE_INTERVAL_API", &mut self.intervals.api_seconds),
        ];
        for (key, slot) in intervals {
            if let Some(n) = lookup(key).and_then(|v| v.parse::<u64>().ok()) {
                *slot = n;
            }
        }

        if let Some(n) = lookup("APIGEE_PAGE_SIZE").and_then(|v| v.parse::<usize>().ok()) {
            self.page_size = n;
        }
        if let Some(v) = lookup("APIGEE_AUTH_CLIENT_SECRET") {
            self.auth.client_secret = v;
        }
    }
}
