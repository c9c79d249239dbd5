use envconfig::Envconfig;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "DATABASE_URL")]
    pub db_url: String,
    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,
    /// Base64-encoded HMAC key for session cookies.
    #[envconfig(from = "SESSION_SECRET")]
    pub session_secret: String,
    #[envconfig(from = "COOKIE_SECURE", default = "false")]
    pub cookie_secure: bool,
    #[envconfig(from = "STATIC_DIR", default = "assets")]
    pub static_dir: String,
    #[envconfig(from = "STRIPE_SECRET_KEY")]
    pub stripe_secret_key: Option<String>,
    #[envconfig(from = "STRIPE_WEBHOOK_SECRET")]
    pub stripe_webhook_secret: Option<String>,
    #[envconfig(from = "STRIPE_API_BASE", default = "https://api.stripe.com")]
    pub stripe_api_base: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_fill_in_optional_settings() {
        let env = HashMap::from([
            ("DATABASE_URL".to_string(), "postgres://localhost/univo".to_string()),
            ("SESSION_SECRET".to_string(), "c2VjcmV0".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.cookie_secure);
        assert_eq!(config.static_dir, "assets");
        assert!(config.stripe_secret_key.is_none());
        assert_eq!(config.stripe_api_base, "https://api.stripe.com");
    }
}
