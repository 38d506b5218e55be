use std::env;

#[derive(Clone)]
pub struct ServerConfig {
    pub database_url: String,
    /// Demo deployments clamp the beat interval so a shared instance
    /// cannot be driven into hammering targets.
    pub demo_mode: bool,
    pub steam_api_key: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let demo_mode = env::var("DEMO_MODE")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let steam_api_key = env::var("STEAM_API_KEY").ok().filter(|key| !key.is_empty());

        Ok(ServerConfig {
            database_url,
            demo_mode,
            steam_api_key,
        })
    }
}
