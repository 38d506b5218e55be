/// Crate version as published in Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent advertised by HTTP probes. Kept wire-compatible with the
/// Uptime-Kuma agent string so endpoints that allowlist it keep working.
pub fn http_user_agent() -> String {
    format!("Uptime-Kuma/{VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_version() {
        assert!(http_user_agent().starts_with("Uptime-Kuma/"));
        assert!(http_user_agent().ends_with(VERSION));
    }
}
