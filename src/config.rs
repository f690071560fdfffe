use std::env;

use crate::error::{HubError, Result};

const DEFAULT_BACKEND_PORT: u16 = 3333;
const DEFAULT_DATABASE_PATH: &str = "processor.db";
const DEFAULT_SECRET_PATH: &str = "SECRET";

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub hub_identifier: String,
    pub backend_host: String,
    pub backend_port: u16,
    /// Serial device name; `None` means run without hardware.
    pub serial_port: Option<String>,
    pub database_path: String,
    pub secret_path: String,
}

impl HubConfig {
    pub fn new() -> Result<Self> {
        // Load environment variables
        dotenv::dotenv().ok();

        let hub_identifier = env::var("HUB_IDENTIFIER_NO").map_err(|_| {
            HubError::Config("HUB_IDENTIFIER_NO environment variable not set".to_string())
        })?;

        let backend_host = env::var("BACKEND_HOST").map_err(|_| {
            HubError::Config("BACKEND_HOST environment variable not set".to_string())
        })?;

        let backend_port = match env::var("BACKEND_PORT") {
            Ok(raw) => raw.parse().map_err(|_| {
                HubError::Config(format!("BACKEND_PORT is not a valid port: {}", raw))
            })?,
            Err(_) => DEFAULT_BACKEND_PORT,
        };

        // An absent serial port means "run headless", not a configuration
        // error.
        let serial_port = env::var("COM_PORT").ok().filter(|port| !port.is_empty());

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());
        let secret_path =
            env::var("SECRET_PATH").unwrap_or_else(|_| DEFAULT_SECRET_PATH.to_string());

        Ok(HubConfig {
            hub_identifier,
            backend_host,
            backend_port,
            serial_port,
            database_path,
            secret_path,
        })
    }

    /// Base URL of the backend API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/api", self.backend_host, self.backend_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_joins_host_and_port() {
        let config = HubConfig {
            hub_identifier: "HUB-001".to_string(),
            backend_host: "192.168.1.132".to_string(),
            backend_port: 3333,
            serial_port: None,
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            secret_path: DEFAULT_SECRET_PATH.to_string(),
        };
        assert_eq!(config.base_url(), "http://192.168.1.132:3333/api");
    }
}
