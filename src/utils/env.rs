// src/utils/env.rs - .env loading for local runs
use log::debug;

/// Load variables from a .env file if one is present. Deployed environments
/// set real environment variables; absence of the file is not an error.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(_) => debug!("No .env file found, using process environment"),
    }
}
