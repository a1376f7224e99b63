use std::env;

/// Runtime settings, collected from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub upload_dir: String,
}

pub fn get_configuration() -> anyhow::Result<Settings> {
    let database_url =
        env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let port = env::var("APP_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .map_err(|_| anyhow::anyhow!("APP_PORT must be a port number"))?;

    Ok(Settings {
        database_url,
        host: env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port,
        upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "media".to_string()),
    })
}
