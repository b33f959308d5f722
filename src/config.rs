use anyhow::{Context, bail};
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub cc: Vec<String>,
    pub test_recipient: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub site_url: String,
    pub info_url: String,
    pub couple_name: String,
    pub wedding_date: String,
    pub wedding_location: String,
    pub admin_username: String,
    pub admin_password: Option<String>,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub email: EmailConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // A missing .env file is fine, the variables may come from the environment.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let site_url = var("WEDDING_WEBSITE_URL").context("WEDDING_WEBSITE_URL is not set")?;
        let info_url = var("WEDDING_INFO_URL").unwrap_or_else(|| site_url.clone());

        let port = match var("EMAIL_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("EMAIL_PORT is not a valid port: {port}"))?,
            None => 587,
        };
        let use_tls = match var("EMAIL_USE_TLS") {
            Some(flag) => parse_flag(&flag)
                .with_context(|| format!("EMAIL_USE_TLS is not a boolean: {flag}"))?,
            None => true,
        };
        let cc = var("WEDDING_CC_LIST")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|addr| !addr.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".into()),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            site_url,
            info_url,
            couple_name: var("BRIDE_AND_GROOM").unwrap_or_default().trim().to_string(),
            wedding_date: var("WEDDING_DATE").unwrap_or_default(),
            wedding_location: var("WEDDING_LOCATION").unwrap_or_default(),
            admin_username: var("ADMIN_USERNAME").unwrap_or_else(|| "admin".into()),
            admin_password: var("ADMIN_PASSWORD"),
            templates_dir: var("TEMPLATES_DIR")
                .unwrap_or_else(|| "templates".into())
                .into(),
            static_dir: var("STATIC_DIR").unwrap_or_else(|| "static".into()).into(),
            email: EmailConfig {
                host: var("EMAIL_HOST"),
                port,
                username: var("EMAIL_HOST_USER"),
                password: var("EMAIL_HOST_PASSWORD"),
                use_tls,
                from: var("DEFAULT_WEDDING_EMAIL"),
                reply_to: var("DEFAULT_WEDDING_REPLY_EMAIL"),
                cc,
                test_recipient: var("DEFAULT_WEDDING_TEST_EMAIL"),
            },
        })
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("expected true or false"),
    }
}
