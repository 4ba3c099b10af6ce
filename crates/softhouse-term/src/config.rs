use anyhow::{Context, Result};
use url::Url;

const DEFAULT_CHAT_URL: &str = "wss://agent-dev-chat.onrender.com";
const DEFAULT_REDIRECT_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: Url,
    pub anon_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chat_url: Url,
    /// Unset means the offline demo sign-in is used instead.
    pub supabase: Option<SupabaseConfig>,
    pub redirect_url: String,
    pub access_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let chat_url = var("SOFTHOUSE_CHAT_URL").unwrap_or_else(|| DEFAULT_CHAT_URL.into());
        let chat_url = Url::parse(&chat_url)
            .with_context(|| format!("SOFTHOUSE_CHAT_URL is not a valid URL: {}", chat_url))?;

        let supabase = match var("SOFTHOUSE_SUPABASE_URL") {
            Some(url) => Some(SupabaseConfig {
                url: Url::parse(&url).with_context(|| {
                    format!("SOFTHOUSE_SUPABASE_URL is not a valid URL: {}", url)
                })?,
                anon_key: var("SOFTHOUSE_SUPABASE_ANON_KEY").unwrap_or_default(),
            }),
            None => None,
        };

        Ok(Self {
            chat_url,
            supabase,
            redirect_url: var("SOFTHOUSE_REDIRECT_URL")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URL.into()),
            access_token: var("SOFTHOUSE_ACCESS_TOKEN"),
        })
    }
}
