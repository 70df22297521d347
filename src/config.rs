use clap::Parser;

// Alternate names the store credentials are published under by hosting integrations
const STORE_URL_ALIASES: [&str; 3] = ["KV_REST_API_URL", "REDIS_REST_URL", "KV_URL"];
const STORE_TOKEN_ALIASES: [&str; 3] = [
    "KV_REST_API_TOKEN",
    "REDIS_REST_TOKEN",
    "KV_REST_API_READ_ONLY_TOKEN",
];

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "quota-gateway")]
#[command(about = "Quota and entitlement gateway in front of a paid text-generation API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Shared store command endpoint
    #[arg(long, env = "UPSTASH_REDIS_REST_URL")]
    pub store_url: Option<String>,

    // Bearer token for the shared store
    #[arg(long, env = "UPSTASH_REDIS_REST_TOKEN", hide_env_values = true)]
    pub store_token: Option<String>,

    // Generation service endpoint
    #[arg(long, env = "UPSTREAM_URL", default_value = "https://api.anthropic.com/v1/messages")]
    pub upstream_url: String,

    #[arg(long, env = "UPSTREAM_MODEL", default_value = "claude-sonnet-4-20250514")]
    pub upstream_model: String,

    #[arg(long, env = "UPSTREAM_MAX_TOKENS", default_value_t = 2000)]
    pub max_tokens: u32,

    // Generation service credential
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Secret mixed into issued premium tokens
    #[arg(long, env = "PREMIUM_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    // Comma-separated redeemable activation codes
    #[arg(long, env = "PREMIUM_CODES", default_value = "", hide_env_values = true)]
    pub premium_codes: String,

    // Only premium callers with a token may generate
    #[arg(long, env = "REQUIRE_PREMIUM", default_value_t = false)]
    pub require_premium: bool,
}

impl Args {
    // Both halves must be present, otherwise there is no shared store
    pub fn store_credentials(&self) -> Option<(String, String)> {
        let url = self
            .store_url
            .clone()
            .or_else(|| first_env(&STORE_URL_ALIASES))?;
        let token = self
            .store_token
            .clone()
            .or_else(|| first_env(&STORE_TOKEN_ALIASES))?;
        Some((url, token))
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.trim().is_empty())
}
