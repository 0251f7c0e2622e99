use anyhow::{bail, Context};
use chat_archive_search::auth::TokenIssuer;
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "chat-archive-search-cli")]
#[command(about = "Chat Archive Search CLI", version, long_about = None)]
struct Cli {
    #[arg(short, long, env = "CHAT_SEARCH_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    /// Bearer token for protected routes
    #[arg(short, long, env = "CHAT_SEARCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a signed token from an Ed25519 private key
    Token {
        /// PKCS#8 PEM private key
        #[arg(short = 'k', long)]
        private_key: PathBuf,

        #[arg(short, long)]
        issuer: String,

        #[arg(short, long, default_value = "chat-archive-search")]
        audience: String,

        /// Lifetime in seconds
        #[arg(long, default_value = "3600")]
        ttl: u64,
    },

    /// Check server health
    Health,

    /// Check index reachability
    Ping,

    /// Search messages
    Search {
        #[arg(value_name = "QUERY", default_value = "")]
        query: String,

        /// Match the whole text exactly
        #[arg(short = 'x', long)]
        exact: bool,

        #[arg(short, long, allow_hyphen_values = true)]
        chat_id: Option<i64>,

        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(short = 's', long, default_value = "20")]
        page_size: u32,
    },

    /// Mark one message as deleted
    SoftDelete {
        #[arg(long, allow_hyphen_values = true)]
        chat_id: i64,

        #[arg(long)]
        message_id: i64,
    },

    /// Remove duplicate copies of messages
    Dedup,

    /// Activity of one user in one group
    UserStats {
        #[arg(short, long, allow_hyphen_values = true)]
        group_id: i64,

        #[arg(short, long)]
        user_id: i64,

        /// Window start, unix seconds
        #[arg(long)]
        from: i64,

        /// Window end, unix seconds
        #[arg(long)]
        to: i64,

        #[arg(short, long)]
        mentions: bool,
    },
}

impl Cli {
    fn authorized(&self, request: RequestBuilder) -> anyhow::Result<RequestBuilder> {
        match &self.token {
            Some(token) => Ok(request.bearer_auth(token)),
            None => bail!("this command needs --token or CHAT_SEARCH_TOKEN"),
        }
    }
}

async fn print_response(request: RequestBuilder) -> anyhow::Result<()> {
    let response = request.send().await.context("request failed")?;
    let status = response.status();
    let body: serde_json::Value = response.json().await.context("invalid JSON response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        bail!("server answered {}", status);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api/v1", cli.endpoint.trim_end_matches('/'));

    match &cli.command {
        Commands::Token {
            private_key,
            issuer,
            audience,
            ttl,
        } => {
            let pem = std::fs::read(private_key)
                .with_context(|| format!("cannot read {}", private_key.display()))?;
            let token = TokenIssuer::from_pem(&pem, issuer.as_str(), audience.as_str())?
                .issue(Duration::from_secs(*ttl))?;
            println!("{}", token);
        }

        Commands::Health => {
            print_response(client.get(format!("{}/health", cli.endpoint))).await?;
        }

        Commands::Ping => {
            let request = cli.authorized(client.get(format!("{}/ping", api)))?;
            print_response(request).await?;
        }

        Commands::Search {
            query,
            exact,
            chat_id,
            username,
            page,
            page_size,
        } => {
            let request = cli.authorized(client.post(format!("{}/search", api)).json(&json!({
                "query": query,
                "exactMatch": exact,
                "chatID": chat_id,
                "username": username,
                "page": page,
                "pageSize": page_size,
            })))?;
            print_response(request).await?;
        }

        Commands::SoftDelete {
            chat_id,
            message_id,
        } => {
            let request = cli.authorized(
                client
                    .post(format!("{}/messages/soft-delete", api))
                    .json(&json!({ "chatID": chat_id, "messageID": message_id })),
            )?;
            print_response(request).await?;
        }

        Commands::Dedup => {
            let request = cli.authorized(client.post(format!("{}/dedup", api)))?;
            print_response(request).await?;
        }

        Commands::UserStats {
            group_id,
            user_id,
            from,
            to,
            mentions,
        } => {
            let request = cli.authorized(client.post(format!("{}/stats/user", api)).json(&json!({
                "groupID": group_id,
                "userID": user_id,
                "from": from,
                "to": to,
                "includeMentions": mentions,
            })))?;
            print_response(request).await?;
        }
    }

    Ok(())
}
