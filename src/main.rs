use std::net::IpAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LoggingConfig, TollgateConfig};
use tollgate::ratelimit::{Identity, RateLimitKey, RateLimitResult, RateLimiter, RequestInfo};

/// Tollgate rate limiter administration
#[derive(Parser, Debug)]
#[command(name = "tollgate", version)]
#[command(about = "Inspect and administer failover-aware rate limits")]
struct Cli {
    /// YAML configuration file. TOLLGATE_* environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one or more simulated requests through the limiter
    Check {
        /// Client IP address
        #[arg(long)]
        ip: Option<IpAddr>,

        /// Authenticated user id
        #[arg(long)]
        user_id: Option<String>,

        /// Access token id
        #[arg(long)]
        credential_id: Option<String>,

        /// Matched route name
        #[arg(long)]
        route: Option<String>,

        /// `email` field of the request body
        #[arg(long)]
        email: Option<String>,

        /// Number of requests to send
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// Show the counter for a key without counting an attempt
    Status {
        /// Full rate limit key, e.g. rate_limit:public_unauthenticated:ip_203.0.113.7
        #[arg(long)]
        key: String,

        /// Classification label whose rule applies
        #[arg(long)]
        endpoint_type: String,
    },

    /// Clear the counter for a key
    Reset {
        #[arg(long)]
        key: String,
    },

    /// Print the effective rules
    Rules,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = TollgateConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Tollgate");

    let limiter = RateLimiter::from_config(&config).context("failed to build rate limiter")?;

    match cli.command {
        Command::Check {
            ip,
            user_id,
            credential_id,
            route,
            email,
            repeat,
        } => {
            let mut request = RequestInfo::new();
            if let Some(ip) = ip {
                request = request.with_client_ip(ip);
            }
            if user_id.is_some() || credential_id.is_some() {
                request = request.with_identity(Identity {
                    id: user_id,
                    credential_id,
                });
            }
            if let Some(route) = route {
                request = request.with_route(route);
            }
            if let Some(email) = email {
                request = request.with_input("email", email);
            }

            for attempt in 1..=repeat.max(1) {
                let decision = limiter.evaluate(&request).await;
                println!("#{} -> {}", attempt, decision.status_code());
                for (name, value) in decision.headers() {
                    println!("  {}: {}", name, value);
                }
                if let Some(body) = decision.body() {
                    println!("  {}", body);
                }
            }
        }

        Command::Status { key, endpoint_type } => {
            let key = RateLimitKey::new(key)?;
            let rule = limiter.rules().get_rule(&endpoint_type);
            let status = limiter.get_status(&key, &rule).await?;
            print_result(&key, &status);
        }

        Command::Reset { key } => {
            let key = RateLimitKey::new(key)?;
            limiter.reset_limit(&key).await?;
            println!("reset {}", key);
        }

        Command::Rules => {
            for (endpoint_type, rule) in limiter.rules().get_all_rules() {
                println!(
                    "{:<28} {:>5} per {} min",
                    endpoint_type.as_str(),
                    rule.max_attempts(),
                    rule.decay_minutes()
                );
            }
            let default = limiter.rules().get_default_rule();
            println!(
                "{:<28} {:>5} per {} min",
                "default",
                default.max_attempts(),
                default.decay_minutes()
            );
        }
    }

    Ok(())
}

fn print_result(key: &RateLimitKey, result: &RateLimitResult) {
    println!("key:       {}", key);
    println!("allowed:   {}", result.is_allowed());
    println!("attempts:  {}", result.attempts());
    println!("remaining: {}", result.remaining());
    println!("reset_at:  {}", result.reset_at().to_rfc3339());
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
