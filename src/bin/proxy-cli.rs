use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the proxy-manager daemon", long_about = None)]
struct Cli {
    #[arg(short, long, env = "PROXY_MANAGER_URL", default_value = "http://localhost:2017")]
    url: String,

    #[arg(short, long, env = "PROXY_MANAGER_API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon version, release check and engine state
    Status,
    /// Refresh every subscription now
    Update,
    /// Change an update setting
    Setting {
        #[arg(value_enum)]
        category: Category,
        #[arg(value_enum)]
        mode: Mode,
        /// Interval in hours (interval mode only)
        #[arg(long, default_value_t = 12)]
        hours: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Category {
    RuleList,
    Subscription,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Off,
    Auto,
    Interval,
}

impl Mode {
    fn wire_name(self) -> &'static str {
        match self {
            Mode::Off => "none",
            Mode::Auto => "auto_update",
            Mode::Interval => "auto_update_at_intervals",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key))?,
        );
    }

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/api/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Update => {
            let res = client
                .post(format!("{}/api/subscriptions/update", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Setting {
            category,
            mode,
            hours,
        } => {
            let mut setting: Value = client
                .get(format!("{}/api/setting", cli.url))
                .headers(headers.clone())
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let (mode_key, hours_key) = match category {
                Category::RuleList => (
                    "rule_list_auto_update_mode",
                    "rule_list_auto_update_interval_hours",
                ),
                Category::Subscription => (
                    "subscription_auto_update_mode",
                    "subscription_auto_update_interval_hours",
                ),
            };
            if let Some(fields) = setting.as_object_mut() {
                fields.insert(mode_key.to_string(), json!(mode.wire_name()));
                fields.insert(hours_key.to_string(), json!(hours));
            }

            let res = client
                .put(format!("{}/api/setting", cli.url))
                .headers(headers)
                .json(&setting)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
