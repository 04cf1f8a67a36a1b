use clap::Parser;
use compat_bridge::translate::gemini_types::{
    Content, GenerateContentConfig, GenerateContentRequest, SystemInstruction,
};
use compat_bridge::{BridgeConfig, CallLog, CompatContentGenerator, ContentGenerator};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "compat-bridge",
    about = "Send a generate-content prompt through DeepSeek or any OpenAI-compatible endpoint",
    version
)]
struct Cli {
    /// Prompt to send
    prompt: Option<String>,

    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Provider name (overrides config and LLM_PROVIDER)
    #[arg(long)]
    provider: Option<String>,

    /// System instruction
    #[arg(long)]
    system: Option<String>,

    /// Model requested by the caller; the provider may substitute its own
    #[arg(long, default_value = "deepseek-chat")]
    model: String,

    /// Stream the response as it is generated
    #[arg(long)]
    stream: bool,

    /// Call journal file (JSONL)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compat_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in compat_bridge::config::config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let Some(prompt) = cli.prompt else {
        anyhow::bail!("No prompt given. Usage: compat-bridge [OPTIONS] <PROMPT>");
    };

    let mut config = BridgeConfig::find_and_load(cli.config.as_deref())?
        .with_env_vars(std::env::vars());
    if let Some(provider) = cli.provider {
        config.provider = Some(provider);
    }

    let mut generator = CompatContentGenerator::from_config(&config)?;
    if let Some(ref path) = cli.log_file {
        generator = generator.with_call_log(CallLog::open(path)?);
    }

    let resolved = generator.provider();
    info!(
        provider = %resolved.kind(),
        enabled = resolved.is_enabled(),
        base_url = resolved.base_url().unwrap_or("-"),
        "Provider resolved"
    );

    let abort = CancellationToken::new();
    let ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let request = GenerateContentRequest {
        model: cli.model,
        contents: vec![Content::user(prompt)],
        config: GenerateContentConfig {
            system_instruction: cli.system.map(SystemInstruction::Text),
            abort_signal: Some(abort),
            ..GenerateContentConfig::default()
        },
    };
    let call_id = format!("cli-{}", uuid::Uuid::new_v4().simple());

    if cli.stream {
        let mut stream = generator.generate_content_stream(&request, &call_id).await?;
        let mut stdout = std::io::stdout();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            write!(stdout, "{}", chunk.text())?;
            for call in chunk.function_calls() {
                writeln!(stdout, "\n[tool call] {} {}", call.name, call.args)?;
            }
            stdout.flush()?;
        }
        writeln!(stdout)?;
    } else {
        let response = generator.generate_content(&request, &call_id).await?;
        println!("{}", response.text());
        for call in response.function_calls() {
            println!("[tool call] {} {}", call.name, call.args);
        }
        if let Some(usage) = response.usage_metadata {
            info!(total_tokens = usage.total_token_count, "Usage");
        }
    }

    Ok(())
}
