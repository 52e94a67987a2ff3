use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use secrecy::SecretString;

use ragchat_core::provider::StreamOptions;
use ragchat_core::retrieval::{ContextType, PartitionScheme};
use ragchat_engine::{CorpusProfile, TurnConfig, TurnPipeline};
use ragchat_llm::{AnthropicConfig, AnthropicProvider};
use ragchat_search::{ElasticsearchBackend, ElasticsearchConfig, EsAuth};
use ragchat_server::ServerConfig;
use ragchat_settings::RagChatSettings;
use ragchat_telemetry::TelemetryConfig;

#[derive(Parser, Debug)]
#[command(name = "ragchat")]
#[command(about = "Retrieval-augmented chat server over WebSocket")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ~/.ragchat/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Bind address, overrides settings and RAGCHAT_HOST
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides settings and RAGCHAT_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(ragchat_settings::settings_path);
    let mut settings = ragchat_settings::load_settings_from_path(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    apply_cli(&mut settings, &cli);
    settings.validate()?;

    ragchat_telemetry::init_telemetry(&telemetry_config(&settings));
    tracing::info!(settings = %path.display(), "starting ragchat");

    let api_key = match settings.llm.api_key.clone() {
        Some(key) => SecretString::from(key),
        None => bail!("no API key: set ANTHROPIC_API_KEY or llm.apiKey"),
    };
    let provider = Arc::new(AnthropicProvider::new(anthropic_config(&settings, api_key)));
    let backend = Arc::new(ElasticsearchBackend::new(elasticsearch_config(&settings)));
    tracing::info!(
        model = %settings.llm.model,
        search = %settings.search.url,
        "collaborators ready"
    );

    let pipeline = Arc::new(TurnPipeline::new(
        provider,
        backend,
        corpus_profile(&settings)?,
        turn_config(&settings),
    ));

    let handle = ragchat_server::start(server_config(&settings), pipeline)
        .await
        .context("starting server")?;
    tracing::info!(addr = %handle.addr, "ragchat server ready");

    tokio::signal::ctrl_c().await.context("listening for ctrl+c")?;
    handle.shutdown().await;
    tracing::info!("stopped");
    Ok(())
}

fn apply_cli(settings: &mut RagChatSettings, cli: &Cli) {
    if let Some(host) = &cli.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
}

fn telemetry_config(settings: &RagChatSettings) -> TelemetryConfig {
    TelemetryConfig {
        log_level: ragchat_telemetry::parse_level(settings.logging.level.as_filter_str())
            .unwrap_or(tracing::Level::INFO),
        module_levels: Vec::new(),
        json: settings.logging.json,
    }
}

fn server_config(settings: &RagChatSettings) -> ServerConfig {
    ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        max_send_queue: settings.server.max_send_queue,
        heartbeat_interval: Duration::from_millis(settings.server.heartbeat_interval_ms),
    }
}

fn anthropic_config(settings: &RagChatSettings, api_key: SecretString) -> AnthropicConfig {
    let mut config = AnthropicConfig::new(api_key, settings.llm.model.clone());
    config.api_url = settings.llm.api_url.clone();
    config.idle_timeout = Duration::from_millis(settings.llm.request_timeout_ms);
    config
}

fn elasticsearch_config(settings: &RagChatSettings) -> ElasticsearchConfig {
    let search = &settings.search;
    let auth = match (&search.api_key, &search.username, &search.password) {
        (Some(key), _, _) => EsAuth::ApiKey(SecretString::from(key.clone())),
        (None, Some(user), Some(password)) => EsAuth::Basic {
            username: user.clone(),
            password: SecretString::from(password.clone()),
        },
        _ => EsAuth::None,
    };
    ElasticsearchConfig {
        url: search.url.clone(),
        auth,
        request_timeout: Duration::from_millis(search.request_timeout_ms),
        max_hits: search.max_hits,
        chunk_text_field: settings.corpus.chunk_text_field.clone(),
    }
}

fn corpus_profile(settings: &RagChatSettings) -> anyhow::Result<CorpusProfile> {
    let corpus = &settings.corpus;
    let context_type: ContextType = corpus
        .context_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    Ok(CorpusProfile {
        topic: corpus.topic.clone(),
        partition_label: corpus.partition_label.clone(),
        partitions: PartitionScheme::new(
            corpus.partition_prefix.clone(),
            corpus.wildcard_label.clone(),
        ),
        known_partitions: corpus.known_partitions.clone(),
        context_type,
        document_field: corpus.document_field.clone(),
        chunk_path: corpus.chunk_path.clone(),
        chunk_text_field: corpus.chunk_text_field.clone(),
        inference_id: corpus.inference_id.clone(),
        inner_hits_size: corpus.inner_hits_size,
    })
}

fn turn_config(settings: &RagChatSettings) -> TurnConfig {
    TurnConfig {
        plan_timeout: Duration::from_millis(settings.turn.plan_timeout_ms),
        search_timeout: Duration::from_millis(settings.turn.search_timeout_ms),
        summary_timeout: Duration::from_millis(settings.turn.summary_timeout_ms),
        answer_timeout: Duration::from_millis(settings.turn.answer_timeout_ms),
        streaming: settings.llm.streaming,
        stream_options: StreamOptions {
            max_tokens: Some(settings.llm.max_tokens),
            temperature: settings.llm.temperature,
            stop_sequences: Vec::new(),
        },
    }
}
