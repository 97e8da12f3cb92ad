use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mediascout_core::discovery::{
    DiscoveryReport, MediaCandidate, ReqwestTransport, TransportError, ValidationStatus,
};
use mediascout_core::{
    load_scout_config, ChromiumRenderer, DiscoveryError, MediaDiscovery, PageRenderer, PageSource,
    ScoutConfig,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

mod server;

pub use server::{resolve_bind, router, AppState, ServerError};

pub const DEFAULT_CONFIG_PATH: &str = "configs/mediascout.toml";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] mediascout_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),
    #[error("http client error: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid bind address {value}: {reason}")]
    Bind { value: String, reason: String },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Media URL discovery command-line interface", long_about = None)]
pub struct Cli {
    /// Caminho do mediascout.toml (padrão: configs/mediascout.toml, se existir)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Sobrescreve a origem do conteúdo da página (em `serve`, vale para /stream)
    #[arg(long, value_enum)]
    pub page_source: Option<PageSourceArg>,
    /// Formato de saída
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PageSourceArg {
    Static,
    Rendered,
}

impl From<PageSourceArg> for PageSource {
    fn from(value: PageSourceArg) -> Self {
        match value {
            PageSourceArg::Static => PageSource::Static,
            PageSourceArg::Rendered => PageSource::Rendered,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Descobre a melhor URL de mídia de uma página
    Discover(DiscoverArgs),
    /// Lista candidatos extraídos sem validá-los
    Scan(ScanArgs),
    /// Sobe o servidor HTTP (/stream, /api/stream, /api/proxy)
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// URL da página
    pub url: String,
    /// Exibe o relatório completo em vez de apenas a URL vencedora
    #[arg(long, default_value_t = false)]
    pub report: bool,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// URL da página
    pub url: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endereço de escuta; sem ele vale server.bind com PORT do ambiente
    #[arg(long)]
    pub bind: Option<String>,
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(source) = cli.page_source {
        config.discovery.page_source = source.into();
        config.server.stream_source = source.into();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(cli.command, config, cli.format))
}

async fn execute(command: Commands, config: ScoutConfig, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Discover(args) => {
            let discovery = build_discovery(config)?;
            if args.report {
                let report = discovery.report(&args.url).await?;
                render(&report, format)?;
            } else {
                let url = discovery.discover(&args.url).await?;
                render(&DiscoverOutput { url }, format)?;
            }
        }
        Commands::Scan(args) => {
            let discovery = build_discovery(config)?;
            let media = discovery.scan(&args.url).await?;
            render(
                &ScanOutput {
                    page_url: args.url,
                    media,
                },
                format,
            )?;
        }
        Commands::Serve(args) => {
            let port = std::env::var("PORT").ok();
            let addr = match &args.bind {
                Some(bind) => resolve_bind(bind, None)?,
                None => resolve_bind(&config.server.bind, port.as_deref())?,
            };
            let discovery = Arc::new(build_discovery(config)?);
            let state = AppState::new(discovery);
            serve(state, addr).await?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ScoutConfig> {
    match path {
        Some(path) => Ok(load_scout_config(path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(load_scout_config(DEFAULT_CONFIG_PATH)?)
        }
        None => {
            debug!("no config file found, using defaults");
            Ok(ScoutConfig::default())
        }
    }
}

fn build_discovery(config: ScoutConfig) -> Result<MediaDiscovery> {
    let transport = Arc::new(ReqwestTransport::new(&config.http)?);
    let renderer: Arc<dyn PageRenderer> = Arc::new(ChromiumRenderer::new(config.browser.clone()));
    Ok(MediaDiscovery::new(config, transport, Some(renderer)))
}

async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "media discovery server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
struct DiscoverOutput {
    url: String,
}

impl DisplayFallback for DiscoverOutput {
    fn display(&self) -> String {
        self.url.clone()
    }
}

#[derive(Debug, Serialize)]
struct ScanOutput {
    page_url: String,
    media: Vec<MediaCandidate>,
}

impl DisplayFallback for ScanOutput {
    fn display(&self) -> String {
        if self.media.is_empty() {
            return "Nenhum candidato encontrado".to_string();
        }
        self.media
            .iter()
            .map(|candidate| format!("{} ({:?})", candidate.url, candidate.discovered_via))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for DiscoveryReport {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Página: {} ({:?})", self.page_url, self.page_source),
            format!("Requisição: {} em {} ms", self.request_id, self.elapsed_ms),
        ];
        for result in &self.results {
            let status = match result.status() {
                ValidationStatus::Confirmed => "confirmado",
                ValidationStatus::Rejected => "rejeitado",
                ValidationStatus::Unknown => "indefinido",
            };
            let format = result
                .detected_format()
                .map(|format| format.to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "  #{seq} {url} | {status} | formato={format} | reqs={reqs}",
                seq = result.candidate().sequence,
                url = result.url(),
                reqs = result.requests_issued(),
            ));
        }
        lines.push(format!(
            "Vencedor: {}",
            self.winner_url().unwrap_or("<nenhum>")
        ));
        lines.join("\n")
    }
}
