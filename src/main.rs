use worldtv::{
    cache::{CacheConfig, CatalogCache},
    create_app,
    loader::{CatalogLoader, LoaderConfig},
    session::SessionConfig,
    Tab,
};
use tracing::{info, error, warn};
use clap::Parser;
use config::Config;
use serde::Deserialize;
use serde::de::Deserializer;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Channels shown per page before "show more" (overrides config)
    #[arg(long)]
    page_size: Option<usize>,

    /// Path to configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[derive(Debug, Deserialize)]
struct Settings {
    server: ServerConfig,
    playlists: PlaylistConfig,
    #[serde(default)]
    loader: LoaderConfig,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    session: SessionConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct PlaylistConfig {
    #[serde(default, alias = "url", deserialize_with = "deserialize_one_or_many")]
    urls: Vec<String>,
    #[serde(default)]
    tabs: Vec<Tab>,
}

impl PlaylistConfig {
    fn into_tabs(self) -> Vec<Tab> {
        let mut tabs = self.tabs;
        tabs.extend(self.urls.into_iter().map(|url| Tab {
            name: url.clone(),
            url,
        }));
        tabs
    }
}

fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration
    let settings = Config::builder()
        .add_source(config::File::with_name(&args.config))
        .build()?;
    let mut settings: Settings = settings.try_deserialize()?;

    info!("Configuration loaded from {}: {:?}", args.config, settings);

    if let Some(page_size) = args.page_size {
        settings.session.page_size = page_size;
    }

    let tabs = settings.playlists.into_tabs();
    if tabs.is_empty() {
        anyhow::bail!("no playlists configured in {}", args.config);
    }

    let loader = CatalogLoader::new(&settings.loader)?;
    let mut cache = CatalogCache::new(settings.cache.ttl(), settings.cache.error_ttl());

    // Warm the cache so the first session on each tab opens without waiting.
    // Failures are remembered and reported per tab until refreshed.
    for tab in &tabs {
        info!("Fetching channel list for {} from {}...", tab.name, tab.url);
        match cache.get_or_load(&loader, &tab.url).await {
            Ok(catalog) if catalog.is_empty() => {
                warn!("Playlist {} is reachable but contains no channels", tab.url);
            }
            Ok(catalog) => {
                info!("Loaded {} channels for {}", catalog.len(), tab.name);
            }
            Err(e) => {
                error!("Failed to fetch channels for {}: {}", tab.name, e);
            }
        }
    }

    info!(
        "Serving {} tabs (page_size={}, page_step={}, out_of_view={:?}, category_match={:?})",
        tabs.len(),
        settings.session.page_size,
        settings.session.page_step,
        settings.session.out_of_view,
        settings.session.category_match
    );

    let app = create_app(tabs, loader, cache, settings.session);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
