mod config;
mod database;
mod entities;
mod logging;
mod matching;
mod ports;
mod scrape;
mod services;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{OptionExt, WrapErr, bail},
};

use crate::{
    config::{APP_NAME, Config},
    database::Database,
    entities::catalog_account,
    scrape::HttpListingSource,
    services::{
        account::AccountService,
        auth_session::AuthSessionService,
        catalog::{
            CatalogAdapter, HttpCatalogClient,
            client::{authorize_url, exchange_code},
        },
        publish::PlaylistPublisher,
        resolve::TrackResolver,
        resync::{MAX_PAGES, ResyncService},
        track::{TrackFilter, TrackService},
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, global = true, env = "BEST_NEW_TRACKS_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `best_new_tracks=debug`
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// OTLP gRPC endpoint to export traces to
    #[arg(long, global = true, env = "OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(subcommand)]
    Config(ConfigCommands),
    #[command(flatten)]
    Run(RunCommands),
}

/// Commands that need the config file and the database
#[derive(Subcommand, Debug)]
enum RunCommands {
    /// Scrape the listing, store new tracks and resolve them
    Resync {
        /// How many listing pages to walk at most
        #[arg(
            short,
            long,
            default_value_t = 25,
            value_parser = clap::value_parser!(u32).range(1..=MAX_PAGES as i64)
        )]
        max_pages: u32,
    },
    /// Store and resolve only the newest listing entry
    CheckNewest {
        /// Add the track to every linked account's playlist
        #[arg(long)]
        publish: bool,
    },
    /// Retry catalog resolution for unresolved tracks
    Resolve {
        #[arg(short, long)]
        limit: Option<u64>,
    },
    /// Set a track's catalog id by hand
    SetCatalogId {
        #[arg(long)]
        track_id: i64,
        #[arg(long)]
        catalog_id: String,
    },
    /// Print stored tracks as JSON
    Tracks {
        /// Print only this track, other filters are ignored
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Repeat to require several artists
        #[arg(long = "artist")]
        artists: Vec<String>,
        /// Repeat to require several genres
        #[arg(long = "genre")]
        genres: Vec<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
    },
    /// Print one page of catalog search results as JSON
    Search {
        #[arg(long)]
        name: String,
        /// Primary artist
        #[arg(long)]
        artist: String,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        /// Defaults to the first linked account
        #[arg(long)]
        account: Option<i64>,
    },
    /// Print the account's playlists matching the configured keyword
    Playlists {
        /// Defaults to the first linked account
        #[arg(long)]
        account: Option<i64>,
    },
    /// Add resolved tracks to an account's playlist
    Publish {
        /// Defaults to the first linked account
        #[arg(long)]
        account: Option<i64>,
        /// Defaults to every resolved track
        #[arg(long = "track-id")]
        track_ids: Vec<i64>,
        /// Defaults to the account's own playlist
        #[arg(long)]
        playlist: Option<String>,
    },
    /// Start linking a catalog account and print the URL to open
    Authorize {
        #[arg(long, default_value = "default")]
        label: String,
    },
    /// Finish linking with the code and state from the redirect
    CompleteAuth {
        #[arg(long)]
        code: String,
        #[arg(long)]
        state: String,
    },
    /// Delete expired authorization sessions
    SweepSessions,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

type Catalog = Arc<CatalogAdapter<HttpCatalogClient>>;

fn catalog_for(config: &Config, account: &catalog_account::Model) -> Result<Catalog> {
    let client = HttpCatalogClient::new(
        config.catalog_credentials()?,
        account.refresh_token.clone(),
        config.request_timeout(),
    );
    Ok(Arc::new(CatalogAdapter::new(client, config.retry_policy())))
}

fn publisher(
    config: &Config,
    database: &Arc<Database>,
    catalog: Catalog,
) -> PlaylistPublisher<HttpCatalogClient> {
    PlaylistPublisher::new(
        database.clone(),
        catalog,
        config.catalog.playlist_keyword.clone(),
        config.catalog.playlist_name.clone(),
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).wrap_err("Failed to serialize output")?
    );
    Ok(())
}

/// Resolver backed by the first linked account, if there is one.
async fn default_resolver(
    config: &Config,
    database: &Arc<Database>,
) -> Result<Option<TrackResolver<HttpCatalogClient>>> {
    let account = match AccountService::new(database.clone()).resolve(None).await {
        Ok(account) => account,
        Err(e) => {
            tracing::warn!("Tracks will not be resolved: {}", e);
            return Ok(None);
        }
    };

    Ok(Some(TrackResolver::new(
        database.clone(),
        catalog_for(config, &account)?,
        config.catalog.search_pages,
    )))
}

fn resync_service(
    config: &Config,
    database: &Arc<Database>,
    resolver: Option<TrackResolver<HttpCatalogClient>>,
) -> Result<ResyncService<HttpListingSource, HttpCatalogClient>> {
    let source = HttpListingSource::new(&config.listing_url, config.request_timeout())
        .wrap_err_with(|| format!("Invalid listing URL: {}", config.listing_url))?;
    Ok(ResyncService::new(
        database.clone(),
        source,
        resolver,
        config.site_name.clone(),
        config.fetch_workers,
    ))
}

fn config_command(command: ConfigCommands, path: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommands::CreateDefault => {
            let path = path
                .or_else(Config::config_path)
                .ok_or_eyre("No default config path found")?;
            Config::create_default(&path)?;
            tracing::info!("Default config written to {}", path.display());
        }
        ConfigCommands::Path => match path.or_else(Config::config_path) {
            Some(path) => println!("{}", path.display()),
            None => println!("No default config path found"),
        },
    }
    Ok(())
}

async fn run(command: RunCommands, config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load(config_path.as_deref())
        .wrap_err_with(|| format!("Failed to load {} config", APP_NAME))?;
    let database = Arc::new(Database::open(&config.database_path()).await?);

    match command {
        RunCommands::Resync { max_pages } => {
            let resolver = default_resolver(&config, &database).await?;
            let report = resync_service(&config, &database, resolver)?
                .resync(max_pages)
                .await?;
            print_json(&report)?;
        }
        RunCommands::CheckNewest { publish } => {
            let resolver = default_resolver(&config, &database).await?;
            let newest = resync_service(&config, &database, resolver)?
                .check_newest()
                .await?;

            match &newest {
                Some(track) if publish && track.resolved_catalog_id.is_some() => {
                    for account in AccountService::new(database.clone()).list_accounts().await? {
                        let result = publisher(&config, &database, catalog_for(&config, &account)?)
                            .publish(&account, &[track.id], None)
                            .await;
                        if let Err(e) = result {
                            tracing::error!("Failed to publish to account {}: {:?}", account.id, e);
                        }
                    }
                }
                Some(track) if publish => {
                    tracing::info!("Track {} is unresolved, nothing to publish", track.id);
                }
                _ => {}
            }
            print_json(&newest)?;
        }
        RunCommands::Resolve { limit } => {
            let resolver = default_resolver(&config, &database)
                .await?
                .ok_or_eyre("Link a catalog account with `authorize` first")?;
            let resolved = resolver.resolve_unresolved(limit).await?;
            println!("{}", resolved);
        }
        RunCommands::SetCatalogId {
            track_id,
            catalog_id,
        } => {
            let resolver = default_resolver(&config, &database)
                .await?
                .ok_or_eyre("Link a catalog account with `authorize` first")?;
            resolver.assign_manual(track_id, &catalog_id).await?;
            tracing::info!("Track {} set to {}", track_id, catalog_id);
        }
        RunCommands::Tracks { id: Some(id), .. } => {
            let track = TrackService::new(database.clone())
                .get_track(id)
                .await?
                .ok_or_eyre(format!("No track with id {}", id))?;
            print_json(&track)?;
        }
        RunCommands::Tracks {
            id: None,
            site,
            name,
            artists,
            genres,
            limit,
            offset,
        } => {
            let tracks = TrackService::new(database.clone())
                .query_tracks(&TrackFilter {
                    site,
                    name,
                    artists,
                    genres,
                    limit,
                    offset,
                })
                .await?;
            print_json(&tracks)?;
        }
        RunCommands::Search {
            name,
            artist,
            offset,
            account,
        } => {
            let account = AccountService::new(database.clone()).resolve(account).await?;
            let page = catalog_for(&config, &account)?
                .search_page(&name, &artist, offset)
                .await
                .ok_or_eyre("Catalog search failed")?;
            print_json(&page)?;
        }
        RunCommands::Playlists { account } => {
            let account = AccountService::new(database.clone()).resolve(account).await?;
            let playlists = catalog_for(&config, &account)?
                .playlists(&config.catalog.playlist_keyword)
                .await
                .ok_or_eyre("Could not list playlists from the catalog")?;
            print_json(&playlists)?;
        }
        RunCommands::Publish {
            account,
            track_ids,
            playlist,
        } => {
            let account = AccountService::new(database.clone()).resolve(account).await?;
            let result = publisher(&config, &database, catalog_for(&config, &account)?)
                .publish(&account, &track_ids, playlist.as_deref())
                .await?;
            print_json(&result)?;
        }
        RunCommands::Authorize { label } => {
            let credentials = config.catalog_credentials()?;
            let session = AuthSessionService::new(database.clone())
                .create(
                    &label,
                    Duration::from_secs(config.catalog.auth_session_ttl_secs),
                )
                .await?;
            println!("{}", authorize_url(&credentials, &session.token));
        }
        RunCommands::CompleteAuth { code, state } => {
            let Some(session) = AuthSessionService::new(database.clone())
                .consume(&state)
                .await?
            else {
                bail!("Unknown or expired authorization state, run `authorize` again");
            };

            let credentials = config.catalog_credentials()?;
            let http = reqwest::Client::builder()
                .timeout(config.request_timeout())
                .build()
                .wrap_err("Failed to build HTTP client")?;
            let tokens = exchange_code(&http, &credentials, &code)
                .await
                .wrap_err("Failed to exchange authorization code")?;
            let refresh_token = tokens
                .refresh_token
                .ok_or_eyre("Catalog did not return a refresh token")?;

            let client =
                HttpCatalogClient::new(credentials, refresh_token.clone(), config.request_timeout());
            let profile = client
                .current_profile()
                .await
                .wrap_err("Failed to fetch catalog profile")?;

            let account = AccountService::new(database.clone())
                .upsert_account(&profile.id, profile.display_name, &refresh_token)
                .await?;
            let catalog = Arc::new(CatalogAdapter::new(client, config.retry_policy()));
            let playlist_id = publisher(&config, &database, catalog)
                .playlist_for(&account)
                .await?;

            tracing::info!(
                "Linked '{}' as account {} with playlist {}",
                session.label,
                account.id,
                playlist_id
            );
            print_json(&serde_json::json!({
                "account_id": account.id,
                "user_id": account.user_id,
                "playlist_id": playlist_id,
            }))?;
        }
        RunCommands::SweepSessions => {
            let removed = AuthSessionService::new(database.clone())
                .sweep_expired()
                .await?;
            println!("{}", removed);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let tracer_provider =
        logging::init_tracing(APP_NAME, args.otlp_endpoint.as_deref(), &args.log_level)?;

    let result = match args.command {
        Commands::Config(command) => config_command(command, args.config),
        Commands::Run(command) => run(command, args.config).await,
    };

    logging::shutdown_tracing(tracer_provider);
    result
}
