use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use music_resolver::acquire::RequestContext;
use music_resolver::cli::{Cli, Commands, RequestArgs};
use music_resolver::link::LinkNormalizer;
use music_resolver::{output, utils, Config, MediaKind, Resolver};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "music_resolver=debug"
    } else {
        "music_resolver=info"
    };

    // Logs go to stderr so JSON on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Commands::Normalize { input } => {
            // Works offline and without a valid config
            let normalizer = match Config::load().await {
                Ok(config) => LinkNormalizer::new(config.links.watch_base),
                Err(_) => LinkNormalizer::default(),
            };
            output::print_video_ref(&normalizer.normalize(input), cli.format)?;
        }
        Commands::Details { input } => {
            let resolver = Resolver::new(&load_config(&cli).await?);
            let progress = spinner(cli.quiet, "Fetching metadata...");
            let outcome = resolver.details(input).await;
            finish(progress);
            output::print_metadata(&outcome, cli.format)?;
        }
        Commands::Track { input } => {
            let resolver = Resolver::new(&load_config(&cli).await?);
            let card = resolver.track(input).await;
            output::print_track(&card, cli.format)?;
        }
        Commands::Slider { query, index } => {
            let resolver = Resolver::new(&load_config(&cli).await?);
            match resolver.slider(query, *index).await {
                Some(card) => output::print_track(&card, cli.format)?,
                None => anyhow::bail!("No search result at position {} for '{}'", index, query),
            }
        }
        Commands::Formats { input } => {
            let resolver = Resolver::new(&load_config(&cli).await?);
            let formats = resolver.formats(input).await?;
            output::print_formats(&formats, cli.format)?;
        }
        Commands::Acquire { input, request } => {
            let resolver = Resolver::new(&load_config(&cli).await?);
            let context = request_context(request);

            let progress = spinner(cli.quiet, "Acquiring media...");
            let result = resolver
                .acquire(input, media_kind(request.video), context.as_ref())
                .await;
            finish(progress);

            output::print_acquisition(&result, cli.format)?;
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Stream { input, video } => {
            let resolver = Resolver::new(&load_config(&cli).await?);
            let progress = spinner(cli.quiet, "Resolving stream URL...");
            let result = resolver.stream_url(input, media_kind(*video)).await;
            finish(progress);

            output::print_acquisition(&result, cli.format)?;
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Play { input, request } => {
            let resolver = Resolver::new(&load_config(&cli).await?);
            let context = request_context(request);

            let progress = spinner(cli.quiet, "Fetching metadata and media...");
            let outcome = resolver
                .play(input, media_kind(request.video), context.as_ref())
                .await;
            finish(progress);

            output::print_play(&outcome, cli.format)?;
            if !outcome.acquisition.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Check => {
            let yt_dlp_path = Config::load()
                .await
                .map(|config| config.extractor.yt_dlp_path)
                .unwrap_or_else(|_| "yt-dlp".to_string());

            let missing = utils::check_dependencies(&yt_dlp_path).await;
            if missing.is_empty() {
                println!("{} All external tools found", style("✓").green());
            } else {
                eprintln!("{} Missing tools:", style("⚠").yellow());
                for dep in &missing {
                    eprintln!("   • {}", dep);
                }
                std::process::exit(1);
            }
        }
        Commands::Config { show, init } => {
            if *init {
                let path = Config::default().save().await?;
                println!("Configuration written to: {}", path.display());
            } else {
                let config = load_config(&cli).await?;
                if !*show {
                    println!("Config file: {}", Config::config_path()?.display());
                }
                config.display();
            }
        }
    }

    Ok(())
}

/// File and environment config with command-line overrides on top
async fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load().await?;
    config.apply_overrides(cli.api_url.clone(), cli.api_key.clone());
    config.validate()?;
    Ok(config)
}

fn media_kind(video: bool) -> MediaKind {
    if video {
        MediaKind::Video
    } else {
        MediaKind::Audio
    }
}

fn request_context(args: &RequestArgs) -> Option<RequestContext> {
    args.chat_id.map(|chat_id| {
        RequestContext::new(chat_id, args.chat_title.as_deref(), args.requester.as_deref())
    })
}

fn spinner(quiet: bool, message: &'static str) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        progress.set_style(style);
    }
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(120));
    Some(progress)
}

fn finish(progress: Option<ProgressBar>) {
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
}
