use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use log::{error, info, warn};
use soundspot_client::{
    AudioItem, AudioItemDraft, Client, ClientConfig, ClientError, FileUpload, ItemType, Location,
    Soundspot, SoundspotDraft,
};
use soundspot_core::{AudioSession, Config, PlaybackEvent, PlaybackSource, PlaybackState};
use soundspot_impls::HeadlessBackend;
use tokio::runtime;

use crate::{
    cli::{Cli, Command, FavoriteAction, FavoriteKind, ItemListing, ReviewKind, SpotListing},
    logging::LogColor,
};

mod cli;
mod logging;

async fn run(command: Command, config: &ClientConfig) -> anyhow::Result<()> {
    let client = Client::from_config(config)?;
    client.init().await?;

    match command {
        Command::Login(credentials) => {
            let user = client
                .session()
                .login(&credentials.email, &credentials.password)
                .await?;

            info!("Logged in as {} <{}>", user.name, user.email);
        }
        Command::AdminLogin(credentials) => {
            let admin = client
                .session()
                .admin_login(&credentials.email, &credentials.password)
                .await?;

            info!("Logged in as {} ({:?})", admin.name, admin.role);
        }
        Command::Signup { name, credentials } => {
            let user = client
                .session()
                .signup(&name, &credentials.email, &credentials.password)
                .await?;

            info!("Welcome, {}", user.name);
        }
        Command::Logout { admin } => {
            if admin {
                client.session().admin_logout().await;
            } else {
                client.logout().await;
            }

            info!("Logged out");
        }
        Command::Whoami => {
            let session = client.session();

            match session.user() {
                Some(user) => println!("User:  {} <{}>", user.name, user.email),
                None => println!("User:  {}", "not logged in".bright_black()),
            }

            match session.admin() {
                Some(admin) => println!(
                    "Admin: {} <{}> ({:?})",
                    admin.name, admin.email, admin.role
                ),
                None => println!("Admin: {}", "not logged in".bright_black()),
            }
        }
        Command::Spots { listing } => {
            let spots = match listing {
                SpotListing::Public => client.soundspots.fetch_soundspots().await?,
                SpotListing::Mine => client.soundspots.fetch_my_spots().await?,
                SpotListing::Pending => client.soundspots.fetch_pending_spots().await?,
            };

            print_spots(&spots);
        }
        Command::CreateSpot {
            name,
            latitude,
            longitude,
            script,
            description,
            audio,
            accept_terms,
        } => {
            let audio = match audio {
                Some(path) => Some(
                    FileUpload::from_path(&path)
                        .await
                        .with_context(|| format!("Could not read {}", path.display()))?,
                ),
                None => None,
            };

            let draft = SoundspotDraft {
                name,
                location: Location {
                    latitude,
                    longitude,
                },
                script,
                description,
                terms_accepted: accept_terms,
                audio,
            };

            let spot = client.soundspots.create_soundspot(draft).await?;
            info!("Submitted {} ({:?})", spot.name, spot.status);
        }
        Command::Items { listing, soundspot } => {
            let items = match (soundspot, listing) {
                (Some(id), _) => client.audio_items.fetch_by_soundspot(&id).await?,
                (None, ItemListing::All) => client.audio_items.fetch_audio_items().await?,
                (None, ItemListing::New) => client.audio_items.fetch_new_stories().await?,
                (None, ItemListing::Best) => client.audio_items.fetch_best_reviewed().await?,
                (None, ItemListing::Mine) => client.audio_items.fetch_my_items().await?,
                (None, ItemListing::Pending) => client.audio_items.fetch_pending_items().await?,
            };

            print_items(&items);
        }
        Command::Upload {
            soundspot,
            title,
            description,
            category,
            file,
        } => {
            let audio = FileUpload::from_path(&file)
                .await
                .with_context(|| format!("Could not read {}", file.display()))?;

            let draft = AudioItemDraft {
                title,
                description,
                category,
                soundspot,
                duration: None,
                audio,
            };

            let item = client.audio_items.create_audio_item(draft).await?;
            info!("Uploaded {} ({:?})", item.title, item.status);
        }
        Command::Reviews { item } => {
            let reviews = client.audio_items.fetch_reviews(&item).await?;

            if reviews.is_empty() {
                println!("{}", "No reviews yet".bright_black());
            }

            for review in reviews {
                println!(
                    "{} {} {}",
                    "★".repeat(review.rating as usize).yellow(),
                    review.comment,
                    format!("({} found this helpful)", review.helpful_count).bright_black()
                );
            }
        }
        Command::Rate {
            item,
            rating,
            comment,
        } => {
            client.audio_items.submit_review(&item, rating, &comment).await?;
            info!("Thanks for rating {}", item);
        }
        Command::Review(args) => {
            let notes = args.notes.as_deref();

            match args.kind {
                ReviewKind::Spot => {
                    client.soundspots.fetch_pending_spots().await?;
                    client.soundspots.review_spot(&args.id, args.approve, notes).await?;
                }
                ReviewKind::Item => {
                    client.audio_items.fetch_pending_items().await?;
                    client
                        .audio_items
                        .review_audio_item(&args.id, args.approve, notes)
                        .await?;
                }
            }

            let verdict = if args.approve { "Approved" } else { "Rejected" };
            info!("{} {}", verdict, args.id);
        }
        Command::Favorites { action } => {
            let favorites = &client.favorites;
            favorites.fetch_favorites().await?;

            match action {
                FavoriteAction::List => {
                    for favorite in favorites.favorites() {
                        println!("{:<10} {}", favorite.item_type, favorite.item_id);
                    }
                }
                FavoriteAction::Toggle { kind, id } => {
                    let item_type = match kind {
                        FavoriteKind::Spot => ItemType::Soundspot,
                        FavoriteKind::Item => ItemType::AudioItem,
                    };

                    let added = favorites.toggle_favorite(&id, item_type).await?;
                    let verb = if added { "Added" } else { "Removed" };

                    info!("{} {} {}", verb, item_type, id);
                }
            }
        }
        Command::Play { item, seconds } => play(&client, &item, seconds).await?,
        Command::Plans => {
            for plan in client.subscriptions.fetch_plans().await? {
                println!(
                    "{:<12} {:>8.2} {}/{}",
                    plan.name,
                    plan.price,
                    plan.currency.to_uppercase(),
                    plan.interval
                );
            }

            if client.session().is_logged_in() {
                match client.subscriptions.fetch_current_subscription().await? {
                    Some(subscription) => println!(
                        "Subscribed to {} ({})",
                        subscription.plan.unwrap_or_default(),
                        subscription.status
                    ),
                    None => println!("{}", "No active subscription".bright_black()),
                }
            }
        }
    }

    Ok(())
}

async fn play(client: &Client, item_id: &str, seconds: Option<f32>) -> anyhow::Result<()> {
    let item = client.audio_items.fetch_audio_item(item_id).await?;

    if item.audio_url.is_empty() {
        bail!("{} has no audio", item.title);
    }

    let config = Config::default();
    let session = AudioSession::new(HeadlessBackend::new(config.clone()), config);
    let events = session.subscribe();

    let source = PlaybackSource::new(&item.id, &item.audio_url).with_duration(item.duration);
    session.play(source).await?;

    if let Err(e) = client.audio_items.record_play(&item.id).await {
        warn!("Could not record the play: {}", e);
    }

    let limit = seconds.or(session.duration()).unwrap_or(30.);
    let deadline = tokio::time::Instant::now() + Duration::from_secs_f32(limit.max(0.));

    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;

        for event in events.try_iter() {
            match event {
                PlaybackEvent::TimeUpdate {
                    position, duration, ..
                } => info!(
                    "{} {:.1}s / {}",
                    item.title,
                    position,
                    duration
                        .map(|d| format!("{:.1}s", d))
                        .unwrap_or_else(|| "?".to_string())
                ),
                PlaybackEvent::StateUpdate { new_state, .. } => info!("{:?}", new_state),
                PlaybackEvent::Error { message, .. } => error!("{}", message),
            }
        }

        let finished = matches!(
            session.state(),
            PlaybackState::Stopped | PlaybackState::Idle | PlaybackState::Unloaded
        );

        if finished || tokio::time::Instant::now() >= deadline {
            break;
        }
    }

    session.unload().await;
    Ok(())
}

fn print_spots(spots: &[Soundspot]) {
    if spots.is_empty() {
        println!("{}", "Nothing here".bright_black());
    }

    for spot in spots {
        println!(
            "{:<26} {:<28} {:>9.4} {:>9.4} {:?}",
            spot.id.bright_black(),
            spot.name,
            spot.location.latitude,
            spot.location.longitude,
            spot.status
        );
    }
}

fn print_items(items: &[AudioItem]) {
    if items.is_empty() {
        println!("{}", "Nothing here".bright_black());
    }

    for item in items {
        println!(
            "{:<26} {:<28} {:>4.1}★ {:>6} plays {:?}",
            item.id.bright_black(),
            item.title,
            item.average_rating,
            item.play_count,
            item.status
        );
    }
}

fn hint(error: &anyhow::Error, config: &ClientConfig) -> Option<String> {
    let error = error.downcast_ref::<ClientError>()?;

    let hint = match error {
        ClientError::Network(_) => format!(
            "Make sure the API is running at {}, or point SOUNDSPOT_API_URL somewhere else.",
            config.api_url
        ),
        ClientError::NotLoggedIn | ClientError::Unauthorized(_) => {
            "Run `soundspot login` first.".to_string()
        }
        ClientError::AdminNotLoggedIn | ClientError::AdminAccount => {
            "Run `soundspot admin-login` with an admin or reviewer account.".to_string()
        }
        ClientError::Storage(_) => format!(
            "Sessions are kept in {}. Make sure it is writable.",
            config.data_dir.display()
        ),
        _ => return None,
    };

    Some(hint)
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logger(cli.verbose) {
        eprintln!("Could not initialize logging: {}", e);
    }

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let runtime = match runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("soundspot-async")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not build async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(error) = runtime.block_on(run(cli.command, &config)) {
        error!("{}", error.to_string().bold().color(LogColor::Red));

        if let Some(hint) = hint(&error, &config) {
            error!("{}", format!("Hint: {}", hint).color(LogColor::Dimmed).italic());
        }

        std::process::exit(1);
    }
}
