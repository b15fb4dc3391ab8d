use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Soundspot - browse, review and listen to soundspots from the command line
#[derive(Parser, Clone)]
#[command(name = "soundspot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Log in with a regular account
    Login(Credentials),
    /// Log in with an admin or reviewer account
    AdminLogin(Credentials),
    /// Create a regular account and log in
    Signup {
        #[arg(long)]
        name: String,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// End the regular session, or the admin session with --admin
    Logout {
        #[arg(long)]
        admin: bool,
    },
    /// Show who is logged in
    Whoami,
    /// List soundspots
    Spots {
        #[arg(long, value_enum, default_value_t = SpotListing::Public)]
        listing: SpotListing,
    },
    /// Submit a new soundspot
    CreateSpot {
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        #[arg(long, default_value = "")]
        script: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Narration to upload with the spot
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Confirms the content guidelines were accepted
        #[arg(long)]
        accept_terms: bool,
    },
    /// List audio items
    Items {
        #[arg(long, value_enum, default_value_t = ItemListing::All)]
        listing: ItemListing,
        /// Only list the items of this soundspot
        #[arg(long)]
        soundspot: Option<String>,
    },
    /// Upload an audio item to a soundspot
    Upload {
        #[arg(long)]
        soundspot: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "general")]
        category: String,
        file: PathBuf,
    },
    /// Show the reviews of an audio item
    Reviews { item: String },
    /// Rate an audio item from 1 to 5
    Rate {
        item: String,
        rating: u32,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Approve or reject something waiting for review
    Review(ReviewArgs),
    /// Manage favorites
    Favorites {
        #[command(subcommand)]
        action: FavoriteAction,
    },
    /// Play an audio item without an output device, reporting progress
    Play {
        item: String,
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f32>,
    },
    /// List subscription plans and the current subscription
    Plans,
}

#[derive(Args, Clone)]
pub struct Credentials {
    #[arg(long, env = "SOUNDSPOT_EMAIL")]
    pub email: String,
    #[arg(long, env = "SOUNDSPOT_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Args, Clone)]
pub struct ReviewArgs {
    #[arg(value_enum)]
    pub kind: ReviewKind,
    pub id: String,
    /// Approve instead of reject
    #[arg(long)]
    pub approve: bool,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand, Clone)]
pub enum FavoriteAction {
    List,
    Toggle {
        #[arg(value_enum)]
        kind: FavoriteKind,
        id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum SpotListing {
    Public,
    Mine,
    Pending,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum ItemListing {
    All,
    New,
    Best,
    Mine,
    Pending,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    Spot,
    Item,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteKind {
    Spot,
    Item,
}
