//! The soundspot client core: sessions, the API, and repositories that mirror server state.

mod api;
mod config;
mod error;
mod models;
mod repos;
mod session;
mod util;

#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use api::*;
pub use config::*;
pub use error::*;
pub use models::*;
pub use repos::*;
pub use session::*;

use tokio_util::sync::CancellationToken;

/// Everything a repository needs from the rest of the client
#[derive(Clone)]
pub struct ClientContext {
    pub session: Arc<SessionStore>,
    /// Cancelled when the client shuts down
    pub cancel: CancellationToken,
}

/// The client, owning the session and one of each repository
pub struct Client {
    context: ClientContext,

    pub soundspots: SoundspotRepository,
    pub audio_items: AudioItemRepository,
    pub favorites: FavoritesRepository,
    pub subscriptions: SubscriptionRepository,
    pub payment_methods: PaymentMethodRepository,
}

impl Client {
    pub fn new<T, S>(transport: T, storage: S) -> Self
    where
        T: Transport,
        S: Storage,
    {
        let session = Arc::new(SessionStore::new(Api::new(transport), storage));

        let context = ClientContext {
            session,
            cancel: CancellationToken::new(),
        };

        Self {
            soundspots: SoundspotRepository::new(&context),
            audio_items: AudioItemRepository::new(&context),
            favorites: FavoritesRepository::new(&context),
            subscriptions: SubscriptionRepository::new(&context),
            payment_methods: PaymentMethodRepository::new(&context),
            context,
        }
    }

    /// A client talking HTTP to the configured API, persisting sessions on disk
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let transport = HttpTransport::new(&config.api_url, config.timeout)?;
        let storage = FileStorage::new(&config.data_dir);

        Ok(Self::new(transport, storage))
    }

    /// Loads the persisted sessions
    pub async fn init(&self) -> ClientResult<()> {
        self.context.session.init().await
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.context.session
    }

    /// Ends the regular session. Every user-scoped mirror forgets its contents with it.
    pub async fn logout(&self) {
        self.context.session.logout().await;
    }

    /// Cancels every request in flight. Nothing completes against the mirrors afterwards.
    pub fn shutdown(&self) {
        self.context.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.context.cancel.is_cancelled()
    }
}
