use log::debug;
use serde_json::json;

use crate::{
    decode_item, decode_list, ApiRequest, ClientContext, ClientError, ClientResult, Favorite,
    ItemType, Mirror, SessionStore, Tracker,
};

/// The logged in user's favorites, keyed on `(item_id, item_type)`
pub struct FavoritesRepository {
    context: ClientContext,
    tracker: Tracker,
    favorites: Mirror<Favorite>,
}

impl FavoritesRepository {
    pub fn new(context: &ClientContext) -> Self {
        Self {
            context: context.clone(),
            tracker: Tracker::new(&context.cancel),
            favorites: Mirror::user_scoped(&context.session),
        }
    }

    fn session(&self) -> &SessionStore {
        &self.context.session
    }

    pub fn is_loading(&self) -> bool {
        self.tracker.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.tracker.error()
    }

    pub fn clear_error(&self) {
        self.tracker.clear_error()
    }

    pub fn detach(&self) {
        self.tracker.detach()
    }

    pub fn favorites(&self) -> Vec<Favorite> {
        self.favorites.snapshot()
    }

    pub fn is_favorite(&self, item_id: &str, item_type: ItemType) -> bool {
        self.get_favorite_id(item_id, item_type).is_some()
    }

    pub fn get_favorite_id(&self, item_id: &str, item_type: ItemType) -> Option<String> {
        self.favorites
            .find(|f| f.matches(item_id, item_type))
            .map(|f| f.id)
    }

    pub async fn fetch_favorites(&self) -> ClientResult<Vec<Favorite>> {
        let generation = self.favorites.generation();
        let favorites = self
            .tracker
            .run(async {
                let request = ApiRequest::get("/user/favorites");
                let body = self.session().user_request(request).await?;
                decode_list(body, "favorites")
            })
            .await?;

        self.favorites.replace_from(generation, favorites.clone());
        Ok(favorites)
    }

    /// Saves an item, returning the id of its favorite record.
    ///
    /// An item that is already a favorite returns the existing record without a request.
    pub async fn add_to_favorites(
        &self,
        item_id: &str,
        item_type: ItemType,
    ) -> ClientResult<String> {
        if let Some(id) = self.get_favorite_id(item_id, item_type) {
            return Ok(id);
        }

        let result = self
            .tracker
            .run(async {
                let request = ApiRequest::post("/user/favorites").json(json!({
                    "itemId": item_id,
                    "itemType": item_type,
                }));

                let body = self.session().user_request(request).await?;
                decode_item::<Favorite>(body, "favorite")
            })
            .await;

        match result {
            Ok(favorite) => {
                let id = favorite.id.clone();
                self.favorites.append(favorite);

                Ok(id)
            }
            // The mirror was stale, the server already has this one
            Err(ClientError::Validation(message)) => {
                debug!("Adding {} {} was refused: {}", item_type, item_id, message);
                self.fetch_favorites().await?;

                match self.get_favorite_id(item_id, item_type) {
                    Some(id) => {
                        self.tracker.clear_error();
                        Ok(id)
                    }
                    None => self.tracker.reject(ClientError::Validation(message)),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn remove_from_favorites(&self, favorite_id: &str) -> ClientResult<()> {
        self.tracker
            .run(async {
                let request = ApiRequest::delete(format!("/user/favorites/{}", favorite_id));
                self.session().user_request(request).await
            })
            .await?;

        self.favorites.remove(favorite_id);
        Ok(())
    }

    /// Adds or removes an item, returning whether it is a favorite afterwards
    pub async fn toggle_favorite(&self, item_id: &str, item_type: ItemType) -> ClientResult<bool> {
        match self.get_favorite_id(item_id, item_type) {
            Some(id) => {
                self.remove_from_favorites(&id).await?;
                Ok(false)
            }
            None => {
                self.add_to_favorites(item_id, item_type).await?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{testing::MockApi, Api, MemoryStorage, Method};

    async fn setup() -> (Arc<MockApi>, FavoritesRepository) {
        let api = MockApi::new();
        let session = SessionStore::new(Api::new(api.clone()), MemoryStorage::new());
        session.login("ada@example.com", "hunter22").await.unwrap();

        let context = ClientContext {
            session: Arc::new(session),
            cancel: CancellationToken::new(),
        };

        (api, FavoritesRepository::new(&context))
    }

    #[tokio::test]
    async fn test_add_then_remove_round_trip() {
        let (_api, repo) = setup().await;
        repo.fetch_favorites().await.unwrap();
        assert!(repo.favorites().is_empty());

        repo.add_to_favorites("spot1", ItemType::Soundspot).await.unwrap();

        let id = repo.get_favorite_id("spot1", ItemType::Soundspot).unwrap();
        assert!(repo.is_favorite("spot1", ItemType::Soundspot));
        assert!(!repo.is_favorite("spot1", ItemType::AudioItem));

        repo.remove_from_favorites(&id).await.unwrap();
        assert!(!repo.is_favorite("spot1", ItemType::Soundspot));
    }

    #[tokio::test]
    async fn test_adding_twice_keeps_one_record() {
        let (api, repo) = setup().await;

        let first = repo.add_to_favorites("i1", ItemType::AudioItem).await.unwrap();
        let second = repo.add_to_favorites("i1", ItemType::AudioItem).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.favorites().len(), 1);
        assert_eq!(api.count(Method::Post, "/user/favorites"), 1);
    }

    #[tokio::test]
    async fn test_stale_mirror_recovers_the_existing_record() {
        let (_api, repo) = setup().await;
        let other = FavoritesRepository::new(&repo.context);

        let id = other.add_to_favorites("spot1", ItemType::Soundspot).await.unwrap();
        let again = repo.add_to_favorites("spot1", ItemType::Soundspot).await.unwrap();

        assert_eq!(id, again);
        assert_eq!(repo.error(), None);
        assert_eq!(repo.favorites().len(), 1);
    }

    #[tokio::test]
    async fn test_toggle() {
        let (_api, repo) = setup().await;

        assert!(repo.toggle_favorite("spot2", ItemType::Soundspot).await.unwrap());
        assert!(repo.is_favorite("spot2", ItemType::Soundspot));

        assert!(!repo.toggle_favorite("spot2", ItemType::Soundspot).await.unwrap());
        assert!(!repo.is_favorite("spot2", ItemType::Soundspot));
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_the_favorite() {
        let (api, repo) = setup().await;
        let id = repo.add_to_favorites("spot1", ItemType::Soundspot).await.unwrap();

        api.set_offline(true);
        let result = repo.remove_from_favorites(&id).await;

        assert!(matches!(result, Err(ClientError::Network(_))));
        assert!(repo.is_favorite("spot1", ItemType::Soundspot));
        assert!(repo.error().is_some());
    }

    #[tokio::test]
    async fn test_favorites_need_a_login() {
        let api = MockApi::new();
        let session = SessionStore::new(Api::new(api.clone()), MemoryStorage::new());
        let context = ClientContext {
            session: Arc::new(session),
            cancel: CancellationToken::new(),
        };
        let repo = FavoritesRepository::new(&context);

        let result = repo.fetch_favorites().await;

        assert_eq!(result, Err(ClientError::NotLoggedIn));
        assert_eq!(api.request_count(), 0);
    }
}
