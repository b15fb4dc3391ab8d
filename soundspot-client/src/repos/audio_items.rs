use log::{info, warn};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::{
    api::object, decode, decode_item, decode_list, util, ApiRequest, ApprovalStatus, AudioItem,
    AudioItemDraft, AudioItemPatch, ClientContext, ClientError, ClientResult, Mirror,
    MultipartForm, Review, SessionStore, Tracker,
};

/// Audio items in their various listings, plus the reviews of the last item looked at
pub struct AudioItemRepository {
    context: ClientContext,
    tracker: Tracker,

    all: Mirror<AudioItem>,
    new_stories: Mirror<AudioItem>,
    best_reviewed: Mirror<AudioItem>,
    by_soundspot: Mirror<AudioItem>,
    by_soundspot_id: Mutex<Option<String>>,
    mine: Mirror<AudioItem>,
    pending: Mirror<AudioItem>,

    reviews: Mirror<Review>,
    reviews_item_id: Mutex<Option<String>>,
}

impl AudioItemRepository {
    pub fn new(context: &ClientContext) -> Self {
        Self {
            context: context.clone(),
            tracker: Tracker::new(&context.cancel),
            all: Default::default(),
            new_stories: Default::default(),
            best_reviewed: Default::default(),
            by_soundspot: Default::default(),
            by_soundspot_id: Default::default(),
            mine: Mirror::user_scoped(&context.session),
            pending: Default::default(),
            reviews: Default::default(),
            reviews_item_id: Default::default(),
        }
    }

    fn session(&self) -> &SessionStore {
        &self.context.session
    }

    fn mirrors(&self) -> [&Mirror<AudioItem>; 6] {
        [
            &self.all,
            &self.new_stories,
            &self.best_reviewed,
            &self.by_soundspot,
            &self.mine,
            &self.pending,
        ]
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

    pub fn audio_items(&self) -> Vec<AudioItem> {
        self.all.snapshot()
    }

    pub fn new_stories(&self) -> Vec<AudioItem> {
        self.new_stories.snapshot()
    }

    pub fn best_reviewed(&self) -> Vec<AudioItem> {
        self.best_reviewed.snapshot()
    }

    /// The items of the soundspot last passed to [AudioItemRepository::fetch_by_soundspot]
    pub fn by_soundspot(&self) -> (Option<String>, Vec<AudioItem>) {
        (self.by_soundspot_id.lock().clone(), self.by_soundspot.snapshot())
    }

    pub fn my_items(&self) -> Vec<AudioItem> {
        self.mine.snapshot()
    }

    pub fn pending_items(&self) -> Vec<AudioItem> {
        self.pending.snapshot()
    }

    /// Reviews of the item last passed to [AudioItemRepository::fetch_reviews]
    pub fn reviews(&self) -> (Option<String>, Vec<Review>) {
        (self.reviews_item_id.lock().clone(), self.reviews.snapshot())
    }

    async fn fetch_list(&self, request: ApiRequest) -> ClientResult<Vec<AudioItem>> {
        self.tracker
            .run(async {
                let body = self.session().request(request).await?;
                decode_list(body, "audioItems")
            })
            .await
    }

    fn approved(items: Vec<AudioItem>) -> Vec<AudioItem> {
        items
            .into_iter()
            .filter(|i| i.status == ApprovalStatus::Approved)
            .collect()
    }

    pub async fn fetch_audio_items(&self) -> ClientResult<Vec<AudioItem>> {
        let items = Self::approved(self.fetch_list(ApiRequest::get("/audio-items")).await?);
        self.all.replace(items.clone());

        Ok(items)
    }

    pub async fn fetch_new_stories(&self) -> ClientResult<Vec<AudioItem>> {
        let request = ApiRequest::get("/audio-items/new-stories");
        let items = Self::approved(self.fetch_list(request).await?);
        self.new_stories.replace(items.clone());

        Ok(items)
    }

    pub async fn fetch_best_reviewed(&self) -> ClientResult<Vec<AudioItem>> {
        let request = ApiRequest::get("/audio-items/best-reviewed");
        let items = Self::approved(self.fetch_list(request).await?);
        self.best_reviewed.replace(items.clone());

        Ok(items)
    }

    pub async fn fetch_by_soundspot(&self, soundspot_id: &str) -> ClientResult<Vec<AudioItem>> {
        let request = ApiRequest::get(format!("/audio-items/by-soundspot/{}", soundspot_id));
        let items = Self::approved(self.fetch_list(request).await?);

        *self.by_soundspot_id.lock() = Some(soundspot_id.to_string());
        self.by_soundspot.replace(items.clone());

        Ok(items)
    }

    pub async fn fetch_my_items(&self) -> ClientResult<Vec<AudioItem>> {
        let generation = self.mine.generation();
        let items = self
            .tracker
            .run(async {
                let request = ApiRequest::get("/audio-items/my-items");
                let body = self.session().user_request(request).await?;
                decode_list(body, "audioItems")
            })
            .await?;

        self.mine.replace_from(generation, items.clone());
        Ok(items)
    }

    pub async fn fetch_pending_items(&self) -> ClientResult<Vec<AudioItem>> {
        let items: Vec<AudioItem> = self
            .tracker
            .run(async {
                let request = ApiRequest::get("/audio-items/pending");
                let body = self.session().admin_request(request).await?;
                decode_list(body, "audioItems")
            })
            .await?;

        let items: Vec<_> = items
            .into_iter()
            .filter(|i| i.status == ApprovalStatus::Pending)
            .collect();

        self.pending.replace(items.clone());
        Ok(items)
    }

    /// Fetches one item and refreshes every mirrored copy of it
    pub async fn fetch_audio_item(&self, id: &str) -> ClientResult<AudioItem> {
        let item: AudioItem = self
            .tracker
            .run(async {
                let path = format!("/audio-items/{}", id);
                let body = self.session().request(ApiRequest::get(path)).await?;
                decode_item(body, "audioItem")
            })
            .await?;

        self.replace_everywhere(&item);
        Ok(item)
    }

    /// Uploads a new audio item.
    ///
    /// It is put first in the user's items, and in the soundspot listing when that listing
    /// shows the same soundspot and the item came back approved.
    pub async fn create_audio_item(&self, draft: AudioItemDraft) -> ClientResult<AudioItem> {
        let valid = util::require_text("Title", &draft.title)
            .and_then(|_| util::require_text("Soundspot", &draft.soundspot));

        if let Err(e) = valid {
            return self.tracker.reject(e);
        }

        let form = MultipartForm::default()
            .text("title", draft.title.trim())
            .text("description", &draft.description)
            .text("category", &draft.category)
            .text("soundspot", &draft.soundspot)
            .optional_text("duration", draft.duration)
            .file("audio", draft.audio);

        let item: AudioItem = self
            .tracker
            .run(async {
                let request = ApiRequest::post("/audio-items").multipart(form);
                let body = self.session().user_request(request).await?;
                decode_item(body, "audioItem")
            })
            .await?;

        self.mine.prepend(item.clone());

        let same_soundspot = match (&*self.by_soundspot_id.lock(), &item.soundspot) {
            (Some(listed), Some(target)) => listed == target,
            _ => false,
        };

        if same_soundspot && item.status == ApprovalStatus::Approved {
            self.by_soundspot.prepend(item.clone());
        }

        info!("Created audio item {} ({:?})", item.id, item.status);
        Ok(item)
    }

    /// Changes an item and replaces it in every mirror
    pub async fn update_audio_item(
        &self,
        id: &str,
        patch: AudioItemPatch,
    ) -> ClientResult<AudioItem> {
        if let Some(title) = &patch.title {
            if let Err(e) = util::require_text("Title", title) {
                return self.tracker.reject(e);
            }
        }

        let body = object([
            ("title", patch.title.map(Value::from)),
            ("description", patch.description.map(Value::from)),
            ("category", patch.category.map(Value::from)),
        ]);

        let item: AudioItem = self
            .tracker
            .run(async {
                let request = ApiRequest::put(format!("/audio-items/{}", id)).json(body);
                let body = self.session().user_request(request).await?;
                decode_item(body, "audioItem")
            })
            .await?;

        self.replace_everywhere(&item);
        Ok(item)
    }

    pub async fn delete_audio_item(&self, id: &str) -> ClientResult<()> {
        self.tracker
            .run(async {
                let request = ApiRequest::delete(format!("/audio-items/{}", id));
                self.session().user_request(request).await
            })
            .await?;

        for mirror in self.mirrors() {
            mirror.remove(id);
        }

        Ok(())
    }

    /// Approves or rejects a pending item, following the same once-only rule as soundspots
    pub async fn review_audio_item(
        &self,
        id: &str,
        approved: bool,
        notes: Option<&str>,
    ) -> ClientResult<()> {
        let (index, queued) = match self.pending.remove(id) {
            Some(entry) => entry,
            None => {
                return self.tracker.reject(ClientError::NotPending {
                    resource: "Audio item",
                    id: id.to_string(),
                })
            }
        };

        let result = self
            .tracker
            .run(async {
                let request = ApiRequest::post("/audio-items/review").json(json!({
                    "audioItemId": id,
                    "approved": approved,
                    "status": if approved { "approved" } else { "rejected" },
                    "notes": notes,
                }));

                self.session().admin_request(request).await
            })
            .await;

        let body = match result {
            Ok(body) => body,
            Err(e) => {
                self.pending.restore(index, queued);
                return Err(e);
            }
        };

        // A fetch that finished while the review was in flight may have queued it again
        self.pending.remove(id);

        if let Ok(reviewed) = decode_item::<AudioItem>(body, "audioItem") {
            self.mine.replace_item(&reviewed);
        }

        if approved {
            if let Err(e) = self.fetch_audio_items().await {
                warn!("Could not refresh audio items after approving {}: {}", id, e);
            }
        }

        Ok(())
    }

    pub async fn fetch_reviews(&self, item_id: &str) -> ClientResult<Vec<Review>> {
        let reviews: Vec<Review> = self
            .tracker
            .run(async {
                let path = format!("/audio-items/{}/reviews", item_id);
                let body = self.session().request(ApiRequest::get(path)).await?;
                decode_list(body, "reviews")
            })
            .await?;

        *self.reviews_item_id.lock() = Some(item_id.to_string());
        self.reviews.replace(reviews.clone());

        Ok(reviews)
    }

    /// Rates an item from 1 to 5.
    ///
    /// The item is fetched again afterwards so its aggregates come from the server.
    pub async fn submit_review(
        &self,
        item_id: &str,
        rating: u32,
        comment: &str,
    ) -> ClientResult<Review> {
        if !(1..=5).contains(&rating) {
            return self.tracker.reject(ClientError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }

        let review: Review = self
            .tracker
            .run(async {
                let request = ApiRequest::post(format!("/audio-items/{}/reviews", item_id)).json(
                    json!({
                        "rating": rating,
                        "comment": comment.trim(),
                    }),
                );

                let body = self.session().user_request(request).await?;
                decode_item(body, "review")
            })
            .await?;

        if self.reviews_item_id.lock().as_deref() == Some(item_id) {
            self.reviews.prepend(review.clone());
        }

        self.fetch_audio_item(item_id).await?;
        Ok(review)
    }

    pub async fn mark_review_helpful(&self, review_id: &str) -> ClientResult<()> {
        let body = self
            .tracker
            .run(async {
                let path = format!("/audio-items/reviews/{}/helpful", review_id);
                self.session().user_request(ApiRequest::post(path)).await
            })
            .await?;

        self.reviews.update(review_id, |review| {
            review.helpful_count = helpful_count(&body, review.helpful_count);
        });

        Ok(())
    }

    /// Counts a play. The count goes up locally once the server has it.
    pub async fn record_play(&self, item_id: &str) -> ClientResult<()> {
        let body = self
            .tracker
            .run(async {
                let path = format!("/audio-items/{}/play", item_id);
                self.session().request(ApiRequest::post(path)).await
            })
            .await?;

        let count = decode::<PlayCount>(body).ok().and_then(|c| c.play_count);

        for mirror in self.mirrors() {
            mirror.update(item_id, |item| {
                item.play_count = count.unwrap_or(item.play_count + 1);
            });
        }

        Ok(())
    }

    fn replace_everywhere(&self, item: &AudioItem) {
        for mirror in self.mirrors() {
            mirror.replace_item(item);
        }
    }
}

/// The server's count when it sends one, otherwise the local count plus the new vote
fn helpful_count(body: &Value, previous: u32) -> u32 {
    match body.get("helpfulCount").and_then(Value::as_u64) {
        Some(count) => u32::try_from(count).unwrap_or(u32::MAX),
        None => previous.saturating_add(1),
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayCount {
    play_count: Option<u32>,
}
