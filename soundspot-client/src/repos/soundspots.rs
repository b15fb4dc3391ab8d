use log::{info, warn};
use serde_json::json;

use crate::{
    decode_item, decode_soundspots, util, ApiRequest, ClientContext, ClientError, ClientResult,
    Mirror, MultipartForm, SessionStore, Soundspot, SoundspotDraft, Tracker,
};

/// Soundspots, mirrored as the public approved list, the user's own spots, and the review queue
pub struct SoundspotRepository {
    context: ClientContext,
    tracker: Tracker,

    public: Mirror<Soundspot>,
    mine: Mirror<Soundspot>,
    pending: Mirror<Soundspot>,
}

impl SoundspotRepository {
    pub fn new(context: &ClientContext) -> Self {
        Self {
            context: context.clone(),
            tracker: Tracker::new(&context.cancel),
            public: Default::default(),
            mine: Mirror::user_scoped(&context.session),
            pending: Default::default(),
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

    /// Cancels this repository's requests in flight
    pub fn detach(&self) {
        self.tracker.detach()
    }

    /// Approved soundspots, as of the last fetch
    pub fn soundspots(&self) -> Vec<Soundspot> {
        self.public.snapshot()
    }

    pub fn my_spots(&self) -> Vec<Soundspot> {
        self.mine.snapshot()
    }

    pub fn pending_spots(&self) -> Vec<Soundspot> {
        self.pending.snapshot()
    }

    pub async fn fetch_soundspots(&self) -> ClientResult<Vec<Soundspot>> {
        let spots = self
            .tracker
            .run(async {
                let body = self.session().request(ApiRequest::get("/soundspots")).await?;
                decode_soundspots(body)
            })
            .await?;

        let spots: Vec<_> = spots.into_iter().filter(Soundspot::is_public).collect();
        self.public.replace(spots.clone());

        Ok(spots)
    }

    /// Fetches a single soundspot, refreshing any mirrored copy
    pub async fn fetch_soundspot(&self, id: &str) -> ClientResult<Soundspot> {
        let spot: Soundspot = self
            .tracker
            .run(async {
                let path = format!("/soundspot/{}", id);
                let body = self.session().request(ApiRequest::get(path)).await?;
                decode_item(body, "soundspot")
            })
            .await?;

        self.replace_everywhere(&spot);
        Ok(spot)
    }

    pub async fn fetch_my_spots(&self) -> ClientResult<Vec<Soundspot>> {
        let generation = self.mine.generation();
        let spots = self
            .tracker
            .run(async {
                let request = ApiRequest::get("/spots/my-spots");
                let body = self.session().user_request(request).await?;
                decode_soundspots(body)
            })
            .await?;

        self.mine.replace_from(generation, spots.clone());
        Ok(spots)
    }

    /// Fetches the review queue with the admin session
    pub async fn fetch_pending_spots(&self) -> ClientResult<Vec<Soundspot>> {
        let spots = self
            .tracker
            .run(async {
                let request = ApiRequest::get("/soundspots/pending");
                let body = self.session().admin_request(request).await?;
                decode_soundspots(body)
            })
            .await?;

        let spots: Vec<_> = spots
            .into_iter()
            .filter(|s| s.status == crate::ApprovalStatus::Pending)
            .collect();

        self.pending.replace(spots.clone());
        Ok(spots)
    }

    /// Submits a new soundspot.
    ///
    /// The created record is put first in the user's spots, and first in the public list only
    /// if it came back approved.
    pub async fn create_soundspot(&self, draft: SoundspotDraft) -> ClientResult<Soundspot> {
        if let Err(e) = validate_draft(&draft) {
            return self.tracker.reject(e);
        }

        let request = ApiRequest::post("/soundspot");
        let request = match draft.audio {
            Some(audio) => request.multipart(
                MultipartForm::default()
                    .text("name", draft.name.trim())
                    .text("latitude", draft.location.latitude)
                    .text("longitude", draft.location.longitude)
                    .text("script", &draft.script)
                    .text("description", &draft.description)
                    .text("termsAccepted", draft.terms_accepted)
                    .file("audio", audio),
            ),
            None => request.json(json!({
                "name": draft.name.trim(),
                "latitude": draft.location.latitude,
                "longitude": draft.location.longitude,
                "script": draft.script,
                "description": draft.description,
                "termsAccepted": draft.terms_accepted,
            })),
        };

        let spot: Soundspot = self
            .tracker
            .run(async {
                let body = self.session().user_request(request).await?;
                decode_item(body, "soundspot")
            })
            .await?;

        self.mine.prepend(spot.clone());

        if spot.is_public() {
            self.public.prepend(spot.clone());
        }

        info!("Created soundspot {} ({:?})", spot.id, spot.status);
        Ok(spot)
    }

    /// Deletes one of the user's soundspots
    pub async fn delete_soundspot(&self, id: &str) -> ClientResult<()> {
        self.tracker
            .run(async {
                let request = ApiRequest::delete(format!("/soundspot/{}", id));
                self.session().user_request(request).await
            })
            .await?;

        self.remove_everywhere(id);
        Ok(())
    }

    /// Deletes any soundspot with the admin session
    pub async fn admin_delete_soundspot(&self, id: &str) -> ClientResult<()> {
        self.tracker
            .run(async {
                let request = ApiRequest::delete(format!("/soundspot/{}", id));
                self.session().admin_request(request).await
            })
            .await?;

        self.remove_everywhere(id);
        Ok(())
    }

    /// Approves or rejects a pending soundspot. Each spot can be reviewed once.
    ///
    /// The spot leaves the review queue as soon as the review starts, and is put back if the
    /// request fails. An approved spot becomes discoverable through a refetch of the public list.
    pub async fn review_spot(
        &self,
        id: &str,
        approved: bool,
        notes: Option<&str>,
    ) -> ClientResult<()> {
        let (index, queued) = match self.pending.remove(id) {
            Some(entry) => entry,
            None => {
                return self.tracker.reject(ClientError::NotPending {
                    resource: "Soundspot",
                    id: id.to_string(),
                })
            }
        };

        let result = self
            .tracker
            .run(async {
                let request = ApiRequest::post("/soundspots/review").json(json!({
                    "soundspotId": id,
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

        if let Ok(reviewed) = decode_item::<Soundspot>(body, "soundspot") {
            self.mine.replace_item(&reviewed);
        }

        info!(
            "Soundspot {} {}",
            id,
            if approved { "approved" } else { "rejected" }
        );

        if approved {
            if let Err(e) = self.fetch_soundspots().await {
                warn!("Could not refresh soundspots after approving {}: {}", id, e);
            }
        }

        Ok(())
    }

    fn replace_everywhere(&self, spot: &Soundspot) {
        self.mine.replace_item(spot);
        self.pending.replace_item(spot);

        if spot.is_public() {
            if !self.public.replace_item(spot) {
                // Discovery order comes from the server, the next fetch places it
                self.public.prepend(spot.clone());
            }
        } else {
            self.public.remove(&spot.id);
        }
    }

    fn remove_everywhere(&self, id: &str) {
        self.public.remove(id);
        self.mine.remove(id);
        self.pending.remove(id);
    }
}

fn validate_draft(draft: &SoundspotDraft) -> ClientResult<()> {
    util::require_text("Name", &draft.name)?;

    if !draft.location.is_valid() {
        return Err(ClientError::Validation(
            "Please choose a valid location".to_string(),
        ));
    }

    if !draft.terms_accepted {
        return Err(ClientError::Validation(
            "You must accept the terms to submit a soundspot".to_string(),
        ));
    }

    Ok(())
}
