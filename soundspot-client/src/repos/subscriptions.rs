use log::info;
use serde_json::{json, Value};

use crate::{
    decode, decode_item, decode_list, AccessStatus, ApiRequest, ClientContext, ClientResult,
    Mirror, PaymentIntent, SessionStore, Subscription, SubscriptionPlan, Tracker,
};

/// Subscription plans and the logged in user's subscription
pub struct SubscriptionRepository {
    context: ClientContext,
    tracker: Tracker,
    plans: Mirror<SubscriptionPlan>,
    /// Holds at most the one current subscription
    current: Mirror<Subscription>,
}

impl SubscriptionRepository {
    pub fn new(context: &ClientContext) -> Self {
        Self {
            context: context.clone(),
            tracker: Tracker::new(&context.cancel),
            plans: Default::default(),
            current: Mirror::user_scoped(&context.session),
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

    pub fn plans(&self) -> Vec<SubscriptionPlan> {
        self.plans.snapshot()
    }

    pub fn plan(&self, id: &str) -> Option<SubscriptionPlan> {
        self.plans.get(id)
    }

    pub fn current(&self) -> Option<Subscription> {
        self.current.snapshot().into_iter().next()
    }

    pub async fn fetch_plans(&self) -> ClientResult<Vec<SubscriptionPlan>> {
        let plans = self
            .tracker
            .run(async {
                let request = ApiRequest::get("/subscriptions/plans");
                let body = self.session().request(request).await?;
                decode_list(body, "plans")
            })
            .await?;

        self.plans.replace(plans.clone());
        Ok(plans)
    }

    /// Fetches the user's subscription, which is `None` when they have none
    pub async fn fetch_current_subscription(&self) -> ClientResult<Option<Subscription>> {
        let generation = self.current.generation();
        let subscription: Option<Subscription> = self
            .tracker
            .run(async {
                let request = ApiRequest::get("/subscriptions/current");
                let mut body = self.session().user_request(request).await?;

                let subscription = body
                    .get_mut("subscription")
                    .map(Value::take)
                    .unwrap_or(Value::Null);

                decode(subscription)
            })
            .await?;

        let current = subscription.iter().cloned().collect();
        self.current.replace_from(generation, current);

        Ok(subscription)
    }

    pub async fn check_access(&self) -> ClientResult<AccessStatus> {
        self.tracker
            .run(async {
                let request = ApiRequest::get("/subscriptions/check-access");
                let body = self.session().user_request(request).await?;
                decode(body)
            })
            .await
    }

    /// Starts a card payment for a plan. The intent is handed to the payment sheet.
    pub async fn create_payment_intent(&self, plan_id: &str) -> ClientResult<PaymentIntent> {
        self.tracker
            .run(async {
                let request = ApiRequest::post("/subscriptions/create-payment-intent")
                    .json(json!({ "planId": plan_id }));

                let body = self.session().user_request(request).await?;
                decode_item(body, "paymentIntent")
            })
            .await
    }

    pub async fn confirm_payment(
        &self,
        payment_intent_id: &str,
        plan_id: &str,
    ) -> ClientResult<Subscription> {
        let request = ApiRequest::post("/subscriptions/confirm-payment").json(json!({
            "paymentIntentId": payment_intent_id,
            "planId": plan_id,
        }));

        self.subscribe(request).await
    }

    pub async fn subscribe_with_saved_card(
        &self,
        plan_id: &str,
        payment_method_id: &str,
    ) -> ClientResult<Subscription> {
        let request = ApiRequest::post("/subscriptions/subscribe-with-saved-card").json(json!({
            "planId": plan_id,
            "paymentMethodId": payment_method_id,
        }));

        self.subscribe(request).await
    }

    async fn subscribe(&self, request: ApiRequest) -> ClientResult<Subscription> {
        let subscription: Subscription = self
            .tracker
            .run(async {
                let body = self.session().user_request(request).await?;
                decode_item(body, "subscription")
            })
            .await?;

        info!(
            "Subscribed to plan {}",
            subscription.plan.as_deref().unwrap_or("unknown")
        );

        self.current.replace(vec![subscription.clone()]);
        Ok(subscription)
    }
}
