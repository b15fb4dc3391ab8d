use crate::{
    decode_list, ApiRequest, ClientContext, ClientResult, Mirror, PaymentMethod, SessionStore,
    Tracker,
};

/// Cards saved by the logged in user
pub struct PaymentMethodRepository {
    context: ClientContext,
    tracker: Tracker,
    methods: Mirror<PaymentMethod>,
}

impl PaymentMethodRepository {
    pub fn new(context: &ClientContext) -> Self {
        Self {
            context: context.clone(),
            tracker: Tracker::new(&context.cancel),
            methods: Mirror::user_scoped(&context.session),
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

    pub fn payment_methods(&self) -> Vec<PaymentMethod> {
        self.methods.snapshot()
    }

    pub fn default_method(&self) -> Option<PaymentMethod> {
        self.methods.find(|m| m.is_default)
    }

    pub async fn fetch_payment_methods(&self) -> ClientResult<Vec<PaymentMethod>> {
        let generation = self.methods.generation();
        let methods = self
            .tracker
            .run(async {
                let request = ApiRequest::get("/payment/methods");
                let body = self.session().user_request(request).await?;
                decode_list(body, "paymentMethods")
            })
            .await?;

        self.methods.replace_from(generation, methods.clone());
        Ok(methods)
    }

    /// Makes a card the default. Every other card loses the flag locally.
    pub async fn set_default_payment_method(&self, id: &str) -> ClientResult<()> {
        self.tracker
            .run(async {
                let request = ApiRequest::put(format!("/payment/methods/{}/default", id));
                self.session().user_request(request).await
            })
            .await?;

        self.methods.update_all(|m| m.is_default = m.id == id);
        Ok(())
    }

    pub async fn delete_payment_method(&self, id: &str) -> ClientResult<()> {
        self.tracker
            .run(async {
                let request = ApiRequest::delete(format!("/payment/methods/{}", id));
                self.session().user_request(request).await
            })
            .await?;

        self.methods.remove(id);
        Ok(())
    }
}
