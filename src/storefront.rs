use crate::catalog::{Catalog, CatalogLoad, CatalogSource};
use crate::context::Context;
use crate::errors::{Result, StorefrontError};
use crate::flags::FlagClient;
use crate::render::{escape_html, render, PurchaseControl, RenderedGrid};
use crate::sort::{sort_by, SortField, SortSelector};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Lifecycle of the storefront. User actions are only accepted in `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum State {
    Uninitialized,
    Loading,
    Ready,
}

/// Everything the page would show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorefrontView {
    pub grid: RenderedGrid,
    /// `Some` while the sort dropdown is mounted.
    pub sort_selector: Option<SortSelector>,
    pub welcome: String,
    pub indicator: String,
    pub location: String,
}

impl StorefrontView {
    /// Indicator, welcome message and grid as HTML fragments.
    pub fn to_html(&self) -> String {
        format!(
            "<div id=\"feature-indicator\">{}</div>\n<div id=\"welcome\">{}</div>\n{}",
            escape_html(&self.indicator),
            escape_html(&self.welcome),
            self.grid.to_html()
        )
    }
}

#[derive(Debug)]
pub struct Storefront {
    ctx: Context,
    state: State,
    client: Option<Arc<FlagClient>>,
    catalog: Catalog,
    /// Catalog as currently displayed (sorted or not).
    shown: Catalog,
    user: Option<String>,
    view: StorefrontView,
}

impl Storefront {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            state: State::Uninitialized,
            client: None,
            catalog: Catalog::default(),
            shown: Catalog::default(),
            user: None,
            view: StorefrontView {
                location: "/".into(),
                ..Default::default()
            },
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn view(&self) -> &StorefrontView {
        &self.view
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Load the catalog and initialize the flag client concurrently, then
    /// render. Any failure leaves the storefront `Uninitialized`.
    pub async fn start<F>(&mut self, source: &CatalogSource, flag_init: F) -> Result<CatalogLoad>
    where
        F: Future<Output = Result<FlagClient>>,
    {
        if self.state != State::Uninitialized {
            return Err(StorefrontError::AlreadyStarted);
        }
        self.transition(State::Loading);

        match tokio::try_join!(source.load(), flag_init) {
            Ok((load, client)) => {
                let CatalogLoad { catalog, rejected } = load;
                self.attach(catalog.clone(), Arc::new(client))?;
                Ok(CatalogLoad { catalog, rejected })
            }
            Err(e) => {
                tracing::error!(error = %e, "storefront failed to start");
                self.transition(State::Uninitialized);
                Err(e)
            }
        }
    }

    /// Synchronous counterpart of [`Storefront::start`] for already loaded parts.
    pub fn attach(&mut self, catalog: Catalog, client: Arc<FlagClient>) -> Result<()> {
        if self.state == State::Ready {
            return Err(StorefrontError::AlreadyStarted);
        }
        self.client = Some(client);
        self.shown = catalog.clone();
        self.catalog = catalog;
        self.view.grid = render(&self.shown, &self.ctx.image_prefix);
        self.transition(State::Ready);
        Ok(())
    }

    fn ready_client(&self) -> Result<Arc<FlagClient>> {
        match (&self.state, &self.client) {
            (State::Ready, Some(client)) => Ok(Arc::clone(client)),
            _ => Err(StorefrontError::NotInitialized),
        }
    }

    /// The "shop" action: evaluate the sorting feature for `user_id` and
    /// update the view.
    pub fn shop(&mut self, user_id: &str) -> Result<&StorefrontView> {
        let client = self.ready_client()?;
        if user_id.is_empty() {
            return Err(StorefrontError::EmptyUserId);
        }
        self.user = Some(user_id.to_string());

        let feature = self.ctx.feature_key.as_str();
        let enabled = client.is_enabled(feature, user_id);
        if enabled {
            if self.view.sort_selector.is_none() {
                self.view.sort_selector = Some(SortSelector::default());
            }
            self.view.welcome = client
                .get_variable_string(feature, &self.ctx.welcome_variable, user_id)
                .unwrap_or_else(|| self.ctx.fallback_message.clone());
        } else {
            self.view.sort_selector = None;
            self.view.welcome = self.ctx.feature_off_message.clone();
        }

        let flag = if enabled { "ON" } else { "OFF" };
        self.view.indicator =
            format!("[Feature {flag}] The feature \"{feature}\" is {flag} for user {user_id}");
        tracing::info!(user = user_id, feature, enabled, "shop");
        Ok(&self.view)
    }

    /// Selection change on the mounted sort dropdown.
    pub fn select_sort(&mut self, field: SortField) -> Result<&StorefrontView> {
        self.ready_client()?;
        let Some(selector) = self.view.sort_selector.as_mut() else {
            return Err(StorefrontError::SortingUnavailable);
        };
        selector.selected = Some(field);
        self.shown = sort_by(&self.catalog, field);
        self.view.grid = render(&self.shown, &self.ctx.image_prefix);
        tracing::debug!(%field, "catalog re-sorted");
        Ok(&self.view)
    }

    /// Handler for a rendered purchase control: track the conversion, then
    /// navigate to the confirmation page. Independent of feature state.
    pub fn purchase(&mut self, control: PurchaseControl) -> Result<&StorefrontView> {
        let client = self.ready_client()?;
        let user_id = self.user.clone().ok_or(StorefrontError::NoSession)?;
        let item = self
            .shown
            .get(control.item)
            .ok_or(StorefrontError::UnknownItem(control.item))?;
        tracing::info!(user = %user_id, item = %item.name, "purchase");

        client.track(&self.ctx.purchase_event, &user_id);
        self.view.location = self.ctx.purchase_path.clone();
        Ok(&self.view)
    }

    fn transition(&mut self, next: State) {
        tracing::debug!(from = ?self.state, to = ?next, "storefront state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load;
    use crate::flags::RecordingDispatcher;
    use pretty_assertions::assert_eq;

    const ITEMS: &str = "Chair,Blue,Furniture,$45,chair.png\nLamp,Red,Decor,$20,lamp.png";
    const DATAFILE: &str = r#"{
        "featureFlags": [{
            "key": "sorting_enabled",
            "rolloutPercentage": 0,
            "variables": [{ "key": "welcome_message", "type": "string", "defaultValue": "Welcome back" }],
            "userOverrides": {
                "alice": { "enabled": true, "variables": { "welcome_message": "Hi Alice" } }
            }
        }],
        "events": [{ "key": "item_purchase", "id": "1001" }]
    }"#;

    fn ready() -> (Storefront, RecordingDispatcher) {
        let rec = RecordingDispatcher::new();
        let client = FlagClient::from_datafile(DATAFILE)
            .unwrap()
            .with_dispatcher(rec.clone());
        let mut store = Storefront::new(Context::default());
        store.attach(load(ITEMS).catalog, Arc::new(client)).unwrap();
        (store, rec)
    }

    #[test]
    fn actions_rejected_before_ready() {
        let mut store = Storefront::new(Context::default());
        assert_eq!(store.state(), State::Uninitialized);
        assert!(matches!(store.shop("alice"), Err(StorefrontError::NotInitialized)));
        assert!(matches!(
            store.select_sort(SortField::Price),
            Err(StorefrontError::NotInitialized)
        ));
        let control = PurchaseControl { item: 0, label: "Buy Now" };
        assert!(matches!(store.purchase(control), Err(StorefrontError::NotInitialized)));
    }

    #[test]
    fn enabled_user_gets_selector_and_message() {
        let (mut store, _) = ready();
        let view = store.shop("alice").unwrap();
        assert_eq!(view.sort_selector, Some(SortSelector::default()));
        assert_eq!(view.welcome, "Hi Alice");
        assert_eq!(
            view.indicator,
            "[Feature ON] The feature \"sorting_enabled\" is ON for user alice"
        );
    }

    #[test]
    fn disabled_user_loses_selector() {
        let (mut store, _) = ready();
        store.shop("alice").unwrap();
        let view = store.shop("bob").unwrap();
        assert_eq!(view.sort_selector, None);
        assert_eq!(view.welcome, "Welcome to Attic & Button");
        assert!(view.indicator.starts_with("[Feature OFF]"));
    }

    #[test]
    fn fallback_when_variable_missing() {
        let client = FlagClient::from_datafile(
            r#"{"featureFlags":[{"key":"sorting_enabled","rolloutPercentage":10000}]}"#,
        )
        .unwrap();
        let ctx = Context::default().with_fallback_message("Hello there");
        let mut store = Storefront::new(ctx);
        store.attach(load(ITEMS).catalog, Arc::new(client)).unwrap();
        let view = store.shop("anyone").unwrap();
        assert!(view.sort_selector.is_some());
        assert_eq!(view.welcome, "Hello there");
    }

    #[test]
    fn empty_user_rejected() {
        let (mut store, _) = ready();
        assert!(matches!(store.shop(""), Err(StorefrontError::EmptyUserId)));
        assert_eq!(store.user(), None);
    }

    #[test]
    fn user_id_is_used_verbatim() {
        let (mut store, _) = ready();
        let view = store.shop(" alice").unwrap();
        assert_eq!(view.sort_selector, None);
        assert_eq!(view.welcome, "Welcome to Attic & Button");
        assert_eq!(
            view.indicator,
            "[Feature OFF] The feature \"sorting_enabled\" is OFF for user  alice"
        );
        assert_eq!(store.user(), Some(" alice"));

        store.shop("   ").unwrap();
        assert_eq!(store.user(), Some("   "));
    }

    #[test]
    fn view_html_escapes_messages() {
        let (mut store, _) = ready();
        let html = store.shop("<b>eve</b>").unwrap().to_html();
        assert!(html.contains("for user &lt;b&gt;eve&lt;/b&gt;</div>"));
        assert!(html.contains("<div id=\"welcome\">Welcome to Attic &amp; Button</div>"));
        assert!(!html.contains("<b>eve</b>"));
    }

    #[test]
    fn sorting_requires_mounted_selector() {
        let (mut store, _) = ready();
        store.shop("bob").unwrap();
        assert!(matches!(
            store.select_sort(SortField::Price),
            Err(StorefrontError::SortingUnavailable)
        ));

        store.shop("alice").unwrap();
        let view = store.select_sort(SortField::Price).unwrap();
        assert_eq!(view.grid.rows[0][0].name, "Lamp");
        assert_eq!(view.grid.rows[0][1].name, "Chair");
        assert_eq!(
            view.sort_selector.as_ref().and_then(|s| s.selected),
            Some(SortField::Price)
        );
        // loaded catalog keeps source order
        assert_eq!(store.catalog().get(0).map(|i| i.name.as_str()), Some("Chair"));
    }

    #[test]
    fn purchase_tracks_and_navigates() {
        let (mut store, rec) = ready();
        let control = store.view().grid.control(1).unwrap();
        assert!(matches!(store.purchase(control), Err(StorefrontError::NoSession)));

        store.shop("bob").unwrap();
        let view = store.purchase(control).unwrap();
        assert_eq!(view.location, "/purchase.html");
        let events = rec.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_key, "item_purchase");
        assert_eq!(events[0].event_id, "1001");
        assert_eq!(events[0].user_id, "bob");
    }

    #[test]
    fn purchase_of_unknown_item() {
        let (mut store, _) = ready();
        store.shop("alice").unwrap();
        let control = PurchaseControl { item: 9, label: "Buy Now" };
        assert!(matches!(store.purchase(control), Err(StorefrontError::UnknownItem(9))));
    }

    #[test]
    fn attach_twice_fails() {
        let (mut store, _) = ready();
        let client = Arc::new(FlagClient::from_datafile("{}").unwrap());
        assert!(matches!(
            store.attach(Catalog::default(), client),
            Err(StorefrontError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn start_failure_never_reaches_ready() {
        let mut store = Storefront::new(Context::default());
        let source = CatalogSource::Inline(ITEMS.into());
        let init = async { Err::<FlagClient, _>(StorefrontError::ConfigParse("boom".into())) };
        let err = store.start(&source, init).await.unwrap_err();
        assert!(matches!(err, StorefrontError::ConfigParse(_)));
        assert_eq!(store.state(), State::Uninitialized);
    }

    #[tokio::test]
    async fn start_reports_rejected_records() {
        let mut store = Storefront::new(Context::default());
        let source = CatalogSource::Inline(format!("{ITEMS}\nbroken,line"));
        let init = async { FlagClient::from_datafile(DATAFILE) };
        let load = store.start(&source, init).await.unwrap();
        assert_eq!(store.state(), State::Ready);
        assert_eq!(load.catalog.len(), 2);
        assert_eq!(load.rejected.len(), 1);
        assert_eq!(store.view().grid.cell_count(), 2);
    }
}
