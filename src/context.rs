/// Storefront options: the flag and event keys the controller asks about and
/// the fixed texts it shows. Defaults match the Attic & Button demo.
#[derive(Debug, Clone)]
pub struct Context {
    /// Feature that gates the sort selector.
    pub feature_key: String,
    /// String variable holding the per-user welcome message.
    pub welcome_variable: String,
    /// Shown when the feature is on but the variable is absent.
    pub fallback_message: String,
    /// Shown when the feature is off.
    pub feature_off_message: String,
    /// Conversion event sent on purchase.
    pub purchase_event: String,
    /// Where a purchase navigates to.
    pub purchase_path: String,
    /// Prefix joined with each record's image reference.
    pub image_prefix: String,
}

pub const DEFAULT_WELCOME: &str = "Welcome to Attic & Button";

impl Default for Context {
    fn default() -> Self {
        Self {
            feature_key: "sorting_enabled".into(),
            welcome_variable: "welcome_message".into(),
            fallback_message: DEFAULT_WELCOME.into(),
            feature_off_message: DEFAULT_WELCOME.into(),
            purchase_event: "item_purchase".into(),
            purchase_path: "/purchase.html".into(),
            image_prefix: "./images/".into(),
        }
    }
}

impl Context {
    /// Override the message shown when no welcome variable is available.
    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn with_feature_off_message(mut self, message: impl Into<String>) -> Self {
        self.feature_off_message = message.into();
        self
    }
}
