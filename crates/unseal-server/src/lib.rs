pub mod base58;
pub mod composite;
pub mod handlers;
pub mod id;
pub mod lifecycle;
pub mod locks;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub secrets: lifecycle::SecretService,
    /// Origin for share URLs; derived from the request when unset.
    pub public_url: Option<String>,
}

pub use composite::{CompositeKey, KeyError, LATEST_KEY_VERSION};
pub use lifecycle::{CreatedSecret, LoadedSecret, NewSecret, SecretError, SecretService};
pub use server::{resolve_data_dir, router, run, ServerConfig, StoreKind};
