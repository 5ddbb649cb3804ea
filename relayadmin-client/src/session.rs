//! Startup wiring between the API client, the token store and navigation.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::warn;

use crate::{
    api::{AdminClient, AdminClientBuilder, ApiError, CredentialProvider, api_base_url},
    token_store::TokenStore,
};

pub const RELOGIN_HINT: &str = "session expired or was rejected, run `relayadmin login` again";

/// Where the operator is sent once their credential stops working.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Navigator for a terminal: there is no login screen to switch to, so the
/// redirect is recorded and reported once the command finishes.
#[derive(Debug, Default)]
pub struct LoginHint {
    redirected: AtomicBool,
}

impl LoginHint {
    pub fn redirected(&self) -> bool {
        self.redirected.load(Ordering::SeqCst)
    }

    /// A rejected `login` already reports its own error, so it gets no hint.
    pub fn message(&self, after_login: bool) -> Option<&'static str> {
        (self.redirected() && !after_login).then_some(RELOGIN_HINT)
    }
}

impl Navigator for LoginHint {
    fn redirect_to_login(&self) {
        warn!("credential rejected by server, login required");
        self.redirected.store(true, Ordering::SeqCst);
    }
}

/// Routes every token change through the one [`TokenStore`], so the client and
/// the store cannot disagree about whether a token is present.
pub struct Session {
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl Session {
    pub fn new(store: Arc<TokenStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self { store, navigator }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }
}

impl CredentialProvider for Session {
    fn token(&self) -> Option<String> {
        self.store.auth_token()
    }

    fn token_changed(&self, token: Option<&str>) {
        self.store.set_auth_token(token.map(str::to_owned));
    }

    fn unauthorized(&self) {
        self.navigator.redirect_to_login();
    }
}

/// Restores the token persisted for the builder's server, then builds the
/// client on top of it. A token issued by any other server is left on disk
/// and the session starts logged out.
pub fn bootstrap(
    builder: AdminClientBuilder,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
) -> Result<AdminClient<Session>, ApiError> {
    let api_base = api_base_url(builder.server_url())?;
    store.restore_for(api_base.as_str());
    builder.build(Arc::new(Session::new(store, navigator)))
}
