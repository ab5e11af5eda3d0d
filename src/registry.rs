use std::{collections::HashMap, convert::Infallible, sync::Arc};

use axum::{extract::FromRequestParts, http::request::Parts};
use tokio::sync::Mutex;
use tower_cookies::Cookies;

use crate::{
    error::SessionError,
    models::session::Session,
    repositories::session::Records,
    store::SqlStore,
};

struct Entry {
    session: Session,
    error: Option<Arc<SessionError>>,
}

/// The sessions loaded during one request, by name.
///
/// Extracting a `Registry` twice in the same request yields the same
/// registry: the first extraction stores it in the request extensions.
#[derive(Clone, Default)]
pub struct Registry {
    sessions: Arc<Mutex<HashMap<String, Entry>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session `name`, loading it from `store` on first access.
    ///
    /// Later calls for the same name return the cached session and the
    /// error from the first load, if any.
    pub async fn get<R: Records>(
        &self,
        store: &SqlStore<R>,
        cookies: &Cookies,
        name: &str,
    ) -> (Session, Option<Arc<SessionError>>) {
        let mut sessions = self.sessions.lock().await;

        if let Some(entry) = sessions.get(name) {
            return (entry.session.clone(), entry.error.clone());
        }

        let (session, error) = store.new_session(cookies, name).await;
        let error = error.map(Arc::new);
        sessions.insert(
            name.to_string(),
            Entry {
                session: session.clone(),
                error: error.clone(),
            },
        );
        (session, error)
    }

    /// Replaces the cached copy of `session`, keeping any cached load error.
    pub async fn put(&self, session: Session) {
        let mut sessions = self.sessions.lock().await;
        let name = session.name().to_string();
        match sessions.get_mut(&name) {
            Some(entry) => entry.session = session,
            None => {
                sessions.insert(name, Entry { session, error: None });
            }
        }
    }
}

impl<S> FromRequestParts<S> for Registry
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(registry) = parts.extensions.get::<Registry>() {
            return Ok(registry.clone());
        }

        let registry = Registry::new();
        parts.extensions.insert(registry.clone());
        Ok(registry)
    }
}
