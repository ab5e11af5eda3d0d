use crate::config::Config;
use crate::error::Result;
use crate::models::session::Options;
use crate::repositories::session::PgRecords;
use crate::store::SqlStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The session store.
    pub store: SqlStore<PgRecords>,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// Builds the pool, runs the migration and configures the store from
    /// `config`.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = crate::db::create_pool(&config.database_url, config.database_pool_size)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        crate::db::migrate(&pool).await?;

        let codecs = crate::crypto::codec::codecs_from_pairs(&config.key_pairs)?;
        let options = Options {
            path: config.cookie_path.clone(),
            max_age: config.max_age,
            secure: config.secure_cookies,
            ..Options::default()
        };
        let store = SqlStore::new(PgRecords::new(pool), codecs, options);
        tracing::info!("✅ Session store initialized with {} codec(s)", config.key_pairs.len());

        Ok(AppState {
            store,
            config: config.clone(),
        })
    }
}
