//! A PostgreSQL-backed HTTP session store.
//!
//! Session values live in a `sessions` table; the browser only holds an
//! authenticated, optionally encrypted token naming the row. See
//! [`store::SqlStore`] for the store itself and [`registry::Registry`] for
//! the per-request cache used by `get`.

pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod registry;
pub mod store;

pub mod crypto {
    pub mod aes;
    pub mod codec;
    pub mod id;
}

pub mod models {
    pub mod record;
    pub mod session;
}

pub mod repositories {
    pub mod session;
}

pub mod handlers {
    pub mod demo;
}

pub use error::{Result, SessionError};
pub use models::session::{Options, Session, SessionValues};
pub use registry::Registry;
pub use repositories::session::{PgRecords, Records};
pub use store::SqlStore;
