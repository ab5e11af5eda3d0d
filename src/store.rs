//! The SQL-backed session store.
//!
//! The cookie only carries the encoded session key. The session values are
//! encoded with the same codecs and kept in the `data` column of the record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tower_cookies::cookie::time::{Duration, OffsetDateTime};
use tower_cookies::{Cookie, Cookies};

use crate::{
    crypto::{
        codec::{self, Codec, CodecError, KeyPair},
        id,
    },
    error::{Result, SessionError},
    models::{
        record::Record,
        session::{Options, Session, SessionValues},
    },
    registry::Registry,
    repositories::session::Records,
};

/// Defaults shared by every request: cookie options and codecs.
struct Settings {
    options: Options,
    codecs: Vec<Box<dyn Codec>>,
}

/// A session store persisting values through `R` and tying them to cookies.
pub struct SqlStore<R> {
    records: Arc<R>,
    settings: Arc<RwLock<Settings>>,
}

impl<R> Clone for SqlStore<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Builds the cookie for `name` from `options`.
///
/// A positive max-age also sets `Expires`; a negative one produces a cookie
/// that is already expired. Fails when the expiry is past the last
/// representable date.
fn new_cookie(name: &str, value: String, options: &Options) -> Result<Cookie<'static>> {
    let mut cookie = Cookie::new(name.to_string(), value);

    cookie.set_path(options.path.clone());
    if let Some(domain) = &options.domain {
        cookie.set_domain(domain.clone());
    }
    cookie.set_secure(options.secure);
    cookie.set_http_only(options.http_only);
    cookie.set_same_site(options.same_site);

    if options.max_age > 0 {
        let age = Duration::seconds(options.max_age);
        let expires = OffsetDateTime::now_utc()
            .checked_add(age)
            .ok_or(SessionError::MaxAgeOutOfRange(options.max_age))?;
        cookie.set_max_age(age);
        cookie.set_expires(expires);
    } else if options.max_age < 0 {
        cookie.set_max_age(Duration::ZERO);
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH + Duration::seconds(1));
    }

    Ok(cookie)
}

/// Returns the expiry to persist: now + `max_age`, or the requested expiry
/// when it is not earlier than that.
fn expiry_for(values: &SessionValues, max_age: i64, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let floor = chrono::Duration::try_seconds(max_age)
        .and_then(|age| now.checked_add_signed(age))
        .ok_or(SessionError::MaxAgeOutOfRange(max_age))?;
    Ok(match values.expires_on {
        Some(requested) if requested >= floor => requested,
        _ => floor,
    })
}

impl<R: Records> SqlStore<R> {
    /// Creates a new `SqlStore`.
    ///
    /// # Arguments
    ///
    /// * `records` - Where session records are persisted.
    /// * `codecs` - Codecs for cookie tokens and values. The first one encodes.
    /// * `options` - Default cookie options. `options.max_age` is applied to
    ///   every codec.
    pub fn new(records: R, codecs: Vec<Box<dyn Codec>>, options: Options) -> Self {
        let mut settings = Settings { options, codecs };
        let age = settings.options.max_age;
        for codec in settings.codecs.iter_mut() {
            codec.set_max_age(age);
        }

        Self {
            records: Arc::new(records),
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    /// Creates a new `SqlStore` with one `SecureCookie` codec per key pair
    /// and default options using `path` and `max_age`.
    pub fn from_key_pairs(
        records: R,
        path: impl Into<String>,
        max_age: i64,
        pairs: &[KeyPair],
    ) -> std::result::Result<Self, CodecError> {
        let codecs = codec::codecs_from_pairs(pairs)?;
        let options = Options {
            path: path.into(),
            max_age,
            ..Options::default()
        };
        Ok(Self::new(records, codecs, options))
    }

    /// Returns the record storage.
    pub fn records(&self) -> &R {
        &self.records
    }

    /// Returns a copy of the default cookie options.
    pub async fn options(&self) -> Options {
        self.settings.read().await.options.clone()
    }

    /// Returns the max-age currently set on each codec, in order.
    pub async fn codec_max_ages(&self) -> Vec<i64> {
        let settings = self.settings.read().await;
        settings.codecs.iter().map(|codec| codec.max_age()).collect()
    }

    /// Sets the default cookie max-age and the max-age of every codec.
    ///
    /// Individual sessions can still be deleted by setting their own
    /// `options.max_age` to -1.
    pub async fn max_age(&self, age: i64) {
        let mut settings = self.settings.write().await;
        settings.options.max_age = age;
        for codec in settings.codecs.iter_mut() {
            codec.set_max_age(age);
        }
    }

    /// Fetches the session `name` through the request's registry, creating
    /// it with [`SqlStore::new_session`] on first access.
    pub async fn get(
        &self,
        registry: &Registry,
        cookies: &Cookies,
        name: &str,
    ) -> (Session, Option<Arc<SessionError>>) {
        registry.get(self, cookies, name).await
    }

    /// Creates the session `name` for a request.
    ///
    /// When the request carries a valid cookie for `name` and its record
    /// loads, the stored values are returned with `is_new == false`.
    /// Otherwise a new, empty session is returned along with the error that
    /// prevented loading, if any. A missing cookie is not an error.
    pub async fn new_session(&self, cookies: &Cookies, name: &str) -> (Session, Option<SessionError>) {
        let (mut session, decoded) = {
            let settings = self.settings.read().await;
            let session = Session::new(name, settings.options.clone());
            let decoded = cookies
                .get(name)
                .map(|cookie| codec::decode_multi::<String>(name, cookie.value(), &settings.codecs));
            (session, decoded)
        };

        let error = match decoded {
            None => None,
            Some(Err(e)) => {
                tracing::debug!("Session cookie rejected: {}", e);
                Some(e.into())
            }
            Some(Ok(id)) => {
                session.id = id;
                match self.load(&mut session).await {
                    Ok(()) => {
                        session.is_new = false;
                        None
                    }
                    Err(e) => {
                        tracing::debug!("Session record could not be loaded: {}", e);
                        Some(e)
                    }
                }
            }
        };

        let age = self.settings.read().await.options.max_age;
        self.max_age(age).await;

        (session, error)
    }

    /// Persists the session and adds its cookie.
    ///
    /// A session whose `options.max_age` is negative is deleted instead.
    /// A session without an ID gets a freshly generated one. Nothing is
    /// written to the records or the cookie jar when encoding fails, and
    /// nothing is written to the cookie jar when persisting fails.
    pub async fn save(&self, cookies: &Cookies, session: &mut Session) -> Result<()> {
        if session.options.max_age < 0 {
            self.delete(cookies, session).await?;
            cookies.add(new_cookie(session.name(), String::new(), &session.options)?);
            return Ok(());
        }

        if session.id.is_empty() {
            session.id = id::generate_session_id();
        }

        let (token, data) = {
            let settings = self.settings.read().await;
            let token = codec::encode_multi(session.name(), &session.id, &settings.codecs)?;
            let data = codec::encode_multi(session.name(), &session.values, &settings.codecs)?;
            (token, data)
        };
        let expires_on = expiry_for(&session.values, session.options.max_age, Utc::now())?;
        let cookie = new_cookie(session.name(), token, &session.options)?;

        self.persist(session, data, expires_on).await?;

        cookies.add(cookie);
        tracing::debug!("Session saved: {}", session.name());
        Ok(())
    }

    /// Deletes the session: expires its cookie, clears its values and
    /// removes its record.
    pub async fn delete(&self, cookies: &Cookies, session: &mut Session) -> Result<()> {
        let mut options = self.options().await;
        options.max_age = -1;
        cookies.add(new_cookie(session.name(), String::new(), &options)?);

        session.values.clear();

        self.records.delete(&session.id).await?;
        tracing::debug!("Session deleted: {}", session.name());
        Ok(())
    }

    /// Removes every record whose expiry has passed.
    ///
    /// # Returns
    ///
    /// The number of records removed.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.records.delete_expired().await
    }

    /// Loads the record for `session.id` and decodes its values.
    async fn load(&self, session: &mut Session) -> Result<()> {
        let record = self.records.find_by_key(&session.id).await?;
        let data = String::from_utf8_lossy(&record.data);

        let settings = self.settings.read().await;
        session.values = codec::decode_multi(session.name(), &data, &settings.codecs)?;
        Ok(())
    }

    /// Creates or updates the record holding the encoded values.
    async fn persist(&self, session: &mut Session, data: String, expires_on: DateTime<Utc>) -> Result<()> {
        let record = Record::new(session.id.clone(), data.into_bytes(), expires_on);

        if session.is_new {
            self.records.create(&record).await?;
            session.is_new = false;
        } else {
            self.records.update(&record).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_defaults_to_max_age_from_now() {
        let now = Utc::now();
        let values = SessionValues::new();
        assert_eq!(expiry_for(&values, 3600, now).unwrap(), now + chrono::Duration::seconds(3600));
    }

    #[test]
    fn earlier_requested_expiry_is_raised() {
        let now = Utc::now();
        let mut values = SessionValues::new();
        values.expires_on = Some(now + chrono::Duration::seconds(60));
        assert_eq!(expiry_for(&values, 3600, now).unwrap(), now + chrono::Duration::seconds(3600));
    }

    #[test]
    fn later_requested_expiry_is_kept() {
        let now = Utc::now();
        let requested = now + chrono::Duration::days(90);
        let mut values = SessionValues::new();
        values.expires_on = Some(requested);
        assert_eq!(expiry_for(&values, 3600, now).unwrap(), requested);
    }

    #[test]
    fn negative_max_age_builds_expired_cookie() {
        let options = Options {
            max_age: -1,
            ..Options::default()
        };
        let cookie = new_cookie("session", String::new(), &options).unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.expires_datetime(), Some(OffsetDateTime::UNIX_EPOCH + Duration::seconds(1)));
    }

    #[test]
    fn zero_max_age_builds_browser_session_cookie() {
        let options = Options {
            max_age: 0,
            ..Options::default()
        };
        let cookie = new_cookie("session", "token".to_string(), &options).unwrap();
        assert_eq!(cookie.max_age(), None);
        assert!(cookie.expires().is_none());
    }

    #[test]
    fn oversized_max_age_is_an_error() {
        let now = Utc::now();
        assert!(matches!(
            expiry_for(&SessionValues::new(), i64::MAX, now),
            Err(SessionError::MaxAgeOutOfRange(i64::MAX))
        ));

        let options = Options {
            max_age: 400_000_000_000,
            ..Options::default()
        };
        assert!(matches!(
            new_cookie("session", "token".to_string(), &options),
            Err(SessionError::MaxAgeOutOfRange(400_000_000_000))
        ));
    }
}
