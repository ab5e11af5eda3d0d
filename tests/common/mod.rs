#![allow(dead_code)]

use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use chrono::Utc;
use http::{header, Request, Response};
use tokio::sync::{Notify, Semaphore};
use tower::{ServiceBuilder, ServiceExt};
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};

use pgsession::{
    crypto::codec::{codecs_from_pairs, KeyPair},
    models::record::Record,
    Options, Records, Result, SessionError, SqlStore,
};

/// Session records kept in memory, counting every call.
#[derive(Default)]
pub struct MemoryRecords {
    rows: Mutex<Vec<Record>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub finds: AtomicUsize,
    pub deletes: AtomicUsize,
    fail_writes: AtomicBool,
    hold: Mutex<Option<Hold>>,
}

/// Parks reads and creates until permits are added to `release`.
#[derive(Clone)]
pub struct Hold {
    pub entered: Arc<Notify>,
    pub release: Arc<Semaphore>,
}

impl MemoryRecords {
    pub fn rows(&self) -> Vec<Record> {
        self.rows.lock().unwrap().clone()
    }

    pub fn row(&self, key: &str) -> Option<Record> {
        self.rows.lock().unwrap().iter().find(|r| r.key == key).cloned()
    }

    pub fn insert_row(&self, record: Record) {
        self.rows.lock().unwrap().push(record);
    }

    /// Makes every later create/update fail with `SessionError::Encoding`.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Makes every later find/create wait on the returned `Hold`.
    pub fn hold_calls(&self) -> Hold {
        let hold = Hold {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        };
        *self.hold.lock().unwrap() = Some(hold.clone());
        hold
    }

    async fn wait_if_held(&self) {
        let hold = self.hold.lock().unwrap().clone();
        if let Some(hold) = hold {
            hold.entered.notify_one();
            let _permit = hold.release.acquire().await;
        }
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SessionError::Encoding("write refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Records for MemoryRecords {
    async fn create(&self, record: &Record) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.wait_if_held().await;
        self.check_writes()?;
        let now = Utc::now();
        let mut record = record.clone();
        record.created_on = now;
        record.updated_on = now;
        self.rows.lock().unwrap().push(record);
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> Result<Record> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.wait_if_held().await;
        self.row(key).ok_or(SessionError::NotFound)
    }

    async fn update(&self, record: &Record) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_writes()?;
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.key == record.key) {
            row.data = record.data.clone();
            row.expires_on = record.expires_on;
            row.updated_on = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().retain(|r| r.key != key);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.expires_on >= now);
        Ok((before - rows.len()) as u64)
    }
}

pub const COOKIE_NAME: &str = "session";

/// A store over fresh in-memory records with one encrypting codec.
pub fn memory_store(max_age: i64) -> SqlStore<MemoryRecords> {
    memory_store_with_pairs(max_age, &[KeyPair::generate()])
}

pub fn memory_store_with_pairs(max_age: i64, pairs: &[KeyPair]) -> SqlStore<MemoryRecords> {
    let codecs = codecs_from_pairs(pairs).unwrap();
    let options = Options {
        max_age,
        ..Options::default()
    };
    SqlStore::new(MemoryRecords::default(), codecs, options)
}

/// Runs `f` inside a request handled by `CookieManagerLayer`.
///
/// # Returns
///
/// The value produced by `f` and the cookies the response sets.
pub async fn with_cookies<F, Fut, T>(cookie: Option<&Cookie<'_>>, f: F) -> (T, Vec<Cookie<'static>>)
where
    F: FnOnce(Cookies) -> Fut,
    Fut: Future<Output = T>,
{
    let output = Arc::new(Mutex::new(None));
    let mut handler = Some(f);

    let slot = output.clone();
    let svc = ServiceBuilder::new()
        .layer(CookieManagerLayer::new())
        .service_fn(move |req: Request<Body>| {
            let cookies = req
                .extensions()
                .get::<Cookies>()
                .cloned()
                .expect("request includes Cookies extension");
            let f = handler.take().expect("handler runs once");
            let slot = slot.clone();
            async move {
                let value = f(cookies).await;
                *slot.lock().unwrap() = Some(value);
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }
        });

    let mut req = Request::builder();
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, format!("{}={}", cookie.name(), cookie.value()));
    }
    let req = req.body(Body::empty()).expect("request builds successfully");

    let res = svc.oneshot(req).await.expect("service call succeeds");
    let set_cookies = set_cookies(&res);

    let value = output.lock().unwrap().take().expect("handler produced a value");
    (value, set_cookies)
}

fn set_cookies(res: &Response<Body>) -> Vec<Cookie<'static>> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| {
            let value = value.to_str().expect("set-cookie header is valid utf-8");
            Cookie::parse(value.to_string()).expect("set-cookie parses successfully")
        })
        .collect()
}

/// Returns the cookie named `name` from a response.
pub fn cookie_named<'a>(cookies: &'a [Cookie<'static>], name: &str) -> &'a Cookie<'static> {
    cookies
        .iter()
        .find(|c| c.name() == name)
        .expect("response sets the session cookie")
}
