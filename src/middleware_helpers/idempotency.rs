use crate::auth::AuthUser;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use http_body_util::BodyExt as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const IDEMPOTENT_REPLAY_HEADER: &str = "idempotent-replay";

const MAX_KEY_LEN: usize = 255;

/// Replayable responses keyed by `{user}:{idempotency key}`.
#[derive(Clone)]
pub struct IdempotencyStore {
    entries: Arc<DashMap<String, Slot>>,
    ttl: Duration,
}

#[derive(Clone)]
enum Slot {
    InFlight(Instant),
    Done(StoredResponse),
}

impl Slot {
    fn started_at(&self) -> Instant {
        match self {
            Slot::InFlight(at) => *at,
            Slot::Done(sr) => sr.stored_at,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub content_type: Option<HeaderValue>,
    pub stored_at: Instant,
}

/// Outcome of trying to claim a key
#[derive(Debug)]
pub enum Claim {
    /// Caller owns the key and must `complete` or `release` it
    Acquired,
    /// A previous request with this key already finished
    Replay(StoredResponse),
    /// A request with this key is still running
    InProgress,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn claim(&self, key: &str) -> Claim {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(occupied.get().started_at()) >= self.ttl {
                    occupied.insert(Slot::InFlight(now));
                    return Claim::Acquired;
                }
                match occupied.get() {
                    Slot::Done(stored) => Claim::Replay(stored.clone()),
                    Slot::InFlight(_) => Claim::InProgress,
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::InFlight(now));
                Claim::Acquired
            }
        }
    }

    pub fn complete(&self, key: &str, response: StoredResponse) {
        self.entries.insert(key.to_string(), Slot::Done(response));
    }

    /// Drops an in-flight claim so the client may retry.
    pub fn release(&self, key: &str) {
        self.entries
            .remove_if(key, |_, slot| matches!(slot, Slot::InFlight(_)));
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, slot| now.duration_since(slot.started_at()) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

/// De-duplicates POSTs that carry an `Idempotency-Key` header.
///
/// Must run inside the auth layer: keys are scoped per authenticated user. A
/// successful request is replayed verbatim; a concurrent duplicate gets 409.
/// Failed requests are not stored so the client can retry them.
pub async fn idempotency_middleware(
    State(store): State<IdempotencyStore>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }

    let Some(raw_key) = req
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        return next.run(req).await;
    };

    if raw_key.len() > MAX_KEY_LEN {
        return crate::errors::ApiError::BadRequest(format!(
            "Idempotency-Key must be at most {} characters",
            MAX_KEY_LEN
        ))
        .into_response();
    }

    let scope = req
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.user_id.to_string())
        .unwrap_or_else(|| "anonymous".to_string());
    let key = format!("{}:{}", scope, raw_key);

    store.cleanup();

    match store.claim(&key) {
        Claim::Replay(stored) => {
            debug!(idempotency_key = %raw_key, "replaying stored response");
            return replay(stored);
        }
        Claim::InProgress => {
            warn!(idempotency_key = %raw_key, "duplicate request while original in flight");
            return crate::errors::ServiceError::Conflict(
                "A request with this Idempotency-Key is already being processed".into(),
            )
            .into_response();
        }
        Claim::Acquired => {}
    }

    let resp = next.run(req).await;
    if !resp.status().is_success() {
        store.release(&key);
        return resp;
    }

    let (parts, body) = resp.into_parts();
    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            store.complete(
                &key,
                StoredResponse {
                    status: parts.status,
                    body: bytes.clone(),
                    content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
                    stored_at: Instant::now(),
                },
            );
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(_) => {
            store.release(&key);
            Response::from_parts(parts, Body::empty())
        }
    }
}

fn replay(stored: StoredResponse) -> Response {
    let mut resp = Response::new(Body::from(stored.body));
    *resp.status_mut() = stored.status;
    if let Some(ct) = stored.content_type {
        resp.headers_mut().insert(header::CONTENT_TYPE, ct);
    }
    resp.headers_mut().insert(
        HeaderName::from_static(IDEMPOTENT_REPLAY_HEADER),
        HeaderValue::from_static("true"),
    );
    resp
}
