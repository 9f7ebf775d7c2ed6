//! The relay's HTTP API served from memory, for tests that need a real
//! `HttpRelay` on the other end

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use url::Url;

use common::account::{self, Account};
use common::clipboard::{ClipboardItemMeta, EncryptedClipboardItem};
use common::crypto::{EncryptedPayload, KeyPayload, SymmetricKey};
use common::relay::{MemoryRelay, Relay, RelayError};
use tempfile::TempDir;

use crate::cli::op::OpContext;
use crate::relay_client::{
    AccessCodeResponse, AccountItem, Device, DeviceUpdate, HttpRelay, RegisterRequest,
    ACCOUNT_HEADER, TOKEN_HEADER,
};
use crate::settings_file::FileSettings;
use crate::state::{AppConfig, AppState};

/// Relay API backed by `MemoryRelay`, served on a random local port
///
/// Clones share all state, so a test keeps one clone to inspect what the
/// client did.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    pub relay: MemoryRelay,
    pub clipboard: Arc<Mutex<Vec<EncryptedClipboardItem>>>,
    /// Device records per account id
    pub devices: Arc<Mutex<BTreeMap<String, Vec<Device>>>>,
    /// token -> (account id, device id)
    tokens: Arc<Mutex<BTreeMap<String, (String, String)>>>,
    /// Full clipboard downloads, not counting HEAD requests
    pub clipboard_fetches: Arc<AtomicUsize>,
}

/// The device a request authenticated as
struct Caller {
    account_id: String,
    device_id: String,
}

type Reply<T> = Result<Json<T>, StatusCode>;

fn status(err: RelayError) -> StatusCode {
    if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Moves forward by a second with every posted item
fn last_modified(posted: usize) -> String {
    let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    (base + Duration::seconds(posted as i64))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

impl FakeServer {
    pub fn with_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            relay: MemoryRelay::with_codes(codes),
            ..Default::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.clipboard_fetches.load(Ordering::SeqCst)
    }

    pub fn device_names(&self, account_id: &str) -> Vec<String> {
        self.devices
            .lock()
            .unwrap()
            .get(account_id)
            .map(|devices| devices.iter().map(|d| d.name.clone()).collect())
            .unwrap_or_default()
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<Caller, StatusCode> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let (Some(account_id), Some(token)) = (header(ACCOUNT_HEADER), header(TOKEN_HEADER))
        else {
            return Err(StatusCode::UNAUTHORIZED);
        };
        let tokens = self.tokens.lock().unwrap();
        match tokens.get(&token) {
            Some((owner, device_id)) if *owner == account_id => Ok(Caller {
                account_id,
                device_id: device_id.clone(),
            }),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }
}

async fn request_code(
    State(server): State<FakeServer>,
    Json(payload): Json<KeyPayload>,
) -> Reply<AccessCodeResponse> {
    let code = server
        .relay
        .request_access_code(&payload)
        .await
        .map_err(status)?;
    Ok(Json(AccessCodeResponse { code }))
}

async fn exchange(
    State(server): State<FakeServer>,
    Path(code): Path<String>,
    Json(payload): Json<KeyPayload>,
) -> Reply<KeyPayload> {
    let primary = server
        .relay
        .exchange_link_key(&code, &payload)
        .await
        .map_err(status)?;
    Ok(Json(primary))
}

async fn fetch(State(server): State<FakeServer>, Path(code): Path<String>) -> Reply<KeyPayload> {
    Ok(Json(
        server.relay.fetch_link_key(&code).await.map_err(status)?,
    ))
}

async fn post_aux(
    State(server): State<FakeServer>,
    Path(code): Path<String>,
    Json(auth): Json<EncryptedPayload>,
) -> Result<StatusCode, StatusCode> {
    server
        .relay
        .post_account_auth(&code, &auth)
        .await
        .map_err(status)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_aux(
    State(server): State<FakeServer>,
    Path(code): Path<String>,
) -> Reply<EncryptedPayload> {
    Ok(Json(
        server.relay.get_account_auth(&code).await.map_err(status)?,
    ))
}

async fn register(
    State(server): State<FakeServer>,
    Json(request): Json<RegisterRequest>,
) -> Reply<AccountItem> {
    let name = request.device_name.unwrap_or_default();
    let account = server
        .relay
        .register_device(&name, request.account_id.as_deref())
        .await
        .map_err(status)?;
    server.tokens.lock().unwrap().insert(
        account.token.clone(),
        (account.id.clone(), account.device_id.clone()),
    );

    let device = {
        let mut devices = server.devices.lock().unwrap();
        let listed = devices.entry(account.id.clone()).or_default();
        let device = Device {
            device_id: account.device_id.clone(),
            name,
            token: None,
            create_date: Some(Utc::now()),
            manage_device: Some(listed.is_empty()),
        };
        listed.push(device.clone());
        device
    };

    Ok(Json(AccountItem {
        account_id: account.id,
        create_date: Some(Utc::now()),
        devices: vec![Device {
            token: Some(account.token),
            ..device
        }],
    }))
}

/// GET and HEAD; axum answers HEAD with this handler minus the body
async fn list_clipboard(
    State(server): State<FakeServer>,
    method: Method,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    let caller = server.authenticate(&headers)?;
    if method == Method::GET {
        server.clipboard_fetches.fetch_add(1, Ordering::SeqCst);
    }

    let items = server.clipboard.lock().unwrap();
    let listed: Vec<EncryptedClipboardItem> = items
        .iter()
        .rev()
        .filter(|item| item.account_id == caller.account_id)
        .cloned()
        .collect();
    Ok((
        [(header::LAST_MODIFIED, last_modified(items.len()))],
        Json(listed),
    ))
}

async fn post_clipboard(
    State(server): State<FakeServer>,
    headers: HeaderMap,
    Json(content): Json<EncryptedPayload>,
) -> Result<StatusCode, StatusCode> {
    let caller = server.authenticate(&headers)?;
    let mut items = server.clipboard.lock().unwrap();
    let create_ts = items.len() as i64 + 1;
    items.push(EncryptedClipboardItem {
        meta: ClipboardItemMeta {
            device_id: caller.device_id,
            create_ts,
            expires_at: None,
            device_name: None,
        },
        account_id: caller.account_id,
        content,
    });
    Ok(StatusCode::CREATED)
}

async fn list_devices(State(server): State<FakeServer>, headers: HeaderMap) -> Reply<Vec<Device>> {
    let caller = server.authenticate(&headers)?;
    let devices = server.devices.lock().unwrap();
    Ok(Json(
        devices.get(&caller.account_id).cloned().unwrap_or_default(),
    ))
}

async fn current_device(State(server): State<FakeServer>, headers: HeaderMap) -> Reply<Device> {
    let caller = server.authenticate(&headers)?;
    let devices = server.devices.lock().unwrap();
    devices
        .get(&caller.account_id)
        .and_then(|listed| listed.iter().find(|d| d.device_id == caller.device_id))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_device(
    State(server): State<FakeServer>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<DeviceUpdate>,
) -> Result<StatusCode, StatusCode> {
    let caller = server.authenticate(&headers)?;
    let mut devices = server.devices.lock().unwrap();
    let device = devices
        .get_mut(&caller.account_id)
        .and_then(|listed| listed.iter_mut().find(|d| d.device_id == device_id))
        .ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = update.name {
        device.name = name;
    }
    if let Some(manage) = update.manage_device {
        device.manage_device = Some(manage);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_device(
    State(server): State<FakeServer>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    let caller = server.authenticate(&headers)?;
    let mut devices = server.devices.lock().unwrap();
    let listed = devices
        .get_mut(&caller.account_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let before = listed.len();
    listed.retain(|d| d.device_id != device_id);
    if listed.len() == before {
        return Err(StatusCode::NOT_FOUND);
    }

    // the removed device's token stops working
    server
        .tokens
        .lock()
        .unwrap()
        .retain(|_, (_, owner_device)| *owner_device != device_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Serve `server` under `prefix`, returning the base URL
pub async fn spawn(server: FakeServer, prefix: &str) -> Url {
    let api = Router::new()
        .route("/accounts/code", post(request_code))
        .route("/accounts/code/:code", post(exchange).get(fetch))
        .route("/accounts/code/:code/aux", post(post_aux).get(get_aux))
        .route("/accounts/register", post(register))
        .route("/accounts/manage/devices", get(list_devices))
        .route("/accounts/manage/devices/current", get(current_device))
        .route(
            "/accounts/manage/devices/:device_id",
            put(update_device).delete(remove_device),
        )
        .route("/clipboard", get(list_clipboard).post(post_clipboard))
        .with_state(server);
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("http://{}{}", addr, prefix)).unwrap()
}

/// A cachenut directory configured for `server`, with this device already
/// registered under `device_name`
pub async fn initialized_app(
    server: &FakeServer,
    device_name: &str,
) -> (TempDir, OpContext, Account, SymmetricKey) {
    let base = spawn(server.clone(), "").await;
    let temp = TempDir::new().unwrap();
    let config = AppConfig {
        relay_url: base,
        ..Default::default()
    };
    let state = AppState::init(Some(temp.path().to_path_buf()), Some(config)).unwrap();

    let relay = HttpRelay::new(&state.config.relay_url).unwrap();
    let store = FileSettings::new(&state.settings_path);
    let (account, key) = account::create_account(&relay, &store, device_name)
        .await
        .unwrap();

    let ctx = OpContext::new(None, Some(temp.path().to_path_buf()));
    (temp, ctx, account, key)
}
