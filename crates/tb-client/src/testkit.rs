//! Scripted transport and recording UI shared by the unit tests.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tb_storage::MemoryStore;

use crate::config::ClientConfig;
use crate::context::AppContext;
use crate::session::UserIdentity;
use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use crate::ui::{Form, Notice, Page, UiSink};

pub const BASE: &str = "http://bank.test/api";

pub fn test_config() -> ClientConfig {
    ClientConfig::with_api_base(BASE)
}

/// Unsigned token carrying `claims`; only the payload segment matters here.
pub fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[derive(Clone)]
enum Scripted {
    Reply(HttpResponse),
    Fail,
}

/// Replies are consumed in order; the last reply on a route repeats forever.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    log: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    fn script(&self, method: Method, path: &str, scripted: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(scripted);
    }

    pub fn on(&self, method: Method, path: &str, status: u16, body: Value) {
        self.on_reply(method, path, status, Vec::new(), &body.to_string());
    }

    pub fn on_text(&self, method: Method, path: &str, status: u16, body: &str) {
        self.on_reply(method, path, status, Vec::new(), body);
    }

    pub fn on_reply(&self, method: Method, path: &str, status: u16, headers: Vec<(String, String)>, body: &str) {
        self.script(
            method,
            path,
            Scripted::Reply(HttpResponse {
                status,
                headers,
                body: body.to_owned(),
            }),
        );
    }

    pub fn fail(&self, method: Method, path: &str) {
        self.script(method, path, Scripted::Fail);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method && route_path(&request.url) == path)
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    pub fn last_body(&self, method: Method, path: &str) -> Option<Value> {
        self.requests_to(method, path)
            .last()
            .and_then(|request| request.body.as_deref())
            .and_then(|body| serde_json::from_str(body).ok())
    }
}

/// `http://bank.test/api/v1/cards?x=1` -> `/v1/cards`.
fn route_path(url: &str) -> String {
    let path = url.strip_prefix(BASE).unwrap_or(url);
    path.split('?').next().unwrap_or_default().to_owned()
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let key = (request.method, route_path(&request.url));
        self.log.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match scripted {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail) => Err(TransportError::Send("connection refused".to_owned())),
            None => Ok(HttpResponse {
                status: 404,
                headers: Vec::new(),
                body: r#"{"message":"no route"}"#.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    ShowLoader,
    HideLoader,
    Notice(Notice),
    Navigate(Page),
    FormBusy(Form, bool),
}

#[derive(Default)]
pub struct RecordingUi {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    fn record(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &UiEvent) -> usize {
        self.events().iter().filter(|recorded| *recorded == event).count()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    pub fn pages(&self) -> Vec<Page> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::Navigate(page) => Some(page),
                _ => None,
            })
            .collect()
    }
}

impl UiSink for RecordingUi {
    fn show_loader(&self) {
        self.record(UiEvent::ShowLoader);
    }

    fn hide_loader(&self) {
        self.record(UiEvent::HideLoader);
    }

    fn notify(&self, notice: Notice) {
        self.record(UiEvent::Notice(notice));
    }

    fn navigate(&self, page: Page) {
        self.record(UiEvent::Navigate(page));
    }

    fn form_busy(&self, form: Form, busy: bool) {
        self.record(UiEvent::FormBusy(form, busy));
    }
}

pub struct Harness {
    pub ctx: AppContext,
    pub transport: Arc<MockTransport>,
    pub ui: Arc<RecordingUi>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MockTransport::new())
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self::build(MockTransport::with_delay(delay))
    }

    /// A harness whose session already knows `user_id`.
    pub fn signed_in(user_id: &str) -> Self {
        let harness = Self::new();
        harness.ctx.tokens.set_token("t-1");
        harness.ctx.session.set_user(UserIdentity::with_id(user_id));
        harness
    }

    fn build(transport: Arc<MockTransport>) -> Self {
        let ui = Arc::new(RecordingUi::default());
        let store = Arc::new(MemoryStore::new());
        let ctx = AppContext::new(test_config(), transport.clone(), store.clone(), ui.clone());
        Self {
            ctx,
            transport,
            ui,
            store,
        }
    }
}
