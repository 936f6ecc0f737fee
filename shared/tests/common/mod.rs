#![allow(dead_code)]

use crux_core::capability::Operation;
use crux_core::testing::AppTester;
use crux_core::Request;
use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
use serde_json::Value;

use shared::capabilities::{DeviceOperation, KvOperation, KvOutput, TimerOperation};
use shared::{App, CoreConfig, Effect, Event, Model};

pub type Tester = AppTester<App, Effect>;

/// Effects of one step, split by capability.
#[derive(Default)]
pub struct Effects {
    pub http: Vec<Request<HttpRequest>>,
    pub kv: Vec<Request<KvOperation>>,
    pub device: Vec<Request<DeviceOperation>>,
    pub timer: Vec<Request<TimerOperation>>,
    pub renders: usize,
}

impl Effects {
    fn absorb(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Http(r) => self.http.push(r),
                Effect::KeyValue(r) => self.kv.push(r),
                Effect::Device(r) => self.device.push(r),
                Effect::Timer(r) => self.timer.push(r),
                Effect::Render(_) => self.renders += 1,
            }
        }
    }

    pub fn only_http(mut self) -> Request<HttpRequest> {
        assert_eq!(self.http.len(), 1, "expected exactly one http request");
        self.http.remove(0)
    }

    pub fn only_kv(mut self) -> Request<KvOperation> {
        assert_eq!(self.kv.len(), 1, "expected exactly one kv request");
        self.kv.remove(0)
    }

    pub fn timer_starts(&self) -> Vec<(u64, u64)> {
        self.timer
            .iter()
            .filter_map(|r| match r.operation {
                TimerOperation::Start { id, millis } => Some((id.0, millis)),
                TimerOperation::Cancel { .. } => None,
            })
            .collect()
    }

    pub fn timer_cancels(&self) -> Vec<u64> {
        self.timer
            .iter()
            .filter_map(|r| match r.operation {
                TimerOperation::Cancel { id } => Some(id.0),
                TimerOperation::Start { .. } => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.http.is_empty() && self.kv.is_empty() && self.device.is_empty() && self.timer.is_empty()
    }
}

pub fn run(app: &Tester, model: &mut Model, event: Event) -> Effects {
    let update = app.update(event, model);
    let mut effects = Effects::default();
    effects.absorb(update.effects);
    for event in update.events {
        let nested = run(app, model, event);
        effects.absorb_effects(nested);
    }
    effects
}

/// Resolves a request and feeds every resulting event back into the app.
pub fn resolve<Op: Operation>(
    app: &Tester,
    model: &mut Model,
    request: &mut Request<Op>,
    output: Op::Output,
) -> Effects {
    let update = app.resolve(request, output).expect("request should resolve");
    let mut effects = Effects::default();
    effects.absorb(update.effects);
    for event in update.events {
        let nested = run(app, model, event);
        effects.absorb_effects(nested);
    }
    effects
}

impl Effects {
    fn absorb_effects(&mut self, other: Effects) {
        self.http.extend(other.http);
        self.kv.extend(other.kv);
        self.device.extend(other.device);
        self.timer.extend(other.timer);
        self.renders += other.renders;
    }
}

pub fn http_request(request: &Request<HttpRequest>) -> &HttpRequest {
    &request.operation
}

/// Header lookup by name; the shell sees names lowercased.
pub fn header<'a>(request: &'a Request<HttpRequest>, name: &str) -> Option<&'a str> {
    request
        .operation
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

pub fn path(request: &Request<HttpRequest>) -> String {
    url::Url::parse(&request.operation.url)
        .expect("request url parses")
        .path()
        .to_string()
}

pub fn json_body(request: &Request<HttpRequest>) -> Value {
    serde_json::from_slice(&request.operation.body).expect("request has a JSON body")
}

pub fn ok_json(value: Value) -> HttpResult {
    HttpResult::Ok(HttpResponse::ok().json(value).build())
}

pub fn status(code: u16) -> HttpResult {
    HttpResult::Ok(HttpResponse::status(code).build())
}

pub fn status_json(code: u16, value: Value) -> HttpResult {
    HttpResult::Ok(HttpResponse::status(code).json(value).build())
}

pub fn network_error() -> HttpResult {
    HttpResult::Err(crux_http::Error::Io("connection reset".to_string()))
}

pub fn timed_out() -> HttpResult {
    HttpResult::Err(crux_http::Error::Timeout)
}

pub fn start(app: &Tester, model: &mut Model, config: CoreConfig) -> Effects {
    run(app, model, Event::AppStarted { config })
}

/// Starts the app and answers the session read with the given stored pair.
pub fn boot(app: &Tester, model: &mut Model, token: Option<&str>, role: Option<&str>) {
    let mut kv = start(app, model, CoreConfig::default()).only_kv();
    let values = vec![
        token.map(|t| t.as_bytes().to_vec()),
        role.map(|r| r.as_bytes().to_vec()),
    ];
    resolve(app, model, &mut kv, Ok(KvOutput::Values(values)));
}
