use crux_http::http::StatusCode;
use crux_http::RequestBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{
    ApiResult, ChatInitResponse, HistoryResponse, LoginRequest, LoginResponse,
    SendMessageRequest, SendMessageResponse, AUTHORIZATION_HEADER, CHAT_HISTORY_PATH,
    CHAT_INIT_PATH, CHAT_MESSAGE_PATH, LOGIN_PATH,
};
use crate::auth::{validate_phone, AuthStatus, Session};
use crate::capabilities::{Capabilities, TimerOutput};
use crate::chat::{ChatId, ChatSession, MessageId, Outgoing};
use crate::error::{AppError, ErrorKind, ValidationError};
use crate::event::Event;
use crate::model::{ChatView, ErrorView, LoginView, Model, SessionEpoch, ViewModel};
use crate::otp::{AttemptId, OtpChallenge, OtpError, OtpStatus, TickOutcome};
use crate::UnixTimeMs;

type Response = crux_http::Response<Vec<u8>>;

#[derive(Default)]
pub struct App;

impl App {
    // --- Requests ---

    fn authorized(model: &Model, builder: RequestBuilder<Event>) -> RequestBuilder<Event> {
        match model.auth.bearer() {
            Some(token) => builder.header(AUTHORIZATION_HEADER, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// Headers stay out of the log so the bearer is never written anywhere.
    fn log_request(model: &Model, method: &'static str, url: &Url) {
        debug!(
            method,
            path = url.path(),
            authorized = model.auth.bearer().is_some(),
            "http request"
        );
    }

    fn get(model: &Model, caps: &Capabilities, url: &Url) -> RequestBuilder<Event> {
        Self::log_request(model, "GET", url);
        Self::authorized(model, caps.http.get(url.as_str()))
    }

    fn post(model: &Model, caps: &Capabilities, path: &str) -> Result<RequestBuilder<Event>, AppError> {
        let url = model.config.endpoint(path)?;
        Self::log_request(model, "POST", &url);
        Ok(Self::authorized(model, caps.http.post(url.as_str())))
    }

    fn post_json<T: Serialize>(
        model: &Model,
        caps: &Capabilities,
        path: &str,
        body: &T,
    ) -> Result<RequestBuilder<Event>, AppError> {
        Ok(Self::post(model, caps, path)?.body_json(body)?)
    }

    fn login_body(challenge: &OtpChallenge, code: Option<String>) -> LoginRequest {
        LoginRequest {
            phone_number: challenge.phone_number().to_string(),
            code,
            region: challenge.region().to_string(),
            city: challenge.city().to_string(),
        }
    }

    fn is_unauthorized(result: &ApiResult) -> bool {
        matches!(result, Err(crux_http::Error::Http(e)) if e.code == StatusCode::Unauthorized)
    }

    /// Rejections from the login endpoint keep the server's message.
    fn login_outcome(result: ApiResult) -> Result<Response, AppError> {
        result.map_err(|e| match e {
            crux_http::Error::Http(http) => {
                AppError::from_http_status(http.code.into(), http.body.as_deref())
            }
            other => other.into(),
        })
    }

    fn is_live_attempt(model: &Model, attempt: AttemptId) -> bool {
        model.login.as_ref().map(OtpChallenge::attempt) == Some(attempt)
    }

    fn is_live_epoch(model: &Model, epoch: SessionEpoch, what: &'static str) -> bool {
        let live = model.epoch() == epoch;
        if !live {
            debug!(result = what, "result from an ended session discarded");
        }
        live
    }

    // --- Session ---

    /// Clears the persisted pair and all session-scoped state. Storage errors
    /// are logged when the delete completes; the caller never sees them.
    fn end_session(model: &mut Model, caps: &Capabilities) {
        model.session_store.clear(&caps.kv, Event::SessionCleared);
        model.auth = AuthStatus::Unauthenticated;
        model.chats.clear();
        model.chat_init_pending = false;
        model.advance_epoch();
    }

    fn invalidate_session(model: &mut Model, caps: &Capabilities) {
        let was_authenticated = model.is_authenticated();
        Self::end_session(model, caps);
        if was_authenticated {
            warn!("session invalidated by unauthorized response");
            model.set_error(AppError::new(ErrorKind::SessionExpired, "Session expired"));
        }
    }

    fn request_code(
        model: &mut Model,
        caps: &Capabilities,
        phone_number: &str,
        region: String,
        city: String,
    ) {
        if model.is_authenticated() {
            debug!("code requested while authenticated; ignoring");
            return;
        }

        let digits = match validate_phone(phone_number, model.config.min_phone_digits) {
            Ok(digits) => digits,
            Err(e) => {
                model.set_error(e.into());
                return;
            }
        };
        model.clear_error();

        if let Some(mut previous) = model.login.take() {
            if let Some(timer) = previous.abandon() {
                caps.timer.cancel(timer);
            }
        }

        let attempt = model.next_attempt_id();
        let mut challenge = OtpChallenge::new(attempt, digits, region, city);
        challenge.begin_request();

        match Self::post_json(model, caps, LOGIN_PATH, &Self::login_body(&challenge, None)) {
            Ok(request) => request.send(move |result| Event::CodeRequestResponse {
                attempt,
                resend: false,
                result: Box::new(result),
            }),
            Err(e) => {
                challenge.request_failed();
                model.set_error(e);
            }
        }
        model.login = Some(challenge);
    }

    fn handle_code_response(
        model: &mut Model,
        caps: &Capabilities,
        attempt: AttemptId,
        resend: bool,
        result: ApiResult,
    ) {
        if !Self::is_live_attempt(model, attempt) {
            debug!(attempt = attempt.0, "code response for a replaced login discarded");
            return;
        }
        if Self::is_unauthorized(&result) {
            Self::invalidate_session(model, caps);
        }

        let timer = model.next_timer_id();
        let countdown = model.config.otp_countdown_secs;
        let tick_ms = model.config.otp_tick_ms;

        let Some(challenge) = model.login.as_mut() else {
            return;
        };
        if !challenge.is_requesting() {
            return;
        }

        match Self::login_outcome(result) {
            Ok(_) => {
                if resend {
                    challenge.resend_succeeded(timer);
                } else {
                    challenge.start(countdown, timer);
                }
                caps.timer.start(timer, tick_ms, Event::OtpTick);
                info!(resend, "verification code issued");
            }
            Err(e) => {
                if resend {
                    challenge.resend_failed();
                } else {
                    challenge.request_failed();
                }
                warn!(resend, code = e.code(), "verification code request failed");
                model.set_error(e);
            }
        }
    }

    fn handle_tick(model: &mut Model, caps: &Capabilities, output: TimerOutput) {
        let TimerOutput::Fired { id } = output else {
            return;
        };
        let tick_ms = model.config.otp_tick_ms;
        let Some(challenge) = model.login.as_mut() else {
            return;
        };

        match challenge.tick(id) {
            TickOutcome::Ignored => debug!(timer = id.0, "stale tick ignored"),
            TickOutcome::Continue => caps.timer.start(id, tick_ms, Event::OtpTick),
            TickOutcome::Expired => info!("code countdown finished; resend available"),
        }
    }

    fn verify_code(model: &mut Model, caps: &Capabilities) {
        let Some(challenge) = model.login.as_mut() else {
            return;
        };
        let attempt = challenge.attempt();
        let body = match challenge.begin_verify() {
            Ok(code) => Self::login_body(challenge, Some(code)),
            Err(OtpError::IncompleteCode { expected }) => {
                model.set_error(ValidationError::IncompleteCode { expected }.into());
                return;
            }
            Err(e) => {
                debug!(error = %e, "verify ignored");
                return;
            }
        };

        match Self::post_json(model, caps, LOGIN_PATH, &body) {
            Ok(request) => request.send(move |result| Event::VerifyResponse {
                attempt,
                result: Box::new(result),
            }),
            Err(e) => {
                if let Some(challenge) = model.login.as_mut() {
                    challenge.verify_failed();
                }
                model.set_error(e);
            }
        }
    }

    fn handle_verify_response(
        model: &mut Model,
        caps: &Capabilities,
        attempt: AttemptId,
        result: ApiResult,
    ) {
        if !Self::is_live_attempt(model, attempt) {
            debug!(attempt = attempt.0, "verify response for a replaced login discarded");
            return;
        }
        if Self::is_unauthorized(&result) {
            Self::invalidate_session(model, caps);
        }

        let Some(challenge) = model.login.as_mut() else {
            return;
        };
        if challenge.status() != OtpStatus::Verifying {
            return;
        }

        let outcome = Self::login_outcome(result)
            .and_then(|mut response| Ok(response.body_json::<LoginResponse>()?))
            .and_then(|login| Session::from_login(login, challenge.phone_number()));

        match outcome {
            Ok(session) => {
                if let Some(timer) = challenge.verified() {
                    caps.timer.cancel(timer);
                }
                model.login = None;
                model
                    .session_store
                    .persist(&caps.kv, &session, Event::SessionPersisted);
                info!(role = session.role.as_str(), "authenticated");
                model.auth = AuthStatus::Authenticated(session);
                model.advance_epoch();
                model.clear_error();
            }
            Err(e) => {
                challenge.verify_failed();
                warn!(code = e.code(), "code verification failed");
                model.set_error(e);
            }
        }
    }

    fn resend_code(model: &mut Model, caps: &Capabilities) -> bool {
        let countdown = model.config.otp_countdown_secs;
        let Some(challenge) = model.login.as_mut() else {
            return false;
        };

        match challenge.begin_resend(countdown) {
            Ok(superseded) => {
                if let Some(timer) = superseded {
                    caps.timer.cancel(timer);
                }
            }
            Err(e) => {
                debug!(error = %e, "resend ignored");
                return false;
            }
        }

        let attempt = challenge.attempt();
        let body = Self::login_body(challenge, None);
        match Self::post_json(model, caps, LOGIN_PATH, &body) {
            Ok(request) => request.send(move |result| Event::CodeRequestResponse {
                attempt,
                resend: true,
                result: Box::new(result),
            }),
            Err(e) => {
                if let Some(challenge) = model.login.as_mut() {
                    challenge.resend_failed();
                }
                model.set_error(e);
            }
        }
        true
    }

    // --- Chat ---

    fn open_chat(model: &mut Model, caps: &Capabilities, chat_id: ChatId) {
        model
            .chats
            .entry(chat_id.clone())
            .or_insert_with(|| ChatSession::new(chat_id.clone()));
        Self::fetch_history(model, caps, chat_id);
    }

    fn fetch_history(model: &mut Model, caps: &Capabilities, chat_id: ChatId) {
        let url = match model
            .config
            .endpoint_with_id(CHAT_HISTORY_PATH, chat_id.as_str())
        {
            Ok(url) => url,
            Err(e) => {
                model.set_error(e.into());
                return;
            }
        };
        let request = Self::get(model, caps, &url);
        let epoch = model.epoch();

        if let Some(session) = model.chats.get_mut(&chat_id) {
            session.set_history_loading(true);
        }
        request.send(move |result| Event::HistoryResponse {
            epoch,
            chat_id,
            result: Box::new(result),
        });
    }

    fn handle_history(
        model: &mut Model,
        caps: &Capabilities,
        epoch: SessionEpoch,
        chat_id: &ChatId,
        result: ApiResult,
    ) {
        if !Self::is_live_epoch(model, epoch, "history") {
            return;
        }
        if Self::is_unauthorized(&result) {
            Self::invalidate_session(model, caps);
            return;
        }
        let Some(session) = model.chats.get_mut(chat_id) else {
            debug!(chat_id = %chat_id, "history for closed chat discarded");
            return;
        };

        let outcome = result
            .map_err(AppError::from)
            .and_then(|mut r| Ok(r.body_json::<HistoryResponse>()?));
        match outcome {
            Ok(history) => {
                let now = UnixTimeMs::now();
                let items = history
                    .into_items()
                    .into_iter()
                    .map(|item| item.into_incoming(now))
                    .collect();
                let added = session.merge_history(items, now);
                debug!(chat_id = %chat_id, added, "history merged");
            }
            Err(e) => {
                session.set_history_loading(false);
                warn!(chat_id = %chat_id, code = e.code(), "history fetch failed");
                model.set_error(e);
            }
        }
    }

    /// Validates, echoes locally, and dispatches. Invalid input is a silent no-op.
    fn send_outgoing(model: &mut Model, caps: &Capabilities, chat_id: &ChatId, outgoing: Outgoing) {
        let Some(session) = model.chats.get_mut(chat_id) else {
            return;
        };
        let id = MessageId::temporary();
        let body = match session.push_outgoing(id.clone(), outgoing, UnixTimeMs::now()) {
            Ok(message) => SendMessageRequest::from_message(chat_id, message),
            Err(e) => {
                debug!(error = %e, "outgoing message rejected");
                return;
            }
        };
        Self::dispatch(model, caps, chat_id, id, &body);
    }

    fn dispatch(
        model: &mut Model,
        caps: &Capabilities,
        chat_id: &ChatId,
        message_id: MessageId,
        body: &SendMessageRequest,
    ) {
        match Self::post_json(model, caps, CHAT_MESSAGE_PATH, body) {
            Ok(request) => {
                let epoch = model.epoch();
                let chat_id = chat_id.clone();
                request.send(move |result| Event::SendResponse {
                    epoch,
                    chat_id,
                    message_id,
                    result: Box::new(result),
                });
            }
            Err(e) => {
                if let Some(session) = model.chats.get_mut(chat_id) {
                    session.mark_failed(&message_id, e.user_facing_message());
                }
            }
        }
    }

    fn handle_send_response(
        model: &mut Model,
        caps: &Capabilities,
        epoch: SessionEpoch,
        chat_id: &ChatId,
        message_id: &MessageId,
        result: ApiResult,
    ) {
        if !Self::is_live_epoch(model, epoch, "send") {
            return;
        }
        if Self::is_unauthorized(&result) {
            Self::invalidate_session(model, caps);
            return;
        }
        let Some(session) = model.chats.get_mut(chat_id) else {
            debug!(chat_id = %chat_id, "send result for closed chat discarded");
            return;
        };

        match result.map_err(AppError::from) {
            Ok(mut response) => {
                let server_id = response
                    .body_json::<SendMessageResponse>()
                    .ok()
                    .and_then(|r| r.id)
                    .map(MessageId::new);
                session.mark_sent(message_id, server_id);
            }
            Err(e) => {
                warn!(chat_id = %chat_id, code = e.code(), "message send failed");
                session.mark_failed(message_id, e.user_facing_message());
            }
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(
            event = event.name(),
            user_initiated = event.is_user_initiated(),
            "update"
        );

        match event {
            Event::Noop => {}

            Event::AppStarted { config } => {
                match config.validate() {
                    Ok(()) => model.config = config,
                    Err(e) => {
                        warn!(error = %e, "invalid config; keeping defaults");
                        model.set_error(e.into());
                    }
                }
                model.auth = AuthStatus::Loading;
                model
                    .session_store
                    .restore(&caps.kv, Event::SessionRestored);
                caps.render.render();
            }

            Event::DismissError => {
                model.clear_error();
                caps.render.render();
            }

            Event::SessionRestored(result) => {
                if !model.auth.is_loading() {
                    debug!("late session restore ignored");
                    return;
                }
                model.auth = match result {
                    Ok(Some(session)) => {
                        info!(role = session.role.as_str(), "session restored");
                        model.advance_epoch();
                        AuthStatus::Authenticated(session)
                    }
                    Ok(None) => {
                        info!("no persisted session");
                        AuthStatus::Unauthenticated
                    }
                    Err(e) => {
                        warn!(error = %e, "session restore failed; starting signed out");
                        AuthStatus::Unauthenticated
                    }
                };
                caps.render.render();
            }

            Event::SessionPersisted(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to persist session");
                }
            }

            Event::SessionCleared(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to clear persisted session");
                }
            }

            Event::PhoneSubmitted {
                phone_number,
                region,
                city,
            } => {
                Self::request_code(model, caps, &phone_number, region, city);
                caps.render.render();
            }

            Event::CodeRequestResponse {
                attempt,
                resend,
                result,
            } => {
                Self::handle_code_response(model, caps, attempt, resend, *result);
                caps.render.render();
            }

            Event::OtpTick(output) => {
                Self::handle_tick(model, caps, output);
                caps.render.render();
            }

            Event::CodeDigitChanged { index, value } => {
                if let Some(challenge) = model.login.as_mut() {
                    challenge.set_digit(index, &value);
                    caps.render.render();
                }
            }

            Event::CodeBackspace { index } => {
                if let Some(challenge) = model.login.as_mut() {
                    challenge.backspace(index);
                    caps.render.render();
                }
            }

            Event::CodeSlotFocused { index } => {
                if let Some(challenge) = model.login.as_mut() {
                    challenge.focus(index);
                    caps.render.render();
                }
            }

            Event::VerifyCodeRequested => {
                Self::verify_code(model, caps);
                caps.render.render();
            }

            Event::VerifyResponse { attempt, result } => {
                Self::handle_verify_response(model, caps, attempt, *result);
                caps.render.render();
            }

            Event::ResendCodeRequested => {
                if Self::resend_code(model, caps) {
                    caps.render.render();
                }
            }

            Event::LoginAbandoned => {
                if let Some(mut challenge) = model.login.take() {
                    if let Some(timer) = challenge.abandon() {
                        caps.timer.cancel(timer);
                    }
                    caps.render.render();
                }
            }

            Event::LogoutRequested => {
                Self::end_session(model, caps);
                info!("logged out");
                caps.render.render();
            }

            Event::StartChat => {
                if !model.is_authenticated() || model.chat_init_pending {
                    return;
                }
                match Self::post(model, caps, CHAT_INIT_PATH) {
                    Ok(request) => {
                        model.chat_init_pending = true;
                        let epoch = model.epoch();
                        request.send(move |result| Event::ChatInitResponse {
                            epoch,
                            result: Box::new(result),
                        });
                    }
                    Err(e) => model.set_error(e),
                }
                caps.render.render();
            }

            Event::ChatInitResponse { epoch, result } => {
                if !Self::is_live_epoch(model, epoch, "chat init") || !model.chat_init_pending {
                    return;
                }
                model.chat_init_pending = false;

                if Self::is_unauthorized(&result) {
                    Self::invalidate_session(model, caps);
                } else {
                    let outcome = (*result)
                        .map_err(AppError::from)
                        .and_then(|mut r| Ok(r.body_json::<ChatInitResponse>()?));
                    match outcome {
                        Ok(init) => {
                            info!(chat_id = %init.chat_id, "chat started");
                            Self::open_chat(model, caps, ChatId::new(init.chat_id));
                        }
                        Err(e) => {
                            warn!(code = e.code(), "chat init failed");
                            model.set_error(e);
                        }
                    }
                }
                caps.render.render();
            }

            Event::OpenChat { chat_id } => {
                if model.is_authenticated() {
                    Self::open_chat(model, caps, chat_id);
                    caps.render.render();
                }
            }

            Event::CloseChat { chat_id } => {
                if model.chats.remove(&chat_id).is_some() {
                    caps.render.render();
                }
            }

            Event::RefreshHistory { chat_id } => {
                if model.chats.contains_key(&chat_id) {
                    Self::fetch_history(model, caps, chat_id);
                    caps.render.render();
                }
            }

            Event::HistoryResponse {
                epoch,
                chat_id,
                result,
            } => {
                Self::handle_history(model, caps, epoch, &chat_id, *result);
                caps.render.render();
            }

            Event::DraftChanged { chat_id, text } => {
                if let Some(session) = model.chats.get_mut(&chat_id) {
                    session.set_draft(text);
                    caps.render.render();
                }
            }

            Event::SendTextRequested { chat_id } => {
                let Some(text) = model.chats.get(&chat_id).map(|s| s.draft().to_string()) else {
                    return;
                };
                Self::send_outgoing(model, caps, &chat_id, Outgoing::Text(text));
                caps.render.render();
            }

            Event::AttachImageRequested { chat_id } => {
                if model.chats.contains_key(&chat_id) {
                    let epoch = model.epoch();
                    caps.device.pick_image(move |result| Event::ImagePicked {
                        epoch,
                        chat_id,
                        result,
                    });
                }
            }

            Event::ImagePicked {
                epoch,
                chat_id,
                result,
            } => {
                if !Self::is_live_epoch(model, epoch, "image pick") {
                    return;
                }
                if !model.chats.contains_key(&chat_id) {
                    debug!(chat_id = %chat_id, "picked image for closed chat discarded");
                    return;
                }
                match result {
                    Ok(Some(media)) => {
                        Self::send_outgoing(model, caps, &chat_id, Outgoing::Image(media));
                    }
                    Ok(None) => debug!("image picker dismissed"),
                    Err(e) => {
                        warn!(error = %e, "image pick failed");
                        model.set_error(e.into());
                    }
                }
                caps.render.render();
            }

            Event::ShareLocationRequested { chat_id } => {
                if model.chats.contains_key(&chat_id) {
                    let epoch = model.epoch();
                    caps.device.current_location(move |result| Event::LocationResolved {
                        epoch,
                        chat_id,
                        result,
                    });
                }
            }

            Event::LocationResolved {
                epoch,
                chat_id,
                result,
            } => {
                if !Self::is_live_epoch(model, epoch, "location") {
                    return;
                }
                if !model.chats.contains_key(&chat_id) {
                    debug!(chat_id = %chat_id, "location for closed chat discarded");
                    return;
                }
                match result {
                    Ok(coordinates) => {
                        Self::send_outgoing(model, caps, &chat_id, Outgoing::Location(coordinates));
                    }
                    Err(e) => {
                        warn!(error = %e, "location lookup failed");
                        model.set_error(e.into());
                    }
                }
                caps.render.render();
            }

            Event::RetryMessage {
                chat_id,
                message_id,
            } => {
                let Some(session) = model.chats.get_mut(&chat_id) else {
                    return;
                };
                let Some(message) = session.begin_retry(&message_id) else {
                    debug!(message_id = %message_id, "retry ignored; message is not failed");
                    return;
                };
                let body = SendMessageRequest::from_message(&chat_id, message);
                Self::dispatch(model, caps, &chat_id, message_id, &body);
                caps.render.render();
            }

            Event::SendResponse {
                epoch,
                chat_id,
                message_id,
                result,
            } => {
                Self::handle_send_response(model, caps, epoch, &chat_id, &message_id, *result);
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel {
            root: model.auth.navigator_root(),
            login: model.login.as_ref().map(LoginView::from),
            chats: model.chats.values().map(ChatView::from).collect(),
            chat_init_pending: model.chat_init_pending,
            error: model.active_error.as_ref().map(ErrorView::from),
            is_authenticated: model.is_authenticated(),
            phone_number: model
                .auth
                .session()
                .and_then(|s| s.phone_number.clone()),
        }
    }
}
