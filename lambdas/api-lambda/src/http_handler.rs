use base64::{engine::general_purpose, Engine as _};
use lambda_http::{
    http::{HeaderMap, Method, StatusCode},
    Body, Error, Request, Response,
};
use roadwatch_shared::{
    auth::CognitoAuth,
    dashboard::{self, RewardSummary},
    error::{AuthError, BackendError, SubmitError},
    geolocation::{Geolocator, ReportedPosition},
    routes::{self, History, Route, RouteDecision},
    session::{SessionManager, Subscription},
    submission::{AttachOutcome, EvidenceFile, ReportForm, SubmissionPipeline},
    types::{Identity, Position, ProfileUpdate, ViolationCategory},
    AppState,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignUpRequest {
    email: String,
    password: String,
    name: String,
}

#[derive(Deserialize)]
struct SubmitReportRequest {
    #[serde(default)]
    category: ViolationCategory,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
    /// Device position at submit time; only used when `location` is blank
    position: Option<Position>,
    #[serde(default)]
    evidence: Vec<EvidenceUpload>,
}

#[derive(Deserialize)]
struct EvidenceUpload {
    file_name: String,
    content_type: String,
    file_data: String,
    /// Fix captured when this file was picked
    position: Option<Position>,
    /// Why the device had no fix for this file
    location_error: Option<String>,
}

/// Session state for one invocation, resumed from the caller's bearer token
struct RequestSession {
    auth: Arc<CognitoAuth>,
    history: Arc<History>,
    manager: SessionManager,
    subscription: Subscription,
}

impl RequestSession {
    async fn open(state: &AppState, headers: &HeaderMap) -> Self {
        let auth = state.auth(bearer_token(headers));
        let history = Arc::new(History::default());
        let manager = SessionManager::new(auth.clone(), state.records(), history.clone());
        let subscription = manager.initialize().await;

        Self {
            auth,
            history,
            manager,
            subscription,
        }
    }

    fn identity(&self) -> Option<Identity> {
        self.manager.identity()
    }

    fn redirect(&self) -> Option<&'static str> {
        self.history.current().map(|route| route.path())
    }

    fn close(self) {
        self.subscription.dispose();
    }
}

/// Main Lambda handler - routes page checks and API calls
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,PATCH,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    if let Some(endpoint) = path.strip_prefix("/api/") {
        let session = RequestSession::open(&state, event.headers()).await;
        let response = api_request(&state, &session, &method, endpoint, event.body()).await;
        session.close();
        return response;
    }

    match (&method, Route::parse(&path)) {
        (&Method::GET, Some(route)) => {
            let session = RequestSession::open(&state, event.headers()).await;
            let decision = routes::guard(route, &session.manager.state());
            session.close();
            page_response(decision)
        }
        (_, Some(_)) => method_not_allowed(),
        (_, None) => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            not_found()
        }
    }
}

async fn api_request(
    state: &AppState,
    session: &RequestSession,
    method: &Method,
    endpoint: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    match (method, endpoint.trim_end_matches('/')) {
        (&Method::POST, "signin") => sign_in(session, body).await,
        (&Method::POST, "signup") => sign_up(session, body).await,
        (&Method::POST, "signout") => sign_out(session).await,
        (&Method::GET, "session") => json_response(
            StatusCode::OK,
            serde_json::to_value(session.manager.state())?,
        ),
        (&Method::PATCH, "profile") => update_profile(session, body).await,
        (&Method::POST, "reports") => submit_report(state, session, body).await,
        (&Method::GET, "reports") => list_reports(state, session).await,
        (&Method::GET, "rewards") => list_rewards(state, session).await,
        (_, "signin" | "signup" | "signout" | "session" | "profile" | "reports" | "rewards") => {
            method_not_allowed()
        }
        _ => not_found(),
    }
}

async fn sign_in(session: &RequestSession, body: &[u8]) -> Result<Response<Body>, Error> {
    let request: SignInRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match session.manager.sign_in(&request.email, &request.password).await {
        Ok(()) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "identity": session.identity(),
                "tokens": session.auth.tokens(),
                "redirect": session.redirect(),
            }),
        ),
        Err(e) => auth_error_response(&e),
    }
}

async fn sign_up(session: &RequestSession, body: &[u8]) -> Result<Response<Body>, Error> {
    let request: SignUpRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match session
        .manager
        .sign_up(&request.email, &request.password, &request.name)
        .await
    {
        Ok(()) => {
            let current = session.manager.state();
            json_response(
                StatusCode::CREATED,
                serde_json::json!({
                    "identity": current.identity,
                    "profile": current.profile,
                    "tokens": session.auth.tokens(),
                    "redirect": session.redirect(),
                }),
            )
        }
        Err(e) => auth_error_response(&e),
    }
}

async fn sign_out(session: &RequestSession) -> Result<Response<Body>, Error> {
    match session.manager.sign_out().await {
        Ok(()) => json_response(
            StatusCode::OK,
            serde_json::json!({ "redirect": session.redirect() }),
        ),
        Err(e) => auth_error_response(&e),
    }
}

async fn update_profile(session: &RequestSession, body: &[u8]) -> Result<Response<Body>, Error> {
    let update: ProfileUpdate = match parse_body(body) {
        Ok(update) => update,
        Err(response) => return response,
    };

    match session.manager.update_profile(update).await {
        Ok(profile) => json_response(StatusCode::OK, serde_json::to_value(profile)?),
        Err(e) => auth_error_response(&e),
    }
}

async fn submit_report(
    state: &AppState,
    session: &RequestSession,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let Some(identity) = session.identity() else {
        return submit_error_response(&SubmitError::Unauthorized);
    };

    let request: SubmitReportRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let files = match decode_evidence(request.evidence) {
        Ok(files) => files,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, "invalid_evidence", message),
    };

    let mut form = ReportForm::new();
    form.category = request.category;
    form.location = request.location;
    form.description = request.description;
    let attached = attach_all(&mut form, files).await;

    let geolocator: Arc<dyn Geolocator> = Arc::new(ReportedPosition {
        position: request.position,
        error: None,
    });

    let pipeline = SubmissionPipeline::new(state.records(), state.objects(), geolocator);
    match pipeline.submit(Some(&identity), &mut form).await {
        Ok(submitted) => json_response(
            StatusCode::CREATED,
            serde_json::json!({
                "report": submitted.report,
                "images": submitted.images,
                "rejected": attached.rejected,
                "location_warning": attached.location_warning,
                "redirect": Route::Dashboard.path(),
            }),
        ),
        Err(e) => submit_error_response(&e),
    }
}

async fn list_reports(state: &AppState, session: &RequestSession) -> Result<Response<Body>, Error> {
    let Some(identity) = session.identity() else {
        return auth_error_response(&AuthError::Unauthorized);
    };

    match dashboard::load_for_identity(&state.records(), &identity.id).await {
        Ok(reports) => {
            let summary = RewardSummary::from_reports(&reports);
            json_response(
                StatusCode::OK,
                serde_json::json!({ "reports": reports, "summary": summary }),
            )
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "load_failed", e.user_message()),
    }
}

async fn list_rewards(state: &AppState, session: &RequestSession) -> Result<Response<Body>, Error> {
    let Some(identity) = session.identity() else {
        return auth_error_response(&AuthError::Unauthorized);
    };

    match dashboard::load_for_identity(&state.records(), &identity.id).await {
        Ok(reports) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "history": dashboard::reward_history(&reports),
                "summary": RewardSummary::from_reports(&reports),
            }),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "load_failed", e.user_message()),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn decode_evidence(
    uploads: Vec<EvidenceUpload>,
) -> Result<Vec<(EvidenceFile, ReportedPosition)>, String> {
    uploads
        .into_iter()
        .map(|upload| {
            let bytes = general_purpose::STANDARD
                .decode(&upload.file_data)
                .map_err(|e| format!("{} is not valid base64: {}", upload.file_name, e))?;
            let reported = ReportedPosition::from_device(upload.position, upload.location_error);
            Ok((
                EvidenceFile {
                    name: upload.file_name,
                    content_type: upload.content_type,
                    bytes,
                },
                reported,
            ))
        })
        .collect()
}

/// Attach files one by one, each tagged with the fix the device sent for it
async fn attach_all(
    form: &mut ReportForm,
    files: Vec<(EvidenceFile, ReportedPosition)>,
) -> AttachOutcome {
    let mut outcome = AttachOutcome::default();
    for (file, reported) in files {
        let step = form.attach_evidence(vec![file], &reported).await;
        outcome.attached += step.attached;
        outcome.rejected.extend(step.rejected);
        outcome.location_warning = outcome.location_warning.or(step.location_warning);
    }
    outcome
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Result<Response<Body>, Error>> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Invalid request body: {}", e);
        error_response(StatusCode::BAD_REQUEST, "invalid_body", "Invalid request body")
    })
}

fn auth_error_status(error: &AuthError) -> (StatusCode, &'static str) {
    match error {
        AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
        AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        AuthError::Backend(BackendError::Rejected(_)) => (StatusCode::BAD_REQUEST, "rejected"),
        AuthError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

fn submit_error_status(error: &SubmitError) -> (StatusCode, &'static str) {
    match error {
        SubmitError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        SubmitError::NoEvidence | SubmitError::TooMuchEvidence { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_evidence")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "submit_failed"),
    }
}

fn auth_error_response(error: &AuthError) -> Result<Response<Body>, Error> {
    let (status, code) = auth_error_status(error);
    error_response(status, code, error.user_message())
}

fn submit_error_response(error: &SubmitError) -> Result<Response<Body>, Error> {
    let (status, code) = submit_error_status(error);
    if let Some(report_id) = error.orphaned_report_id() {
        tracing::warn!("Report {} left without all of its evidence", report_id);
    }
    error_response(status, code, error.user_message())
}

fn page_response(decision: RouteDecision) -> Result<Response<Body>, Error> {
    match decision {
        RouteDecision::Render(route) => json_response(
            StatusCode::OK,
            serde_json::json!({ "route": route.path() }),
        ),
        RouteDecision::Loading => json_response(
            StatusCode::OK,
            serde_json::json!({ "loading": true }),
        ),
        RouteDecision::Redirect(route) => Ok(Response::builder()
            .status(StatusCode::FOUND)
            .header("Location", route.path())
            .header("Access-Control-Allow-Origin", "*")
            .body(Body::Empty)
            .map_err(Box::new)?),
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(body.to_string().into())
        .map_err(Box::new)?)
}

fn error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> Result<Response<Body>, Error> {
    json_response(
        status,
        serde_json::json!({ "error": code, "message": message.into() }),
    )
}

fn method_not_allowed() -> Result<Response<Body>, Error> {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "Method not allowed",
    )
}

fn not_found() -> Result<Response<Body>, Error> {
    error_response(StatusCode::NOT_FOUND, "not_found", "Not found")
}
