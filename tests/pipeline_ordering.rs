// Ordering and short-circuit contracts of the behavior pipeline.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde_json::json;
use synapse::{
    BehaviorResult, ExceptionOutcome, MethodContext, MethodReturn, RestService, Route,
    SecureServiceBehavior, ServiceBehavior, ServiceError, ServiceRequest, ServiceResult,
    config::FrameworkConfig,
};

type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

/// Records every hook it sees; optionally stops during `on_executing`.
struct Recorder {
    name: &'static str,
    log: Log,
    stop_executing: bool,
}

impl Recorder {
    fn new(name: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            stop_executing: false,
        })
    }

    fn stopping(name: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            stop_executing: true,
        })
    }
}

#[async_trait]
impl ServiceBehavior for Recorder {
    async fn on_executing(&self, _ctx: &mut MethodContext) -> BehaviorResult {
        record(&self.log, format!("{}:executing", self.name));
        if self.stop_executing {
            BehaviorResult::stop(StatusCode::CONFLICT, "stopped while executing")
        } else {
            BehaviorResult::Execute
        }
    }

    async fn on_executed(&self, _ctx: &mut MethodContext, _returned: &MethodReturn) {
        record(&self.log, format!("{}:executed", self.name));
    }

    async fn on_exception(
        &self,
        _ctx: &mut MethodContext,
        _error: &ServiceError,
    ) -> ExceptionOutcome {
        record(&self.log, format!("{}:exception", self.name));
        ExceptionOutcome::BubbleUp
    }
}

/// Secure recorder with a configurable authorizing verdict.
struct Gate {
    name: &'static str,
    log: Log,
    allow: bool,
    authentication: bool,
}

impl Gate {
    fn allowing(name: &'static str, log: &Log, authentication: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            allow: true,
            authentication,
        })
    }

    fn denying(name: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            allow: false,
            authentication: false,
        })
    }
}

#[async_trait]
impl ServiceBehavior for Gate {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for Gate {
    async fn on_authorizing(&self, _ctx: &mut MethodContext) -> BehaviorResult {
        record(&self.log, format!("{}:authorizing", self.name));
        if self.allow {
            BehaviorResult::Execute
        } else {
            BehaviorResult::forbidden("denied")
        }
    }

    fn is_authentication(&self) -> bool {
        self.authentication
    }
}

fn request(path: &str) -> ServiceRequest {
    ServiceRequest::builder(Method::GET, path.parse().unwrap()).build()
}

#[tokio::test]
async fn test_executed_hooks_unwind_in_reverse_order() {
    let log: Log = Arc::default();
    let handler_log = Arc::clone(&log);

    let service = RestService::builder(FrameworkConfig::default())
        .behavior(Recorder::new("global", &log))
        .route(
            Route::get("/work")
                .behavior(Recorder::new("inner", &log))
                .behavior(Recorder::new("innermost", &log))
                .handle(move |_, _| {
                    let log = Arc::clone(&handler_log);
                    async move {
                        record(&log, "handler");
                        MethodReturn::value(json!({"done": true}))
                    }
                }),
        )
        .build()
        .unwrap();

    let response = service.dispatch(request("/work")).await;
    assert_eq!(response.status, StatusCode::OK);

    let entries = log.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![
            "global:executing",
            "inner:executing",
            "innermost:executing",
            "handler",
            "innermost:executed",
            "inner:executed",
            "global:executed",
        ]
    );
}

#[tokio::test]
async fn test_authorizing_stop_short_circuits_everything() {
    let log: Log = Arc::default();
    let handler_log = Arc::clone(&log);

    let service = RestService::builder(FrameworkConfig::default())
        .route(
            Route::get("/secret")
                .behavior(Gate::denying("first", &log))
                .behavior(Gate::allowing("second", &log, false))
                .behavior(Recorder::new("plain", &log))
                .handle(move |_, _| {
                    let log = Arc::clone(&handler_log);
                    async move {
                        record(&log, "handler");
                        Ok(MethodReturn::None)
                    }
                }),
        )
        .build()
        .unwrap();

    let response = service.dispatch(request("/secret")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let entries = log.lock().unwrap().clone();
    // Only the denying gate ran: no later authorizing hook, no executing
    // hook, no handler.
    assert_eq!(entries, vec!["first:authorizing"]);
}

#[tokio::test]
async fn test_authentication_authorizes_before_other_secure_behaviors() {
    let log: Log = Arc::default();

    let service = RestService::builder(FrameworkConfig::default())
        .route(
            Route::get("/ordered")
                .behavior(Gate::allowing("acl", &log, false))
                .behavior(Gate::allowing("credentials", &log, true))
                .handle(|_, _| async { Ok(MethodReturn::None) }),
        )
        .build()
        .unwrap();

    service.dispatch(request("/ordered")).await;

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["credentials:authorizing", "acl:authorizing"]);
}

#[tokio::test]
async fn test_executing_stop_aborts_before_the_method() {
    let log: Log = Arc::default();
    let handler_log = Arc::clone(&log);

    let service = RestService::builder(FrameworkConfig::default())
        .route(
            Route::get("/abort")
                .behavior(Recorder::new("outer", &log))
                .behavior(Recorder::stopping("stopper", &log))
                .handle(move |_, _| {
                    let log = Arc::clone(&handler_log);
                    async move {
                        record(&log, "handler");
                        Ok(MethodReturn::None)
                    }
                }),
        )
        .build()
        .unwrap();

    let response = service.dispatch(request("/abort")).await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["outer:executing", "stopper:executing"]);
}

/// Converts any failure into a teapot response.
struct Handler418;

#[async_trait]
impl ServiceBehavior for Handler418 {
    async fn on_exception(
        &self,
        _ctx: &mut MethodContext,
        _error: &ServiceError,
    ) -> ExceptionOutcome {
        ExceptionOutcome::Handle(ServiceResult::status(
            StatusCode::IM_A_TEAPOT,
            "handled",
        ))
    }
}

#[tokio::test]
async fn test_first_exception_handler_wins() {
    let log: Log = Arc::default();

    let service = RestService::builder(FrameworkConfig::default())
        .route(
            Route::get("/boom")
                .behavior(Arc::new(Handler418))
                .behavior(Recorder::new("later", &log))
                .handle(|_, _| async { Err::<MethodReturn, _>(ServiceError::internal("kaput")) }),
        )
        .build()
        .unwrap();

    let response = service.dispatch(request("/boom")).await;
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);

    // The later behavior never saw the exception.
    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["later:executing"]);
}

#[tokio::test]
async fn test_direct_response_error_bypasses_exception_hooks() {
    let log: Log = Arc::default();

    let service = RestService::builder(FrameworkConfig::default())
        .route(
            Route::get("/conflict")
                .behavior(Arc::new(Handler418))
                .behavior(Recorder::new("watcher", &log))
                .handle(|_, _| async {
                    Err::<MethodReturn, _>(ServiceError::http(
                        StatusCode::CONFLICT,
                        "version mismatch",
                    ))
                }),
        )
        .build()
        .unwrap();

    let response = service.dispatch(request("/conflict")).await;
    // Propagated verbatim: not reinterpreted by Handler418.
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body_bytes().unwrap().as_ref(), b"version mismatch");

    let entries = log.lock().unwrap().clone();
    assert!(!entries.contains(&"watcher:exception".to_string()));
}

#[tokio::test]
async fn test_unhandled_failure_is_an_opaque_500() {
    let service = RestService::builder(FrameworkConfig::default())
        .route(Route::get("/die").handle(|_, _| async {
            Err::<MethodReturn, _>(ServiceError::internal("connection pool exhausted"))
        }))
        .build()
        .unwrap();

    let response = service.dispatch(request("/die")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    // Internal details never reach the client.
    let body = String::from_utf8(response.body_bytes().unwrap().to_vec()).unwrap();
    assert!(!body.contains("connection pool"));
}

/// Challenges with 401 then stops with its configured 403; the pipeline must
/// keep the 401.
struct ChallengingGate;

#[async_trait]
impl ServiceBehavior for ChallengingGate {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for ChallengingGate {
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult {
        ctx.response.set_status(StatusCode::UNAUTHORIZED);
        ctx.response
            .set_header("www-authenticate", "Custom realm=\"x\", stale=true");
        BehaviorResult::forbidden("should not surface")
    }
}

#[tokio::test]
async fn test_unauthorized_status_survives_the_stop_status() {
    let service = RestService::builder(FrameworkConfig::default())
        .route(
            Route::get("/challenge")
                .behavior(Arc::new(ChallengingGate))
                .handle(|_, _| async { Ok(MethodReturn::None) }),
        )
        .build()
        .unwrap();

    let response = service.dispatch(request("/challenge")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers.get("www-authenticate").unwrap(),
        "Custom realm=\"x\", stale=true"
    );
}

#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    let service = RestService::builder(FrameworkConfig::default())
        .route(Route::post("/things").handle(|_, _| async { Ok(MethodReturn::None) }))
        .build()
        .unwrap();

    let missing = service.dispatch(request("/nothing")).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let wrong_method = service.dispatch(request("/things")).await;
    assert_eq!(wrong_method.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(wrong_method.headers.get("allow").unwrap(), "POST");
}
