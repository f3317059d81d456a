//! End-to-end dispatch scenarios: the JSON task-handler contract, HEAD-from-GET fallback, and a
//! terminal task middleware halting the main handler before it runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hyper::{Body, Method, Request, Response, StatusCode};
use waypoint::error::RouterError;
use waypoint::router::{HttpMiddleware, ResponseProxy, Router, RouterConfig, TaskMiddleware};

async fn body_string(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn dynamic_param_reaches_a_json_task_handler() {
    let router = Router::new(RouterConfig::default());
    router.register_task_handler(
        Method::GET,
        "/greet/:name",
        Arc::new(|req| {
            let name = req.param("name").unwrap().to_string();
            Box::pin(async move { Ok(serde_json::json!({ "greeting": format!("hello, {}", name) })) })
        }),
        Vec::new(),
        Vec::new(),
        false,
    );

    let req = Request::get("/greet/ada").body(Body::empty()).unwrap();
    let response = router.serve(req).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(hyper::header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body = body_string(response).await;
    assert_eq!(body, r#"{"greeting":"hello, ada"}"#);
}

#[tokio::test]
async fn head_request_reuses_the_get_route_with_an_empty_body() {
    let router = Router::new(RouterConfig::default());
    router.register_handler(
        Method::GET,
        "/status",
        Arc::new(|_req| {
            Box::pin(async {
                Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap()
            })
        }),
        Vec::new(),
        Vec::new(),
    );

    let head_req = Request::builder()
        .method(Method::HEAD)
        .uri("/status")
        .body(Body::empty())
        .unwrap();
    let response = router.serve(head_req).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "");
}

#[tokio::test]
async fn terminal_task_middleware_halts_before_the_handler_runs() {
    let router = Router::new(RouterConfig::default());

    let handler_was_called = Arc::new(AtomicBool::new(false));
    let flag = handler_was_called.clone();
    router.register_handler(
        Method::GET,
        "/secret",
        Arc::new(move |_req| {
            let flag = flag.clone();
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap()
            })
        }),
        Vec::new(),
        Vec::new(),
    );

    router.use_global_task_middleware(TaskMiddleware::new(|_req| {
        Box::pin(async {
            let mut proxy = ResponseProxy::new();
            proxy.set_status(StatusCode::UNAUTHORIZED);
            Ok::<_, RouterError>(proxy)
        })
    }));

    let req = Request::get("/secret").body(Body::empty()).unwrap();
    let response = router.serve(req).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!handler_was_called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn http_middleware_wraps_the_handler() {
    let router = Router::new(RouterConfig::default());
    router.register_handler(
        Method::GET,
        "/ping",
        Arc::new(|_req| Box::pin(async { Response::new(Body::from("pong")) })),
        Vec::new(),
        Vec::new(),
    );
    router.use_global_http_middleware(HttpMiddleware::new(|req, next| {
        Box::pin(async move {
            let mut response = next(req).await;
            response
                .headers_mut()
                .insert("x-wrapped", hyper::header::HeaderValue::from_static("yes"));
            response
        })
    }));

    let req = Request::get("/ping").body(Body::empty()).unwrap();
    let response = router.serve(req).await;
    assert_eq!(response.headers().get("x-wrapped").unwrap(), "yes");
    assert_eq!(body_string(response).await, "pong");
}
