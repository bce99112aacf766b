//! Integration tests for the client facade: configuration layering, plugins,
//! hooks and cancellation.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use cloudsea_core::adapter::ABORTED_MESSAGE;
use cloudsea_core::config::{REQUEST_ID_HEADER, REQUEST_TIME_HEADER};
use cloudsea_core::{
    Client, ClientOptions, Config, ConfigOverrides, Defaults, ErrorKind, Method, Reply,
    RequestError, RequestOptions,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::NamedTempFile;

mod support;
use support::scripted::{ScriptedAdapter, Step};

fn client_with(adapter: &Arc<ScriptedAdapter>) -> Client {
    Client::new(ClientOptions::new().ext(ConfigOverrides::with_adapter(Arc::clone(adapter) as _)))
}

/// Polls until the client tracks `name` as in flight.
async fn wait_in_flight(client: &Client, name: &str) {
    for _ in 0..100 {
        if client.in_flight().iter().any(|n| n == name) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("request {name} never became in flight");
}

// ==================== Request Flow ====================

#[tokio::test]
async fn test_request_resolves_to_context() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0, "total": 3})));
    let client = client_with(&adapter);

    let reply = client.get(RequestOptions::new("https://api.x/items")).await.unwrap();

    let ctx = reply.context().unwrap();
    assert_eq!(ctx.request.method, Method::Get);
    assert_eq!(ctx.response_data().unwrap()["total"], json!(3));
    assert!(ctx.task.elapsed.is_some());
}

#[tokio::test]
async fn test_convenience_verbs_set_method() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0})));
    let client = client_with(&adapter);

    client.post(RequestOptions::new("https://api.x/a")).await.unwrap();
    client
        .method(Method::Delete, RequestOptions::new("https://api.x/b"))
        .await
        .unwrap();
    client
        .request(RequestOptions::new("https://api.x/c"))
        .await
        .unwrap();

    let methods: Vec<Method> = adapter.requests().iter().map(|r| r.method).collect();
    assert_eq!(methods, [Method::Post, Method::Delete, Method::Get]);
}

#[tokio::test]
async fn test_reply_json_deserializes_payload() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: u64,
        state: String,
    }

    let adapter =
        ScriptedAdapter::always(Step::ok(json!({"retcode": 0, "id": 12, "state": "paid"})));
    let client = client_with(&adapter);

    let order: Order = client
        .get(RequestOptions::new("https://api.x/orders/12"))
        .await
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(
        order,
        Order {
            id: 12,
            state: "paid".into()
        }
    );
}

// ==================== Configuration Layering ====================

#[tokio::test]
async fn test_call_config_overrides_instance_and_defaults() {
    let adapter = ScriptedAdapter::always(Step::reject("offline"));
    let defaults = Defaults::new(Config {
        repeat_num: 4,
        base_url: "https://default.x".into(),
        ..Config::default()
    });
    let client = Client::with_defaults(
        defaults,
        ClientOptions::new().ext(ConfigOverrides {
            repeat_num: Some(3),
            adapter: Some(Arc::clone(&adapter) as _),
            ..ConfigOverrides::default()
        }),
    );

    let options = RequestOptions::new("/ping").ext(ConfigOverrides {
        repeat_num: Some(1),
        ..ConfigOverrides::default()
    });
    let err = client.get(options).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Fail);
    assert_eq!(adapter.calls(), 2);
    assert_eq!(adapter.requests()[0].url, "https://default.x/ping");
}

#[tokio::test]
async fn test_set_config_is_seen_by_clients_sharing_defaults() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0})));
    let defaults = Defaults::default();
    let first = Client::with_defaults(
        defaults.clone(),
        ClientOptions::new().ext(ConfigOverrides::with_adapter(Arc::clone(&adapter) as _)),
    );
    let second = Client::with_defaults(
        defaults,
        ClientOptions::new().ext(ConfigOverrides::with_adapter(Arc::clone(&adapter) as _)),
    );

    first.set_config(&ConfigOverrides {
        base_url: Some("https://shared.x".into()),
        x_request_id: Some(false),
        ..ConfigOverrides::default()
    });
    second.get(RequestOptions::new("/v1")).await.unwrap();

    let sent = &adapter.requests()[0];
    assert_eq!(sent.url, "https://shared.x/v1");
    assert!(!sent.header.contains_key(REQUEST_ID_HEADER));
    assert!(sent.header.contains_key(REQUEST_TIME_HEADER));
}

#[tokio::test]
async fn test_config_file_layer() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"code": 5, "msg": "limited"})));
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"baseUrl": "https://file.x", "retcodeKey": "code", "logicErrorMsgKey": "msg"}}"#
    )
    .unwrap();

    let layer = ConfigOverrides::from_json_file(file.path()).unwrap();
    let client = Client::new(ClientOptions::new().ext(ConfigOverrides {
        adapter: Some(Arc::clone(&adapter) as _),
        ..layer
    }));

    let err = client.get(RequestOptions::new("/quota")).await.unwrap_err();
    assert_eq!(err, RequestError::logic("limited", Some(json!(5))));
    assert_eq!(adapter.requests()[0].url, "https://file.x/quota");
}

#[tokio::test]
async fn test_missing_adapter_fails_without_retry() {
    let client = Client::with_defaults(
        Defaults::new(Config {
            adapter: None,
            ..Config::default()
        }),
        ClientOptions::new(),
    );

    let err = client
        .get(RequestOptions::new("https://api.x"))
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::MissingAdapter);
    assert_eq!(err.kind(), ErrorKind::Fail);
}

// ==================== Headers ====================

#[tokio::test]
async fn test_headers_layer_generated_instance_call() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0})));
    let client = Client::new(
        ClientOptions::new()
            .header("X-App", "shop")
            .header("X-Env", "prod")
            .ext(ConfigOverrides::with_adapter(Arc::clone(&adapter) as _)),
    );

    client
        .get(
            RequestOptions::new("https://api.x")
                .header("X-Env", "staging")
                .header(REQUEST_ID_HEADER, "trace-1"),
        )
        .await
        .unwrap();

    let header = &adapter.requests()[0].header;
    assert_eq!(header["X-App"], "shop");
    assert_eq!(header["X-Env"], "staging");
    assert_eq!(header[REQUEST_ID_HEADER], "trace-1");
    assert!(header[REQUEST_TIME_HEADER].parse::<u64>().is_ok());
}

#[tokio::test]
async fn test_request_id_differs_per_request() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0})));
    let client = client_with(&adapter);

    client.get(RequestOptions::new("https://api.x")).await.unwrap();
    client.get(RequestOptions::new("https://api.x")).await.unwrap();

    let requests = adapter.requests();
    assert_ne!(
        requests[0].header[REQUEST_ID_HEADER],
        requests[1].header[REQUEST_ID_HEADER]
    );
}

// ==================== Plugins ====================

#[tokio::test]
async fn test_request_plugins_run_in_order_before_dispatch() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0})));
    let mut client = client_with(&adapter);
    client
        .use_request_plugin(|mut ctx| {
            ctx.request.header.insert("X-Sig".into(), "a".into());
            ctx
        })
        .use_request_plugin(|mut ctx| {
            let sig = format!("{}b", ctx.request.header["X-Sig"]);
            ctx.request.header.insert("X-Sig".into(), sig);
            ctx
        });

    client.get(RequestOptions::new("https://api.x")).await.unwrap();
    assert_eq!(adapter.requests()[0].header["X-Sig"], "ab");
}

#[tokio::test]
async fn test_named_request_is_tracked_before_request_plugins_run() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0})));
    let handle: Arc<OnceLock<Weak<Client>>> = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut client = client_with(&adapter);
    client.use_request_plugin({
        let handle = Arc::clone(&handle);
        let seen = Arc::clone(&seen);
        move |ctx| {
            if let Some(client) = handle.get().and_then(Weak::upgrade) {
                seen.lock().unwrap().extend(client.in_flight());
            }
            ctx
        }
    });
    let client = Arc::new(client);
    handle.set(Arc::downgrade(&client)).unwrap();

    client
        .get(RequestOptions::new("https://api.x").name("early"))
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), ["early"]);
    assert!(client.in_flight().is_empty());
}

#[tokio::test]
async fn test_response_plugins_only_run_on_success() {
    let adapter = ScriptedAdapter::new([
        Step::ok(json!({"retcode": 0, "n": 1})),
        Step::ok(json!({"retcode": 8})),
    ]);
    let runs = Arc::new(AtomicUsize::new(0));
    let mut client = client_with(&adapter);
    let counter = Arc::clone(&runs);
    client.use_response_plugin(move |mut ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = ctx.response.as_mut() {
            response.data["decorated"] = json!(true);
        }
        ctx
    });

    let reply = client.get(RequestOptions::new("https://api.x")).await.unwrap();
    assert_eq!(reply.into_value()["decorated"], json!(true));

    assert!(client.get(RequestOptions::new("https://api.x")).await.is_err());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

// ==================== Hooks ====================

#[tokio::test]
async fn test_success_hook_replaces_reply() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0, "result": [1, 2]})));
    let mut client = client_with(&adapter);
    client.on_success(|ctx| ctx.response_data().map(|data| data["result"].clone()));

    let reply = client.get(RequestOptions::new("https://api.x")).await.unwrap();
    assert!(matches!(reply, Reply::Value(_)));
    assert_eq!(reply.into_value(), json!([1, 2]));
}

#[tokio::test]
async fn test_success_hook_returning_none_keeps_context() {
    let adapter = ScriptedAdapter::always(Step::ok(json!({"retcode": 0})));
    let mut client = client_with(&adapter);
    client.on_success(|_| None);

    let reply = client.get(RequestOptions::new("https://api.x")).await.unwrap();
    assert!(reply.context().is_some());
}

#[tokio::test]
async fn test_failure_hook_replaces_error() {
    let adapter = ScriptedAdapter::always(Step::Resolve(500, Value::Null));
    let mut client = client_with(&adapter);
    client.on_failure(|error, ctx| {
        (error.kind() == ErrorKind::Server)
            .then(|| RequestError::transport(format!("upstream down after {}", ctx.task.attempts)))
    });

    let err = client
        .get(RequestOptions::new("https://api.x"))
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::transport("upstream down after 3"));
}

#[tokio::test]
async fn test_complete_hook_sees_every_settlement() {
    let adapter = ScriptedAdapter::new([
        Step::ok(json!({"retcode": 0})),
        Step::ok(json!({"retcode": 4, "retmsg": "nope"})),
    ]);
    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let mut client = client_with(&adapter);
    let log = Arc::clone(&seen);
    client.on_complete(move |ctx, error| {
        assert!(ctx.task.url_without_query.is_some());
        log.lock().unwrap().push(error.map(ToString::to_string));
    });

    client.get(RequestOptions::new("https://api.x")).await.unwrap();
    client
        .get(RequestOptions::new("https://api.x"))
        .await
        .unwrap_err();

    assert_eq!(*seen.lock().unwrap(), [None, Some("nope".to_string())]);
}

// ==================== Cancellation ====================

#[tokio::test]
async fn test_abort_named_request_aborts_handle_once() {
    let adapter = ScriptedAdapter::always(Step::Hang);
    let client = Arc::new(client_with(&adapter));

    let pending = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            let options = RequestOptions::new("https://api.x/long-poll")
                .name("poll")
                .ext(ConfigOverrides {
                    repeat_num: Some(0),
                    ..ConfigOverrides::default()
                });
            client.get(options).await
        }
    });

    wait_in_flight(&client, "poll").await;
    assert_eq!(client.abort(Some("poll")), 1);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, RequestError::transport(ABORTED_MESSAGE));
    assert_eq!(adapter.aborts(), 1);
    assert!(client.in_flight().is_empty());
}

#[tokio::test]
async fn test_abort_unknown_name_is_noop() {
    let adapter = ScriptedAdapter::new([
        Step::Delayed(Duration::from_millis(20), 200, json!({"retcode": 0})),
    ]);
    let client = Arc::new(client_with(&adapter));

    let pending = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            client
                .get(RequestOptions::new("https://api.x").name("real"))
                .await
        }
    });

    wait_in_flight(&client, "real").await;
    assert_eq!(client.abort(Some("ghost")), 0);

    pending.await.unwrap().unwrap();
    assert_eq!(adapter.aborts(), 0);
}

#[tokio::test]
async fn test_abort_does_not_stop_retries() {
    let adapter = ScriptedAdapter::new([Step::Hang, Step::ok(json!({"retcode": 0}))]);
    let client = Arc::new(client_with(&adapter));

    let pending = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            client
                .get(RequestOptions::new("https://api.x").name("job"))
                .await
        }
    });

    wait_in_flight(&client, "job").await;
    client.abort(Some("job"));

    pending.await.unwrap().unwrap();
    assert_eq!(adapter.calls(), 2);
}

#[tokio::test]
async fn test_abort_all_reaches_every_named_request() {
    let adapter = ScriptedAdapter::always(Step::Hang);
    let client = Arc::new(client_with(&adapter));
    let no_retry = ConfigOverrides {
        repeat_num: Some(0),
        ..ConfigOverrides::default()
    };

    let mut pending = Vec::new();
    for name in ["a", "b"] {
        let client = Arc::clone(&client);
        let options = RequestOptions::new("https://api.x")
            .name(name)
            .ext(no_retry.clone());
        pending.push(tokio::spawn(async move { client.get(options).await }));
    }
    wait_in_flight(&client, "a").await;
    wait_in_flight(&client, "b").await;

    assert_eq!(client.abort(None), 2);
    for handle in pending {
        assert!(handle.await.unwrap().is_err());
    }
    assert_eq!(adapter.aborts(), 2);
}
