//! Client tests against local fake endpoints.
//!
//! Every client is pointed at a loopback server through the endpoint
//! override, so the full request path (signing included) is exercised
//! without talking to the real services.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::to_bytes;
use axum::extract::Request;
use axum::http::StatusCode;
use url::Url;

use awsio::apigateway::ApiGatewayManagementClient;
use awsio::credentials::{SigningCredentials, StaticCredentials};
use awsio::dynamodb::{AttributeValue, DynamoDbClient, Item};
use awsio::error::ServiceError;
use awsio::http::{HttpHandle, install_rustls_provider};
use awsio::kinesis_video::{ApiName, KinesisVideoClient};
use awsio::s3::S3Client;
use awsio::sts::StsClient;

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn body_utf8(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

async fn capture(req: Request) -> Captured {
    let (parts, body) = req.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap().to_vec();
    let headers = parts
        .headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();
    Captured {
        path: parts.uri.path().to_string(),
        headers,
        body,
    }
}

async fn spawn_fake(app: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

fn test_credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new(SigningCredentials {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        session_token: None,
    }))
}

fn handle_for(base: &Url) -> HttpHandle {
    install_rustls_provider();
    HttpHandle::new(reqwest::Client::new(), "us-east-1").with_endpoint_override(base.clone())
}

#[tokio::test]
async fn assume_role_posts_signed_form_and_decodes_json() {
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback({
        let seen = seen.clone();
        move |req: Request| {
            let seen = seen.clone();
            async move {
                let captured = capture(req).await;
                seen.lock().unwrap().push(captured);
                axum::Json(serde_json::json!({
                    "AssumeRoleResponse": {
                        "AssumeRoleResult": {
                            "Credentials": {
                                "AccessKeyId": "ASIASESSION",
                                "SecretAccessKey": "session-secret",
                                "SessionToken": "session-token",
                                "Expiration": 1735689600.0
                            }
                        }
                    }
                }))
            }
        }
    });
    let base = spawn_fake(app).await;

    let client = StsClient::new(handle_for(&base), test_credentials());
    let creds = client
        .assume_role("arn:aws:iam::123456789012:role/upload", "media-upload")
        .await
        .unwrap();

    assert_eq!(creds.access_key_id, "ASIASESSION");
    assert_eq!(creds.session_token.as_deref(), Some("session-token"));

    let seen = seen.lock().unwrap();
    let request = &seen[0];
    assert_eq!(request.header("accept"), Some("application/json"));
    let body = request.body_utf8();
    assert!(body.contains("Action=AssumeRole"));
    assert!(body.contains("RoleSessionName=media-upload"));
    assert!(body.contains("RoleArn=arn%3Aaws%3Aiam%3A%3A123456789012%3Arole%2Fupload"));
    let auth = request.header("authorization").unwrap();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(auth.contains("/us-east-1/sts/aws4_request"));
    assert!(request.header("x-amz-date").is_some());
}

#[tokio::test]
async fn stream_lifecycle_round_trips_the_control_plane() {
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback({
        let seen = seen.clone();
        move |req: Request| {
            let seen = seen.clone();
            async move {
                let captured = capture(req).await;
                let path = captured.path.clone();
                seen.lock().unwrap().push(captured);
                match path.as_str() {
                    "/createStream" => axum::Json(serde_json::json!({
                        "StreamARN": "arn:aws:kinesisvideo:us-east-1:1:stream/s-1"
                    })),
                    "/getDataEndpoint" => axum::Json(serde_json::json!({
                        "DataEndpoint": "https://s-1.kinesisvideo.us-east-1.amazonaws.com"
                    })),
                    _ => axum::Json(serde_json::json!({})),
                }
            }
        }
    });
    let base = spawn_fake(app).await;

    let client = KinesisVideoClient::new(handle_for(&base), test_credentials());
    let arn = client.create_stream("CallstreamProducer-abc", 1).await.unwrap();
    assert_eq!(arn, "arn:aws:kinesisvideo:us-east-1:1:stream/s-1");

    let endpoint = client.data_endpoint(&arn, ApiName::PutMedia).await.unwrap();
    assert_eq!(
        endpoint.as_str(),
        "https://s-1.kinesisvideo.us-east-1.amazonaws.com/"
    );

    client.delete_stream(&arn).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    let create: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
    assert_eq!(create["StreamName"], "CallstreamProducer-abc");
    assert_eq!(create["DataRetentionInHours"], 1);
    let endpoint_req: serde_json::Value = serde_json::from_slice(&seen[1].body).unwrap();
    assert_eq!(endpoint_req["APIName"], "PUT_MEDIA");
    let delete: serde_json::Value = serde_json::from_slice(&seen[2].body).unwrap();
    assert_eq!(delete["StreamARN"], arn);
}

#[tokio::test]
async fn service_error_body_maps_to_api_error() {
    let app = Router::new().fallback(|| async {
        (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({
                "__type": "com.amazonaws.kinesisvideo#ResourceInUseException",
                "message": "Stream already exists"
            })),
        )
    });
    let base = spawn_fake(app).await;

    let client = KinesisVideoClient::new(handle_for(&base), test_credentials());
    let err = client.create_stream("dup", 1).await.unwrap_err();
    match err {
        ServiceError::Api {
            status,
            operation,
            code,
            message,
        } => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(operation, "CreateStream");
            assert_eq!(code, "ResourceInUseException");
            assert_eq!(message, "Stream already exists");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn scan_follows_pagination() {
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback({
        let seen = seen.clone();
        move |req: Request| {
            let seen = seen.clone();
            async move {
                let captured = capture(req).await;
                seen.lock().unwrap().push(captured);
                let page = seen.lock().unwrap().len();
                if page == 1 {
                    axum::Json(serde_json::json!({
                        "Items": [
                            {"connectionId": {"S": "c-1"}},
                            {"connectionId": {"S": "c-2"}}
                        ],
                        "LastEvaluatedKey": {"connectionId": {"S": "c-2"}}
                    }))
                } else {
                    axum::Json(serde_json::json!({
                        "Items": [{"connectionId": {"S": "c-3"}}]
                    }))
                }
            }
        }
    });
    let base = spawn_fake(app).await;

    let client = DynamoDbClient::new(handle_for(&base), test_credentials());
    let items = client.scan_all("connections").await.unwrap();
    let ids: Vec<_> = items
        .iter()
        .filter_map(|item| item.get("connectionId").and_then(AttributeValue::as_s))
        .collect();
    assert_eq!(ids, vec!["c-1", "c-2", "c-3"]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0].header("x-amz-target"),
        Some("DynamoDB_20120810.Scan")
    );
    let second: serde_json::Value = serde_json::from_slice(&seen[1].body).unwrap();
    assert_eq!(second["ExclusiveStartKey"]["connectionId"]["S"], "c-2");
}

#[tokio::test]
async fn put_item_sends_attribute_values() {
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback({
        let seen = seen.clone();
        move |req: Request| {
            let seen = seen.clone();
            async move {
                let captured = capture(req).await;
                seen.lock().unwrap().push(captured);
                axum::Json(serde_json::json!({}))
            }
        }
    });
    let base = spawn_fake(app).await;

    let client = DynamoDbClient::new(handle_for(&base), test_credentials());
    let item: Item = HashMap::from([
        (
            "connectionId".to_string(),
            AttributeValue::S("c-9".to_string()),
        ),
        (
            "expireAt".to_string(),
            AttributeValue::N("1735689600".to_string()),
        ),
    ]);
    client.put_item("connections", &item).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0].header("x-amz-target"),
        Some("DynamoDB_20120810.PutItem")
    );
    assert_eq!(
        seen[0].header("content-type"),
        Some("application/x-amz-json-1.0")
    );
    let body: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
    assert_eq!(body["TableName"], "connections");
    assert_eq!(body["Item"]["connectionId"]["S"], "c-9");
    assert_eq!(body["Item"]["expireAt"]["N"], "1735689600");
}

#[tokio::test]
async fn ranged_get_returns_body_and_content_range() {
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback({
        let seen = seen.clone();
        move |req: Request| {
            let seen = seen.clone();
            async move {
                let captured = capture(req).await;
                seen.lock().unwrap().push(captured);
                (
                    StatusCode::PARTIAL_CONTENT,
                    [("content-range", "bytes 0-4/2621440")],
                    "hello",
                )
            }
        }
    });
    let base = spawn_fake(app).await;

    let client = S3Client::new(handle_for(&base), test_credentials());
    let chunk = client
        .get_object_range("recordings", "calls/one.wav", 0, 1_048_575)
        .await
        .unwrap();
    assert_eq!(&chunk.body[..], b"hello");
    assert_eq!(chunk.content_range, "bytes 0-4/2621440");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].path, "/recordings/calls/one.wav");
    assert_eq!(seen[0].header("range"), Some("bytes=0-1048575"));
    assert_eq!(
        seen[0].header("x-amz-content-sha256"),
        Some(sigv4::EMPTY_PAYLOAD_HASH)
    );
}

#[tokio::test]
async fn ranged_get_without_content_range_is_an_error() {
    let app = Router::new().fallback(|| async { (StatusCode::OK, "hello") });
    let base = spawn_fake(app).await;

    let client = S3Client::new(handle_for(&base), test_credentials());
    let err = client
        .get_object_range("recordings", "calls/one.wav", 0, 100)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::MissingField {
            operation: "GetObject",
            field: "Content-Range",
        }
    ));
}

#[tokio::test]
async fn push_delivery_maps_gone_to_prune_signal() {
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback({
        let seen = seen.clone();
        move |req: Request| {
            let seen = seen.clone();
            async move {
                let captured = capture(req).await;
                let gone = captured.path.ends_with("gone-conn");
                seen.lock().unwrap().push(captured);
                if gone {
                    StatusCode::GONE
                } else {
                    StatusCode::OK
                }
            }
        }
    });
    let base = spawn_fake(app).await;

    let endpoint = base.join("prod").unwrap();
    install_rustls_provider();
    let client = ApiGatewayManagementClient::new(
        HttpHandle::new(reqwest::Client::new(), "us-east-1"),
        test_credentials(),
        endpoint,
    );

    client
        .post_to_connection("live-conn", b"payload")
        .await
        .unwrap();

    let err = client
        .post_to_connection("gone-conn", b"payload")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::ConnectionGone { connection_id } if connection_id == "gone-conn"
    ));

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].path, "/prod/@connections/live-conn");
    assert_eq!(seen[0].body, b"payload");
    let auth = seen[0].header("authorization").unwrap();
    assert!(auth.contains("/us-east-1/execute-api/aws4_request"));
}

#[tokio::test]
async fn connection_ids_are_percent_encoded_in_the_push_path() {
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback({
        let seen = seen.clone();
        move |req: Request| {
            let seen = seen.clone();
            async move {
                let captured = capture(req).await;
                seen.lock().unwrap().push(captured);
                StatusCode::OK
            }
        }
    });
    let base = spawn_fake(app).await;

    install_rustls_provider();
    let client = ApiGatewayManagementClient::new(
        HttpHandle::new(reqwest::Client::new(), "us-east-1"),
        test_credentials(),
        base.clone(),
    );
    client
        .post_to_connection("PHVtc=", b"payload")
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].path, "/@connections/PHVtc%3D");
}
