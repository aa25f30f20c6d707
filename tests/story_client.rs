//! Integration tests for the HTTP generation service client
//!
//! A small axum server stands in for the generation service so requests,
//! error bodies and transport failures go over a real socket.

mod common;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{FakeAudio, FakeBackend};
use map_memoir::playback::{PlayOutcome, PlaybackController};
use map_memoir::{BackendConfig, HttpStoryService, MemoirError, Place, StoryService, Theme};
use serde_json::{json, Value};

async fn generate_script(Json(body): Json<Value>) -> Response {
    let name = body["place"]["name"].as_str().unwrap_or_default();
    let theme = body["theme"].as_str().unwrap_or("documentary");
    match name {
        "Nowhere" => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing place or theme" })),
        )
            .into_response(),
        "Teapot" => (StatusCode::IM_A_TEAPOT, "short and stout").into_response(),
        "Blank" => Json(json!({ "script": "   " })).into_response(),
        _ => Json(json!({ "script": format!("  A {} story of {}.\n", theme, name) })).into_response(),
    }
}

async fn generate_audio(Json(body): Json<Value>) -> Response {
    if body["script"] == "over quota" {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "Narration quota exceeded" })),
        )
            .into_response();
    }
    (
        [(header::CONTENT_TYPE, "audio/wav")],
        b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec(),
    )
        .into_response()
}

/// Start the stub service and return its base URL
async fn spawn_service() -> String {
    let app = Router::new()
        .route("/generate_script", post(generate_script))
        .route("/generate_audio", post(generate_audio))
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn client() -> HttpStoryService {
    let config = BackendConfig {
        base_url: spawn_service().await,
        ..BackendConfig::default()
    };
    HttpStoryService::new(&config).unwrap()
}

#[tokio::test]
async fn test_generate_script_trims_result() {
    let service = client().await;
    let place = Place::new("Eiffel Tower", "Champ de Mars, Paris").with_coordinates(48.8584, 2.2945);
    let script = service
        .generate_script(&place, Theme::FairyTale)
        .await
        .unwrap();
    assert_eq!(script, "A fairy tale story of Eiffel Tower.");
}

#[tokio::test]
async fn test_error_field_becomes_message() {
    let service = client().await;
    let err = service
        .generate_script(&Place::new("Nowhere", ""), Theme::Mystery)
        .await
        .unwrap_err();
    match err {
        MemoirError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Missing place or theme");
        }
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_error_body_is_generic() {
    let service = client().await;
    let err = service
        .generate_script(&Place::new("Teapot", ""), Theme::Documentary)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "HTTP error: 418");
}

#[tokio::test]
async fn test_blank_script_is_an_error() {
    let service = client().await;
    let err = service
        .generate_script(&Place::new("Blank", ""), Theme::Documentary)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoirError::Api { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_generate_audio_returns_payload() {
    let service = client().await;
    let bytes = service
        .generate_audio("Once upon a time.", Theme::FairyTale)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"RIFF"));

    let err = service
        .generate_audio("over quota", Theme::FairyTale)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Narration quota exceeded");
}

#[tokio::test]
async fn test_validation_happens_before_network() {
    // Nothing listens here; validation must fail first.
    let service = HttpStoryService::with_client(reqwest::Client::new(), "http://127.0.0.1:9").unwrap();
    assert!(matches!(
        service.generate_script(&Place::new("  ", "x"), Theme::Mystery).await,
        Err(MemoirError::InvalidRequest(_))
    ));
    assert!(matches!(
        service.generate_audio("", Theme::Mystery).await,
        Err(MemoirError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_health_and_unreachable_service() {
    let service = client().await;
    service.health().await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = BackendConfig {
        base_url: format!("http://{}", addr),
        ..BackendConfig::default()
    };
    let offline = HttpStoryService::new(&config).unwrap();
    assert!(matches!(
        offline.health().await,
        Err(MemoirError::Network(_))
    ));
}

#[tokio::test]
async fn test_controller_plays_service_audio() {
    let service = client().await;
    let audio = FakeAudio::new();
    let controller = PlaybackController::new(service, FakeBackend::new(&audio));

    assert_eq!(
        controller.play("Once upon a time.", Theme::FairyTale).await,
        PlayOutcome::Started
    );
    assert_eq!(audio.output_count(), 1);
    controller.stop();
    assert!(audio.output(0).is_halted());
}
