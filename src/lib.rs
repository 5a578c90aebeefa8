use std::{sync::Arc, time::Duration};

pub mod config;
pub mod domain;
pub mod errors;
pub mod generation;
pub mod http;
pub mod logging;
pub mod mcp;

#[cfg(test)]
mod test_support;

use domain::places::PlaceProvider;
use generation::TextGenerator;

pub use http::listener::{McpServer, RunningServer, ServerSettings};

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn TextGenerator>,
    pub place_provider: Arc<dyn PlaceProvider>,
    /// Hard budget for each streaming generation call.
    pub generation_timeout: Duration,
}

impl AppState {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        place_provider: Arc<dyn PlaceProvider>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            place_provider,
            generation_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, time::Instant};

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };

    use crate::{
        domain::places::SamplePlaceProvider,
        generation::{
            client::{OllamaClient, OllamaSettings},
            StreamOutcome,
        },
        test_support::{spawn_ndjson_backend, ScriptedGenerator},
    };

    use super::*;

    const PLANNER_CALL: &str =
        r#"{"method":"tools/call","params":{"name":"travel_planner","arguments":{"destination":"Seoul","duration":1}},"id":"r1"}"#;

    fn ollama_state(base_url: String, generation_timeout: Duration) -> AppState {
        let client = OllamaClient::new(OllamaSettings {
            base_url,
            model: "test-model".to_string(),
            read_timeout: Duration::from_secs(5),
            ..OllamaSettings::default()
        })
        .expect("client builds");
        AppState::new(
            Arc::new(client),
            Arc::new(SamplePlaceProvider),
            generation_timeout,
        )
    }

    fn scripted_state(generator: Arc<ScriptedGenerator>) -> AppState {
        AppState::new(
            generator,
            Arc::new(SamplePlaceProvider),
            Duration::from_secs(5),
        )
    }

    async fn start(state: AppState, settings: ServerSettings) -> RunningServer {
        McpServer::new(
            state,
            ServerSettings {
                bind: SocketAddr::from(([127, 0, 0, 1], 0)),
                ..settings
            },
        )
        .start()
        .await
        .expect("server starts")
    }

    fn post(body: &str) -> Vec<u8> {
        format!(
            "POST /mcp HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    async fn exchange(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(request).await.expect("write request");
        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .expect("read response");
        String::from_utf8(response).expect("utf8 response")
    }

    fn split(response: &str) -> (&str, &str) {
        response
            .split_once("\r\n\r\n")
            .expect("header section terminator")
    }

    #[tokio::test]
    async fn travel_planner_round_trip_over_tcp() {
        let backend = spawn_ndjson_backend(
            vec!["{\"response\":\"{\\\"ok\\\":true}\",\"done\":true}\n"],
            false,
        )
        .await;
        let server = start(
            ollama_state(backend.base_url.clone(), Duration::from_secs(5)),
            ServerSettings::default(),
        )
        .await;

        let response = exchange(server.local_addr(), &post(PLANNER_CALL)).await;

        let (head, body) = split(&response);
        assert_eq!(
            body,
            r#"{"id":"r1","result":{"content":[{"type":"text","text":"{\"ok\":true}"}],"isError":false}}"#
        );
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: application/json; charset=UTF-8"));
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
        assert!(head.contains("Connection: close"));

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["stream"], true);
        assert!(requests[0]["prompt"]
            .as_str()
            .expect("prompt")
            .contains("1-day travel plan for Seoul"));

        server.stop().await;
    }

    #[tokio::test]
    async fn unknown_tool_is_an_rpc_error() {
        let generator = Arc::new(ScriptedGenerator::default());
        let server = start(scripted_state(Arc::clone(&generator)), ServerSettings::default()).await;

        let response = exchange(
            server.local_addr(),
            &post(r#"{"method":"tools/call","params":{"name":"weather","arguments":{}},"id":"u1"}"#),
        )
        .await;

        let (head, body) = split(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(
            body,
            r#"{"id":"u1","error":{"code":-1,"message":"Unknown tool: weather"}}"#
        );
        assert!(generator.prompts().is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn undecodable_body_answers_with_unknown_id() {
        let server = start(
            scripted_state(Arc::new(ScriptedGenerator::default())),
            ServerSettings::default(),
        )
        .await;

        let response = exchange(server.local_addr(), &post("not json")).await;

        let (_, body) = split(&response);
        assert!(body.starts_with(
            r#"{"id":"unknown","error":{"code":-1,"message":"Request processing error: "#
        ));

        server.stop().await;
    }

    #[tokio::test]
    async fn oversized_declared_body_is_rejected_before_reading() {
        let generator = Arc::new(ScriptedGenerator::default());
        let server = start(scripted_state(Arc::clone(&generator)), ServerSettings::default()).await;

        let response = exchange(
            server.local_addr(),
            b"POST /mcp HTTP/1.1\r\nHost: localhost\r\nContent-Length: 50000\r\n\r\n",
        )
        .await;

        let (head, body) = split(&response);
        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(head.contains("Content-Length: 17"));
        assert!(head.contains("Connection: close"));
        assert_eq!(body, "Request too large");
        assert!(generator.prompts().is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn other_methods_and_paths_are_bad_requests() {
        let server = start(
            scripted_state(Arc::new(ScriptedGenerator::default())),
            ServerSettings::default(),
        )
        .await;

        for request in [
            &b"GET /mcp HTTP/1.1\r\nHost: localhost\r\n\r\n"[..],
            &b"POST /health HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}"[..],
            &b"POST /mcp HTTP/1.1\r\nHost: localhost\r\n\r\n"[..],
        ] {
            let response = exchange(server.local_addr(), request).await;
            let (head, body) = split(&response);
            assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
            assert_eq!(body, "Bad Request");
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn never_ending_stream_is_cut_and_repaired() {
        let backend = spawn_ndjson_backend(
            vec!["{\"response\":\"{\\\"a\\\":1,\\\"b\\\":{\\\"c\\\":2\",\"done\":false}\n"],
            true,
        )
        .await;
        let server = start(
            ollama_state(backend.base_url.clone(), Duration::from_millis(300)),
            ServerSettings::default(),
        )
        .await;

        let started = Instant::now();
        let response = exchange(server.local_addr(), &post(PLANNER_CALL)).await;

        let (_, body) = split(&response);
        assert_eq!(
            body,
            r#"{"id":"r1","result":{"content":[{"type":"text","text":"{\"a\":1,\"b\":{\"c\":2}}"}],"isError":false}}"#
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(backend.requests().len(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn never_ending_stream_without_object_is_a_timeout_error() {
        let backend = spawn_ndjson_backend(
            vec!["{\"response\":\"thinking about it\",\"done\":false}\n"],
            true,
        )
        .await;
        let server = start(
            ollama_state(backend.base_url.clone(), Duration::from_millis(200)),
            ServerSettings::default(),
        )
        .await;

        let response = exchange(server.local_addr(), &post(PLANNER_CALL)).await;

        let (head, body) = split(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        let body: serde_json::Value = serde_json::from_str(body).expect("json body");
        assert_eq!(body["id"], "r1");
        assert_eq!(body["error"]["code"], -1);
        let message = body["error"]["message"].as_str().expect("message");
        assert!(message.starts_with("generation stream timed out after"));
        assert!(body.get("result").is_none());

        server.stop().await;
    }

    #[tokio::test]
    async fn supervisor_closes_connections_that_run_too_long() {
        let generator = Arc::new(
            ScriptedGenerator::new(vec![Ok(StreamOutcome::Completed("{}".to_string()))])
                .with_delay(Duration::from_secs(10)),
        );
        let server = start(
            scripted_state(generator),
            ServerSettings {
                connection_timeout: Duration::from_millis(200),
                ..ServerSettings::default()
            },
        )
        .await;

        let started = Instant::now();
        let response = exchange(server.local_addr(), &post(PLANNER_CALL)).await;

        assert!(response.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));

        server.stop().await;
    }

    #[tokio::test]
    async fn single_worker_serves_queued_connections_in_turn() {
        let generator = Arc::new(
            ScriptedGenerator::new(vec![
                Ok(StreamOutcome::Completed("{\"n\":1}".to_string())),
                Ok(StreamOutcome::Completed("{\"n\":2}".to_string())),
            ])
            .with_delay(Duration::from_millis(100)),
        );
        let server = start(
            scripted_state(Arc::clone(&generator)),
            ServerSettings {
                workers: 1,
                ..ServerSettings::default()
            },
        )
        .await;
        let addr = server.local_addr();

        let request = post(PLANNER_CALL);
        let (first, second) = tokio::join!(exchange(addr, &request), exchange(addr, &request));

        for response in [first, second] {
            let (head, body) = split(&response);
            assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(body.contains("\"isError\":false"));
        }
        assert_eq!(generator.prompts().len(), 2);

        server.stop().await;
    }

    #[tokio::test]
    async fn silent_client_releases_its_worker_after_the_header_wait() {
        let server = start(
            scripted_state(Arc::new(ScriptedGenerator::default())),
            ServerSettings {
                workers: 1,
                connection_timeout: Duration::from_secs(4),
                header_read_timeout: Duration::from_millis(200),
                ..ServerSettings::default()
            },
        )
        .await;
        let addr = server.local_addr();

        let mut silent = TcpStream::connect(addr).await.expect("connect");
        silent
            .write_all(b"POST /mcp HTTP/1.1\r\n")
            .await
            .expect("write request line");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        let response = exchange(addr, &post(r#"{"method":"ping","id":"p1"}"#)).await;

        let (head, body) = split(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(body, r#"{"id":"p1","result":{}}"#);
        assert!(started.elapsed() < Duration::from_secs(2));

        let mut rejected = Vec::new();
        silent
            .read_to_end(&mut rejected)
            .await
            .expect("read rejection");
        assert!(String::from_utf8_lossy(&rejected).starts_with("HTTP/1.1 400 Bad Request\r\n"));

        server.stop().await;
    }

    #[tokio::test]
    async fn stopped_server_refuses_connections() {
        let server = start(
            scripted_state(Arc::new(ScriptedGenerator::default())),
            ServerSettings::default(),
        )
        .await;
        let addr = server.local_addr();

        server.stop().await;

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
