//! Integration tests for the irrigation monitor HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use irrigation_monitor::activity::ActivityLog;
    use irrigation_monitor::ingest::Features;
    use irrigation_monitor::model::PumpClassifier;
    use irrigation_monitor::server::{run, ServerConfig};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    const READINGS: &str = "Soil Moisture,Temperature,Air Humidity\n\
                            12,21,51\n\
                            490,34,79\n\
                            15,20,49\n\
                            505,36,81\n";

    fn classifier() -> Arc<PumpClassifier> {
        let mut records = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            let step = i as f64;
            records.push(Features::new(10.0 + step, 20.0 + step * 0.1, 50.0 + step * 0.2));
            labels.push(0);
            records.push(Features::new(500.0 + step, 35.0 + step * 0.1, 80.0 + step * 0.2));
            labels.push(1);
        }
        Arc::new(PumpClassifier::train(&records, &labels).expect("Failed to train"))
    }

    async fn start(tick_interval: Duration) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        start_with(ServerConfig::new(0, tick_interval)).await
    }

    async fn start_with(config: ServerConfig) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let (addr, shutdown_tx) = run(config, classifier(), ActivityLog::shared())
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        (addr, shutdown_tx)
    }

    async fn upload(
        client: &reqwest::Client,
        addr: SocketAddr,
        body: impl Into<reqwest::Body>,
    ) -> reqwest::Response {
        client
            .post(format!("http://{}/upload", addr))
            .header("Content-Type", "text/csv")
            .body(body)
            .send()
            .await
            .expect("Failed to send request")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = start(Duration::from_secs(60)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_frame_before_upload_is_no_input() {
        let (addr, shutdown_tx) = start(Duration::from_secs(60)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/frame", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status().as_u16(), 409);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "NO_INPUT");
        assert_eq!(body["error"], "Please upload a CSV file.");

        let status: serde_json::Value = client
            .get(format!("http://{}/status", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(status["state"], "no_input");
        assert_eq!(status["activity"]["predictions"], 0);
        assert_eq!(status["tick_interval_secs"], 60);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_upload_then_frame() {
        let (addr, shutdown_tx) = start(Duration::from_secs(60)).await;
        let client = reqwest::Client::new();

        let response = upload(&client, addr, READINGS).await;
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rows"], 4);
        assert_eq!(body["pumps_on"], 2);

        let frame: serde_json::Value = client
            .get(format!("http://{}/frame", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert_eq!(frame["cursor"], 0);
        assert_eq!(frame["dataset_len"], 4);
        assert_eq!(frame["parcels"][0]["name"], "Parcel 1");
        assert_eq!(frame["parcels"][0]["irrigation"], "Off");
        assert_eq!(frame["parcels"][1]["irrigation"], "On");
        assert_eq!(frame["parcels"][1]["soil_moisture"]["value"], 490.0);
        assert_eq!(frame["charts"].as_array().map(|c| c.len()), Some(3));

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_rejected_uploads() {
        let (addr, shutdown_tx) = start(Duration::from_secs(60)).await;
        let client = reqwest::Client::new();

        let cases = [
            ("Soil Moisture,Temperature\n1,2\n3,4\n", "MISSING_COLUMN"),
            (
                "Soil Moisture,Temperature,Air Humidity\n1,2,3\nabc,5,6\n",
                "INVALID_ROW",
            ),
            ("Soil Moisture,Temperature,Air Humidity\n1,2,3\n", "TOO_FEW_ROWS"),
            (
                "Soil Moisture,Temperature,Air Humidity\n1,2,3\n4,5,6\n7,8,9\n",
                "UNPAIRED_ROW",
            ),
        ];

        for (body, code) in cases {
            let response = upload(&client, addr, body).await;
            assert_eq!(response.status().as_u16(), 422, "expected 422 for {code}");
            let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
            assert_eq!(body["code"], code);
        }

        // Nothing was accepted, so the feed is still waiting.
        let response = client
            .get(format!("http://{}/frame", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status().as_u16(), 409);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_upload_with_invalid_utf8_is_rejected_as_csv() {
        let (addr, shutdown_tx) = start(Duration::from_secs(60)).await;
        let client = reqwest::Client::new();

        let body: Vec<u8> = b"Soil Moisture,Temperature,Air Humidity,Note\n\
                              12,21,51,caf\xE9\n\
                              490,34,79,ok\n"
            .to_vec();
        let response = upload(&client, addr, body).await;

        assert_eq!(response.status().as_u16(), 422);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_CSV");
        assert!(body["error"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_rejected() {
        let config = ServerConfig::new(0, Duration::from_secs(60)).with_max_upload_bytes(1024);
        let (addr, shutdown_tx) = start_with(config).await;
        let client = reqwest::Client::new();

        let mut large = String::from("Soil Moisture,Temperature,Air Humidity\n");
        while large.len() <= 4096 {
            large.push_str("12,21,51\n490,34,79\n");
        }
        let response = upload(&client, addr, large).await;

        assert_eq!(response.status().as_u16(), 413);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "FILE_TOO_LARGE");

        // A file under the limit is still accepted afterwards.
        let response = upload(&client, addr, READINGS).await;
        assert!(response.status().is_success());

        let status: serde_json::Value = client
            .get(format!("http://{}/status", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(status["activity"]["uploads_rejected"], 1);
        assert_eq!(status["activity"]["uploads_accepted"], 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_clear_returns_to_no_input() {
        let (addr, shutdown_tx) = start(Duration::from_secs(60)).await;
        let client = reqwest::Client::new();

        let response = upload(&client, addr, READINGS).await;
        assert!(response.status().is_success());

        let response = client
            .delete(format!("http://{}/upload", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["state"], "no_input");
        assert!(body.get("cursor").is_none());
        assert_eq!(body["tick_interval_secs"], 60);

        let response = client
            .get(format!("http://{}/frame", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status().as_u16(), 409);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_predict_endpoint() {
        let (addr, shutdown_tx) = start(Duration::from_secs(60)).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{}/predict", addr))
            .json(&serde_json::json!({
                "soil_moisture": 480.0,
                "temperature": 34.0,
                "air_humidity": 78.0
            }))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["pump_data"], 1);
        assert_eq!(body["irrigation"], "On");
        assert!(body["probability"].as_f64().unwrap() > 0.5);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let (addr, shutdown_tx) = start(Duration::from_secs(60)).await;
        let client = reqwest::Client::new();

        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/frame", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "GET")
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost")
        );

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_feed_advances_on_tick() {
        let (addr, shutdown_tx) = start(Duration::from_millis(200)).await;
        let client = reqwest::Client::new();

        let response = upload(&client, addr, READINGS).await;
        assert!(response.status().is_success());

        // The first tick renders rows 0-1, the second rows 2-3.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut seen_second_window = false;
        while tokio::time::Instant::now() < deadline {
            let frame: serde_json::Value = client
                .get(format!("http://{}/frame", addr))
                .send()
                .await
                .expect("Failed to send request")
                .json()
                .await
                .expect("Failed to parse JSON");
            if frame["cursor"] == 2 {
                assert_eq!(frame["parcels"][0]["row"], 2);
                assert_eq!(frame["parcels"][1]["row"], 3);
                seen_second_window = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(seen_second_window, "feed never reached the second window");

        let _ = shutdown_tx.send(());
    }
}
