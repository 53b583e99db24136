use std::time::Duration;

use arias_app::Services;
use arias_aria2::Aria2Client;
use arias_config::Config;
use arias_test_support::{FakeDaemon, FakeFile, Script};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn config(objects: &std::path::Path) -> Config {
    let mut config = Config {
        default_bucket: "media".to_string(),
        allow_no_name: true,
        ..Config::default()
    };
    config.storage.root = objects.display().to_string();
    config
}

#[tokio::test]
async fn serves_downloads_until_shutdown() -> anyhow::Result<()> {
    let downloads = tempfile::tempdir()?;
    let objects = tempfile::tempdir()?;
    let (daemon, sink, source) = FakeDaemon::builder()
        .download_dir(downloads.path())
        .start();
    daemon.script(
        "https://example.com/a.bin",
        Script::Complete(vec![FakeFile::new("a.bin", "payload")]),
    );
    let client = Aria2Client::from_transport(sink, source, None);
    let services = Services::build(&config(objects.path()), client.clone())?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(services.run(listener, async move {
        let _ = stopped.await;
    }));

    let http = reqwest::Client::new();
    let accepted = http
        .post(format!("{base}/download"))
        .json(&json!({"url": "https://example.com/a.bin"}))
        .send()
        .await?;
    assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);
    let id = accepted.json::<Value>().await?["id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing id"))?
        .to_string();

    timeout(WAIT, async {
        loop {
            let status: Value = http
                .get(format!("{base}/status/{id}"))
                .send()
                .await?
                .json()
                .await?;
            if status["state"] == "done" {
                return Ok::<_, anyhow::Error>(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await??;
    assert!(objects.path().join("media").join("a.bin").exists());

    let _ = stop.send(());
    timeout(WAIT, server).await???;
    assert!(client.is_closed());
    Ok(())
}

#[tokio::test]
async fn daemon_disconnect_stops_the_service() -> anyhow::Result<()> {
    let objects = tempfile::tempdir()?;
    let (daemon, sink, source) = FakeDaemon::start();
    let client = Aria2Client::from_transport(sink, source, None);
    let services = Services::build(&config(objects.path()), client)?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let server = tokio::spawn(services.run(listener, std::future::pending()));

    daemon.disconnect();
    timeout(WAIT, server).await???;
    Ok(())
}
