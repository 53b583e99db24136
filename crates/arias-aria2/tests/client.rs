use std::sync::{Arc, Mutex};
use std::time::Duration;

use arias_aria2::{
    Aria2Client, Aria2Error, DownloadOptions, DownloadOutcome, EventKind, ExitStatus, Gid,
    PositionAnchor, StatusName,
};
use arias_test_support::{FakeDaemon, FakeDaemonBuilder, FakeFile, Script};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn start(builder: FakeDaemonBuilder) -> (FakeDaemon, Aria2Client) {
    let (daemon, sink, source) = builder.start();
    (daemon, Aria2Client::from_transport(sink, source, None))
}

async fn until(mut check: impl FnMut() -> bool) -> anyhow::Result<()> {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn completed_download_returns_final_status() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (daemon, client) = start(FakeDaemon::builder().download_dir(dir.path()));
    daemon.script(
        "http://files.test/a.bin",
        Script::Complete(vec![FakeFile::new("a.bin", "hello")]),
    );

    let status = timeout(
        WAIT,
        client.download(
            &["http://files.test/a.bin".to_string()],
            &DownloadOptions::new(),
            &CancellationToken::new(),
        ),
    )
    .await??;

    assert_eq!(status.status, Some(StatusName::Complete));
    assert_eq!(status.files.len(), 1);
    assert_eq!(status.files[0].path, dir.path().join("a.bin"));
    assert_eq!(status.total_length, 5);
    let methods: Vec<_> = daemon.calls().into_iter().map(|call| call.method).collect();
    assert_eq!(methods, vec!["aria2.addUri", "aria2.tellStatus"]);
    Ok(())
}

#[tokio::test]
async fn failed_download_carries_daemon_error() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    daemon.script(
        "http://files.test/missing",
        Script::Fail {
            code: 3,
            message: "Resource not found".to_string(),
        },
    );

    let err = timeout(
        WAIT,
        client.download(
            &["http://files.test/missing".to_string()],
            &DownloadOptions::new(),
            &CancellationToken::new(),
        ),
    )
    .await?
    .err();

    match err {
        Some(Aria2Error::DownloadFailed {
            outcome,
            error_code,
            error_message,
            ..
        }) => {
            assert_eq!(outcome, DownloadOutcome::Errored);
            assert_eq!(error_code, ExitStatus::ResourceNotFound);
            assert_eq!(error_message, "Resource not found");
        }
        other => anyhow::bail!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn stopped_download_is_reported_as_stopped() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    daemon.script("http://files.test/stop", Script::Stop);

    let err = timeout(
        WAIT,
        client.download(
            &["http://files.test/stop".to_string()],
            &DownloadOptions::new(),
            &CancellationToken::new(),
        ),
    )
    .await?
    .err()
    .map(|err| err.to_string());

    assert_eq!(err.as_deref(), Some("download stopped"));
    Ok(())
}

#[tokio::test]
async fn cancelling_a_download_removes_it_exactly_once() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    daemon.script("http://files.test/slow", Script::Hold);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let client = client.clone();
        let cancel = cancel.clone();
        async move {
            client
                .download(
                    &["http://files.test/slow".to_string()],
                    &DownloadOptions::new(),
                    &cancel,
                )
                .await
        }
    });

    until(|| !daemon.calls_to("aria2.addUri").is_empty()).await?;
    cancel.cancel();

    let result = timeout(WAIT, handle).await??;
    assert!(matches!(result, Err(Aria2Error::Cancelled { .. })));
    let removes = daemon.calls_to("aria2.remove");
    assert_eq!(removes.len(), 1);
    assert_eq!(removes[0].params[0], serde_json::json!("0000000000000001"));
    assert!(daemon.calls_to("aria2.tellStatus").is_empty());
    Ok(())
}

#[tokio::test]
async fn cancelled_download_leaves_no_buffered_outcome() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    daemon.script("http://files.test/slow", Script::Hold);
    let mut stream = client.events();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let client = client.clone();
        let cancel = cancel.clone();
        async move {
            client
                .download(
                    &["http://files.test/slow".to_string()],
                    &DownloadOptions::new(),
                    &cancel,
                )
                .await
        }
    });
    until(|| !daemon.calls_to("aria2.addUri").is_empty()).await?;
    cancel.cancel();
    assert!(matches!(
        timeout(WAIT, handle).await??,
        Err(Aria2Error::Cancelled { .. })
    ));

    timeout(WAIT, async {
        while let Ok(event) = stream.recv().await {
            if event.kind == EventKind::Stop {
                break;
            }
        }
    })
    .await?;
    assert_eq!(client.waiter().buffered_len(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_status_query_keeps_the_gid() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (daemon, client) = start(FakeDaemon::builder().download_dir(dir.path()));
    daemon.script(
        "http://files.test/a.bin",
        Script::Complete(vec![FakeFile::new("a.bin", "hello")]),
    );
    daemon.fail_next("aria2.tellStatus", "transient");

    let err = timeout(
        WAIT,
        client.download(
            &["http://files.test/a.bin".to_string()],
            &DownloadOptions::new(),
            &CancellationToken::new(),
        ),
    )
    .await?
    .err()
    .ok_or_else(|| anyhow::anyhow!("status failure was not reported"))?;

    assert!(matches!(err, Aria2Error::Status { .. }));
    assert_eq!(err.gid(), Some(&Gid::new("0000000000000001")));

    client.delete(&Gid::new("0000000000000001")).await?;
    assert!(!dir.path().join("a.bin").exists());
    assert_eq!(daemon.calls_to("aria2.removeDownloadResult").len(), 1);
    Ok(())
}

#[tokio::test]
async fn secret_token_prefixes_every_call() -> anyhow::Result<()> {
    let (daemon, sink, source) = FakeDaemon::builder().secret("hunter2").start();
    let client = Aria2Client::from_transport(sink, source, Some("hunter2".to_string()));

    timeout(WAIT, client.pause_all()).await??;
    let gid = timeout(
        WAIT,
        client.add_uri(
            &["http://files.test/a".to_string()],
            &DownloadOptions::new().with_out("renamed.bin"),
        ),
    )
    .await??;

    assert_eq!(gid, Gid::new("0000000000000001"));
    let adds = daemon.calls_to("aria2.addUri");
    assert_eq!(
        adds[0].params,
        vec![
            serde_json::json!(["http://files.test/a"]),
            serde_json::json!({"out": "renamed.bin"}),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn wrong_secret_surfaces_remote_rejection() -> anyhow::Result<()> {
    let (_daemon, sink, source) = FakeDaemon::builder().secret("right").start();
    let client = Aria2Client::from_transport(sink, source, Some("wrong".to_string()));

    let err = timeout(WAIT, client.unpause_all()).await?.err();
    assert!(err.as_ref().is_some_and(Aria2Error::is_remote_rejection));
    assert!(err.is_some_and(|err| err.to_string().contains("Unauthorized")));
    Ok(())
}

#[tokio::test]
async fn projected_status_agrees_with_full_status() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (daemon, client) = start(FakeDaemon::builder().download_dir(dir.path()));
    daemon.script(
        "http://files.test/p",
        Script::Complete(vec![FakeFile::new("p.bin", vec![0_u8; 64])]),
    );
    let gid = timeout(
        WAIT,
        client.add_uri(&["http://files.test/p".to_string()], &DownloadOptions::new()),
    )
    .await??;

    let full = timeout(WAIT, client.tell_status(&gid, &[])).await??;
    let projected = timeout(
        WAIT,
        client.tell_status(&gid, &["gid", "totalLength", "status"]),
    )
    .await??;

    assert_eq!(projected.gid, full.gid);
    assert_eq!(projected.total_length, full.total_length);
    assert_eq!(projected.status, full.status);
    assert!(projected.files.is_empty());
    assert_eq!(full.files.len(), 1);
    Ok(())
}

#[tokio::test]
async fn delete_purges_finished_download_and_local_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (daemon, client) = start(FakeDaemon::builder().download_dir(dir.path()));
    daemon.script(
        "http://files.test/d",
        Script::Complete(vec![FakeFile::new("d.bin", "data")]),
    );
    let status = timeout(
        WAIT,
        client.download(
            &["http://files.test/d".to_string()],
            &DownloadOptions::new(),
            &CancellationToken::new(),
        ),
    )
    .await??;
    let path = status.files[0].path.clone();
    std::fs::write(dir.path().join("d.bin.aria2"), "control")?;
    assert!(path.exists());

    let gid = status.gid.clone().unwrap_or_else(|| Gid::new(""));
    timeout(WAIT, client.delete(&gid)).await??;

    assert!(!path.exists());
    assert!(!dir.path().join("d.bin.aria2").exists());
    assert_eq!(daemon.calls_to("aria2.remove").len(), 1);
    assert_eq!(daemon.calls_to("aria2.removeDownloadResult").len(), 1);

    let again = timeout(WAIT, client.get_files(&gid)).await?;
    assert!(again.is_err());
    Ok(())
}

#[tokio::test]
async fn delete_removes_active_download_without_purging() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    daemon.script("http://files.test/held", Script::Hold);
    let gid = timeout(
        WAIT,
        client.add_uri(&["http://files.test/held".to_string()], &DownloadOptions::new()),
    )
    .await??;

    timeout(WAIT, client.delete(&gid)).await??;
    assert_eq!(daemon.calls_to("aria2.remove").len(), 1);
    assert!(daemon.calls_to("aria2.removeDownloadResult").is_empty());
    Ok(())
}

#[tokio::test]
async fn disconnect_fails_pending_wait() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    daemon.script("http://files.test/hang", Script::Hold);

    let handle = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .download(
                    &["http://files.test/hang".to_string()],
                    &DownloadOptions::new(),
                    &CancellationToken::new(),
                )
                .await
        }
    });
    until(|| client.waiter().waiting_len() == 1).await?;
    daemon.disconnect();

    let result = timeout(WAIT, handle).await??;
    assert!(matches!(result, Err(Aria2Error::Disconnected { .. })));
    timeout(WAIT, client.closed()).await?;
    assert!(client.is_closed());
    Ok(())
}

#[tokio::test]
async fn listeners_and_stream_observe_notifications() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let id = client.subscribe(EventKind::Start, move |event| {
        if let Ok(mut seen) = recorder.lock() {
            seen.push(event.gid.clone());
        }
    });
    let mut stream = client.events();

    assert!(daemon.push_event("aria2.onDownloadStart", "g-1"));
    assert!(daemon.push_event("aria2.onBtDownloadComplete", "g-1"));

    let first = timeout(WAIT, stream.recv()).await??;
    let second = timeout(WAIT, stream.recv()).await??;
    assert_eq!(first.kind, EventKind::Start);
    assert_eq!(second.kind, EventKind::BtComplete);
    assert_eq!(
        seen.lock().map(|seen| seen.clone()).unwrap_or_default(),
        vec![Gid::new("g-1")]
    );

    assert!(client.unsubscribe(EventKind::Start, id));
    assert!(!client.unsubscribe(EventKind::Start, id));
    Ok(())
}

#[tokio::test]
async fn early_completion_is_claimed_by_late_waiter() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    let mut stream = client.events();
    assert!(daemon.push_event("aria2.onDownloadComplete", "early"));
    timeout(WAIT, stream.recv()).await??;

    let outcome = timeout(WAIT, client.wait_for_download(&Gid::new("early"))).await??;
    assert_eq!(outcome, DownloadOutcome::Completed);
    Ok(())
}

#[tokio::test]
async fn invalid_uri_lists_never_reach_the_daemon() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());

    let empty = client.add_uri(&[], &DownloadOptions::new()).await;
    assert!(matches!(empty, Err(Aria2Error::InvalidInput { field: "uris", .. })));

    let mixed = client
        .add_uri(
            &[
                "magnet:?xt=urn:btih:abc".to_string(),
                "http://files.test/a".to_string(),
            ],
            &DownloadOptions::new(),
        )
        .await;
    assert!(matches!(mixed, Err(Aria2Error::InvalidInput { .. })));
    assert!(daemon.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn queue_control_round_trips() -> anyhow::Result<()> {
    let (daemon, client) = start(FakeDaemon::builder());
    for uri in ["http://files.test/1", "http://files.test/2", "http://files.test/3"] {
        daemon.script(uri, Script::Hold);
    }
    let mut gids = Vec::new();
    for uri in ["http://files.test/1", "http://files.test/2", "http://files.test/3"] {
        gids.push(timeout(WAIT, client.add_uri(&[uri.to_string()], &DownloadOptions::new())).await??);
    }

    let moved = timeout(WAIT, client.change_position(&gids[2], -10, PositionAnchor::Current)).await??;
    assert_eq!(moved, 0);
    let end = timeout(WAIT, client.change_position(&gids[2], 5, PositionAnchor::End)).await??;
    assert_eq!(end, 2);

    assert_eq!(timeout(WAIT, client.pause(&gids[0])).await??, gids[0]);
    assert_eq!(timeout(WAIT, client.unpause(&gids[0])).await??, gids[0]);
    assert_eq!(timeout(WAIT, client.force_pause(&gids[1])).await??, gids[1]);
    timeout(WAIT, client.force_pause_all()).await??;
    assert_eq!(timeout(WAIT, client.force_remove(&gids[1])).await??, gids[1]);

    let uris = timeout(WAIT, client.get_uris(&gids[0])).await??;
    assert_eq!(uris[0].uri, "http://files.test/1");
    Ok(())
}
