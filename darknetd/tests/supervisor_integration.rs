//! Integration tests for detector supervision against a scripted fake
//! detector process.

mod common;

use common::{install_fake_detector, test_config, ECHO_DETECTOR};
use darknetd::detector::{parse_output, DetectorState, DetectorSupervisor, READY_TOKEN};
use darknetd::error::{StartupError, SubmitError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn wait_for_state(
    supervisor: &DetectorSupervisor,
    wanted: DetectorState,
    timeout: Duration,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if supervisor.state() == wanted {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "detector did not reach {wanted:?} in {timeout:?} (currently {:?})",
            supervisor.state()
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn handshake_and_submit() {
    let darknet = TempDir::new().unwrap();
    let capture = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    install_fake_detector(darknet.path(), ECHO_DETECTOR);
    let config = Arc::new(test_config(&darknet, &capture, &archive));

    let supervisor = DetectorSupervisor::start(config, CancellationToken::new())
        .await
        .expect("startup handshake must succeed");
    assert_eq!(supervisor.state(), DetectorState::Ready);

    let words = supervisor.submit(Path::new("/tmp/detect.jpg")).await.unwrap();
    assert_eq!(words.last().map(String::as_str), Some(READY_TOKEN));

    let parsed = parse_output("/tmp/detect.jpg", &words);
    assert_eq!(parsed.time_detect, 0.023);
    assert_eq!(parsed.objects.len(), 1);
    assert_eq!(parsed.objects[0].class, "person");
    assert_eq!(parsed.objects[0].prob, 87);

    supervisor.stop().await;
}

#[tokio::test]
async fn startup_fails_when_process_exits_early() {
    let darknet = TempDir::new().unwrap();
    let capture = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    install_fake_detector(darknet.path(), "#!/bin/sh\nexit 3\n");
    let config = Arc::new(test_config(&darknet, &capture, &archive));

    let err = DetectorSupervisor::start(config, CancellationToken::new())
        .await
        .expect_err("startup must fail");

    // The exit and the stdout close race; either diagnosis is correct.
    assert!(matches!(
        err,
        StartupError::ExitedEarly(_) | StartupError::StdoutClosed
    ));
}

#[tokio::test]
async fn startup_fails_on_timeout() {
    let darknet = TempDir::new().unwrap();
    let capture = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    // Never prints the readiness token.
    install_fake_detector(darknet.path(), "#!/bin/sh\nsleep 60\n");
    let mut config = test_config(&darknet, &capture, &archive);
    config.start_timeout = Duration::from_millis(200);

    let err = DetectorSupervisor::start(Arc::new(config), CancellationToken::new())
        .await
        .expect_err("startup must time out");

    assert!(matches!(err, StartupError::Timeout(_)));
}

#[tokio::test]
async fn submit_times_out_and_tears_session_down() {
    let darknet = TempDir::new().unwrap();
    let capture = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    // Ready prompt, then swallows the request without responding.
    install_fake_detector(
        darknet.path(),
        "#!/bin/sh\nprintf 'Enter Image Path: '\nread line\nsleep 60\n",
    );
    let mut config = test_config(&darknet, &capture, &archive);
    config.detect_timeout = Duration::from_millis(200);
    let shutdown = CancellationToken::new();

    let supervisor = DetectorSupervisor::start(Arc::new(config), shutdown.clone())
        .await
        .unwrap();

    let err = supervisor
        .submit(Path::new("/tmp/detect.jpg"))
        .await
        .expect_err("submit must time out");
    assert!(matches!(err, SubmitError::Timeout(_)));
    assert_ne!(supervisor.state(), DetectorState::Ready);

    shutdown.cancel();
    supervisor.stop().await;
}

#[tokio::test]
async fn restarts_after_process_death() {
    let darknet = TempDir::new().unwrap();
    let capture = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    // Handles one request, then dies on the second.
    install_fake_detector(
        darknet.path(),
        "#!/bin/sh\n\
         printf 'Enter Image Path: '\n\
         read line\n\
         printf '%s: Predicted in 0.5 seconds. Enter Image Path: ' \"$line\"\n\
         read line\n\
         exit 0\n",
    );
    let config = Arc::new(test_config(&darknet, &capture, &archive));
    let shutdown = CancellationToken::new();

    let supervisor = DetectorSupervisor::start(config, shutdown.clone())
        .await
        .unwrap();

    supervisor
        .submit(Path::new("/tmp/one.jpg"))
        .await
        .expect("first submit succeeds");

    let err = supervisor
        .submit(Path::new("/tmp/two.jpg"))
        .await
        .expect_err("second submit hits the dead process");
    assert!(matches!(
        err,
        SubmitError::StdoutClosed { .. } | SubmitError::Read { .. } | SubmitError::Write(_)
    ));

    // The supervisor relaunches the handshake on its own.
    wait_for_state(&supervisor, DetectorState::Ready, Duration::from_secs(5)).await;

    supervisor
        .submit(Path::new("/tmp/three.jpg"))
        .await
        .expect("submit succeeds after restart");

    shutdown.cancel();
    supervisor.stop().await;
}

#[tokio::test]
async fn submit_fails_fast_while_not_ready() {
    let darknet = TempDir::new().unwrap();
    let capture = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    // Dies immediately after the handshake.
    install_fake_detector(
        darknet.path(),
        "#!/bin/sh\nprintf 'Enter Image Path: '\nexit 0\n",
    );
    let config = Arc::new(test_config(&darknet, &capture, &archive));
    let shutdown = CancellationToken::new();

    let supervisor = DetectorSupervisor::start(config, shutdown.clone())
        .await
        .unwrap();

    // First submit observes the death one way or another...
    let _ = supervisor.submit(Path::new("/tmp/one.jpg")).await;
    // ...and while the restart backoff runs, submits fail fast.
    let err = supervisor
        .submit(Path::new("/tmp/two.jpg"))
        .await
        .expect_err("must not block while restarting");
    assert!(matches!(
        err,
        SubmitError::NotReady | SubmitError::StdoutClosed { .. } | SubmitError::Write(_)
    ));

    shutdown.cancel();
    supervisor.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_submits_never_interleave() {
    let darknet = TempDir::new().unwrap();
    let capture = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    // The response embeds the request path and takes a moment, so an
    // interleaved reader would see the other job's tokens.
    install_fake_detector(
        darknet.path(),
        "#!/bin/sh\n\
         printf 'Enter Image Path: '\n\
         while read line; do\n\
           sleep 0.2\n\
           printf '%s: Predicted in 0.1 seconds. Enter Image Path: ' \"$line\"\n\
         done\n",
    );
    let config = Arc::new(test_config(&darknet, &capture, &archive));
    let shutdown = CancellationToken::new();

    let supervisor = DetectorSupervisor::start(config, shutdown.clone())
        .await
        .unwrap();

    let first = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.submit(Path::new("/tmp/a.jpg")).await })
    };
    let second = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.submit(Path::new("/tmp/b.jpg")).await })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    let first_owner = first.iter().filter(|w| w.contains(".jpg:")).count();
    let second_owner = second.iter().filter(|w| w.contains(".jpg:")).count();
    assert_eq!(first_owner, 1, "each response carries exactly one echo");
    assert_eq!(second_owner, 1, "each response carries exactly one echo");

    let mut echoes: Vec<&String> = first
        .iter()
        .chain(second.iter())
        .filter(|w| w.contains(".jpg:"))
        .collect();
    echoes.sort();
    assert_eq!(echoes, vec!["/tmp/a.jpg:", "/tmp/b.jpg:"]);

    shutdown.cancel();
    supervisor.stop().await;
}
