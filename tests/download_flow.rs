#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tubefetch_engine::engine::{Engine, RetryPolicy};
use tubefetch_engine::request::{DownloadMode, DownloadRequest};
use tubefetch_engine::runner::Stage;
use tubefetch_engine::EngineError;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-yt-dlp");
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        retry_delay: Duration::from_millis(1),
        rate_limit_cooldown: Duration::from_millis(1),
    }
}

fn request_for(dir: &Path) -> DownloadRequest {
    DownloadRequest {
        url: "https://example.com/watch?v=abc".to_string(),
        output_dir: dir.to_path_buf(),
        ..DownloadRequest::default()
    }
}

#[test]
fn streamed_progress_reaches_the_caller_in_order() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let script = write_script(
        tmp.path(),
        r#"echo "[download]  10.0% of 4.00MiB"
echo "[download]  55.5% of 4.00MiB"
echo "[download] 100% of 4.00MiB"
exit 0
"#,
    );

    let engine = Engine::new(script).with_policy(quick_policy());
    let mut events = Vec::new();
    engine
        .download(&request_for(tmp.path()), |e| events.push(e))
        .expect("download succeeds");

    let percents: Vec<f64> = events.iter().map(|e| e.percent).collect();
    assert_eq!(percents, vec![0.1, 0.555, 1.0]);
    assert!(events.iter().all(|e| matches!(e.stage, Stage::Downloading)));
}

#[test]
fn fragment_gaps_retry_until_the_tool_recovers() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let counter = tmp.path().join("attempts");
    let script = write_script(
        tmp.path(),
        &format!(
            r#"n=0
[ -f "{counter}" ] && n=$(cat "{counter}")
n=$((n + 1))
printf '%s' "$n" > "{counter}"
if [ "$n" -lt 3 ]; then
  echo "ERROR: fragment not found" >&2
  exit 1
fi
echo "[download] 100% of 4.00MiB"
exit 0
"#,
            counter = counter.display()
        ),
    );

    let engine = Engine::new(script).with_policy(quick_policy());
    let mut notices = Vec::new();
    engine
        .download(&request_for(tmp.path()), |e| {
            if matches!(e.stage, Stage::Retrying) {
                notices.push(e.text);
            }
        })
        .expect("third attempt succeeds");

    assert_eq!(fs::read_to_string(&counter).expect("counter"), "3");
    assert_eq!(notices, vec!["Fragment missing, retrying...".to_string(); 2]);
}

#[test]
fn auth_wall_stops_after_a_single_attempt() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let counter = tmp.path().join("attempts");
    let script = write_script(
        tmp.path(),
        &format!(
            r#"n=0
[ -f "{counter}" ] && n=$(cat "{counter}")
printf '%s' "$((n + 1))" > "{counter}"
echo "ERROR: Sign in required to confirm your age" >&2
exit 1
"#,
            counter = counter.display()
        ),
    );

    let engine = Engine::new(script).with_policy(quick_policy());
    let err = engine
        .download(&request_for(tmp.path()), |_| {})
        .expect_err("auth wall");

    assert!(matches!(err, EngineError::AuthRequired));
    assert_eq!(
        err.to_string(),
        "authentication required: please import cookies"
    );
    assert_eq!(fs::read_to_string(&counter).expect("counter"), "1");
}

#[test]
fn persistent_failure_is_abandoned_with_the_last_cause() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let counter = tmp.path().join("attempts");
    let script = write_script(
        tmp.path(),
        &format!(
            r#"n=0
[ -f "{counter}" ] && n=$(cat "{counter}")
printf '%s' "$((n + 1))" > "{counter}"
echo "ERROR: unable to download video data" >&2
exit 1
"#,
            counter = counter.display()
        ),
    );

    let engine = Engine::new(script).with_policy(quick_policy());
    let err = engine
        .download(&request_for(tmp.path()), |_| {})
        .expect_err("every attempt fails");

    match &err {
        EngineError::Abandoned { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert!(last.contains("unable to download video data"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().starts_with("failed after 3 attempts:"));
    assert_eq!(fs::read_to_string(&counter).expect("counter"), "3");
}

#[test]
fn request_flags_reach_the_tool() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let argfile = tmp.path().join("argv");
    let script = write_script(
        tmp.path(),
        &format!(
            r#"printf '%s\n' "$@" > "{argfile}"
echo "[download] 100% of 4.00MiB"
exit 0
"#,
            argfile = argfile.display()
        ),
    );

    let request = DownloadRequest {
        mode: DownloadMode::Audio,
        quality: "mp3".to_string(),
        playlist: true,
        playlist_items: Some("1-3".to_string()),
        ..request_for(tmp.path())
    };

    let engine = Engine::new(script).with_policy(quick_policy());
    engine.download(&request, |_| {}).expect("download succeeds");

    let recorded: Vec<String> = fs::read_to_string(&argfile)
        .expect("argv file")
        .lines()
        .map(|l| l.to_string())
        .collect();
    assert_eq!(recorded, request.to_args());
}
