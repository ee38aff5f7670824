use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn plan_cli_writes_a_plan_for_a_folder() {
    let project = tempdir().expect("temp project");
    let media = project.path().join("media");
    fs::create_dir_all(media.join("part 2")).unwrap();
    fs::write(media.join("part 2/lesson 10.mp4"), b"x").unwrap();
    fs::write(media.join("part 2/lesson 9.mp4"), b"x").unwrap();
    fs::write(media.join("readme.pdf"), b"x").unwrap();
    let output = project.path().join("upload_plan.csv");

    let mut cmd = Command::cargo_bin("tgsender").expect("Binary exists");
    cmd.arg("plan")
        .arg("--folder")
        .arg(&media)
        .arg("--output")
        .arg(&output);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Plan created").and(predicate::str::contains("3 files")));

    let table = fs::read_to_string(&output).expect("plan written");
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "file_output,description,sent");
    assert_eq!(lines.len(), 4, "header plus one row per file, got: {table}");
    assert!(
        lines[1].ends_with("lesson 9.mp4,0") && lines[2].ends_with("lesson 10.mp4,0"),
        "rows must be in natural order, got: {table}"
    );
}

#[test]
fn plan_cli_fails_for_missing_folder() {
    let project = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("tgsender").expect("Binary exists");
    cmd.arg("plan")
        .arg("--folder")
        .arg(project.path().join("nowhere"))
        .arg("--output")
        .arg(project.path().join("upload_plan.csv"));

    cmd.assert().failure();
    assert!(!project.path().join("upload_plan.csv").exists());
}

#[test]
fn status_cli_reports_progress() {
    let project = tempdir().unwrap();
    let plan = project.path().join("upload_plan.csv");
    fs::write(
        &plan,
        "file_output,description,sent\n/a.mp4,A,1\n/b.mp4,B,0\n/c.mp4,C,0\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("tgsender").expect("Binary exists");
    cmd.arg("status").arg("--plan").arg(&plan);

    cmd.assert().success().stdout(
        predicate::str::contains("3 rows")
            .and(predicate::str::contains("1 sent"))
            .and(predicate::str::contains("2 pending"))
            .and(predicate::str::contains("Next: 2/3 /b.mp4")),
    );
}

#[test]
fn send_cli_fails_without_config_file() {
    let project = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("tgsender").expect("Binary exists");
    cmd.arg("send")
        .arg("--config")
        .arg(project.path().join("missing.yaml"))
        .arg("--plan")
        .arg(project.path().join("upload_plan.csv"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn send_cli_rejects_channel_creation_with_bot_api() {
    let project = tempdir().unwrap();
    let media = project.path().join("a.pdf");
    fs::write(&media, b"x").unwrap();
    let plan = project.path().join("upload_plan.csv");
    fs::write(
        &plan,
        format!("file_output,description,sent\n{},A,0\n", media.display()),
    )
    .unwrap();
    let config = project.path().join("config.yaml");
    fs::write(&config, "create_new_channel: 1\ntime_limit: 1\n").unwrap();

    let mut cmd = Command::cargo_bin("tgsender").expect("Binary exists");
    cmd.env("TELEGRAM_BOT_TOKEN", "123:abc")
        .env("TELEGRAM_API_URL", "http://127.0.0.1:9")
        .arg("send")
        .arg("--config")
        .arg(&config)
        .arg("--plan")
        .arg(&plan);

    cmd.assert().failure().stderr(
        predicate::str::contains("create_new_channel")
            .and(predicate::str::contains("cannot create channels")),
    );
    assert!(!project.path().join("channel_metadata").exists());
    assert!(!project.path().join("log_sent").exists());
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use tgsender::cli::{run, Cli, Commands};

    // A plan that does not exist: the command fails, the trace event must still be there.
    let cli = Cli {
        command: Commands::Status {
            plan: std::path::PathBuf::from("dummy_plan.csv"),
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
