mod helpers;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use helpers::{ScriptedExecutor, utf8};
use spoon_snapshot::SnapshotError;
use spoon_snapshot::executor::RealCommandExecutor;
use spoon_snapshot::scheduled_task::{ScheduledTaskRunner, SchedulerOptions, TaskRunner};

const RUNNING: &str = "TaskName: \\app - vagrant up\nStatus: Running\nLast Result: 267009\n";
const NOT_STARTED: &str = "TaskName: \\app - vagrant up\nStatus: Ready\nLast Result: 267011\n";

fn options() -> SchedulerOptions {
    SchedulerOptions {
        poll_interval: Duration::ZERO,
        timeout: None,
        run_as_user: None,
    }
}

fn finished(code: i32) -> &'static str {
    match code {
        0 => "TaskName: \\app - vagrant up\nStatus: Ready\nLast Result: 0\n",
        _ => "TaskName: \\app - vagrant up\nStatus: Ready\nLast Result: 1\n",
    }
}

fn verbs(executor: &ScriptedExecutor) -> Vec<String> {
    executor
        .commands()
        .into_iter()
        .map(|(program, args)| {
            assert_eq!(program, "schtasks");
            args[0].clone()
        })
        .collect()
}

#[test]
fn runs_task_until_it_finishes_and_removes_it() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(ScriptedExecutor::new(vec![
        (0, ""),
        (0, ""),
        (0, NOT_STARTED),
        (0, RUNNING),
        (0, finished(0)),
        (0, ""),
    ]));
    let runner = ScheduledTaskRunner::new(executor.clone(), options());

    runner
        .run("app - vagrant up", "vagrant up", &utf8(&dir))
        .expect("task should succeed");

    assert_eq!(
        verbs(&executor),
        ["/Create", "/Run", "/Query", "/Query", "/Query", "/Delete"]
    );
    let commands = executor.commands();
    let create = &commands[0].1;
    assert_eq!(&create[1..3], ["/TN", "app - vagrant up"]);
    assert!(create[4].ends_with("app-vagrant-up.cmd"), "{:?}", create);
    assert!(create.iter().any(|a| a == "/F"));
    assert!(!create.iter().any(|a| a == "/RU"));
    assert_eq!(commands[5].1, ["/Delete", "/TN", "app - vagrant up", "/F"]);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0, "wrapper should be removed");
}

#[test]
fn non_zero_exit_fails_with_log_tail() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("app-vagrant-up.log"),
        "Bringing machine 'default' up...\r\nThe guest machine entered an invalid state\r\n",
    )
    .unwrap();
    let executor = Arc::new(ScriptedExecutor::new(vec![(0, ""), (0, ""), (0, finished(1)), (0, "")]));
    let runner = ScheduledTaskRunner::new(executor.clone(), options());

    let err = runner
        .run("app - vagrant up", "vagrant up", &utf8(&dir))
        .expect_err("task should fail");

    match &err {
        SnapshotError::Task { task, status } => {
            assert_eq!(task, "app - vagrant up");
            assert!(status.starts_with("exit code 1"), "{}", status);
            assert!(status.contains("invalid state"), "{}", status);
        }
        other => panic!("expected task error, got {:?}", other),
    }
    assert_eq!(verbs(&executor).last().map(String::as_str), Some("/Delete"));
}

#[test]
fn registration_failure_is_a_task_failure() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(ScriptedExecutor::new(vec![(1, "")]));
    let runner = ScheduledTaskRunner::new(executor.clone(), options());

    let err = runner
        .run("app - vagrant destroy", "vagrant destroy --force", &utf8(&dir))
        .expect_err("registration should fail");

    assert!(matches!(err, SnapshotError::Task { .. }), "{:?}", err);
    assert!(err.to_string().contains("exit code 1"));
    assert_eq!(verbs(&executor), ["/Create"]);
}

#[test]
fn timeout_is_a_task_failure_and_still_removes_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(ScriptedExecutor::new(vec![(0, ""), (0, ""), (0, RUNNING), (0, "")]));
    let runner = ScheduledTaskRunner::new(
        executor.clone(),
        SchedulerOptions {
            timeout: Some(Duration::ZERO),
            ..options()
        },
    );

    let err = runner
        .run("app - vagrant up", "vagrant up", &utf8(&dir))
        .expect_err("task should time out");

    assert!(err.to_string().contains("timed out"), "{}", err);
    assert_eq!(verbs(&executor), ["/Create", "/Run", "/Query", "/Delete"]);
}

#[test]
fn unreadable_status_is_a_task_failure() {
    let dir = tempfile::tempdir().unwrap();
    let executor =
        Arc::new(ScriptedExecutor::new(vec![(0, ""), (0, ""), (0, "garbage"), (0, "")]));
    let runner = ScheduledTaskRunner::new(executor.clone(), options());

    let err = runner
        .run("app - vagrant up", "vagrant up", &utf8(&dir))
        .expect_err("task should fail");

    assert!(err.to_string().contains("could not read task status"), "{}", err);
}

#[test]
fn run_as_user_is_passed_to_the_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(ScriptedExecutor::new(vec![(0, ""), (0, ""), (0, finished(0)), (0, "")]));
    let runner = ScheduledTaskRunner::new(
        executor.clone(),
        SchedulerOptions {
            run_as_user: Some("builder".to_string()),
            ..options()
        },
    );

    runner.run("app/x - vagrant up", "vagrant up", &utf8(&dir)).unwrap();

    let create = executor.commands()[0].1.clone();
    assert_eq!(create[2], "app_x - vagrant up");
    let ru = create.iter().position(|a| a == "/RU").expect("/RU flag");
    assert_eq!(create[ru + 1], "builder");
}

#[test]
fn dry_run_completes_without_polling() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScheduledTaskRunner::new(Arc::new(RealCommandExecutor { dry_run: true }), options());

    runner
        .run("app - vagrant up", "vagrant up", &utf8(&dir))
        .expect("dry run should succeed");

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
