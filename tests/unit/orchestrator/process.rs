use super::*;

fn sh(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", script])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

#[test]
fn scraper_finds_port_on_stdout() {
    let mut child = ManagedChild::spawn(
        "serve",
        &mut sh("echo booting; echo 'Serving HTTP on 127.0.0.1 port 8765 (http://127.0.0.1:8765/)'; sleep 5"),
    )
    .unwrap();
    let scraper = LineScraper::attach(&mut child).unwrap();
    let re = Regex::new(r"port (\d+)").unwrap();
    assert_eq!(
        scraper.wait_for_port(&re, Duration::from_secs(5)).unwrap(),
        8765
    );
}

#[test]
fn scraper_reads_stderr_too() {
    let mut child =
        ManagedChild::spawn("serve", &mut sh("echo 'listening on port 4000' 1>&2; sleep 5")).unwrap();
    let scraper = LineScraper::attach(&mut child).unwrap();
    let re = Regex::new(r"port (\d+)").unwrap();
    assert_eq!(
        scraper.wait_for_port(&re, Duration::from_secs(5)).unwrap(),
        4000
    );
}

#[test]
fn scraper_times_out_without_announcement() {
    let mut child = ManagedChild::spawn("serve", &mut sh("echo nothing here; sleep 5")).unwrap();
    let scraper = LineScraper::attach(&mut child).unwrap();
    let re = Regex::new(r"port (\d+)").unwrap();
    let err = scraper
        .wait_for_port(&re, Duration::from_millis(200))
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

#[test]
fn scraper_reports_early_exit() {
    let mut child = ManagedChild::spawn("serve", &mut sh("echo bye")).unwrap();
    let scraper = LineScraper::attach(&mut child).unwrap();
    let re = Regex::new(r"port (\d+)").unwrap();
    let err = scraper
        .wait_for_port(&re, Duration::from_secs(5))
        .unwrap_err();
    assert!(matches!(err, SpinloopError::Launch(_)), "{err}");
}

#[test]
fn drop_kills_the_child() {
    let child = ManagedChild::spawn("sleeper", &mut sh("sleep 30")).unwrap();
    let pid = child.id().unwrap();
    drop(child);
    // Reaped: /proc no longer lists the pid (or lists a different process).
    let alive = std::fs::read_to_string(format!("/proc/{pid}/cmdline"))
        .map(|c| c.contains("sleep"))
        .unwrap_or(false);
    assert!(!alive);
}

#[test]
fn shutdown_returns_status_of_exited_child() {
    let child = ManagedChild::spawn("quick", &mut sh("exit 0")).unwrap();
    let status = child.shutdown(Duration::from_secs(5)).unwrap();
    assert!(status.success());
}

#[test]
fn build_step_fails_on_nonzero_exit() {
    run_to_completion(&["sh".to_owned(), "-c".to_owned(), "exit 0".to_owned()]).unwrap();
    let err = run_to_completion(&["sh".to_owned(), "-c".to_owned(), "exit 3".to_owned()])
        .unwrap_err();
    assert!(matches!(err, SpinloopError::Build(_)), "{err}");
    assert!(run_to_completion(&[]).is_err());
}
