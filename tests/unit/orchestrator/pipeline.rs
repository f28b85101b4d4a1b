use super::*;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::delivery::encode_payload;

/// Scripted render host: replays events, then goes silent.
struct ScriptedHost {
    events: VecDeque<HostEvent>,
    sent: Arc<Mutex<Vec<HostCommand>>>,
    closed: Arc<AtomicUsize>,
}

impl HostConnection for ScriptedHost {
    fn send(&mut self, cmd: &HostCommand) -> SpinloopResult<()> {
        self.sent.lock().unwrap().push(cmd.clone());
        Ok(())
    }

    fn recv_timeout(&mut self, _limit: Duration) -> SpinloopResult<Option<HostEvent>> {
        Ok(self.events.pop_front())
    }

    fn close(&mut self, _grace: Duration) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ScriptedLauncher {
    script: Vec<HostEvent>,
    sent: Arc<Mutex<Vec<HostCommand>>>,
    closed: Arc<AtomicUsize>,
    fail: bool,
}

impl HostLauncher for ScriptedLauncher {
    fn launch(&self) -> SpinloopResult<Box<dyn HostConnection>> {
        if self.fail {
            return Err(SpinloopError::launch("no display"));
        }
        Ok(Box::new(ScriptedHost {
            events: self.script.iter().cloned().collect(),
            sent: Arc::clone(&self.sent),
            closed: Arc::clone(&self.closed),
        }))
    }
}

fn workspace(name: &str) -> (SpinloopConfig, PathBuf) {
    let root = std::env::current_dir()
        .unwrap()
        .join("target")
        .join("unit_pipeline")
        .join(name);
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(root.join("assets")).unwrap();

    let mut cfg = SpinloopConfig::default();
    cfg.orchestrator.serve = None;
    cfg.orchestrator.asset_dir = root.join("assets");
    cfg.orchestrator.output.dir = root.join("out");
    cfg.orchestrator.timeouts.exit_grace_ms = 10;
    (cfg, root.join("out"))
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => rd.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn boot_events() -> Vec<HostEvent> {
    vec![
        HostEvent::Loaded {
            url: "file:///x/record".to_owned(),
        },
        HostEvent::CanvasReady {
            width: 720,
            height: 720,
        },
    ]
}

fn delivered_events(bytes: &[u8]) -> Vec<HostEvent> {
    let mut events = boot_events();
    events.extend([
        HostEvent::SceneReady {
            angle: 0.0,
            frame: 0,
        },
        HostEvent::FullRevolution {
            angle: 0.01,
            frame: 1257,
        },
        HostEvent::RecordingStarted {
            mime_type: "video/webm;codecs=vp9".to_owned(),
            target_frame_count: 1257,
        },
        HostEvent::Delivered {
            notice: DeliveryNotice {
                completed: true,
                size: bytes.len() as u64,
                mime_type: "video/webm;codecs=vp9".to_owned(),
                payload: Some(encode_payload(bytes)),
                saved_path: None,
            },
        },
    ]);
    events
}

#[test]
fn readiness_that_never_fires_times_out_without_artifacts() {
    let (cfg, out) = workspace("never_ready");
    let launcher = ScriptedLauncher {
        script: boot_events(),
        ..ScriptedLauncher::default()
    };
    let closed = Arc::clone(&launcher.closed);
    let mut orch = Orchestrator::new(cfg, launcher);

    let err = orch.run().unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(err.to_string().contains("scene_ready"), "{err}");
    assert_eq!(orch.state(), OrchestratorState::Terminated);
    assert!(files_in(&out).is_empty());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn inline_delivery_writes_exactly_one_file_of_announced_size() {
    let (cfg, out) = workspace("inline");
    let bytes: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
    let launcher = ScriptedLauncher {
        script: delivered_events(&bytes),
        ..ScriptedLauncher::default()
    };
    let sent = Arc::clone(&launcher.sent);
    let closed = Arc::clone(&launcher.closed);
    let mut orch = Orchestrator::new(cfg, launcher);

    let report = orch.run().unwrap();
    assert_eq!(report.size, 4096);
    assert_eq!(report.mime_type, "video/webm;codecs=vp9");
    assert_eq!(report.artifact_path, out.join("turntable.webm"));
    assert!(report.transcoded.is_none());
    assert_eq!(files_in(&out), vec![out.join("turntable.webm")]);
    assert_eq!(std::fs::read(&report.artifact_path).unwrap(), bytes);
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    let sent = sent.lock().unwrap();
    let HostCommand::Navigate { url } = &sent[0] else {
        panic!("expected navigate, got {:?}", sent[0]);
    };
    assert!(url.starts_with("file:///") && url.ends_with("/assets/record"), "{url}");

    assert_eq!(
        orch.trail(),
        &[
            OrchestratorState::Idle,
            OrchestratorState::LaunchingRenderHost,
            OrchestratorState::NavigatingToRecordRoute,
            OrchestratorState::WaitingForCanvasReady,
            OrchestratorState::WaitingForSceneReady,
            OrchestratorState::WaitingForDeliverySignal,
            OrchestratorState::PersistingArtifact,
            OrchestratorState::Terminated,
        ]
    );
}

#[test]
fn transcode_failure_is_only_a_warning() {
    let (mut cfg, out) = workspace("transcode_fails");
    cfg.orchestrator.output.transcode.enabled = true;
    let launcher = ScriptedLauncher {
        script: delivered_events(b"definitely not webm"),
        ..ScriptedLauncher::default()
    };
    let mut orch = Orchestrator::new(cfg, launcher);

    let report = orch.run().unwrap();
    assert!(report.transcoded.is_none());
    assert!(orch.trail().contains(&OrchestratorState::Transcoding));
    assert_eq!(files_in(&out), vec![out.join("turntable.webm")]);
}

#[test]
fn host_error_event_is_fatal() {
    let (cfg, out) = workspace("host_error");
    let mut script = boot_events();
    script.push(HostEvent::Error {
        message: "asset error: GET models/turntable.obj failed".to_owned(),
    });
    let launcher = ScriptedLauncher {
        script,
        ..ScriptedLauncher::default()
    };
    let closed = Arc::clone(&launcher.closed);
    let err = Orchestrator::new(cfg, launcher).run().unwrap_err();
    assert!(err.to_string().contains("turntable.obj"), "{err}");
    assert!(files_in(&out).is_empty());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn launch_failure_is_fatal() {
    let (cfg, _) = workspace("launch_fails");
    let launcher = ScriptedLauncher {
        fail: true,
        ..ScriptedLauncher::default()
    };
    let err = Orchestrator::new(cfg, launcher).run().unwrap_err();
    assert!(matches!(err, SpinloopError::Launch(_)), "{err}");
}

#[test]
fn failing_build_step_stops_before_launch() {
    let (mut cfg, _) = workspace("build_fails");
    cfg.orchestrator.build = Some(vec!["sh".to_owned(), "-c".to_owned(), "exit 2".to_owned()]);
    let mut orch = Orchestrator::new(cfg, ScriptedLauncher::default());
    let err = orch.run().unwrap_err();
    assert!(matches!(err, SpinloopError::Build(_)), "{err}");
    assert!(!orch.trail().contains(&OrchestratorState::LaunchingRenderHost));
}

#[test]
fn serve_step_scrapes_the_port_into_the_page_url() {
    let (mut cfg, _) = workspace("serve");
    cfg.orchestrator.serve = Some(ServeConfig {
        argv: vec![
            "sh".to_owned(),
            "-c".to_owned(),
            "echo 'Serving HTTP on 127.0.0.1 port 41234'; sleep 30".to_owned(),
        ],
        ..ServeConfig::default()
    });
    let launcher = ScriptedLauncher {
        script: delivered_events(b"abc"),
        ..ScriptedLauncher::default()
    };
    let sent = Arc::clone(&launcher.sent);
    Orchestrator::new(cfg, launcher).run().unwrap();
    assert_eq!(
        sent.lock().unwrap()[0],
        HostCommand::Navigate {
            url: "http://127.0.0.1:41234/record".to_owned()
        }
    );
}

#[test]
fn direct_save_is_verified_not_rewritten() {
    let (_, out) = workspace("direct_save");
    let saved = out.parent().unwrap().join("host-saved.webm");
    std::fs::write(&saved, b"12345").unwrap();
    let notice = DeliveryNotice {
        completed: true,
        size: 5,
        mime_type: "video/webm".to_owned(),
        payload: None,
        saved_path: Some(saved.clone()),
    };
    assert_eq!(persist_artifact(&notice, &out, "turntable").unwrap(), saved);
    assert!(files_in(&out).is_empty());

    let wrong = DeliveryNotice { size: 6, ..notice };
    assert!(persist_artifact(&wrong, &out, "turntable").is_err());
}
