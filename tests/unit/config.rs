use super::*;

#[test]
fn defaults_validate_and_close_the_loop() {
    let cfg = SpinloopConfig::default();
    cfg.validate().unwrap();
    // 1257 frames at 60 fps = 20.95 s against a 20.94 s revolution.
    let err = cfg.scene.loop_closure_error_frames();
    assert!(err.abs() <= 1.0, "closure error {err}");
    assert!((cfg.scene.recording_secs() - 20.95).abs() < 1e-9);
}

#[test]
fn empty_object_yields_defaults() {
    let cfg = SpinloopConfig::from_json("{}").unwrap();
    assert_eq!(cfg, SpinloopConfig::default());
}

#[test]
fn partial_file_overrides_fields() {
    let cfg = SpinloopConfig::from_json(
        r#"{
            "scene": { "seconds_per_revolution": 2.0, "fps": { "num": 30, "den": 1 }, "target_frame_count": 60 },
            "orchestrator": { "serve": null, "timeouts": { "delivery_ms": 1000 } }
        }"#,
    )
    .unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.scene.target_frame_count, 60);
    assert!(cfg.orchestrator.serve.is_none());
    assert_eq!(cfg.orchestrator.timeouts.delivery(), Duration::from_secs(1));
    assert_eq!(cfg.orchestrator.timeouts.listen_ms, 30_000);
}

#[test]
fn unknown_fields_are_rejected() {
    assert!(SpinloopConfig::from_json(r#"{ "scene": { "sconds_per_revolution": 1.0 } }"#).is_err());
}

#[test]
fn mismatched_frame_count_fails_closure_check() {
    let mut cfg = SpinloopConfig::default();
    cfg.scene.target_frame_count = 1200;
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("loop does not close"));
}

#[test]
fn scene_parameter_bounds() {
    let mut scene = SceneParams {
        seconds_per_revolution: 0.0,
        ..SceneParams::default()
    };
    assert!(scene.validate().is_err());

    scene = SceneParams {
        revolution_tolerance_deg: 0.0,
        ..SceneParams::default()
    };
    assert!(scene.validate().is_err());

    scene = SceneParams {
        delivery: DeliveryMode::DirectSave,
        save_path: None,
        ..SceneParams::default()
    };
    assert!(scene.validate().is_err());
}

#[test]
fn serve_pattern_needs_port_group() {
    let mut cfg = OrchestratorConfig::default();
    cfg.validate().unwrap();
    cfg.serve = Some(ServeConfig {
        listen_pattern: "listening".to_owned(),
        ..ServeConfig::default()
    });
    assert!(cfg.validate().is_err());
    cfg.serve = Some(ServeConfig {
        listen_pattern: "(".to_owned(),
        ..ServeConfig::default()
    });
    assert!(cfg.validate().is_err());
}

#[test]
fn tolerance_and_settle_are_converted() {
    let scene = SceneParams::default();
    assert!((scene.revolution_tolerance_rad() - 0.6f64.to_radians()).abs() < 1e-12);
    assert_eq!(scene.settle_delay(), Duration::from_millis(300));
}

#[test]
fn clock_mode_is_snake_case() {
    let cfg = SpinloopConfig::from_json(r#"{ "scene": { "clock": "fixed_step" } }"#).unwrap();
    assert_eq!(cfg.scene.clock, ClockMode::FixedStep);
    assert_eq!(SceneParams::default().clock, ClockMode::Realtime);
}

#[test]
fn plan_reports_closure() {
    let plan = SceneParams::default().plan();
    assert!(plan.loop_closes);
    assert_eq!(plan.target_frame_count, 1257);
    assert!((plan.closure_error_frames - 0.6).abs() < 1e-6);
    // 20.94 s at 60 fps is 1256.4 frames.
    assert_eq!(plan.frames_per_revolution, 1256);

    let open = SceneParams {
        target_frame_count: 1300,
        ..SceneParams::default()
    }
    .plan();
    assert!(!open.loop_closes);
}

#[test]
fn render_host_backend_defaults_to_cpu() {
    assert_eq!(
        SpinloopConfig::default().orchestrator.render_host.backend,
        BackendKind::Cpu
    );
    let cfg = SpinloopConfig::from_json(
        r#"{ "orchestrator": { "render_host": { "backend": "gpu" } } }"#,
    )
    .unwrap();
    assert_eq!(cfg.orchestrator.render_host.backend, BackendKind::Gpu);
}
