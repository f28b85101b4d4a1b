use super::*;
use crate::render::backend::BackendKind;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::current_dir()
        .unwrap()
        .join("target")
        .join("unit_render_host")
        .join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"#!/bin/sh\n").unwrap();
}

#[test]
fn env_override_wins_and_must_exist() {
    let dir = scratch("env");
    let pinned = dir.join("custom-host");
    touch(&pinned);
    let search = RenderHostSearch {
        env_override: Some(pinned.clone().into_os_string()),
        pinned: Some(dir.join("ignored")),
        ..RenderHostSearch::default()
    };
    assert_eq!(search.resolve().unwrap(), pinned);

    let missing = RenderHostSearch {
        env_override: Some(dir.join("nope").into_os_string()),
        ..RenderHostSearch::default()
    };
    let err = missing.resolve().unwrap_err();
    assert!(err.to_string().contains(RENDER_HOST_ENV));
}

#[test]
fn current_exe_is_used_only_when_it_is_spinloop() {
    let dir = scratch("exe");
    let exe = dir.join("spinloop");
    touch(&exe);
    let other = dir.join("spinloop-1234abcd");
    touch(&other);

    let search = RenderHostSearch {
        current_exe: Some(exe.clone()),
        ..RenderHostSearch::default()
    };
    assert_eq!(search.resolve().unwrap(), exe);

    let search = RenderHostSearch {
        current_exe: Some(other),
        ..RenderHostSearch::default()
    };
    assert!(search.resolve().is_err());
}

#[test]
fn install_dirs_then_path_are_searched() {
    let dir = scratch("dirs");
    let on_path = dir.join("path-bin").join("spinloop");
    touch(&on_path);
    let installed = dir.join("cargo-bin").join("spinloop");

    let search = RenderHostSearch {
        install_dirs: vec![dir.join("cargo-bin")],
        path_var: Some(std::env::join_paths([dir.join("path-bin")]).unwrap()),
        ..RenderHostSearch::default()
    };
    assert_eq!(search.resolve().unwrap(), on_path);

    touch(&installed);
    assert_eq!(search.resolve().unwrap(), installed);
}

#[test]
fn host_config_file_is_removed_on_drop() {
    let file = write_host_config(&SpinloopConfig::default()).unwrap();
    let path = file.path().to_path_buf();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("spinloop-host-") && name.ends_with(".json"), "{name}");
    let back: SpinloopConfig =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(back, SpinloopConfig::default());
    drop(file);
    assert!(!path.exists());
}

#[test]
fn concurrent_host_configs_get_distinct_files() {
    let a = write_host_config(&SpinloopConfig::default()).unwrap();
    let b = write_host_config(&SpinloopConfig::default()).unwrap();
    assert_ne!(a.path(), b.path());
}

#[test]
fn host_args_carry_config_backend_and_extras() {
    let mut cfg = SpinloopConfig::default();
    cfg.orchestrator.render_host.backend = BackendKind::Gpu;
    cfg.orchestrator.render_host.extra_args = vec!["--clock".to_owned(), "fixed-step".to_owned()];
    let launcher = ProcessHostLauncher::new(PathBuf::from("spinloop"), cfg);

    let args = launcher.host_args(Path::new("/tmp/host.json"));
    let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();
    assert_eq!(
        args,
        [
            "host",
            "--config",
            "/tmp/host.json",
            "--backend",
            "gpu",
            "--clock",
            "fixed-step"
        ]
    );
}

#[test]
fn cpu_backend_is_passed_by_default() {
    let launcher = ProcessHostLauncher::new(PathBuf::from("spinloop"), SpinloopConfig::default());
    let args = launcher.host_args(Path::new("cfg.json"));
    assert!(args.windows(2).any(|w| w[0] == "--backend" && w[1] == "cpu"));
}

#[test]
fn launching_a_missing_binary_is_a_launch_error() {
    let launcher = ProcessHostLauncher::new(
        PathBuf::from("/nonexistent/spinloop"),
        SpinloopConfig::default(),
    );
    let err = launcher.launch().err().unwrap();
    assert!(matches!(err, SpinloopError::Launch(_)), "{err}");
}
