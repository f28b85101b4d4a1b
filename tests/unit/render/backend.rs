use super::*;

#[test]
fn cpu_is_the_default_backend() {
    assert_eq!(BackendKind::default(), BackendKind::Cpu);
    assert!(BackendKind::Cpu.is_available());
}

#[test]
fn backend_kind_uses_lowercase_names() {
    let kind: BackendKind = serde_json::from_str("\"gpu\"").unwrap();
    assert_eq!(kind, BackendKind::Gpu);
    assert_eq!(serde_json::to_string(&BackendKind::Cpu).unwrap(), "\"cpu\"");
    assert_eq!(BackendKind::Gpu.as_str(), "gpu");
}

#[test]
fn create_backend_builds_a_cpu_renderer() {
    let canvas = Canvas {
        width: 16,
        height: 8,
    };
    let backend = create_backend(BackendKind::Cpu, canvas, 10.0).unwrap();
    assert_eq!(backend.canvas(), canvas);
}

#[test]
fn create_backend_rejects_bad_canvas() {
    let canvas = Canvas {
        width: 15,
        height: 8,
    };
    assert!(create_backend(BackendKind::Cpu, canvas, 0.0).is_err());
}

#[cfg(not(feature = "gpu"))]
#[test]
fn gpu_backend_needs_the_feature() {
    assert!(!BackendKind::Gpu.is_available());
    let err = create_backend(BackendKind::Gpu, Canvas { width: 16, height: 16 }, 0.0)
        .err()
        .unwrap();
    assert!(err.to_string().contains("gpu"));
}
