use super::*;

const QUAD: &str = "\
# unit quad
v 0 0 0
v 2 0 0
v 2 2 0
v 0 2 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

#[test]
fn quad_is_fan_triangulated_and_normalized() {
    let mesh = Mesh::parse_obj(QUAD).unwrap();
    assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
    for p in &mesh.positions {
        let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        assert!((r - 1.0).abs() < 1e-12);
    }
}

#[test]
fn negative_indices_are_relative() {
    let mesh = Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
    assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
}

#[test]
fn malformed_obj_is_rejected() {
    assert!(Mesh::parse_obj("v 0 0\n").is_err());
    assert!(Mesh::parse_obj("v 0 0 0\nv 1 0 0\nf 1 2\n").is_err());
    assert!(Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n").is_err());
    assert!(Mesh::parse_obj("v 0 0 0\n").is_err());
    assert!(Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n").is_err());
}

#[test]
fn environment_defaults_and_validation() {
    let env = Environment::parse_json(b"{}").unwrap();
    assert_eq!(env, Environment::default());
    let l = env.light_unit();
    assert!(((l[0] * l[0] + l[1] * l[1] + l[2] * l[2]).sqrt() - 1.0).abs() < 1e-12);

    assert!(Environment::parse_json(br#"{ "ambient": 2.0 }"#).is_err());
    assert!(Environment::parse_json(br#"{ "light_dir": [0, 0, 0] }"#).is_err());
    assert!(Environment::parse_json(b"not json").is_err());
}

#[test]
fn obj_bytes_must_be_utf8() {
    assert!(Mesh::parse_obj_bytes(&[0xff, 0xfe, b'v']).is_err());
    let mesh = Mesh::parse_obj_bytes(b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
    assert_eq!(mesh.triangles.len(), 1);
}
