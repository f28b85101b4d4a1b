//! Scene resources: a triangle mesh (Wavefront OBJ subset) and a studio environment.

use crate::foundation::core::Rgba8;
use crate::foundation::error::{SpinloopError, SpinloopResult};

/// Triangle mesh normalized to fit the unit sphere around the origin.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f64; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn parse_obj_bytes(bytes: &[u8]) -> SpinloopResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SpinloopError::asset(format!("mesh is not valid utf-8: {e}")))?;
        Self::parse_obj(text)
    }

    /// Parse `v` and `f` records; everything else (normals, uvs, groups, materials) is ignored.
    ///
    /// Faces with more than three vertices are fan-triangulated. Indices may be negative
    /// (relative to the end of the vertex list) and may carry `/vt/vn` suffixes.
    pub fn parse_obj(text: &str) -> SpinloopResult<Self> {
        let mut positions = Vec::new();
        let mut triangles = Vec::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("v") => {
                    let mut xyz = [0.0f64; 3];
                    for c in &mut xyz {
                        *c = parts
                            .next()
                            .and_then(|s| s.parse::<f64>().ok())
                            .filter(|v| v.is_finite())
                            .ok_or_else(|| {
                                SpinloopError::asset(format!(
                                    "obj line {}: malformed vertex",
                                    line_no + 1
                                ))
                            })?;
                    }
                    positions.push(xyz);
                }
                Some("f") => {
                    let idx = parts
                        .map(|tok| resolve_index(tok, positions.len(), line_no + 1))
                        .collect::<SpinloopResult<Vec<u32>>>()?;
                    if idx.len() < 3 {
                        return Err(SpinloopError::asset(format!(
                            "obj line {}: face needs at least 3 vertices",
                            line_no + 1
                        )));
                    }
                    for i in 1..idx.len() - 1 {
                        triangles.push([idx[0], idx[i], idx[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if triangles.is_empty() {
            return Err(SpinloopError::asset("obj contains no faces"));
        }

        let mut mesh = Self {
            positions,
            triangles,
        };
        mesh.normalize();
        Ok(mesh)
    }

    /// Center on the bounding-box midpoint and scale so the farthest vertex sits at radius 1.
    fn normalize(&mut self) {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for p in &self.positions {
            for k in 0..3 {
                lo[k] = lo[k].min(p[k]);
                hi[k] = hi[k].max(p[k]);
            }
        }
        let center = [
            (lo[0] + hi[0]) * 0.5,
            (lo[1] + hi[1]) * 0.5,
            (lo[2] + hi[2]) * 0.5,
        ];
        let mut radius = 0.0f64;
        for p in &mut self.positions {
            for k in 0..3 {
                p[k] -= center[k];
            }
            radius = radius.max((p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt());
        }
        if radius > 0.0 {
            for p in &mut self.positions {
                for c in p.iter_mut() {
                    *c /= radius;
                }
            }
        }
    }
}

fn resolve_index(token: &str, vertex_count: usize, line_no: usize) -> SpinloopResult<u32> {
    let head = token.split('/').next().unwrap_or("");
    let raw: i64 = head.parse().map_err(|_| {
        SpinloopError::asset(format!("obj line {line_no}: bad face index '{token}'"))
    })?;
    let resolved = match raw {
        0 => None,
        r if r > 0 => Some(r - 1),
        r => Some(vertex_count as i64 + r),
    };
    resolved
        .filter(|&i| i >= 0 && (i as usize) < vertex_count)
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| {
            SpinloopError::asset(format!(
                "obj line {line_no}: face index '{token}' out of range"
            ))
        })
}

/// Studio lighting for the turntable. Light direction is fixed in camera space.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Environment {
    pub background: Rgba8,
    pub base_color: [u8; 3],
    pub light_dir: [f64; 3],
    pub ambient: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            background: Rgba8([18, 20, 28, 255]),
            base_color: [200, 170, 120],
            light_dir: [-0.4, 0.6, 1.0],
            ambient: 0.25,
        }
    }
}

impl Environment {
    pub fn parse_json(bytes: &[u8]) -> SpinloopResult<Self> {
        let env: Self = serde_json::from_slice(bytes)?;
        env.validate()?;
        Ok(env)
    }

    pub fn validate(&self) -> SpinloopResult<()> {
        if !(0.0..=1.0).contains(&self.ambient) {
            return Err(SpinloopError::asset("environment ambient must be in [0, 1]"));
        }
        let [x, y, z] = self.light_dir;
        let len = (x * x + y * y + z * z).sqrt();
        if !len.is_finite() || len == 0.0 {
            return Err(SpinloopError::asset(
                "environment light_dir must be a non-zero vector",
            ));
        }
        Ok(())
    }

    pub fn light_unit(&self) -> [f64; 3] {
        let [x, y, z] = self.light_dir;
        let len = (x * x + y * y + z * z).sqrt();
        [x / len, y / len, z / len]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/mesh.rs"]
mod tests;
