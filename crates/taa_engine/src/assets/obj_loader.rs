//! OBJ file loader for 3D models

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::assets::AssetError;
use crate::render::{Mesh, Vertex};

const DEFAULT_NORMAL: [f32; 3] = [0.0, 1.0, 0.0];
const DEFAULT_TEX_COORD: [f32; 2] = [0.0, 0.0];

/// Wavefront OBJ parser
pub struct ObjLoader;

impl ObjLoader {
    /// Load an OBJ file and return a mesh
    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<Mesh, AssetError> {
        let path = path.as_ref();
        log::debug!("Loading mesh from: {:?}", path);
        let file = File::open(path)?;
        let mesh = Self::parse(BufReader::new(file))?;
        log::info!(
            "Loaded mesh with {} triangles from {:?}",
            mesh.triangle_count(),
            path
        );
        Ok(mesh)
    }

    /// Parse OBJ text from any reader
    ///
    /// Polygons are fan-triangulated. Texture V is flipped so image row 0 is
    /// the top of the texture.
    pub fn parse<R: BufRead>(reader: R) -> Result<Mesh, AssetError> {
        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut normals: Vec<[f32; 3]> = Vec::new();
        let mut tex_coords: Vec<[f32; 2]> = Vec::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let args: Vec<&str> = parts.collect();

            match keyword {
                "v" => positions.push(parse_floats::<3>(&args, line_no, "vertex")?),
                "vn" => normals.push(parse_floats::<3>(&args, line_no, "normal")?),
                "vt" => {
                    let [u, v] = parse_floats::<2>(&args, line_no, "texture coordinate")?;
                    tex_coords.push([u, 1.0 - v]);
                }
                "f" => {
                    if args.len() < 3 {
                        return Err(AssetError::InvalidFormat(format!(
                            "line {}: face needs at least 3 vertices",
                            line_no + 1
                        )));
                    }

                    let first = vertices.len() as u32;
                    for corner in &args {
                        let mut refs = corner.split('/');
                        let position = refs
                            .next()
                            .and_then(|r| resolve_index(r, positions.len()))
                            .and_then(|i| positions.get(i))
                            .ok_or_else(|| {
                                AssetError::InvalidFormat(format!(
                                    "line {}: bad position reference '{}'",
                                    line_no + 1,
                                    corner
                                ))
                            })?;
                        let tex_coord = refs
                            .next()
                            .and_then(|r| resolve_index(r, tex_coords.len()))
                            .and_then(|i| tex_coords.get(i))
                            .copied()
                            .unwrap_or(DEFAULT_TEX_COORD);
                        let normal = refs
                            .next()
                            .and_then(|r| resolve_index(r, normals.len()))
                            .and_then(|i| normals.get(i))
                            .copied()
                            .unwrap_or(DEFAULT_NORMAL);

                        vertices.push(Vertex::new(*position, normal, tex_coord));
                    }

                    for i in 1..(args.len() as u32 - 1) {
                        indices.extend_from_slice(&[first, first + i, first + i + 1]);
                    }
                }
                _ => {}
            }
        }

        if vertices.is_empty() {
            return Err(AssetError::InvalidFormat("No faces found in OBJ data".to_string()));
        }

        Ok(Mesh::new(vertices, indices))
    }
}

fn parse_floats<const N: usize>(args: &[&str], line_no: usize, what: &str) -> Result<[f32; N], AssetError> {
    if args.len() < N {
        return Err(AssetError::Parse(format!(
            "line {}: {} needs {} components",
            line_no + 1,
            what,
            N
        )));
    }
    let mut out = [0.0; N];
    for (slot, text) in out.iter_mut().zip(args) {
        *slot = text.parse().map_err(|_| {
            AssetError::Parse(format!("line {}: invalid {} component '{}'", line_no + 1, what, text))
        })?;
    }
    Ok(out)
}

/// Convert a 1-based (or negative, relative) OBJ reference to a 0-based index
fn resolve_index(text: &str, len: usize) -> Option<usize> {
    if text.is_empty() {
        return None;
    }
    let value: i64 = text.parse().ok()?;
    match value {
        v if v > 0 => Some(v as usize - 1),
        v if v < 0 => len.checked_sub(v.unsigned_abs() as usize),
        _ => None,
    }
}
