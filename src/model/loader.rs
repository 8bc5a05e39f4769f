//! glTF model loader.
//!
//! Loads `.gltf`/`.glb` files into a [`ModelSubgraph`]:
//! - one scene-graph node per glTF node, keeping its local transform
//! - one mesh child per triangle primitive, colored by the material's base color
//!
//! Loading is fire-and-forget: [`spawn_load`] returns a [`PendingModel`] that the
//! frame loop polls at frame boundaries.

use std::sync::mpsc::{self, Receiver, TryRecvError};

use glam::{Quat, Vec3};

use crate::model::scene::{MeshNode, ModelSubgraph, NodeKind, SceneNode};
use crate::utils::{compute_normals, Mesh, Vertex};

/// Error type for model loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to parse glTF: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("fetching {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("unsupported buffer source: {0}")]
    UnsupportedBuffer(String),

    #[error("missing data for buffer {0}")]
    MissingBuffer(usize),

    #[error("missing position data for mesh: {0}")]
    MissingPositions(String),

    #[error("glTF file contains no scene")]
    NoScene,

    #[error("model loader stopped before delivering a result")]
    Disconnected,
}

pub type LoadResult = Result<ModelSubgraph, LoadError>;

/// Handle to a model load in flight
pub struct PendingModel {
    url: String,
    rx: Receiver<LoadResult>,
}

impl PendingModel {
    /// A handle that is already complete
    pub fn ready(url: impl Into<String>, result: LoadResult) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(result);
        Self { url: url.into(), rx }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Non-blocking check for the load result
    pub fn poll(&mut self) -> Option<LoadResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(LoadError::Disconnected)),
        }
    }
}

/// Start loading `url` in the background
pub fn spawn_load(url: &str) -> PendingModel {
    let (tx, rx) = mpsc::channel();
    let target = url.to_string();
    tracing::info!(url = %target, "loading model");

    #[cfg(target_arch = "wasm32")]
    wasm_bindgen_futures::spawn_local(async move {
        let _ = tx.send(web::fetch_model(&target).await);
    });

    #[cfg(not(target_arch = "wasm32"))]
    std::thread::spawn(move || {
        let _ = tx.send(load_path(&target));
    });

    PendingModel { url: url.to_string(), rx }
}

/// Read a model from disk, resolving external buffers next to it. Images
/// are never decoded.
#[cfg(not(target_arch = "wasm32"))]
pub fn load_path(path: &str) -> LoadResult {
    let gltf::Gltf { document, blob } = gltf::Gltf::open(path)?;
    let base = std::path::Path::new(path).parent();
    let buffers: Vec<Vec<u8>> = gltf::import_buffers(&document, base, blob)?
        .into_iter()
        .map(|data| data.0)
        .collect();
    build_subgraph(&document, &buffers, model_name(path))
}

/// Convert a parsed glTF document into scene nodes
pub fn build_subgraph(document: &gltf::Document, buffers: &[Vec<u8>], name: &str) -> LoadResult {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(LoadError::NoScene)?;

    let mut root = SceneNode::group(name);
    for node in scene.nodes() {
        root.children.push(convert_node(&node, buffers)?);
    }

    let model = ModelSubgraph { root };
    tracing::info!(model = name, meshes = model.mesh_count(), "model parsed");
    Ok(model)
}

fn convert_node(node: &gltf::Node, buffers: &[Vec<u8>]) -> Result<SceneNode, LoadError> {
    let name = node
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node_{}", node.index()));
    let mut out = SceneNode::group(name);

    let (translation, rotation, scale) = node.transform().decomposed();
    out.translation = Vec3::from(translation);
    out.rotation = Quat::from_array(rotation);
    out.scale = Vec3::from(scale);

    if let Some(mesh) = node.mesh() {
        let mesh_name = mesh
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh_{}", mesh.index()));

        for (i, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                tracing::debug!(mesh = %mesh_name, primitive = i, "skipping non-triangle primitive");
                continue;
            }
            let data = extract_primitive(&primitive, buffers, &mesh_name)?;
            out.children.push(SceneNode::new(
                format!("{mesh_name}_{i}"),
                NodeKind::Mesh(MeshNode { mesh: data, cast_shadow: false, receive_shadow: false }),
            ));
        }
    }

    for child in node.children() {
        out.children.push(convert_node(&child, buffers)?);
    }

    Ok(out)
}

fn extract_primitive(
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    mesh_name: &str,
) -> Result<Mesh, LoadError> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.as_slice()));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| LoadError::MissingPositions(mesh_name.to_string()))?
        .collect();

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };

    let normals: Vec<[f32; 3]> = match reader.read_normals() {
        Some(normals) => normals.collect(),
        None => compute_normals(&positions, &indices),
    };

    let base = primitive.material().pbr_metallic_roughness().base_color_factor();
    let vertex_colors: Option<Vec<[f32; 4]>> = reader.read_colors(0).map(|c| c.into_rgba_f32().collect());

    let vertices = positions
        .iter()
        .enumerate()
        .map(|(i, pos)| {
            let tint = vertex_colors
                .as_ref()
                .and_then(|c| c.get(i))
                .copied()
                .unwrap_or([1.0; 4]);
            Vertex {
                pos: *pos,
                normal: normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                color: [base[0] * tint[0], base[1] * tint[1], base[2] * tint[2], base[3] * tint[3]],
            }
        })
        .collect();

    Ok(Mesh { vertices, indices })
}

/// Resolve a buffer URI relative to the model URL
pub fn resolve_uri(model_url: &str, uri: &str) -> String {
    if uri.contains("://") || uri.starts_with('/') {
        return uri.to_string();
    }
    match model_url.rfind('/') {
        Some(idx) => format!("{}{}", &model_url[..=idx], uri),
        None => uri.to_string(),
    }
}

/// File stem of the model URL, used as the root node name
pub fn model_name(url: &str) -> &str {
    let file = url.rsplit('/').next().unwrap_or(url);
    file.split('.').next().filter(|s| !s.is_empty()).unwrap_or("model")
}

#[cfg(target_arch = "wasm32")]
mod web {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::Response;

    use super::{build_subgraph, model_name, resolve_uri, LoadError, LoadResult};

    /// Fetch a `.gltf` (with external buffers) or `.glb` over HTTP
    pub async fn fetch_model(url: &str) -> LoadResult {
        let bytes = fetch_bytes(url).await?;
        let gltf = gltf::Gltf::from_slice(&bytes)?;

        let mut buffers = Vec::new();
        for buffer in gltf.document.buffers() {
            let data = match buffer.source() {
                gltf::buffer::Source::Bin => gltf
                    .blob
                    .clone()
                    .ok_or(LoadError::MissingBuffer(buffer.index()))?,
                gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                    return Err(LoadError::UnsupportedBuffer("embedded data URI".to_string()));
                }
                gltf::buffer::Source::Uri(uri) => fetch_bytes(&resolve_uri(url, uri)).await?,
            };
            buffers.push(data);
        }

        build_subgraph(&gltf.document, &buffers, model_name(url))
    }

    async fn fetch_bytes(url: &str) -> Result<Vec<u8>, LoadError> {
        let fetch_err = |e: wasm_bindgen::JsValue| LoadError::Fetch {
            url: url.to_string(),
            reason: format!("{e:?}"),
        };

        let window = web_sys::window().ok_or_else(|| LoadError::Fetch {
            url: url.to_string(),
            reason: "no global `window`".to_string(),
        })?;
        let response: Response = JsFuture::from(window.fetch_with_str(url))
            .await
            .map_err(fetch_err)?
            .dyn_into()
            .map_err(fetch_err)?;
        if !response.ok() {
            return Err(LoadError::Http { url: url.to_string(), status: response.status() });
        }

        let body = JsFuture::from(response.array_buffer().map_err(fetch_err)?)
            .await
            .map_err(fetch_err)?;
        Ok(js_sys::Uint8Array::new(&body).to_vec())
    }
}
