use glam::{Mat4, Quat, Vec3};

use crate::config::ViewerConfig;
use crate::controller::xr_input::CONTROLLER_COUNT;
use crate::utils::{create_controller_mesh, create_ground_mesh, Mesh};

#[derive(Debug, Clone)]
pub struct MeshNode {
    pub mesh: Mesh,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Spot light; its position is the owning node's translation
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub color: Vec3,
    pub intensity: f32,
    pub distance: f32,
    pub angle: f32,
    pub penumbra: f32,
    pub decay: f32,
    pub target: Vec3,
    pub cast_shadow: bool,
    pub shadow_bias: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Ambient(AmbientLight),
    Spot(SpotLight),
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(MeshNode),
    Light(Light),
    /// Grip-space anchor for XR controller `n`; posed every frame
    ControllerGrip(usize),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub visible: bool,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            visible: true,
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn set_matrix(&mut self, matrix: Mat4) {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        self.scale = scale;
        self.rotation = rotation;
        self.translation = translation;
    }

    /// Depth-first walk over this node and its descendants
    pub fn traverse_mut(&mut self, f: &mut impl FnMut(&mut SceneNode)) {
        f(self);
        for child in &mut self.children {
            child.traverse_mut(f);
        }
    }

    pub fn visit(&self, f: &mut impl FnMut(&SceneNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    fn collect_meshes<'a>(&'a self, parent: Mat4, parent_visible: bool, out: &mut Vec<MeshInstance<'a>>) {
        let world = parent * self.local_matrix();
        let visible = parent_visible && self.visible;
        if let NodeKind::Mesh(mesh) = &self.kind {
            out.push(MeshInstance { node: mesh, world, visible });
        }
        for child in &self.children {
            child.collect_meshes(world, visible, out);
        }
    }
}

/// A mesh together with its resolved world transform
pub struct MeshInstance<'a> {
    pub node: &'a MeshNode,
    pub world: Mat4,
    pub visible: bool,
}

/// A parsed model, not yet part of any scene
#[derive(Debug, Clone)]
pub struct ModelSubgraph {
    pub root: SceneNode,
}

impl ModelSubgraph {
    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.root.visit(&mut |n| {
            if matches!(n.kind, NodeKind::Mesh(_)) {
                count += 1;
            }
        });
        count
    }
}

/// Flat list of top-level nodes. Nodes are only ever added.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    revision: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: SceneNode) {
        self.nodes.push(node);
        self.revision += 1;
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    /// Bumped whenever nodes are added; renderers use it to refresh GPU meshes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Mesh nodes in a stable depth-first order, including hidden ones
    pub fn mesh_instances(&self) -> Vec<MeshInstance<'_>> {
        let mut out = Vec::new();
        for node in &self.nodes {
            node.collect_meshes(Mat4::IDENTITY, true, &mut out);
        }
        out
    }

    /// Lights with their world-space positions
    pub fn lights(&self) -> impl Iterator<Item = (&Light, Vec3)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Light(light) if n.visible => Some((light, n.translation)),
            _ => None,
        })
    }

    /// Place the grip visual of controller `index`; `None` hides it
    pub fn set_grip_pose(&mut self, index: usize, pose: Option<Mat4>) {
        for node in &mut self.nodes {
            if let NodeKind::ControllerGrip(i) = node.kind {
                if i == index {
                    match pose {
                        Some(m) => {
                            node.set_matrix(m);
                            node.visible = true;
                        }
                        None => node.visible = false,
                    }
                }
            }
        }
    }
}

/// Build the showroom: ground, lights and controller grips. The car itself
/// arrives later through [`merge_model`].
pub fn build_scene(config: &ViewerConfig) -> SceneGraph {
    let mut scene = SceneGraph::new();

    let ground = create_ground_mesh(config.ground.size, config.ground.segments, config.ground.color);
    scene.add(SceneNode::new(
        "ground",
        NodeKind::Mesh(MeshNode { mesh: ground, cast_shadow: false, receive_shadow: true }),
    ));

    for (i, spot) in config.spot_lights.iter().enumerate() {
        let light = SpotLight {
            color: spot.color,
            intensity: spot.intensity,
            distance: spot.distance,
            angle: spot.angle,
            penumbra: spot.penumbra,
            decay: spot.decay,
            target: spot.target,
            cast_shadow: spot.cast_shadow,
            shadow_bias: spot.shadow_bias,
        };
        scene.add(
            SceneNode::new(format!("spot_light_{i}"), NodeKind::Light(Light::Spot(light)))
                .with_translation(spot.position),
        );
    }

    for (i, ambient) in config.ambient_lights.iter().enumerate() {
        let light = AmbientLight { color: ambient.color, intensity: ambient.intensity };
        scene.add(SceneNode::new(format!("ambient_light_{i}"), NodeKind::Light(Light::Ambient(light))));
    }

    for index in 0..CONTROLLER_COUNT {
        let model = SceneNode::new(
            format!("controller_model_{index}"),
            NodeKind::Mesh(MeshNode { mesh: create_controller_mesh(), cast_shadow: false, receive_shadow: false }),
        );
        let mut grip = SceneNode::new(format!("controller_grip_{index}"), NodeKind::ControllerGrip(index))
            .with_child(model);
        grip.visible = false;
        scene.add(grip);
    }

    scene
}

/// Insert a loaded model: every mesh casts and receives shadows and the root
/// sits at the origin.
pub fn merge_model(mut scene: SceneGraph, model: ModelSubgraph) -> SceneGraph {
    let mut root = model.root;
    root.traverse_mut(&mut |node| {
        if let NodeKind::Mesh(mesh) = &mut node.kind {
            mesh.cast_shadow = true;
            mesh.receive_shadow = true;
        }
    });
    root.translation = Vec3::ZERO;
    scene.add(root);
    scene
}
