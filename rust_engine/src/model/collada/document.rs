//! Collada document model
//!
//! The parts of a `.dae` file the mesh pipeline reads, lifted out of the
//! element tree: geometries (already split into render vertices), skin
//! controllers, the visual scene node tree and animation channels.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec2, Vec3};

use super::xml_tree::{local_ref, Element};
use crate::model::VertexBuffer;
use crate::{EngineError, Result};

/// Collada stores matrices row-major
pub(crate) fn matrix_from_row_major(values: &[f32]) -> Option<Mat4> {
    let array: [f32; 16] = values.get(..16)?.try_into().ok()?;
    Some(Mat4::from_cols_array(&array).transpose())
}

// ========== Sources ==========

#[derive(Clone, Debug, Default)]
struct Source {
    floats: Vec<f32>,
    names: Vec<String>,
    stride: usize,
}

impl Source {
    fn parse(elem: &Element) -> Result<Source> {
        let floats = match elem.child("float_array") {
            Some(array) => array.values::<f32>()?,
            None => Vec::new(),
        };
        let names = elem
            .child("Name_array")
            .or_else(|| elem.child("IDREF_array"))
            .map(Element::words)
            .unwrap_or_default();
        let stride = elem
            .child("technique_common")
            .and_then(|t| t.child("accessor"))
            .and_then(|a| a.attr("stride"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        Ok(Source { floats, names, stride: stride.max(1) })
    }

    fn element_count(&self) -> usize {
        self.floats.len() / self.stride
    }

    fn vec3(&self, index: usize) -> Option<Vec3> {
        let start = index * self.stride;
        let v = self.floats.get(start..start + 3)?;
        Some(Vec3::new(v[0], v[1], v[2]))
    }

    fn vec2(&self, index: usize) -> Option<Vec2> {
        let start = index * self.stride;
        let v = self.floats.get(start..start + 2)?;
        Some(Vec2::new(v[0], v[1]))
    }
}

fn parse_sources(parent: &Element) -> Result<HashMap<String, Source>> {
    let mut sources = HashMap::new();
    for elem in parent.children_named("source") {
        if let Some(id) = elem.attr("id") {
            sources.insert(id.to_owned(), Source::parse(elem)?);
        }
    }
    Ok(sources)
}

/// `<input>` of a primitive, joint list or sampler
#[derive(Clone, Debug)]
struct Input {
    semantic: String,
    source: String,
    offset: usize,
    set: usize,
}

fn parse_inputs(parent: &Element) -> Vec<Input> {
    parent
        .children_named("input")
        .filter_map(|input| {
            Some(Input {
                semantic: input.attr("semantic")?.to_owned(),
                source: local_ref(input.attr("source")?).to_owned(),
                offset: input.attr("offset").and_then(|o| o.parse().ok()).unwrap_or(0),
                set: input.attr("set").and_then(|s| s.parse().ok()).unwrap_or(0),
            })
        })
        .collect()
}

// ========== Geometry ==========

#[derive(Clone, Debug, Default)]
pub(crate) struct Geometry {
    pub id: String,
    pub name: String,
    pub material: String,
    pub vertex_buffer: VertexBuffer,
    /// Source position index -> render vertices split from it
    pub position_map: Vec<Vec<u32>>,
}

impl Geometry {
    fn parse(elem: &Element) -> Result<Option<Geometry>> {
        let id = elem.attr("id").unwrap_or_default().to_owned();
        let Some(mesh) = elem.child("mesh") else {
            log::warn!("Geometry '{}' has no <mesh>, skipped", id);
            return Ok(None);
        };
        let sources = parse_sources(mesh)?;

        // <vertices> maps its id to the position (and maybe normal/uv) sources
        let vertices = mesh.child("vertices");
        let vertices_id = vertices.and_then(|v| v.attr("id")).unwrap_or_default();
        let vertex_inputs = vertices.map(parse_inputs).unwrap_or_default();
        let from_vertices = |semantic: &str| {
            vertex_inputs
                .iter()
                .find(|i| i.semantic == semantic)
                .map(|i| i.source.clone())
        };

        let Some(position_id) = from_vertices("POSITION") else {
            log::warn!("Geometry '{}' has no POSITION input, skipped", id);
            return Ok(None);
        };
        let positions = sources.get(&position_id).ok_or_else(|| {
            EngineError::Collada(format!("geometry '{}': missing source '{}'", id, position_id))
        })?;

        let mut corners: Vec<(usize, Option<usize>, Option<usize>)> = Vec::new();
        let mut normal_source: Option<&Source> = None;
        let mut uv_source: Option<&Source> = None;
        let mut material = String::new();

        for prim in &mesh.children {
            match prim.name.as_str() {
                "triangles" | "polylist" => {}
                "source" | "vertices" | "extra" => continue,
                other => {
                    log::warn!("Geometry '{}': unsupported primitive <{}> skipped", id, other);
                    continue;
                }
            }
            if prim.name == "polylist" {
                let vcount: Vec<usize> = prim.child("vcount").map(|v| v.values()).transpose()?.unwrap_or_default();
                if vcount.iter().any(|&n| n != 3) {
                    log::warn!("Geometry '{}': polylist with non-triangles skipped", id);
                    continue;
                }
            }
            if material.is_empty() {
                material = prim.attr("material").unwrap_or_default().to_owned();
            }

            let inputs = parse_inputs(prim);
            let stride = inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1);
            let p: Vec<usize> = match prim.child("p") {
                Some(p) => p.values()?,
                None => continue,
            };

            let mut vertex_offset = None;
            let mut normal_offset = None;
            let mut uv_offset = None;
            for input in &inputs {
                match input.semantic.as_str() {
                    "VERTEX" if input.source == vertices_id => vertex_offset = Some(input.offset),
                    "NORMAL" => {
                        normal_offset = Some(input.offset);
                        normal_source = sources.get(&input.source);
                    }
                    "TEXCOORD" if uv_offset.is_none() || input.set == 0 => {
                        uv_offset = Some(input.offset);
                        uv_source = sources.get(&input.source);
                    }
                    _ => {}
                }
            }
            let Some(vertex_offset) = vertex_offset else {
                log::warn!("Geometry '{}': primitive without VERTEX input skipped", id);
                continue;
            };

            // Normals and uvs listed under <vertices> share the position index
            if normal_offset.is_none() {
                if let Some(src) = from_vertices("NORMAL") {
                    normal_source = sources.get(&src);
                }
            }
            if uv_offset.is_none() {
                if let Some(src) = from_vertices("TEXCOORD") {
                    uv_source = sources.get(&src);
                }
            }

            for corner in p.chunks_exact(stride) {
                let pos = corner[vertex_offset];
                let normal = match normal_offset {
                    Some(o) => Some(corner[o]),
                    None => normal_source.map(|_| pos),
                };
                let uv = match uv_offset {
                    Some(o) => Some(corner[o]),
                    None => uv_source.map(|_| pos),
                };
                corners.push((pos, normal, uv));
            }
        }

        let (vertex_buffer, position_map) =
            split_vertices(&id, &corners, positions, normal_source, uv_source)?;

        Ok(Some(Geometry {
            name: elem.attr("name").unwrap_or_default().to_owned(),
            id,
            material,
            vertex_buffer,
            position_map,
        }))
    }
}

/// One render vertex per unique (position, normal, uv) index tuple
fn split_vertices(
    id: &str,
    corners: &[(usize, Option<usize>, Option<usize>)],
    positions: &Source,
    normals: Option<&Source>,
    uvs: Option<&Source>,
) -> Result<(VertexBuffer, Vec<Vec<u32>>)> {
    let mut vb = VertexBuffer::new();
    let mut position_map = vec![Vec::new(); positions.element_count()];
    let mut seen: HashMap<(usize, Option<usize>, Option<usize>), u32> = HashMap::new();
    let out_of_range = |what: &str, index: usize| {
        EngineError::Collada(format!("geometry '{}': {} index {} out of range", id, what, index))
    };

    for &key in corners {
        let (pos, normal, uv) = key;
        let index = match seen.get(&key) {
            Some(&index) => index,
            None => {
                let index = vb.positions.len() as u32;
                vb.positions.push(positions.vec3(pos).ok_or_else(|| out_of_range("position", pos))?);
                vb.normals.push(match (normal, normals) {
                    (Some(n), Some(src)) => src.vec3(n).ok_or_else(|| out_of_range("normal", n))?,
                    _ => Vec3::ZERO,
                });
                vb.uvs.push(match (uv, uvs) {
                    (Some(t), Some(src)) => src.vec2(t).ok_or_else(|| out_of_range("texcoord", t))?,
                    _ => Vec2::ZERO,
                });
                position_map[pos].push(index);
                seen.insert(key, index);
                index
            }
        };
        vb.indices.push(index);
    }

    if normals.is_none() {
        smooth_normals(&mut vb);
    }
    Ok((vb, position_map))
}

fn smooth_normals(vb: &mut VertexBuffer) {
    for tri in vb.indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let face = (vb.positions[b] - vb.positions[a]).cross(vb.positions[c] - vb.positions[a]);
        for i in [a, b, c] {
            vb.normals[i] += face;
        }
    }
    for n in &mut vb.normals {
        *n = n.normalize_or_zero();
    }
}

// ========== Controllers ==========

#[derive(Clone, Debug, Default)]
pub(crate) struct Controller {
    pub id: String,
    /// Geometry id, empty when unknown
    pub target: String,
    pub bind_shape: Mat4,
    pub joints: Vec<String>,
    pub inv_bind: Vec<Mat4>,
    /// Per source position: (joint, weight)
    pub influences: Vec<Vec<(usize, f32)>>,
}

impl Controller {
    fn parse(elem: &Element) -> Result<Option<Controller>> {
        let id = elem.attr("id").unwrap_or_default().to_owned();
        let Some(skin) = elem.child("skin") else {
            log::warn!("Controller '{}' has no <skin>, skipped", id);
            return Ok(None);
        };
        let sources = parse_sources(skin)?;
        let target = skin.attr("source").map(local_ref).unwrap_or_default().to_owned();

        let bind_shape = match skin.child("bind_shape_matrix") {
            Some(m) => matrix_from_row_major(&m.values::<f32>()?).ok_or_else(|| {
                EngineError::Collada(format!("controller '{}': bad bind_shape_matrix", id))
            })?,
            None => Mat4::IDENTITY,
        };

        // <joints>: names and inverse bind matrices
        let joint_inputs = skin.child("joints").map(parse_inputs).unwrap_or_default();
        let mut joints = Vec::new();
        let mut inv_bind = Vec::new();
        for input in &joint_inputs {
            let Some(src) = sources.get(&input.source) else {
                log::warn!("Controller '{}': missing source '{}'", id, input.source);
                continue;
            };
            match input.semantic.as_str() {
                "JOINT" => joints = src.names.clone(),
                "INV_BIND_MATRIX" => {
                    inv_bind = src.floats.chunks_exact(16).filter_map(matrix_from_row_major).collect()
                }
                _ => {}
            }
        }
        if joints.len() != inv_bind.len() {
            return Err(EngineError::Collada(format!(
                "controller '{}': {} joints but {} inverse bind matrices",
                id,
                joints.len(),
                inv_bind.len()
            )));
        }

        // <vertex_weights>: vcount influences per position, (joint, weight) index pairs in v
        let mut influences = Vec::new();
        if let Some(vw) = skin.child("vertex_weights") {
            let inputs = parse_inputs(vw);
            let stride = inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1);
            let joint_offset = inputs.iter().find(|i| i.semantic == "JOINT").map(|i| i.offset);
            let weight_input = inputs.iter().find(|i| i.semantic == "WEIGHT");
            let (Some(joint_offset), Some(weight_input)) = (joint_offset, weight_input) else {
                return Err(EngineError::Collada(format!(
                    "controller '{}': vertex_weights needs JOINT and WEIGHT inputs",
                    id
                )));
            };
            let weights = sources
                .get(&weight_input.source)
                .map(|s| s.floats.as_slice())
                .unwrap_or_default();

            let vcount: Vec<usize> = vw.child("vcount").map(|v| v.values()).transpose()?.unwrap_or_default();
            let v: Vec<i64> = vw.child("v").map(|v| v.values()).transpose()?.unwrap_or_default();

            let mut cursor = 0;
            for count in vcount {
                let mut list = Vec::with_capacity(count);
                for _ in 0..count {
                    let entry = v.get(cursor..cursor + stride).ok_or_else(|| {
                        EngineError::Collada(format!("controller '{}': <v> too short", id))
                    })?;
                    cursor += stride;

                    // -1 binds to the bind shape itself
                    let joint = entry[joint_offset];
                    let weight_index = entry[weight_input.offset];
                    if joint < 0 || weight_index < 0 {
                        continue;
                    }
                    let weight = weights.get(weight_index as usize).copied().unwrap_or(0.0);
                    list.push((joint as usize, weight));
                }
                influences.push(list);
            }
        }

        Ok(Some(Controller {
            id,
            target,
            bind_shape,
            joints,
            inv_bind,
            influences,
        }))
    }
}

// ========== Visual scene ==========

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransformKind {
    Translate,
    Rotate,
    Scale,
    Matrix,
}

#[derive(Clone, Debug)]
pub(crate) struct NodeTransform {
    pub sid: Option<String>,
    pub kind: TransformKind,
    pub values: Vec<f32>,
}

impl NodeTransform {
    fn parse(elem: &Element) -> Result<Option<NodeTransform>> {
        let (kind, len) = match elem.name.as_str() {
            "translate" => (TransformKind::Translate, 3),
            "rotate" => (TransformKind::Rotate, 4),
            "scale" => (TransformKind::Scale, 3),
            "matrix" => (TransformKind::Matrix, 16),
            _ => return Ok(None),
        };
        let values = elem.values::<f32>()?;
        if values.len() < len {
            return Err(EngineError::Collada(format!(
                "<{}> needs {} values, got {}",
                elem.name,
                len,
                values.len()
            )));
        }
        Ok(Some(NodeTransform {
            sid: elem.attr("sid").map(str::to_owned),
            kind,
            values,
        }))
    }

    pub fn matrix(&self) -> Mat4 {
        let v = &self.values;
        match self.kind {
            TransformKind::Translate => Mat4::from_translation(Vec3::new(v[0], v[1], v[2])),
            TransformKind::Scale => Mat4::from_scale(Vec3::new(v[0], v[1], v[2])),
            TransformKind::Rotate => {
                let axis = Vec3::new(v[0], v[1], v[2]).normalize_or_zero();
                if axis == Vec3::ZERO {
                    Mat4::IDENTITY
                } else {
                    Mat4::from_quat(Quat::from_axis_angle(axis, v[3].to_radians()))
                }
            }
            TransformKind::Matrix => matrix_from_row_major(v).unwrap_or(Mat4::IDENTITY),
        }
    }

    pub fn axis(&self) -> Vec3 {
        Vec3::new(self.values[0], self.values[1], self.values[2])
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SceneNode {
    pub id: String,
    pub name: String,
    pub sid: Option<String>,
    pub is_joint: bool,
    pub transforms: Vec<NodeTransform>,
    pub local: Mat4,
    pub world: Mat4,
    /// Ids of instanced geometries and controllers
    pub instances: Vec<String>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    fn parse(elem: &Element, parent_world: Mat4) -> Result<SceneNode> {
        let id = elem.attr("id").or_else(|| elem.attr("name")).unwrap_or_default().to_owned();
        let name = elem.attr("name").map(str::to_owned).unwrap_or_else(|| id.clone());

        let mut transforms = Vec::new();
        let mut instances = Vec::new();
        for child in &elem.children {
            match child.name.as_str() {
                "instance_geometry" | "instance_controller" => {
                    if let Some(url) = child.attr("url") {
                        instances.push(local_ref(url).to_owned());
                    }
                }
                "lookat" | "skew" => {
                    log::warn!("Node '{}': <{}> transform not supported", id, child.name);
                }
                _ => {
                    if let Some(t) = NodeTransform::parse(child)? {
                        transforms.push(t);
                    }
                }
            }
        }

        let local = transforms
            .iter()
            .fold(Mat4::IDENTITY, |acc, t| acc * t.matrix());
        let world = parent_world * local;

        let children = elem
            .children_named("node")
            .map(|c| SceneNode::parse(c, world))
            .collect::<Result<Vec<_>>>()?;

        Ok(SceneNode {
            id,
            name,
            sid: elem.attr("sid").map(str::to_owned),
            is_joint: elem.attr("type") == Some("JOINT"),
            transforms,
            local,
            world,
            instances,
            children,
        })
    }

    pub fn transform_by_sid(&self, sid: &str) -> Option<&NodeTransform> {
        self.transforms.iter().find(|t| t.sid.as_deref() == Some(sid))
    }

    pub fn scale(&self) -> Vec3 {
        self.local.to_scale_rotation_translation().0
    }

    fn find(&self, pred: &dyn Fn(&SceneNode) -> bool) -> Option<&SceneNode> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(pred))
    }
}

// ========== Animations ==========

/// One animated value of one node transform
#[derive(Clone, Debug, Default)]
pub(crate) struct Channel {
    pub target_node: String,
    pub target_sid: String,
    /// Lower-case member selector such as "x" or "angle"
    pub component: Option<String>,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
    /// Values per key
    pub stride: usize,
}

fn parse_animation(elem: &Element, out: &mut Vec<Channel>) -> Result<()> {
    let sources = parse_sources(elem)?;
    let samplers: HashMap<&str, Vec<Input>> = elem
        .children_named("sampler")
        .filter_map(|s| Some((s.attr("id")?, parse_inputs(s))))
        .collect();

    for channel in elem.children_named("channel") {
        let (Some(source), Some(target)) = (channel.attr("source"), channel.attr("target")) else {
            continue;
        };
        let Some(inputs) = samplers.get(local_ref(source)) else {
            log::warn!("Channel '{}': sampler '{}' not found", target, source);
            continue;
        };
        let lookup = |semantic: &str| {
            inputs
                .iter()
                .find(|i| i.semantic == semantic)
                .and_then(|i| sources.get(&i.source))
        };
        let (Some(times), Some(values)) = (lookup("INPUT"), lookup("OUTPUT")) else {
            log::warn!("Channel '{}': sampler without INPUT/OUTPUT source", target);
            continue;
        };

        let Some((node, member)) = target.split_once('/') else {
            log::warn!("Channel target '{}' has no sid", target);
            continue;
        };
        if member.contains('(') {
            log::warn!("Channel target '{}': element access not supported", target);
            continue;
        }
        let (sid, component) = match member.split_once('.') {
            Some((sid, comp)) => (sid, Some(comp.to_lowercase())),
            None => (member, None),
        };

        out.push(Channel {
            target_node: node.to_owned(),
            target_sid: sid.to_owned(),
            component,
            times: times.floats.clone(),
            values: values.floats.clone(),
            stride: values.stride,
        });
    }

    for nested in elem.children_named("animation") {
        parse_animation(nested, out)?;
    }
    Ok(())
}

// ========== Document ==========

#[derive(Clone, Debug, Default)]
pub(crate) struct Document {
    pub geometries: Vec<Geometry>,
    pub controllers: Vec<Controller>,
    pub roots: Vec<SceneNode>,
    pub channels: Vec<Channel>,
    /// Animation range from the scene extras, if exported
    pub start_time: Option<f32>,
    pub end_time: Option<f32>,
}

impl Document {
    pub fn parse(root: &Element) -> Result<Document> {
        if root.name != "COLLADA" {
            return Err(EngineError::Collada(format!(
                "root element is <{}>, expected <COLLADA>",
                root.name
            )));
        }
        let mut doc = Document::default();

        if let Some(lib) = root.child("library_geometries") {
            for elem in lib.children_named("geometry") {
                if let Some(geom) = Geometry::parse(elem)? {
                    doc.geometries.push(geom);
                }
            }
        }

        if let Some(lib) = root.child("library_controllers") {
            for elem in lib.children_named("controller") {
                if let Some(ctrl) = Controller::parse(elem)? {
                    doc.controllers.push(ctrl);
                }
            }
        }

        if let Some(scene) = Self::visual_scene(root) {
            doc.roots = scene
                .children_named("node")
                .map(|n| SceneNode::parse(n, Mat4::IDENTITY))
                .collect::<Result<Vec<_>>>()?;

            let time = |name: &str| {
                scene
                    .find(name)
                    .and_then(|e| e.text.trim().parse::<f32>().ok())
            };
            doc.start_time = time("start_time");
            doc.end_time = time("end_time");
        }

        if let Some(lib) = root.child("library_animations") {
            for elem in lib.children_named("animation") {
                parse_animation(elem, &mut doc.channels)?;
            }
        }

        Ok(doc)
    }

    /// The scene named by `<scene>`, or the first one
    fn visual_scene(root: &Element) -> Option<&Element> {
        let lib = root.child("library_visual_scenes")?;
        let wanted = root
            .child("scene")
            .and_then(|s| s.child("instance_visual_scene"))
            .and_then(|i| i.attr("url"))
            .map(local_ref);
        match wanted {
            Some(id) => lib
                .children_named("visual_scene")
                .find(|s| s.attr("id") == Some(id))
                .or_else(|| lib.child("visual_scene")),
            None => lib.child("visual_scene"),
        }
    }

    fn find_node(&self, pred: &dyn Fn(&SceneNode) -> bool) -> Option<&SceneNode> {
        self.roots.iter().find_map(|r| r.find(pred))
    }

    pub fn node(&self, id: &str) -> Option<&SceneNode> {
        self.find_node(&|n| n.id == id)
    }

    pub fn node_by_sid(&self, sid: &str) -> Option<&SceneNode> {
        self.find_node(&|n| n.sid.as_deref() == Some(sid))
    }

    /// Node that instances a geometry, directly or through its controller
    pub fn node_for_geometry(&self, geometry_id: &str) -> Option<&SceneNode> {
        self.find_node(&|n| n.instances.iter().any(|i| i == geometry_id))
            .or_else(|| {
                let ctrl = self.controllers.iter().find(|c| c.target == geometry_id)?;
                self.find_node(&|n| n.instances.iter().any(|i| *i == ctrl.id))
            })
    }

    /// Controller skinning a geometry; falls back to one without a target
    pub fn controller_for(&self, geometry_id: &str) -> Option<&Controller> {
        self.controllers
            .iter()
            .find(|c| c.target == geometry_id)
            .or_else(|| {
                let guess = self.controllers.iter().find(|c| c.target.is_empty());
                if guess.is_some() {
                    log::warn!("Guessing controller with empty target for '{}'", geometry_id);
                }
                guess
            })
    }
}
