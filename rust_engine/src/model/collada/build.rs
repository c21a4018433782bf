//! Turn a parsed Collada document into engine resources

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use super::document::{Channel, Document, SceneNode, TransformKind};
use crate::animation::{Animation, TransformFlags};
use crate::config::EngineConfig;
use crate::model::{Mesh, VertexBonePair};
use crate::skeleton::{matrix_slerp, BoneTransform, Skeleton};
use crate::Result;

/// Name given to the animation embedded in a mesh file
pub(crate) const DEFAULT_ANIMATION: &str = "Default";

// ========== Skeleton ==========

fn add_joint_rec(node: &SceneNode, parent: Option<usize>, skeleton: &mut Skeleton) {
    if !node.is_joint {
        return;
    }
    let index = match skeleton.add_bone(node.id.clone(), parent, node.local) {
        Ok(index) => index,
        Err(e) => {
            log::warn!("Skipping joint '{}': {}", node.id, e);
            return;
        }
    };
    for child in &node.children {
        add_joint_rec(child, Some(index), skeleton);
    }
}

/// Controllers may list joints by sid instead of node id
fn resolve_bone(doc: &Document, skeleton: &Skeleton, joint: &str) -> Option<usize> {
    skeleton.bone_index_by_name(joint).or_else(|| {
        doc.node_by_sid(joint)
            .and_then(|node| skeleton.bone_index_by_name(&node.id))
    })
}

/// Skeleton from the JOINT nodes, posed at the bind pose of the controllers
pub(crate) fn build_skeleton(doc: &Document) -> Option<Skeleton> {
    if doc.controllers.is_empty() {
        return None;
    }

    let mut skeleton = Skeleton::new();
    for root in &doc.roots {
        add_joint_rec(root, None, &mut skeleton);
    }

    // Global bind matrix of every joint used by a skin
    let mut globals = HashMap::new();
    for ctrl in &doc.controllers {
        for (joint, inv_bind) in ctrl.joints.iter().zip(&ctrl.inv_bind) {
            match resolve_bone(doc, &skeleton, joint) {
                Some(index) => {
                    globals.insert(index, inv_bind.inverse());
                }
                None => log::warn!("Bone '{}' does not exist", joint),
            }
        }
    }
    skeleton.rebase_bind_pose(&globals);
    Some(skeleton)
}

// ========== Node tree ==========

fn add_node_rec(node: &SceneNode, parent: Option<usize>, nodes: &mut Skeleton) {
    // Sub-meshes carry their node's scale in the vertices, so the node keeps
    // only rotation and translation
    let local = if node.instances.is_empty() {
        node.local
    } else {
        let (_, rotation, translation) = node.local.to_scale_rotation_translation();
        Mat4::from_rotation_translation(rotation, translation)
    };
    let index = match nodes.add_bone(node.id.clone(), parent, local) {
        Ok(index) => index,
        Err(e) => {
            log::warn!("Skipping scene node '{}': {}", node.id, e);
            return;
        }
    };
    for child in &node.children {
        add_node_rec(child, Some(index), nodes);
    }
}

/// Every scene node, for animated meshes without a skin
pub(crate) fn build_node_tree(doc: &Document) -> Skeleton {
    let mut nodes = Skeleton::new();
    for root in &doc.roots {
        add_node_rec(root, None, &mut nodes);
    }
    nodes
}

// ========== Mesh ==========

pub(crate) fn build_mesh(doc: &Document, name: &str, config: &EngineConfig) -> Result<Mesh> {
    let skeleton = build_skeleton(doc);
    let animated = !doc.channels.is_empty();
    let node_tree = (animated && skeleton.is_none()).then(|| build_node_tree(doc));
    let mut mesh = Mesh::new(name);

    for geom in &doc.geometries {
        let Some(node) = doc.node_for_geometry(&geom.id) else {
            log::warn!("No node with geometry id '{}'", geom.id);
            continue;
        };
        // Underscore nodes are editor helpers (colliders, joints, lights...)
        if node.name.starts_with('_') {
            log::debug!("Skipping helper node '{}'", node.name);
            continue;
        }

        let mut sub_name = if geom.name.is_empty() { geom.id.clone() } else { geom.name.clone() };
        if mesh.has_sub_mesh(&sub_name) {
            sub_name = geom.id.clone();
        }
        let sub = mesh.create_sub_mesh(sub_name)?;
        sub.node_name = node.name.clone();
        sub.local_transform = node.local;
        sub.model_scale = node.scale();
        sub.material_name = geom.material.clone();

        let mut vertex_buffer = geom.vertex_buffer.clone();
        let controller = doc.controller_for(&geom.id);

        match (controller, skeleton.as_ref()) {
            (Some(ctrl), Some(skeleton)) => {
                // 1. Joint index -> bone index
                let bones: Vec<Option<usize>> = ctrl
                    .joints
                    .iter()
                    .map(|j| resolve_bone(doc, skeleton, j))
                    .collect();

                // 2. Fan each position's influences out to its split vertices
                for (position, influences) in ctrl.influences.iter().enumerate() {
                    let Some(split) = geom.position_map.get(position) else {
                        continue;
                    };
                    for &vertex in split {
                        for &(joint, weight) in influences {
                            if let Some(Some(bone)) = bones.get(joint) {
                                sub.add_vertex_bone_pair(VertexBonePair::new(
                                    vertex,
                                    *bone as u32,
                                    weight,
                                ));
                            }
                        }
                    }
                }

                // 3. Geometry into bind space
                vertex_buffer.transform(ctrl.bind_shape);
                sub.set_vertex_buffer(vertex_buffer);
                sub.compile_bone_pairs(config.weight_epsilon);
            }
            _ => match &node_tree {
                // The node places the sub-mesh at runtime, only bake its scale
                Some(nodes) => {
                    vertex_buffer.transform(Mat4::from_scale(node.scale()));
                    sub.node_index = nodes.bone_index_by_name(&node.id);
                    sub.set_vertex_buffer(vertex_buffer);
                }
                None => {
                    vertex_buffer.transform(node.world);
                    sub.set_vertex_buffer(vertex_buffer);
                }
            },
        }

        sub.compile(config);
    }

    if let Some(skeleton) = skeleton {
        mesh.set_skeleton(skeleton);
    }
    if let Some(nodes) = node_tree {
        mesh.set_node_tree(nodes);
    }

    if animated {
        // Untracked bones get a pose key; untracked nodes just keep theirs
        let animation = match mesh.skeleton() {
            Some(skeleton) => build_animation(doc, Some(skeleton), DEFAULT_ANIMATION, true)?,
            None => build_animation(doc, Some(mesh.node_tree()), DEFAULT_ANIMATION, false)?,
        };
        mesh.add_animation(animation)?;
    }

    log::info!(
        "Loaded mesh '{}': {} sub meshes, {} bones, {} nodes, {} animations",
        mesh.name,
        mesh.sub_mesh_count(),
        mesh.skeleton().map(Skeleton::bone_count).unwrap_or(0),
        mesh.node_tree().bone_count(),
        mesh.animation_count()
    );
    Ok(mesh)
}

// ========== Animation ==========

/// Linear sample of keyed values, clamped at both ends
fn sample<T: Copy>(times: &[f32], keys: &[T], t: f32, lerp: impl Fn(T, T, f32) -> T) -> Option<T> {
    let count = times.len().min(keys.len());
    if count == 0 {
        return None;
    }
    if t.is_nan() || t <= times[0] {
        return Some(keys[0]);
    }
    if t >= times[count - 1] {
        return Some(keys[count - 1]);
    }
    let next = times[..count].partition_point(|&k| k <= t);
    let (t0, t1) = (times[next - 1], times[next]);
    let w = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
    Some(lerp(keys[next - 1], keys[next], w))
}

fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Union of the key times of all channels, sorted
fn union_times(channels: &[&Channel]) -> Vec<f32> {
    let mut times: Vec<f32> = channels.iter().flat_map(|c| c.times.iter().copied()).collect();
    times.sort_by(f32::total_cmp);
    times.dedup();
    times
}

fn axis_index(component: &str) -> Option<usize> {
    match component {
        "x" => Some(0),
        "y" => Some(1),
        "z" => Some(2),
        _ => None,
    }
}

/// Per-node values resampled onto the union of key times
struct NodeSamples {
    times: Vec<f32>,
    translation: Option<Vec<Vec3>>,
    /// Degrees about X, Y and Z
    euler: Vec<Vec3>,
    scale: Vec<Vec3>,
    matrices: Option<Vec<Mat4>>,
}

impl NodeSamples {
    fn gather(node: &SceneNode, channels: &[&Channel]) -> NodeSamples {
        let times = union_times(channels);
        let n = times.len();
        let mut samples = NodeSamples {
            euler: vec![Vec3::ZERO; n],
            scale: vec![Vec3::ONE; n],
            translation: None,
            matrices: None,
            times,
        };
        let node_translation = node.local.w_axis.truncate();

        for channel in channels {
            let Some(transform) = node.transform_by_sid(&channel.target_sid) else {
                log::debug!("Node '{}' has no transform '{}'", node.id, channel.target_sid);
                continue;
            };
            let stride = channel.stride.max(1);
            let component = channel.component.as_deref();

            match transform.kind {
                TransformKind::Translate | TransformKind::Scale => {
                    let target = if transform.kind == TransformKind::Translate {
                        samples.translation.get_or_insert_with(|| vec![node_translation; n])
                    } else {
                        &mut samples.scale
                    };
                    match component.and_then(axis_index) {
                        Some(axis) => {
                            let keys: Vec<f32> = channel.values.iter().step_by(stride).copied().collect();
                            for (k, &t) in samples.times.iter().enumerate() {
                                if let Some(v) = sample(&channel.times, &keys, t, lerp_f32) {
                                    target[k][axis] = v;
                                }
                            }
                        }
                        None => {
                            let keys: Vec<Vec3> = channel
                                .values
                                .chunks_exact(stride.max(3))
                                .map(|c| Vec3::new(c[0], c[1], c[2]))
                                .collect();
                            for (k, &t) in samples.times.iter().enumerate() {
                                if let Some(v) = sample(&channel.times, &keys, t, Vec3::lerp) {
                                    target[k] = v;
                                }
                            }
                        }
                    }
                }
                TransformKind::Rotate => {
                    // ANGLE alone, or the full axis-angle quadruple
                    let keys: Vec<f32> = match component {
                        Some("angle") | None if stride == 1 => channel.values.clone(),
                        None if stride >= 4 => channel.values.chunks_exact(stride).map(|c| c[3]).collect(),
                        _ => {
                            log::warn!(
                                "Node '{}': rotate channel '{:?}' not supported",
                                node.id,
                                component
                            );
                            continue;
                        }
                    };
                    let axis = transform.axis();
                    for (k, &t) in samples.times.iter().enumerate() {
                        if let Some(angle) = sample(&channel.times, &keys, t, lerp_f32) {
                            samples.euler[k] += axis * angle;
                        }
                    }
                }
                TransformKind::Matrix => {
                    let keys: Vec<Mat4> = channel
                        .values
                        .chunks_exact(16)
                        .filter_map(super::document::matrix_from_row_major)
                        .collect();
                    let mut out = Vec::with_capacity(n);
                    for &t in &samples.times {
                        out.push(sample(&channel.times, &keys, t, matrix_slerp).unwrap_or(node.local));
                    }
                    samples.matrices = Some(out);
                }
            }
        }
        samples
    }
}

/// Rotation from Euler degrees, X applied first, then Y, then Z
fn euler_xyz(degrees: Vec3) -> Quat {
    let r = degrees * (std::f32::consts::PI / 180.0);
    (Quat::from_rotation_z(r.z) * Quat::from_rotation_y(r.y) * Quat::from_rotation_x(r.x)).normalize()
}

/// Build an animation from the document's channels
///
/// `skeleton` is the hierarchy the tracks target: the bones, or the scene
/// nodes of an unskinned mesh. Keyframes store the change relative to each
/// target's local transform. With `pose_untracked_bones` every bone without
/// channels gets a single key holding its scene pose.
pub(crate) fn build_animation(
    doc: &Document,
    skeleton: Option<&Skeleton>,
    name: &str,
    pose_untracked_bones: bool,
) -> Result<Animation> {
    // Channels per target node, in document order
    let mut order: Vec<&str> = Vec::new();
    let mut by_node: HashMap<&str, Vec<&Channel>> = HashMap::new();
    for channel in &doc.channels {
        let node = channel.target_node.as_str();
        by_node
            .entry(node)
            .or_insert_with(|| {
                order.push(node);
                Vec::new()
            })
            .push(channel);
    }

    let all_times = doc.channels.iter().flat_map(|c| c.times.iter().copied());
    let first = all_times.clone().fold(f32::INFINITY, f32::min);
    let last = all_times.fold(f32::NEG_INFINITY, f32::max);
    let start = doc.start_time.unwrap_or(if first.is_finite() { first } else { 0.0 });
    let end = doc.end_time.unwrap_or(if last.is_finite() { last } else { start });

    let mut animation = Animation::new(name);
    animation.set_length(end - start);

    for node_id in order {
        let Some(node) = doc.node(node_id) else {
            log::warn!("Couldn't find node '{}' for animation", node_id);
            continue;
        };
        let bone = match skeleton {
            Some(skeleton) => match skeleton.bone_index_by_name(node_id) {
                Some(index) => Some(index),
                None => {
                    log::warn!("Couldn't find bone or node '{}'", node_id);
                    continue;
                }
            },
            None => None,
        };
        let bone_local = bone
            .and_then(|i| skeleton.and_then(|s| s.bone_by_index(i)))
            .map(|b| b.local_transform());

        let samples = NodeSamples::gather(node, &by_node[node_id]);
        let track = animation.create_track(node_id, TransformFlags::all())?;
        track.node_index = bone;

        for (k, &time) in samples.times.iter().enumerate() {
            let key = track.create_keyframe(time - start);

            if let Some(matrices) = &samples.matrices {
                let change = bone_local.unwrap_or(node.local).inverse() * matrices[k];
                let parts = BoneTransform::from_matrix(change);
                key.translation = parts.translation;
                key.rotation = parts.rotation;
                key.scale = parts.scale;
                continue;
            }

            // Exported translations are absolute; keep the movement relative
            // to the bone, in the bone's own frame
            key.translation = match (&samples.translation, bone_local) {
                (Some(t), Some(base)) => {
                    base.inverse().transform_vector3(t[k] - base.w_axis.truncate())
                }
                (Some(t), None) => t[k],
                (None, _) => Vec3::ZERO,
            };
            key.rotation = euler_xyz(samples.euler[k]);
            key.scale = samples.scale[k];
        }
    }

    if let (Some(skeleton), true) = (skeleton, pose_untracked_bones) {
        for (index, bone) in skeleton.bones().iter().enumerate() {
            if animation.track_by_name(&bone.name).is_some() {
                continue;
            }
            let Some(node) = doc.node(&bone.name) else {
                log::warn!("Couldn't find node for bone '{}'", bone.name);
                continue;
            };
            let change = bone.local_transform().inverse() * node.local;
            let (_, rotation, translation) = change.to_scale_rotation_translation();

            let track = animation.create_track(bone.name.clone(), TransformFlags::all())?;
            track.node_index = Some(index);
            let key = track.create_keyframe(0.0);
            key.translation = translation;
            key.rotation = rotation.normalize();
            key.scale = Vec3::ONE;
        }
    }

    Ok(animation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_clamps_and_interpolates() {
        let times = [0.0, 1.0, 3.0];
        let keys = [0.0, 10.0, 30.0];
        assert_eq!(sample(&times, &keys, -1.0, lerp_f32), Some(0.0));
        assert_eq!(sample(&times, &keys, 2.0, lerp_f32), Some(20.0));
        assert_eq!(sample(&times, &keys, 5.0, lerp_f32), Some(30.0));
        assert_eq!(sample::<f32>(&[], &[], 0.0, lerp_f32), None);
        assert_eq!(sample(&times, &keys, f32::NAN, lerp_f32), Some(0.0));
    }

    #[test]
    fn test_euler_order() {
        let q = euler_xyz(Vec3::new(90.0, 0.0, 90.0));
        // X first sends Y to Z, then Z about Z stays Z
        assert!((q * Vec3::Y).abs_diff_eq(Vec3::Z, 1e-5));
        // X leaves X alone, then Z turns it into Y
        assert!((q * Vec3::X).abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_node_tree_strips_instanced_scale() {
        let scaled = SceneNode {
            id: "Lid".into(),
            local: Mat4::from_scale_rotation_translation(Vec3::splat(2.0), Quat::IDENTITY, Vec3::Y),
            instances: vec!["lid-mesh".into()],
            ..SceneNode::default()
        };
        let root = SceneNode {
            id: "Box".into(),
            local: Mat4::from_scale(Vec3::splat(3.0)),
            children: vec![scaled],
            ..SceneNode::default()
        };
        let doc = Document { roots: vec![root], ..Document::default() };

        let nodes = build_node_tree(&doc);
        assert_eq!(nodes.bone_count(), 2);
        assert_eq!(nodes.bone_by_name("Box").unwrap().local_transform(), Mat4::from_scale(Vec3::splat(3.0)));
        let lid = nodes.bone_by_name("Lid").unwrap();
        assert_eq!(lid.parent(), Some(0));
        assert!(lid.local_transform().abs_diff_eq(Mat4::from_translation(Vec3::Y), 1e-6));
    }

    #[test]
    fn test_union_times_sorted_unique() {
        let a = Channel { times: vec![0.0, 1.0, 2.0], ..Channel::default() };
        let b = Channel { times: vec![0.5, 1.0], ..Channel::default() };
        assert_eq!(union_times(&[&a, &b]), vec![0.0, 0.5, 1.0, 2.0]);
    }
}
