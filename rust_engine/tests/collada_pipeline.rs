//! Load a small skinned Collada file, play its animation and check the skin
//!
//! The fixture is a 1x2 quad. Its bottom edge is bound to `root` and its top
//! edge to `tip`, a bone one unit above the root. The embedded animation
//! slides `tip` one unit along +X over one second.

use std::path::PathBuf;
use std::sync::{Arc, Once};

use glam::{Mat4, Vec3};
use skinmesh_engine::{
    ColladaLoader, EngineConfig, EngineError, MeshEntity, MeshLoader, TickOutcome,
};

const EPSILON: f32 = 1.0e-4;
static INIT: Once = Once::new();

fn init_tests() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

const SKINNED_QUAD: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <library_geometries>
    <geometry id="body-mesh" name="Body">
      <mesh>
        <source id="body-positions">
          <float_array id="body-positions-array" count="12">
            -0.5 0 0   0.5 0 0   0.5 2 0   -0.5 2 0
          </float_array>
          <technique_common>
            <accessor source="#body-positions-array" count="4" stride="3"/>
          </technique_common>
        </source>
        <vertices id="body-vertices">
          <input semantic="POSITION" source="#body-positions"/>
        </vertices>
        <triangles material="Skin" count="2">
          <input semantic="VERTEX" source="#body-vertices" offset="0"/>
          <p>0 1 2 0 2 3</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_controllers>
    <controller id="body-skin">
      <skin source="#body-mesh">
        <bind_shape_matrix>1 0 0 0  0 1 0 0  0 0 1 0  0 0 0 1</bind_shape_matrix>
        <source id="body-joints">
          <Name_array count="2">root tip</Name_array>
        </source>
        <source id="body-bind-poses">
          <float_array count="32">
            1 0 0 0  0 1 0 0  0 0 1 0  0 0 0 1
            1 0 0 0  0 1 0 -1  0 0 1 0  0 0 0 1
          </float_array>
          <technique_common>
            <accessor count="2" stride="16"/>
          </technique_common>
        </source>
        <source id="body-weights">
          <float_array count="1">1</float_array>
        </source>
        <joints>
          <input semantic="JOINT" source="#body-joints"/>
          <input semantic="INV_BIND_MATRIX" source="#body-bind-poses"/>
        </joints>
        <vertex_weights count="4">
          <input semantic="JOINT" source="#body-joints" offset="0"/>
          <input semantic="WEIGHT" source="#body-weights" offset="1"/>
          <vcount>1 1 1 1</vcount>
          <v>0 0  0 0  1 0  1 0</v>
        </vertex_weights>
      </skin>
    </controller>
  </library_controllers>
  <library_animations>
    <animation id="tip-slide">
      <source id="tip-slide-input">
        <float_array count="2">0 1</float_array>
      </source>
      <source id="tip-slide-output">
        <float_array count="6">0 1 0  1 1 0</float_array>
        <technique_common>
          <accessor count="2" stride="3"/>
        </technique_common>
      </source>
      <sampler id="tip-slide-sampler">
        <input semantic="INPUT" source="#tip-slide-input"/>
        <input semantic="OUTPUT" source="#tip-slide-output"/>
      </sampler>
      <channel source="#tip-slide-sampler" target="tip/translate"/>
    </animation>
  </library_animations>
  <library_visual_scenes>
    <visual_scene id="Scene">
      <node id="root" name="root" sid="root" type="JOINT">
        <node id="tip" name="tip" sid="tip" type="JOINT">
          <translate sid="translate">0 1 0</translate>
        </node>
      </node>
      <node id="Body" name="Body">
        <instance_controller url="#body-skin"/>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene>
    <instance_visual_scene url="#Scene"/>
  </scene>
</COLLADA>
"##;

const STATIC_PROP: &str = r##"<COLLADA>
  <library_geometries>
    <geometry id="crate-mesh" name="Crate">
      <mesh>
        <source id="crate-positions">
          <float_array count="9">0 0 0  1 0 0  0 1 0</float_array>
          <technique_common><accessor stride="3"/></technique_common>
        </source>
        <vertices id="crate-vertices">
          <input semantic="POSITION" source="#crate-positions"/>
        </vertices>
        <triangles count="1">
          <input semantic="VERTEX" source="#crate-vertices" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
    <geometry id="collider-mesh" name="Collider">
      <mesh>
        <source id="collider-positions">
          <float_array count="9">0 0 0  2 0 0  0 2 0</float_array>
          <technique_common><accessor stride="3"/></technique_common>
        </source>
        <vertices id="collider-vertices">
          <input semantic="POSITION" source="#collider-positions"/>
        </vertices>
        <triangles count="1">
          <input semantic="VERTEX" source="#collider-vertices" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="Scene">
      <node id="Crate" name="Crate">
        <translate>0 0 5</translate>
        <instance_geometry url="#crate-mesh"/>
      </node>
      <node id="Collider" name="_Collider">
        <instance_geometry url="#collider-mesh"/>
      </node>
    </visual_scene>
  </library_visual_scenes>
</COLLADA>
"##;

/// Same tip slide, but the scene extras stretch the range to two seconds
const LONG_SLIDE: &str = r##"<COLLADA>
  <library_animations>
    <animation>
      <source id="in"><float_array count="2">0 1</float_array></source>
      <source id="out">
        <float_array count="2">1 3</float_array>
      </source>
      <sampler id="s">
        <input semantic="INPUT" source="#in"/>
        <input semantic="OUTPUT" source="#out"/>
      </sampler>
      <channel source="#s" target="tip/translate.X"/>
    </animation>
  </library_animations>
  <library_visual_scenes>
    <visual_scene id="Scene">
      <node id="tip" name="tip" type="JOINT">
        <translate sid="translate">0 1 0</translate>
      </node>
      <extra>
        <technique profile="MAX3D">
          <start_time>0</start_time>
          <end_time>2</end_time>
        </technique>
      </extra>
    </visual_scene>
  </library_visual_scenes>
</COLLADA>
"##;

/// Unskinned door sliding up along Z, with a scaled knob riding on it
const SLIDING_DOOR: &str = r##"<COLLADA>
  <library_geometries>
    <geometry id="door-mesh" name="DoorPanel">
      <mesh>
        <source id="door-positions">
          <float_array count="9">0 0 0  1 0 0  0 1 0</float_array>
          <technique_common><accessor stride="3"/></technique_common>
        </source>
        <vertices id="door-vertices">
          <input semantic="POSITION" source="#door-positions"/>
        </vertices>
        <triangles count="1">
          <input semantic="VERTEX" source="#door-vertices" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
    <geometry id="knob-mesh" name="Knob">
      <mesh>
        <source id="knob-positions">
          <float_array count="9">0 0 0  1 0 0  0 1 0</float_array>
          <technique_common><accessor stride="3"/></technique_common>
        </source>
        <vertices id="knob-vertices">
          <input semantic="POSITION" source="#knob-positions"/>
        </vertices>
        <triangles count="1">
          <input semantic="VERTEX" source="#knob-vertices" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_animations>
    <animation>
      <source id="in"><float_array count="2">0 1</float_array></source>
      <source id="out"><float_array count="2">5 7</float_array></source>
      <sampler id="s">
        <input semantic="INPUT" source="#in"/>
        <input semantic="OUTPUT" source="#out"/>
      </sampler>
      <channel source="#s" target="Door/translate.Z"/>
    </animation>
  </library_animations>
  <library_visual_scenes>
    <visual_scene id="Scene">
      <node id="Door" name="Door">
        <translate sid="translate">0 0 5</translate>
        <instance_geometry url="#door-mesh"/>
        <node id="Knob" name="Knob">
          <translate sid="translate">1 0 0</translate>
          <scale sid="scale">2 2 2</scale>
          <instance_geometry url="#knob-mesh"/>
        </node>
      </node>
    </visual_scene>
  </library_visual_scenes>
</COLLADA>
"##;

fn fixture(name: &str, text: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("skinmesh-engine-tests-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn skinned_mesh() -> Arc<skinmesh_engine::Mesh> {
    let loader = ColladaLoader::new(EngineConfig::always_update());
    Arc::new(loader.load_mesh_from_str("quad.dae", SKINNED_QUAD).unwrap())
}

#[test]
fn test_mesh_structure() {
    init_tests();
    let mesh = skinned_mesh();

    assert_eq!(mesh.sub_mesh_count(), 1);
    let body = mesh.sub_mesh_by_name("Body").unwrap();
    assert_eq!(body.material_name, "Skin");
    assert_eq!(body.vertex_buffer.vertex_count(), 4);
    assert_eq!(body.vertex_buffer.triangle_count(), 2);
    assert!(body.is_skinned());
    assert!(body.unconnected().iter().all(|&u| !u));

    let skeleton = mesh.skeleton().unwrap();
    assert_eq!(skeleton.bone_count(), 2);
    let tip = skeleton.bone_by_name("tip").unwrap();
    assert_eq!(tip.parent(), skeleton.bone_index_by_name("root"));
    assert!(tip
        .world_transform()
        .abs_diff_eq(Mat4::from_translation(Vec3::Y), EPSILON));

    assert_eq!(mesh.animation_count(), 1);
    let anim = mesh.animation_by_name("Default").unwrap();
    assert!((anim.length() - 1.0).abs() < EPSILON);
    // The root has no channel but still gets a pose track
    assert_eq!(anim.track_count(), 2);
    assert_eq!(anim.track_by_name("root").unwrap().keyframe_count(), 1);
}

#[test]
fn test_animation_keys_are_bone_relative() {
    init_tests();
    let mesh = skinned_mesh();
    let track = mesh.animation(0).unwrap().track_by_name("tip").unwrap();
    assert_eq!(track.keyframe_count(), 2);
    let first = &track.keyframes()[0];
    let last = &track.keyframes()[1];
    assert!(first.translation.abs_diff_eq(Vec3::ZERO, EPSILON));
    assert!(last.translation.abs_diff_eq(Vec3::X, EPSILON));
    assert!((last.time - 1.0).abs() < EPSILON);
}

#[test]
fn test_play_and_skin() {
    init_tests();
    let mesh = skinned_mesh();
    let bind = mesh.sub_mesh(0).unwrap().vertex_buffer.positions.clone();
    let mut entity = MeshEntity::new("quad", mesh, &EngineConfig::always_update());

    entity.play_name("Default", false, true).unwrap();
    assert_eq!(entity.update_logic(0.5), TickOutcome::Animated);

    let skinned = &entity.sub_mesh_entity(0).unwrap().vertex_buffer().positions;
    for (before, after) in bind.iter().zip(skinned) {
        let expected = if before.y > 1.0 {
            *before + Vec3::new(0.5, 0.0, 0.0)
        } else {
            *before
        };
        assert!(after.abs_diff_eq(expected, EPSILON), "{after} != {expected}");
    }

    // Non-looping playback holds the last pose
    entity.update_logic(5.0);
    let state = entity.animation_state_by_name("Default").unwrap();
    assert!(state.is_over());
    let skinned = &entity.sub_mesh_entity(0).unwrap().vertex_buffer().positions;
    for (before, after) in bind.iter().zip(skinned).filter(|(b, _)| b.y > 1.0) {
        assert!(after.abs_diff_eq(*before + Vec3::X, EPSILON));
    }
}

#[test]
fn test_static_prop_is_baked() {
    init_tests();
    let loader = ColladaLoader::new(EngineConfig::always_update());
    let mesh = loader.load_mesh_from_str("crate.dae", STATIC_PROP).unwrap();
    assert!(mesh.skeleton().is_none());
    assert_eq!(mesh.animation_count(), 0);

    // The underscore helper node is not loaded
    assert_eq!(mesh.sub_mesh_count(), 1);
    assert!(!mesh.has_sub_mesh("Collider"));

    let vb = &mesh.sub_mesh(0).unwrap().vertex_buffer;
    assert!(vb.positions.iter().all(|p| (p.z - 5.0).abs() < EPSILON));
    assert!(vb.normals.iter().all(|n| n.abs_diff_eq(Vec3::Z, EPSILON)));

    let mut entity = MeshEntity::new("crate", Arc::new(mesh), &EngineConfig::always_update());
    assert_eq!(entity.update_logic(0.1), TickOutcome::Static);
}

#[test]
fn test_animated_prop_rides_its_nodes() {
    init_tests();
    let loader = ColladaLoader::new(EngineConfig::always_update());
    let mesh = loader.load_mesh_from_str("door.dae", SLIDING_DOOR).unwrap();
    assert!(mesh.skeleton().is_none());
    assert_eq!(mesh.node_tree().bone_count(), 2);
    assert_eq!(mesh.sub_mesh_by_name("DoorPanel").unwrap().node_index, Some(0));
    assert_eq!(mesh.sub_mesh_by_name("Knob").unwrap().node_index, Some(1));

    // Only the scale is baked into the vertices
    let knob = &mesh.sub_mesh_by_name("Knob").unwrap().vertex_buffer;
    assert!(knob.positions[1].abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), EPSILON));

    let track = mesh.animation(0).unwrap().track_by_name("Door").unwrap();
    assert_eq!(track.node_index, Some(0));

    let mut entity = MeshEntity::new("door", Arc::new(mesh), &EngineConfig::always_update());
    let door = |e: &MeshEntity| e.sub_mesh_entity_by_name("DoorPanel").unwrap().vertex_buffer().positions.clone();
    let knob = |e: &MeshEntity| e.sub_mesh_entity_by_name("Knob").unwrap().vertex_buffer().positions.clone();

    assert!(door(&entity)[1].abs_diff_eq(Vec3::new(1.0, 0.0, 5.0), EPSILON));
    assert!(knob(&entity)[1].abs_diff_eq(Vec3::new(3.0, 0.0, 5.0), EPSILON));

    entity.play(0, false, true).unwrap();
    assert_eq!(entity.update_logic(0.5), TickOutcome::Animated);
    let expected = [Vec3::new(0.0, 0.0, 6.0), Vec3::new(1.0, 0.0, 6.0), Vec3::new(0.0, 1.0, 6.0)];
    for (p, e) in door(&entity).iter().zip(expected) {
        assert!(p.abs_diff_eq(e, EPSILON), "{p} != {e}");
    }
    assert!(knob(&entity)[1].abs_diff_eq(Vec3::new(3.0, 0.0, 6.0), EPSILON));
    assert!((entity.bounding_volume().center().z - 6.0).abs() < EPSILON);
}

#[test]
fn test_load_from_files() {
    init_tests();
    let loader = ColladaLoader::default();
    assert!(loader.is_supported("dae"));

    let mesh = loader.load_mesh(&fixture("quad.dae", SKINNED_QUAD)).unwrap();
    assert_eq!(mesh.name, "quad.dae");

    let anim = loader.load_animation(&fixture("long_slide.dae", LONG_SLIDE)).unwrap();
    assert_eq!(anim.name, "long_slide");
    assert!((anim.length() - 2.0).abs() < EPSILON);

    // Only X is animated, Y keeps the node's translation. Without a skeleton
    // the keys stay absolute.
    let track = anim.track_by_name("tip").unwrap();
    assert!(track.node_index.is_none());
    let key = track.interpolated_keyframe(1.5);
    assert!(key.translation.abs_diff_eq(Vec3::new(3.0, 1.0, 0.0), EPSILON));
}

#[test]
fn test_file_errors() {
    init_tests();
    let loader = ColladaLoader::default();
    let missing = loader.load_mesh(std::path::Path::new("/no/such/file.dae"));
    assert!(matches!(missing, Err(EngineError::Io(_))));

    let not_collada = loader.load_mesh_from_str("bad", "<scene/>");
    assert!(matches!(not_collada, Err(EngineError::Collada(_))));

    let broken = loader.load_mesh_from_str("bad", "<COLLADA><library_geometries>");
    assert!(matches!(broken, Err(EngineError::Xml(_))));

    let no_anim = loader.load_animation(&fixture("crate.dae", STATIC_PROP));
    assert!(matches!(no_anim, Err(EngineError::Collada(_))));
}
