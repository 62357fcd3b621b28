//! End-to-end frames against the recording device

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use retain_gl::foundation::math::utils;
use retain_gl::prelude::*;
use retain_gl::render::backends::{DeviceCall, RecordedUniform};

const EPSILON: f32 = 1e-5;

const VERTEX: &str = "
    attribute vec3 position;
    uniform mat4 modelViewMatrix;
    uniform mat4 projectionMatrix;
    uniform vec3 tint;
    void main() {
        gl_Position = projectionMatrix * modelViewMatrix * vec4(position * tint, 1.0);
    }
";

const FRAGMENT: &str = "
    precision highp float;
    void main() {
        gl_FragColor = vec4(1.0);
    }
";

struct Fixture {
    renderer: Renderer<HeadlessDevice>,
    scene: Scene,
    root: NodeId,
    camera: NodeId,
}

impl Fixture {
    fn new() -> Self {
        let renderer = Renderer::new(HeadlessDevice::new(), RendererConfig::new(320, 240)).unwrap();
        let mut scene = Scene::new();
        let root = scene.add_group();
        let camera = scene.add_camera(Camera::perspective(90.0, 1.0, 0.1, 100.0));
        Self { renderer, scene, root, camera }
    }

    fn program(&mut self, descriptor: ProgramDescriptor) -> ProgramKey {
        self.renderer
            .create_program(descriptor.with_uniform("tint", Vec3::new(1.0, 1.0, 1.0)))
            .unwrap()
    }

    /// Geometry whose vertex count identifies it in draw calls
    fn points(&mut self, count: usize) -> GeometryKey {
        let positions: Vec<f32> = (0..count).flat_map(|i| [i as f32 * 0.01, 0.0, 0.0]).collect();
        self.renderer.create_geometry([("position", Attribute::new(3, positions))]).unwrap()
    }

    fn mesh(&mut self, drawable: Drawable, position: Vec3) -> NodeId {
        let mesh = self.scene.add_mesh(drawable);
        self.scene.add_child(self.root, mesh).unwrap();
        self.scene.get_mut(mesh).unwrap().set_position(position);
        mesh
    }

    fn render(&mut self) -> FrameStats {
        self.renderer
            .render(&mut self.scene, self.root, Some(self.camera), &RenderOptions::default())
            .unwrap()
    }

    fn draw_counts(&self) -> Vec<i32> {
        self.renderer
            .device()
            .draw_calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::DrawArrays { count, .. } => Some(*count),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn test_child_world_translation_after_update() {
    let mut scene = Scene::new();
    let root = scene.add_group();
    let child = scene.add_group();
    scene.add_child(root, child).unwrap();
    scene.get_mut(child).unwrap().set_position(Vec3::new(1.0, 0.0, 0.0));

    scene.update_world_matrices(root, false).unwrap();
    let translation = utils::translation(scene.world_matrix(child).unwrap());
    assert_relative_eq!(translation, Vec3::new(1.0, 0.0, 0.0), epsilon = EPSILON);

    let mut scaled = Scene::new();
    let root = scaled.add_group();
    let child = scaled.add_group();
    scaled.add_child(root, child).unwrap();
    scaled.get_mut(root).unwrap().set_scale(Vec3::new(2.0, 2.0, 2.0));
    scaled.get_mut(child).unwrap().set_position(Vec3::new(1.0, 0.0, 0.0));

    scaled.update_world_matrices(root, false).unwrap();
    let translation = utils::translation(scaled.world_matrix(child).unwrap());
    assert_relative_eq!(translation, Vec3::new(2.0, 0.0, 0.0), epsilon = EPSILON);
}

#[test]
fn test_reattached_child_has_one_parent() {
    let mut scene = Scene::new();
    let old_parent = scene.add_group();
    let new_parent = scene.add_group();
    let child = scene.add_group();

    scene.add_child(old_parent, child).unwrap();
    scene.add_child(new_parent, child).unwrap();

    assert_eq!(scene.get(child).unwrap().parent(), Some(new_parent));
    assert_eq!(scene.get(new_parent).unwrap().children(), &[child]);
    assert!(!scene.get(old_parent).unwrap().children().contains(&child));
}

#[test]
fn test_frustum_culls_unit_sphere_off_axis() {
    let mut fixture = Fixture::new();
    let program = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let sphere = fixture
        .renderer
        .create_geometry([(
            "position",
            Attribute::new(
                3,
                vec![
                    -1.0_f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 1.0,
                ],
            ),
        )])
        .unwrap();

    let visible = fixture.mesh(Drawable::new(sphere, program), Vec3::new(0.0, 0.0, -5.0));
    fixture.mesh(Drawable::new(sphere, program), Vec3::new(100.0, 0.0, -5.0));

    let stats = fixture.render();
    assert_eq!(stats, FrameStats { drawn: 1, culled: 1, skipped: 0 });

    let camera = fixture.scene.get(fixture.camera).and_then(|node| node.camera()).unwrap();
    let world = fixture.scene.world_matrix(visible).unwrap();
    assert!(camera.frustum_intersects_sphere(utils::translation(world), 1.0));
    assert!(!camera.frustum_intersects_sphere(Vec3::new(100.0, 0.0, -5.0), 1.0));
}

#[test]
fn test_opaque_meshes_ordered_by_program() {
    let mut fixture = Fixture::new();
    let first = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let second = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let geometry = fixture.points(3);

    // Declared in reverse program order
    fixture.mesh(Drawable::new(geometry, second), Vec3::new(0.0, 0.0, -2.0));
    fixture.mesh(Drawable::new(geometry, first), Vec3::new(0.0, 0.0, -3.0));
    fixture.render();

    let handles = |key| fixture.renderer.program(key).unwrap().handle();
    let used: Vec<Option<u32>> = fixture
        .renderer
        .device()
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::UseProgram(program) => Some(*program),
            _ => None,
        })
        .collect();
    assert_eq!(used, vec![handles(first), handles(second)]);
}

#[test]
fn test_transparent_back_to_front_then_overlay() {
    let mut fixture = Fixture::new();
    let blended = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT).with_transparent(true));
    let overlay = fixture.program(
        ProgramDescriptor::new(VERTEX, FRAGMENT)
            .with_transparent(true)
            .with_depth_test(false),
    );
    let solid = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let (near, far, hud, wall) = (fixture.points(3), fixture.points(6), fixture.points(9), fixture.points(12));

    fixture.mesh(Drawable::new(hud, overlay), Vec3::new(0.0, 0.0, -1.0));
    fixture.mesh(Drawable::new(near, blended), Vec3::new(0.0, 0.0, -2.0));
    fixture.mesh(Drawable::new(far, blended), Vec3::new(0.0, 0.0, -8.0));
    fixture.mesh(Drawable::new(wall, solid), Vec3::new(0.0, 0.0, -20.0));
    fixture.render();

    assert_eq!(fixture.draw_counts(), vec![12, 6, 3, 9]);
}

#[test]
fn test_unchanged_frame_only_clears_and_draws() {
    let mut fixture = Fixture::new();
    let program = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let geometry = fixture.points(3);
    fixture.mesh(Drawable::new(geometry, program), Vec3::new(0.0, 0.0, -4.0));

    fixture.render();
    assert_eq!(fixture.renderer.warnings().emitted(), 0);

    let mark = fixture.renderer.device().calls().len();
    fixture.render();
    let calls = fixture.renderer.device().calls_since(mark);

    assert_eq!(calls.len(), 2, "unexpected calls: {:?}", calls);
    assert!(matches!(calls[0], DeviceCall::Clear(_)));
    assert!(matches!(calls[1], DeviceCall::DrawArrays { count: 3, .. }));
}

#[test]
fn test_changed_vector_component_rewrites_one_uniform() {
    let mut fixture = Fixture::new();
    let program = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let geometry = fixture.points(3);
    fixture.mesh(Drawable::new(geometry, program), Vec3::new(0.0, 0.0, -4.0));
    fixture.render();

    fixture.renderer.program_mut(program).unwrap().set_uniform("tint", Vec3::new(1.0, 0.5, 1.0));
    let mark = fixture.renderer.device().calls().len();
    fixture.render();

    let writes: Vec<&RecordedUniform> = fixture
        .renderer
        .device()
        .calls_since(mark)
        .iter()
        .filter_map(|call| match call {
            DeviceCall::SetUniform { value, .. } => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![&RecordedUniform::Floats(vec![1.0, 0.5, 1.0])]);
}

#[test]
fn test_textures_take_units_and_upload_once() {
    let mut fixture = Fixture::new();
    let target = fixture.renderer.create_render_target(&RenderTargetDescriptor::new(64, 64)).unwrap();
    let shadow = fixture.renderer.render_target(target).unwrap().texture().unwrap();
    let image = fixture
        .renderer
        .create_texture(TextureDescriptor::from_image(TextureImage::new(2, 2, vec![255_u8; 16])))
        .unwrap();

    let fragment = "
        precision highp float;
        uniform sampler2D map;
        uniform sampler2D shadow;
        void main() {}
    ";
    let program = fixture.program(
        ProgramDescriptor::new(VERTEX, fragment)
            .with_uniform("map", image)
            .with_uniform("shadow", shadow),
    );
    let geometry = fixture.points(3);
    fixture.mesh(Drawable::new(geometry, program), Vec3::new(0.0, 0.0, -4.0));

    let uploads = |fixture: &Fixture| {
        fixture.renderer.device().count(|call| matches!(call, DeviceCall::TexImage2D { has_pixels: true, .. }))
    };
    fixture.render();
    assert_eq!(uploads(&fixture), 1);
    assert!(fixture.renderer.device().calls().iter().any(|call| matches!(
        call,
        DeviceCall::SetUniform { value: RecordedUniform::Int(1), .. }
    )));

    fixture.render();
    assert_eq!(uploads(&fixture), 1);
}

#[test]
fn test_offscreen_pass_then_screen() {
    let mut fixture = Fixture::new();
    let program = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let geometry = fixture.points(3);
    fixture.mesh(Drawable::new(geometry, program), Vec3::new(0.0, 0.0, -4.0));
    let target = fixture.renderer.create_render_target(&RenderTargetDescriptor::new(128, 64)).unwrap();

    let offscreen = RenderOptions::default().with_target(target);
    fixture
        .renderer
        .render(&mut fixture.scene, fixture.root, Some(fixture.camera), &offscreen)
        .unwrap();
    assert_eq!(fixture.renderer.state().viewport(), Some((128, 64)));

    fixture.render();
    assert_eq!(fixture.renderer.state().viewport(), Some((320, 240)));
    assert_eq!(fixture.renderer.state().framebuffer(), None);
    assert_eq!(fixture.draw_counts(), vec![3, 3]);
}

#[test]
fn test_instanced_mesh_draws_once() {
    let mut fixture = Fixture::new();
    let vertex = "
        attribute vec3 position;
        attribute vec3 offset;
        uniform mat4 modelViewMatrix;
        uniform mat4 projectionMatrix;
        uniform vec3 tint;
        void main() {}
    ";
    let program = fixture.program(ProgramDescriptor::new(vertex, FRAGMENT));
    let geometry = fixture
        .renderer
        .create_geometry([
            ("position", Attribute::new(3, vec![0.0_f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])),
            ("offset", Attribute::new(3, vec![0.0_f32; 12]).instanced(1)),
            ("index", Attribute::index(vec![0_u16, 1, 2])),
        ])
        .unwrap();
    fixture.mesh(Drawable::new(geometry, program), Vec3::new(0.0, 0.0, -4.0));
    fixture.render();

    assert_eq!(
        fixture.renderer.device().draw_calls(),
        vec![&DeviceCall::DrawElementsInstanced {
            mode: DrawMode::Triangles,
            count: 3,
            index_type: retain_gl::render::api::ComponentType::UnsignedShort,
            offset: 0,
            instances: 4,
        }]
    );
}

#[test]
fn test_invisible_subtree_is_not_drawn() {
    let mut fixture = Fixture::new();
    let program = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let geometry = fixture.points(3);
    let group = fixture.scene.add_group();
    fixture.scene.add_child(fixture.root, group).unwrap();
    let hidden = fixture.scene.add_mesh(Drawable::new(geometry, program));
    fixture.scene.add_child(group, hidden).unwrap();
    fixture.scene.get_mut(hidden).unwrap().set_position(Vec3::new(0.0, 0.0, -4.0));
    fixture.scene.get_mut(group).unwrap().set_visible(false);

    assert_eq!(fixture.render().drawn, 0);

    fixture.scene.get_mut(group).unwrap().set_visible(true);
    assert_eq!(fixture.render().drawn, 1);
}

#[test]
fn test_detached_camera_follows_moves_without_scene_update() {
    let mut fixture = Fixture::new();
    let program = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let geometry = fixture.points(3);
    fixture.mesh(Drawable::new(geometry, program), Vec3::new(0.0, 0.0, -4.0));
    fixture.render();

    fixture.scene.get_mut(fixture.camera).unwrap().set_position(Vec3::new(0.0, 0.0, 3.0));
    let frozen = RenderOptions::default().with_update(false);
    fixture
        .renderer
        .render(&mut fixture.scene, fixture.root, Some(fixture.camera), &frozen)
        .unwrap();

    let camera = fixture.scene.get(fixture.camera).and_then(|node| node.camera()).unwrap();
    assert_relative_eq!(utils::translation(camera.world_matrix()), Vec3::new(0.0, 0.0, 3.0), epsilon = EPSILON);
    assert_relative_eq!(utils::translation(camera.view_matrix()), Vec3::new(0.0, 0.0, -3.0), epsilon = EPSILON);
}

#[test]
fn test_draw_hooks_wrap_each_draw() {
    let mut fixture = Fixture::new();
    let program = fixture.program(ProgramDescriptor::new(VERTEX, FRAGMENT));
    let geometry = fixture.points(3);
    let near = fixture.mesh(Drawable::new(geometry, program), Vec3::new(0.0, 0.0, -2.0));
    let far = fixture.mesh(Drawable::new(geometry, program), Vec3::new(0.0, 0.0, -6.0));

    let events = Rc::new(RefCell::new(Vec::new()));
    for (node, name) in [(near, "near"), (far, "far")] {
        let log = Rc::clone(&events);
        fixture.renderer.add_before_render(node, move |program, _node, camera| {
            assert!(camera.is_some());
            program.set_uniform("tint", Vec3::new(0.5, 0.5, 0.5));
            log.borrow_mut().push(format!("before {name}"));
        });
        let log = Rc::clone(&events);
        fixture.renderer.add_after_render(node, move |program, _node, _camera| {
            program.set_uniform("tint", Vec3::new(0.25, 0.25, 0.25));
            log.borrow_mut().push(format!("after {name}"));
        });
    }

    fixture.render();
    assert_eq!(*events.borrow(), vec!["before near", "after near", "before far", "after far"]);

    // Values set before a draw reach the device ahead of that draw;
    // values set after it only apply to the next one.
    let calls = fixture.renderer.device().calls();
    let first_draw = calls.iter().position(DeviceCall::is_draw).unwrap();
    let tint_writes: Vec<(usize, &RecordedUniform)> = calls
        .iter()
        .enumerate()
        .filter_map(|(i, call)| match call {
            DeviceCall::SetUniform { value, .. } if matches!(value, RecordedUniform::Floats(f) if f.len() == 3) => {
                Some((i, value))
            }
            _ => None,
        })
        .collect();
    assert_eq!(tint_writes[0].1, &RecordedUniform::Floats(vec![0.5, 0.5, 0.5]));
    assert!(tint_writes[0].0 < first_draw);
    assert!(tint_writes.iter().all(|(_, value)| **value != RecordedUniform::Floats(vec![0.25, 0.25, 0.25])));

    assert!(fixture.renderer.clear_render_hooks(near));
    assert!(!fixture.renderer.clear_render_hooks(near));
    events.borrow_mut().clear();
    fixture.render();
    assert_eq!(*events.borrow(), vec!["before far", "after far"]);
}
