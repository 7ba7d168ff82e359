//! Integration tests for the compositor.
//!
//! # Test Categories
//!
//! - **Link Resolution Tests**: pin selection, diagnostics and re-resolution after edits
//! - **Render Protocol Tests**: clear policy, blend state, attachments and draw buffers
//! - **End-to-End Tests**: a small graph executed against a device
//!
//! Tests that read pixels back run against every available backend; a backend
//! without an adapter is skipped.

mod common;

use rstest::rstest;

use common::{assert_uniform_color, Backend, TestContext, MRT_FRAGMENT, WHITE_FRAGMENT};
use redlilium_compositor::backend::{
    AttachmentSlot, BlendState, Device, DeviceCommand, DummyBackend, TextureDescriptor, TextureFormat,
};
use redlilium_compositor::render_graph::{
    DiagnosticCode, InputRef, OutputPin, RenderStage, Severity,
};
use redlilium_compositor::resources::{FullscreenQuad, UniformValue};
use redlilium_compositor::shader::library::{GAUSSIAN_BLUR, OUTPUT};
use redlilium_compositor::{
    CompositorConfig, Graph, GraphExecutor, Node, Pass, ShaderLibrary,
};

fn source_node(outputs: &[&str]) -> Node {
    outputs.iter().fold(Node::new("Source"), |node, name| {
        node.with_output(name, OutputPin::new(AttachmentSlot::Color0))
    })
}

// ============================================================================
// Link Resolution Tests
// ============================================================================

/// An input naming only a node links to that node's first declared output.
#[rstest]
#[case::color_first(&["color", "depth"], "color")]
#[case::depth_first(&["depth", "color"], "depth")]
#[case::single(&["bloom"], "bloom")]
fn test_implicit_pin_uses_first_output(#[case] outputs: &[&str], #[case] expected: &str) {
    let mut graph = Graph::new();
    let source = graph.add_node(source_node(outputs));
    let blur = graph.add_node(Node::new("Blur").with_input("colorTex", "Source"));

    let report = graph.update();

    assert!(report.is_clean(), "{:?}", report.diagnostics());
    let link = graph.node(blur).unwrap().resolved_link("colorTex").unwrap();
    assert_eq!(link.producer, source);
    assert_eq!(link.pin, expected);
}

#[test]
fn test_explicit_pin_reference() {
    let mut graph = Graph::new();
    let source = graph.add_node(source_node(&["color", "depth"]));
    let blur = graph.add_node(
        Node::new("Blur").with_input("depthTex", InputRef::pin("Source", "depth")),
    );

    let report = graph.update();

    assert_eq!(report.link_count(), 1);
    let link = graph.node(blur).unwrap().resolved_link("depthTex").unwrap();
    assert_eq!((link.producer, link.pin.as_str()), (source, "depth"));
}

#[test]
fn test_missing_producer_leaves_input_unlinked() {
    let mut graph = Graph::new();
    graph.add_node(source_node(&["color"]));
    let blur = graph.add_node(
        Node::new("Blur")
            .with_input("colorTex", "Source")
            .with_input("bloomTex", "Missing"),
    );

    let report = graph.update();

    assert_eq!(report.link_count(), 1);
    assert!(!report.is_complete());
    assert_eq!(report.count(DiagnosticCode::UnknownNode), 1);

    let diagnostic = &report.diagnostics()[0];
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(
        diagnostic.to_string(),
        "Node Missing referenced by Blur.bloomTex does not exist"
    );

    let node = graph.node(blur).unwrap();
    assert!(node.resolved_link("bloomTex").is_none());
    assert!(node.resolved_link("colorTex").is_some());
}

#[test]
fn test_missing_pin_is_reported() {
    let mut graph = Graph::new();
    graph.add_node(source_node(&["color"]));
    graph.add_node(Node::new("Blur").with_input("colorTex", InputRef::pin("Source", "depth")));

    let report = graph.update();

    assert!(report.has(DiagnosticCode::UnknownPin));
    assert_eq!(
        report.diagnostics()[0].to_string(),
        "Pin Source.depth referenced by Blur.colorTex does not exist"
    );
}

#[test]
fn test_producer_without_outputs_is_reported() {
    let mut graph = Graph::new();
    graph.add_node(Node::new("Source"));
    graph.add_node(Node::new("Blur").with_input("colorTex", "Source"));

    let report = graph.update();

    assert_eq!(report.link_count(), 0);
    assert!(report.has(DiagnosticCode::NoOutputPins));
}

#[test]
fn test_update_is_idempotent() {
    let mut graph = Graph::new();
    graph.add_node(source_node(&["color", "depth"]));
    let blur = graph.add_node(
        Node::new("Blur")
            .with_input("colorTex", "Source")
            .with_input("bloomTex", "Missing"),
    );

    let first = graph.update();
    let first_links: Vec<_> = graph
        .node(blur)
        .unwrap()
        .links()
        .map(|(input, link)| (input.to_string(), link.clone()))
        .collect();

    let second = graph.update();
    let second_links: Vec<_> = graph
        .node(blur)
        .unwrap()
        .links()
        .map(|(input, link)| (input.to_string(), link.clone()))
        .collect();

    assert_eq!(first, second);
    assert_eq!(first_links, second_links);
}

#[test]
fn test_removed_producer_unlinks_consumers() {
    let mut graph = Graph::new();
    let source = graph.add_node(source_node(&["color"]));
    let blur = graph.add_node(Node::new("Blur").with_input("colorTex", "Source"));
    assert!(graph.update().is_clean());

    let removed = graph.remove_node(source).unwrap();
    assert_eq!(removed.name(), "Source");
    assert!(graph.is_dirty());

    let report = graph.update();
    assert!(report.has(DiagnosticCode::UnknownNode));
    assert!(graph.node(blur).unwrap().resolved_link("colorTex").is_none());
    assert!(graph.remove_node(source).is_err());
}

#[test]
fn test_name_lookup_after_removal() {
    let mut graph = Graph::new();
    let first = graph.add_node(Node::new("Blur"));
    let second = graph.add_node(Node::new("Blur"));

    assert_eq!(graph.find_node_by_name("Blur"), Some(first));
    graph.remove_node(first).unwrap();
    assert_eq!(graph.find_node_by_name("Blur"), Some(second));
    assert!(graph.find_node_by_name("Source").is_none());
}

#[test]
fn test_cycles_are_reported_but_kept() {
    let mut graph = Graph::new();
    let a = graph.add_node(
        Node::new("A")
            .with_input("in", "B")
            .with_output("out", OutputPin::new(AttachmentSlot::Color0)),
    );
    graph.add_node(
        Node::new("B")
            .with_input("in", "A")
            .with_output("out", OutputPin::new(AttachmentSlot::Color0)),
    );

    let report = graph.update();
    assert!(report.has(DiagnosticCode::CyclicLink));
    assert_eq!(report.link_count(), 2);
    assert!(graph.node(a).unwrap().resolved_link("in").is_some());

    let mut quiet = Graph::with_config(CompositorConfig {
        detect_cycles: false,
        ..Default::default()
    });
    quiet.add_node(Node::new("A").with_input("in", "A").with_output(
        "out",
        OutputPin::new(AttachmentSlot::Color0),
    ));
    assert!(quiet.update().is_clean());
}

#[test]
fn test_unused_input_is_reported() {
    let mut device = DummyBackend::new();
    let library = ShaderLibrary::standard();
    let pass = Pass::from_library(&mut device, &library, OUTPUT).unwrap();

    let mut graph = Graph::new();
    graph.add_node(source_node(&["color"]));
    graph.add_node(
        Node::new("Blur")
            .with_input("colorTex", "Source")
            .with_input("bloom", "Source")
            .with_pass(pass),
    );

    let report = graph.update();

    // still linked, only advisory
    assert_eq!(report.link_count(), 2);
    assert!(report.is_complete());
    assert_eq!(report.count(DiagnosticCode::UnusedInput), 1);
    assert_eq!(
        report.diagnostics()[0].to_string(),
        "Pin Blur.bloom is not used by its pass"
    );
}

// ============================================================================
// Render Protocol Tests
// ============================================================================

/// With a clear colour the target is cleared; without one, earlier content survives.
///
/// The pass multiplies the target by white so the draw itself leaves texels unchanged.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_clear_color_policy(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let target = ctx.create_target("target", 4, 4);
    let framebuffer = ctx.device.create_framebuffer(Some("test")).unwrap();
    let mut pass = ctx.pass("keep", WHITE_FRAGMENT);
    pass.set_blend_with_previous(true);
    pass.set_blend_state(BlendState::multiply());
    pass.attach_output(target, AttachmentSlot::Color0);

    ctx.fill(target, [0, 255, 0, 255]);
    pass.render(ctx.device.as_mut(), &ctx.quad, Some(framebuffer))
        .unwrap();
    let pixels = ctx.pixels(target);
    assert_uniform_color(&pixels, [0, 255, 0, 255]);

    pass.set_clear_color(Some([1.0, 0.0, 0.0, 1.0]));
    pass.render(ctx.device.as_mut(), &ctx.quad, Some(framebuffer))
        .unwrap();
    let pixels = ctx.pixels(target);
    assert_uniform_color(&pixels, [255, 0, 0, 255]);

    pass.dispose(ctx.device.as_mut());
    ctx.device.destroy_framebuffer(framebuffer);
}

/// Several passes sharing one framebuffer each write only their own outputs.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_shared_framebuffer_between_passes(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let first = ctx.create_target("first", 2, 2);
    let second = ctx.create_target("second", 2, 2);
    let framebuffer = ctx.device.create_framebuffer(Some("shared")).unwrap();

    let mut red = ctx.pass("red", WHITE_FRAGMENT);
    red.set_blend_with_previous(true);
    red.set_blend_state(BlendState::multiply());
    red.set_clear_color(Some([1.0, 0.0, 0.0, 1.0]));
    red.attach_output(first, AttachmentSlot::Color0);

    let mut blue = ctx.pass("blue", WHITE_FRAGMENT);
    blue.set_blend_with_previous(true);
    blue.set_blend_state(BlendState::multiply());
    blue.set_clear_color(Some([0.0, 0.0, 1.0, 1.0]));
    blue.attach_output(second, AttachmentSlot::Color0);

    red.render(ctx.device.as_mut(), &ctx.quad, Some(framebuffer))
        .unwrap();
    blue.render(ctx.device.as_mut(), &ctx.quad, Some(framebuffer))
        .unwrap();

    let pixels = ctx.pixels(first);
    assert_uniform_color(&pixels, [255, 0, 0, 255]);
    let pixels = ctx.pixels(second);
    assert_uniform_color(&pixels, [0, 0, 255, 255]);
}

#[test]
fn test_render_protocol_order() {
    let mut device = DummyBackend::new();
    let quad = FullscreenQuad::new();
    let target = device
        .create_texture(&TextureDescriptor::render_target(
            "target",
            4,
            4,
            TextureFormat::Rgba8Unorm,
        ))
        .unwrap();
    let framebuffer = device.create_framebuffer(None).unwrap();

    let mut pass = Pass::new(&mut device, "white", WHITE_FRAGMENT).unwrap();
    pass.attach_output(target, AttachmentSlot::Color0);
    device.take_commands();

    pass.render(&mut device, &quad, Some(framebuffer)).unwrap();
    let commands = device.take_commands();

    let bind = commands
        .iter()
        .position(|c| *c == DeviceCommand::BindFramebuffer(framebuffer))
        .unwrap();
    let clear = commands
        .iter()
        .position(|c| matches!(c, DeviceCommand::Clear(_)))
        .unwrap();
    let draw = commands
        .iter()
        .position(|c| matches!(c, DeviceCommand::Draw(_)))
        .unwrap();
    let unbind = commands
        .iter()
        .position(|c| *c == DeviceCommand::UnbindFramebuffer(framebuffer))
        .unwrap();
    assert!(bind < clear && clear < draw && draw < unbind);

    // no clear colour: only depth is cleared
    assert!(commands.contains(&DeviceCommand::Clear(
        redlilium_compositor::backend::ClearMask::DEPTH
    )));
    assert!(!commands
        .iter()
        .any(|c| matches!(c, DeviceCommand::ClearColor(_))));
    assert_eq!(device.bound_framebuffer(), None);
}

#[rstest]
#[case::opaque(false)]
#[case::blended(true)]
fn test_blend_flag_reaches_device(#[case] blend: bool) {
    let mut device = DummyBackend::new();
    let quad = FullscreenQuad::new();
    let mut pass = Pass::new(&mut device, "white", WHITE_FRAGMENT)
        .unwrap()
        .with_blend(BlendState::additive());
    pass.set_blend_with_previous(blend);

    pass.render(&mut device, &quad, None).unwrap();

    let draw = device.draws().last().cloned().unwrap();
    assert_eq!(draw.transparent, blend);
    assert_eq!(draw.blend, blend.then_some(BlendState::additive()));
    assert_eq!(pass.material().is_transparent(), blend);
    assert_eq!(device.blend_enabled(), blend);
}

#[test]
fn test_blend_is_reset_by_next_pass() {
    let mut device = DummyBackend::new();
    let quad = FullscreenQuad::new();
    let mut blended = Pass::new(&mut device, "blended", WHITE_FRAGMENT).unwrap();
    blended.set_blend_with_previous(true);
    let mut opaque = Pass::new(&mut device, "opaque", WHITE_FRAGMENT).unwrap();

    blended.render(&mut device, &quad, None).unwrap();
    opaque.render(&mut device, &quad, None).unwrap();

    let draws: Vec<_> = device.draws().cloned().collect();
    assert!(draws[0].blend.is_some());
    assert!(draws[1].blend.is_none());
}

#[test]
fn test_detach_output_clears_slot_on_next_render() {
    let mut device = DummyBackend::new();
    let quad = FullscreenQuad::new();
    let color = device
        .create_texture(&TextureDescriptor::render_target("c", 4, 4, TextureFormat::Rgba8Unorm))
        .unwrap();
    let depth = device
        .create_texture(&TextureDescriptor::render_target("d", 4, 4, TextureFormat::Depth32Float))
        .unwrap();
    let framebuffer = device.create_framebuffer(None).unwrap();

    let mut pass = Pass::new(&mut device, "white", WHITE_FRAGMENT).unwrap();
    pass.attach_output(color, AttachmentSlot::Color0);
    pass.attach_output(depth, AttachmentSlot::Depth);
    pass.render(&mut device, &quad, Some(framebuffer)).unwrap();
    assert_eq!(device.attachment(framebuffer, AttachmentSlot::Depth), Some(depth));

    pass.detach_output(depth);
    assert_eq!(pass.output(AttachmentSlot::Depth), None);
    pass.render(&mut device, &quad, Some(framebuffer)).unwrap();

    assert_eq!(device.attachment(framebuffer, AttachmentSlot::Depth), None);
    assert_eq!(device.attachment(framebuffer, AttachmentSlot::Color0), Some(color));
    let draw = device.draws().last().cloned().unwrap();
    assert_eq!(draw.depth_target, None);
}

#[test]
fn test_multiple_render_targets() {
    let mut device = DummyBackend::new();
    let quad = FullscreenQuad::new();
    let color = device
        .create_texture(&TextureDescriptor::render_target("c", 4, 4, TextureFormat::Rgba8Unorm))
        .unwrap();
    let bloom = device
        .create_texture(&TextureDescriptor::render_target("b", 4, 4, TextureFormat::Rgba8Unorm))
        .unwrap();
    let framebuffer = device.create_framebuffer(None).unwrap();

    let mut pass = Pass::new(&mut device, "mrt", MRT_FRAGMENT).unwrap();
    pass.attach_output(color, AttachmentSlot::Color0);
    pass.attach_output(bloom, AttachmentSlot::Color1);
    pass.render(&mut device, &quad, Some(framebuffer)).unwrap();

    assert!(device.commands().contains(&DeviceCommand::DrawBuffers(vec![
        AttachmentSlot::Color0,
        AttachmentSlot::Color1
    ])));
    let draw = device.draws().last().cloned().unwrap();
    assert_eq!(draw.color_targets, [color, bloom]);
}

#[test]
fn test_single_target_device_degrades() {
    let mut device = DummyBackend::with_capabilities(false, 1);
    let quad = FullscreenQuad::new();
    let color = device
        .create_texture(&TextureDescriptor::render_target("c", 4, 4, TextureFormat::Rgba8Unorm))
        .unwrap();
    let bloom = device
        .create_texture(&TextureDescriptor::render_target("b", 4, 4, TextureFormat::Rgba8Unorm))
        .unwrap();
    let framebuffer = device.create_framebuffer(None).unwrap();

    let mut pass = Pass::new(&mut device, "mrt", MRT_FRAGMENT).unwrap();
    pass.attach_output(color, AttachmentSlot::Color0);
    pass.attach_output(bloom, AttachmentSlot::Color1);
    pass.render(&mut device, &quad, Some(framebuffer)).unwrap();

    assert!(!device
        .commands()
        .iter()
        .any(|c| matches!(c, DeviceCommand::DrawBuffers(_))));
    let draw = device.draws().last().cloned().unwrap();
    assert_eq!(draw.color_targets, [color]);
}

#[test]
fn test_observers_see_material_around_draw() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let mut device = DummyBackend::new();
    let quad = FullscreenQuad::new();
    let library = ShaderLibrary::standard();
    let mut pass = Pass::from_library(&mut device, &library, GAUSSIAN_BLUR).unwrap();

    let stages = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&stages);
    pass.add_observer(move |stage, material| {
        if stage == RenderStage::Before {
            material.set_uniform("blurParams", glam::Vec4::new(1.0, 0.0, 0.25, 0.0));
        }
        seen.borrow_mut().push(stage);
    });

    pass.render(&mut device, &quad, None).unwrap();

    assert_eq!(*stages.borrow(), [RenderStage::Before, RenderStage::After]);
    let draw = device.draws().last().cloned().unwrap();
    assert!(draw
        .uniforms
        .iter()
        .any(|(name, _)| name == "blurParams"));
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[test]
fn test_source_feeds_blur_through_graph() {
    let mut device = DummyBackend::new();
    let library = ShaderLibrary::standard();

    let source_texture = device
        .create_texture(&TextureDescriptor::render_target(
            "source",
            4,
            4,
            TextureFormat::Rgba8Unorm,
        ))
        .unwrap();
    let blurred = device
        .create_texture(&TextureDescriptor::render_target(
            "blurred",
            4,
            4,
            TextureFormat::Rgba8Unorm,
        ))
        .unwrap();

    let mut graph = Graph::new();
    graph.add_node(
        Node::new("Source").with_output("color", OutputPin::texture(source_texture)),
    );
    let blur = graph.add_node(
        Node::new("Blur1")
            .with_input("colorTex", "Source")
            .with_output("color", OutputPin::texture(blurred))
            .with_pass(Pass::from_library(&mut device, &library, GAUSSIAN_BLUR).unwrap()),
    );
    let output = graph.add_node(
        Node::new("Output")
            .with_input("colorTex", "Blur1")
            .with_pass(Pass::from_library(&mut device, &library, OUTPUT).unwrap()),
    );

    let report = graph.update();
    assert!(report.is_clean(), "{:?}", report.diagnostics());
    assert_eq!(report.link_count(), 2);

    let mut executor = GraphExecutor::new();
    executor.execute(&mut graph, &mut device).unwrap();

    let draws: Vec<_> = device.draws().cloned().collect();
    assert_eq!(draws.len(), 2);

    assert_eq!(draws[0].texture("colorTex"), Some(source_texture));
    assert_eq!(draws[0].color_targets, [blurred]);
    assert_eq!(draws[1].texture("colorTex"), Some(blurred));
    assert_eq!(draws[1].color_targets, [device.screen_texture()]);

    assert_eq!(
        graph.node(blur).unwrap().pass().unwrap().uniform("colorTex"),
        Some(&UniformValue::Texture(source_texture))
    );
    assert!(graph.node(output).unwrap().pass().is_some());

    executor.release(&mut device);
}

#[test]
fn test_removed_producer_stops_feeding_consumer() {
    let mut device = DummyBackend::new();
    let library = ShaderLibrary::standard();
    let source_texture = device
        .create_texture(&TextureDescriptor::render_target(
            "source",
            4,
            4,
            TextureFormat::Rgba8Unorm,
        ))
        .unwrap();

    let mut graph = Graph::new();
    let source = graph.add_node(
        Node::new("Source").with_output("color", OutputPin::texture(source_texture)),
    );
    graph.add_node(
        Node::new("Output")
            .with_input("colorTex", "Source")
            .with_pass(Pass::from_library(&mut device, &library, OUTPUT).unwrap()),
    );
    assert!(graph.update().is_clean());

    let mut executor = GraphExecutor::new();
    executor.execute(&mut graph, &mut device).unwrap();
    assert_eq!(
        device.draws().last().unwrap().texture("colorTex"),
        Some(source_texture)
    );

    graph.remove_node(source).unwrap();
    device.destroy_texture(source_texture);
    assert!(graph.update().has(DiagnosticCode::UnknownNode));

    executor.execute(&mut graph, &mut device).unwrap();
    assert_eq!(device.draws().last().unwrap().texture("colorTex"), None);

    executor.release(&mut device);
}

#[test]
fn test_producer_without_texture_clears_consumer_input() {
    let mut device = DummyBackend::new();
    let library = ShaderLibrary::standard();
    let source_texture = device
        .create_texture(&TextureDescriptor::render_target(
            "source",
            4,
            4,
            TextureFormat::Rgba8Unorm,
        ))
        .unwrap();

    let mut graph = Graph::new();
    let source = graph.add_node(
        Node::new("Source").with_output("color", OutputPin::texture(source_texture)),
    );
    let output = graph.add_node(
        Node::new("Output")
            .with_input("colorTex", "Source")
            .with_pass(Pass::from_library(&mut device, &library, OUTPUT).unwrap()),
    );
    assert!(graph.update().is_clean());

    let mut executor = GraphExecutor::new();
    executor.execute(&mut graph, &mut device).unwrap();

    assert!(graph
        .node_mut(source)
        .unwrap()
        .set_output_texture("color", None));
    executor.execute(&mut graph, &mut device).unwrap();

    assert_eq!(device.draws().last().unwrap().texture("colorTex"), None);
    assert_eq!(
        graph.node(output).unwrap().pass().unwrap().uniform("colorTex"),
        None
    );

    executor.release(&mut device);
}

#[test]
fn test_cleared_output_pin_is_detached() {
    let mut device = DummyBackend::new();
    let color = device
        .create_texture(&TextureDescriptor::render_target(
            "color",
            4,
            4,
            TextureFormat::Rgba8Unorm,
        ))
        .unwrap();
    let extra = device
        .create_texture(&TextureDescriptor::render_target(
            "extra",
            4,
            4,
            TextureFormat::Rgba8Unorm,
        ))
        .unwrap();

    let mut graph = Graph::new();
    let node = graph.add_node(
        Node::new("Split")
            .with_output("color", OutputPin::texture(color))
            .with_output("extra", OutputPin::texture(extra).at(AttachmentSlot::Color1))
            .with_pass(Pass::new(&mut device, "split", MRT_FRAGMENT).unwrap()),
    );
    assert!(graph.update().is_clean());

    let mut executor = GraphExecutor::new();
    executor.execute(&mut graph, &mut device).unwrap();
    assert_eq!(device.draws().last().unwrap().color_targets, [color, extra]);

    assert!(graph
        .node_mut(node)
        .unwrap()
        .set_output_texture("extra", None));
    executor.execute(&mut graph, &mut device).unwrap();

    assert_eq!(device.draws().last().unwrap().color_targets, [color]);
    let pass = graph.node(node).unwrap().pass().unwrap();
    assert_eq!(pass.output(AttachmentSlot::Color1), None);

    executor.release(&mut device);
}
