//! Render graph executor

use crate::backend::{Device, FramebufferHandle, TextureHandle};
use crate::error::{CompositorError, CompositorResult};
use crate::render_graph::attachment::AttachmentTable;
use crate::render_graph::graph::Graph;
use crate::render_graph::node::NodeId;
use crate::resources::FullscreenQuad;

/// Runs the passes of a resolved graph in a caller chosen order.
///
/// For each node, the texture published by every linked producer pin is set on the
/// node's pass as a texture uniform named after the input pin; an input without a
/// linked texture has that uniform cleared. The output pins of a node replace its
/// pass' attachments on every run and are bound through a shared framebuffer; a node
/// without output textures renders into whatever target is bound, usually the screen.
pub struct GraphExecutor {
    quad: FullscreenQuad,
    framebuffer: Option<FramebufferHandle>,
}

impl Default for GraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self {
            quad: FullscreenQuad::new(),
            framebuffer: None,
        }
    }

    /// The full-screen primitive shared by every pass this executor renders
    pub fn quad(&self) -> &FullscreenQuad {
        &self.quad
    }

    /// Render every node in insertion order
    pub fn execute(&mut self, graph: &mut Graph, device: &mut dyn Device) -> CompositorResult<()> {
        if graph.is_dirty() {
            log::warn!("GraphExecutor: executing a graph that changed since its last update");
        }
        let order = graph.node_ids().to_vec();
        self.execute_order(graph, device, &order)
    }

    /// Render the given nodes in the given order
    pub fn execute_order(
        &mut self,
        graph: &mut Graph,
        device: &mut dyn Device,
        order: &[NodeId],
    ) -> CompositorResult<()> {
        for id in order {
            self.execute_node(graph, device, *id)?;
        }
        Ok(())
    }

    /// Render a single node
    pub fn execute_node(
        &mut self,
        graph: &mut Graph,
        device: &mut dyn Device,
        id: NodeId,
    ) -> CompositorResult<()> {
        let node = graph.node(id).ok_or(CompositorError::NodeNotFound(id))?;

        let inputs: Vec<(String, Option<TextureHandle>)> = node
            .inputs()
            .keys()
            .map(|input| {
                let texture = node.resolved_link(input).and_then(|link| {
                    graph
                        .node(link.producer)
                        .and_then(|producer| producer.output_texture(&link.pin))
                });
                (input.to_string(), texture)
            })
            .collect();
        let has_output_pins = !node.outputs().is_empty();
        let mut outputs = AttachmentTable::new();
        for (_, pin) in node.outputs().iter() {
            if let Some(texture) = pin.texture {
                outputs.attach(pin.slot, texture);
            }
        }

        let node = graph
            .node_mut(id)
            .ok_or(CompositorError::NodeNotFound(id))?;
        let name = node.name().to_string();
        let Some(pass) = node.pass_mut() else {
            log::trace!("GraphExecutor: '{}' has no pass", name);
            return Ok(());
        };

        for (input, texture) in inputs {
            match texture {
                Some(texture) => pass.set_uniform(&input, texture),
                None => {
                    if pass.material_mut().clear_uniform(&input).is_some() {
                        log::debug!(
                            "GraphExecutor: '{}'.{} lost its texture since the last run",
                            name,
                            input
                        );
                    }
                }
            }
        }

        // Output pins own the attachments of a node that declares any
        if has_output_pins {
            pass.replace_outputs(outputs);
        }

        if outputs.is_empty() {
            log::trace!("GraphExecutor: '{}' renders into the bound target", name);
            return pass.render(device, &self.quad, None);
        }

        let framebuffer = match self.framebuffer {
            Some(framebuffer) => framebuffer,
            None => {
                let framebuffer = device.create_framebuffer(Some("compositor"))?;
                self.framebuffer = Some(framebuffer);
                framebuffer
            }
        };
        pass.render(device, &self.quad, Some(framebuffer))
    }

    /// Release the shared framebuffer
    pub fn release(&mut self, device: &mut dyn Device) {
        if let Some(framebuffer) = self.framebuffer.take() {
            device.destroy_framebuffer(framebuffer);
        }
    }
}
