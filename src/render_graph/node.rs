//! Graph nodes: named pins plus an optional pass

use std::fmt;

use crate::backend::{AttachmentSlot, TextureHandle};
use crate::render_graph::pass::Pass;
use crate::render_graph::pin::{InputRef, Link, PinMap};

/// Unique identifier for a node within a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An output pin: the texture it publishes and the slot it is rendered into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputPin {
    pub texture: Option<TextureHandle>,
    pub slot: AttachmentSlot,
}

impl OutputPin {
    /// A pin that will publish a texture later
    pub fn new(slot: AttachmentSlot) -> Self {
        Self {
            texture: None,
            slot,
        }
    }

    /// A pin publishing `texture` through the first colour slot
    pub fn texture(texture: TextureHandle) -> Self {
        Self {
            texture: Some(texture),
            slot: AttachmentSlot::Color0,
        }
    }

    pub fn at(mut self, slot: AttachmentSlot) -> Self {
        self.slot = slot;
        self
    }
}

/// A graph vertex with named input and output pins
#[derive(Debug)]
pub struct Node {
    name: String,
    inputs: PinMap<Option<InputRef>>,
    outputs: PinMap<OutputPin>,
    links: PinMap<Link>,
    pass: Option<Pass>,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: PinMap::new(),
            outputs: PinMap::new(),
            links: PinMap::new(),
            pass: None,
        }
    }

    /// Declare an input pin wired to a producer
    pub fn with_input(mut self, name: &str, reference: impl Into<InputRef>) -> Self {
        self.inputs.insert(name, Some(reference.into()));
        self
    }

    /// Declare an input pin that is not wired yet
    pub fn with_unwired_input(mut self, name: &str) -> Self {
        self.inputs.insert(name, None);
        self
    }

    /// Declare an output pin
    pub fn with_output(mut self, name: &str, pin: OutputPin) -> Self {
        self.outputs.insert(name, pin);
        self
    }

    pub fn with_pass(mut self, pass: Pass) -> Self {
        self.pass = Some(pass);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &PinMap<Option<InputRef>> {
        &self.inputs
    }

    pub fn outputs(&self) -> &PinMap<OutputPin> {
        &self.outputs
    }

    /// Rewire an input; takes effect on the next graph update
    pub fn set_input(&mut self, name: &str, reference: Option<InputRef>) {
        self.inputs.insert(name, reference);
    }

    pub fn set_output(&mut self, name: &str, pin: OutputPin) {
        self.outputs.insert(name, pin);
    }

    /// Swap the texture an existing output publishes. Returns `false` for unknown pins.
    pub fn set_output_texture(&mut self, name: &str, texture: Option<TextureHandle>) -> bool {
        match self.outputs.get_mut(name) {
            Some(pin) => {
                pin.texture = texture;
                true
            }
            None => false,
        }
    }

    pub fn output_texture(&self, name: &str) -> Option<TextureHandle> {
        self.outputs.get(name).and_then(|pin| pin.texture)
    }

    pub fn pass(&self) -> Option<&Pass> {
        self.pass.as_ref()
    }

    pub fn pass_mut(&mut self) -> Option<&mut Pass> {
        self.pass.as_mut()
    }

    pub fn set_pass(&mut self, pass: Option<Pass>) -> Option<Pass> {
        std::mem::replace(&mut self.pass, pass)
    }

    /// Drop every resolved link
    pub fn clear(&mut self) {
        self.links.clear();
    }

    /// Record a resolved link, overwriting any previous link of the input
    pub fn link(&mut self, input: &str, producer: NodeId, pin: &str) {
        self.links.insert(
            input,
            Link {
                producer,
                pin: pin.to_string(),
            },
        );
    }

    pub fn resolved_link(&self, input: &str) -> Option<&Link> {
        self.links.get(input)
    }

    /// Resolved links in resolution order
    pub fn links(&self) -> impl Iterator<Item = (&str, &Link)> {
        self.links.iter()
    }
}
