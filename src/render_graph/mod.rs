//! Render Graph System
//!
//! Nodes declare named input and output pins; [`Graph::update`] resolves the
//! symbolic input references into links, and [`GraphExecutor`] renders each
//! node's [`Pass`] in the order the caller chooses.

pub mod attachment;
pub mod diagnostics;
pub mod executor;
pub mod graph;
pub mod node;
pub mod pass;
pub mod pin;

pub use attachment::*;
pub use diagnostics::*;
pub use executor::*;
pub use graph::*;
pub use node::*;
pub use pass::*;
pub use pin::*;
