//! Graph-to-source rendering.
//!
//! [`render`] turns any finished [`Function`] into text of the form:
//!
//! ```text
//! // types
//! let t0 = type(int);
//!
//! // variables
//! let v0 = param(t0, "n");
//!
//! // labels
//! let l0 = label("return");
//!
//! lambda(t0, [v0], l0, false, block(
//!     return(l0, v0)
//! ))
//! ```
//!
//! Types, variables, labels, reflection lookups and dynamic call sites are
//! hoisted into deduplicated `let` declarations; the body refers to them by
//! identifier. Member lookups are rebuilt with generalized binding flags
//! (`Public | NonPublic` plus `Static` or `Instance`).
//!
//! Extension nodes, fault blocks, filtered catches, foreign call-site
//! binders and constants without a literal form cannot be rendered.

mod literal;
mod pool;
mod renderer;

use opgraph_core::{Function, RenderError};

use renderer::Renderer;

/// Output options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Spaces per nesting level.
    pub indent: usize,
    /// Emit a `// section` comment above each declaration group.
    pub section_comments: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent: 4,
            section_comments: true,
        }
    }
}

/// Render with default options.
pub fn render(function: &Function) -> Result<String, RenderError> {
    render_with(function, &RenderOptions::default())
}

/// Render with explicit options.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn render_with(function: &Function, options: &RenderOptions) -> Result<String, RenderError> {
    Renderer::new(function, options).render()
}
