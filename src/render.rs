//! Template rendering contract.
//!
//! railyard does not compile templates. An application plugs in whatever
//! engine it uses by implementing [`Renderer`] and handing it to
//! [`AppBuilder::renderer`](crate::AppBuilder::renderer);
//! [`Context::render`](crate::Context::render) then serialises the view data
//! and calls through.

use std::io::Write;

/// Error returned by a [`Renderer`].
pub type RenderError = Box<dyn std::error::Error + Send + Sync>;

pub trait Renderer: Send + Sync + 'static {
    /// Writes the named template, rendered with `data`, into `out`.
    fn render(
        &self,
        out: &mut dyn Write,
        template: &str,
        data: &serde_json::Value,
    ) -> Result<(), RenderError>;
}
