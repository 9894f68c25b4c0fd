//! Render a template locally and print the result.

use courier_mail::{RenderedMessage, TemplateRenderer};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::CliResult;

/// Which parts of the rendered message to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPart {
    #[default]
    Both,
    Html,
    Text,
}

pub fn render(
    template_dir: &Path,
    template: &str,
    context: &Map<String, Value>,
) -> CliResult<RenderedMessage> {
    let renderer = TemplateRenderer::from_directory(template_dir)?;
    Ok(renderer.render(template, context)?)
}

pub fn run(
    template_dir: &Path,
    template: &str,
    context: &Map<String, Value>,
    part: RenderPart,
) -> CliResult<()> {
    let rendered = render(template_dir, template, context)?;
    match part {
        RenderPart::Html => println!("{}", rendered.html),
        RenderPart::Text => println!("{}", rendered.text),
        RenderPart::Both => {
            println!("{}", rendered.html);
            println!("\n----- text/plain -----\n");
            println!("{}", rendered.text);
        }
    }
    Ok(())
}
