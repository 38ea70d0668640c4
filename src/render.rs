//! Draw lists.
//!
//! Engines describe what they want drawn as a [`Render`] value and the host
//! records it into its own render pass with [`Render::draw`]. This keeps the
//! crate free of any surface or frame management.

use wgpu::RenderPass;

use crate::{pipelines::RibbonPipeline, ribbon::RibbonEngine, tiles::TileEngine};

/// One indexed draw: vertex and index buffers with the material bind group.
pub struct Flat<'a> {
    pub vertex: &'a wgpu::Buffer,
    pub index: &'a wgpu::Buffer,
    pub group: &'a wgpu::BindGroup,
    /// Number of indices.
    pub amount: u32,
    /// Segment index, for debugging and picking.
    pub id: u32,
}

/// Specifies what should be drawn.
///
/// - `None` draws nothing
/// - `Ribbon(Vec<Flat>)` draws ribbon segments with the ribbon pipeline
/// - `Composed(Vec<Render>)` draws several renders in order
/// - `Custom(...)` invokes a host closure on the render pass
pub enum Render<'a, 'pass>
where
    'pass: 'a,
{
    None,
    Ribbon(Vec<Flat<'a>>),
    Composed(Vec<Render<'a, 'pass>>),
    Custom(Box<dyn 'a + FnOnce(&mut RenderPass<'pass>)>),
}

impl<'a, 'pass> Render<'a, 'pass> {
    fn collect(self, render_pass: &mut RenderPass<'pass>, ribbons: &mut Vec<Flat<'a>>) {
        match self {
            Render::Ribbon(mut flats) => ribbons.append(&mut flats),
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.collect(render_pass, ribbons)),
            Render::Custom(f) => f(render_pass),
            Render::None => (),
        }
    }

    /// Records every draw into `render_pass`. Returns the number of indexed draws.
    pub fn draw(self, pipeline: &RibbonPipeline, render_pass: &mut RenderPass<'pass>) -> usize {
        let mut ribbons = Vec::new();
        self.collect(render_pass, &mut ribbons);
        if ribbons.is_empty() {
            return 0;
        }

        render_pass.set_pipeline(pipeline.pipeline());
        render_pass.set_bind_group(0, pipeline.camera_bind_group(), &[]);
        for flat in &ribbons {
            render_pass.set_bind_group(1, flat.group, &[]);
            render_pass.set_vertex_buffer(0, flat.vertex.slice(..));
            render_pass.set_index_buffer(flat.index.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..flat.amount, 0, 0..1);
        }
        ribbons.len()
    }
}

/// Draws `ribbon` with the materials of `tiles`.
pub fn draw_ribbon<'pass>(
    render_pass: &mut RenderPass<'pass>,
    pipeline: &RibbonPipeline,
    ribbon: &RibbonEngine,
    tiles: &TileEngine,
) -> usize {
    ribbon.render(tiles).draw(pipeline, render_pass)
}
