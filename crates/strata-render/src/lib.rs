//! Strata Render Library
//!
//! Layer compositing for Strata. The compositing pass is written against the
//! [`Surface`] trait; the default implementation rasterizes with `vello_cpu`.

mod cpu;
mod renderer;

pub use cpu::{CpuRenderer, CpuSurface, RenderedImage};
pub use renderer::{
    LayerRenderer, RenderContext, RenderResult, RenderStats, RendererError, Surface,
    VisibilityMode, draw_leaf,
};
