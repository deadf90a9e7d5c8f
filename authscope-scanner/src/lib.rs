pub mod botwall;
pub mod dynamism;
pub mod error;
pub mod renderer;
pub mod result;

pub use botwall::BlockVerdict;
pub use dynamism::DynamismVerdict;
pub use error::RenderError;
pub use renderer::{ChromeRenderer, HttpRenderer, PageRenderer, RenderMode};
pub use result::PageRenderResult;
