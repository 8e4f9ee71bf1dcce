pub mod browser_pool;
pub mod renderer;

pub use browser_pool::BrowserPool;
pub use renderer::{BrowserRenderer, PageRenderer, RenderedPage};
