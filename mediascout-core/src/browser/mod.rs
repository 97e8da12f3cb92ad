mod automation;
mod error;
mod renderer;

pub use automation::ChromiumRenderer;
pub use error::{BrowserError, BrowserResult};
pub use renderer::{PageRenderer, RequestStream, WaitPolicy};
