mod cancel;
pub mod image;
mod text;
mod translation;
pub mod video;

pub use cancel::{CancelHandle, Cancellation};
pub use image::{BaseImage, BaseImageGenerator, ImageContext, ImageStrategy, StockImageTable};
pub use text::TextRenderer;
pub use translation::{DEFAULT_TRANSLATION_TIMEOUT, MessageTranslator, language_name};
pub use video::{VideoClip, VideoComposer, VideoContext, VideoSpec, VideoStrategy};
