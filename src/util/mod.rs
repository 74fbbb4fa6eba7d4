mod naming;
mod time;
mod writer;

pub use naming::{short_id, slug, slug_or};
pub use time::{format_utc, now_utc, utc_rfc3339};
pub use writer::RecordWriter;
