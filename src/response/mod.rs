//! 响应：格式化 assistant 回复、生成图片落盘

pub mod formatter;
pub mod images;

pub use formatter::{format_image_generation, format_thread_reply, image_markup};
pub use images::ImageStore;
