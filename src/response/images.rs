//! 生成图片的本地落盘：按会话线程 id 命名的 JPEG

use std::path::{Path, PathBuf};

use crate::core::Result;

/// 图片目录
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(thread_id: &str) -> String {
        format!("{thread_id}.jpg")
    }

    /// 页面中引用该图片的相对路径（由 GET /images/:file 提供）
    pub fn public_path(thread_id: &str) -> String {
        format!("./images/{}", Self::file_name(thread_id))
    }

    /// 写入 `{dir}/{thread_id}.jpg`，同一线程的新图覆盖旧图
    pub async fn save(&self, thread_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(thread_id));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), "image saved");
        Ok(path)
    }

    /// 按文件名读取；含路径分隔符或不是 .jpg 的名字一律视为不存在
    pub async fn read(&self, file_name: &str) -> Option<Vec<u8>> {
        if !is_plain_jpg_name(file_name) {
            return None;
        }
        tokio::fs::read(self.dir.join(file_name)).await.ok()
    }
}

fn is_plain_jpg_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.starts_with('.')
        && name.ends_with(".jpg")
}
