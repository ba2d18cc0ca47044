use super::Interceptor;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Writes each exchange to `<dir>/exchange_<timestamp>_<seq>.md`.
#[derive(Debug)]
pub struct FileInterceptor {
    base_path: PathBuf,
    seq: AtomicUsize,
}

impl FileInterceptor {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path, seq: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Interceptor for FileInterceptor {
    async fn save(&self, prompt: &str, response: &str) -> std::io::Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let timestamp = Utc::now();
        let filename = format!("exchange_{}_{:03}.md", timestamp.format("%Y%m%d_%H%M%S_%3f"), seq);

        fs::create_dir_all(&self.base_path).await?;

        let content = format!("# Prompt\n\n{}\n\n# Response\n\n{}\n", prompt, response);

        let mut file = fs::File::create(self.base_path.join(filename)).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_markdown_file_per_exchange() {
        let dir = std::env::temp_dir().join(format!("reg-quiz-trace-{}", uuid::Uuid::new_v4()));
        let interceptor = FileInterceptor::new(dir.clone());

        interceptor.save("first prompt", "first reply").await.unwrap();
        interceptor.save("second prompt", "second reply").await.unwrap();

        let mut names: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);

        let body = std::fs::read_to_string(dir.join(&names[0])).unwrap();
        assert!(body.contains("# Prompt"));
        assert!(body.contains("reply"));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
