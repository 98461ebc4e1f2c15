//! 다운로드 목록 파일 읽기
//!
//! 한 줄에 파일 이름 하나. 빈 줄과 `#` 주석은 건너뛴다.

use std::path::Path;

use crate::Result;

/// 목록 파일 읽기
pub async fn read_file_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_file_list(&content))
}

/// 목록 텍스트 파싱
pub fn parse_file_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
