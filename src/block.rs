//! 바이트 범위와 블록 분할
//!
//! - ByteRange: 양끝 포함 구간 [start, end]
//! - ClientProgress: 클라이언트가 다음에 요청할 블록 계산

use std::fmt;

/// 양끝을 포함하는 바이트 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// 구간 바이트 수 (start > end면 0)
    pub fn len(&self) -> u64 {
        if self.start > self.end {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 크기 `size`인 파일 안의 유효한 구간인지 확인
    ///
    /// `0 <= start <= end < size`
    pub fn is_within(&self, size: u64) -> bool {
        self.start <= self.end && self.end < size
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// 클라이언트측 진행 상태 (전송되지 않음)
#[derive(Debug, Clone)]
pub struct ClientProgress {
    pub filename: String,
    pub size: u64,
    pub next_start: u64,
}

impl ClientProgress {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            next_start: 0,
        }
    }

    /// 모든 바이트 수신 완료 여부
    pub fn is_complete(&self) -> bool {
        self.next_start >= self.size
    }

    /// 다음에 요청할 블록
    ///
    /// `end = min(start + block_size - 1, size - 1)`
    pub fn next_range(&self, block_size: u64) -> Option<ByteRange> {
        if self.is_complete() || block_size == 0 {
            return None;
        }
        let end = self
            .next_start
            .saturating_add(block_size - 1)
            .min(self.size - 1);
        Some(ByteRange::new(self.next_start, end))
    }

    /// 블록 수신 기록
    pub fn advance(&mut self, range: ByteRange) {
        self.next_start = range.end + 1;
    }

    /// 수신 비율 (0.0 ~ 1.0)
    pub fn ratio(&self) -> f64 {
        if self.size == 0 {
            return 1.0;
        }
        self.next_start.min(self.size) as f64 / self.size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_plan_for_2500_bytes() {
        let mut progress = ClientProgress::new("a.bin", 2500);
        let mut ranges = Vec::new();

        while let Some(range) = progress.next_range(1000) {
            ranges.push(range);
            progress.advance(range);
        }

        assert_eq!(
            ranges,
            vec![
                ByteRange::new(0, 999),
                ByteRange::new(1000, 1999),
                ByteRange::new(2000, 2499),
            ]
        );
        assert!(progress.is_complete());
    }

    #[test]
    fn test_empty_file_has_no_blocks() {
        let progress = ClientProgress::new("empty", 0);
        assert!(progress.is_complete());
        assert!(progress.next_range(1000).is_none());
        assert_eq!(progress.ratio(), 1.0);
    }

    #[test]
    fn test_range_validity() {
        assert!(ByteRange::new(0, 0).is_within(1));
        assert!(ByteRange::new(5, 9).is_within(10));
        assert!(!ByteRange::new(5, 10).is_within(10));
        assert!(!ByteRange::new(6, 5).is_within(10));
        assert_eq!(ByteRange::new(6, 5).len(), 0);
        assert_eq!(ByteRange::new(2000, 2499).len(), 500);
    }
}
