//! 전송 통계

use std::time::{Duration, Instant};

/// 세션/파일 단위 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 논리 요청 수 (재전송 제외)
    pub requests: u64,

    /// 실제 송신 횟수 (재전송 포함)
    pub attempts: u64,

    /// 응답 대기 타임아웃 횟수
    pub timeouts: u64,

    /// 전송된 데이터 바이트 (base64 디코딩 후)
    pub total_bytes: u64,

    /// 검증에 실패해 무시된 요청 수
    pub rejected: u64,

    /// 마지막 활동 시간
    pub last_activity: Option<Instant>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: 0,
            attempts: 0,
            timeouts: 0,
            total_bytes: 0,
            rejected: 0,
            last_activity: None,
        }
    }

    /// 활동 기록
    pub fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }

    /// 데이터 전송 기록
    pub fn record_bytes(&mut self, len: usize) {
        self.total_bytes += len as u64;
        self.touch();
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 재전송 횟수
    pub fn retransmissions(&self) -> u64 {
        self.attempts.saturating_sub(self.requests)
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.retransmissions() as f64 / self.attempts as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Requests: {} | Retransmits: {} ({:.1}%) | Bytes: {} | Throughput: {:.2} KB/s | Rejected: {}",
            self.elapsed().as_secs_f64(),
            self.requests,
            self.retransmissions(),
            self.retransmit_ratio() * 100.0,
            self.total_bytes,
            self.throughput() / 1_000.0,
            self.rejected,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmissions() {
        let mut stats = TransferStats::new();
        stats.requests = 4;
        stats.attempts = 6;
        assert_eq!(stats.retransmissions(), 2);
        assert!((stats.retransmit_ratio() - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_bytes() {
        let mut stats = TransferStats::default();
        assert!(stats.last_activity.is_none());
        stats.record_bytes(1000);
        stats.record_bytes(500);
        assert_eq!(stats.total_bytes, 1500);
        assert!(stats.last_activity.is_some());
        assert!(stats.summary().contains("Bytes: 1500"));
    }
}
