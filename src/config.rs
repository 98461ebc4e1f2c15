//! 프로토콜 설정

use std::time::Duration;

use crate::{Error, Result, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MAX_DATAGRAM_SIZE};

/// 백오프 상태 유지 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffScope {
    /// 논리 요청마다 타임아웃을 초기값으로 되돌림
    PerRequest,

    /// 한 번 늘어난 타임아웃을 엔진 수명 동안 유지
    Persistent,
}

/// 데이터 포트 할당 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAllocation {
    /// OS가 할당하는 임시 포트 (port 0 바인딩)
    Ephemeral,

    /// 지정 범위 안에서 바인딩 가능한 첫 포트
    Range { low: u16, high: u16 },
}

/// udpget 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// GET 요청 하나가 다루는 바이트 수
    pub block_size: u64,

    /// 재전송 초기 타임아웃
    pub initial_timeout: Duration,

    /// 논리 요청당 최대 전송 횟수
    pub max_attempts: u32,

    /// 백오프 상한 (None이면 무제한 배증)
    pub max_timeout: Option<Duration>,

    /// 백오프 상태 유지 범위
    pub backoff_scope: BackoffScope,

    /// 세션 유휴 타임아웃
    pub session_idle_timeout: Duration,

    /// 데이터 포트 할당 방식
    pub data_ports: PortAllocation,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            initial_timeout: Duration::from_secs(1),
            max_attempts: 5,
            max_timeout: None,
            backoff_scope: BackoffScope::PerRequest,
            session_idle_timeout: Duration::from_secs(5),
            data_ports: PortAllocation::Ephemeral,
            recv_buffer_size: MAX_DATAGRAM_SIZE,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 루프백/테스트용 설정
    pub fn local() -> Self {
        Self {
            initial_timeout: Duration::from_millis(50),
            max_attempts: 8,
            max_timeout: Some(Duration::from_millis(800)),
            session_idle_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            block_size: 512, // 작은 블록
            initial_timeout: Duration::from_millis(500),
            max_attempts: 10,
            max_timeout: Some(Duration::from_secs(8)),
            session_idle_timeout: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// GET 응답 데이터그램의 최대 크기 추정
    ///
    /// base64는 3바이트를 4문자로 인코딩하고, 헤더 토큰은 숫자 두 개와
    /// 파일 이름에 비례한다.
    pub fn max_response_len(&self, filename_len: usize) -> u64 {
        let payload = self.block_size.div_ceil(3) * 4;
        // "FILE  OK START  END  DATA " + u64 두 개
        payload + filename_len as u64 + 26 + 2 * 20
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "block_size는 1 ~ {} 범위여야 함: {}",
                MAX_BLOCK_SIZE, self.block_size
            )));
        }
        if self.max_response_len(0) > self.recv_buffer_size.min(MAX_DATAGRAM_SIZE) as u64 {
            return Err(Error::InvalidConfig(format!(
                "block_size {}의 응답이 수신 버퍼 {}에 들어가지 않음",
                self.block_size, self.recv_buffer_size
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts는 1 이상이어야 함".into()));
        }
        if self.initial_timeout.is_zero() || self.session_idle_timeout.is_zero() {
            return Err(Error::InvalidConfig("타임아웃은 0일 수 없음".into()));
        }
        if let Some(cap) = self.max_timeout {
            if cap < self.initial_timeout {
                return Err(Error::InvalidConfig(
                    "max_timeout은 initial_timeout보다 작을 수 없음".into(),
                ));
            }
        }
        if let PortAllocation::Range { low, high } = self.data_ports {
            if low == 0 || low > high {
                return Err(Error::InvalidConfig(format!(
                    "유효하지 않은 포트 범위: {}-{}",
                    low, high
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::local().validate().is_ok());
        assert!(Config::unstable_network().validate().is_ok());
    }

    #[test]
    fn test_rejects_oversized_block() {
        let config = Config {
            block_size: 60_000,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_inverted_port_range() {
        let config = Config {
            data_ports: PortAllocation::Range {
                low: 50_000,
                high: 40_000,
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
