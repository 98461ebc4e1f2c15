//! 에러 타입 정의

use thiserror::Error;

/// udpget 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("base64 디코딩 에러: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("잘못된 메시지: {reason}")]
    Malformed { reason: String },

    #[error("메시지 타입 불일치: expected {expected}, got {got}")]
    MessageTypeMismatch { expected: String, got: String },

    #[error("파일 이름 불일치: expected {expected}, got {got}")]
    FilenameMismatch { expected: String, got: String },

    #[error("범위 불일치: expected [{expected_start}, {expected_end}], got [{got_start}, {got_end}]")]
    RangeMismatch {
        expected_start: u64,
        expected_end: u64,
        got_start: u64,
        got_end: u64,
    },

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFilename(String),

    #[error("응답 없음: {attempts}회 시도 후 타임아웃")]
    Timeout { attempts: u32 },

    #[error("파일 없음: {0}")]
    NotFound(String),

    #[error("파일 크기 변경 감지: expected {expected}, got {actual}")]
    SizeChanged { expected: u64, actual: u64 },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::Malformed {
            reason: reason.into(),
        }
    }

    /// 프로토콜 위반 여부 (재시도로 해결되지 않는 응답 오류)
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::Malformed { .. }
                | Error::MessageTypeMismatch { .. }
                | Error::FilenameMismatch { .. }
                | Error::RangeMismatch { .. }
                | Error::Base64(_)
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
