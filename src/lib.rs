//! # udpget
//!
//! UDP 기반 lock-step 범위 다운로드 프로토콜
//!
//! ## 핵심 특징
//! - **제어 채널**: 잘 알려진 포트 하나에서 DOWNLOAD 핸드쉐이크
//! - **세션 채널**: 전송마다 OS가 할당한 임시 포트, 클라이언트/파일 1:1
//! - **Stop-and-wait**: 요청 하나씩, 타임아웃 + 지수 백오프 재전송
//! - **텍스트 프로토콜**: 공백 구분 토큰, 데이터는 base64
//! - **유휴 타임아웃**: 응답 없는 클라이언트의 세션 자동 정리

pub mod block;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filelist;
pub mod message;
pub mod retry;
pub mod session;
pub mod stats;
pub mod transport;

pub use block::{ByteRange, ClientProgress};
pub use client::{TransferDriver, TransferOutcome, TransferReport};
pub use config::{BackoffScope, Config, PortAllocation};
pub use dispatcher::{Dispatcher, SessionEvent};
pub use error::{Error, Result};
pub use message::{Message, MessageType};
pub use retry::{Outcome, RetryEngine, RetryPolicy};
pub use session::{Session, SessionEnd, SessionReport};
pub use stats::TransferStats;
pub use transport::{DatagramChannel, LossyChannel};

/// 기본 블록 크기 (바이트)
pub const DEFAULT_BLOCK_SIZE: u64 = 1000;

/// 기본 제어 포트
pub const DEFAULT_CONTROL_PORT: u16 = 9000;

/// UDP 데이터그램 최대 페이로드 (IPv4)
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// GET 한 번에 허용하는 최대 바이트 수
///
/// base64 인코딩 후에도 데이터그램 하나에 들어가야 한다.
pub const MAX_BLOCK_SIZE: u64 = 45_000;
