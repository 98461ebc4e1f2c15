//! 서버 세션 (데이터 채널)
//!
//! - 클라이언트 하나, 파일 하나에 전용 임시 포트
//! - GET 범위 요청에 파일 조각을 base64로 응답
//! - CLOSE 수신, 유휴 타임아웃, IO 에러 시 종료
//!
//! 소켓과 파일 핸들은 세션 태스크가 단독 소유한다.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::block::ByteRange;
use crate::message::Message;
use crate::stats::TransferStats;
use crate::{Config, Error, Result, MAX_BLOCK_SIZE};

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closed,
}

/// 세션 종료 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// 클라이언트 CLOSE
    Closed,

    /// 유휴 타임아웃
    IdleTimeout,

    /// 복구 불가능한 에러
    Failed(String),
}

/// 종료된 세션 요약
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub filename: String,
    pub client: SocketAddr,
    pub port: u16,
    pub end: SessionEnd,
    pub stats: TransferStats,
}

/// 처리 결과
enum Handled {
    Served,
    Rejected,
    Close,
}

/// 서버 세션
pub struct Session {
    filename: String,
    client: SocketAddr,
    socket: UdpSocket,
    port: u16,
    file: File,
    size: u64,
    idle_timeout: Duration,
    state: SessionState,
    stats: TransferStats,
    buf: Vec<u8>,
}

impl Session {
    /// 새 세션 생성
    ///
    /// `size`는 핸드쉐이크에서 알린 크기이며 세션 수명 동안 고정된다.
    pub fn new(
        filename: impl Into<String>,
        client: SocketAddr,
        socket: UdpSocket,
        file: File,
        size: u64,
        config: &Config,
    ) -> Result<Self> {
        let port = socket.local_addr()?.port();

        Ok(Self {
            filename: filename.into(),
            client,
            socket,
            port,
            file,
            size,
            idle_timeout: config.session_idle_timeout,
            state: SessionState::Active,
            stats: TransferStats::new(),
            buf: vec![0u8; config.recv_buffer_size],
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 세션 실행 (종료될 때까지)
    pub async fn run(mut self) -> SessionReport {
        info!(
            "세션 시작: {} -> {} (port {}, {} bytes)",
            self.filename, self.client, self.port, self.size
        );

        let mut deadline = Instant::now() + self.idle_timeout;

        let end = loop {
            let received =
                tokio::time::timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await;

            let (len, from) = match received {
                Err(_) => break SessionEnd::IdleTimeout,
                Ok(Err(e)) => break SessionEnd::Failed(e.to_string()),
                Ok(Ok(v)) => v,
            };

            if from != self.client {
                self.stats.rejected += 1;
                debug!("세션 {}: 다른 주소 {}의 요청 무시", self.port, from);
                continue;
            }
            deadline = Instant::now() + self.idle_timeout;

            match self.handle(len).await {
                Ok(Handled::Served) => {}
                Ok(Handled::Rejected) => self.stats.rejected += 1,
                Ok(Handled::Close) => break SessionEnd::Closed,
                Err(e) => break SessionEnd::Failed(e.to_string()),
            }
        };

        self.state = SessionState::Closed;

        match &end {
            SessionEnd::Closed => info!("세션 종료: {} (port {})", self.filename, self.port),
            SessionEnd::IdleTimeout => info!(
                "세션 유휴 타임아웃: {} (port {}, {:?})",
                self.filename, self.port, self.idle_timeout
            ),
            SessionEnd::Failed(reason) => warn!(
                "세션 에러 종료: {} (port {}): {}",
                self.filename, self.port, reason
            ),
        }
        debug!("세션 {} 통계: {}", self.port, self.stats.summary());

        SessionReport {
            filename: self.filename,
            client: self.client,
            port: self.port,
            end,
            stats: self.stats,
        }
    }

    /// 수신 메시지 처리
    async fn handle(&mut self, len: usize) -> Result<Handled> {
        let message = match Message::from_bytes(&self.buf[..len]) {
            Ok(m) => m,
            Err(e) => {
                debug!("세션 {}: 잘못된 메시지 무시: {}", self.port, e);
                return Ok(Handled::Rejected);
            }
        };

        if message.filename() != self.filename {
            debug!(
                "세션 {}: 다른 파일 {} 요청 무시",
                self.port,
                message.filename()
            );
            return Ok(Handled::Rejected);
        }

        match message {
            Message::Get { range, .. } => self.serve_range(range).await,
            Message::Close { .. } => {
                let reply = Message::CloseOk {
                    filename: self.filename.clone(),
                };
                self.socket.send_to(&reply.to_bytes(), self.client).await?;
                Ok(Handled::Close)
            }
            other => {
                debug!("세션 {}: {} 메시지 무시", self.port, other.msg_type());
                Ok(Handled::Rejected)
            }
        }
    }

    /// 범위 읽기 후 DATA 응답
    async fn serve_range(&mut self, range: ByteRange) -> Result<Handled> {
        if !range.is_within(self.size) || range.len() > MAX_BLOCK_SIZE {
            debug!(
                "세션 {}: 유효하지 않은 범위 {} (size {})",
                self.port, range, self.size
            );
            return Ok(Handled::Rejected);
        }

        let actual = self.file.metadata().await?.len();
        if actual != self.size {
            return Err(Error::SizeChanged {
                expected: self.size,
                actual,
            });
        }

        let mut payload = vec![0u8; range.len() as usize];
        self.file.seek(SeekFrom::Start(range.start)).await?;
        self.file.read_exact(&mut payload).await?;

        let reply = Message::Data {
            filename: self.filename.clone(),
            range,
            payload: Bytes::from(payload),
        };
        self.socket.send_to(&reply.to_bytes(), self.client).await?;

        self.stats.requests += 1;
        self.stats.attempts += 1;
        self.stats.record_bytes(range.len() as usize);

        Ok(Handled::Served)
    }
}
