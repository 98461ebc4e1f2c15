//! 클라이언트 전송 드라이버
//!
//! 파일 하나씩 순서대로:
//! 1. DOWNLOAD 핸드쉐이크로 크기와 데이터 포트 확인
//! 2. 블록 단위 GET 반복, 응답을 해당 오프셋에 기록
//! 3. 마지막 블록 이후 CLOSE
//!
//! 한 파일의 실패는 다음 파일 전송에 영향을 주지 않는다.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::block::{ByteRange, ClientProgress};
use crate::message::{validate_filename, Message};
use crate::retry::{Outcome, RetryEngine, RetryPolicy};
use crate::stats::TransferStats;
use crate::transport::DatagramChannel;
use crate::{Config, Error, Result};

/// 파일 하나의 전송 결과
#[derive(Debug)]
pub enum TransferOutcome {
    /// 모든 바이트 기록 후 CLOSE_OK 수신
    Completed,

    /// 모든 바이트를 기록했지만 CLOSE_OK를 받지 못함 (기록된 파일은 유지)
    CloseUnacknowledged,

    /// 서버에 파일 없음
    NotFound,

    /// 전송 중단 (이미 기록된 바이트는 남음)
    Failed(Error),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Completed)
    }
}

/// 파일 하나의 전송 보고서
#[derive(Debug)]
pub struct TransferReport {
    pub filename: String,

    /// 핸드쉐이크에서 받은 크기
    pub size: Option<u64>,

    /// 수신한 블록 (요청 순서)
    pub blocks: Vec<ByteRange>,

    pub outcome: TransferOutcome,

    pub stats: TransferStats,
}

impl TransferReport {
    fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            size: None,
            blocks: Vec::new(),
            outcome: TransferOutcome::NotFound,
            stats: TransferStats::new(),
        }
    }
}

/// 클라이언트 전송 드라이버
pub struct TransferDriver<C = UdpSocket> {
    engine: RetryEngine<C>,
    control_addr: SocketAddr,
    output_dir: PathBuf,
    config: Config,
}

impl TransferDriver<UdpSocket> {
    /// UDP 소켓을 바인딩하고 드라이버 생성
    pub async fn bind(
        bind_addr: SocketAddr,
        control_addr: SocketAddr,
        output_dir: impl Into<PathBuf>,
        config: Config,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        Self::with_channel(socket, control_addr, output_dir, config)
    }
}

impl<C: DatagramChannel> TransferDriver<C> {
    /// 임의의 데이터그램 채널로 드라이버 생성
    pub fn with_channel(
        channel: C,
        control_addr: SocketAddr,
        output_dir: impl Into<PathBuf>,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let engine = RetryEngine::new(channel, RetryPolicy::from(&config))
            .with_buffer_size(config.recv_buffer_size);

        Ok(Self {
            engine,
            control_addr,
            output_dir: output_dir.into(),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.engine.channel().local_addr()?)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 목록의 모든 파일을 순서대로 전송
    pub async fn download_all<I, S>(&mut self, filenames: I) -> Vec<TransferReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut reports = Vec::new();
        for filename in filenames {
            reports.push(self.download(filename.as_ref()).await);
        }

        let succeeded = reports.iter().filter(|r| r.outcome.is_success()).count();
        info!("전송 완료: {}/{} 파일 성공", succeeded, reports.len());
        reports
    }

    /// 파일 하나 전송
    pub async fn download(&mut self, filename: &str) -> TransferReport {
        let mut report = TransferReport::new(filename);

        let outcome = match self.transfer(filename, &mut report).await {
            Ok(outcome) => outcome,
            Err(e) => TransferOutcome::Failed(e),
        };
        report.outcome = outcome;
        report.stats = self.engine.take_stats();
        report.stats.total_bytes = report.blocks.iter().map(ByteRange::len).sum();

        match &report.outcome {
            TransferOutcome::Completed => {
                info!("{} 완료: {}", filename, report.stats.summary());
            }
            TransferOutcome::CloseUnacknowledged => {
                warn!("{}: CLOSE_OK 응답 없음 (수신 데이터는 유지)", filename);
            }
            TransferOutcome::NotFound => warn!("{}: 서버에 파일 없음", filename),
            TransferOutcome::Failed(e) => warn!(
                "{} 실패: {} ({}개 블록 기록됨)",
                filename,
                e,
                report.blocks.len()
            ),
        }

        report
    }

    async fn transfer(
        &mut self,
        filename: &str,
        report: &mut TransferReport,
    ) -> Result<TransferOutcome> {
        validate_filename(filename)?;

        let (size, port) = match self.handshake(filename).await? {
            Some(v) => v,
            None => return Ok(TransferOutcome::NotFound),
        };
        report.size = Some(size);
        let session_addr = SocketAddr::new(self.control_addr.ip(), port);
        info!("{}: {} bytes, session {}", filename, size, session_addr);

        let path = self.output_dir.join(filename);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut output = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await?;

        let mut progress = ClientProgress::new(filename, size);
        while let Some(range) = progress.next_range(self.config.block_size) {
            let payload = self.fetch_range(filename, range, session_addr).await?;

            output.seek(SeekFrom::Start(range.start)).await?;
            output.write_all(&payload).await?;

            progress.advance(range);
            report.blocks.push(range);
            debug!(
                "{}: 블록 {} 수신 ({:.1}%)",
                filename,
                range,
                progress.ratio() * 100.0
            );
        }
        output.flush().await?;
        drop(output);

        if self.close(filename, session_addr).await? {
            Ok(TransferOutcome::Completed)
        } else {
            Ok(TransferOutcome::CloseUnacknowledged)
        }
    }

    /// DOWNLOAD 핸드쉐이크
    ///
    /// 파일이 없으면 `None`
    async fn handshake(&mut self, filename: &str) -> Result<Option<(u64, u16)>> {
        let request = Message::Download {
            filename: filename.to_string(),
        };

        let reply = match self.engine.send_and_receive(&request, self.control_addr).await? {
            Outcome::Reply(reply) => reply,
            Outcome::Invalid(e) => return Err(e),
            Outcome::Timeout { attempts } => return Err(Error::Timeout { attempts }),
        };
        reply.check_filename(filename)?;

        match reply {
            Message::Found { port: 0, .. } => Err(Error::malformed("데이터 포트 0")),
            Message::Found { size, port, .. } => Ok(Some((size, port))),
            Message::NotFound { .. } => Ok(None),
            other => Err(Error::MessageTypeMismatch {
                expected: "OK|ERR".to_string(),
                got: other.msg_type().to_string(),
            }),
        }
    }

    /// 블록 하나 요청
    async fn fetch_range(
        &mut self,
        filename: &str,
        range: ByteRange,
        session_addr: SocketAddr,
    ) -> Result<Bytes> {
        let request = Message::Get {
            filename: filename.to_string(),
            range,
        };

        let reply = match self.engine.send_and_receive(&request, session_addr).await? {
            Outcome::Reply(reply) => reply,
            Outcome::Invalid(e) => return Err(e),
            Outcome::Timeout { attempts } => return Err(Error::Timeout { attempts }),
        };
        reply.check_filename(filename)?;

        match reply {
            Message::Data {
                range: got,
                payload,
                ..
            } => {
                if got != range {
                    return Err(Error::RangeMismatch {
                        expected_start: range.start,
                        expected_end: range.end,
                        got_start: got.start,
                        got_end: got.end,
                    });
                }
                if payload.len() as u64 != range.len() {
                    return Err(Error::malformed(format!(
                        "데이터 길이 불일치: expected {}, got {}",
                        range.len(),
                        payload.len()
                    )));
                }
                Ok(payload)
            }
            other => Err(Error::MessageTypeMismatch {
                expected: "DATA".to_string(),
                got: other.msg_type().to_string(),
            }),
        }
    }

    /// CLOSE 전송, CLOSE_OK 수신 여부 반환
    async fn close(&mut self, filename: &str, session_addr: SocketAddr) -> Result<bool> {
        let request = Message::Close {
            filename: filename.to_string(),
        };

        match self.engine.send_and_receive(&request, session_addr).await? {
            Outcome::Reply(Message::CloseOk { filename: echoed }) if echoed == filename => Ok(true),
            Outcome::Reply(other) => {
                debug!("CLOSE 응답 불일치: {:?}", other.msg_type());
                Ok(false)
            }
            Outcome::Invalid(e) => {
                debug!("CLOSE 응답 디코딩 실패: {}", e);
                Ok(false)
            }
            Outcome::Timeout { .. } => Ok(false),
        }
    }
}
