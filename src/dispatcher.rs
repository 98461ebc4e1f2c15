//! 제어 디스패처 (서버측 단일 랑데부 포트)
//!
//! - DOWNLOAD 요청 검증, 파일 존재 확인
//! - 데이터 포트 할당 후 크기/포트 응답
//! - 세션을 독립 태스크로 실행
//!
//! 세션 상태는 공유하지 않으며 이벤트 채널로만 관찰할 수 있다.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use rand::Rng;
use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::PortAllocation;
use crate::message::{validate_filename, Message};
use crate::session::{Session, SessionReport};
use crate::{Config, Error, Result};

/// 세션 이벤트
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started {
        filename: String,
        client: SocketAddr,
        port: u16,
    },
    Finished(SessionReport),
}

/// 제어 디스패처
pub struct Dispatcher {
    socket: UdpSocket,
    root: PathBuf,
    config: Config,
    events: Option<mpsc::Sender<SessionEvent>>,
}

impl Dispatcher {
    /// 제어 포트 바인딩
    pub async fn bind(addr: SocketAddr, root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(addr).await?;

        Ok(Self {
            socket,
            root: root.into(),
            config,
            events: None,
        })
    }

    /// 세션 이벤트 수신 채널 연결
    pub fn with_events(mut self, events: mpsc::Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 수신 루프
    ///
    /// 개별 요청의 실패는 로그만 남기고 루프를 계속한다.
    pub async fn run(self) -> Result<()> {
        info!(
            "Dispatcher listening on {} (root: {:?})",
            self.socket.local_addr()?,
            self.root
        );

        let mut buf = vec![0u8; self.config.recv_buffer_size];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.handle_request(&buf[..len], from).await {
                warn!("요청 처리 에러 ({}): {}", from, e);
            }
        }
    }

    /// 제어 메시지 처리
    async fn handle_request(&self, data: &[u8], from: SocketAddr) -> Result<()> {
        let filename = match Message::from_bytes(data) {
            Ok(Message::Download { filename }) => filename,
            Ok(other) => {
                debug!("제어 포트에서 {} 메시지 무시 ({})", other.msg_type(), from);
                return Ok(());
            }
            Err(e) => {
                debug!("잘못된 제어 메시지 무시 ({}): {}", from, e);
                return Ok(());
            }
        };

        info!("DOWNLOAD {} from {}", filename, from);

        let (file, size) = match self.open_file(&filename).await {
            Ok(v) => v,
            Err(e) => {
                info!("파일 없음: {} ({})", filename, e);
                return self.reply_not_found(filename, from).await;
            }
        };

        let socket = match self.allocate_data_socket().await {
            Ok(s) => s,
            Err(e) => {
                warn!("데이터 포트 할당 실패: {}", e);
                return self.reply_not_found(filename, from).await;
            }
        };

        let session = Session::new(filename.clone(), from, socket, file, size, &self.config)?;
        let port = session.port();

        let reply = Message::Found {
            filename: filename.clone(),
            size,
            port,
        };
        self.socket.send_to(&reply.to_bytes(), from).await?;
        info!("OK {}: {} bytes, port {}", filename, size, port);

        if let Some(events) = &self.events {
            let started = SessionEvent::Started {
                filename,
                client: from,
                port,
            };
            if events.try_send(started).is_err() {
                debug!("세션 이벤트 채널 가득 참");
            }
        }

        let events = self.events.clone();
        tokio::spawn(async move {
            let report = session.run().await;
            if let Some(events) = events {
                let _ = events.send(SessionEvent::Finished(report)).await;
            }
        });

        Ok(())
    }

    async fn reply_not_found(&self, filename: String, to: SocketAddr) -> Result<()> {
        let reply = Message::NotFound { filename };
        self.socket.send_to(&reply.to_bytes(), to).await?;
        Ok(())
    }

    /// 루트 아래 파일 열기 (읽기 가능한 일반 파일만)
    async fn open_file(&self, filename: &str) -> Result<(File, u64)> {
        validate_filename(filename)?;

        let path = self.root.join(filename);
        let file = File::open(&path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(Error::NotFound(filename.to_string()));
        }

        Ok((file, metadata.len()))
    }

    /// 세션 전용 소켓 바인딩
    async fn allocate_data_socket(&self) -> io::Result<UdpSocket> {
        let ip = self.socket.local_addr()?.ip();

        match self.config.data_ports {
            PortAllocation::Ephemeral => UdpSocket::bind(SocketAddr::new(ip, 0)).await,
            PortAllocation::Range { low, high } => {
                let span = u32::from(high - low) + 1;
                let offset = rand::thread_rng().gen_range(0..span);

                for i in 0..span {
                    let port = low + ((offset + i) % span) as u16;
                    match UdpSocket::bind(SocketAddr::new(ip, port)).await {
                        Ok(socket) => return Ok(socket),
                        Err(e) => debug!("포트 {} 바인딩 실패: {}", port, e),
                    }
                }

                Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("포트 범위 {}-{} 소진", low, high),
                ))
            }
        }
    }
}
