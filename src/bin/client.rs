//! udpget 클라이언트 - 목록 파일의 파일들을 순서대로 다운로드
//!
//! 사용법:
//!   cargo run --release --bin udpget-client -- [OPTIONS] --list <FILE>
//!
//! 예시:
//!   # 기본 다운로드
//!   cargo run --release --bin udpget-client -- --server 127.0.0.1:9000 --list files.txt -o ./downloads
//!
//!   # 손실 10% 시뮬레이션 + 작은 블록
//!   cargo run --release --bin udpget-client -- -s 127.0.0.1:9000 -l files.txt --drop-rate 0.1 --block-size 512

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use udpget::filelist::read_file_list;
use udpget::{
    BackoffScope, Config, DatagramChannel, LossyChannel, TransferDriver, DEFAULT_BLOCK_SIZE,
};

/// udpget 클라이언트
#[derive(Parser, Debug)]
#[command(
    name = "udpget-client",
    version,
    about = "udpget client - lock-step ranged file download over UDP"
)]
struct Args {
    /// 서버 제어 주소 (host:port)
    #[arg(short = 's', long, default_value = "127.0.0.1:9000")]
    server: String,

    /// 다운로드할 파일 목록 (한 줄에 하나)
    #[arg(short = 'l', long)]
    list: PathBuf,

    /// 저장 디렉터리
    #[arg(short = 'o', long, default_value = ".")]
    output: PathBuf,

    /// 로컬 바인드 주소 (기본: 서버 주소 계열의 임시 포트)
    #[arg(short = 'b', long)]
    bind: Option<SocketAddr>,

    /// GET 블록 크기 (바이트)
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u64,

    /// 초기 재전송 타임아웃 (밀리초)
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// 요청당 최대 시도 횟수
    #[arg(long, default_value_t = 5)]
    attempts: u32,

    /// 백오프 상한 (밀리초), 생략 시 무제한
    #[arg(long)]
    max_timeout_ms: Option<u64>,

    /// 백오프 상태를 요청 간에 유지
    #[arg(long)]
    persistent_backoff: bool,

    /// 패킷 손실 시뮬레이션 비율 (0.0 ~ 1.0)
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f64,

    /// debug 로그 출력
    #[arg(short = 'v', long)]
    verbose: bool,
}

async fn run<C: DatagramChannel>(mut driver: TransferDriver<C>, filenames: Vec<String>) -> bool {
    let reports = driver.download_all(&filenames).await;

    let mut all_ok = true;
    for report in &reports {
        if !report.outcome.is_success() {
            all_ok = false;
            warn!("FAILED {}: {:?}", report.filename, report.outcome);
        }
    }
    all_ok
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 로깅 설정
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server_addr = tokio::net::lookup_host(&args.server)
        .await?
        .next()
        .ok_or_else(|| format!("주소를 찾을 수 없음: {}", args.server))?;
    let bind_addr = args.bind.unwrap_or_else(|| {
        let ip = if server_addr.is_ipv6() {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        SocketAddr::new(ip, 0)
    });

    let config = Config {
        block_size: args.block_size,
        initial_timeout: Duration::from_millis(args.timeout_ms),
        max_attempts: args.attempts,
        max_timeout: args.max_timeout_ms.map(Duration::from_millis),
        backoff_scope: if args.persistent_backoff {
            BackoffScope::Persistent
        } else {
            BackoffScope::PerRequest
        },
        ..Config::default()
    };

    let filenames = read_file_list(&args.list).await?;

    info!("udpget client starting...");
    info!("Server address: {}", server_addr);
    info!("Files: {}", filenames.len());
    info!("Block size: {} bytes", config.block_size);

    let socket = UdpSocket::bind(bind_addr).await?;
    info!("Bound to local address: {}", socket.local_addr()?);

    let all_ok = if args.drop_rate > 0.0 {
        info!("Simulated loss: {:.1}%", args.drop_rate * 100.0);
        let channel = LossyChannel::new(socket, args.drop_rate);
        let driver = TransferDriver::with_channel(channel, server_addr, args.output, config)?;
        run(driver, filenames).await
    } else {
        let driver = TransferDriver::with_channel(socket, server_addr, args.output, config)?;
        run(driver, filenames).await
    };

    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}
