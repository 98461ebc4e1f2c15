//! udpget 서버 - 제어 디스패처 + 세션
//!
//! 사용법:
//!   cargo run --release --bin udpget-server -- [OPTIONS]
//!
//! 예시:
//!   # 현재 디렉터리 제공
//!   cargo run --release --bin udpget-server -- --bind 0.0.0.0:9000 --root .
//!
//!   # 데이터 포트 범위 지정 + 짧은 유휴 타임아웃
//!   cargo run --release --bin udpget-server -- -r ./files --port-range 40000-40100 --idle-timeout-ms 2000

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use udpget::{Config, Dispatcher, PortAllocation};

/// udpget 서버
#[derive(Parser, Debug)]
#[command(
    name = "udpget-server",
    version,
    about = "udpget server - lock-step ranged file download over UDP"
)]
struct Args {
    /// 제어 포트 바인드 주소
    #[arg(short = 'b', long, default_value = "0.0.0.0:9000")]
    bind: SocketAddr,

    /// 제공할 파일 루트 디렉터리
    #[arg(short = 'r', long, default_value = ".")]
    root: PathBuf,

    /// 세션 유휴 타임아웃 (밀리초)
    #[arg(long, default_value_t = 5000)]
    idle_timeout_ms: u64,

    /// 데이터 포트 범위 (예: 40000-40100), 생략 시 OS 할당
    #[arg(long, value_parser = parse_port_range)]
    port_range: Option<PortAllocation>,

    /// debug 로그 출력
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn parse_port_range(s: &str) -> Result<PortAllocation, String> {
    let (low, high) = s
        .split_once('-')
        .ok_or_else(|| format!("LOW-HIGH 형식이 필요함: {}", s))?;
    let low: u16 = low.trim().parse().map_err(|e| format!("{}: {}", low, e))?;
    let high: u16 = high.trim().parse().map_err(|e| format!("{}: {}", high, e))?;
    Ok(PortAllocation::Range { low, high })
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

    let config = Config {
        session_idle_timeout: Duration::from_millis(args.idle_timeout_ms),
        data_ports: args.port_range.unwrap_or(PortAllocation::Ephemeral),
        ..Config::default()
    };

    info!("udpget server starting...");
    info!("Bind address: {}", args.bind);
    info!("Root: {:?}", args.root);
    info!("Idle timeout: {:?}", config.session_idle_timeout);
    info!("Data ports: {:?}", config.data_ports);

    let dispatcher = Dispatcher::bind(args.bind, args.root, config).await?;
    dispatcher.run().await?;

    Ok(())
}
