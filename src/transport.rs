//! 데이터그램 채널 추상화
//!
//! - DatagramChannel: 신뢰성 없는 데이터그램 송수신 (UdpSocket 구현)
//! - LossyChannel: 확률적으로 패킷을 버리는 래퍼 (테스트/실험용)

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tracing::trace;

/// 신뢰성 없는 데이터그램 채널
#[async_trait]
pub trait DatagramChannel: Send + Sync {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// 대기 없이 이미 도착한 데이터그램 하나를 읽음
    ///
    /// 없으면 `io::ErrorKind::WouldBlock`
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl DatagramChannel for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::try_recv_from(self, buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// 패킷 손실 주입 래퍼
///
/// 송신과 수신 양방향에서 `drop_rate` 확률로 데이터그램을 버린다.
pub struct LossyChannel<C> {
    inner: C,
    drop_rate: f64,
    rng: Mutex<StdRng>,
}

impl<C: DatagramChannel> LossyChannel<C> {
    pub fn new(inner: C, drop_rate: f64) -> Self {
        Self {
            inner,
            drop_rate: drop_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// 재현 가능한 손실 패턴용 시드 지정
    pub fn with_seed(inner: C, drop_rate: f64, seed: u64) -> Self {
        Self {
            inner,
            drop_rate: drop_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn should_drop(&self) -> bool {
        if self.drop_rate <= 0.0 {
            return false;
        }
        self.rng.lock().gen_bool(self.drop_rate)
    }
}

#[async_trait]
impl<C: DatagramChannel> DatagramChannel for LossyChannel<C> {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        if self.should_drop() {
            trace!("송신 패킷 폐기: {} bytes -> {}", buf.len(), target);
            return Ok(buf.len());
        }
        self.inner.send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let (len, from) = self.inner.recv_from(buf).await?;
            if self.should_drop() {
                trace!("수신 패킷 폐기: {} bytes <- {}", len, from);
                continue;
            }
            return Ok((len, from));
        }
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.try_recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_udp_channel_round_trip() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = DatagramChannel::local_addr(&b).unwrap();

        DatagramChannel::send_to(&a, b"ping", b_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = tokio::time::timeout(
            Duration::from_secs(2),
            DatagramChannel::recv_from(&b, &mut buf),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_lossy_channel_drops_everything_at_rate_one() {
        let a = LossyChannel::new(UdpSocket::bind("127.0.0.1:0").await.unwrap(), 1.0);
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = b.local_addr().unwrap();

        let sent = a.send_to(b"lost", b_addr).await.unwrap();
        assert_eq!(sent, 4);

        let mut buf = [0u8; 16];
        let result = tokio::time::timeout(Duration::from_millis(100), b.recv_from(&mut buf)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_same_seed_drops_the_same_datagrams() {
        let pattern = |seed: u64| async move {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let channel = LossyChannel::with_seed(socket, 0.5, seed);
            (0..64).map(|_| channel.should_drop()).collect::<Vec<_>>()
        };

        let first = pattern(42).await;
        assert_eq!(first, pattern(42).await);
        assert!(first.iter().any(|&d| d));
        assert!(first.iter().any(|&d| !d));
    }
}
