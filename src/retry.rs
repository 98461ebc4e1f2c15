//! 재전송 엔진 (stop-and-wait)
//!
//! - 요청 송신 후 타임아웃까지 응답 대기
//! - 타임아웃마다 대기 시간 2배 (선택적 상한)
//! - 시도 횟수 소진 시 Timeout 반환
//!
//! 한 번에 하나의 요청만 처리하며 파이프라이닝은 없다.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::BackoffScope;
use crate::message::Message;
use crate::stats::TransferStats;
use crate::transport::DatagramChannel;
use crate::{Config, Error, Result, MAX_DATAGRAM_SIZE};

/// 한 번에 비우는 대기 데이터그램 최대 수
const MAX_DISCARD: usize = 1024;

/// 재전송 정책
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_timeout: Duration,
    pub max_attempts: u32,
    pub max_timeout: Option<Duration>,
    pub scope: BackoffScope,
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            initial_timeout: config.initial_timeout,
            max_attempts: config.max_attempts,
            max_timeout: config.max_timeout,
            scope: config.backoff_scope,
        }
    }
}

impl RetryPolicy {
    /// 타임아웃 이후 다음 대기 시간
    pub fn next_timeout(&self, current: Duration) -> Duration {
        let doubled = current.saturating_mul(2);
        match self.max_timeout {
            Some(cap) => doubled.min(cap),
            None => doubled,
        }
    }
}

/// 요청-응답 교환 결과
#[derive(Debug)]
pub enum Outcome {
    /// 대상 주소에서 온 정상 응답
    Reply(Message),

    /// 응답은 도착했지만 디코딩 실패
    Invalid(Error),

    /// 시도 횟수 소진
    Timeout { attempts: u32 },
}

/// 재전송 엔진
pub struct RetryEngine<C> {
    channel: C,
    policy: RetryPolicy,
    timeout: Duration,
    buf: Vec<u8>,
    stats: TransferStats,
}

impl<C: DatagramChannel> RetryEngine<C> {
    pub fn new(channel: C, policy: RetryPolicy) -> Self {
        Self {
            timeout: policy.initial_timeout,
            channel,
            policy,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
            stats: TransferStats::new(),
        }
    }

    /// 수신 버퍼 크기 지정
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buf = vec![0u8; size.max(1)];
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 다음 요청의 첫 대기 시간
    pub fn current_timeout(&self) -> Duration {
        self.timeout
    }

    /// 누적 통계를 꺼내고 새로 시작
    pub fn take_stats(&mut self) -> TransferStats {
        std::mem::take(&mut self.stats)
    }

    /// 요청 송신 후 응답 수신
    ///
    /// 채널 송신 자체가 실패한 경우에만 `Err`를 반환한다.
    pub async fn send_and_receive(
        &mut self,
        message: &Message,
        target: SocketAddr,
    ) -> Result<Outcome> {
        if self.policy.scope == BackoffScope::PerRequest {
            self.timeout = self.policy.initial_timeout;
        }
        self.discard_pending();

        let bytes = message.to_bytes();
        self.stats.requests += 1;

        let mut attempts = 0u32;
        loop {
            self.channel.send_to(&bytes, target).await?;
            self.stats.attempts += 1;
            trace!(
                "{} 송신 -> {} (timeout {:?})",
                message.msg_type(),
                target,
                self.timeout
            );

            if let Some(len) = self.await_reply(target).await {
                self.stats.touch();
                return Ok(match Message::from_bytes(&self.buf[..len]) {
                    Ok(reply) => Outcome::Reply(reply),
                    Err(e) => Outcome::Invalid(e),
                });
            }

            attempts += 1;
            self.stats.timeouts += 1;
            if attempts >= self.policy.max_attempts {
                debug!(
                    "{} 응답 없음: {}회 시도 후 포기 ({})",
                    message.msg_type(),
                    attempts,
                    target
                );
                return Ok(Outcome::Timeout { attempts });
            }

            self.timeout = self.policy.next_timeout(self.timeout);
            debug!(
                "{} 타임아웃 #{}: {:?} 후 재전송",
                message.msg_type(),
                attempts,
                self.timeout
            );
        }
    }

    /// 현재 타임아웃 동안 대상 주소의 데이터그램 대기
    async fn await_reply(&mut self, target: SocketAddr) -> Option<usize> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match tokio::time::timeout_at(deadline, self.channel.recv_from(&mut self.buf)).await {
                Err(_) => return None,
                Ok(Ok((len, from))) if from == target => return Some(len),
                Ok(Ok((len, from))) => {
                    debug!("예상하지 않은 송신자 무시: {} ({} bytes)", from, len);
                }
                Ok(Err(e)) => {
                    debug!("수신 에러: {}", e);
                    tokio::time::sleep_until(deadline).await;
                    return None;
                }
            }
        }
    }

    /// 이전 요청의 늦은 응답 제거
    fn discard_pending(&mut self) {
        let mut discarded = 0;
        while discarded < MAX_DISCARD {
            match self.channel.try_recv_from(&mut self.buf) {
                Ok(_) => discarded += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        if discarded > 0 {
            debug!("대기 중이던 늦은 응답 {}개 폐기", discarded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ByteRange;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// 응답 시점을 지정할 수 있는 가짜 채널
    struct ScriptedChannel {
        peer: SocketAddr,
        sends: Mutex<Vec<Instant>>,
        answer_on_attempt: Option<usize>,
        replies: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
        stale: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
    }

    impl ScriptedChannel {
        fn silent(peer: SocketAddr) -> Self {
            Self {
                peer,
                sends: Mutex::new(Vec::new()),
                answer_on_attempt: None,
                replies: Mutex::new(VecDeque::new()),
                stale: Mutex::new(VecDeque::new()),
            }
        }

        fn answering(peer: SocketAddr, attempt: usize, reply: &[u8], from: SocketAddr) -> Self {
            let channel = Self {
                answer_on_attempt: Some(attempt),
                ..Self::silent(peer)
            };
            channel.replies.lock().push_back((reply.to_vec(), from));
            channel
        }

        fn send_count(&self) -> usize {
            self.sends.lock().len()
        }

        fn send_gaps(&self) -> Vec<Duration> {
            let sends = self.sends.lock();
            sends.windows(2).map(|w| w[1] - w[0]).collect()
        }

        fn next_reply(&self) -> Option<(Vec<u8>, SocketAddr)> {
            let sent = self.send_count();
            match self.answer_on_attempt {
                Some(attempt) if sent >= attempt => self.replies.lock().pop_front(),
                _ => None,
            }
        }
    }

    #[async_trait]
    impl DatagramChannel for ScriptedChannel {
        async fn send_to(&self, buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
            self.sends.lock().push(Instant::now());
            Ok(buf.len())
        }

        async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            match self.next_reply() {
                Some((data, from)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok((data.len(), from))
                }
                None => std::future::pending().await,
            }
        }

        fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            match self.stale.lock().pop_front() {
                Some((data, from)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok((data.len(), from))
                }
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(self.peer)
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn policy(max_attempts: u32, scope: BackoffScope) -> RetryPolicy {
        RetryPolicy {
            initial_timeout: Duration::from_secs(1),
            max_attempts,
            max_timeout: None,
            scope,
        }
    }

    fn download() -> Message {
        Message::Download {
            filename: "a.bin".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_channel_exhausts_budget() {
        let mut engine = RetryEngine::new(
            ScriptedChannel::silent(peer()),
            policy(4, BackoffScope::PerRequest),
        );

        let outcome = engine.send_and_receive(&download(), peer()).await.unwrap();

        assert!(matches!(outcome, Outcome::Timeout { attempts: 4 }));
        assert_eq!(engine.channel().send_count(), 4);
        assert_eq!(
            engine.channel().send_gaps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );

        let stats = engine.take_stats();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.timeouts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_after_retransmissions() {
        let reply = b"OK a.bin SIZE 10 PORT 4000";
        let channel = ScriptedChannel::answering(peer(), 3, reply, peer());
        let mut engine = RetryEngine::new(channel, policy(5, BackoffScope::PerRequest));

        let outcome = engine.send_and_receive(&download(), peer()).await.unwrap();

        match outcome {
            Outcome::Reply(Message::Found { size, port, .. }) => {
                assert_eq!(size, 10);
                assert_eq!(port, 4000);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(engine.channel().send_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_from_other_address_is_ignored() {
        let stranger: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let channel = ScriptedChannel::answering(peer(), 1, b"ERR a.bin NOT_FOUND", stranger);
        let mut engine = RetryEngine::new(channel, policy(2, BackoffScope::PerRequest));

        let outcome = engine.send_and_receive(&download(), peer()).await.unwrap();

        assert!(matches!(outcome, Outcome::Timeout { attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_reply_is_invalid() {
        let channel = ScriptedChannel::answering(peer(), 1, b"NONSENSE", peer());
        let mut engine = RetryEngine::new(channel, policy(3, BackoffScope::PerRequest));

        let outcome = engine.send_and_receive(&download(), peer()).await.unwrap();

        assert!(matches!(outcome, Outcome::Invalid(Error::Malformed { .. })));
        assert_eq!(engine.channel().send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_is_discarded() {
        let current = Message::Data {
            filename: "a.bin".into(),
            range: ByteRange::new(1000, 1000),
            payload: bytes::Bytes::from_static(b"b"),
        };
        let stale = Message::Data {
            filename: "a.bin".into(),
            range: ByteRange::new(0, 0),
            payload: bytes::Bytes::from_static(b"a"),
        };
        let channel = ScriptedChannel::answering(peer(), 1, &current.to_bytes(), peer());
        channel
            .stale
            .lock()
            .push_back((stale.to_bytes(), peer()));
        let mut engine = RetryEngine::new(channel, policy(3, BackoffScope::PerRequest));

        let request = Message::Get {
            filename: "a.bin".into(),
            range: ByteRange::new(1000, 1000),
        };
        let outcome = engine.send_and_receive(&request, peer()).await.unwrap();

        match outcome {
            Outcome::Reply(reply) => assert_eq!(reply, current),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_scope() {
        let mut per_request = RetryEngine::new(
            ScriptedChannel::silent(peer()),
            policy(3, BackoffScope::PerRequest),
        );
        per_request.send_and_receive(&download(), peer()).await.unwrap();
        assert_eq!(per_request.current_timeout(), Duration::from_secs(4));
        per_request.send_and_receive(&download(), peer()).await.unwrap();
        // 두 번째 요청도 1초부터 시작
        assert_eq!(
            per_request.channel().send_gaps()[2..],
            [Duration::from_secs(4), Duration::from_secs(1), Duration::from_secs(2)]
        );

        let mut persistent = RetryEngine::new(
            ScriptedChannel::silent(peer()),
            policy(3, BackoffScope::Persistent),
        );
        persistent.send_and_receive(&download(), peer()).await.unwrap();
        persistent.send_and_receive(&download(), peer()).await.unwrap();
        assert_eq!(persistent.current_timeout(), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_cap() {
        let policy = RetryPolicy {
            max_timeout: Some(Duration::from_secs(3)),
            ..policy(10, BackoffScope::PerRequest)
        };
        assert_eq!(policy.next_timeout(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(policy.next_timeout(Duration::from_secs(2)), Duration::from_secs(3));
        assert_eq!(policy.next_timeout(Duration::from_secs(3)), Duration::from_secs(3));
    }
}
