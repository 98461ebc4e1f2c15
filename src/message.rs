//! 프로토콜 메시지 정의
//!
//! 공백으로 구분된 한 줄 텍스트 메시지. 바이너리 데이터는 base64로
//! 인코딩되어 마지막 토큰에 실린다.
//!
//! | 메시지 | 형식 |
//! |---|---|
//! | Download | `DOWNLOAD <filename>` |
//! | Found | `OK <filename> SIZE <size> PORT <port>` |
//! | NotFound | `ERR <filename> NOT_FOUND` |
//! | Get | `FILE <filename> GET START <s> END <e>` |
//! | Data | `FILE <filename> OK START <s> END <e> DATA <base64>` |
//! | Close | `FILE <filename> CLOSE` |
//! | CloseOk | `FILE <filename> CLOSE_OK` |

use std::fmt;
use std::path::{Component, Path};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;

use crate::block::ByteRange;
use crate::{Error, Result};

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// 다운로드 요청 (클라이언트 → 제어 포트)
    Download,

    /// 다운로드 수락: 크기 + 데이터 포트
    Found,

    /// 파일 없음
    NotFound,

    /// 범위 읽기 요청
    Get,

    /// 범위 데이터 응답
    Data,

    /// 세션 종료 요청
    Close,

    /// 세션 종료 응답
    CloseOk,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Download => "DOWNLOAD",
            MessageType::Found => "OK",
            MessageType::NotFound => "ERR",
            MessageType::Get => "GET",
            MessageType::Data => "DATA",
            MessageType::Close => "CLOSE",
            MessageType::CloseOk => "CLOSE_OK",
        };
        f.write_str(name)
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Download {
        filename: String,
    },
    Found {
        filename: String,
        size: u64,
        port: u16,
    },
    NotFound {
        filename: String,
    },
    Get {
        filename: String,
        range: ByteRange,
    },
    Data {
        filename: String,
        range: ByteRange,
        payload: Bytes,
    },
    Close {
        filename: String,
    },
    CloseOk {
        filename: String,
    },
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Download { .. } => MessageType::Download,
            Message::Found { .. } => MessageType::Found,
            Message::NotFound { .. } => MessageType::NotFound,
            Message::Get { .. } => MessageType::Get,
            Message::Data { .. } => MessageType::Data,
            Message::Close { .. } => MessageType::Close,
            Message::CloseOk { .. } => MessageType::CloseOk,
        }
    }

    /// 메시지가 가리키는 파일 이름
    pub fn filename(&self) -> &str {
        match self {
            Message::Download { filename }
            | Message::Found { filename, .. }
            | Message::NotFound { filename }
            | Message::Get { filename, .. }
            | Message::Data { filename, .. }
            | Message::Close { filename }
            | Message::CloseOk { filename } => filename,
        }
    }

    /// 에코된 파일 이름 검증
    pub fn check_filename(&self, expected: &str) -> Result<()> {
        if self.filename() != expected {
            return Err(Error::FilenameMismatch {
                expected: expected.to_string(),
                got: self.filename().to_string(),
            });
        }
        Ok(())
    }

    /// 한 줄 텍스트로 직렬화
    ///
    /// 파일 이름은 토큰 하나로 실리므로 `validate_filename`을 통과한 이름이어야
    /// 한다. 비어 있거나 공백이 든 이름은 `from_bytes`에서 거부된다.
    pub fn to_bytes(&self) -> Vec<u8> {
        let line = match self {
            Message::Download { filename } => format!("DOWNLOAD {}", filename),
            Message::Found {
                filename,
                size,
                port,
            } => format!("OK {} SIZE {} PORT {}", filename, size, port),
            Message::NotFound { filename } => format!("ERR {} NOT_FOUND", filename),
            Message::Get { filename, range } => {
                format!("FILE {} GET START {} END {}", filename, range.start, range.end)
            }
            Message::Data {
                filename,
                range,
                payload,
            } => format!(
                "FILE {} OK START {} END {} DATA {}",
                filename,
                range.start,
                range.end,
                STANDARD.encode(payload)
            ),
            Message::Close { filename } => format!("FILE {} CLOSE", filename),
            Message::CloseOk { filename } => format!("FILE {} CLOSE_OK", filename),
        };
        line.into_bytes()
    }

    /// 바이트에서 역직렬화
    ///
    /// 토큰 개수와 키워드가 정확히 맞아야 한다. DATA 뒤 base64가 잘못된
    /// 경우 `Error::Base64`를 반환한다.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let line = std::str::from_utf8(bytes)
            .map_err(|_| Error::malformed("UTF-8이 아닌 메시지"))?;
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();

        match tokens.as_slice() {
            ["DOWNLOAD", filename] => Ok(Message::Download {
                filename: filename.to_string(),
            }),
            ["OK", filename, "SIZE", size, "PORT", port] => Ok(Message::Found {
                filename: filename.to_string(),
                size: parse_uint(size)?,
                port: parse_uint(port)?
                    .try_into()
                    .map_err(|_| Error::malformed(format!("포트 범위 초과: {}", port)))?,
            }),
            ["ERR", filename, "NOT_FOUND"] => Ok(Message::NotFound {
                filename: filename.to_string(),
            }),
            ["FILE", filename, "GET", "START", start, "END", end] => Ok(Message::Get {
                filename: filename.to_string(),
                range: ByteRange::new(parse_uint(start)?, parse_uint(end)?),
            }),
            ["FILE", filename, "OK", "START", start, "END", end, "DATA", rest @ ..]
                if rest.len() <= 1 =>
            {
                let payload = match rest.first() {
                    Some(encoded) => STANDARD.decode(encoded)?,
                    None => Vec::new(),
                };
                Ok(Message::Data {
                    filename: filename.to_string(),
                    range: ByteRange::new(parse_uint(start)?, parse_uint(end)?),
                    payload: Bytes::from(payload),
                })
            }
            ["FILE", filename, "CLOSE"] => Ok(Message::Close {
                filename: filename.to_string(),
            }),
            ["FILE", filename, "CLOSE_OK"] => Ok(Message::CloseOk {
                filename: filename.to_string(),
            }),
            [] => Err(Error::malformed("빈 메시지")),
            [tag, ..] => Err(Error::malformed(format!(
                "알 수 없는 형식: tag={}, tokens={}",
                tag,
                tokens.len()
            ))),
        }
    }
}

/// 10진수 부호 없는 정수 파싱 (부호/공백/앞자리 0 불허)
fn parse_uint(token: &str) -> Result<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed(format!("숫자가 아님: {}", token)));
    }
    if token.len() > 1 && token.starts_with('0') {
        return Err(Error::malformed(format!("앞자리 0: {}", token)));
    }
    token
        .parse()
        .map_err(|_| Error::malformed(format!("숫자 범위 초과: {}", token)))
}

/// 파일 이름 검증
///
/// 비어 있지 않고, 공백이 없으며, 일반 경로 구성요소로만 된 상대 경로여야 한다.
pub fn validate_filename(name: &str) -> Result<()> {
    let invalid = || Error::InvalidFilename(name.to_string());

    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let all_normal = Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !all_normal {
        return Err(invalid());
    }
    Ok(())
}
