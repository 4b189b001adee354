//! 种子文件解析 - 只解析 announce 和文件列表

use crate::db::TorrentFileEntry;
use crate::error::DecodeError;
use std::collections::BTreeMap;

/// bencode 值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    pub fn get(&self, key: &str) -> Option<&BencodeValue> {
        match self {
            Self::Dict(map) => map.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<String> {
        match self {
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).to_string()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// 解析完整的 bencode 数据，末尾不允许有多余字节
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut parser = Parser { data, pos: 0 };
        let value = parser.value(0)?;
        if parser.pos != data.len() {
            return Err(DecodeError::Malformed {
                offset: parser.pos,
                reason: "trailing data",
            });
        }
        Ok(value)
    }
}

/// 嵌套层数上限，防止恶意数据导致栈溢出
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Result<u8, DecodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof(self.pos))
    }

    fn value(&mut self, depth: usize) -> Result<BencodeValue, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::Malformed {
                offset: self.pos,
                reason: "nesting too deep",
            });
        }
        match self.peek()? {
            b'i' => {
                self.pos += 1;
                let n = self.number(b'e')?;
                Ok(BencodeValue::Integer(n))
            }
            b'l' => {
                self.pos += 1;
                let mut list = Vec::new();
                while self.peek()? != b'e' {
                    list.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(BencodeValue::List(list))
            }
            b'd' => {
                self.pos += 1;
                let mut dict = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key = self.bytes()?;
                    let value = self.value(depth + 1)?;
                    dict.insert(key, value);
                }
                self.pos += 1;
                Ok(BencodeValue::Dict(dict))
            }
            b'0'..=b'9' => Ok(BencodeValue::Bytes(self.bytes()?)),
            _ => Err(DecodeError::Malformed {
                offset: self.pos,
                reason: "unexpected token",
            }),
        }
    }

    /// 读取整数直到终止符
    fn number(&mut self, terminator: u8) -> Result<i64, DecodeError> {
        let start = self.pos;
        let end = self.data[start..]
            .iter()
            .position(|b| *b == terminator)
            .map(|i| start + i)
            .ok_or(DecodeError::UnexpectedEof(self.data.len()))?;
        let n = std::str::from_utf8(&self.data[start..end])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(DecodeError::Malformed {
                offset: start,
                reason: "invalid integer",
            })?;
        self.pos = end + 1;
        Ok(n)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.pos;
        let len = self.number(b':')?;
        let len = usize::try_from(len).map_err(|_| DecodeError::Malformed {
            offset: start,
            reason: "negative length",
        })?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof(self.data.len()))?;
        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }
}

/// 种子元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMeta {
    pub announce: String,
    pub files: Vec<TorrentFileEntry>,
}

/// 解析种子文件，单文件种子的文件列表为 [info.name]
pub fn decode_torrent(data: &[u8]) -> Result<TorrentMeta, DecodeError> {
    let root = BencodeValue::decode(data)?;
    let info = root.get("info").ok_or(DecodeError::MissingField("info"))?;

    let announce = root
        .get("announce")
        .and_then(BencodeValue::as_str)
        .or_else(|| {
            root.get("announce-list")
                .and_then(BencodeValue::as_list)
                .and_then(|tiers| tiers.first())
                .and_then(|tier| match tier {
                    BencodeValue::List(urls) => urls.first().and_then(BencodeValue::as_str),
                    other => other.as_str(),
                })
        })
        .unwrap_or_default();

    let files = match info.get("files").and_then(BencodeValue::as_list) {
        Some(list) => list
            .iter()
            .map(|file| {
                let length = file
                    .get("length")
                    .and_then(BencodeValue::as_int)
                    .ok_or(DecodeError::MissingField("files.length"))?;
                let path = file
                    .get("path")
                    .and_then(BencodeValue::as_list)
                    .ok_or(DecodeError::MissingField("files.path"))?
                    .iter()
                    .filter_map(BencodeValue::as_str)
                    .collect::<Vec<_>>();
                Ok(TorrentFileEntry::new(path, length.max(0) as u64))
            })
            .collect::<Result<Vec<_>, DecodeError>>()?,
        None => {
            let name = info
                .get("name")
                .and_then(BencodeValue::as_str)
                .ok_or(DecodeError::MissingField("info.name"))?;
            let length = info
                .get("length")
                .and_then(BencodeValue::as_int)
                .ok_or(DecodeError::MissingField("info.length"))?;
            vec![TorrentFileEntry::new([name], length.max(0) as u64)]
        }
    };

    Ok(TorrentMeta { announce, files })
}
