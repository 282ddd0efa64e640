use crate::error::ConfigError;
use std::collections::{BTreeSet, HashMap};

// geosite 数据集为 length-delimited 的二进制容器：
// 顶层 field 1 为重复的 GeoSite 条目；GeoSite 的 field 1 是类目名，
// field 2 是重复的域名记录；域名记录的 field 1 为类型 varint，
// field 2 为取值字符串，field 3 为重复的属性；属性的 field 1 为键，
// field 2 为 bool varint，field 3 为 int varint。
// 未知字段按 wire type 跳过。

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LENGTH_DELIMITED: u64 = 2;
const WIRE_START_GROUP: u64 = 3;
const WIRE_END_GROUP: u64 = 4;
const WIRE_FIXED32: u64 = 5;

// 域名记录类型，对应 v2ray geosite 的 Domain.Type 枚举
pub const GEO_DOMAIN_PLAIN: u64 = 0;
pub const GEO_DOMAIN_REGEX: u64 = 1;
pub const GEO_DOMAIN_DOMAIN: u64 = 2;
pub const GEO_DOMAIN_FULL: u64 = 3;

// 单个属性的取值，bool 与 int 互斥出现
#[derive(Debug, Clone, Default)]
pub struct GeoAttribute {
    pub bool_value: Option<bool>,
    pub int_value: Option<i64>,
}

// 单条域名记录
#[derive(Debug, Clone)]
pub struct GeoDomain {
    pub kind: u64,
    pub value: String,
    pub attributes: HashMap<String, GeoAttribute>,
}

impl GeoDomain {
    // 属性存在性过滤。attr 为空时恒真；negate 取反
    pub fn matches_attribute(&self, attr: &str, negate: bool) -> bool {
        if attr.is_empty() {
            return true;
        }
        let Some(val) = self.attributes.get(attr) else {
            return negate;
        };
        let has = if let Some(b) = val.bool_value {
            b
        } else if let Some(i) = val.int_value {
            i != 0
        } else {
            return negate;
        };
        if negate {
            !has
        } else {
            has
        }
    }

    // 映射到域名匹配器的规则字符串
    pub fn to_rule(&self) -> Option<String> {
        match self.kind {
            GEO_DOMAIN_PLAIN => Some(format!("keyword:{}", self.value)),
            GEO_DOMAIN_REGEX => Some(format!("regexp:{}", self.value)),
            GEO_DOMAIN_DOMAIN => Some(format!("suffix:{}", self.value)),
            GEO_DOMAIN_FULL => Some(format!("full:{}", self.value)),
            _ => None,
        }
    }
}

fn truncated() -> ConfigError {
    ConfigError::Geosite("unexpected end of data".to_string())
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn has_more(&self) -> bool {
        self.offset < self.data.len()
    }

    fn read_varint(&mut self) -> Result<u64, ConfigError> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = *self.data.get(self.offset).ok_or_else(truncated)?;
            self.offset += 1;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(ConfigError::Geosite("varint overflow".to_string()));
            }
        }
    }

    fn read_tag(&mut self) -> Result<(u64, u64), ConfigError> {
        let val = self.read_varint()?;
        if val == 0 {
            return Err(ConfigError::Geosite("invalid tag 0".to_string()));
        }
        Ok((val >> 3, val & 0x7))
    }

    fn read_bytes(&mut self) -> Result<&'a [u8], ConfigError> {
        let len = self.read_varint()? as usize;
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| ConfigError::Geosite(format!("invalid length {}", len)))?;
        let out = &self.data[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn read_string(&mut self) -> Result<String, ConfigError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ConfigError::Geosite("invalid utf-8 string".to_string()))
    }

    fn skip(&mut self, n: usize) -> Result<(), ConfigError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(truncated)?;
        self.offset = end;
        Ok(())
    }

    // 按 wire type 跳过字段，组类型需要递归跳到配对的结束标记
    fn skip_field(&mut self, wire_type: u64) -> Result<(), ConfigError> {
        match wire_type {
            WIRE_VARINT => {
                self.read_varint()?;
                Ok(())
            }
            WIRE_FIXED64 => self.skip(8),
            WIRE_LENGTH_DELIMITED => {
                self.read_bytes()?;
                Ok(())
            }
            WIRE_START_GROUP => {
                loop {
                    let (_, inner) = self.read_tag()?;
                    if inner == WIRE_END_GROUP {
                        return Ok(());
                    }
                    self.skip_field(inner)?;
                }
            }
            WIRE_END_GROUP => Err(ConfigError::Geosite("unmatched end-group".to_string())),
            WIRE_FIXED32 => self.skip(4),
            other => Err(ConfigError::Geosite(format!("unknown wire type {}", other))),
        }
    }
}

// 解析整个数据集。wanted 非空时只解码命中的类目，
// 其余类目的域名子消息仅做按长度跳过
pub fn parse_geosite_list(
    data: &[u8],
    wanted: Option<&BTreeSet<String>>,
) -> Result<HashMap<String, Vec<GeoDomain>>, ConfigError> {
    let mut result: HashMap<String, Vec<GeoDomain>> = HashMap::new();
    let mut reader = Reader::new(data);
    while reader.has_more() {
        let (field, wire_type) = reader.read_tag()?;
        if field == 1 && wire_type == WIRE_LENGTH_DELIMITED {
            let entry = reader.read_bytes()?;
            if let Some((name, domains)) = parse_geosite_entry(entry, wanted)? {
                result.entry(name).or_default().extend(domains);
            }
            continue;
        }
        reader.skip_field(wire_type)?;
    }
    Ok(result)
}

// 解析单个 GeoSite 条目。域名记录先收集原始切片，
// 确认类目被需要后才真正解码
fn parse_geosite_entry(
    data: &[u8],
    wanted: Option<&BTreeSet<String>>,
) -> Result<Option<(String, Vec<GeoDomain>)>, ConfigError> {
    let mut reader = Reader::new(data);
    let mut name = String::new();
    let mut raw_domains: Vec<&[u8]> = Vec::new();
    while reader.has_more() {
        let (field, wire_type) = reader.read_tag()?;
        match field {
            1 => {
                if wire_type != WIRE_LENGTH_DELIMITED {
                    return Err(ConfigError::Geosite(format!(
                        "unexpected wire type {} for category name",
                        wire_type
                    )));
                }
                name = reader.read_string()?.trim().to_ascii_lowercase();
            }
            2 => {
                if wire_type != WIRE_LENGTH_DELIMITED {
                    return Err(ConfigError::Geosite(format!(
                        "unexpected wire type {} for domain record",
                        wire_type
                    )));
                }
                raw_domains.push(reader.read_bytes()?);
            }
            _ => reader.skip_field(wire_type)?,
        }
    }
    if name.is_empty() {
        return Ok(None);
    }
    if let Some(wanted) = wanted {
        if !wanted.contains(&name) {
            return Ok(None);
        }
    }
    let mut domains = Vec::with_capacity(raw_domains.len());
    for raw in raw_domains {
        domains.push(parse_geo_domain(raw)?);
    }
    Ok(Some((name, domains)))
}

fn parse_geo_domain(data: &[u8]) -> Result<GeoDomain, ConfigError> {
    let mut reader = Reader::new(data);
    let mut domain = GeoDomain {
        kind: GEO_DOMAIN_PLAIN,
        value: String::new(),
        attributes: HashMap::new(),
    };
    while reader.has_more() {
        let (field, wire_type) = reader.read_tag()?;
        match field {
            1 => {
                if wire_type != WIRE_VARINT {
                    return Err(ConfigError::Geosite(format!(
                        "unexpected wire type {} for domain type",
                        wire_type
                    )));
                }
                domain.kind = reader.read_varint()?;
            }
            2 => {
                if wire_type != WIRE_LENGTH_DELIMITED {
                    return Err(ConfigError::Geosite(format!(
                        "unexpected wire type {} for domain value",
                        wire_type
                    )));
                }
                domain.value = reader.read_string()?.trim().to_string();
            }
            3 => {
                if wire_type != WIRE_LENGTH_DELIMITED {
                    return Err(ConfigError::Geosite(format!(
                        "unexpected wire type {} for domain attribute",
                        wire_type
                    )));
                }
                let (key, attr) = parse_attribute(reader.read_bytes()?)?;
                if !key.is_empty() {
                    domain.attributes.insert(key, attr);
                }
            }
            _ => reader.skip_field(wire_type)?,
        }
    }
    if domain.value.is_empty() {
        return Err(ConfigError::Geosite("empty domain value".to_string()));
    }
    Ok(domain)
}

fn parse_attribute(data: &[u8]) -> Result<(String, GeoAttribute), ConfigError> {
    let mut reader = Reader::new(data);
    let mut key = String::new();
    let mut attr = GeoAttribute::default();
    while reader.has_more() {
        let (field, wire_type) = reader.read_tag()?;
        match field {
            1 => {
                if wire_type != WIRE_LENGTH_DELIMITED {
                    return Err(ConfigError::Geosite(format!(
                        "unexpected wire type {} for attribute key",
                        wire_type
                    )));
                }
                key = reader.read_string()?.trim().to_ascii_lowercase();
            }
            2 => {
                if wire_type != WIRE_VARINT {
                    return Err(ConfigError::Geosite(format!(
                        "unexpected wire type {} for attribute bool",
                        wire_type
                    )));
                }
                attr.bool_value = Some(reader.read_varint()? != 0);
            }
            3 => {
                if wire_type != WIRE_VARINT {
                    return Err(ConfigError::Geosite(format!(
                        "unexpected wire type {} for attribute int",
                        wire_type
                    )));
                }
                attr.int_value = Some(reader.read_varint()? as i64);
            }
            _ => reader.skip_field(wire_type)?,
        }
    }
    Ok((key, attr))
}

#[cfg(test)]
pub mod testutil {
    // 测试用的数据集编码器，按与解析器相同的 wire 布局产出字节
    pub fn varint(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    pub fn tag(field: u64, wire_type: u64) -> Vec<u8> {
        varint((field << 3) | wire_type)
    }

    pub fn length_delimited(field: u64, payload: &[u8]) -> Vec<u8> {
        let mut out = tag(field, 2);
        out.extend(varint(payload.len() as u64));
        out.extend_from_slice(payload);
        out
    }

    pub fn varint_field(field: u64, value: u64) -> Vec<u8> {
        let mut out = tag(field, 0);
        out.extend(varint(value));
        out
    }

    pub fn domain_record(kind: u64, value: &str, attrs: &[(&str, bool)]) -> Vec<u8> {
        let mut record = varint_field(1, kind);
        record.extend(length_delimited(2, value.as_bytes()));
        for (key, bool_value) in attrs {
            let mut attr = length_delimited(1, key.as_bytes());
            attr.extend(varint_field(2, u64::from(*bool_value)));
            record.extend(length_delimited(3, &attr));
        }
        record
    }

    pub fn category(name: &str, records: &[Vec<u8>]) -> Vec<u8> {
        let mut entry = length_delimited(1, name.as_bytes());
        for record in records {
            entry.extend(length_delimited(2, record));
        }
        entry
    }

    pub fn dataset(categories: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for cat in categories {
            out.extend(length_delimited(1, cat));
        }
        out
    }
}
