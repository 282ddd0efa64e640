use crate::action::{reply_skeleton, DnsAction};
use crate::error::{AppError, ConfigError};
use crate::matcher::normalize_domain;
use crate::r#const::action_limits;
use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{RData, Record, RecordType};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
struct HostConfig {
    // 内联记录：域名 -> 逗号分隔的地址列表
    #[serde(default)]
    records: HashMap<String, String>,
    // hosts 风格文件：每行 "domain ip[,ip...]"
    #[serde(default)]
    files: Vec<String>,
}

// 按地址族分桶的记录
#[derive(Debug, Default, Clone)]
struct HostEntry {
    v4: Vec<std::net::Ipv4Addr>,
    v6: Vec<std::net::Ipv6Addr>,
}

// 静态域名应答动作。命中的 question 按 qtype 合成 A/AAAA 记录，
// 一个都没命中时报错交由上层转成 SERVFAIL
pub struct HostAction {
    name: String,
    records: HashMap<String, HostEntry>,
}

impl HostAction {
    pub fn from_config(name: &str, data: &serde_json::Value) -> Result<Self, ConfigError> {
        let cfg: HostConfig = crate::config::decode_data(data)?;
        let mut records: HashMap<String, HostEntry> = HashMap::new();

        for (domain, ips) in &cfg.records {
            insert_record(&mut records, domain, ips)?;
        }
        for path in &cfg.files {
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            load_host_file(&mut records, Path::new(path))?;
        }

        Ok(Self {
            name: name.to_string(),
            records,
        })
    }
}

fn insert_record(
    records: &mut HashMap<String, HostEntry>,
    domain: &str,
    ips: &str,
) -> Result<(), ConfigError> {
    let key = normalize_domain(domain);
    if key.is_empty() {
        return Err(ConfigError::InvalidHostRecord("empty domain".to_string()));
    }
    let entry = records.entry(key).or_default();
    for raw in ips.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::InvalidHostRecord(format!(
                "empty address for domain {}",
                domain
            )));
        }
        match raw.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => entry.v4.push(v4),
            Ok(IpAddr::V6(v6)) => entry.v6.push(v6),
            Err(_) => {
                return Err(ConfigError::InvalidHostRecord(format!(
                    "invalid address '{}' for domain {}",
                    raw, domain
                )))
            }
        }
    }
    Ok(())
}

// hosts 文件：# 为注释，空行跳过，域名与地址以空白分隔
fn load_host_file(
    records: &mut HashMap<String, HostEntry>,
    path: &Path,
) -> Result<(), ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::LoadError)?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(domain), Some(ips)) = (parts.next(), parts.next()) else {
            return Err(ConfigError::InvalidHostRecord(format!(
                "malformed host line '{}' in {}",
                line,
                path.display()
            )));
        };
        insert_record(records, domain, ips)?;
    }
    Ok(())
}

#[async_trait]
impl DnsAction for HostAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "host"
    }

    async fn perform(&self, req: &Message) -> Result<Message, AppError> {
        let mut resp = reply_skeleton(req);
        resp.set_authoritative(true);
        let mut matched = false;

        for query in req.queries() {
            let key = normalize_domain(&query.name().to_utf8());
            let Some(entry) = self.records.get(&key) else {
                continue;
            };
            matched = true;
            let qtype = query.query_type();
            let ttl = action_limits::HOST_RECORD_TTL;
            if qtype == RecordType::A || qtype == RecordType::ANY {
                for ip in &entry.v4 {
                    resp.add_answer(Record::from_rdata(
                        query.name().clone(),
                        ttl,
                        RData::A(A(*ip)),
                    ));
                }
            }
            if qtype == RecordType::AAAA || qtype == RecordType::ANY {
                for ip in &entry.v6 {
                    resp.add_answer(Record::from_rdata(
                        query.name().clone(),
                        ttl,
                        RData::AAAA(AAAA(*ip)),
                    ));
                }
            }
        }

        if !matched {
            let domain = req
                .queries()
                .first()
                .map(|q| q.name().to_utf8())
                .unwrap_or_default();
            return Err(AppError::NoRecordMatch(domain));
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::Query;
    use hickory_proto::rr::{DNSClass, Name};
    use serde_json::json;
    use std::str::FromStr;

    fn request(name: &str, qtype: RecordType) -> Message {
        let mut req = Message::new();
        req.set_id(7);
        let mut query = Query::new();
        query
            .set_name(Name::from_str(name).unwrap())
            .set_query_type(qtype)
            .set_query_class(DNSClass::IN);
        req.add_query(query);
        req
    }

    fn action(records: serde_json::Value) -> HostAction {
        HostAction::from_config("host", &json!({ "records": records })).unwrap()
    }

    #[tokio::test]
    async fn test_a_query() {
        let act = action(json!({"example.com": "1.2.3.4"}));
        let resp = act.perform(&request("example.com.", RecordType::A)).await.unwrap();
        assert!(resp.authoritative());
        assert_eq!(resp.answers().len(), 1);
        let record = &resp.answers()[0];
        assert_eq!(record.ttl(), 5);
        assert_eq!(record.record_type(), RecordType::A);
    }

    #[tokio::test]
    async fn test_any_query_returns_both_families() {
        let act = action(json!({"dual.test": "1.2.3.4,2001:db8::1"}));
        let resp = act.perform(&request("dual.test.", RecordType::ANY)).await.unwrap();
        let kinds: Vec<RecordType> = resp.answers().iter().map(|r| r.record_type()).collect();
        assert!(kinds.contains(&RecordType::A));
        assert!(kinds.contains(&RecordType::AAAA));
    }

    #[tokio::test]
    async fn test_aaaa_query_skips_v4() {
        let act = action(json!({"dual.test": "1.2.3.4,2001:db8::1"}));
        let resp = act
            .perform(&request("dual.test.", RecordType::AAAA))
            .await
            .unwrap();
        assert_eq!(resp.answers().len(), 1);
        assert_eq!(resp.answers()[0].record_type(), RecordType::AAAA);
    }

    #[tokio::test]
    async fn test_unknown_domain_fails() {
        let act = action(json!({"example.com": "1.2.3.4"}));
        let err = act
            .perform(&request("other.com.", RecordType::A))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoRecordMatch(_)));
    }

    #[test]
    fn test_bad_address_rejected() {
        let result = HostAction::from_config(
            "host",
            &json!({ "records": {"example.com": "not-an-ip"} }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_case_and_dot_normalization() {
        let act = action(json!({"Example.COM.": "1.2.3.4"}));
        assert!(act.records.contains_key("example.com"));
    }
}
