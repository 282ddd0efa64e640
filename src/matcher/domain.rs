use crate::error::{AppError, ConfigError};
use crate::matcher::{first_question_name, normalize_domain, DnsMatcher};
use aho_corasick::AhoCorasick;
use hickory_proto::op::Message;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
struct DomainConfig {
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    files: Vec<String>,
}

// 按标签组织的域名前缀树，从右往左逐标签下钻
#[derive(Debug, Default)]
struct DomainTrie {
    children: HashMap<String, DomainTrie>,
    terminal: bool,
}

impl DomainTrie {
    fn add(&mut self, domain: &str) {
        if domain.is_empty() {
            return;
        }
        let mut cur = self;
        for label in domain.split('.').rev() {
            cur = cur.children.entry(label.to_string()).or_default();
        }
        cur.terminal = true;
    }

    // 精确匹配：所有标签都要走到且终点为终止节点
    fn match_exact(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        let mut cur = self;
        for label in domain.split('.').rev() {
            match cur.children.get(label) {
                Some(child) => cur = child,
                None => return false,
            }
        }
        cur.terminal
    }

    // 后缀匹配：途中遇到任一终止节点即命中
    fn match_suffix(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        let mut cur = self;
        for label in domain.split('.').rev() {
            match cur.children.get(label) {
                Some(child) => cur = child,
                None => return false,
            }
            if cur.terminal {
                return true;
            }
        }
        cur.terminal
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

// 域名匹配器，支持 full/suffix/keyword/regexp 四种规则
// 规则形如 "kind:value"，无前缀时默认为 suffix
pub struct DomainMatcher {
    name: String,
    full: DomainTrie,
    suffix: DomainTrie,
    keyword: Option<AhoCorasick>,
    regex: Vec<Regex>,
}

impl DomainMatcher {
    pub fn from_config(name: &str, data: &serde_json::Value) -> Result<Self, ConfigError> {
        let cfg: DomainConfig = crate::config::decode_data(data)?;
        let mut rules = cfg.domains;
        rules.extend(load_domain_files(&cfg.files)?);
        Self::from_rules(name, &rules)
    }

    pub fn from_rules(name: &str, rules: &[String]) -> Result<Self, ConfigError> {
        let mut full = DomainTrie::default();
        let mut suffix = DomainTrie::default();
        let mut keywords: Vec<String> = Vec::new();
        let mut regexes: Vec<Regex> = Vec::new();

        for rule in rules {
            if rule.is_empty() {
                return Err(ConfigError::InvalidDomainRule("empty domain rule".to_string()));
            }
            let (kind, value) = split_kind_value(rule);
            if value.is_empty() {
                return Err(ConfigError::InvalidDomainRule(rule.clone()));
            }
            match kind.as_str() {
                "suffix" => suffix.add(&normalize_domain(&value)),
                "full" => full.add(&normalize_domain(&value)),
                // 关键字在小写化后的查询名上做子串搜索
                "keyword" => keywords.push(value.to_ascii_lowercase()),
                "regexp" => regexes.push(Regex::new(&value)?),
                other => {
                    return Err(ConfigError::InvalidDomainRule(format!(
                        "unknown domain rule kind: {}",
                        other
                    )))
                }
            }
        }

        let keyword = if keywords.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .build(&keywords)
                    .map_err(|e| ConfigError::InvalidDomainRule(format!("keyword automaton: {}", e)))?,
            )
        };

        Ok(Self {
            name: name.to_string(),
            full,
            suffix,
            keyword,
            regex: regexes,
        })
    }

    // 直接按域名匹配，按 full -> suffix -> keyword -> regexp 的顺序
    pub fn match_name(&self, domain: &str) -> bool {
        if self.full.match_exact(domain) {
            return true;
        }
        if self.suffix.match_suffix(domain) {
            return true;
        }
        if let Some(automaton) = &self.keyword {
            if automaton.is_match(domain) {
                return true;
            }
        }
        self.regex.iter().any(|re| re.is_match(domain))
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
            && self.suffix.is_empty()
            && self.keyword.is_none()
            && self.regex.is_empty()
    }
}

impl DnsMatcher for DomainMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "domain"
    }

    fn matches(&self, req: &Message) -> Result<bool, AppError> {
        match first_question_name(req) {
            Some(domain) => Ok(self.match_name(&domain)),
            None => Ok(false),
        }
    }
}

// 拆出规则类型与内容，无冒号时默认为 suffix
fn split_kind_value(rule: &str) -> (String, String) {
    match rule.find(':') {
        Some(idx) => (
            rule[..idx].trim().to_ascii_lowercase(),
            rule[idx + 1..].trim().to_string(),
        ),
        None => ("suffix".to_string(), rule.trim().to_string()),
    }
}

// 从文件加载域名规则，每行一条，# 为注释，空行跳过
fn load_domain_files(files: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut rules = Vec::new();
    for path in files {
        let path = path.trim();
        if path.is_empty() {
            continue;
        }
        let content = fs::read_to_string(Path::new(path)).map_err(ConfigError::LoadError)?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            rules.push(line.to_string());
        }
    }
    Ok(rules)
}
