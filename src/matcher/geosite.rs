use crate::error::ConfigError;
use crate::geosite::load_categories;
use crate::matcher::{domain::DomainMatcher, DnsMatcher};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct GeositeConfig {
    #[serde(default)]
    file: String,
    #[serde(default)]
    categories: Vec<String>,
}

// 类目说明：name、name@attr 或 name@!attr
struct CategorySpec {
    name: String,
    attr: String,
    negate: bool,
}

fn parse_spec(raw: &str) -> CategorySpec {
    match raw.split_once('@') {
        Some((name, attr)) => {
            let attr = attr.trim();
            let (attr, negate) = match attr.strip_prefix('!') {
                Some(rest) => (rest.trim(), true),
                None => (attr, false),
            };
            CategorySpec {
                name: name.trim().to_ascii_lowercase(),
                attr: attr.to_ascii_lowercase(),
                negate,
            }
        }
        None => CategorySpec {
            name: raw.trim().to_ascii_lowercase(),
            attr: String::new(),
            negate: false,
        },
    }
}

// geosite 匹配器：从数据集选取类目，过滤属性后转成域名规则，
// 实际匹配委托给域名匹配器
pub fn make_geosite_matcher(
    name: &str,
    data: &serde_json::Value,
) -> Result<Arc<dyn DnsMatcher>, ConfigError> {
    let cfg: GeositeConfig = crate::config::decode_data(data)?;
    if cfg.file.trim().is_empty() {
        return Err(ConfigError::Geosite("geosite matcher requires file".to_string()));
    }
    if cfg.categories.is_empty() {
        return Err(ConfigError::Geosite(
            "geosite matcher requires categories".to_string(),
        ));
    }

    let specs: Vec<CategorySpec> = cfg
        .categories
        .iter()
        .map(|raw| parse_spec(raw))
        .filter(|s| !s.name.is_empty())
        .collect();
    let wanted: BTreeSet<String> = specs.iter().map(|s| s.name.clone()).collect();
    let entries = load_categories(Path::new(cfg.file.trim()), &wanted)?;

    // 按输入顺序展开类目，规则在整个匹配器范围内去重
    let mut seen: HashSet<String> = HashSet::new();
    let mut rules: Vec<String> = Vec::new();
    for spec in &specs {
        let domains = entries
            .get(&spec.name)
            .ok_or_else(|| ConfigError::Geosite(format!("geosite category {} not found", spec.name)))?;
        for domain in domains {
            if !domain.matches_attribute(&spec.attr, spec.negate) {
                continue;
            }
            if let Some(rule) = domain.to_rule() {
                if seen.insert(rule.clone()) {
                    rules.push(rule);
                }
            }
        }
    }
    if rules.is_empty() {
        return Err(ConfigError::Geosite(
            "geosite matcher produced no domain rules".to_string(),
        ));
    }
    debug!(matcher = name, rules = rules.len(), "geosite matcher built");
    Ok(Arc::new(DomainMatcher::from_rules(name, &rules)?))
}
