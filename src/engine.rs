use crate::action::{make_action, DnsAction};
use crate::cache::CacheManager;
use crate::config::{ResourceConfig, RuleConfig};
use crate::error::{AppError, ConfigError};
use crate::matcher::expr::build_expression_matcher;
use crate::matcher::{make_matcher, AnyMatcher, DnsMatcher, MatcherMap};
use hickory_proto::op::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

// 一条规则：备注 + 编译后的表达式 + 动作
pub struct Rule {
    remark: String,
    matcher: Arc<dyn DnsMatcher>,
    action: Arc<dyn DnsAction>,
}

impl Rule {
    pub fn new(remark: String, matcher: Arc<dyn DnsMatcher>, action: Arc<dyn DnsAction>) -> Self {
        Self {
            remark,
            matcher,
            action,
        }
    }

    pub fn remark(&self) -> &str {
        &self.remark
    }
}

// 规则引擎：按配置顺序求值，第一条命中的规则胜出
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub async fn execute(&self, req: &Message) -> Result<Message, AppError> {
        for rule in &self.rules {
            let matched = rule.matcher.matches(req).map_err(|err| AppError::Matcher {
                name: rule.remark.clone(),
                reason: err.to_string(),
            })?;
            if !matched {
                continue;
            }
            debug!(rule = %rule.remark, action = %rule.action.name(), "rule matched");
            // 规则命中后不再尝试后续规则，动作失败即请求失败
            return rule.action.perform(req).await;
        }
        Err(AppError::NoRuleMatch)
    }
}

// 构造匹配器表。名称必须唯一；用户没有定义 any 时自动注入一个
pub fn build_matcher_map(resource: &ResourceConfig) -> Result<MatcherMap, ConfigError> {
    let mut map: MatcherMap = HashMap::new();
    for item in &resource.matcher {
        if map.contains_key(&item.name) {
            return Err(ConfigError::DuplicateName(item.name.clone()));
        }
        let matcher = make_matcher(&item.r#type, &item.name, &item.data)?;
        map.insert(item.name.clone(), matcher);
    }
    if !map.contains_key("any") {
        map.insert("any".to_string(), Arc::new(AnyMatcher::new("any")));
    }
    Ok(map)
}

// 构造动作表
pub fn build_action_map(
    resource: &ResourceConfig,
    cache: &Arc<CacheManager>,
) -> Result<HashMap<String, Arc<dyn DnsAction>>, ConfigError> {
    let mut map: HashMap<String, Arc<dyn DnsAction>> = HashMap::new();
    for item in &resource.action {
        if map.contains_key(&item.name) {
            return Err(ConfigError::DuplicateName(item.name.clone()));
        }
        let action = make_action(&item.r#type, &item.name, &item.data, cache)?;
        map.insert(item.name.clone(), action);
    }
    Ok(map)
}

// 编译规则列表。空表达式等价于 any；动作必须已定义
pub fn build_rule_engine(
    rules: &[RuleConfig],
    matchers: &MatcherMap,
    actions: &HashMap<String, Arc<dyn DnsAction>>,
) -> Result<RuleEngine, ConfigError> {
    let mut compiled = Vec::with_capacity(rules.len());
    for (idx, rule) in rules.iter().enumerate() {
        let remark = if rule.remark.is_empty() {
            format!("rule:{}", idx)
        } else {
            rule.remark.clone()
        };
        let expr = rule.matches.trim();
        let expr = if expr.is_empty() { "any" } else { expr };
        let matcher = build_expression_matcher(expr, matchers)?;
        let action = actions
            .get(&rule.action)
            .ok_or_else(|| ConfigError::UnknownAction(rule.action.clone()))?;
        compiled.push(Rule::new(remark, Arc::new(matcher), Arc::clone(action)));
    }
    Ok(RuleEngine::new(compiled))
}
