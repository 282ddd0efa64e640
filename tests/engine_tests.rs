#[cfg(test)]
mod tests {
    use fluxdns::cache::CacheManager;
    use fluxdns::config::{CacheConfig, ResourceConfig, ResourceItem, RuleConfig};
    use fluxdns::engine::{build_action_map, build_matcher_map, build_rule_engine, RuleEngine};
    use fluxdns::error::AppError;
    use hickory_proto::op::{Message, Query, ResponseCode};
    use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
    use serde_json::json;
    use std::str::FromStr;
    use std::sync::Arc;

    fn query(name: &str, qtype: RecordType) -> Message {
        let mut req = Message::new();
        req.set_id(100);
        let mut q = Query::new();
        q.set_name(Name::from_str(name).unwrap())
            .set_query_type(qtype)
            .set_query_class(DNSClass::IN);
        req.add_query(q);
        req
    }

    fn item(name: &str, kind: &str, data: serde_json::Value) -> ResourceItem {
        ResourceItem {
            name: name.to_string(),
            r#type: kind.to_string(),
            data,
        }
    }

    fn rule(remark: &str, matches: &str, action: &str) -> RuleConfig {
        RuleConfig {
            remark: remark.to_string(),
            matches: matches.to_string(),
            action: action.to_string(),
        }
    }

    // 组装一个不带缓存的引擎
    fn build_engine(
        matchers: Vec<ResourceItem>,
        actions: Vec<ResourceItem>,
        rules: Vec<RuleConfig>,
    ) -> RuleEngine {
        let resource = ResourceConfig {
            matcher: matchers,
            action: actions,
        };
        let cache = Arc::new(
            CacheManager::new(&CacheConfig {
                size: 0,
                ..Default::default()
            })
            .unwrap(),
        );
        let matcher_map = build_matcher_map(&resource).unwrap();
        let action_map = build_action_map(&resource, &cache).unwrap();
        build_rule_engine(&rules, &matcher_map, &action_map).unwrap()
    }

    #[tokio::test]
    async fn test_host_action_end_to_end() {
        let engine = build_engine(
            vec![],
            vec![item(
                "local",
                "host",
                json!({ "records": { "example.com": "1.2.3.4" } }),
            )],
            vec![rule("", "", "local")],
        );

        let resp = engine
            .execute(&query("example.com.", RecordType::A))
            .await
            .unwrap();
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert!(resp.authoritative());
        assert_eq!(resp.answers().len(), 1);
        let record = &resp.answers()[0];
        assert_eq!(record.ttl(), 5);
        match record.data() {
            Some(RData::A(a)) => assert_eq!(a.0.to_string(), "1.2.3.4"),
            other => panic!("unexpected rdata: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rcode_action_end_to_end() {
        let engine = build_engine(
            vec![],
            vec![item("refuse", "rcode", json!({ "code": 5 }))],
            vec![rule("refuse-all", "any", "refuse")],
        );

        let resp = engine
            .execute(&query("anything.test.", RecordType::A))
            .await
            .unwrap();
        assert_eq!(resp.response_code(), ResponseCode::Refused);
        assert!(resp.answers().is_empty());
        assert!(resp.name_servers().is_empty());
        assert!(resp.additionals().is_empty());
    }

    #[tokio::test]
    async fn test_expression_routing() {
        // geo_cn 命中 baidu.com，is_aaaa 命中 AAAA 查询，
        // 三条规则分别落到不同的 rcode，便于断言走到了哪条
        let engine = build_engine(
            vec![
                item("geo_cn", "domain", json!({ "domains": ["baidu.com"] })),
                item("is_aaaa", "qtype", json!({ "types": [28] })),
            ],
            vec![
                item("local", "rcode", json!({ "code": 0 })),
                item("block", "rcode", json!({ "code": 3 })),
                item("remote", "rcode", json!({ "code": 5 })),
            ],
            vec![
                rule("cn", "geo_cn", "local"),
                rule("block-v6", "!geo_cn && is_aaaa", "block"),
                rule("default", "any", "remote"),
            ],
        );

        let resp = engine
            .execute(&query("baidu.com.", RecordType::A))
            .await
            .unwrap();
        assert_eq!(resp.response_code(), ResponseCode::NoError);

        let resp = engine
            .execute(&query("example.com.", RecordType::AAAA))
            .await
            .unwrap();
        assert_eq!(resp.response_code(), ResponseCode::NXDomain);

        let resp = engine
            .execute(&query("example.com.", RecordType::A))
            .await
            .unwrap();
        assert_eq!(resp.response_code(), ResponseCode::Refused);
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        // 两条规则都命中时应执行前一条
        let engine = build_engine(
            vec![],
            vec![
                item("first", "rcode", json!({ "code": 0 })),
                item("second", "rcode", json!({ "code": 5 })),
            ],
            vec![rule("a", "any", "first"), rule("b", "any", "second")],
        );
        let resp = engine
            .execute(&query("example.com.", RecordType::A))
            .await
            .unwrap();
        assert_eq!(resp.response_code(), ResponseCode::NoError);
    }

    #[tokio::test]
    async fn test_no_rule_match() {
        let engine = build_engine(
            vec![item("never", "domain", json!({ "domains": ["full:none.test"] }))],
            vec![item("a", "rcode", json!({ "code": 0 }))],
            vec![rule("only", "never", "a")],
        );
        let err = engine
            .execute(&query("example.com.", RecordType::A))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoRuleMatch));
    }

    #[tokio::test]
    async fn test_empty_expression_is_any() {
        let engine = build_engine(
            vec![],
            vec![item("a", "rcode", json!({ "code": 0 }))],
            vec![rule("fallback", "", "a")],
        );
        assert!(engine
            .execute(&query("whatever.test.", RecordType::A))
            .await
            .is_ok());
    }

    #[test]
    fn test_unknown_references_fail_at_build() {
        let resource = ResourceConfig {
            matcher: vec![],
            action: vec![item("a", "rcode", json!({ "code": 0 }))],
        };
        let cache = Arc::new(
            CacheManager::new(&CacheConfig {
                size: 0,
                ..Default::default()
            })
            .unwrap(),
        );
        let matcher_map = build_matcher_map(&resource).unwrap();
        let action_map = build_action_map(&resource, &cache).unwrap();

        // 未注册的匹配器名
        assert!(build_rule_engine(
            &[rule("r", "ghost", "a")],
            &matcher_map,
            &action_map
        )
        .is_err());

        // 未注册的动作名
        assert!(build_rule_engine(
            &[rule("r", "any", "ghost")],
            &matcher_map,
            &action_map
        )
        .is_err());
    }

    #[test]
    fn test_invalid_rcode_rejected() {
        let resource = ResourceConfig {
            matcher: vec![],
            action: vec![item("bad", "rcode", json!({ "code": 4096 }))],
        };
        let cache = Arc::new(
            CacheManager::new(&CacheConfig {
                size: 0,
                ..Default::default()
            })
            .unwrap(),
        );
        assert!(build_action_map(&resource, &cache).is_err());
    }
}
