#[cfg(test)]
mod tests {
    use fluxdns::config::{ResourceConfig, ResourceItem};
    use fluxdns::engine::build_matcher_map;
    use fluxdns::geosite::parse_geosite_list;
    use fluxdns::matcher::DnsMatcher;
    use hickory_proto::op::{Message, Query};
    use hickory_proto::rr::{DNSClass, Name, RecordType};
    use serde_json::json;
    use std::io::Write;
    use std::str::FromStr;

    // 与数据集 wire 布局一致的最小编码器，只为测试构造输入
    fn varint(mut value: u64) -> Vec<u8> {
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

    fn length_delimited(field: u64, payload: &[u8]) -> Vec<u8> {
        let mut out = varint((field << 3) | 2);
        out.extend(varint(payload.len() as u64));
        out.extend_from_slice(payload);
        out
    }

    fn varint_field(field: u64, value: u64) -> Vec<u8> {
        let mut out = varint(field << 3);
        out.extend(varint(value));
        out
    }

    fn domain_record(kind: u64, value: &str, attrs: &[(&str, bool)]) -> Vec<u8> {
        let mut record = varint_field(1, kind);
        record.extend(length_delimited(2, value.as_bytes()));
        for (key, bool_value) in attrs {
            let mut attr = length_delimited(1, key.as_bytes());
            attr.extend(varint_field(2, u64::from(*bool_value)));
            record.extend(length_delimited(3, &attr));
        }
        record
    }

    fn category(name: &str, records: &[Vec<u8>]) -> Vec<u8> {
        let mut entry = length_delimited(1, name.as_bytes());
        for record in records {
            entry.extend(length_delimited(2, record));
        }
        entry
    }

    fn dataset(categories: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for cat in categories {
            out.extend(length_delimited(1, cat));
        }
        out
    }

    fn sample_dataset() -> Vec<u8> {
        let cn = category(
            "cn",
            &[
                domain_record(0, "foo", &[]),
                domain_record(1, "^bar$", &[]),
                domain_record(2, "baz.com", &[]),
                domain_record(3, "qux.com", &[]),
                domain_record(2, "cdn.example", &[("cdn", true)]),
            ],
        );
        let ads = category("ads", &[domain_record(2, "ads.example", &[])]);
        dataset(&[cn, ads])
    }

    fn write_dataset(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn request(name: &str) -> Message {
        let mut req = Message::new();
        let mut q = Query::new();
        q.set_name(Name::from_str(name).unwrap())
            .set_query_type(RecordType::A)
            .set_query_class(DNSClass::IN);
        req.add_query(q);
        req
    }

    #[test]
    fn test_decode_produces_expected_rules_in_order() {
        let parsed = parse_geosite_list(&sample_dataset(), None).unwrap();
        let rules: Vec<String> = parsed["cn"].iter().filter_map(|d| d.to_rule()).collect();
        assert_eq!(
            &rules[..4],
            &[
                "keyword:foo".to_string(),
                "regexp:^bar$".to_string(),
                "suffix:baz.com".to_string(),
                "full:qux.com".to_string(),
            ]
        );
    }

    #[test]
    fn test_geosite_matcher_end_to_end() {
        let file = write_dataset(&sample_dataset());
        let resource = ResourceConfig {
            matcher: vec![ResourceItem {
                name: "geo_cn".to_string(),
                r#type: "geosite".to_string(),
                data: json!({
                    "file": file.path().to_str().unwrap(),
                    "categories": ["CN"],
                }),
            }],
            action: vec![],
        };
        let map = build_matcher_map(&resource).unwrap();
        let matcher = map.get("geo_cn").unwrap();

        // suffix 规则
        assert!(matcher.matches(&request("www.baz.com.")).unwrap());
        // full 规则
        assert!(matcher.matches(&request("qux.com.")).unwrap());
        assert!(!matcher.matches(&request("www.qux.com.")).unwrap());
        // keyword 规则
        assert!(matcher.matches(&request("foo-mirror.net.")).unwrap());
        // regexp 规则
        assert!(matcher.matches(&request("bar.")).unwrap());
        // 不在类目里
        assert!(!matcher.matches(&request("unrelated.org.")).unwrap());
    }

    #[test]
    fn test_geosite_attribute_filters() {
        let file = write_dataset(&sample_dataset());
        let build = |categories: serde_json::Value| {
            let resource = ResourceConfig {
                matcher: vec![ResourceItem {
                    name: "geo".to_string(),
                    r#type: "geosite".to_string(),
                    data: json!({
                        "file": file.path().to_str().unwrap(),
                        "categories": categories,
                    }),
                }],
                action: vec![],
            };
            build_matcher_map(&resource)
        };

        // 只保留带 cdn 属性的条目
        let map = build(json!(["cn@cdn"])).unwrap();
        let matcher = map.get("geo").unwrap();
        assert!(matcher.matches(&request("x.cdn.example.")).unwrap());
        assert!(!matcher.matches(&request("www.baz.com.")).unwrap());

        // 取反：排除带 cdn 属性的条目
        let map = build(json!(["cn@!cdn"])).unwrap();
        let matcher = map.get("geo").unwrap();
        assert!(!matcher.matches(&request("x.cdn.example.")).unwrap());
        assert!(matcher.matches(&request("www.baz.com.")).unwrap());
    }

    #[test]
    fn test_unknown_category_fails() {
        let file = write_dataset(&sample_dataset());
        let resource = ResourceConfig {
            matcher: vec![ResourceItem {
                name: "geo".to_string(),
                r#type: "geosite".to_string(),
                data: json!({
                    "file": file.path().to_str().unwrap(),
                    "categories": ["nonexistent"],
                }),
            }],
            action: vec![],
        };
        assert!(build_matcher_map(&resource).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        let resource = ResourceConfig {
            matcher: vec![ResourceItem {
                name: "geo".to_string(),
                r#type: "geosite".to_string(),
                data: json!({
                    "file": "/nonexistent/geosite.dat",
                    "categories": ["cn"],
                }),
            }],
            action: vec![],
        };
        assert!(build_matcher_map(&resource).is_err());
    }
}
