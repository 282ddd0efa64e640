#[cfg(test)]
mod tests {
    use fluxdns::config::{normalize_bind, Config};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const YAML_CONFIG: &str = r#"
bind: ":5353"
log:
  level: info
  console: true
cache:
  size: 4096
  lazy: true
resource:
  matcher:
    - name: cn_domains
      type: domain
      data:
        domains:
          - baidu.com
          - full:qq.com
  action:
    - name: reject
      type: rcode
      data:
        code: 5
rules:
  - remark: block-cn
    match: cn_domains
    action: reject
  - match: any
    action: reject
"#;

    const JSON_CONFIG: &str = r#"{
  "bind": "127.0.0.1:5454",
  "cache": { "size": 0 },
  "resource": {
    "matcher": [],
    "action": [
      { "name": "ok", "type": "rcode", "data": { "code": 0 } }
    ]
  },
  "rules": [ { "match": "", "action": "ok" } ]
}"#;

    #[test]
    fn test_yaml_config() {
        let file = write_config(".yaml", YAML_CONFIG);
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.bind, ":5353");
        assert_eq!(config.cache.size, 4096);
        assert!(config.cache.lazy);
        assert_eq!(config.resource.matcher.len(), 1);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].remark, "block-cn");
        // 省略主机部分的地址补全
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:5353");
    }

    #[test]
    fn test_json_config() {
        let file = write_config(".json", JSON_CONFIG);
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.bind, "127.0.0.1:5454");
        assert_eq!(config.cache.size, 0);
    }

    #[test]
    fn test_content_sniffing_without_extension() {
        // 无扩展名时先按 JSON 再按 YAML 探测
        let file = write_config("", JSON_CONFIG);
        assert!(Config::from_file(file.path()).is_ok());
        let file = write_config("", YAML_CONFIG);
        assert!(Config::from_file(file.path()).is_ok());
    }

    #[test]
    fn test_defaults() {
        let file = write_config(".yaml", "rules: []\n");
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.bind, ":5353");
        assert_eq!(config.cache.size, 1024);
        assert!(!config.cache.lazy);
        assert!(!config.cache.persist);
    }

    #[test]
    fn test_duplicate_resource_name_rejected() {
        let content = r#"
resource:
  matcher:
    - { name: dup, type: any, data: {} }
  action:
    - { name: dup, type: rcode, data: { code: 0 } }
rules: []
"#;
        let file = write_config(".yaml", content);
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_rule_with_unknown_action_rejected() {
        let content = r#"
resource:
  action:
    - { name: ok, type: rcode, data: { code: 0 } }
rules:
  - { match: any, action: missing }
"#;
        let file = write_config(".yaml", content);
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_persist_requires_file() {
        let content = r#"
cache:
  persist: true
rules: []
"#;
        let file = write_config(".yaml", content);
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let content = "bind: not-an-address\nrules: []\n";
        let file = write_config(".yaml", content);
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_normalize_bind() {
        assert_eq!(normalize_bind(":5353"), "0.0.0.0:5353");
        assert_eq!(normalize_bind("10.0.0.1:53"), "10.0.0.1:53");
    }
}
