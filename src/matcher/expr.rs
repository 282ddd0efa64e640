use crate::error::{AppError, ConfigError};
use crate::matcher::{DnsMatcher, MatcherMap};
use hickory_proto::op::Message;
use std::sync::Arc;

// 编译规则的布尔匹配表达式。支持 &&/||/! 及对应的文本关键字，
// 圆括号分组，优先级从低到高为 or < and < not
pub fn build_expression_matcher(
    expr: &str,
    registry: &MatcherMap,
) -> Result<ExpressionMatcher, ConfigError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(invalid(expr, "empty matcher expression"));
    }
    let tokens = tokenize(expr);
    let root = parse(expr, &tokens, registry)?;
    Ok(ExpressionMatcher {
        raw: expr.to_string(),
        root,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Identifier(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

// 先在运算符两侧补空白，再按空白切分
fn tokenize(expr: &str) -> Vec<Token> {
    let normalized = expr
        .replace("&&", " && ")
        .replace("||", " || ")
        .replace('(', " ( ")
        .replace(')', " ) ")
        .replace('!', " ! ");
    normalized
        .split_whitespace()
        .map(|part| match part.to_ascii_lowercase().as_str() {
            "&&" | "and" => Token::And,
            "||" | "or" => Token::Or,
            "!" | "not" => Token::Not,
            "(" => Token::LParen,
            ")" => Token::RParen,
            _ => Token::Identifier(part.to_string()),
        })
        .collect()
}

// 表达式树节点
enum ExprNode {
    Leaf(Arc<dyn DnsMatcher>),
    Not(Box<ExprNode>),
    And(Box<ExprNode>, Box<ExprNode>),
    Or(Box<ExprNode>, Box<ExprNode>),
}

impl ExprNode {
    // 严格短路求值：And 左假不看右，Or 左真不看右
    fn eval(&self, req: &Message) -> Result<bool, AppError> {
        match self {
            ExprNode::Leaf(matcher) => matcher.matches(req),
            ExprNode::Not(child) => Ok(!child.eval(req)?),
            ExprNode::And(left, right) => {
                if !left.eval(req)? {
                    return Ok(false);
                }
                right.eval(req)
            }
            ExprNode::Or(left, right) => {
                if left.eval(req)? {
                    return Ok(true);
                }
                right.eval(req)
            }
        }
    }
}

// 编译后的表达式匹配器，name 即原始表达式
pub struct ExpressionMatcher {
    raw: String,
    root: ExprNode,
}

impl DnsMatcher for ExpressionMatcher {
    fn name(&self) -> &str {
        &self.raw
    }

    fn kind(&self) -> &'static str {
        "expression"
    }

    fn matches(&self, req: &Message) -> Result<bool, AppError> {
        self.root.eval(req)
    }
}

fn precedence(token: &Token) -> u8 {
    match token {
        Token::Not => 3,
        Token::And => 2,
        Token::Or => 1,
        _ => 0,
    }
}

fn invalid(expr: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidExpression {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
}

// 调度场算法转后缀，再折叠成树
fn parse(expr: &str, tokens: &[Token], registry: &MatcherMap) -> Result<ExprNode, ConfigError> {
    let rpn = shunting_yard(expr, tokens)?;
    let mut stack: Vec<ExprNode> = Vec::with_capacity(rpn.len());
    for token in rpn {
        match token {
            Token::Identifier(name) => {
                let matcher = registry
                    .get(&name)
                    .ok_or_else(|| ConfigError::UnknownMatcher(name.clone()))?;
                stack.push(ExprNode::Leaf(Arc::clone(matcher)));
            }
            Token::Not => {
                let operand = stack
                    .pop()
                    .ok_or_else(|| invalid(expr, "missing operand for NOT"))?;
                stack.push(ExprNode::Not(Box::new(operand)));
            }
            Token::And | Token::Or => {
                let right = stack
                    .pop()
                    .ok_or_else(|| invalid(expr, "missing operands for binary operator"))?;
                let left = stack
                    .pop()
                    .ok_or_else(|| invalid(expr, "missing operands for binary operator"))?;
                if matches!(token, Token::And) {
                    stack.push(ExprNode::And(Box::new(left), Box::new(right)));
                } else {
                    stack.push(ExprNode::Or(Box::new(left), Box::new(right)));
                }
            }
            _ => return Err(invalid(expr, "unexpected token in postfix form")),
        }
    }
    if stack.len() != 1 {
        return Err(invalid(expr, "unresolved operands remain"));
    }
    Ok(stack.pop().unwrap())
}

fn shunting_yard(expr: &str, tokens: &[Token]) -> Result<Vec<Token>, ConfigError> {
    let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut ops: Vec<Token> = Vec::new();
    for token in tokens {
        match token {
            Token::Identifier(_) => output.push(token.clone()),
            Token::Not => {
                while let Some(top) = ops.last() {
                    if *top == Token::LParen || precedence(top) <= precedence(token) {
                        break;
                    }
                    output.push(ops.pop().unwrap());
                }
                ops.push(token.clone());
            }
            Token::And | Token::Or => {
                while let Some(top) = ops.last() {
                    if *top == Token::LParen || precedence(top) < precedence(token) {
                        break;
                    }
                    output.push(ops.pop().unwrap());
                }
                ops.push(token.clone());
            }
            Token::LParen => ops.push(Token::LParen),
            Token::RParen => {
                let mut found = false;
                while let Some(op) = ops.pop() {
                    if op == Token::LParen {
                        found = true;
                        break;
                    }
                    output.push(op);
                }
                if !found {
                    return Err(invalid(expr, "mismatched parentheses"));
                }
            }
        }
    }
    while let Some(op) = ops.pop() {
        if op == Token::LParen || op == Token::RParen {
            return Err(invalid(expr, "mismatched parentheses"));
        }
        output.push(op);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // 记录调用次数的桩匹配器，用来观察短路行为
    struct StubMatcher {
        name: String,
        result: bool,
        calls: AtomicUsize,
    }

    impl DnsMatcher for StubMatcher {
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> &'static str {
            "stub"
        }
        fn matches(&self, _req: &Message) -> Result<bool, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result)
        }
    }

    fn registry(values: &[(&str, bool)]) -> (MatcherMap, HashMap<String, Arc<StubMatcher>>) {
        let mut map: MatcherMap = HashMap::new();
        let mut stubs = HashMap::new();
        for (name, result) in values {
            let stub = Arc::new(StubMatcher {
                name: name.to_string(),
                result: *result,
                calls: AtomicUsize::new(0),
            });
            stubs.insert(name.to_string(), Arc::clone(&stub));
            map.insert(name.to_string(), stub as Arc<dyn DnsMatcher>);
        }
        (map, stubs)
    }

    fn eval(expr: &str, values: &[(&str, bool)]) -> bool {
        let (map, _) = registry(values);
        let matcher = build_expression_matcher(expr, &map).unwrap();
        matcher.matches(&Message::new()).unwrap()
    }

    #[test]
    fn test_single_identifier() {
        assert!(eval("a", &[("a", true)]));
        assert!(!eval("a", &[("a", false)]));
    }

    #[test]
    fn test_basic_operators() {
        assert!(eval("a && b", &[("a", true), ("b", true)]));
        assert!(!eval("a && b", &[("a", true), ("b", false)]));
        assert!(eval("a || b", &[("a", false), ("b", true)]));
        assert!(eval("!a", &[("a", false)]));
    }

    #[test]
    fn test_keyword_operators_case_insensitive() {
        assert!(eval("a AND b", &[("a", true), ("b", true)]));
        assert!(eval("not a", &[("a", false)]));
        assert!(eval("a Or b", &[("a", false), ("b", true)]));
    }

    #[test]
    fn test_precedence() {
        // or < and: a || b && c == a || (b && c)
        assert!(eval("a || b && c", &[("a", true), ("b", false), ("c", false)]));
        assert!(!eval("a || b && c", &[("a", false), ("b", true), ("c", false)]));
        // not 最高：!a && b == (!a) && b
        assert!(eval("!a && b", &[("a", false), ("b", true)]));
    }

    #[test]
    fn test_parentheses_override() {
        assert!(!eval("(a || b) && c", &[("a", true), ("b", false), ("c", false)]));
        assert!(eval("!(a && b)", &[("a", true), ("b", false)]));
    }

    #[test]
    fn test_no_space_operators() {
        assert!(eval("!a&&(b||c)", &[("a", false), ("b", false), ("c", true)]));
    }

    #[test]
    fn test_short_circuit_and() {
        let (map, stubs) = registry(&[("a", false), ("b", true)]);
        let matcher = build_expression_matcher("a && b", &map).unwrap();
        assert!(!matcher.matches(&Message::new()).unwrap());
        assert_eq!(stubs["a"].calls.load(Ordering::SeqCst), 1);
        assert_eq!(stubs["b"].calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_circuit_or() {
        let (map, stubs) = registry(&[("a", true), ("b", false)]);
        let matcher = build_expression_matcher("a || b", &map).unwrap();
        assert!(matcher.matches(&Message::new()).unwrap());
        assert_eq!(stubs["b"].calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_identifier() {
        let (map, _) = registry(&[("a", true)]);
        assert!(build_expression_matcher("a && missing", &map).is_err());
    }

    #[test]
    fn test_mismatched_parentheses() {
        let (map, _) = registry(&[("a", true)]);
        assert!(build_expression_matcher("(a", &map).is_err());
        assert!(build_expression_matcher("a)", &map).is_err());
    }

    #[test]
    fn test_missing_operand() {
        let (map, _) = registry(&[("a", true)]);
        assert!(build_expression_matcher("a &&", &map).is_err());
        assert!(build_expression_matcher("!", &map).is_err());
        assert!(build_expression_matcher("a b", &map).is_err());
    }
}
