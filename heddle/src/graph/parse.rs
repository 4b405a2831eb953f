//! Parser for the textual attribute-graph format.
//!
//! Accepts a DOT-style subset: `digraph Name { ... }` with graph attributes,
//! `node [..]` / `edge [..]` defaults blocks, node statements, chained edge
//! statements (`a -> b -> c [..]`), and `subgraph { ... }` scoping where
//! members inherit the enclosing defaults. Attribute values may be quoted or
//! bare; recognized keys are coerced into typed [`Node`]/[`Edge`] fields
//! (durations like `900s`/`15m`, integers, booleans) and everything else is
//! kept in the attribute bag.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use super::{Edge, Graph, Node};

/// Parse failure with the source line it occurred on.
#[derive(Debug, Error)]
#[error("parse error at line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Equals,
    Arrow,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("`{}`", s),
            Token::Str(s) => format!("\"{}\"", s),
            Token::LBrace => "`{`".to_string(),
            Token::RBrace => "`}`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::Semi => "`;`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Equals => "`=`".to_string(),
            Token::Arrow => "`->`".to_string(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    let mut line = 1usize;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' => {
                chars.next();
                match chars.peek() {
                    Some('/') => {
                        while let Some(&c) = chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            chars.next();
                        }
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = '\0';
                        loop {
                            match chars.next() {
                                Some('\n') => {
                                    line += 1;
                                    prev = '\n';
                                }
                                Some('/') if prev == '*' => break,
                                Some(c) => prev = c,
                                None => {
                                    return Err(ParseError::new(line, "unterminated comment"))
                                }
                            }
                        }
                    }
                    _ => return Err(ParseError::new(line, "unexpected `/`")),
                }
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some('"') => s.push('"'),
                            Some('\\') => s.push('\\'),
                            Some(other) => {
                                s.push('\\');
                                s.push(other);
                            }
                            None => return Err(ParseError::new(line, "unterminated string")),
                        },
                        Some('\n') => {
                            line += 1;
                            s.push('\n');
                        }
                        Some(c) => s.push(c),
                        None => return Err(ParseError::new(line, "unterminated string")),
                    }
                }
                tokens.push((Token::Str(s), line));
            }
            '{' => {
                chars.next();
                tokens.push((Token::LBrace, line));
            }
            '}' => {
                chars.next();
                tokens.push((Token::RBrace, line));
            }
            '[' => {
                chars.next();
                tokens.push((Token::LBracket, line));
            }
            ']' => {
                chars.next();
                tokens.push((Token::RBracket, line));
            }
            ';' => {
                chars.next();
                tokens.push((Token::Semi, line));
            }
            ',' => {
                chars.next();
                tokens.push((Token::Comma, line));
            }
            '=' => {
                chars.next();
                tokens.push((Token::Equals, line));
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some('>') => {
                        chars.next();
                        tokens.push((Token::Arrow, line));
                    }
                    // A bare `-` starts a negative number or an identifier
                    // like `-1`; fold it into the ident.
                    _ => {
                        let mut s = String::from("-");
                        while let Some(&c) = chars.peek() {
                            if c.is_alphanumeric() || c == '_' || c == '.' {
                                s.push(c);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        tokens.push((Token::Ident(s), line));
                    }
                }
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(s), line));
            }
            other => {
                return Err(ParseError::new(line, format!("unexpected character `{}`", other)))
            }
        }
    }
    Ok(tokens)
}

/// Attribute defaults inherited by nodes/edges declared in a scope.
#[derive(Debug, Clone, Default)]
struct Scope {
    node_defaults: HashMap<String, String>,
    edge_defaults: HashMap<String, String>,
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|(_, l)| *l)
            .unwrap_or(0)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        let line = self.line();
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(ParseError::new(
                line,
                format!("expected {}, found {}", expected.describe(), t.describe()),
            )),
            None => Err(ParseError::new(
                line,
                format!("expected {}, found end of input", expected.describe()),
            )),
        }
    }

    /// Ident or quoted string; both are names/values in this grammar.
    fn name(&mut self) -> Result<String, ParseError> {
        let line = self.line();
        match self.next() {
            Some(Token::Ident(s)) | Some(Token::Str(s)) => Ok(s),
            Some(t) => Err(ParseError::new(
                line,
                format!("expected identifier, found {}", t.describe()),
            )),
            None => Err(ParseError::new(line, "expected identifier, found end of input")),
        }
    }

    /// Parses `[k=v, k2=v2, ...]`; commas and semicolons between pairs are optional.
    fn attr_list(&mut self) -> Result<HashMap<String, String>, ParseError> {
        self.expect(Token::LBracket)?;
        let mut attrs = HashMap::new();
        loop {
            match self.peek() {
                Some(Token::RBracket) => {
                    self.next();
                    break;
                }
                Some(Token::Comma) | Some(Token::Semi) => {
                    self.next();
                }
                Some(Token::Ident(_)) | Some(Token::Str(_)) => {
                    let key = self.name()?;
                    self.expect(Token::Equals)?;
                    let value = self.name()?;
                    attrs.insert(key, value);
                }
                Some(t) => {
                    let line = self.line();
                    let found = t.describe();
                    return Err(ParseError::new(
                        line,
                        format!("expected attribute, found {}", found),
                    ));
                }
                None => return Err(ParseError::new(self.line(), "unterminated attribute list")),
            }
        }
        Ok(attrs)
    }
}

/// Parses graph source text into a [`Graph`].
pub fn parse_graph(src: &str) -> Result<Graph, ParseError> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };

    let line = p.line();
    match p.next() {
        Some(Token::Ident(kw)) if kw == "digraph" => {}
        _ => return Err(ParseError::new(line, "expected `digraph`")),
    }

    let mut graph = Graph::default();
    if let Some(Token::Ident(_)) | Some(Token::Str(_)) = p.peek() {
        graph.name = p.name()?;
    }
    p.expect(Token::LBrace)?;
    parse_body(&mut p, &mut graph, Scope::default())?;
    Ok(graph)
}

/// Parses statements until the closing brace of the current block.
fn parse_body(p: &mut Parser, graph: &mut Graph, mut scope: Scope) -> Result<(), ParseError> {
    loop {
        match p.peek() {
            Some(Token::RBrace) => {
                p.next();
                return Ok(());
            }
            Some(Token::Semi) => {
                p.next();
            }
            Some(Token::Ident(_)) | Some(Token::Str(_)) => {
                let line = p.line();
                let name = p.name()?;
                match name.as_str() {
                    "subgraph" => {
                        // Optional subgraph name, then a scoped block.
                        if let Some(Token::Ident(_)) | Some(Token::Str(_)) = p.peek() {
                            p.name()?;
                        }
                        p.expect(Token::LBrace)?;
                        parse_body(p, graph, scope.clone())?;
                    }
                    "graph" if matches!(p.peek(), Some(Token::LBracket)) => {
                        let attrs = p.attr_list()?;
                        graph.attributes.extend(attrs);
                    }
                    "node" if matches!(p.peek(), Some(Token::LBracket)) => {
                        let attrs = p.attr_list()?;
                        scope.node_defaults.extend(attrs);
                    }
                    "edge" if matches!(p.peek(), Some(Token::LBracket)) => {
                        let attrs = p.attr_list()?;
                        scope.edge_defaults.extend(attrs);
                    }
                    _ => match p.peek() {
                        Some(Token::Equals) => {
                            p.next();
                            let value = p.name()?;
                            graph.attributes.insert(name, value);
                        }
                        Some(Token::Arrow) => {
                            let mut chain = vec![name];
                            while matches!(p.peek(), Some(Token::Arrow)) {
                                p.next();
                                chain.push(p.name()?);
                            }
                            let attrs = if matches!(p.peek(), Some(Token::LBracket)) {
                                p.attr_list()?
                            } else {
                                HashMap::new()
                            };
                            for pair in chain.windows(2) {
                                ensure_node(graph, &pair[0], &scope);
                                ensure_node(graph, &pair[1], &scope);
                                let mut edge = Edge::new(pair[0].clone(), pair[1].clone());
                                apply_edge_attrs(&mut edge, &scope.edge_defaults, line)?;
                                apply_edge_attrs(&mut edge, &attrs, line)?;
                                graph.edges.push(edge);
                            }
                        }
                        _ => {
                            ensure_node(graph, &name, &scope);
                            if matches!(p.peek(), Some(Token::LBracket)) {
                                let attrs = p.attr_list()?;
                                let node = graph
                                    .nodes
                                    .get_mut(&name)
                                    .ok_or_else(|| ParseError::new(line, "node vanished"))?;
                                apply_node_attrs(node, &attrs, line)?;
                            }
                        }
                    },
                }
            }
            Some(t) => {
                let line = p.line();
                let found = t.describe();
                return Err(ParseError::new(line, format!("unexpected {}", found)));
            }
            None => return Err(ParseError::new(p.line(), "unexpected end of input")),
        }
    }
}

fn ensure_node(graph: &mut Graph, id: &str, scope: &Scope) {
    if !graph.nodes.contains_key(id) {
        let mut node = Node::new(id);
        // Defaults never fail coercion here; they were written by the same
        // author as the node statements and errors surface there too.
        let _ = apply_node_attrs(&mut node, &scope.node_defaults, 0);
        graph.nodes.insert(id.to_string(), node);
    }
}

fn apply_node_attrs(
    node: &mut Node,
    attrs: &HashMap<String, String>,
    line: usize,
) -> Result<(), ParseError> {
    for (key, value) in attrs {
        match key.as_str() {
            "label" => node.label = value.clone(),
            "shape" => node.shape = value.clone(),
            "type" => node.node_type = value.clone(),
            "prompt" => node.prompt = value.clone(),
            "class" => node.node_class = value.clone(),
            "max_retries" => {
                node.max_retries = value.parse().map_err(|_| {
                    ParseError::new(line, format!("invalid max_retries `{}`", value))
                })?
            }
            "timeout" => {
                node.timeout = Some(parse_duration(value).ok_or_else(|| {
                    ParseError::new(line, format!("invalid timeout `{}`", value))
                })?)
            }
            "goal_gate" => node.goal_gate = parse_bool(value, line, "goal_gate")?,
            "allow_partial" => node.allow_partial = parse_bool(value, line, "allow_partial")?,
            "retry_target" => node.retry_target = Some(value.clone()),
            "fallback_retry_target" => node.fallback_retry_target = Some(value.clone()),
            "llm_model" | "model" => node.llm_model = Some(value.clone()),
            "llm_provider" | "provider" => node.llm_provider = Some(value.clone()),
            "reasoning_effort" => node.reasoning_effort = Some(value.clone()),
            _ => {
                node.attributes.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn apply_edge_attrs(
    edge: &mut Edge,
    attrs: &HashMap<String, String>,
    line: usize,
) -> Result<(), ParseError> {
    for (key, value) in attrs {
        match key.as_str() {
            "label" => edge.label = value.clone(),
            "condition" => edge.condition = value.clone(),
            "weight" => {
                edge.weight = value
                    .parse()
                    .map_err(|_| ParseError::new(line, format!("invalid weight `{}`", value)))?
            }
            "loop_restart" => edge.loop_restart = parse_bool(value, line, "loop_restart")?,
            "fidelity" => edge.fidelity = Some(value.clone()),
            "thread" | "thread_id" => edge.thread_id = Some(value.clone()),
            _ => {
                edge.attributes.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn parse_bool(value: &str, line: usize, key: &str) -> Result<bool, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ParseError::new(
            line,
            format!("invalid boolean for {}: `{}`", key, value),
        )),
    }
}

/// Parses duration values: `500ms`, `900s`, `15m`, `2h`, or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(n)),
        "ms" => Some(Duration::from_millis(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}
