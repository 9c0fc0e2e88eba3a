//! Name patterns and `execution(...)` patterns.

use std::fmt;

use crate::descriptor::MethodSignature;

/// Limited wildcard pattern over a full name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// `*`
    Any,
    /// `com.x.Foo`
    Exact(String),
    /// `get*`
    Prefix(String),
    /// `*Service`
    Suffix(String),
    /// `*Repo*`
    Contains(String),
    /// `com.x.*Service`, `com.*.Foo`: literal pieces between stars, in order.
    Glob(Vec<String>),
}

impl NamePattern {
    pub fn new(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text.chars().all(|c| c == '*') {
            return Self::Any;
        }
        let leading = text.starts_with('*');
        let trailing = text.ends_with('*');
        let core = text.trim_matches('*').to_string();
        if core.contains('*') {
            return Self::Glob(text.split('*').map(str::to_string).collect());
        }
        match (leading, trailing) {
            (true, true) => Self::Contains(core),
            (true, false) => Self::Suffix(core),
            (false, true) => Self::Prefix(core),
            (false, false) => Self::Exact(core),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(exact) => name == exact,
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => name.ends_with(suffix.as_str()),
            Self::Contains(part) => name.contains(part.as_str()),
            Self::Glob(pieces) => glob_matches(pieces, name),
        }
    }
}

/// `*` between pieces matches any run of characters, dots included.
fn glob_matches(pieces: &[String], name: &str) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return true;
    };
    let Some(mut remaining) = name.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for piece in middle {
        match remaining.find(piece.as_str()) {
            Some(at) => remaining = &remaining[at + piece.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(s) => f.write_str(s),
            Self::Prefix(s) => write!(f, "{s}*"),
            Self::Suffix(s) => write!(f, "*{s}"),
            Self::Contains(s) => write!(f, "*{s}*"),
            Self::Glob(pieces) => f.write_str(&pieces.join("*")),
        }
    }
}

/// Body of an `execution(...)` leaf.
///
/// Modifiers and the parameter pattern are kept for display but never
/// enforced: only return type, owning type and method name decide a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPattern {
    pub modifiers: Vec<String>,
    pub returns: NamePattern,
    pub owner: NamePattern,
    pub method: NamePattern,
    pub params: String,
}

impl ExecutionPattern {
    /// Parse the text between `execution(` and its closing `)`.
    ///
    /// Errors carry a message only; the caller attaches position info.
    pub fn parse(body: &str) -> Result<Self, String> {
        let body = body.trim();
        if !body.ends_with(')') {
            return Err("execution pattern must end with a parameter list".to_string());
        }

        let open = param_list_start(body)
            .ok_or_else(|| "unbalanced parameter list in execution pattern".to_string())?;
        let params = body[open + 1..body.len() - 1].trim().to_string();

        let mut tokens: Vec<&str> = body[..open].split_whitespace().collect();
        let target = tokens
            .pop()
            .ok_or_else(|| "missing method pattern in execution pattern".to_string())?;
        let returns = tokens
            .pop()
            .ok_or_else(|| "missing return type pattern in execution pattern".to_string())?;

        let (owner, method) = match target.rsplit_once('.') {
            Some((owner, method)) => (owner, method),
            None => ("*", target),
        };
        if method.is_empty() {
            return Err(format!("empty method name in '{target}'"));
        }

        Ok(Self {
            modifiers: tokens.into_iter().map(str::to_string).collect(),
            returns: NamePattern::new(returns),
            owner: NamePattern::new(owner),
            method: NamePattern::new(method),
            params,
        })
    }

    pub fn matches(&self, method: &MethodSignature) -> bool {
        self.returns.matches(&method.returns)
            && self.owner.matches(&method.owner)
            && self.method.matches(&method.name)
    }
}

impl fmt::Display for ExecutionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{modifier} ")?;
        }
        write!(
            f,
            "{} {}.{}({})",
            self.returns, self.owner, self.method, self.params
        )
    }
}

/// Byte offset of the `(` matching the final `)`.
fn param_list_start(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, ch) in body.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}
