//! Python 源文件的声明级语法树
//!
//! 只构建用例发现需要的结构：装饰器、`class` / `def`、`import` 语句以及
//! 复合语句块。表达式不展开，但括号、字符串和缩进都会被完整校验，
//! 因此语法错误的文件会被拒绝，而不是被部分扫描。

/// 语法错误（行号从 1 开始）
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

pub type SyntaxResult<T> = Result<T, SyntaxError>;

/// 解析后的模块
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Class(ClassDef),
    Function(FunctionDef),
    /// `import a.b, c`
    Import(Vec<String>),
    /// `from ..a import b, c`
    ImportFrom {
        module: Option<String>,
        names: Vec<String>,
        level: usize,
    },
    /// if / for / while / with / try 等复合语句的语句块
    Block(Vec<Stmt>),
    /// 单独的字符串表达式（docstring 候选）
    Str(String),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    /// 可以写成点分名称的基类，例如 `unittest.TestCase`
    pub bases: Vec<Vec<String>>,
    pub decorators: Vec<Decorator>,
    pub docstring: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub is_async: bool,
    pub decorators: Vec<Decorator>,
    pub docstring: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub line: usize,
    pub kind: DecoratorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecoratorKind {
    /// `@pytest` / `@pytest.mark.slow`
    Name(Vec<String>),
    /// `@pytest.mark("smoke", reason=...)`
    Call { callee: Vec<String>, args: Vec<Arg> },
    /// 无法识别的装饰器表达式，例如 `@handlers[0]`
    Malformed,
}

impl DecoratorKind {
    /// 装饰器引用的点分路径（调用形式取被调用者）
    pub fn path(&self) -> Option<&[String]> {
        match self {
            DecoratorKind::Name(path) => Some(path),
            DecoratorKind::Call { callee, .. } => Some(callee),
            DecoratorKind::Malformed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// 位置参数且为字面量
    Literal(Literal),
    /// 关键字参数，仅保留名称
    Keyword(String),
    /// 其他表达式
    Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(String),
    Bool(bool),
    None,
}

impl Literal {
    /// 与 Python `str(value)` 一致的文本形式
    pub fn to_text(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            Literal::Number(n) => n.clone(),
            Literal::Bool(true) => "True".to_string(),
            Literal::Bool(false) => "False".to_string(),
            Literal::None => "None".to_string(),
        }
    }
}

/// 模块中出现的一条导入
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRef {
    pub module: Option<String>,
    pub names: Vec<String>,
    pub level: usize,
}

impl Module {
    /// 递归收集所有 import 语句（包括函数体和类体内部的）
    pub fn imports(&self) -> Vec<ImportRef> {
        let mut out = Vec::new();
        collect_imports(&self.body, &mut out);
        out
    }
}

fn collect_imports(stmts: &[Stmt], out: &mut Vec<ImportRef>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Import(modules) => {
                out.extend(modules.iter().map(|m| ImportRef {
                    module: Some(m.clone()),
                    names: Vec::new(),
                    level: 0,
                }));
            }
            StmtKind::ImportFrom {
                module,
                names,
                level,
            } => out.push(ImportRef {
                module: module.clone(),
                names: names.clone(),
                level: *level,
            }),
            StmtKind::Class(class) => collect_imports(&class.body, out),
            StmtKind::Function(func) => collect_imports(&func.body, out),
            StmtKind::Block(body) => collect_imports(body, out),
            StmtKind::Str(_) | StmtKind::Other => {}
        }
    }
}

/// 解析 Python 源码
pub fn parse(source: &str) -> SyntaxResult<Module> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let body = parser.parse_statements(false)?;
    Ok(Module { body })
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Name(String),
    Number(String),
    Str { value: String, formatted: bool },
    Op(char),
    Newline,
    Indent,
    Dedent,
    End,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

const OPERATOR_CHARS: &str = "+-*/%&|^~<>=!.,:;@";

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
    brackets: Vec<(char, usize)>,
    at_line_start: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            indent_stack: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, tok: Tok, line: usize) {
        self.tokens.push(Token { tok, line });
    }

    fn tokenize(mut self) -> SyntaxResult<Vec<Token>> {
        loop {
            if self.at_line_start && self.brackets.is_empty() && !self.handle_indentation()? {
                continue;
            }

            let Some(c) = self.peek() else { break };
            let line = self.line;
            match c {
                '\n' => {
                    self.advance();
                    if self.brackets.is_empty() {
                        self.push(Tok::Newline, line);
                        self.at_line_start = true;
                    }
                }
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.advance();
                    if self.peek() == Some('\r') {
                        self.advance();
                    }
                    match self.peek() {
                        Some('\n') => {
                            self.advance();
                        }
                        None => {}
                        Some(_) => {
                            return Err(SyntaxError::new(
                                line,
                                "unexpected character after line continuation character",
                            ));
                        }
                    }
                }
                '\'' | '"' => self.lex_string("")?,
                c if c.is_ascii_digit() => self.lex_number(),
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.lex_number(),
                c if c == '_' || c.is_alphabetic() => {
                    let word = self.lex_word();
                    let is_prefix = matches!(
                        word.to_ascii_lowercase().as_str(),
                        "r" | "u" | "b" | "f" | "rb" | "br" | "fr" | "rf"
                    );
                    if is_prefix && matches!(self.peek(), Some('\'' | '"')) {
                        self.lex_string(&word)?;
                    } else {
                        self.push(Tok::Name(word), line);
                    }
                }
                '(' | '[' | '{' => {
                    self.advance();
                    self.brackets.push((c, line));
                    self.push(Tok::Op(c), line);
                }
                ')' | ']' | '}' => {
                    self.advance();
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match self.brackets.pop() {
                        Some((open, _)) if open == expected => self.push(Tok::Op(c), line),
                        Some((open, _)) => {
                            return Err(SyntaxError::new(
                                line,
                                format!("closing parenthesis '{}' does not match '{}'", c, open),
                            ));
                        }
                        None => {
                            return Err(SyntaxError::new(line, format!("unmatched '{}'", c)));
                        }
                    }
                }
                c if OPERATOR_CHARS.contains(c) => {
                    self.advance();
                    self.push(Tok::Op(c), line);
                }
                other => {
                    return Err(SyntaxError::new(
                        line,
                        format!("invalid character '{}'", other),
                    ));
                }
            }
        }

        if let Some((open, line)) = self.brackets.last() {
            return Err(SyntaxError::new(*line, format!("'{}' was never closed", open)));
        }

        let line = self.line;
        if !matches!(
            self.tokens.last().map(|t| &t.tok),
            None | Some(Tok::Newline)
        ) {
            self.push(Tok::Newline, line);
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(Tok::Dedent, line);
        }
        self.push(Tok::End, line);
        Ok(self.tokens)
    }

    /// 处理行首缩进，返回 false 表示这是空行或注释行，已被整行跳过
    fn handle_indentation(&mut self) -> SyntaxResult<bool> {
        let mut indent = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => indent += 1,
                '\t' => indent = (indent / 8 + 1) * 8,
                '\x0c' => indent = 0,
                _ => break,
            }
            self.advance();
        }

        match self.peek() {
            None => {
                self.at_line_start = false;
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                self.advance();
                return Ok(false);
            }
            Some('\r') if self.peek_at(1) == Some('\n') => {
                self.advance();
                self.advance();
                return Ok(false);
            }
            Some('\n') => {
                self.advance();
                return Ok(false);
            }
            _ => {}
        }

        let line = self.line;
        let current = *self.indent_stack.last().unwrap_or(&0);
        if indent > current {
            self.indent_stack.push(indent);
            self.push(Tok::Indent, line);
        } else if indent < current {
            while let Some(&top) = self.indent_stack.last() {
                if top <= indent {
                    break;
                }
                self.indent_stack.pop();
                self.push(Tok::Dedent, line);
            }
            if self.indent_stack.last().copied().unwrap_or(0) != indent {
                return Err(SyntaxError::new(
                    line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }

        self.at_line_start = false;
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn lex_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    fn lex_number(&mut self) {
        let line = self.line;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && text.ends_with(['e', 'E'])
                && !text.starts_with("0x")
                && !text.starts_with("0X");
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        self.push(Tok::Number(text), line);
    }

    fn lex_string(&mut self, prefix: &str) -> SyntaxResult<()> {
        let line = self.line;
        let raw = prefix.contains(['r', 'R']);
        let formatted = prefix.contains(['f', 'F']);
        let Some(quote) = self.advance() else {
            return Err(SyntaxError::new(line, "unterminated string literal"));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.advance() else {
                let message = if triple {
                    "unterminated triple-quoted string literal"
                } else {
                    "unterminated string literal"
                };
                return Err(SyntaxError::new(line, message));
            };

            if c == quote {
                if !triple {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.advance();
                    self.advance();
                    break;
                }
                value.push(c);
                continue;
            }

            match c {
                '\n' if !triple => {
                    return Err(SyntaxError::new(line, "unterminated string literal"));
                }
                '\\' => {
                    let Some(next) = self.advance() else {
                        return Err(SyntaxError::new(line, "unterminated string literal"));
                    };
                    if raw {
                        value.push('\\');
                        value.push(next);
                        continue;
                    }
                    match next {
                        '\n' => {}
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' | '\'' | '"' => value.push(next),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                _ => value.push(c),
            }
        }

        self.push(Tok::Str { value, formatted }, line);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "with", "try", "except", "finally",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::End)
    }

    fn peek_nth(&self, n: usize) -> &Tok {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::End)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line(), message)
    }

    fn is_name(&self, name: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == name)
    }

    fn parse_statements(&mut self, in_block: bool) -> SyntaxResult<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::End => break,
                Tok::Dedent if in_block => {
                    self.bump();
                    break;
                }
                Tok::Dedent => return Err(self.error("unexpected unindent")),
                Tok::Indent => return Err(self.error("unexpected indent")),
                Tok::Newline => {
                    self.bump();
                }
                _ => body.push(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> SyntaxResult<Stmt> {
        let line = self.line();
        let keyword = match self.peek() {
            Tok::Op('@') => return self.parse_decorated(),
            Tok::Name(name) => name.clone(),
            _ => return self.parse_simple(line),
        };

        match keyword.as_str() {
            "class" => self.parse_class(Vec::new(), line),
            "def" => self.parse_def(Vec::new(), false, line),
            "async" if matches!(self.peek_nth(1), Tok::Name(n) if n == "def") => {
                self.bump();
                self.parse_def(Vec::new(), true, line)
            }
            "import" => self.parse_import(line),
            "from" => self.parse_from(line),
            "async" => self.parse_compound(line),
            k if COMPOUND_KEYWORDS.contains(&k) => self.parse_compound(line),
            "match" | "case" if self.line_ends_with_colon() => self.parse_compound(line),
            _ => self.parse_simple(line),
        }
    }

    /// 当前语句是否以冒号结尾（用于 match/case 软关键字）
    fn line_ends_with_colon(&self) -> bool {
        let mut last = None;
        for token in &self.tokens[self.pos..] {
            if matches!(token.tok, Tok::Newline | Tok::End | Tok::Op(';')) {
                break;
            }
            last = Some(&token.tok);
        }
        matches!(last, Some(Tok::Op(':')))
    }

    /// 读取一条简单语句的 token，到 `;` 或行尾为止（分隔符一并消费）
    ///
    /// 行尾多余的 `;` 连同 NEWLINE 一起消费。
    fn take_line(&mut self) -> Vec<Tok> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Tok::Newline => {
                    self.bump();
                    break;
                }
                Tok::Op(';') => {
                    self.bump();
                    if matches!(self.peek(), Tok::Newline) {
                        self.bump();
                    }
                    break;
                }
                Tok::End => break,
                _ => out.push(self.bump()),
            }
        }
        out
    }

    /// 上一条语句以 `;` 结束，且同一行还有后续语句
    fn continues_line(&self) -> bool {
        self.pos > 0
            && matches!(self.tokens[self.pos - 1].tok, Tok::Op(';'))
            && !matches!(self.peek(), Tok::End)
    }

    /// 跳过名称之后的类型参数列表 `[T, U: int]`
    fn skip_type_params(&mut self) -> SyntaxResult<()> {
        if matches!(self.peek(), Tok::Op('[')) {
            self.bump();
            self.take_balanced()?;
        }
        Ok(())
    }

    fn parse_simple(&mut self, line: usize) -> SyntaxResult<Stmt> {
        let tokens = self.take_line();
        let mut text = String::new();
        let all_plain_strings = !tokens.is_empty()
            && tokens.iter().all(|t| match t {
                Tok::Str { value, formatted } => {
                    text.push_str(value);
                    !formatted
                }
                _ => false,
            });
        let kind = if all_plain_strings {
            StmtKind::Str(text)
        } else {
            StmtKind::Other
        };
        Ok(Stmt { line, kind })
    }

    /// 跳过复合语句头部直到深度为 0 的冒号
    fn skip_header(&mut self) -> SyntaxResult<()> {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Tok::Op('(' | '[' | '{') => depth += 1,
                Tok::Op(')' | ']' | '}') => depth = depth.saturating_sub(1),
                Tok::Op(':') if depth == 0 => {
                    self.bump();
                    return Ok(());
                }
                Tok::Newline | Tok::End => return Err(self.error("expected ':'")),
                _ => {}
            }
            self.bump();
        }
    }

    fn parse_suite(&mut self) -> SyntaxResult<Vec<Stmt>> {
        if matches!(self.peek(), Tok::Newline) {
            self.bump();
            if !matches!(self.peek(), Tok::Indent) {
                return Err(self.error("expected an indented block"));
            }
            self.bump();
            return self.parse_statements(true);
        }
        // `if x: a; b` 同一行的多条简单语句都属于这个块
        let mut body = Vec::new();
        loop {
            let line = self.line();
            body.push(self.parse_simple(line)?);
            if !self.continues_line() {
                break;
            }
        }
        Ok(body)
    }

    fn parse_compound(&mut self, line: usize) -> SyntaxResult<Stmt> {
        self.skip_header()?;
        let body = self.parse_suite()?;
        Ok(Stmt {
            line,
            kind: StmtKind::Block(body),
        })
    }

    fn parse_decorated(&mut self) -> SyntaxResult<Stmt> {
        let mut decorators = Vec::new();
        while matches!(self.peek(), Tok::Op('@')) {
            let line = self.line();
            self.bump();
            let tokens = self.take_line();
            if tokens.is_empty() {
                return Err(SyntaxError::new(line, "invalid syntax"));
            }
            decorators.push(Decorator {
                line,
                kind: parse_decorator(&tokens),
            });
        }

        let line = self.line();
        if self.is_name("class") {
            self.parse_class(decorators, line)
        } else if self.is_name("def") {
            self.parse_def(decorators, false, line)
        } else if self.is_name("async") && matches!(self.peek_nth(1), Tok::Name(n) if n == "def")
        {
            self.bump();
            self.parse_def(decorators, true, line)
        } else {
            Err(self.error("expected function or class definition after decorator"))
        }
    }

    fn expect_name(&mut self, context: &str) -> SyntaxResult<String> {
        match self.bump() {
            Tok::Name(name) => Ok(name),
            _ => Err(SyntaxError::new(
                self.tokens
                    .get(self.pos.saturating_sub(1))
                    .map(|t| t.line)
                    .unwrap_or(1),
                format!("invalid {} definition", context),
            )),
        }
    }

    fn parse_class(&mut self, decorators: Vec<Decorator>, line: usize) -> SyntaxResult<Stmt> {
        self.bump();
        let name = self.expect_name("class")?;
        self.skip_type_params()?;

        let mut bases = Vec::new();
        if matches!(self.peek(), Tok::Op('(')) {
            self.bump();
            let inner = self.take_balanced()?;
            for arg in split_top_level(&inner) {
                if let Some(path) = dotted_path(arg) {
                    bases.push(path);
                }
            }
        }

        if !matches!(self.peek(), Tok::Op(':')) {
            return Err(self.error("expected ':'"));
        }
        self.bump();
        let body = self.parse_suite()?;

        Ok(Stmt {
            line,
            kind: StmtKind::Class(ClassDef {
                name,
                bases,
                decorators,
                docstring: docstring_of(&body),
                body,
            }),
        })
    }

    fn parse_def(
        &mut self,
        decorators: Vec<Decorator>,
        is_async: bool,
        line: usize,
    ) -> SyntaxResult<Stmt> {
        self.bump();
        let name = self.expect_name("function")?;
        self.skip_type_params()?;
        if !matches!(self.peek(), Tok::Op('(')) {
            return Err(self.error("expected '('"));
        }
        self.bump();
        self.take_balanced()?;
        // 返回值注解
        self.skip_header()?;
        let body = self.parse_suite()?;

        Ok(Stmt {
            line,
            kind: StmtKind::Function(FunctionDef {
                name,
                is_async,
                decorators,
                docstring: docstring_of(&body),
                body,
            }),
        })
    }

    /// 消费到与已消费的 `(` 匹配的 `)`，返回括号内的 token
    fn take_balanced(&mut self) -> SyntaxResult<Vec<Tok>> {
        let mut depth = 1usize;
        let mut inner = Vec::new();
        loop {
            let tok = self.bump();
            match tok {
                Tok::Op('(' | '[' | '{') => depth += 1,
                Tok::Op(')' | ']' | '}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(inner);
                    }
                }
                Tok::End => return Err(self.error("'(' was never closed")),
                _ => {}
            }
            inner.push(tok);
        }
    }

    fn parse_import(&mut self, line: usize) -> SyntaxResult<Stmt> {
        self.bump();
        let tokens = self.take_line();
        let mut modules = Vec::new();
        for part in split_top_level(&tokens) {
            let end = part
                .iter()
                .position(|t| matches!(t, Tok::Name(n) if n == "as"))
                .unwrap_or(part.len());
            match dotted_path(&part[..end]) {
                Some(path) => modules.push(path.join(".")),
                None => return Err(SyntaxError::new(line, "invalid import statement")),
            }
        }
        if modules.is_empty() {
            return Err(SyntaxError::new(line, "invalid import statement"));
        }
        Ok(Stmt {
            line,
            kind: StmtKind::Import(modules),
        })
    }

    fn parse_from(&mut self, line: usize) -> SyntaxResult<Stmt> {
        self.bump();
        let mut level = 0;
        while matches!(self.peek(), Tok::Op('.')) {
            self.bump();
            level += 1;
        }

        let mut path = Vec::new();
        while let Tok::Name(name) = self.peek() {
            if name == "import" {
                break;
            }
            path.push(name.clone());
            self.bump();
            if matches!(self.peek(), Tok::Op('.')) {
                self.bump();
            } else {
                break;
            }
        }

        if !self.is_name("import") || (level == 0 && path.is_empty()) {
            return Err(SyntaxError::new(line, "invalid import statement"));
        }
        self.bump();

        let tokens: Vec<Tok> = self
            .take_line()
            .into_iter()
            .filter(|t| !matches!(t, Tok::Op('(' | ')')))
            .collect();
        let names = split_top_level(&tokens)
            .into_iter()
            .filter_map(|part| match part.first() {
                Some(Tok::Name(n)) => Some(n.clone()),
                _ => None,
            })
            .collect();

        Ok(Stmt {
            line,
            kind: StmtKind::ImportFrom {
                module: (!path.is_empty()).then(|| path.join(".")),
                names,
                level,
            },
        })
    }
}

/// 按深度为 0 的逗号切分 token 序列，忽略空段
fn split_top_level(tokens: &[Tok]) -> Vec<&[Tok]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Tok::Op('(' | '[' | '{') => depth += 1,
            Tok::Op(')' | ']' | '}') => depth = depth.saturating_sub(1),
            Tok::Op(',') if depth == 0 => {
                if i > start {
                    parts.push(&tokens[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() {
        parts.push(&tokens[start..]);
    }
    parts
}

/// `a.b.c` 形式的 token 序列转为路径，其他形式返回 None
fn dotted_path(tokens: &[Tok]) -> Option<Vec<String>> {
    let mut path = Vec::new();
    let mut expect_name = true;
    for tok in tokens {
        match (tok, expect_name) {
            (Tok::Name(n), true) => {
                path.push(n.clone());
                expect_name = false;
            }
            (Tok::Op('.'), false) => expect_name = true,
            _ => return None,
        }
    }
    (!path.is_empty() && !expect_name).then_some(path)
}

fn parse_decorator(tokens: &[Tok]) -> DecoratorKind {
    let open = tokens
        .iter()
        .position(|t| matches!(t, Tok::Op('(')))
        .unwrap_or(tokens.len());
    let Some(path) = dotted_path(&tokens[..open]) else {
        return DecoratorKind::Malformed;
    };
    if open == tokens.len() {
        return DecoratorKind::Name(path);
    }

    // 调用括号必须一直延伸到行尾，`@a(1)(2)` 之类视为无法识别
    if !matches!(tokens.last(), Some(Tok::Op(')'))) {
        return DecoratorKind::Malformed;
    }
    let inner = &tokens[open + 1..tokens.len() - 1];
    let mut depth = 0usize;
    for tok in inner {
        match tok {
            Tok::Op('(' | '[' | '{') => depth += 1,
            Tok::Op(')' | ']' | '}') => {
                if depth == 0 {
                    return DecoratorKind::Malformed;
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    let args = split_top_level(inner).into_iter().map(classify_arg).collect();
    DecoratorKind::Call {
        callee: path,
        args,
    }
}

fn classify_arg(tokens: &[Tok]) -> Arg {
    if let [Tok::Name(name), Tok::Op('='), rest @ ..] = tokens
        && !matches!(rest.first(), Some(Tok::Op('=')))
    {
        return Arg::Keyword(name.clone());
    }

    match tokens {
        [Tok::Number(n)] => return Arg::Literal(Literal::Number(n.clone())),
        [Tok::Name(n)] if n == "True" => return Arg::Literal(Literal::Bool(true)),
        [Tok::Name(n)] if n == "False" => return Arg::Literal(Literal::Bool(false)),
        [Tok::Name(n)] if n == "None" => return Arg::Literal(Literal::None),
        _ => {}
    }

    let mut text = String::new();
    for tok in tokens {
        match tok {
            Tok::Str {
                value,
                formatted: false,
            } => text.push_str(value),
            _ => return Arg::Expr,
        }
    }
    Arg::Literal(Literal::Str(text))
}

fn docstring_of(body: &[Stmt]) -> Option<String> {
    match body.first().map(|s| &s.kind) {
        Some(StmtKind::Str(raw)) => Some(clean_docstring(raw)),
        _ => None,
    }
}

/// 与 `inspect.cleandoc` 相同的清理规则
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };

    let margin = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(first.trim_start().to_string());
    for line in rest {
        let cut = margin.min(line.len() - line.trim_start().len());
        let stripped = line.get(cut..).unwrap_or_else(|| line.trim_start());
        cleaned.push(stripped.trim_end().to_string());
    }

    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }
    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    cleaned.join("\n")
}
