use {
    chumsky::prelude::{Parser as ChumskyParser, *},
    derive_more::Display,
};

pub(super) trait Parser<'src, Output>:
    ChumskyParser<'src, &'src str, Output, extra::Err<Rich<'src, char>>> + Clone
{
}
impl<
        'src,
        Output,
        T: ChumskyParser<'src, &'src str, Output, extra::Err<Rich<'src, char>>> + Clone,
    > Parser<'src, Output> for T
{
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub enum Token<'src> {
    // delimiters
    #[display("{{")]
    OpenBrace,
    #[display("}}")]
    CloseBrace,
    #[display("[")]
    OpenBracket,
    #[display("]")]
    CloseBracket,
    #[display("(")]
    OpenParen,
    #[display(")")]
    CloseParen,
    #[display(",")]
    Comma,
    #[display("...")]
    Ellipsis,
    #[display(".")]
    Dot,
    #[display(";")]
    Semi,
    #[display(":=")]
    Define,
    #[display(":")]
    Colon,
    #[display("newline")]
    Newline,
    // channel operator
    #[display("<-")]
    Arrow,
    // relational operators
    #[display("<=")]
    LtEq,
    #[display("<")]
    Lt,
    #[display(">=")]
    GtEq,
    #[display(">")]
    Gt,
    #[display("==")]
    EqEq,
    #[display("!=")]
    BangEq,
    // increment and decrement
    #[display("++")]
    PlusPlus,
    #[display("--")]
    MinusMinus,
    // assignment operators
    #[display("+=")]
    PlusEq,
    #[display("-=")]
    MinusEq,
    #[display("*=")]
    StarEq,
    #[display("/=")]
    SlashEq,
    #[display("%=")]
    PercentEq,
    #[display("=")]
    Eq,
    // logical operators
    #[display("&&")]
    AndAnd,
    #[display("||")]
    OrOr,
    #[display("!")]
    Bang,
    // arithmetic operators
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    // keywords
    #[display("break")]
    Break,
    #[display("case")]
    Case,
    #[display("chan")]
    Chan,
    #[display("continue")]
    Continue,
    #[display("default")]
    Default,
    #[display("defer")]
    Defer,
    #[display("else")]
    Else,
    #[display("fallthrough")]
    Fallthrough,
    #[display("for")]
    For,
    #[display("func")]
    Func,
    #[display("go")]
    Go,
    #[display("goto")]
    Goto,
    #[display("if")]
    If,
    #[display("import")]
    Import,
    #[display("interface")]
    Interface,
    #[display("map")]
    Map,
    #[display("package")]
    Package,
    #[display("range")]
    Range,
    #[display("return")]
    Return,
    #[display("select")]
    Select,
    #[display("switch")]
    Switch,
    #[display("type")]
    Type,
    #[display("var")]
    Var,
    // literals
    Int(&'src str),
    #[display("'{_0}'")]
    Char(char),
    #[display("\"{_0}\"")]
    Str(&'src str),
    #[display("`{_0}`")]
    RawStr(&'src str),
    // identifiers
    Ident(&'src str),
}

impl Token<'_> {
    // a newline directly after one of these tokens terminates the statement
    fn ends_statement(&self) -> bool {
        matches!(
            self,
            Token::Ident(_)
                | Token::Int(_)
                | Token::Char(_)
                | Token::Str(_)
                | Token::RawStr(_)
                | Token::Break
                | Token::Continue
                | Token::Fallthrough
                | Token::Return
                | Token::PlusPlus
                | Token::MinusMinus
                | Token::CloseParen
                | Token::CloseBracket
                | Token::CloseBrace
        )
    }
}

fn delimiter_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    choice((
        just('{').to(Token::OpenBrace),
        just('}').to(Token::CloseBrace),
        just('[').to(Token::OpenBracket),
        just(']').to(Token::CloseBracket),
        just('(').to(Token::OpenParen),
        just(')').to(Token::CloseParen),
        just(',').to(Token::Comma),
        just("...").to(Token::Ellipsis),
        just('.').to(Token::Dot),
        just(';').to(Token::Semi),
        just(":=").to(Token::Define),
        just(':').to(Token::Colon),
        just('\n').to(Token::Newline),
    ))
}

fn operator_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    choice([
        // channel operator
        just("<-").to(Token::Arrow),
        // relational operators
        just("<=").to(Token::LtEq),
        just("<").to(Token::Lt),
        just(">=").to(Token::GtEq),
        just(">").to(Token::Gt),
        just("==").to(Token::EqEq),
        just("!=").to(Token::BangEq),
        // increment and decrement
        just("++").to(Token::PlusPlus),
        just("--").to(Token::MinusMinus),
        // assignment operators
        just("+=").to(Token::PlusEq),
        just("-=").to(Token::MinusEq),
        just("*=").to(Token::StarEq),
        just("/=").to(Token::SlashEq),
        just("%=").to(Token::PercentEq),
        just("=").to(Token::Eq),
        // logical operators
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
        just("!").to(Token::Bang),
        // arithmetic operators
        just("+").to(Token::Plus),
        just("-").to(Token::Minus),
        just("*").to(Token::Star),
        just("/").to(Token::Slash),
        just("%").to(Token::Percent),
    ])
}

fn char_escape_lexer<'src>() -> impl Parser<'src, char> {
    just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
        just('\\').to('\\'),
        just('"').to('"'),
        just('\'').to('\''),
        just('0').to('\0'),
    )))
}

fn string_literal_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    choice((
        none_of("\"\\\n")
            .or(char_escape_lexer())
            .repeated()
            .to_slice()
            .delimited_by(just('"'), just('"'))
            .map(Token::Str),
        none_of('`')
            .repeated()
            .to_slice()
            .delimited_by(just('`'), just('`'))
            .map(Token::RawStr),
    ))
}

fn char_literal_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    just('\'')
        .ignore_then(none_of("'\\").or(char_escape_lexer()))
        .then_ignore(just('\''))
        .map(Token::Char)
}

fn int_literal_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    text::int(10).map(Token::Int)
}

fn ident_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    text::ascii::ident().map(|ident| match ident {
        "break" => Token::Break,
        "case" => Token::Case,
        "chan" => Token::Chan,
        "continue" => Token::Continue,
        "default" => Token::Default,
        "defer" => Token::Defer,
        "else" => Token::Else,
        "fallthrough" => Token::Fallthrough,
        "for" => Token::For,
        "func" => Token::Func,
        "go" => Token::Go,
        "goto" => Token::Goto,
        "if" => Token::If,
        "import" => Token::Import,
        "interface" => Token::Interface,
        "map" => Token::Map,
        "package" => Token::Package,
        "range" => Token::Range,
        "return" => Token::Return,
        "select" => Token::Select,
        "switch" => Token::Switch,
        "type" => Token::Type,
        "var" => Token::Var,
        _ => Token::Ident(ident),
    })
}

fn token_lexer<'src>() -> impl Parser<'src, Token<'src>> {
    choice((
        delimiter_lexer(),
        operator_lexer(),
        string_literal_lexer(),
        char_literal_lexer(),
        int_literal_lexer(),
        ident_lexer(),
    ))
}

fn padding_lexer<'src>() -> impl Parser<'src, ()> {
    choice((
        one_of(" \t\r").ignored(),
        // line comments stop before the newline so that it still ends the statement
        just("//").then(none_of('\n').repeated()).ignored(),
        just("/*")
            .then(any().and_is(just("*/").not()).repeated())
            .then(just("*/"))
            .ignored(),
    ))
    .repeated()
}

pub(super) fn lexer<'src>() -> impl Parser<'src, Vec<Token<'src>>> {
    padding_lexer()
        .ignore_then(
            token_lexer()
                .then_ignore(padding_lexer())
                .repeated()
                .collect(),
        )
        .then_ignore(end())
}

/// Applies Go's automatic semicolon insertion: a newline becomes a `;` when
/// the preceding token can end a statement, and is dropped otherwise.
pub(super) fn insert_semicolons(tokens: Vec<Token<'_>>) -> Vec<Token<'_>> {
    let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Newline => {
                if output.last().is_some_and(Token::ends_statement) {
                    output.push(Token::Semi);
                }
            }
            _ => output.push(token),
        }
    }
    if output.last().is_some_and(Token::ends_statement) {
        output.push(Token::Semi);
    }
    output
}
