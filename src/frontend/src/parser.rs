use {
    super::{ast::*, lexer::Token},
    chumsky::prelude::{Parser as ChumskyParser, *},
};

pub(super) trait Parser<'tokens, 'src: 'tokens, Output>:
    ChumskyParser<'tokens, &'tokens [Token<'src>], Output, extra::Err<Rich<'tokens, Token<'src>>>>
    + Clone
    + 'tokens
{
}
impl<
        'tokens,
        'src: 'tokens,
        Output,
        T: ChumskyParser<
                'tokens,
                &'tokens [Token<'src>],
                Output,
                extra::Err<Rich<'tokens, Token<'src>>>,
            > + Clone
            + 'tokens,
    > Parser<'tokens, 'src, Output> for T
{
}

fn ident_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, &'src str> {
    select! { Token::Ident(ident) => ident }
}

fn int_parser<'tokens, 'src: 'tokens, T: std::str::FromStr + 'tokens>() -> impl Parser<'tokens, 'src, T>
where
    T::Err: std::fmt::Display,
{
    select! { Token::Int(int) => int }.try_map(|int: &str, span| {
        int.parse()
            .map_err(|err| Rich::custom(span, format!("invalid integer literal {int}: {err}")))
    })
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(c) => out.push(c),
            None => out.push('\\'),
        }
    }
    out
}

fn lit_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Lit> {
    choice((
        int_parser().map(Lit::Int),
        select! {
            Token::Str(s) => Lit::Str(unescape(s)),
            Token::RawStr(s) => Lit::Str(s.to_owned()),
            Token::Char(c) => Lit::Char(c),
        },
    ))
}

fn str_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, String> {
    select! {
        Token::Str(s) => unescape(s),
        Token::RawStr(s) => s.to_owned(),
    }
}

// Go lets `a, b int` share one type; either every entry is named or none is.
fn group_fields(entries: Vec<(Option<&str>, Type)>) -> Option<Vec<Field>> {
    if entries.iter().all(|(name, _)| name.is_none()) {
        return Some(
            entries
                .into_iter()
                .map(|(_, ty)| Field { names: vec![], ty })
                .collect(),
        );
    }
    let mut fields = vec![];
    let mut pending = vec![];
    for entry in entries {
        match entry {
            (Some(name), ty) => {
                pending.push(Ident::new(name));
                fields.push(Field {
                    names: std::mem::take(&mut pending),
                    ty,
                });
            }
            (None, Type::Named(name)) => pending.push(Ident::new(name)),
            (None, _) => return None,
        }
    }
    pending.is_empty().then_some(fields)
}

fn params_parser<'tokens, 'src: 'tokens>(
    type_parser: impl Parser<'tokens, 'src, Type>,
) -> impl Parser<'tokens, 'src, Vec<Field>> {
    ident_parser()
        .then(type_parser.clone())
        .map(|(name, ty)| (Some(name), ty))
        .or(type_parser.map(|ty| (None, ty)))
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::OpenParen), just(Token::CloseParen))
        .try_map(|entries, span| {
            group_fields(entries)
                .ok_or_else(|| Rich::custom(span, "mixed named and unnamed parameters"))
        })
}

fn signature_parser<'tokens, 'src: 'tokens>(
    type_parser: impl Parser<'tokens, 'src, Type>,
) -> impl Parser<'tokens, 'src, FuncType> {
    params_parser(type_parser.clone())
        .then(
            choice((
                params_parser(type_parser.clone()),
                type_parser.map(|ty| vec![Field { names: vec![], ty }]),
            ))
            .or_not()
            .map(Option::unwrap_or_default),
        )
        .map(|(params, results)| FuncType { params, results })
}

fn type_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Type> {
    recursive(|type_parser| {
        let named = ident_parser()
            .then(just(Token::Dot).ignore_then(ident_parser()).or_not())
            .map(|(first, second)| match second {
                Some(name) => Type::Qualified {
                    package: first.to_owned(),
                    name: name.to_owned(),
                },
                None => Type::Named(first.to_owned()),
            });

        let slice_or_array = int_parser()
            .or_not()
            .delimited_by(just(Token::OpenBracket), just(Token::CloseBracket))
            .then(type_parser.clone())
            .map(|(len, elem)| match len {
                Some(len) => Type::Array {
                    len,
                    elem: Box::new(elem),
                },
                None => Type::Slice(Box::new(elem)),
            });

        let map = just(Token::Map)
            .ignore_then(
                type_parser
                    .clone()
                    .delimited_by(just(Token::OpenBracket), just(Token::CloseBracket)),
            )
            .then(type_parser.clone())
            .map(|(key, value)| Type::Map {
                key: Box::new(key),
                value: Box::new(value),
            });

        let chan = just(Token::Chan)
            .ignore_then(type_parser.clone())
            .map(|elem| Type::Chan(Box::new(elem)));

        let func = just(Token::Func)
            .ignore_then(signature_parser(type_parser.clone()))
            .map(Type::Func);

        let interface = just(Token::Interface)
            .then(just(Token::OpenBrace))
            .then(just(Token::CloseBrace))
            .to(Type::Named("any".to_owned()));

        choice((
            named,
            slice_or_array,
            map,
            chan,
            func,
            interface,
            type_parser.delimited_by(just(Token::OpenParen), just(Token::CloseParen)),
        ))
        .boxed()
    })
}

fn expr_parser<'tokens, 'src: 'tokens>(
    block_parser: impl Parser<'tokens, 'src, Block>,
) -> impl Parser<'tokens, 'src, Expr> {
    #[derive(Clone)]
    enum Postfix {
        Selector(String),
        Index(Vec<Expr>),
        Call(Vec<Expr>, bool),
        Assert(Option<Type>),
    }

    recursive(move |expr_parser| {
        let elements = expr_parser
            .clone()
            .then_ignore(just(Token::Colon))
            .or_not()
            .then(expr_parser.clone())
            .map(|(key, value)| Element { key, value })
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect()
            .delimited_by(just(Token::OpenBrace), just(Token::CloseBrace));

        // named types are parsed as identifiers; only literal types reach here
        let composite_or_type = type_parser()
            .filter(|ty| {
                !matches!(
                    ty,
                    Type::Named(_) | Type::Qualified { .. } | Type::Func(_)
                )
            })
            .then(elements.or_not())
            .map(|(ty, elems)| match elems {
                Some(elems) => Expr::Composite { ty, elems },
                None => Expr::TypeLit(ty),
            });

        let func_lit = just(Token::Func)
            .ignore_then(signature_parser(type_parser()))
            .then(block_parser.or_not())
            .map(|(ty, body)| match body {
                Some(body) => Expr::FuncLit { ty, body },
                None => Expr::TypeLit(Type::Func(ty)),
            });

        let atom = choice((
            lit_parser().map(Expr::Lit),
            ident_parser().map(Expr::ident),
            composite_or_type,
            func_lit,
            expr_parser
                .clone()
                .delimited_by(just(Token::OpenParen), just(Token::CloseParen))
                .map(|expr| Expr::Paren(Box::new(expr))),
        ));

        let args = expr_parser
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .then(
                just(Token::Ellipsis)
                    .then_ignore(just(Token::Comma).or_not())
                    .or_not()
                    .map(|ellipsis| ellipsis.is_some()),
            )
            .delimited_by(just(Token::OpenParen), just(Token::CloseParen));

        let postfix = atom.foldl(
            choice((
                just(Token::Dot).ignore_then(choice((
                    ident_parser().map(|field| Postfix::Selector(field.to_owned())),
                    just(Token::Type)
                        .to(None)
                        .or(type_parser().map(Some))
                        .delimited_by(just(Token::OpenParen), just(Token::CloseParen))
                        .map(Postfix::Assert),
                ))),
                expr_parser
                    .clone()
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .allow_trailing()
                    .collect()
                    .delimited_by(just(Token::OpenBracket), just(Token::CloseBracket))
                    .map(Postfix::Index),
                args.map(|(args, ellipsis)| Postfix::Call(args, ellipsis)),
            ))
            .repeated(),
            |base, postfix| match postfix {
                Postfix::Selector(field) => Expr::selector(base, field),
                Postfix::Index(indices) => Expr::index(base, indices),
                Postfix::Call(args, ellipsis) => Expr::Call(CallExpr {
                    id: NodeId::default(),
                    func: Box::new(base),
                    args,
                    ellipsis,
                }),
                Postfix::Assert(ty) => Expr::TypeAssert {
                    expr: Box::new(base),
                    ty,
                },
            },
        );

        let unary = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Bang).to(UnaryOp::Not),
            just(Token::Arrow).to(UnaryOp::Recv),
        ))
        .repeated()
        .foldr(postfix, |op, expr| Expr::Unary {
            op,
            expr: Box::new(expr),
        });

        let prec = unary.clone().foldl(
            choice([
                just(Token::Star).to(BinaryOp::Mul),
                just(Token::Slash).to(BinaryOp::Div),
                just(Token::Percent).to(BinaryOp::Rem),
            ])
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let prec = prec.clone().foldl(
            choice([
                just(Token::Plus).to(BinaryOp::Add),
                just(Token::Minus).to(BinaryOp::Sub),
            ])
            .then(prec)
            .repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let prec = prec.clone().foldl(
            choice([
                just(Token::LtEq).to(BinaryOp::Le),
                just(Token::Lt).to(BinaryOp::Lt),
                just(Token::GtEq).to(BinaryOp::Ge),
                just(Token::Gt).to(BinaryOp::Gt),
                just(Token::EqEq).to(BinaryOp::Eq),
                just(Token::BangEq).to(BinaryOp::Ne),
            ])
            .then(prec)
            .repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let prec = prec.clone().foldl(
            just(Token::AndAnd).to(BinaryOp::And).then(prec).repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        prec.clone()
            .foldl(
                just(Token::OrOr).to(BinaryOp::Or).then(prec).repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed()
    })
}

fn expr_list_parser<'tokens, 'src: 'tokens>(
    expr_parser: impl Parser<'tokens, 'src, Expr>,
) -> impl Parser<'tokens, 'src, Vec<Expr>> {
    expr_parser
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect()
}

fn simple_stmt_parser<'tokens, 'src: 'tokens>(
    expr_parser: impl Parser<'tokens, 'src, Expr>,
) -> impl Parser<'tokens, 'src, Stmt> {
    #[derive(Clone)]
    enum Tail {
        Assign(AssignOp, Vec<Expr>),
        IncDec(bool),
        Send(Expr),
    }

    let op_assign = choice([
        just(Token::PlusEq).to(BinaryOp::Add),
        just(Token::MinusEq).to(BinaryOp::Sub),
        just(Token::StarEq).to(BinaryOp::Mul),
        just(Token::SlashEq).to(BinaryOp::Div),
        just(Token::PercentEq).to(BinaryOp::Rem),
    ]);

    expr_list_parser(expr_parser.clone())
        .then(
            choice((
                just(Token::Define)
                    .ignore_then(expr_list_parser(expr_parser.clone()))
                    .map(|rhs| Tail::Assign(AssignOp::Define, rhs)),
                just(Token::Eq)
                    .ignore_then(expr_list_parser(expr_parser.clone()))
                    .map(|rhs| Tail::Assign(AssignOp::Assign, rhs)),
                op_assign
                    .then(expr_parser.clone())
                    .map(|(op, rhs)| Tail::Assign(AssignOp::Op(op), vec![rhs])),
                just(Token::PlusPlus).to(Tail::IncDec(true)),
                just(Token::MinusMinus).to(Tail::IncDec(false)),
                just(Token::Arrow).ignore_then(expr_parser).map(Tail::Send),
            ))
            .or_not(),
        )
        .try_map(|(mut lhs, tail), span| {
            let kind = match tail {
                Some(Tail::Assign(op @ (AssignOp::Define | AssignOp::Assign), rhs)) => {
                    StmtKind::Assign { lhs, op, rhs }
                }
                Some(Tail::Assign(op, rhs)) if lhs.len() == 1 => StmtKind::Assign { lhs, op, rhs },
                Some(Tail::IncDec(inc)) if lhs.len() == 1 => StmtKind::IncDec {
                    expr: lhs.remove(0),
                    inc,
                },
                Some(Tail::Send(value)) if lhs.len() == 1 => StmtKind::Send {
                    chan: lhs.remove(0),
                    value,
                },
                None if lhs.len() == 1 => StmtKind::Expr(lhs.remove(0)),
                _ => return Err(Rich::custom(span, "expected a single expression")),
            };
            Ok(Stmt::from(kind))
        })
}

fn stmt_list_parser<'tokens, 'src: 'tokens>(
    stmt_parser: impl Parser<'tokens, 'src, Stmt>,
) -> impl Parser<'tokens, 'src, Block> {
    just(Token::Semi).repeated().ignore_then(
        stmt_parser
            .separated_by(just(Token::Semi).repeated().at_least(1))
            .allow_trailing()
            .collect(),
    )
}

fn is_type_switch_guard(stmt: &Stmt) -> bool {
    let is_guard = |expr: &Expr| matches!(expr, Expr::TypeAssert { ty: None, .. });
    match &stmt.kind {
        StmtKind::Expr(expr) => is_guard(expr),
        StmtKind::Assign {
            lhs,
            op: AssignOp::Define,
            rhs,
        } => lhs.len() == 1 && rhs.len() == 1 && is_guard(&rhs[0]),
        _ => false,
    }
}

fn block_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Block> {
    recursive(|block_parser| {
        let expr = expr_parser(block_parser.clone());
        let expr_list = expr_list_parser(expr.clone());
        let simple = simple_stmt_parser(expr.clone()).boxed();

        let stmt = recursive(|stmt| {
            let var = just(Token::Var)
                .ignore_then(
                    ident_parser()
                        .map(Ident::new)
                        .separated_by(just(Token::Comma))
                        .at_least(1)
                        .collect(),
                )
                .then(type_parser().or_not())
                .then(
                    just(Token::Eq)
                        .ignore_then(expr_list.clone())
                        .or_not()
                        .map(Option::unwrap_or_default),
                )
                .map(|((names, ty), values)| StmtKind::Var { names, ty, values });

            let go = just(Token::Go).ignore_then(expr.clone()).map(StmtKind::Go);

            let defer = just(Token::Defer)
                .ignore_then(expr.clone())
                .map(StmtKind::Defer);

            let r#return = just(Token::Return)
                .ignore_then(expr_list.clone().or_not().map(Option::unwrap_or_default))
                .map(StmtKind::Return);

            let branch = choice((
                just(Token::Break).to(BranchKind::Break),
                just(Token::Continue).to(BranchKind::Continue),
                just(Token::Goto).to(BranchKind::Goto),
                just(Token::Fallthrough).to(BranchKind::Fallthrough),
            ))
            .then(ident_parser().map(str::to_owned).or_not())
            .map(|(kind, label)| StmtKind::Branch { kind, label });

            let if_else = recursive(|if_else| {
                just(Token::If)
                    .ignore_then(simple.clone().then_ignore(just(Token::Semi)).or_not())
                    .then(expr.clone())
                    .then(block_parser.clone())
                    .then(
                        just(Token::Else)
                            .ignore_then(choice((
                                if_else,
                                block_parser.clone().map(|body| Stmt::from(StmtKind::Block(body))),
                            )))
                            .or_not(),
                    )
                    .map(|(((init, cond), body), els)| {
                        Stmt::from(StmtKind::If {
                            init: init.map(Box::new),
                            cond,
                            body,
                            els: els.map(Box::new),
                        })
                    })
            });

            let case_clause = choice((
                just(Token::Case).ignore_then(expr_list.clone()).map(Some),
                just(Token::Default).to(None),
            ))
            .then_ignore(just(Token::Colon))
            .then(stmt_list_parser(stmt.clone()))
            .map(|(exprs, body)| CaseClause { exprs, body });

            let switch = just(Token::Switch)
                .ignore_then(simple.clone().then_ignore(just(Token::Semi)).or_not())
                .then(simple.clone().or_not())
                .then(
                    case_clause
                        .repeated()
                        .collect()
                        .delimited_by(just(Token::OpenBrace), just(Token::CloseBrace)),
                )
                .try_map(|((init, guard), cases), span| {
                    let init = init.map(Box::new);
                    match guard.map(|stmt| (is_type_switch_guard(&stmt), stmt)) {
                        None => Ok(StmtKind::Switch {
                            init,
                            tag: None,
                            cases,
                        }),
                        Some((true, guard)) => Ok(StmtKind::TypeSwitch {
                            init,
                            guard: Box::new(guard),
                            cases,
                        }),
                        Some((
                            false,
                            Stmt {
                                kind: StmtKind::Expr(tag),
                                ..
                            },
                        )) => Ok(StmtKind::Switch {
                            init,
                            tag: Some(tag),
                            cases,
                        }),
                        Some(_) => Err(Rich::custom(span, "expected switch expression")),
                    }
                });

            let comm_clause = choice((
                just(Token::Case)
                    .ignore_then(simple.clone())
                    .map(|comm| Some(Box::new(comm))),
                just(Token::Default).to(None),
            ))
            .then_ignore(just(Token::Colon))
            .then(stmt_list_parser(stmt.clone()))
            .map(|(comm, body)| CommClause { comm, body });

            let select = just(Token::Select)
                .ignore_then(
                    comm_clause
                        .repeated()
                        .collect()
                        .delimited_by(just(Token::OpenBrace), just(Token::CloseBrace)),
                )
                .map(StmtKind::Select);

            let range_clause = expr_list
                .clone()
                .then(choice((
                    just(Token::Define).to(true),
                    just(Token::Eq).to(false),
                )))
                .or_not()
                .then_ignore(just(Token::Range))
                .then(expr.clone());

            let for_range = just(Token::For)
                .ignore_then(range_clause)
                .then(block_parser.clone())
                .try_map(|((lhs, expr), body), span| {
                    let (lhs, define) = lhs.unwrap_or_default();
                    if lhs.len() > 2 {
                        return Err(Rich::custom(span, "range permits at most two iteration variables"));
                    }
                    let mut lhs = lhs.into_iter();
                    Ok(StmtKind::Range {
                        key: lhs.next(),
                        value: lhs.next(),
                        define,
                        expr,
                        body,
                    })
                });

            let for_clause = just(Token::For)
                .ignore_then(simple.clone().or_not())
                .then_ignore(just(Token::Semi))
                .then(expr.clone().or_not())
                .then_ignore(just(Token::Semi))
                .then(simple.clone().or_not())
                .then(block_parser.clone())
                .map(|(((init, cond), post), body)| StmtKind::For {
                    init: init.map(Box::new),
                    cond,
                    post: post.map(Box::new),
                    body,
                });

            let for_cond = just(Token::For)
                .ignore_then(expr.clone().or_not())
                .then(block_parser.clone())
                .map(|(cond, body)| StmtKind::For {
                    init: None,
                    cond,
                    post: None,
                    body,
                });

            let labeled = ident_parser()
                .then_ignore(just(Token::Colon))
                .then(stmt.clone())
                .map(|(label, stmt)| StmtKind::Labeled {
                    label: label.to_owned(),
                    stmt: Box::new(stmt),
                });

            choice((
                var.map(Stmt::from),
                go.map(Stmt::from),
                defer.map(Stmt::from),
                r#return.map(Stmt::from),
                branch.map(Stmt::from),
                if_else,
                switch.map(Stmt::from),
                select.map(Stmt::from),
                for_range.map(Stmt::from),
                for_clause.map(Stmt::from),
                for_cond.map(Stmt::from),
                block_parser.clone().map(StmtKind::Block).map(Stmt::from),
                labeled.map(Stmt::from),
                simple.clone(),
            ))
            .boxed()
        });

        stmt_list_parser(stmt)
            .delimited_by(just(Token::OpenBrace), just(Token::CloseBrace))
            .boxed()
    })
}

fn import_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, Vec<Import>> {
    let spec = choice((
        ident_parser().map(str::to_owned),
        just(Token::Dot).to(".".to_owned()),
    ))
    .or_not()
    .then(str_parser())
    .map(|(name, path)| Import { name, path });

    just(Token::Import).ignore_then(choice((
        spec.clone().map(|import| vec![import]),
        stmt_separated(spec).delimited_by(just(Token::OpenParen), just(Token::CloseParen)),
    )))
}

fn stmt_separated<'tokens, 'src: 'tokens, Item: 'tokens>(
    item_parser: impl Parser<'tokens, 'src, Item>,
) -> impl Parser<'tokens, 'src, Vec<Item>> {
    item_parser
        .separated_by(just(Token::Semi).repeated().at_least(1))
        .allow_trailing()
        .collect()
}

fn func_decl_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, FuncDecl> {
    just(Token::Func)
        .ignore_then(ident_parser())
        .then(signature_parser(type_parser()))
        .then(block_parser().or_not())
        .map(|((name, ty), body)| FuncDecl {
            name: name.to_owned(),
            ty,
            body,
        })
}

pub(super) fn file_parser<'tokens, 'src: 'tokens>() -> impl Parser<'tokens, 'src, File> {
    let semis = just(Token::Semi).repeated();
    just(Token::Package)
        .ignore_then(ident_parser())
        .then_ignore(semis.clone())
        .then(
            import_parser()
                .then_ignore(semis.clone())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .then(
            func_decl_parser()
                .then_ignore(semis)
                .repeated()
                .collect(),
        )
        .then_ignore(end())
        .map(|((package, imports), funcs)| File {
            package: package.to_owned(),
            imports: imports.into_iter().flatten().collect(),
            funcs,
        })
}
