use lamb::lexer::{tokenize, TokenKind};

#[test]
fn every_html_character_is_its_own_token() {
    let tokens = tokenize("<p>");
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    let literals: Vec<&str> = tokens.iter().map(|t| t.literal.as_str()).collect();

    assert_eq!(
        kinds,
        vec![
            TokenKind::Html,
            TokenKind::Html,
            TokenKind::Html,
            TokenKind::Eof
        ]
    );
    assert_eq!(literals, vec!["<", "p", ">", ""]);
}

#[test]
fn switches_between_html_and_code_modes() {
    let tokens = tokenize("a{? x ?}b");
    let kinds: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();

    assert_eq!(
        kinds,
        vec![
            TokenKind::Html,
            TokenKind::Ident,
            TokenKind::Eoc,
            TokenKind::Html,
            TokenKind::Eof
        ]
    );
}

#[test]
fn tokenizes_operators_and_punctuation() {
    let tokens = tokenize("{? = == ! != + - * / < > , ; : . ( ) { } [ ] ?}");
    let kinds: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();

    assert_eq!(
        kinds,
        vec![
            TokenKind::Assign,
            TokenKind::Eq,
            TokenKind::Bang,
            TokenKind::NotEq,
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Asterisk,
            TokenKind::Slash,
            TokenKind::Lt,
            TokenKind::Gt,
            TokenKind::Comma,
            TokenKind::Semicolon,
            TokenKind::Colon,
            TokenKind::Dot,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBrace,
            TokenKind::RBrace,
            TokenKind::LBracket,
            TokenKind::RBracket,
            TokenKind::Eoc,
            TokenKind::Eof
        ]
    );
}

#[test]
fn recognizes_every_keyword() {
    let src = "{? var true false if else endif for endfor in and extends section endsection define end include ?}";
    let kinds: Vec<TokenKind> = tokenize(src).into_iter().map(|t| t.kind).collect();

    assert_eq!(
        kinds,
        vec![
            TokenKind::Var,
            TokenKind::True,
            TokenKind::False,
            TokenKind::If,
            TokenKind::Else,
            TokenKind::Endif,
            TokenKind::For,
            TokenKind::Endfor,
            TokenKind::In,
            TokenKind::And,
            TokenKind::Extends,
            TokenKind::Section,
            TokenKind::Endsection,
            TokenKind::Define,
            TokenKind::End,
            TokenKind::Include,
            TokenKind::Eoc,
            TokenKind::Eof
        ]
    );
}

#[test]
fn string_literal_keeps_its_quotes() {
    let tokens = tokenize("{? \"hello\" 'single' ?}");

    assert_eq!(tokens[0].kind, TokenKind::Str { closed: true });
    assert_eq!(tokens[0].literal, "\"hello\"");
    assert_eq!(tokens[1].kind, TokenKind::Str { closed: true });
    assert_eq!(tokens[1].literal, "'single'");
}

#[test]
fn unterminated_string_is_flagged_open() {
    let tokens = tokenize("{? \"oops");

    assert_eq!(tokens[0].kind, TokenKind::Str { closed: false });
    assert_eq!(tokens[0].literal, "\"oops");
    assert_eq!(tokens[1].kind, TokenKind::Eof);
}

#[test]
fn comments_are_discarded() {
    let kinds: Vec<TokenKind> = tokenize("{? 1 # note # 2 ?}")
        .into_iter()
        .map(|t| t.kind)
        .collect();

    assert_eq!(
        kinds,
        vec![
            TokenKind::Int,
            TokenKind::Int,
            TokenKind::Eoc,
            TokenKind::Eof
        ]
    );
}

#[test]
fn unterminated_comment_consumes_to_eof() {
    let kinds: Vec<TokenKind> = tokenize("{? 1 # never closed")
        .into_iter()
        .map(|t| t.kind)
        .collect();

    assert_eq!(kinds, vec![TokenKind::Int, TokenKind::Eof]);
}

#[test]
fn identifiers_are_letters_and_underscores_only() {
    let tokens = tokenize("{? user_name x1 ?}");

    assert_eq!(tokens[0].kind, TokenKind::Ident);
    assert_eq!(tokens[0].literal, "user_name");
    // The digit is not part of the identifier.
    assert_eq!(tokens[1].kind, TokenKind::Ident);
    assert_eq!(tokens[1].literal, "x");
    assert_eq!(tokens[2].kind, TokenKind::Int);
    assert_eq!(tokens[2].literal, "1");
}

#[test]
fn unknown_characters_are_illegal_tokens() {
    let tokens = tokenize("{? @ ?}");

    assert_eq!(tokens[0].kind, TokenKind::Illegal);
    assert_eq!(tokens[0].literal, "@");
}

#[test]
fn tracks_lines_and_columns() {
    let tokens = tokenize("{? x\ny\tz ?}");

    let x = &tokens[0];
    assert_eq!((x.line, x.column), (1, 4));

    let y = &tokens[1];
    assert_eq!((y.line, y.column), (2, 1));

    // Tab advances the column by four.
    let z = &tokens[2];
    assert_eq!((z.line, z.column), (2, 6));
}

#[test]
fn eof_repeats_indefinitely() {
    let mut lexer = lamb::lexer::Lexer::new("x");

    assert_eq!(lexer.next_token().kind, TokenKind::Html);
    assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    assert_eq!(lexer.next_token().kind, TokenKind::Eof);
}
