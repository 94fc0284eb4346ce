//! Recursive-descent parser with live fixity resolution (spec §4.2).
//!
//! Grounded on the teacher's `ParseState<T>` token-cursor idiom
//! (`crates/why_lib/src/parser/parse_state.rs`): a `Vec`-backed cursor with
//! `peek`/`next`/index save-restore, generalized here from the teacher's
//! combinator-parser framework to a hand-written descent because the
//! fixity table must be consulted (and mutated by `infix`/`infixr`/
//! `nonfix`) while parsing runs, which a context-free combinator grammar
//! cannot express.

use crate::ast::{
    Constant, Declaration, DatatypeDef, ExceptionBinding, FunctionClause, FunctionDef, MatchArm,
    PatExpr, Ty, ValBinding,
};
use crate::diagnostics::{ParserError, SimplifyFailure};
use crate::fixity::FixityTable;
use crate::simplify::reject_withtype;
use crate::token::{Associativity, Position, Token};

type Result<T> = std::result::Result<T, SimplifyFailure>;

fn parser_error(message: impl Into<String>, position: Position) -> SimplifyFailure {
    SimplifyFailure::Parser(ParserError {
        message: message.into(),
        position,
    })
}

/// Parses one chunk of source into a flat declaration list, threading a
/// fixity table through (and returning it, whether or not parsing
/// succeeded, so the caller decides whether to commit it).
pub fn parse(tokens: Vec<Token>, fixity: FixityTable) -> (Result<Vec<Declaration>>, FixityTable) {
    let mut parser = Parser::new(tokens, fixity);
    let result = parser.parse_program();
    (result, parser.into_fixity())
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    fixity: FixityTable,
}

impl Parser {
    fn new(tokens: Vec<Token>, fixity: FixityTable) -> Self {
        Self {
            tokens,
            index: 0,
            fixity,
        }
    }

    fn into_fixity(self) -> FixityTable {
        self.fixity
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.index).cloned();
        if tok.is_some() {
            self.index += 1;
        }
        tok
    }

    fn eof_position(&self) -> Position {
        self.tokens.last().map(|t| t.position() + 1).unwrap_or(0)
    }

    fn current_position(&self) -> Position {
        self.peek().map(|t| t.position()).unwrap_or_else(|| self.eof_position())
    }

    fn peek_keyword_is(&self, text: &str) -> bool {
        matches!(self.peek(), Some(Token::Keyword { text: t, .. }) if t == text)
    }

    fn peek_keyword(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Keyword { text, .. }) => Some(text.as_str()),
            _ => None,
        }
    }

    fn eat_keyword(&mut self, text: &str) -> Result<Position> {
        match self.peek().cloned() {
            Some(Token::Keyword { text: t, position }) if t == text => {
                self.bump();
                Ok(position)
            }
            Some(other) => Err(parser_error(
                format!("expected '{text}', found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error(
                format!("expected '{text}', found end of input"),
                self.eof_position(),
            )),
        }
    }

    fn eat_keyword_opt(&mut self, text: &str) -> bool {
        if self.peek_keyword_is(text) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_equals(&mut self) -> Result<Position> {
        match self.peek().cloned() {
            Some(Token::Equals { position }) => {
                self.bump();
                Ok(position)
            }
            Some(other) => Err(parser_error(
                format!("expected '=', found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error("expected '=', found end of input", self.eof_position())),
        }
    }

    fn eat_equals_opt(&mut self) -> bool {
        if matches!(self.peek(), Some(Token::Equals { .. })) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn peek_star(&self) -> bool {
        matches!(self.peek(), Some(Token::Star { .. }))
    }

    fn eat_star_opt(&mut self) -> bool {
        if self.peek_star() {
            self.bump();
            true
        } else {
            false
        }
    }

    fn try_parse<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Option<T> {
        let save = self.index;
        match f(self) {
            Ok(v) => Some(v),
            Err(_) => {
                self.index = save;
                None
            }
        }
    }

    fn current_operator_name(&self) -> Option<(String, bool, Position)> {
        match self.peek() {
            Some(Token::AlphanumericIdentifier { text, op_prefixed, position }) => {
                Some((text.clone(), *op_prefixed, *position))
            }
            Some(Token::SymbolicIdentifier { text, op_prefixed, position }) => {
                Some((text.clone(), *op_prefixed, *position))
            }
            Some(Token::Star { position }) => Some(("*".to_string(), false, *position)),
            Some(Token::Equals { position }) => Some(("=".to_string(), false, *position)),
            _ => None,
        }
    }

    fn next_is_infix_operator(&self) -> bool {
        match self.current_operator_name() {
            Some((name, op_prefixed, _)) => !op_prefixed && self.fixity.is_infix(&name),
            None => false,
        }
    }

    fn at_atomic_expr_start(&self) -> bool {
        match self.peek() {
            None => false,
            Some(Token::Keyword { text, .. }) => matches!(
                text.as_str(),
                "(" | "[" | "{" | "let" | "case" | "fn" | "if" | "while" | "raise" | "#"
            ),
            Some(Token::TypeVariable { .. }) | Some(Token::EqualityTypeVariable { .. }) => false,
            Some(_) => !self.next_is_infix_operator(),
        }
    }

    fn at_atomic_pat_start(&self) -> bool {
        match self.peek() {
            None => false,
            Some(Token::Keyword { text, .. }) => matches!(text.as_str(), "(" | "[" | "{"),
            Some(Token::TypeVariable { .. }) | Some(Token::EqualityTypeVariable { .. }) => false,
            Some(_) => !self.next_is_infix_operator(),
        }
    }

    fn try_peek_type_constructor_name(&self) -> Option<(Vec<String>, String, Position)> {
        match self.peek() {
            Some(Token::AlphanumericIdentifier { text, op_prefixed: false, position }) => {
                Some((vec![], text.clone(), *position))
            }
            Some(Token::LongIdentifier {
                qualifiers,
                final_text,
                final_is_symbolic: false,
                position,
            }) => Some((qualifiers.clone(), final_text.clone(), *position)),
            _ => None,
        }
    }

    fn try_parse_digit(&mut self) -> Option<u8> {
        if let Some(Token::Numeric { value, .. }) = self.peek() {
            if (0..=9).contains(value) {
                let v = *value as u8;
                self.bump();
                return Some(v);
            }
        }
        None
    }

    fn expect_alnum_name(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::AlphanumericIdentifier { text, .. }) => Ok(text),
            Some(other) => Err(parser_error(
                format!("expected a name, found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error("expected a name, found end of input", self.eof_position())),
        }
    }

    fn expect_constructor_name(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::AlphanumericIdentifier { text, .. }) => Ok(text),
            Some(Token::SymbolicIdentifier { text, .. }) => Ok(text),
            Some(other) => Err(parser_error(
                format!("expected a constructor name, found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error(
                "expected a constructor name, found end of input",
                self.eof_position(),
            )),
        }
    }

    fn expect_function_name(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::AlphanumericIdentifier { text, .. }) => Ok(text),
            Some(Token::SymbolicIdentifier { text, .. }) => Ok(text),
            Some(Token::Star { .. }) => Ok("*".to_string()),
            Some(other) => Err(parser_error(
                format!("expected a function name, found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error(
                "expected a function name, found end of input",
                self.eof_position(),
            )),
        }
    }

    fn expect_operator_name(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::AlphanumericIdentifier { text, .. }) => Ok(text),
            Some(Token::SymbolicIdentifier { text, .. }) => Ok(text),
            Some(Token::Star { .. }) => Ok("*".to_string()),
            Some(Token::Equals { .. }) => Ok("=".to_string()),
            Some(other) => Err(parser_error(
                format!("expected an identifier, found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error(
                "expected an identifier, found end of input",
                self.eof_position(),
            )),
        }
    }

    fn parse_long_value_name(&mut self) -> Result<(Vec<String>, String)> {
        match self.bump() {
            Some(Token::AlphanumericIdentifier { text, .. }) => Ok((vec![], text)),
            Some(Token::SymbolicIdentifier { text, .. }) => Ok((vec![], text)),
            Some(Token::LongIdentifier { qualifiers, final_text, .. }) => Ok((qualifiers, final_text)),
            Some(other) => Err(parser_error(
                format!("expected an identifier, found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error(
                "expected an identifier, found end of input",
                self.eof_position(),
            )),
        }
    }

    fn parse_long_structure_name(&mut self) -> Result<Vec<String>> {
        match self.bump() {
            Some(Token::AlphanumericIdentifier { text, .. }) => Ok(vec![text]),
            Some(Token::LongIdentifier { qualifiers, final_text, .. }) => {
                let mut full = qualifiers;
                full.push(final_text);
                Ok(full)
            }
            Some(other) => Err(parser_error(
                format!("expected a structure name, found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error(
                "expected a structure name, found end of input",
                self.eof_position(),
            )),
        }
    }

    fn parse_label(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::Numeric { value, position, .. }) => {
                if value <= 0 {
                    return Err(parser_error(
                        "a record or tuple label must be a positive integer",
                        position,
                    ));
                }
                Ok(value.to_string())
            }
            Some(Token::AlphanumericIdentifier { text, .. }) => Ok(text),
            Some(Token::SymbolicIdentifier { text, .. }) => Ok(text),
            Some(Token::Star { .. }) => Ok("*".to_string()),
            Some(other) => Err(parser_error(
                format!("expected a record label, found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error("expected a record label", self.eof_position())),
        }
    }

    // ---- declarations ----

    fn parse_program(&mut self) -> Result<Vec<Declaration>> {
        self.parse_decl_list_until(&[])
    }

    fn parse_decl_list_until(&mut self, terminators: &[&str]) -> Result<Vec<Declaration>> {
        let mut decls = vec![];
        loop {
            if self.peek().is_none() {
                break;
            }
            if let Some(text) = self.peek_keyword() {
                if terminators.contains(&text) {
                    break;
                }
            }
            if self.eat_keyword_opt(";") {
                continue;
            }
            decls.push(self.parse_declaration()?);
        }
        Ok(decls)
    }

    fn parse_declaration(&mut self) -> Result<Declaration> {
        match self.peek_keyword() {
            Some("val") => self.parse_val(),
            Some("fun") => self.parse_fun(),
            Some("type") => self.parse_type_decl(),
            Some("datatype") => self.parse_datatype_decl(),
            Some("abstype") => self.parse_abstype(),
            Some("exception") => self.parse_exception(),
            Some("open") => self.parse_open(),
            Some("local") => self.parse_local(),
            Some("infix") => self.parse_infix_decl(false),
            Some("infixr") => self.parse_infix_decl(true),
            Some("nonfix") => self.parse_nonfix_decl(),
            _ => {
                let position = self.current_position();
                let expr = self.parse_expr()?;
                Ok(Declaration::Expression { expr, position })
            }
        }
    }

    fn parse_val(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("val")?;
        let recursive = self.eat_keyword_opt("rec");
        let mut bindings = vec![self.parse_val_binding()?];
        while self.eat_keyword_opt("and") {
            bindings.push(self.parse_val_binding()?);
        }
        Ok(Declaration::Val { recursive, bindings, position })
    }

    fn parse_val_binding(&mut self) -> Result<ValBinding> {
        let pattern = self.parse_pat()?;
        self.expect_equals()?;
        let value = self.parse_expr()?;
        Ok(ValBinding { pattern, value })
    }

    fn parse_fun(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("fun")?;
        let mut functions = vec![self.parse_function_def()?];
        while self.eat_keyword_opt("and") {
            functions.push(self.parse_function_def()?);
        }
        Ok(Declaration::Fun { functions, position })
    }

    fn parse_function_def(&mut self) -> Result<FunctionDef> {
        let position = self.current_position();
        let (name, first) = self.parse_function_clause()?;
        let mut clauses = vec![first];
        while self.eat_keyword_opt("|") {
            let (clause_name, clause) = self.parse_function_clause()?;
            if clause_name != name {
                return Err(parser_error(
                    format!(
                        "all clauses of a function must share one name ('{name}' vs '{clause_name}')"
                    ),
                    position,
                ));
            }
            clauses.push(clause);
        }
        Ok(FunctionDef { name, clauses, position })
    }

    /// Only the common prefix form `name atpat+ [: ty] = exp` is supported;
    /// infix-notation function clauses (`fun x ++ y = ...`) are not.
    fn parse_function_clause(&mut self) -> Result<(String, FunctionClause)> {
        let name = self.expect_function_name()?;
        let mut arguments = vec![self.parse_atomic_pat()?];
        while self.at_atomic_pat_start() {
            arguments.push(self.parse_atomic_pat()?);
        }
        let result_type = if self.eat_keyword_opt(":") {
            Some(self.parse_ty()?)
        } else {
            None
        };
        self.expect_equals()?;
        let body = self.parse_expr()?;
        Ok((name, FunctionClause { arguments, result_type, body }))
    }

    fn parse_type_decl(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("type")?;
        let mut defs = vec![self.parse_type_binding()?];
        while self.eat_keyword_opt("and") {
            defs.push(self.parse_type_binding()?);
        }
        if defs.len() == 1 {
            let (name, parameters, definition) = defs.into_iter().next().unwrap();
            Ok(Declaration::Type { name, parameters, definition, position })
        } else {
            let declarations = defs
                .into_iter()
                .map(|(name, parameters, definition)| Declaration::Type {
                    name,
                    parameters,
                    definition,
                    position,
                })
                .collect();
            Ok(Declaration::Sequence { declarations, position })
        }
    }

    fn parse_type_binding(&mut self) -> Result<(String, Vec<String>, Ty)> {
        let parameters = self.parse_optional_tyvarseq()?;
        let name = self.expect_alnum_name()?;
        self.expect_equals()?;
        let definition = self.parse_ty()?;
        Ok((name, parameters, definition))
    }

    fn parse_datatype_decl(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("datatype")?;
        let mut datatypes = vec![self.parse_datatype_def()?];
        while self.eat_keyword_opt("and") {
            datatypes.push(self.parse_datatype_def()?);
        }
        if self.peek_keyword_is("withtype") {
            return Err(reject_withtype(self.current_position()));
        }
        Ok(Declaration::Datatype { datatypes, position })
    }

    fn parse_datatype_def(&mut self) -> Result<DatatypeDef> {
        let position = self.current_position();
        let parameters = self.parse_optional_tyvarseq()?;
        let name = self.expect_alnum_name()?;
        self.expect_equals()?;
        let mut constructors = vec![self.parse_constructor_def()?];
        while self.eat_keyword_opt("|") {
            constructors.push(self.parse_constructor_def()?);
        }
        Ok(DatatypeDef { name, parameters, constructors, position })
    }

    fn parse_constructor_def(&mut self) -> Result<(String, Option<Ty>)> {
        let name = self.expect_constructor_name()?;
        if self.eat_keyword_opt("of") {
            Ok((name, Some(self.parse_ty()?)))
        } else {
            Ok((name, None))
        }
    }

    fn parse_abstype(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("abstype")?;
        let mut datatypes = vec![self.parse_datatype_def()?];
        while self.eat_keyword_opt("and") {
            datatypes.push(self.parse_datatype_def()?);
        }
        if self.peek_keyword_is("withtype") {
            return Err(reject_withtype(self.current_position()));
        }
        self.eat_keyword("with")?;
        let body = self.parse_decl_list_until(&["end"])?;
        self.eat_keyword("end")?;
        Ok(Declaration::Abstype { datatypes, body, position })
    }

    fn parse_exception(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("exception")?;
        let mut bindings = vec![self.parse_exception_binding()?];
        while self.eat_keyword_opt("and") {
            bindings.push(self.parse_exception_binding()?);
        }
        Ok(Declaration::Exception { bindings, position })
    }

    fn parse_exception_binding(&mut self) -> Result<ExceptionBinding> {
        let name = self.expect_constructor_name()?;
        if self.eat_keyword_opt("of") {
            Ok(ExceptionBinding::New { name, argument: Some(self.parse_ty()?) })
        } else if self.eat_equals_opt() {
            let (source_qualifiers, source_name) = self.parse_long_value_name()?;
            Ok(ExceptionBinding::Alias { name, source_qualifiers, source_name })
        } else {
            Ok(ExceptionBinding::New { name, argument: None })
        }
    }

    fn parse_open(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("open")?;
        let mut structures = vec![self.parse_long_structure_name()?];
        while let Some(s) = self.try_parse(|p| p.parse_long_structure_name()) {
            structures.push(s);
        }
        Ok(Declaration::Open { structures, position })
    }

    fn parse_local(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("local")?;
        let local = self.parse_decl_list_until(&["in"])?;
        self.eat_keyword("in")?;
        let body = self.parse_decl_list_until(&["end"])?;
        self.eat_keyword("end")?;
        Ok(Declaration::Local { local, body, position })
    }

    fn parse_infix_decl(&mut self, is_right: bool) -> Result<Declaration> {
        let position = self.eat_keyword(if is_right { "infixr" } else { "infix" })?;
        let precedence = self.try_parse_digit().unwrap_or(0);
        let mut identifiers = vec![self.expect_operator_name()?];
        while let Some(name) = self.try_parse(|p| p.expect_operator_name()) {
            identifiers.push(name);
        }
        let associativity = if is_right { Associativity::Right } else { Associativity::Left };
        for id in &identifiers {
            self.fixity.set_infix(id, precedence, associativity);
        }
        if is_right {
            Ok(Declaration::Infixr { precedence, identifiers, position })
        } else {
            Ok(Declaration::Infix { precedence, identifiers, position })
        }
    }

    fn parse_nonfix_decl(&mut self) -> Result<Declaration> {
        let position = self.eat_keyword("nonfix")?;
        let mut identifiers = vec![self.expect_operator_name()?];
        while let Some(name) = self.try_parse(|p| p.expect_operator_name()) {
            identifiers.push(name);
        }
        for id in &identifiers {
            self.fixity.set_nonfix(id);
        }
        Ok(Declaration::Nonfix { identifiers, position })
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<PatExpr> {
        self.parse_handle_exp()
    }

    fn parse_handle_exp(&mut self) -> Result<PatExpr> {
        let mut e = self.parse_typed_exp()?;
        while self.peek_keyword_is("handle") {
            let position = self.eat_keyword("handle")?;
            let arms = self.parse_match()?;
            e = PatExpr::Handle { expr: Box::new(e), arms, position };
        }
        Ok(e)
    }

    fn parse_typed_exp(&mut self) -> Result<PatExpr> {
        let e = self.parse_orelse_exp()?;
        if self.peek_keyword_is(":") {
            let position = self.eat_keyword(":")?;
            let ty = self.parse_ty()?;
            return Ok(PatExpr::Typed { inner: Box::new(e), ty, position });
        }
        Ok(e)
    }

    fn parse_orelse_exp(&mut self) -> Result<PatExpr> {
        let mut left = self.parse_andalso_exp()?;
        while self.peek_keyword_is("orelse") {
            let position = self.eat_keyword("orelse")?;
            let right = self.parse_andalso_exp()?;
            left = PatExpr::OrElse { left: Box::new(left), right: Box::new(right), position };
        }
        Ok(left)
    }

    fn parse_andalso_exp(&mut self) -> Result<PatExpr> {
        let mut left = self.parse_infix_exp()?;
        while self.peek_keyword_is("andalso") {
            let position = self.eat_keyword("andalso")?;
            let right = self.parse_infix_exp()?;
            left = PatExpr::AndAlso { left: Box::new(left), right: Box::new(right), position };
        }
        Ok(left)
    }

    /// Shunting-yard precedence climbing over the live fixity table; two
    /// operators of equal precedence but differing associativity adjacent
    /// in the same chain are a `ParserError` (spec §4.2).
    fn parse_infix_exp(&mut self) -> Result<PatExpr> {
        let mut values = vec![self.parse_app_exp()?];
        let mut ops: Vec<(String, crate::token::Fixity, Position)> = vec![];
        loop {
            let Some((name, op_prefixed, position)) = self.current_operator_name() else { break };
            if op_prefixed {
                break;
            }
            let Some(fixity) = self.fixity.get(&name) else { break };
            reduce_while(&mut values, &mut ops, fixity)?;
            self.bump();
            ops.push((name, fixity, position));
            values.push(self.parse_app_exp()?);
        }
        while let Some((op_name, _, op_pos)) = ops.pop() {
            let right = values.pop().expect("shunting-yard invariant");
            let left = values.pop().expect("shunting-yard invariant");
            values.push(combine_infix(op_name, left, right, op_pos));
        }
        Ok(values.pop().expect("at least one value pushed"))
    }

    fn parse_app_exp(&mut self) -> Result<PatExpr> {
        let mut expr = self.parse_atomic_expr()?;
        while self.at_atomic_expr_start() {
            let arg = self.parse_atomic_expr()?;
            let position = expr.position();
            expr = PatExpr::Application { function: Box::new(expr), argument: Box::new(arg), position };
        }
        Ok(expr)
    }

    fn parse_atomic_expr(&mut self) -> Result<PatExpr> {
        let position = self.current_position();
        match self.peek().cloned() {
            Some(Token::Numeric { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Int(value), position })
            }
            Some(Token::IntegerConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Int(value), position })
            }
            Some(Token::RealConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Real(value), position })
            }
            Some(Token::WordConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Word(value), position })
            }
            Some(Token::CharacterConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Char(value), position })
            }
            Some(Token::StringConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::String(value), position })
            }
            Some(Token::AlphanumericIdentifier { .. })
            | Some(Token::SymbolicIdentifier { .. })
            | Some(Token::LongIdentifier { .. })
            | Some(Token::Star { .. })
            | Some(Token::Equals { .. }) => self.parse_identifier_expr(),
            Some(Token::Keyword { text, .. }) => match text.as_str() {
                "(" => self.parse_paren_expr(),
                "[" => self.parse_list_expr(),
                "{" => self.parse_record_expr(),
                "let" => self.parse_let_expr(),
                "case" => self.parse_case_expr(),
                "fn" => self.parse_fn_expr(),
                "if" => self.parse_if_expr(),
                "while" => self.parse_while_expr(),
                "raise" => self.parse_raise_expr(),
                "#" => self.parse_selector_expr(),
                other => Err(parser_error(format!("unexpected token '{other}'"), position)),
            },
            Some(other) => Err(parser_error(format!("unexpected token '{}'", other.text()), position)),
            None => Err(parser_error("unexpected end of input", position)),
        }
    }

    fn parse_identifier_expr(&mut self) -> Result<PatExpr> {
        let position = self.current_position();
        let tok = self.bump().expect("checked by caller");
        let (qualifiers, name, op_prefixed) = ident_parts(&tok)?;
        Ok(PatExpr::Identifier { qualifiers, name, op_prefixed, position })
    }

    fn parse_paren_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("(")?;
        if self.eat_keyword_opt(")") {
            return Ok(PatExpr::Tuple { elements: vec![], position });
        }
        let first = self.parse_expr()?;
        if self.peek_keyword_is(",") {
            let mut elements = vec![first];
            while self.eat_keyword_opt(",") {
                elements.push(self.parse_expr()?);
            }
            self.eat_keyword(")")?;
            return Ok(PatExpr::Tuple { elements, position });
        }
        if self.peek_keyword_is(";") {
            let mut elements = vec![first];
            while self.eat_keyword_opt(";") {
                elements.push(self.parse_expr()?);
            }
            self.eat_keyword(")")?;
            return Ok(PatExpr::Sequence { elements, position });
        }
        self.eat_keyword(")")?;
        Ok(first)
    }

    fn parse_list_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("[")?;
        let mut elements = vec![];
        if !self.peek_keyword_is("]") {
            elements.push(self.parse_expr()?);
            while self.eat_keyword_opt(",") {
                elements.push(self.parse_expr()?);
            }
        }
        self.eat_keyword("]")?;
        Ok(PatExpr::List { elements, position })
    }

    fn parse_record_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("{")?;
        let mut fields = vec![];
        if !self.peek_keyword_is("}") {
            fields.push(self.parse_record_field_expr()?);
            while self.eat_keyword_opt(",") {
                fields.push(self.parse_record_field_expr()?);
            }
        }
        self.eat_keyword("}")?;
        Ok(PatExpr::Record { fields, complete: true, position })
    }

    fn parse_record_field_expr(&mut self) -> Result<(String, PatExpr)> {
        let label = self.parse_label()?;
        self.expect_equals()?;
        let value = self.parse_expr()?;
        Ok((label, value))
    }

    fn parse_let_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("let")?;
        let declarations = self.parse_decl_list_until(&["in"])?;
        self.eat_keyword("in")?;
        let mut elements = vec![self.parse_expr()?];
        while self.eat_keyword_opt(";") {
            elements.push(self.parse_expr()?);
        }
        self.eat_keyword("end")?;
        let body = if elements.len() == 1 {
            elements.into_iter().next().unwrap()
        } else {
            let seq_position = elements[0].position();
            PatExpr::Sequence { elements, position: seq_position }
        };
        Ok(PatExpr::Let { declarations, body: Box::new(body), position })
    }

    fn parse_case_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("case")?;
        let scrutinee = Box::new(self.parse_expr()?);
        self.eat_keyword("of")?;
        let arms = self.parse_match()?;
        Ok(PatExpr::Case { scrutinee, arms, position })
    }

    fn parse_fn_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("fn")?;
        let arms = self.parse_match()?;
        Ok(PatExpr::Fn { arms, position })
    }

    fn parse_match(&mut self) -> Result<Vec<MatchArm>> {
        let mut arms = vec![self.parse_match_arm()?];
        while self.eat_keyword_opt("|") {
            arms.push(self.parse_match_arm()?);
        }
        Ok(arms)
    }

    fn parse_match_arm(&mut self) -> Result<MatchArm> {
        let pattern = self.parse_pat()?;
        self.eat_keyword("=>")?;
        let body = self.parse_expr()?;
        Ok(MatchArm { pattern, body })
    }

    fn parse_if_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("if")?;
        let condition = Box::new(self.parse_expr()?);
        self.eat_keyword("then")?;
        let then_branch = Box::new(self.parse_expr()?);
        self.eat_keyword("else")?;
        let else_branch = Box::new(self.parse_expr()?);
        Ok(PatExpr::If { condition, then_branch, else_branch, position })
    }

    fn parse_while_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("while")?;
        let condition = Box::new(self.parse_expr()?);
        self.eat_keyword("do")?;
        let body = Box::new(self.parse_expr()?);
        Ok(PatExpr::While { condition, body, position })
    }

    /// `raise`'s operand stops short of `handle` so `raise E handle m`
    /// parses as `(raise E) handle m`, not `raise (E handle m)`.
    fn parse_raise_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("raise")?;
        let expr = Box::new(self.parse_typed_exp()?);
        Ok(PatExpr::Raise { expr, position })
    }

    /// `#label` desugars to `fn {label = x, ...} => x` (spec §9's
    /// "dynamic dispatch" note extended to record projection sugar).
    fn parse_selector_expr(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("#")?;
        let label = self.parse_label()?;
        let var = format!("__sel_{position}");
        Ok(PatExpr::Fn {
            arms: vec![MatchArm {
                pattern: PatExpr::Record {
                    fields: vec![(label, PatExpr::unqualified_identifier(&var, position))],
                    complete: false,
                    position,
                },
                body: PatExpr::unqualified_identifier(&var, position),
            }],
            position,
        })
    }

    // ---- patterns ----

    fn parse_pat(&mut self) -> Result<PatExpr> {
        let base = self.parse_typed_pat()?;
        if self.peek_keyword_is("as") {
            let position = self.eat_keyword("as")?;
            let (name, ty) = extract_layer_name(&base)?;
            let inner = Box::new(self.parse_pat()?);
            return Ok(PatExpr::Layered { name, ty, pattern: inner, position });
        }
        Ok(base)
    }

    fn parse_typed_pat(&mut self) -> Result<PatExpr> {
        let e = self.parse_infix_pat()?;
        if self.peek_keyword_is(":") {
            let position = self.eat_keyword(":")?;
            let ty = self.parse_ty()?;
            return Ok(PatExpr::Typed { inner: Box::new(e), ty, position });
        }
        Ok(e)
    }

    fn parse_infix_pat(&mut self) -> Result<PatExpr> {
        let mut values = vec![self.parse_app_pat()?];
        let mut ops: Vec<(String, crate::token::Fixity, Position)> = vec![];
        loop {
            let Some((name, op_prefixed, position)) = self.current_operator_name() else { break };
            if op_prefixed {
                break;
            }
            let Some(fixity) = self.fixity.get(&name) else { break };
            reduce_while(&mut values, &mut ops, fixity)?;
            self.bump();
            ops.push((name, fixity, position));
            values.push(self.parse_app_pat()?);
        }
        while let Some((op_name, _, op_pos)) = ops.pop() {
            let right = values.pop().expect("shunting-yard invariant");
            let left = values.pop().expect("shunting-yard invariant");
            values.push(combine_infix(op_name, left, right, op_pos));
        }
        Ok(values.pop().expect("at least one value pushed"))
    }

    fn parse_app_pat(&mut self) -> Result<PatExpr> {
        let first = self.parse_atomic_pat()?;
        if matches!(first, PatExpr::Identifier { .. }) && self.at_atomic_pat_start() {
            let position = first.position();
            let argument = Box::new(self.parse_atomic_pat()?);
            return Ok(PatExpr::Application { function: Box::new(first), argument, position });
        }
        Ok(first)
    }

    fn parse_atomic_pat(&mut self) -> Result<PatExpr> {
        let position = self.current_position();
        match self.peek().cloned() {
            Some(Token::AlphanumericIdentifier { ref text, op_prefixed: false, .. })
                if text == "_" =>
            {
                self.bump();
                Ok(PatExpr::Wildcard { position })
            }
            Some(Token::Numeric { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Int(value), position })
            }
            Some(Token::IntegerConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Int(value), position })
            }
            Some(Token::RealConstant { .. }) => {
                Err(parser_error("real constants may not appear in patterns", position))
            }
            Some(Token::WordConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Word(value), position })
            }
            Some(Token::CharacterConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::Char(value), position })
            }
            Some(Token::StringConstant { value, .. }) => {
                self.bump();
                Ok(PatExpr::Constant { value: Constant::String(value), position })
            }
            Some(Token::AlphanumericIdentifier { .. })
            | Some(Token::SymbolicIdentifier { .. })
            | Some(Token::LongIdentifier { .. })
            | Some(Token::Star { .. }) => self.parse_identifier_expr(),
            Some(Token::Keyword { text, .. }) => match text.as_str() {
                "(" => self.parse_paren_pat(),
                "[" => self.parse_list_pat(),
                "{" => self.parse_record_pat(),
                other => Err(parser_error(format!("unexpected token '{other}' in pattern"), position)),
            },
            Some(other) => {
                Err(parser_error(format!("unexpected token '{}' in pattern", other.text()), position))
            }
            None => Err(parser_error("unexpected end of input in pattern", position)),
        }
    }

    fn parse_paren_pat(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("(")?;
        if self.eat_keyword_opt(")") {
            return Ok(PatExpr::Tuple { elements: vec![], position });
        }
        let first = self.parse_pat()?;
        if self.peek_keyword_is(",") {
            let mut elements = vec![first];
            while self.eat_keyword_opt(",") {
                elements.push(self.parse_pat()?);
            }
            self.eat_keyword(")")?;
            return Ok(PatExpr::Tuple { elements, position });
        }
        self.eat_keyword(")")?;
        Ok(first)
    }

    fn parse_list_pat(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("[")?;
        let mut elements = vec![];
        if !self.peek_keyword_is("]") {
            elements.push(self.parse_pat()?);
            while self.eat_keyword_opt(",") {
                elements.push(self.parse_pat()?);
            }
        }
        self.eat_keyword("]")?;
        Ok(PatExpr::List { elements, position })
    }

    fn parse_record_pat(&mut self) -> Result<PatExpr> {
        let position = self.eat_keyword("{")?;
        let mut fields = vec![];
        let mut complete = true;
        if !self.peek_keyword_is("}") {
            loop {
                if self.eat_keyword_opt("...") {
                    complete = false;
                    break;
                }
                fields.push(self.parse_record_field_pat()?);
                if self.eat_keyword_opt(",") {
                    continue;
                }
                break;
            }
        }
        self.eat_keyword("}")?;
        Ok(PatExpr::Record { fields, complete, position })
    }

    fn parse_record_field_pat(&mut self) -> Result<(String, PatExpr)> {
        let position = self.current_position();
        let label = self.parse_label()?;
        if self.eat_equals_opt() {
            let pat = self.parse_pat()?;
            Ok((label, pat))
        } else {
            Ok((label.clone(), PatExpr::unqualified_identifier(&label, position)))
        }
    }

    // ---- types ----

    fn parse_ty(&mut self) -> Result<Ty> {
        self.parse_arrow_ty()
    }

    fn parse_arrow_ty(&mut self) -> Result<Ty> {
        let left = self.parse_tuple_ty()?;
        if self.peek_keyword_is("->") {
            let position = self.eat_keyword("->")?;
            let right = self.parse_arrow_ty()?;
            return Ok(Ty::Function { domain: Box::new(left), codomain: Box::new(right), position });
        }
        Ok(left)
    }

    fn parse_tuple_ty(&mut self) -> Result<Ty> {
        let first = self.parse_app_ty()?;
        if self.peek_star() {
            let position = first.position();
            let mut elements = vec![first];
            while self.eat_star_opt() {
                elements.push(self.parse_app_ty()?);
            }
            return Ok(Ty::Tuple { elements, position });
        }
        Ok(first)
    }

    fn parse_app_ty(&mut self) -> Result<Ty> {
        let mut ty = self.parse_atomic_ty()?;
        while let Some((qualifiers, name, position)) = self.try_peek_type_constructor_name() {
            self.bump();
            ty = Ty::Constructor { qualifiers, name, arguments: vec![ty], position };
        }
        Ok(ty)
    }

    fn parse_atomic_ty(&mut self) -> Result<Ty> {
        let position = self.current_position();
        match self.peek().cloned() {
            Some(Token::TypeVariable { text, .. }) => {
                self.bump();
                Ok(Ty::Var { name: text, position })
            }
            Some(Token::EqualityTypeVariable { text, .. }) => {
                self.bump();
                Ok(Ty::EqualityVar { name: text, position })
            }
            Some(Token::AlphanumericIdentifier { text, .. }) => {
                self.bump();
                Ok(Ty::Constructor { qualifiers: vec![], name: text, arguments: vec![], position })
            }
            Some(Token::LongIdentifier { qualifiers, final_text, .. }) => {
                self.bump();
                Ok(Ty::Constructor { qualifiers, name: final_text, arguments: vec![], position })
            }
            Some(Token::Keyword { ref text, .. }) if text == "(" => self.parse_paren_ty(),
            Some(Token::Keyword { ref text, .. }) if text == "{" => self.parse_record_ty(),
            Some(other) => {
                Err(parser_error(format!("unexpected token '{}' in type", other.text()), position))
            }
            None => Err(parser_error("unexpected end of input in type", position)),
        }
    }

    fn parse_paren_ty(&mut self) -> Result<Ty> {
        let position = self.eat_keyword("(")?;
        let first = self.parse_ty()?;
        if self.peek_keyword_is(",") {
            let mut elements = vec![first];
            while self.eat_keyword_opt(",") {
                elements.push(self.parse_ty()?);
            }
            self.eat_keyword(")")?;
            return match self.try_peek_type_constructor_name() {
                Some((qualifiers, name, _)) => {
                    self.bump();
                    Ok(Ty::Constructor { qualifiers, name, arguments: elements, position })
                }
                None => Err(parser_error(
                    "a parenthesized type-argument list must be followed by a type constructor",
                    position,
                )),
            };
        }
        self.eat_keyword(")")?;
        Ok(first)
    }

    fn parse_record_ty(&mut self) -> Result<Ty> {
        let position = self.eat_keyword("{")?;
        let mut fields = vec![];
        if !self.peek_keyword_is("}") {
            fields.push(self.parse_record_field_ty()?);
            while self.eat_keyword_opt(",") {
                fields.push(self.parse_record_field_ty()?);
            }
        }
        self.eat_keyword("}")?;
        Ok(Ty::Record { fields, complete: true, position })
    }

    fn parse_record_field_ty(&mut self) -> Result<(String, Ty)> {
        let label = self.parse_label()?;
        self.eat_keyword(":")?;
        let ty = self.parse_ty()?;
        Ok((label, ty))
    }

    fn parse_optional_tyvarseq(&mut self) -> Result<Vec<String>> {
        match self.peek().cloned() {
            Some(Token::TypeVariable { text, .. }) => {
                self.bump();
                Ok(vec![text])
            }
            Some(Token::EqualityTypeVariable { text, .. }) => {
                self.bump();
                Ok(vec![text])
            }
            Some(Token::Keyword { ref text, .. }) if text == "(" => {
                self.bump();
                let mut vars = vec![self.expect_tyvar()?];
                while self.eat_keyword_opt(",") {
                    vars.push(self.expect_tyvar()?);
                }
                self.eat_keyword(")")?;
                Ok(vars)
            }
            _ => Ok(vec![]),
        }
    }

    fn expect_tyvar(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::TypeVariable { text, .. }) | Some(Token::EqualityTypeVariable { text, .. }) => {
                Ok(text)
            }
            Some(other) => Err(parser_error(
                format!("expected a type variable, found '{}'", other.text()),
                other.position(),
            )),
            None => Err(parser_error("expected a type variable", self.eof_position())),
        }
    }
}

fn ident_parts(tok: &Token) -> Result<(Vec<String>, String, bool)> {
    match tok {
        Token::AlphanumericIdentifier { text, op_prefixed, .. } => {
            Ok((vec![], text.clone(), *op_prefixed))
        }
        Token::SymbolicIdentifier { text, op_prefixed, .. } => Ok((vec![], text.clone(), *op_prefixed)),
        Token::Star { .. } => Ok((vec![], "*".to_string(), false)),
        Token::Equals { .. } => Ok((vec![], "=".to_string(), false)),
        Token::LongIdentifier { qualifiers, final_text, .. } => {
            Ok((qualifiers.clone(), final_text.clone(), false))
        }
        other => Err(parser_error(
            format!("expected an identifier, found '{}'", other.text()),
            other.position(),
        )),
    }
}

fn extract_layer_name(pat: &PatExpr) -> Result<(String, Option<Ty>)> {
    match pat {
        PatExpr::Identifier { qualifiers, name, .. } if qualifiers.is_empty() => {
            Ok((name.clone(), None))
        }
        PatExpr::Typed { inner, ty, .. } => match inner.as_ref() {
            PatExpr::Identifier { qualifiers, name, .. } if qualifiers.is_empty() => {
                Ok((name.clone(), Some(ty.clone())))
            }
            other => Err(parser_error("'as' must be preceded by a variable", other.position())),
        },
        other => Err(parser_error("'as' must be preceded by a variable", other.position())),
    }
}

fn combine_infix(op_name: String, left: PatExpr, right: PatExpr, position: Position) -> PatExpr {
    PatExpr::Application {
        function: Box::new(PatExpr::unqualified_identifier(&op_name, position)),
        argument: Box::new(PatExpr::Tuple { elements: vec![left, right], position }),
        position,
    }
}

/// Pops and reduces operators off `ops` while they bind at least as
/// tightly as `incoming`; errors on an equal-precedence associativity
/// clash instead of guessing a grouping.
fn reduce_while(
    values: &mut Vec<PatExpr>,
    ops: &mut Vec<(String, crate::token::Fixity, Position)>,
    incoming: crate::token::Fixity,
) -> Result<()> {
    while let Some((top_name, top_fixity, top_pos)) = ops.last().copied() {
        if top_fixity.precedence == incoming.precedence
            && top_fixity.associativity != incoming.associativity
        {
            return Err(parser_error(
                format!(
                    "'{top_name}' and the following operator have the same precedence but different associativity"
                ),
                top_pos,
            ));
        }
        let should_reduce = top_fixity.precedence > incoming.precedence
            || (top_fixity.precedence == incoming.precedence
                && top_fixity.associativity == Associativity::Left);
        if !should_reduce {
            break;
        }
        ops.pop();
        let right = values.pop().expect("shunting-yard invariant");
        let left = values.pop().expect("shunting-yard invariant");
        values.push(combine_infix(top_name, left, right, top_pos));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Lexer, LexerOptions};

    fn parse_ok(src: &str) -> Vec<Declaration> {
        let tokens = Lexer::lex(src, LexerOptions::default()).expect("lex should succeed");
        let (result, _) = parse(tokens, FixityTable::with_builtins());
        result.expect("parse should succeed")
    }

    #[test]
    fn test_parse_simple_val() {
        let decls = parse_ok("val x = 4 * 7 + 3;");
        assert_eq!(decls.len(), 1);
        assert!(matches!(decls[0], Declaration::Val { .. }));
    }

    #[test]
    fn test_infix_precedence_groups_correctly() {
        let decls = parse_ok("val x = 1 + 2 * 3;");
        let Declaration::Val { bindings, .. } = &decls[0] else { panic!("expected val") };
        let PatExpr::Application { argument, .. } = &bindings[0].value else { panic!("expected app") };
        let PatExpr::Tuple { elements, .. } = argument.as_ref() else { panic!("expected tuple") };
        assert!(matches!(elements[0], PatExpr::Constant { value: Constant::Int(1), .. }));
    }

    #[test]
    fn test_fun_with_multiple_clauses() {
        let decls = parse_ok("fun fac 0 = 1 | fac n = n * fac (n - 1);");
        let Declaration::Fun { functions, .. } = &decls[0] else { panic!("expected fun") };
        assert_eq!(functions[0].clauses.len(), 2);
    }

    #[test]
    fn test_tuple_pattern_and_swap() {
        let decls = parse_ok("fun swap (a, b) = (b, a);");
        let Declaration::Fun { functions, .. } = &decls[0] else { panic!("expected fun") };
        assert_eq!(functions[0].clauses[0].arguments.len(), 1);
    }

    #[test]
    fn test_colliding_associativity_is_an_error() {
        let tokens = Lexer::lex("val x = a %% b @@ c;", LexerOptions::default()).unwrap();
        let mut fixity = FixityTable::with_builtins();
        fixity.set_infix("%%", 5, Associativity::Left);
        fixity.set_infix("@@", 5, Associativity::Right);
        let (result, _) = parse(tokens, fixity);
        assert!(result.is_err());
    }

    #[test]
    fn test_withtype_is_rejected() {
        let tokens =
            Lexer::lex("datatype t = A withtype s = int;", LexerOptions::default()).unwrap();
        let (result, _) = parse(tokens, FixityTable::with_builtins());
        assert!(matches!(result, Err(SimplifyFailure::FeatureDisabled(_))));
    }

    #[test]
    fn test_exception_with_handle() {
        let decls = parse_ok("val r = (raise Bad 3) handle Bad n => n;");
        assert!(matches!(decls[0], Declaration::Val { .. }));
    }
}
