// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::lexer::*;

use anyhow::Result;

const TYPE_SYSTEM_KEYWORDS: [&str; 8] = [
    "schema",
    "scalar",
    "type",
    "interface",
    "union",
    "enum",
    "input",
    "directive",
];

pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
        })
    }

    fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::String => "",
            _ => self.tok.1.text(),
        }
    }

    fn next_token(&mut self) -> Result<()> {
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.token_text() == text {
            self.next_token()
        } else {
            let msg = format!("expecting `{text}` {context}");
            Err(self.source.error(self.tok.1.line, self.tok.1.col, &msg))
        }
    }

    fn parse_name(&mut self, context: &str) -> Result<Name> {
        if self.tok.0 != TokenKind::Name {
            let msg = format!("expecting name {context}");
            return Err(self.source.error(self.tok.1.line, self.tok.1.col, &msg));
        }
        let name = Name {
            span: self.tok.1.clone(),
        };
        self.next_token()?;
        Ok(name)
    }

    /// Parses an executable document: operations and fragment definitions.
    /// Type-system definitions are recognized and skipped over so the
    /// executor can report them with a precise location; their bodies are
    /// not modeled.
    pub fn parse(&mut self) -> Result<Document> {
        let mut definitions = vec![];
        loop {
            match (&self.tok.0, self.token_text()) {
                (TokenKind::Eof, _) => break,
                (TokenKind::Punct, "{") => {
                    // Query shorthand.
                    let span = self.tok.1.clone();
                    let selection_set = self.parse_selection_set()?;
                    definitions.push(Definition::Operation(Ref::new(OperationDefinition {
                        span,
                        kind: OperationKind::Query,
                        name: None,
                        variable_definitions: vec![],
                        directives: vec![],
                        selection_set,
                    })));
                }
                (TokenKind::Name, "query") => {
                    definitions.push(self.parse_operation(OperationKind::Query)?)
                }
                (TokenKind::Name, "mutation") => {
                    definitions.push(self.parse_operation(OperationKind::Mutation)?)
                }
                (TokenKind::Name, "subscription") => {
                    definitions.push(self.parse_operation(OperationKind::Subscription)?)
                }
                (TokenKind::Name, "fragment") => definitions.push(self.parse_fragment()?),
                (TokenKind::Name, kw) if TYPE_SYSTEM_KEYWORDS.contains(&kw) => {
                    definitions.push(self.parse_type_system_definition()?)
                }
                _ => {
                    return Err(self.source.error(
                        self.tok.1.line,
                        self.tok.1.col,
                        "expecting operation or fragment definition",
                    ))
                }
            }
        }
        Ok(Document { definitions })
    }

    fn parse_operation(&mut self, kind: OperationKind) -> Result<Definition> {
        let span = self.tok.1.clone();
        self.next_token()?;

        let name = match self.tok.0 {
            TokenKind::Name => Some(self.parse_name("for operation")?),
            _ => None,
        };

        let variable_definitions = match self.token_text() {
            "(" => self.parse_variable_definitions()?,
            _ => vec![],
        };

        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(Definition::Operation(Ref::new(OperationDefinition {
            span,
            kind,
            name,
            variable_definitions,
            directives,
            selection_set,
        })))
    }

    fn parse_fragment(&mut self) -> Result<Definition> {
        let span = self.tok.1.clone();
        self.next_token()?;

        let name = self.parse_name("for fragment")?;
        if name.text() == "on" {
            return Err(name.span.error("fragment cannot be named `on`"));
        }
        self.expect("on", "after fragment name")?;
        let type_condition = self.parse_name("for fragment type condition")?;
        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(Definition::Fragment(Ref::new(FragmentDefinition {
            span,
            name,
            type_condition,
            directives,
            selection_set,
        })))
    }

    // Consumes a type-system definition by skipping balanced braces. Only
    // the leading keyword and its span survive into the AST.
    fn parse_type_system_definition(&mut self) -> Result<Definition> {
        let span = self.tok.1.clone();
        let keyword = self.token_text().to_owned();
        self.next_token()?;

        let mut depth = 0usize;
        loop {
            match (&self.tok.0, self.token_text()) {
                (TokenKind::Eof, _) => {
                    if depth > 0 {
                        return Err(span.error("unterminated type definition"));
                    }
                    break;
                }
                (TokenKind::Name, kw)
                    if depth == 0
                        && (TYPE_SYSTEM_KEYWORDS.contains(&kw)
                            || matches!(kw, "query" | "mutation" | "subscription" | "fragment")) =>
                {
                    // Start of the next definition.
                    break;
                }
                (TokenKind::Punct, "{") => {
                    depth += 1;
                    self.next_token()?;
                }
                (TokenKind::Punct, "}") => {
                    if depth == 0 {
                        return Err(self.tok.1.error("unexpected `}`"));
                    }
                    depth -= 1;
                    self.next_token()?;
                    if depth == 0 {
                        break;
                    }
                }
                _ => self.next_token()?,
            }
        }

        Ok(Definition::TypeSystem(Ref::new(TypeSystemDefinition {
            span,
            keyword,
        })))
    }

    fn parse_variable_definitions(&mut self) -> Result<Vec<VariableDefinition>> {
        self.expect("(", "to start variable definitions")?;
        let mut defs = vec![];
        while self.token_text() != ")" {
            let span = self.tok.1.clone();
            self.expect("$", "to start variable")?;
            let name = self.parse_name("for variable")?;
            self.expect(":", "after variable name")?;
            let ty = self.parse_type()?;
            let default_value = if self.token_text() == "=" {
                self.next_token()?;
                Some(self.parse_value(true)?)
            } else {
                None
            };
            defs.push(VariableDefinition {
                span,
                name,
                ty,
                default_value,
            });
        }
        self.next_token()?;
        Ok(defs)
    }

    fn parse_type(&mut self) -> Result<TypeNode> {
        let span = self.tok.1.clone();
        let ty = if self.token_text() == "[" {
            self.next_token()?;
            let inner = self.parse_type()?;
            self.expect("]", "to close list type")?;
            TypeNode::List {
                span,
                inner: Box::new(inner),
            }
        } else {
            let name = self.parse_name("for type")?;
            TypeNode::Named { span: name.span }
        };

        if self.token_text() == "!" {
            let span = self.tok.1.clone();
            self.next_token()?;
            return Ok(TypeNode::NonNull {
                span,
                inner: Box::new(ty),
            });
        }
        Ok(ty)
    }

    fn parse_selection_set(&mut self) -> Result<SelectionSet> {
        let span = self.tok.1.clone();
        self.expect("{", "to start selection set")?;
        let mut items = vec![];
        while self.token_text() != "}" {
            items.push(self.parse_selection()?);
        }
        if items.is_empty() {
            return Err(span.error("selection set cannot be empty"));
        }
        self.next_token()?;
        Ok(SelectionSet { span, items })
    }

    fn parse_selection(&mut self) -> Result<Selection> {
        if self.token_text() == "..." {
            let span = self.tok.1.clone();
            self.next_token()?;

            // `... on Type` and `... @dir` are inline fragments; a name is
            // a fragment spread.
            if self.tok.0 == TokenKind::Name && self.token_text() != "on" {
                let name = self.parse_name("for fragment spread")?;
                let directives = self.parse_directives()?;
                return Ok(Selection::FragmentSpread(Ref::new(FragmentSpreadNode {
                    span,
                    name,
                    directives,
                })));
            }

            let type_condition = if self.token_text() == "on" {
                self.next_token()?;
                Some(self.parse_name("for type condition")?)
            } else {
                None
            };
            let directives = self.parse_directives()?;
            let selection_set = self.parse_selection_set()?;
            return Ok(Selection::InlineFragment(Ref::new(InlineFragmentNode {
                span,
                type_condition,
                directives,
                selection_set,
            })));
        }

        let span = self.tok.1.clone();
        let name_or_alias = self.parse_name("for field")?;

        let (alias, name) = if self.token_text() == ":" {
            self.next_token()?;
            (Some(name_or_alias), self.parse_name("for field")?)
        } else {
            (None, name_or_alias)
        };

        let arguments = match self.token_text() {
            "(" => self.parse_arguments()?,
            _ => vec![],
        };
        let directives = self.parse_directives()?;
        let selection_set = match self.token_text() {
            "{" => Some(self.parse_selection_set()?),
            _ => None,
        };

        Ok(Selection::Field(Ref::new(FieldNode {
            span,
            alias,
            name,
            arguments,
            directives,
            selection_set,
        })))
    }

    fn parse_arguments(&mut self) -> Result<Vec<ArgumentNode>> {
        self.expect("(", "to start arguments")?;
        let mut args = vec![];
        while self.token_text() != ")" {
            let span = self.tok.1.clone();
            let name = self.parse_name("for argument")?;
            self.expect(":", "after argument name")?;
            let value = self.parse_value(false)?;
            args.push(ArgumentNode { span, name, value });
        }
        self.next_token()?;
        Ok(args)
    }

    fn parse_directives(&mut self) -> Result<Vec<DirectiveNode>> {
        let mut directives = vec![];
        while self.token_text() == "@" {
            let span = self.tok.1.clone();
            self.next_token()?;
            let name = self.parse_name("for directive")?;
            let arguments = match self.token_text() {
                "(" => self.parse_arguments()?,
                _ => vec![],
            };
            directives.push(DirectiveNode {
                span,
                name,
                arguments,
            });
        }
        Ok(directives)
    }

    fn parse_value(&mut self, const_context: bool) -> Result<ValueNode> {
        let span = self.tok.1.clone();
        match (&self.tok.0, self.token_text()) {
            (TokenKind::Punct, "$") => {
                if const_context {
                    return Err(span.error("variables are not allowed here"));
                }
                self.next_token()?;
                let name = self.parse_name("for variable")?;
                Ok(ValueNode::Variable { span, name })
            }
            (TokenKind::Int, _) => {
                self.next_token()?;
                Ok(ValueNode::Int { span })
            }
            (TokenKind::Float, _) => {
                self.next_token()?;
                Ok(ValueNode::Float { span })
            }
            (TokenKind::String, _) => {
                self.next_token()?;
                Ok(ValueNode::String { span })
            }
            (TokenKind::Name, "true") => {
                self.next_token()?;
                Ok(ValueNode::Boolean { span, value: true })
            }
            (TokenKind::Name, "false") => {
                self.next_token()?;
                Ok(ValueNode::Boolean { span, value: false })
            }
            (TokenKind::Name, "null") => {
                self.next_token()?;
                Ok(ValueNode::Null { span })
            }
            (TokenKind::Name, _) => {
                self.next_token()?;
                Ok(ValueNode::Enum { span })
            }
            (TokenKind::Punct, "[") => {
                self.next_token()?;
                let mut items = vec![];
                while self.token_text() != "]" {
                    items.push(self.parse_value(const_context)?);
                }
                self.next_token()?;
                Ok(ValueNode::List { span, items })
            }
            (TokenKind::Punct, "{") => {
                self.next_token()?;
                let mut fields = vec![];
                while self.token_text() != "}" {
                    let name = self.parse_name("for input object field")?;
                    self.expect(":", "after input object field name")?;
                    fields.push((name, self.parse_value(const_context)?));
                }
                self.next_token()?;
                Ok(ValueNode::Object { span, fields })
            }
            _ => Err(span.error("expecting value")),
        }
    }
}

/// Parses a query document from a string.
pub fn parse(document: &str) -> Result<Document> {
    let source = Source::new(document.to_owned())?;
    Parser::new(&source)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_query() {
        let doc = parse("{ a b }").unwrap();
        assert_eq!(doc.definitions.len(), 1);
        match &doc.definitions[0] {
            Definition::Operation(op) => {
                assert_eq!(op.kind, OperationKind::Query);
                assert!(op.name.is_none());
                assert_eq!(op.selection_set.items.len(), 2);
            }
            _ => panic!("expected operation"),
        }
    }

    #[test]
    fn named_operation_with_variables() {
        let doc = parse("query Example($size: Int = 10, $who: String!) { pic(size: $size) }")
            .unwrap();
        match &doc.definitions[0] {
            Definition::Operation(op) => {
                assert_eq!(op.name.as_ref().unwrap().text(), "Example");
                assert_eq!(op.variable_definitions.len(), 2);
                assert_eq!(op.variable_definitions[0].name.text(), "size");
                assert!(op.variable_definitions[0].default_value.is_some());
                assert_eq!(op.variable_definitions[1].ty.to_string(), "String!");
            }
            _ => panic!("expected operation"),
        }
    }

    #[test]
    fn fragments_and_spreads() {
        let doc = parse(
            "query Q { a ...Frag ... on Other { b } } fragment Frag on Thing { c }",
        )
        .unwrap();
        assert_eq!(doc.definitions.len(), 2);
        match &doc.definitions[0] {
            Definition::Operation(op) => {
                assert!(matches!(op.selection_set.items[1], Selection::FragmentSpread(_)));
                assert!(matches!(op.selection_set.items[2], Selection::InlineFragment(_)));
            }
            _ => panic!("expected operation"),
        }
        match &doc.definitions[1] {
            Definition::Fragment(frag) => {
                assert_eq!(frag.name.text(), "Frag");
                assert_eq!(frag.type_condition.text(), "Thing");
            }
            _ => panic!("expected fragment"),
        }
    }

    #[test]
    fn aliases_arguments_and_directives() {
        let doc = parse(r#"{ x: field(a: true, b: [1, 2], c: {d: "s", e: RED}) @skip(if: $f) }"#)
            .unwrap();
        match &doc.definitions[0] {
            Definition::Operation(op) => match &op.selection_set.items[0] {
                Selection::Field(field) => {
                    assert_eq!(field.response_key(), "x");
                    assert_eq!(field.name.text(), "field");
                    assert_eq!(field.arguments.len(), 3);
                    assert_eq!(field.directives.len(), 1);
                    assert_eq!(field.directives[0].name.text(), "skip");
                }
                _ => panic!("expected field"),
            },
            _ => panic!("expected operation"),
        }
    }

    #[test]
    fn type_system_definitions_are_preserved() {
        let doc = parse("{ foo } type Query { foo: String }").unwrap();
        assert_eq!(doc.definitions.len(), 2);
        match &doc.definitions[1] {
            Definition::TypeSystem(def) => {
                assert_eq!(def.keyword, "type");
                assert_eq!(def.span.line, 1);
            }
            _ => panic!("expected type-system definition"),
        }
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse("{").is_err());
        assert!(parse("{ }").is_err());
        assert!(parse("query { a } garbage").is_err());
        assert!(parse("fragment on on Type { a }").is_err());
    }
}
