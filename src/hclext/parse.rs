use super::body::{Attribute, Block, Body, Expression};
use super::diagnostic::{Diagnostic, Diagnostics};
use super::range::{LineIndex, SourceRange};
use hcl_edit::structure as edit;
use hcl_edit::Span;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(#[from] hcl::Error),
    #[error("{0}")]
    Spans(#[from] hcl_edit::parser::Error),
    #[error("structure mismatch at {0}")]
    Mismatch(SourceRange),
}

/// Parses one configuration file into a [`Body`].
///
/// `hcl-rs` supplies the expression trees, `hcl-edit` the byte spans; both see
/// the same source so their structures line up one to one.
pub fn parse_file(src: &str, filename: &str) -> Result<Body, Diagnostics> {
    let index = LineIndex::new(filename, src);
    parse_with_index(src, &index).map_err(|err| {
        let (summary, subject) = match &err {
            ParseError::Mismatch(range) => ("Invalid configuration syntax", range.clone()),
            ParseError::Spans(e) => {
                let at = index.pos(e.location().offset());
                let summary = if e.to_string().contains("redefined attribute") {
                    "Duplicate argument"
                } else {
                    "Invalid configuration syntax"
                };
                (summary, SourceRange::new(filename, at, at))
            }
            ParseError::Syntax(_) => ("Invalid configuration syntax", SourceRange::file_start(filename)),
        };
        Diagnostic::error(summary, err.to_string()).with_subject(&subject).into()
    })
}

// hcl-edit runs first: it rejects redefined attributes and reports where.
fn parse_with_index(src: &str, index: &LineIndex<'_>) -> Result<Body, ParseError> {
    let spans = hcl_edit::parser::parse_body(src)?;
    let body: hcl::Body = hcl::parse(src)?;
    convert_body(&body, &spans, index.end_of_file(), index)
}

fn convert_body(
    body: &hcl::Body,
    spans: &edit::Body,
    missing_item_range: SourceRange,
    index: &LineIndex<'_>,
) -> Result<Body, ParseError> {
    let mut out = Body::empty(missing_item_range);

    for (structure, spanned) in body.iter().zip(spans.iter()) {
        match (structure, spanned) {
            (hcl::Structure::Attribute(attr), edit::Structure::Attribute(e)) => {
                let range = index.range_opt(e.span());
                let name_range = index.range_opt(e.key.span());
                let expr_range = index.range_opt(e.value.span());
                out.attributes.insert(
                    attr.key().to_string(),
                    Attribute {
                        name: attr.key().to_string(),
                        expr: Expression::new(attr.expr().clone(), expr_range),
                        range,
                        name_range,
                    },
                );
            }
            (hcl::Structure::Block(block), edit::Structure::Block(e)) => {
                let type_range = index.range_opt(e.ident.span());
                let label_ranges: Vec<SourceRange> =
                    e.labels.iter().map(|l| index.range_opt(l.span())).collect();
                let def_range = match label_ranges.last() {
                    Some(last) => type_range.to(last),
                    None => type_range.clone(),
                };
                let block_end = match e.span() {
                    Some(span) => {
                        let end = index.pos(span.end);
                        SourceRange::new(index.filename(), end, end)
                    }
                    None => def_range.clone(),
                };
                let inner = convert_body(block.body(), &e.body, block_end, index)?;
                out.blocks.push(Block {
                    ty: block.identifier().to_string(),
                    labels: block.labels().iter().map(|l| l.as_str().to_string()).collect(),
                    body: inner,
                    def_range,
                    type_range,
                    label_ranges,
                });
            }
            _ => {
                return Err(ParseError::Mismatch(out.missing_item_range.clone()));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ranges() {
        let src = "resource \"aws_instance\" \"web\" {\n  ami = \"abc\"\n}\n";
        let body = parse_file(src, "main.tf").unwrap();
        let block = &body.blocks[0];
        assert_eq!(block.ty, "resource");
        assert_eq!(block.labels, vec!["aws_instance", "web"]);
        assert_eq!(block.def_range.start.line, 1);
        let ami = block.body.find_attr("ami").unwrap();
        assert_eq!(ami.name_range.start.line, 2);
        assert_eq!(ami.name_range.start.column, 3);
    }

    #[test]
    fn duplicate_argument() {
        let err = parse_file("a = 1\na = 2\n", "main.tf").unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].summary, "Duplicate argument");
        assert_eq!(err[0].subject.as_ref().unwrap().start.line, 2);

        let err = parse_file("resource \"a\" \"b\" {\n  x = 1\n  x = 2\n}\n", "main.tf").unwrap_err();
        assert_eq!(err[0].summary, "Duplicate argument");
    }

    #[test]
    fn syntax_error() {
        let err = parse_file("a = \n", "main.tf").unwrap_err();
        assert_eq!(err[0].summary, "Invalid configuration syntax");
    }
}
